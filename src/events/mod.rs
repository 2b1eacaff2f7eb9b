//! Events module for avatar notifications
//!
//! Structured events broadcast by the state machine and the remote projector
//! for logging and observers.

use serde::{Deserialize, Serialize};

use crate::backend::ClientIntent;
use crate::gesture::Gesture;
use crate::speech::Language;
use crate::state::State;

/// Events emitted while the avatar runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AvatarEvent {
    /// Interaction state changed
    StateChanged { from: State, to: State },

    /// Recognizer produced a transcript while listening
    TranscriptHeard { text: String },

    /// Transcript contained the wake word and was sent to the backend
    WakeWordDetected { text: String },

    /// Avatar video switched to a new gesture
    GestureShown { gesture: Gesture },

    /// Avatar started saying something
    SpeechStarted {
        text: String,
        /// Locale tag used for synthesis
        language_tag: String,
    },

    /// Conversation language changed
    LanguageChanged { language: Language },

    /// Recognizer stopped unexpectedly and will be restarted
    RecognitionLost,

    /// Backend call failed; back to listening
    BackendFailed { reason: String },

    /// Intent emitted on the persistent channel
    IntentSent { intent: ClientIntent },
}

impl std::fmt::Display for AvatarEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvatarEvent::StateChanged { from, to } => {
                write!(f, "STATE_CHANGED ({} -> {})", from, to)
            }
            AvatarEvent::TranscriptHeard { text } => write!(f, "TRANSCRIPT_HEARD ({})", text),
            AvatarEvent::WakeWordDetected { text } => write!(f, "WAKE_WORD_DETECTED ({})", text),
            AvatarEvent::GestureShown { gesture } => write!(f, "GESTURE_SHOWN ({})", gesture),
            AvatarEvent::SpeechStarted { language_tag, .. } => {
                write!(f, "SPEECH_STARTED ({})", language_tag)
            }
            AvatarEvent::LanguageChanged { language } => {
                write!(f, "LANGUAGE_CHANGED ({})", language)
            }
            AvatarEvent::RecognitionLost => write!(f, "RECOGNITION_LOST"),
            AvatarEvent::BackendFailed { reason } => write!(f, "BACKEND_FAILED ({})", reason),
            AvatarEvent::IntentSent { intent } => write!(f, "INTENT_SENT ({})", intent),
        }
    }
}
