//! Core state machine implementation
//!
//! Owns the interaction state and every resource handoff around it:
//! recognition start/stop, synthesis playback, the idle timer and the
//! gesture display. Transitions come from the table in `transition`; this
//! module performs their effects.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError};
use crate::config::{Config, Timings};
use crate::events::AvatarEvent;
use crate::gesture::{Gesture, GestureDisplay, GestureSurface};
use crate::recognition::{
    collect_transcript, RecognitionError, RecognitionEvent, Recognizer, WakeWordMatcher,
};
use crate::speech::{
    Language, Phrasebook, SpeechOutcome, SpeechRequest, Speaker, Utterance, VoicePreference,
    VoicePriority,
};

use super::timer::{schedule, TimerSlot};
use super::transition::{transition, Effect, Input};

/// The four interaction states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Not started yet
    #[default]
    Idle,
    /// Recognizer running, waiting for the wake word
    #[serde(alias = "escuchando")]
    Listening,
    /// Waiting for the backend
    #[serde(alias = "pensando")]
    Thinking,
    /// Saying something
    #[serde(alias = "hablando")]
    Speaking,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Listening => write!(f, "Listening"),
            State::Thinking => write!(f, "Thinking"),
            State::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Events delivered to the state machine
#[derive(Debug)]
pub enum Event {
    /// Bootstrap: begin listening
    Start,
    /// Something from the recognizer
    Recognition(RecognitionEvent),
    /// Idle timer fired
    IdleTimeout { generation: u64 },
    /// Backend call finished
    BackendReplied(Result<Utterance, BackendError>),
    /// Completion of utterance `id`
    SpeechEnded { id: u64, outcome: SpeechOutcome },
    /// No completion arrived in time for the current utterance
    SpeechWatchdog { generation: u64 },
    /// Post-speech pause elapsed
    Resume,
    /// Recognizer backoff elapsed
    RestartRecognition,
    /// Hold time of a non-neutral gesture elapsed
    GestureRevert { generation: u64 },
}

/// External capabilities the machine coordinates
pub struct Adapters {
    /// Source of transcripts
    pub recognizer: Box<dyn Recognizer>,
    /// Speech synthesis
    pub speaker: Box<dyn Speaker>,
    /// Avatar surface; `None` if there is nothing to draw on
    pub surface: Option<Box<dyn GestureSurface>>,
    /// Turns wake-word transcripts into responses
    pub backend: Arc<dyn Backend>,
}

/// Tunables for one machine
pub struct Settings {
    pub timings: Timings,
    pub matcher: WakeWordMatcher,
    /// Preferred synthesis voice
    pub voice_priority: VoicePriority,
    /// URL prefix of the gesture videos
    pub asset_base: String,
    /// Idle fillers
    pub phrasebook: Phrasebook,
}

impl Settings {
    /// Settings for `config` with the stock voice priority and fillers
    pub fn from_config(config: &Config) -> Result<Self, regex::Error> {
        Ok(Self {
            timings: config.timings.clone(),
            matcher: WakeWordMatcher::new(config.wake_policy)?,
            voice_priority: VoicePriority::default(),
            asset_base: config.asset_base.clone(),
            phrasebook: Phrasebook::default(),
        })
    }
}

/// The state machine that arbitrates listening, thinking and speaking
pub struct StateMachine {
    /// Current state
    state: State,
    /// Last language reported by the backend
    language: Language,
    state_entered_at: Instant,

    timings: Timings,
    matcher: WakeWordMatcher,
    phrasebook: Phrasebook,

    recognizer: Box<dyn Recognizer>,
    /// Recognizer is believed to be running
    recognition_active: bool,
    /// Recognizer reported its source gone for good
    source_closed: bool,

    speaker: Box<dyn Speaker>,
    speaking: bool,
    /// Id of the latest utterance handed to the speaker
    utterance_id: u64,
    voices: VoicePreference,

    gestures: GestureDisplay,
    backend: Arc<dyn Backend>,

    idle_timer: TimerSlot,
    speech_watchdog: TimerSlot,

    /// Sender for self-scheduled events (timers, backend replies, completions)
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: Option<mpsc::UnboundedReceiver<Event>>,
    /// Channel for emitting avatar events
    notify_tx: broadcast::Sender<AvatarEvent>,
}

impl StateMachine {
    /// Create a new state machine
    pub fn new(
        settings: Settings,
        adapters: Adapters,
        notify_tx: broadcast::Sender<AvatarEvent>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let gestures = GestureDisplay::new(
            adapters.surface,
            settings.asset_base,
            settings.timings.gesture_hold,
        );

        Self {
            state: State::Idle,
            language: Language::default(),
            state_entered_at: Instant::now(),
            timings: settings.timings,
            matcher: settings.matcher,
            phrasebook: settings.phrasebook,
            recognizer: adapters.recognizer,
            recognition_active: false,
            source_closed: false,
            speaker: adapters.speaker,
            speaking: false,
            utterance_id: 0,
            voices: VoicePreference::new(settings.voice_priority),
            gestures,
            backend: adapters.backend,
            idle_timer: TimerSlot::new("idle"),
            speech_watchdog: TimerSlot::new("speech-watchdog"),
            events_tx,
            events_rx: Some(events_rx),
            notify_tx,
        }
    }

    /// Get the current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Last known conversation language
    pub fn language(&self) -> Language {
        self.language
    }

    /// Handle for feeding events (e.g. `Event::Start`) from outside
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.events_tx.clone()
    }

    /// Run the state machine, processing recognizer and internal events
    pub async fn run(&mut self, mut recognition_rx: mpsc::Receiver<RecognitionEvent>) {
        let Some(mut events_rx) = self.events_rx.take() else {
            warn!("state machine is already running");
            return;
        };

        info!("state machine started in Idle state");

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => self.handle(event),
                Some(event) = recognition_rx.recv() => self.handle(Event::Recognition(event)),
                else => break,
            }
        }

        info!("state machine stopped");
    }

    /// Release every resource: timers, recognizer, speaker
    pub fn shutdown(&mut self) {
        self.idle_timer.disarm();
        self.speech_watchdog.disarm();
        self.gestures.cancel_revert();
        self.stop_recognition();
        self.speaker.cancel();
        self.speaking = false;
        info!(state = %self.state, "state machine shut down");
    }

    /// Handle one event
    pub fn handle(&mut self, event: Event) {
        let input = match event {
            Event::Start => Input::Start,

            Event::Recognition(event) => match self.recognition_input(event) {
                Some(input) => input,
                None => return,
            },

            Event::IdleTimeout { generation } => {
                if !self.idle_timer.fire(generation) {
                    debug!(generation, "stale idle timer ignored");
                    return;
                }
                info!("idle timeout elapsed");
                Input::IdleElapsed
            }

            Event::BackendReplied(Ok(utterance)) => Input::Replied(utterance),

            Event::BackendReplied(Err(e)) => {
                warn!(?e, "backend call failed, back to listening");
                self.notify(AvatarEvent::BackendFailed { reason: e.to_string() });
                Input::BackendFailed
            }

            Event::SpeechEnded { id, outcome } => {
                if !self.speaking || id != self.utterance_id {
                    debug!(id, current = self.utterance_id, "stale speech completion ignored");
                    return;
                }
                if let SpeechOutcome::Failed(reason) = outcome {
                    warn!(%reason, "speech failed");
                }
                self.finish_speech();
                Input::SpeechEnded
            }

            Event::SpeechWatchdog { generation } => {
                if !self.speech_watchdog.fire(generation) || !self.speaking {
                    return;
                }
                warn!(
                    timeout_ms = self.timings.speech_timeout.as_millis() as u64,
                    "no speech completion, giving up on utterance"
                );
                self.speaker.cancel();
                self.finish_speech();
                Input::SpeechEnded
            }

            Event::Resume => Input::Resume,

            Event::RestartRecognition => Input::RestartDue,

            Event::GestureRevert { generation } => {
                let speaking = self.state == State::Speaking;
                if self.gestures.revert_due(generation, speaking) {
                    self.notify(AvatarEvent::GestureShown {
                        gesture: Gesture::neutral(),
                    });
                }
                return;
            }
        };

        self.apply(input);
    }

    /// Translate a recognizer event into a table input
    fn recognition_input(&mut self, event: RecognitionEvent) -> Option<Input> {
        match event {
            RecognitionEvent::Result { result_index, segments } => {
                if self.state != State::Listening {
                    debug!(state = %self.state, "transcript outside listening ignored");
                    return None;
                }

                let transcript = collect_transcript(result_index, &segments);
                let wake = self.matcher.matches(&transcript);
                info!(%transcript, wake, "heard");
                self.notify(AvatarEvent::TranscriptHeard {
                    text: transcript.clone(),
                });

                Some(Input::Heard { transcript, wake })
            }

            RecognitionEvent::Error(reason) => {
                warn!(%reason, "recognition error");
                self.recognition_lost()
            }

            RecognitionEvent::End => {
                if !self.recognition_active {
                    debug!("recognition ended after stop");
                    return None;
                }
                info!("recognition ended unexpectedly");
                self.recognition_lost()
            }
        }
    }

    /// The recognizer stopped without being asked to
    fn recognition_lost(&mut self) -> Option<Input> {
        if !self.recognition_active {
            return None;
        }

        // Align the recognizer with our view; an `End` echoing this stop is ignored
        self.recognizer.stop();
        self.recognition_active = false;

        if self.state == State::Listening && !self.speaking {
            self.notify(AvatarEvent::RecognitionLost);
            Some(Input::RecognitionLost)
        } else {
            None
        }
    }

    /// Run the table and perform the resulting effects
    fn apply(&mut self, input: Input) {
        let Some(transition) = transition(self.state, &input) else {
            debug!(state = %self.state, ?input, "input ignored");
            return;
        };

        if transition.next != self.state {
            self.transition_to(transition.next);
        }

        for effect in transition.effects {
            self.perform(effect);
        }
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: State) {
        let old_state = self.state;
        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = Instant::now();
        self.notify(AvatarEvent::StateChanged {
            from: old_state,
            to: new_state,
        });
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::HideOverlay => self.gestures.hide_overlay(),
            Effect::RefreshVoices => self.refresh_voices(),
            Effect::StartRecognition => self.start_recognition(),
            Effect::StopRecognition => self.stop_recognition(),
            Effect::ArmIdleTimer => {
                if self.source_closed {
                    debug!("transcript source closed, idle timer not armed");
                    return;
                }
                self.idle_timer
                    .arm(self.timings.idle_timeout, self.events_tx.clone(), |generation| {
                        Event::IdleTimeout { generation }
                    });
            }
            Effect::DisarmIdleTimer => self.idle_timer.disarm(),
            Effect::ShowGesture(gesture) => self.show_gesture(&gesture),
            Effect::Dispatch(text) => self.dispatch(text),
            Effect::AdoptLanguage(language) => self.adopt_language(language),
            Effect::Speak(utterance) => self.speak(utterance),
            Effect::SpeakFiller => self.speak_filler(),
            Effect::ScheduleResume => {
                schedule(self.timings.resume_delay, self.events_tx.clone(), Event::Resume);
            }
            Effect::ScheduleRestart => self.schedule_restart(),
        }
    }

    fn start_recognition(&mut self) {
        if self.recognition_active || self.speaking {
            debug!(
                active = self.recognition_active,
                speaking = self.speaking,
                "recognition start skipped"
            );
            return;
        }

        match self.recognizer.start() {
            Ok(()) => {
                self.recognition_active = true;
                info!("listening");
            }
            Err(RecognitionError::AlreadyStarted) => {
                debug!("recognizer was already running");
                self.recognition_active = true;
            }
            Err(RecognitionError::SourceClosed) => {
                if !self.source_closed {
                    warn!("transcript source closed, recognition will not restart");
                    self.source_closed = true;
                }
                self.idle_timer.disarm();
            }
            Err(e) => {
                warn!(?e, "failed to start recognition");
                if self.state == State::Listening {
                    self.schedule_restart();
                }
            }
        }
    }

    fn stop_recognition(&mut self) {
        if !self.recognition_active {
            return;
        }
        self.recognizer.stop();
        self.recognition_active = false;
        info!("recognition stopped");
    }

    fn schedule_restart(&mut self) {
        if self.source_closed {
            return;
        }
        debug!(
            backoff_ms = self.timings.restart_backoff.as_millis() as u64,
            "recognition restart scheduled"
        );
        schedule(
            self.timings.restart_backoff,
            self.events_tx.clone(),
            Event::RestartRecognition,
        );
    }

    fn show_gesture(&mut self, gesture: &Gesture) {
        if self
            .gestures
            .show(gesture, &self.events_tx, |generation| Event::GestureRevert { generation })
        {
            self.notify(AvatarEvent::GestureShown {
                gesture: gesture.clone(),
            });
        }
    }

    /// Send the transcript to the backend; the reply comes back as an event
    fn dispatch(&mut self, text: String) {
        info!(%text, "wake word detected, asking backend");
        self.notify(AvatarEvent::WakeWordDetected { text: text.clone() });

        let backend = Arc::clone(&self.backend);
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let reply = backend.process(&text).await;
            let _ = events_tx.send(Event::BackendReplied(reply));
        });
    }

    fn adopt_language(&mut self, language: Language) {
        if self.language != language {
            info!(from = %self.language, to = %language, "language changed");
            self.language = language;
            self.notify(AvatarEvent::LanguageChanged { language });
        }
    }

    fn refresh_voices(&mut self) {
        let voices = self.speaker.voices();
        self.voices.refresh(&voices);
    }

    /// Claim the speaker for a new utterance. `None` if already speaking.
    fn begin_utterance(&mut self) -> Option<u64> {
        if self.speaking {
            debug!("already speaking, utterance dropped");
            return None;
        }
        self.speaking = true;
        self.utterance_id += 1;
        Some(self.utterance_id)
    }

    fn finish_speech(&mut self) {
        self.speaking = false;
        self.speech_watchdog.disarm();
    }

    fn speak_filler(&mut self) {
        let filler = self.phrasebook.pick(&mut rand::thread_rng(), self.language);
        match filler {
            Some(utterance) => {
                self.show_gesture(&utterance.gesture);
                self.speak(utterance);
            }
            None => {
                warn!("phrasebook is empty, nothing to say");
                if let Some(id) = self.begin_utterance() {
                    self.fail_utterance(id, "no idle filler available".to_string());
                }
            }
        }
    }

    fn speak(&mut self, utterance: Utterance) {
        let Some(id) = self.begin_utterance() else {
            return;
        };

        // Never let the microphone hear the avatar
        self.stop_recognition();

        // Cheap when the platform list is unchanged
        self.refresh_voices();
        let voice = self.voices.voice_for(utterance.language).cloned();
        let language_tag = self.voices.language_tag(utterance.language);
        let request = SpeechRequest::new(utterance.text.clone(), language_tag.clone(), voice);

        self.speaker.cancel();
        match self.speaker.speak(request) {
            Ok(done) => {
                self.notify(AvatarEvent::SpeechStarted {
                    text: utterance.text,
                    language_tag,
                });

                let events_tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = done
                        .await
                        .unwrap_or_else(|_| SpeechOutcome::Failed("utterance dropped".to_string()));
                    let _ = events_tx.send(Event::SpeechEnded { id, outcome });
                });

                self.speech_watchdog.arm(
                    self.timings.speech_timeout,
                    self.events_tx.clone(),
                    |generation| Event::SpeechWatchdog { generation },
                );
            }
            Err(e) => {
                warn!(?e, "failed to start speech");
                self.fail_utterance(id, e.to_string());
            }
        }
    }

    fn fail_utterance(&mut self, id: u64, reason: String) {
        let _ = self.events_tx.send(Event::SpeechEnded {
            id,
            outcome: SpeechOutcome::Failed(reason),
        });
    }

    fn notify(&self, event: AvatarEvent) {
        debug!(%event, "emitting avatar event");
        let _ = self.notify_tx.send(event);
    }
}
