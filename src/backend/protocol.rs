//! Backend wire formats
//!
//! HTTP bodies are plain JSON objects. Persistent channel frames are JSON text
//! messages shaped `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::gesture::Gesture;
use crate::speech::{Language, Utterance};
use crate::state::State;

/// Spoken when the backend reply carries no message
pub const DEFAULT_MESSAGE: &str = "Hola...";

/// Body of `POST /procesar`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub texto: String,
}

/// Backend reply; every field is optional on the wire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessReply {
    #[serde(default)]
    pub mensaje: Option<String>,
    #[serde(default)]
    pub gesto: Option<String>,
    #[serde(default)]
    pub idioma: Option<String>,
}

impl ProcessReply {
    /// Fill in defaults for missing or blank fields
    pub fn into_utterance(self) -> Utterance {
        let text = self
            .mensaje
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
        let gesture = self
            .gesto
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .map(Gesture::new)
            .unwrap_or_default();
        let language = self
            .idioma
            .as_deref()
            .map(Language::from_code)
            .unwrap_or_default();

        Utterance::new(text, language, gesture)
    }
}

/// Intents sent from the client over the persistent channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientIntent {
    /// Ask the backend to open the microphone
    StartListening {},

    /// Ask the backend to close the microphone
    StopListening {},

    /// Nobody said the wake word for a while; say a filler
    IdleSpeak { idioma: Language },
}

impl std::fmt::Display for ClientIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientIntent::StartListening {} => write!(f, "START_LISTENING"),
            ClientIntent::StopListening {} => write!(f, "STOP_LISTENING"),
            ClientIntent::IdleSpeak { idioma } => write!(f, "IDLE_SPEAK ({})", idioma),
        }
    }
}

/// Notifications pushed by the backend over the persistent channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerPush {
    /// Free-form status line
    Status { message: String },

    /// Backend moved the interaction to a new state
    StateChanged { state: State },

    /// Backend detected the speaker's language
    IdiomaDetectado { idioma: String },

    /// Backend heard the wake word in `texto`
    WakeWordDetected { texto: String },

    /// Backend produced a response
    IaResponse(ProcessReply),

    /// Backend finished speaking
    SpeakingDone {},
}
