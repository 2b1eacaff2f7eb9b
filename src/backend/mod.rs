//! Backend module: the collaborator that turns transcripts into responses
//!
//! Two transports exist: a request/response HTTP backend used by the local
//! state machine, and a persistent channel to a backend that owns the state.

mod channel;
mod http;
mod protocol;

use async_trait::async_trait;

use crate::speech::Utterance;

pub use channel::{connect, ChannelHandle};
pub use http::HttpBackend;
pub use protocol::{ClientIntent, ServerPush};

/// Errors talking to the backend. All of them are recoverable.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend answered with status {0}")]
    Status(u16),

    #[error("malformed reply: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("backend channel is closed")]
    Closed,
}

/// Request/response backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Turn a wake-word transcript into something to say
    async fn process(&self, text: &str) -> Result<Utterance, BackendError>;
}

/// Sink for intents on the persistent channel
pub trait IntentSink: Send {
    fn emit(&self, intent: ClientIntent) -> Result<(), BackendError>;
}
