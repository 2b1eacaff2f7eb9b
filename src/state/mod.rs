//! State machine module for the avatar interaction
//!
//! Provides an explicit state machine with four states:
//! - Idle: Not started, nothing running
//! - Listening: Recognizer running, waiting for the wake word
//! - Thinking: Transcript sent to the backend, waiting for a reply
//! - Speaking: Synthesizing a response or an idle filler
//!
//! In remote mode the backend owns these states and `RemoteProjector` only
//! mirrors them.

mod machine;
mod remote;
mod timer;
mod transition;

pub use machine::{Adapters, Event, Settings, State, StateMachine};
pub use remote::{RemoteEvent, RemoteProjector};
pub use timer::TimerSlot;
