//! Recognition module: transcript events and wake word detection
//!
//! The recognizer produces an endless, restartable stream of transcript
//! events; the wake word matcher decides which of them address the avatar.

mod listener;
mod wake;

pub use listener::{RecognitionError, RecognitionEvent, Recognizer, StdinRecognizer};
pub use wake::{collect_transcript, WakePolicy, WakeWordMatcher};
