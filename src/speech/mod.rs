//! Speech output: what the avatar says and how it sounds

mod output;
mod phrasebook;
mod utterance;
mod voice;

pub use output::{ConsoleSpeaker, SpeechError, SpeechOutcome, SpeechRequest, Speaker};
pub use phrasebook::Phrasebook;
#[cfg(test)]
pub use phrasebook::Filler;
pub use utterance::{Language, Utterance};
pub use voice::{Voice, VoicePreference, VoicePriority};
