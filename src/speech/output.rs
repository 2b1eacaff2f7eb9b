//! Speech output adapter
//!
//! A `Speaker` plays one utterance at a time and reports completion exactly
//! once through a oneshot channel.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::voice::Voice;

/// A fully resolved request to say something
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    /// Locale tag, e.g. "es-MX"
    pub language_tag: String,
    /// Preferred voice; `None` leaves the platform default
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
}

impl SpeechRequest {
    pub fn new(
        text: impl Into<String>,
        language_tag: impl Into<String>,
        voice: Option<Voice>,
    ) -> Self {
        Self {
            text: text.into(),
            language_tag: language_tag.into(),
            voice,
            rate: 1.0,
            pitch: 1.1,
        }
    }
}

/// How an utterance ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to the end
    Finished,
    /// Engine gave up on it
    Failed(String),
}

/// Errors raised when an utterance cannot be started
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
}

/// Text-to-speech capability used by the state machine
pub trait Speaker: Send {
    /// Start speaking; the receiver resolves once when playback ends
    fn speak(
        &mut self,
        request: SpeechRequest,
    ) -> Result<oneshot::Receiver<SpeechOutcome>, SpeechError>;

    /// Drop whatever is queued or playing
    fn cancel(&mut self);

    /// Voices the platform currently offers
    fn voices(&self) -> Vec<Voice>;
}

/// Milliseconds of playback per word at rate 1.0
const MS_PER_WORD: u64 = 380;

/// Fixed lead-in before the first word
const LEAD_IN_MS: u64 = 250;

/// Speaker that logs utterances and "plays" them for a realistic duration
pub struct ConsoleSpeaker {
    voices: Vec<Voice>,
    playing: Option<JoinHandle<()>>,
}

impl ConsoleSpeaker {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            playing: None,
        }
    }

    /// Estimated playback time for `request`
    pub fn estimate(request: &SpeechRequest) -> Duration {
        let words = request.text.split_whitespace().count() as u64;
        let rate = if request.rate > 0.0 { request.rate } else { 1.0 };
        let ms = (LEAD_IN_MS + words * MS_PER_WORD) as f32 / rate;
        Duration::from_millis(ms as u64)
    }
}

impl Speaker for ConsoleSpeaker {
    fn speak(
        &mut self,
        request: SpeechRequest,
    ) -> Result<oneshot::Receiver<SpeechOutcome>, SpeechError> {
        if request.text.trim().is_empty() {
            return Err(SpeechError::Unavailable("nothing to say".to_string()));
        }

        let (done_tx, done_rx) = oneshot::channel();
        let duration = Self::estimate(&request);

        info!(
            lang = %request.language_tag,
            voice = ?request.voice.as_ref().map(|v| v.name.as_str()),
            text = %request.text,
            "speaking"
        );

        self.playing = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(SpeechOutcome::Finished);
        }));

        Ok(done_rx)
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.playing.take() {
            debug!("cancelling current utterance");
            handle.abort();
        }
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = SpeechRequest::new("hola", "es-MX", None);
        assert_eq!(req.rate, 1.0);
        assert_eq!(req.pitch, 1.1);
    }

    #[test]
    fn test_estimate_grows_with_words() {
        let short = ConsoleSpeaker::estimate(&SpeechRequest::new("hola", "es-MX", None));
        let long = ConsoleSpeaker::estimate(&SpeechRequest::new(
            "hola que tal como estas",
            "es-MX",
            None,
        ));
        assert!(long > short);
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_speaker_completes_once() {
        let mut speaker = ConsoleSpeaker::new(Vec::new());
        let done = speaker
            .speak(SpeechRequest::new("¡Pizza en camino!", "es-MX", None))
            .unwrap();
        assert_eq!(done.await.unwrap(), SpeechOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_completion() {
        let mut speaker = ConsoleSpeaker::new(Vec::new());
        let done = speaker.speak(SpeechRequest::new("hola", "es-MX", None)).unwrap();
        speaker.cancel();
        assert!(done.await.is_err());
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let mut speaker = ConsoleSpeaker::new(Vec::new());
        assert!(speaker.speak(SpeechRequest::new("  ", "es-MX", None)).is_err());
    }
}
