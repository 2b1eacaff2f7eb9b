//! Speech recognition adapter
//!
//! A recognizer pushes transcript events while it is started. It can end on
//! its own at any time; restarting it is the state machine's job.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events pushed by a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// New results. Segments from `result_index` on have not been seen before.
    Result {
        result_index: usize,
        segments: Vec<String>,
    },
    /// Recognition failed; the recognizer has stopped
    Error(String),
    /// Recognition ended, either after `stop()` or on its own
    End,
}

/// Errors raised by recognizer control calls
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("recognizer is already running")]
    AlreadyStarted,

    #[error("transcript source is closed")]
    SourceClosed,

    #[error("failed to spawn reader thread: {0}")]
    ThreadSpawn(String),
}

/// Continuous speech recognition capability
pub trait Recognizer: Send {
    /// Begin delivering results. Fails with `AlreadyStarted` if running.
    fn start(&mut self) -> Result<(), RecognitionError>;

    /// Stop delivering results. An `End` event may or may not follow.
    fn stop(&mut self);
}

/// Recognizer fed by transcript lines on stdin.
///
/// Each line becomes one result event; `|` separates several segments within
/// the same event. Lines typed while stopped are discarded, like speech said
/// while the microphone is off.
pub struct StdinRecognizer {
    event_tx: mpsc::Sender<RecognitionEvent>,
    listening: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    reader_spawned: bool,
}

impl StdinRecognizer {
    pub fn new(event_tx: mpsc::Sender<RecognitionEvent>) -> Self {
        Self {
            event_tx,
            listening: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            reader_spawned: false,
        }
    }

    fn spawn_reader(&mut self) -> Result<(), RecognitionError> {
        let event_tx = self.event_tx.clone();
        let listening = Arc::clone(&self.listening);
        let closed = Arc::clone(&self.closed);

        thread::Builder::new()
            .name("transcript-reader".to_string())
            .spawn(move || {
                info!("transcript reader thread started");
                read_lines(std::io::stdin().lock(), &event_tx, &listening);

                closed.store(true, Ordering::SeqCst);
                if listening.swap(false, Ordering::SeqCst) {
                    let _ = event_tx.blocking_send(RecognitionEvent::End);
                }
                info!("transcript reader thread stopped");
            })
            .map_err(|e| RecognitionError::ThreadSpawn(e.to_string()))?;

        self.reader_spawned = true;
        Ok(())
    }
}

impl Recognizer for StdinRecognizer {
    fn start(&mut self) -> Result<(), RecognitionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RecognitionError::SourceClosed);
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(RecognitionError::AlreadyStarted);
        }
        if !self.reader_spawned {
            if let Err(e) = self.spawn_reader() {
                self.listening.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            // Mirror platform recognizers, which report the end of a stopped session
            if self.event_tx.try_send(RecognitionEvent::End).is_err() {
                debug!("recognition end event dropped");
            }
        }
    }
}

/// Forward lines from `input` while `listening` is set
fn read_lines<R: BufRead>(
    input: R,
    event_tx: &mpsc::Sender<RecognitionEvent>,
    listening: &AtomicBool,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(?e, "failed to read transcript line");
                let _ = event_tx.blocking_send(RecognitionEvent::Error(e.to_string()));
                continue;
            }
        };

        if !listening.load(Ordering::SeqCst) {
            debug!("recognizer stopped, line discarded");
            continue;
        }

        let segments = split_segments(&line);
        if segments.is_empty() {
            continue;
        }

        if event_tx
            .blocking_send(RecognitionEvent::Result {
                result_index: 0,
                segments,
            })
            .is_err()
        {
            warn!("failed to send recognition event - channel closed?");
            break;
        }
    }
}

fn split_segments(line: &str) -> Vec<String> {
    line.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_recognizer_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let recognizer = StdinRecognizer::new(tx);
        assert!(!recognizer.listening.load(Ordering::SeqCst));
        assert!(!recognizer.reader_spawned);
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(
            split_segments("hola | dinner quiero pizza"),
            vec!["hola", "dinner quiero pizza"]
        );
        assert!(split_segments("  |  ").is_empty());
    }

    #[test]
    fn test_read_lines_only_while_listening() {
        let (tx, mut rx) = mpsc::channel(32);
        let listening = AtomicBool::new(true);

        read_lines(Cursor::new("hola\n\ndinner | pizza\n"), &tx, &listening);

        assert_eq!(
            rx.try_recv().unwrap(),
            RecognitionEvent::Result {
                result_index: 0,
                segments: vec!["hola".to_string()],
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RecognitionEvent::Result {
                result_index: 0,
                segments: vec!["dinner".to_string(), "pizza".to_string()],
            }
        );
        assert!(rx.try_recv().is_err());

        listening.store(false, Ordering::SeqCst);
        read_lines(Cursor::new("nadie escucha\n"), &tx, &listening);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_reports_end_once() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut recognizer = StdinRecognizer::new(tx);
        recognizer.listening.store(true, Ordering::SeqCst);

        recognizer.stop();
        recognizer.stop();
        assert_eq!(rx.try_recv().unwrap(), RecognitionEvent::End);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_source_refuses_start() {
        let (tx, _rx) = mpsc::channel(32);
        let mut recognizer = StdinRecognizer::new(tx);
        recognizer.closed.store(true, Ordering::SeqCst);
        assert!(matches!(recognizer.start(), Err(RecognitionError::SourceClosed)));
    }
}
