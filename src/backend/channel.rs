//! Persistent bidirectional channel to a backend that owns the state
//!
//! One task keeps a WebSocket open, writes queued intents and forwards pushed
//! notifications. Lost connections are re-established after a fixed delay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::protocol::{ClientIntent, ServerPush};
use super::{BackendError, IntentSink};

/// Longest slice of an unparseable frame that gets logged
const FRAME_PREVIEW_CHARS: usize = 100;

/// Cloneable sending half of the channel
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    intent_tx: mpsc::UnboundedSender<ClientIntent>,
}

impl IntentSink for ChannelHandle {
    fn emit(&self, intent: ClientIntent) -> Result<(), BackendError> {
        debug!(%intent, "queueing intent");
        self.intent_tx.send(intent).map_err(|_| BackendError::Closed)
    }
}

/// Why a connection session ended
enum SessionEnd {
    /// Remote side went away; reconnect
    Disconnected,
    /// Local side is done; stop for good
    Finished,
}

/// Open the channel to `url`.
///
/// Returns the intent handle, the stream of pushes and the connection task.
/// The task ends once every handle is dropped or the push receiver is closed.
pub fn connect(
    url: String,
    reconnect_delay: Duration,
) -> (ChannelHandle, mpsc::Receiver<ServerPush>, JoinHandle<()>) {
    let (intent_tx, mut intent_rx) = mpsc::unbounded_channel();
    let (push_tx, push_rx) = mpsc::channel(64);

    let task = tokio::spawn(async move {
        loop {
            match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!(%url, "connected to backend channel");
                    match run_session(ws_stream, &mut intent_rx, &push_tx).await {
                        SessionEnd::Finished => break,
                        SessionEnd::Disconnected => {
                            warn!("backend channel disconnected");
                        }
                    }
                }
                Err(e) => {
                    warn!(?e, %url, "backend channel connection error");
                }
            }

            if push_tx.is_closed() {
                break;
            }
            info!(delay_ms = reconnect_delay.as_millis() as u64, "reconnecting to backend channel");
            tokio::time::sleep(reconnect_delay).await;
        }

        info!("backend channel task stopped");
    });

    (ChannelHandle { intent_tx }, push_rx, task)
}

async fn run_session<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    intent_rx: &mut mpsc::UnboundedReceiver<ClientIntent>,
    push_tx: &mpsc::Sender<ServerPush>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            intent = intent_rx.recv() => {
                let Some(intent) = intent else {
                    let _ = write.close().await;
                    return SessionEnd::Finished;
                };
                let text = match serde_json::to_string(&intent) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(?e, "failed to encode intent");
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(?e, %intent, "failed to send intent");
                    return SessionEnd::Disconnected;
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerPush>(&text) {
                            Ok(push) => {
                                debug!(?push, "backend push");
                                if push_tx.send(push).await.is_err() {
                                    return SessionEnd::Finished;
                                }
                            }
                            Err(e) => {
                                warn!(
                                    ?e,
                                    frame = frame_preview(&text),
                                    "unrecognized backend frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(?e, "backend channel error");
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }
    }
}

/// First characters of a frame, cut on a character boundary
fn frame_preview(text: &str) -> &str {
    match text.char_indices().nth(FRAME_PREVIEW_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::Language;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_intents_out_pushes_in() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(
                r#"{"event":"state_changed","data":{"state":"listening"}}"#.to_string(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text("garbage".to_string())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"speaking_done","data":{}}"#.to_string()))
                .await
                .unwrap();
            first.into_text().unwrap()
        });

        let (handle, mut pushes, _task) =
            connect(format!("ws://{addr}"), Duration::from_millis(50));
        handle.emit(ClientIntent::IdleSpeak { idioma: Language::En }).unwrap();

        let push = pushes.recv().await.unwrap();
        assert!(matches!(push, ServerPush::StateChanged { state: crate::state::State::Listening }));
        let push = pushes.recv().await.unwrap();
        assert!(matches!(push, ServerPush::SpeakingDone {}));

        let received = server.await.unwrap();
        assert_eq!(received, r#"{"event":"idle_speak","data":{"idioma":"en"}}"#);
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_handle() {
        let (handle, pushes, task) =
            connect("ws://127.0.0.1:1".to_string(), Duration::from_millis(10));
        drop(pushes);
        task.await.unwrap();
        assert!(matches!(
            handle.emit(ClientIntent::StopListening {}),
            Err(BackendError::Closed)
        ));
    }

    #[test]
    fn test_frame_preview_respects_char_boundaries() {
        let frame = format!("{}ñ tail", "x".repeat(99));
        let preview = frame_preview(&frame);
        assert_eq!(preview.chars().count(), 100);
        assert!(preview.ends_with('ñ'));

        assert_eq!(frame_preview("¡hola!"), "¡hola!");
    }

    #[tokio::test]
    async fn test_non_ascii_garbage_keeps_channel_alive() {
        // Log fields are only evaluated with a subscriber installed
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let garbage = format!("{}ñ tail", "x".repeat(99));
            ws.send(Message::Text(garbage)).await.unwrap();
            ws.send(Message::Text(r#"{"event":"speaking_done","data":{}}"#.to_string()))
                .await
                .unwrap();
            // Keep the socket open until the client has read both frames
            let _ = ws.next().await;
        });

        let (handle, mut pushes, task) =
            connect(format!("ws://{addr}"), Duration::from_millis(50));

        let push = tokio::time::timeout(Duration::from_secs(5), pushes.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(push, ServerPush::SpeakingDone {}));
        assert!(!task.is_finished());

        drop(handle);
        drop(pushes);
        let _ = server.await;
    }
}
