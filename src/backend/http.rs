//! Request/response backend over HTTP

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::protocol::{ProcessReply, ProcessRequest};
use super::{Backend, BackendError};
use crate::speech::Utterance;

/// Backend reached through `POST {base}/procesar`
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/procesar", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn process(&self, text: &str) -> Result<Utterance, BackendError> {
        let request = ProcessRequest {
            texto: text.to_string(),
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let reply: ProcessReply = serde_json::from_slice(&body)?;
        debug!(?reply, "backend reply");

        Ok(reply.into_utterance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::Language;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one HTTP response and hand back the request body
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (body_tx, body_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];

            let request_body = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + content_length {
                        break text[split + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let _ = body_tx.send(request_body);

            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });

        (format!("http://{addr}"), body_rx)
    }

    #[tokio::test]
    async fn test_process_success() {
        let (base, request_body) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"mensaje":"¡Pizza en camino!","gesto":"feliz","idioma":"es"}"#,
        )
        .await;

        let backend = HttpBackend::new(&base, Duration::from_secs(5)).unwrap();
        let utterance = backend.process("hola dinner quiero pizza").await.unwrap();

        assert_eq!(utterance.text, "¡Pizza en camino!");
        assert_eq!(utterance.gesture.as_str(), "feliz");
        assert_eq!(utterance.language, Language::Es);
        assert_eq!(request_body.await.unwrap(), r#"{"texto":"hola dinner quiero pizza"}"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (base, _) = serve_once("HTTP/1.1 500 Internal Server Error", "{}").await;
        let backend = HttpBackend::new(&base, Duration::from_secs(5)).unwrap();

        let err = backend.process("dinner").await.unwrap_err();
        assert!(matches!(err, BackendError::Status(500)));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_error() {
        let (base, _) = serve_once("HTTP/1.1 200 OK", "not json").await;
        let backend = HttpBackend::new(&base, Duration::from_secs(5)).unwrap();

        let err = backend.process("dinner").await.unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            backend.process("dinner").await.unwrap_err(),
            BackendError::Http(_)
        ));
    }

    #[test]
    fn test_endpoint() {
        let backend = HttpBackend::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:5000/procesar");
    }
}
