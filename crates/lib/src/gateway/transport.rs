//! Transport seam between the connection manager and the WebSocket library.
//!
//! A [`Connector`] opens one connection and hands back a [`Transport`]: a sender
//! for outbound text frames and a receiver of [`TransportEvent`]s. Dropping the
//! outbound sender closes the connection.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// What the connection reports to its reader.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// A read or write failed; a `Closed` follows.
    Failed(String),
    /// The connection is gone. Always the last event.
    Closed { code: Option<u16>, reason: String },
}

/// An open connection.
pub struct Transport {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid gateway url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("gateway token is not a valid header value")]
    InvalidToken,
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Opens transport connections. The token must be bound to the connection at handshake time.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str, token: &str) -> Result<Transport, TransportError>;
}

/// WebSocket connector (tokio-tungstenite). A non-empty token is sent as `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str, token: &str) -> Result<Transport, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|source| TransportError::InvalidUrl {
                url: url.to_string(),
                source,
            })?;
        let token = token.trim();
        if !token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| TransportError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (mut sink, mut stream) = ws.split();
            let (code, reason) = loop {
                tokio::select! {
                    out = out_rx.recv() => {
                        let Some(text) = out else {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client disconnect".into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            break (Some(1000), "client disconnect".to_string());
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            let _ = in_tx.send(TransportEvent::Failed(e.to_string()));
                            break (None, e.to_string());
                        }
                    }
                    msg = stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = in_tx.send(TransportEvent::Frame(text));
                            }
                            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                                Ok(text) => {
                                    let _ = in_tx.send(TransportEvent::Frame(text));
                                }
                                Err(_) => log::debug!("dropping non-utf8 binary gateway frame"),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                // Flushes the close reply tungstenite queued on read.
                                let _ = sink.close().await;
                                break match frame {
                                    Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                                    None => (None, String::new()),
                                };
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = in_tx.send(TransportEvent::Failed(e.to_string()));
                                break (None, e.to_string());
                            }
                            None => break (None, String::new()),
                        }
                    }
                }
            };
            let _ = in_tx.send(TransportEvent::Closed { code, reason });
        });

        Ok(Transport {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
