//! Websocket transport for the realtime channel.
//!
//! A transport is a pair of text queues. The manager never touches the socket
//! directly, which keeps the protocol loop testable with in-memory links.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::shared::error::AppError;

/// Text frame queues of one open transport.
///
/// Dropping `outbound` closes the socket once queued frames are flushed.
/// `inbound` yields `None` once the socket is gone.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens transports.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<TransportLink, AppError>;
}

/// Build the engine URL for a websocket-only connection.
///
/// `https://host` with path `/socket.io/` becomes
/// `wss://host/socket.io/?EIO=4&transport=websocket`.
pub fn engine_url(endpoint: &str, path: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| AppError::Validation(format!("invalid realtime endpoint {endpoint}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AppError::Validation(format!(
                "unsupported realtime endpoint scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Validation(format!("cannot use scheme {scheme} for {endpoint}")))?;
    url.set_path(path);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");

    Ok(url)
}

/// tokio-tungstenite backed connector.
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn open(&self, url: &Url) -> Result<TransportLink, AppError> {
        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| AppError::Transport(format!("connecting to {} timed out", url.host_str().unwrap_or("?"))))?
                .map_err(|e| AppError::Transport(e.to_string()))?;

        tracing::debug!(host = ?url.host_str(), "Realtime websocket opened");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(error = %e, "Realtime websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Realtime websocket closed by server");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "Realtime websocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_url_from_https() {
        let url = engine_url("https://monitor.example.org", "/socket.io/").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://monitor.example.org/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_engine_url_keeps_port() {
        let url = engine_url("http://localhost:8000", "/socket.io/").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/socket.io/?EIO=4&transport=websocket");
    }

    #[test]
    fn test_engine_url_rejects_other_schemes() {
        assert!(engine_url("ftp://example.org", "/socket.io/").is_err());
        assert!(engine_url("not a url", "/socket.io/").is_err());
    }
}
