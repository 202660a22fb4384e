//! WebSocket transport
//!
//! Authenticates with an `Authorization: Bearer` header on the upgrade
//! request. A 401/403 handshake response is an authentication failure.

use async_trait::async_trait;
use futures::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue, StatusCode},
        Message,
    },
};

use quill_shared::{Credential, SyncError, SyncResult};

use super::{Channel, Transport};
use crate::protocol::OutboundRequest;

#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, credential: &Credential) -> SyncResult<Channel> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Transport(format!("Invalid channel URL: {}", e)))?;
        let header = HeaderValue::from_str(&credential.authorization_header()).map_err(|_| {
            SyncError::Authentication("credential is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, header);

        tracing::info!(url = %self.url, "Opening notification channel");
        let (stream, _response) = connect_async(request)
            .await
            .map_err(classify_handshake_error)?;
        let (mut sink, mut source) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundRequest>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        // Writer: ends when the session drops its sender
        tokio::spawn(async move {
            while let Some(request) = outbound_rx.recv().await {
                match request.encode() {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            break; // Connection closed
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize outbound request");
                    }
                }
            }
            let _ = sink.close().await;
        });

        // Reader: ends on close, on error, or when the session stops listening
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!(frame = ?frame, "Notification channel closed by server");
                        break;
                    }
                    Ok(_) => {} // Ping/pong handled by tungstenite, binary ignored
                    Err(e) => {
                        tracing::warn!(error = %e, "Notification channel read failed");
                        break;
                    }
                }
            }
        });

        Ok(Channel::new(outbound_tx, inbound_rx))
    }
}

/// Split handshake failures into terminal auth rejections and retryable transport errors
fn classify_handshake_error(err: tungstenite::Error) -> SyncError {
    match &err {
        tungstenite::Error::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            SyncError::Authentication(format!("handshake rejected with {}", response.status()))
        }
        _ => SyncError::Transport(err.to_string()),
    }
}
