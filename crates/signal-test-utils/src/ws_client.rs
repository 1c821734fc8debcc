//! JSON websocket client for E2E tests.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long `recv_*` waits for a frame.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Websocket client speaking JSON text frames.
pub struct TestWsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestWsClient {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self { stream })
    }

    pub async fn send_json(&mut self, value: &Value) -> Result<(), anyhow::Error> {
        self.send_text(&value.to_string()).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.stream.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Next text frame parsed as JSON. Fails on close or timeout.
    pub async fn recv_json(&mut self) -> Result<Value, anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for a frame"))?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Close(frame))) => {
                    anyhow::bail!("Connection closed: {:?}", frame)
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => anyhow::bail!("Transport error: {}", e),
                None => anyhow::bail!("Stream ended"),
            }
        }
    }

    /// Skip frames until one with `type == message_type` arrives.
    pub async fn recv_type(&mut self, message_type: &str) -> Result<Value, anyhow::Error> {
        loop {
            let value = self.recv_json().await?;
            if value["type"] == message_type {
                return Ok(value);
            }
        }
    }

    /// Read until the server closes. Returns the close code, if one was sent.
    pub async fn expect_close(&mut self) -> Result<Option<u16>, anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for close"))?;
            match frame {
                Some(Ok(Message::Close(frame))) => {
                    return Ok(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Fail if a text frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(window, self.stream.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => {
                anyhow::bail!("Expected silence, received: {}", text)
            }
            Ok(other) => anyhow::bail!("Expected silence, received: {:?}", other),
        }
    }

    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.stream.close(None).await?;
        Ok(())
    }
}
