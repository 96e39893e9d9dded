//! Sampler-side link to the consumer's listening endpoint.

use super::codec::{decode_frame, encode_message, FrameError, WireMessage};
use anyhow::{Context, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

pub struct SamplerLink {
    sink: WsSink,
}

/// Resolves when the consumer side of the link is gone
pub type LinkClosed = oneshot::Receiver<()>;

impl SamplerLink {
    /// Connect to `ws://127.0.0.1:{port}`, retrying with backoff
    pub async fn connect(port: u16, retries: u32) -> Result<(Self, LinkClosed)> {
        Self::connect_url(&format!("ws://127.0.0.1:{}", port), retries).await
    }

    pub async fn connect_url(url: &str, retries: u32) -> Result<(Self, LinkClosed)> {
        let mut backoff = Duration::from_millis(250);
        let mut attempt = 0;

        let ws = loop {
            attempt += 1;
            match tokio_tungstenite::connect_async(url).await {
                Ok((ws, _)) => break ws,
                Err(e) if attempt <= retries => {
                    tracing::warn!("Connecting to {} failed (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("Could not connect to {}", url)));
                }
            }
        };
        tracing::info!("Connected to consumer at {}", url);

        let (sink, mut stream) = ws.split();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match decode_frame(text.as_str()) {
                        Err(FrameError::Heartbeat) => tracing::trace!("Heartbeat received"),
                        other => tracing::debug!("Ignoring consumer frame: {:?}", other),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Link read failed: {}", e);
                        break;
                    }
                }
            }
            let _ = closed_tx.send(());
        });

        Ok((Self { sink }, closed_rx))
    }

    pub async fn send(&mut self, message: &WireMessage) -> Result<()> {
        let frame = encode_message(message).context("Failed to encode message")?;
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .context("Failed to send frame")
    }

    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!("Closing link failed: {}", e);
        }
    }
}
