//! Native-messaging frames between the browser and the service.
//!
//! Every frame is a native-endian `u32` length followed by that many bytes of
//! UTF-8 JSON.

use async_trait::async_trait;
use drumline_core::dispatch::{Courier, Notifier};
use drumline_core::protocol::{Envelope, QueryResponse};
use drumline_core::{DrumlineError, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Largest inbound frame accepted
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// The active document changed
    Navigation { hostname: Option<String> },
    /// A message for the authority. The envelope is parsed by the event loop so
    /// a bad envelope can still be answered with its request id.
    Message {
        #[serde(rename = "requestId", default)]
        request_id: Option<u64>,
        envelope: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    Deliver {
        envelope: Envelope,
    },
    Response {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        body: QueryResponse,
    },
    Error {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        message: String,
    },
    Notify {
        title: String,
        message: String,
    },
}

/// Read one frame. `None` on a clean end of input.
///
/// An oversized frame is skipped and reported as a protocol error, so the
/// stream stays usable.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_ne_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        tokio::io::copy(&mut reader.take(len as u64), &mut tokio::io::sink()).await?;
        return Err(DrumlineError::Protocol(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| DrumlineError::Protocol(format!("frame of {} bytes is too large", body.len())))?;
    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Forward parsed inbound frames until end of input or until the receiver
/// goes away. Malformed frames are forwarded as errors.
pub async fn read_inbound<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Result<Inbound>>) {
    loop {
        let item = match read_frame(&mut reader).await {
            Ok(Some(body)) => serde_json::from_slice::<Inbound>(&body)
                .map_err(|e| DrumlineError::Protocol(format!("malformed frame: {}", e))),
            Ok(None) => {
                debug!("End of input");
                break;
            }
            Err(e) if e.kind() == ErrorKind::Protocol => Err(e),
            Err(e) => {
                error!("Failed to read from host: {}", e);
                break;
            }
        };
        if tx.send(item).await.is_err() {
            break;
        }
    }
}

/// Write outbound frames until every sender is dropped
pub async fn write_outbound<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(frame) = rx.recv().await {
        let body = match serde_json::to_vec(&frame) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to encode frame: {}", e);
                continue;
            }
        };
        if let Err(e) = write_frame(&mut writer, &body).await {
            error!("Failed to write to host: {}", e);
            break;
        }
    }
}

/// Courier and notifier backed by the outbound frame queue
#[derive(Clone)]
pub struct HostCourier {
    outbound: mpsc::Sender<Outbound>,
}

impl HostCourier {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self { outbound }
    }

    async fn send(&self, frame: Outbound) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| DrumlineError::Protocol("host output is closed".into()))
    }
}

#[async_trait]
impl Courier for HostCourier {
    async fn deliver(&self, envelope: Envelope) -> Result<()> {
        self.send(Outbound::Deliver { envelope }).await
    }
}

#[async_trait]
impl Notifier for HostCourier {
    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        self.send(Outbound::Notify {
            title: title.to_string(),
            message: message.to_string(),
        })
        .await
    }
}
