//! Network Module
//!
//! Handles TCP communication between nodes.

mod client;
mod server;
#[cfg(test)]
pub(crate) mod loopback;

pub use client::NetworkClient;
pub use server::{NetworkServer, RequestHandler};

use std::time::Duration;

use crate::error::{Error, Result};
use crate::replication::{FrameHeader, Message};

/// Largest frame body accepted from the wire
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

/// Capability to call a peer's RPCs at a given address
///
/// Every call carries its own deadline and is never retried.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `message` to `address` and wait for the reply
    async fn call(&self, address: &str, message: Message, deadline: Duration) -> Result<Message>;
}

/// Read a framed message from a reader
pub async fn read_message<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    use tokio::io::AsyncReadExt;

    // Read header
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);

    if header.length > MAX_FRAME_SIZE {
        return Err(Error::Network(format!(
            "Frame of {} bytes exceeds limit of {} bytes",
            header.length, MAX_FRAME_SIZE
        )));
    }

    // Read body
    let mut body = vec![0u8; header.length as usize];
    reader.read_exact(&mut body).await?;

    // Verify checksum
    let computed_checksum = crc32fast::hash(&body);
    if computed_checksum != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    // Deserialize
    let message = Message::deserialize(&body)?;
    Ok(message)
}

/// Check an outgoing body against the frame limit
fn frame_length(len: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(length) if length <= MAX_FRAME_SIZE => Ok(length),
        _ => Err(Error::Internal(format!(
            "Frame of {} bytes exceeds limit of {} bytes",
            len, MAX_FRAME_SIZE
        ))),
    }
}

/// Write a framed message to a writer
pub async fn write_message<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let body = message.serialize()?;
    frame_length(body.len())?;
    let header = FrameHeader::new(&body);

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}
