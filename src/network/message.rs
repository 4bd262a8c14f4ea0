//! Wire messages: one JSON object per line.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::network::TransportError;

/// Upper bound on a single encoded message, newline included.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Address and endpoint of a peer as exchanged on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: Address,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Ping {
        from: Address,
        endpoint: String,
        version: String,
    },
    Pong {
        from: Address,
        endpoint: String,
    },
    FindNode {
        from: Address,
        target: Address,
    },
    Neighbours {
        peers: Vec<PeerRecord>,
    },
    Error {
        reason: String,
    },
}

impl Message {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::FindNode { .. } => "find_node",
            Message::Neighbours { .. } => "neighbours",
            Message::Error { .. } => "error",
        }
    }
}

/// Read one message. `Ok(None)` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader)
        .take(MAX_FRAME_LEN as u64)
        .read_line(&mut line)
        .await
        .map_err(TransportError::Io)?;

    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') && n >= MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(MAX_FRAME_LEN));
    }

    let message = serde_json::from_str(line.trim_end()).map_err(TransportError::Codec)?;
    Ok(Some(message))
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(message).map_err(TransportError::Codec)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await.map_err(TransportError::Io)?;
    writer.flush().await.map_err(TransportError::Io)
}
