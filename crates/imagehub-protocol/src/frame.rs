//! Length-prefixed frames carried over a byte stream.
//!
//! Layout: `magic (4) | version (u16 LE) | kind (u8) | length (u32 LE) | payload`.
//! `Chunk` payloads are raw bytes, `End` is empty, every other kind carries
//! JSON.

use crate::{Call, CloneResponse, Credentials, Metadata, PushRequest, Reply, Status};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAGIC: &[u8; 4] = b"IMGH";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 4;
/// Upper bound on a single frame payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Call = 1,
    Metadata = 2,
    Info = 3,
    Chunk = 4,
    Reply = 5,
    Status = 6,
    End = 7,
}

impl FrameKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(FrameKind::Call),
            2 => Some(FrameKind::Metadata),
            3 => Some(FrameKind::Info),
            4 => Some(FrameKind::Chunk),
            5 => Some(FrameKind::Reply),
            6 => Some(FrameKind::Status),
            7 => Some(FrameKind::End),
            _ => None,
        }
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opens an exchange.
    Call(Call),
    /// Clone metadata, always before the first chunk.
    Metadata(Metadata),
    /// Push credentials, always before the first chunk.
    Info(Credentials),
    /// Package bytes.
    Chunk(Bytes),
    /// Final answer of a unary or client-streaming exchange.
    Reply(Reply),
    /// Protocol-level failure; terminal.
    Status(Status),
    /// The sender has no more items for this exchange.
    End,
}

impl Frame {
    /// Short frame name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Call(_) => "call",
            Frame::Metadata(_) => "metadata",
            Frame::Info(_) => "info",
            Frame::Chunk(_) => "chunk",
            Frame::Reply(_) => "reply",
            Frame::Status(_) => "status",
            Frame::End => "end",
        }
    }

    fn kind(&self) -> FrameKind {
        match self {
            Frame::Call(_) => FrameKind::Call,
            Frame::Metadata(_) => FrameKind::Metadata,
            Frame::Info(_) => FrameKind::Info,
            Frame::Chunk(_) => FrameKind::Chunk,
            Frame::Reply(_) => FrameKind::Reply,
            Frame::Status(_) => FrameKind::Status,
            Frame::End => FrameKind::End,
        }
    }

    fn payload(&self) -> Result<Vec<u8>, FrameError> {
        let payload = match self {
            Frame::Call(call) => serde_json::to_vec(call)?,
            Frame::Metadata(metadata) => serde_json::to_vec(metadata)?,
            Frame::Info(credentials) => serde_json::to_vec(credentials)?,
            Frame::Chunk(data) => data.to_vec(),
            Frame::Reply(reply) => serde_json::to_vec(reply)?,
            Frame::Status(status) => serde_json::to_vec(status)?,
            Frame::End => Vec::new(),
        };
        Ok(payload)
    }

    fn decode(kind: FrameKind, payload: Vec<u8>) -> Result<Self, FrameError> {
        let frame = match kind {
            FrameKind::Call => Frame::Call(from_json(&payload)?),
            FrameKind::Metadata => Frame::Metadata(from_json(&payload)?),
            FrameKind::Info => Frame::Info(from_json(&payload)?),
            FrameKind::Chunk => Frame::Chunk(Bytes::from(payload)),
            FrameKind::Reply => Frame::Reply(from_json(&payload)?),
            FrameKind::Status => Frame::Status(from_json(&payload)?),
            FrameKind::End => Frame::End,
        };
        Ok(frame)
    }
}

fn from_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    Ok(serde_json::from_slice(payload)?)
}

impl From<PushRequest> for Frame {
    fn from(request: PushRequest) -> Self {
        match request {
            PushRequest::Info(credentials) => Frame::Info(credentials),
            PushRequest::Chunk(data) => Frame::Chunk(data),
        }
    }
}

impl TryFrom<Frame> for PushRequest {
    type Error = FrameError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame {
            Frame::Info(credentials) => Ok(PushRequest::Info(credentials)),
            Frame::Chunk(data) => Ok(PushRequest::Chunk(data)),
            other => Err(FrameError::Unexpected {
                expected: "info or chunk",
                got: other.name(),
            }),
        }
    }
}

impl From<CloneResponse> for Frame {
    fn from(response: CloneResponse) -> Self {
        match response {
            CloneResponse::Metadata(metadata) => Frame::Metadata(metadata),
            CloneResponse::Chunk(data) => Frame::Chunk(data),
        }
    }
}

impl TryFrom<Frame> for CloneResponse {
    type Error = FrameError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame {
            Frame::Metadata(metadata) => Ok(CloneResponse::Metadata(metadata)),
            Frame::Chunk(data) => Ok(CloneResponse::Chunk(data)),
            other => Err(FrameError::Unexpected {
                expected: "metadata or chunk",
                got: other.name(),
            }),
        }
    }
}

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reading or writing the underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A message payload is not valid JSON for its kind.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The header does not start with `IMGH`.
    #[error("bad frame magic")]
    BadMagic,

    /// The peer speaks another protocol version.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    /// The kind byte names no known frame.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    /// The payload is larger than [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds the limit")]
    TooLarge(usize),

    /// EOF after a partial header or payload.
    #[error("stream closed in the middle of a frame")]
    Truncated,

    /// A valid frame arrived where another kind was required.
    #[error("unexpected {got} frame, expected {expected}")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },
}

pub type FrameResult<T> = Result<T, FrameError>;

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> FrameResult<()> {
    let payload = frame.payload()?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.push(frame.kind() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);

    writer.write_all(&buf).await?;
    Ok(())
}

/// Read one frame; `Ok(None)` when the peer closed cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> FrameResult<Option<Frame>> {
    let mut header = [0u8; HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    read_exact_or_truncated(reader, &mut header[1..]).await?;

    if &header[0..4] != MAGIC {
        return Err(FrameError::BadMagic);
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(FrameError::UnsupportedVersion(version));
    }
    let kind = FrameKind::from_u8(header[6]).ok_or(FrameError::UnknownKind(header[6]))?;
    let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len];
    read_exact_or_truncated(reader, &mut payload).await?;

    Frame::decode(kind, payload).map(Some)
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> FrameResult<()> {
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(err) => Err(err.into()),
    }
}
