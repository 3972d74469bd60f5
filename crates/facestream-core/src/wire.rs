//! Facestream wire format: one transport message carries exactly one chunk.
//!
//! Both directions use the same layout:
//!
//! ```text
//! offset 0  : frame id, 36 bytes of hyphenated UUID text
//! offset 36 : chunk index, u32 big-endian
//! offset 40 : total chunks, u32 big-endian
//! offset 44 : payload (remainder of the message)
//! ```
//!
//! There is no length prefix: the transport's message boundary ends the
//! payload. Every field here is part of the protocol spoken by existing
//! clients, so the header must stay byte-compatible.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Width of the textual frame id token.
pub const FRAME_ID_LEN: usize = 36;

/// Fixed header length preceding every chunk payload.
pub const HEADER_LEN: usize = FRAME_ID_LEN + 4 + 4;

/// Default chunk payload size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default upper bound on a single transport message (header + payload).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

// ── Chunk Header ─────────────────────────────────────────────────────────────

/// On-wire chunk header.
///
/// Wire size: 44 bytes. Integers are big-endian regardless of host order.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct ChunkHeader {
    /// Frame id token shared by every chunk of one payload.
    pub frame_id: [u8; FRAME_ID_LEN],

    /// Zero-based position of this chunk's payload in the reassembled frame.
    pub index: U32<BigEndian>,

    /// Number of chunks the frame was split into. Never zero.
    pub total: U32<BigEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(ChunkHeader, [u8; HEADER_LEN]);

// ── Frame id ──────────────────────────────────────────────────────────────────

/// Fixed-width frame identifier.
///
/// Senders generate a random v4 UUID in its 36-character text form.
/// Receivers treat the token as opaque bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId([u8; FRAME_ID_LEN]);

impl FrameId {
    /// A fresh random frame id.
    pub fn generate() -> Self {
        let mut buf = [0u8; FRAME_ID_LEN];
        uuid::Uuid::new_v4().hyphenated().encode_lower(&mut buf);
        Self(buf)
    }

    pub const fn from_bytes(bytes: [u8; FRAME_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_ID_LEN] {
        &self.0
    }
}

impl From<uuid::Uuid> for FrameId {
    fn from(id: uuid::Uuid) -> Self {
        let mut buf = [0u8; FRAME_ID_LEN];
        id.hyphenated().encode_lower(&mut buf);
        Self(buf)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameId({})", self)
    }
}

// ── Chunk ─────────────────────────────────────────────────────────────────────

/// A decoded chunk. Invariant: `index < total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub frame_id: FrameId,
    pub index: u32,
    pub total: u32,
    pub payload: Bytes,
}

/// Build one wire message from its parts.
pub fn encode(frame_id: FrameId, index: u32, total: u32, payload: &[u8]) -> Result<Bytes, WireError> {
    if index >= total {
        return Err(WireError::IndexOutOfRange { index, total });
    }

    let header = ChunkHeader {
        frame_id: *frame_id.as_bytes(),
        index: U32::new(index),
        total: U32::new(total),
    };

    let mut message = Vec::with_capacity(HEADER_LEN + payload.len());
    message.extend_from_slice(header.as_bytes());
    message.extend_from_slice(payload);
    Ok(Bytes::from(message))
}

/// Parse one wire message. The payload is a zero-copy slice of `message`.
pub fn decode(message: Bytes) -> Result<Chunk, WireError> {
    let header = ChunkHeader::read_from_prefix(&message[..])
        .ok_or(WireError::MalformedChunk { len: message.len() })?;

    let index = header.index.get();
    let total = header.total.get();
    if index >= total {
        return Err(WireError::IndexOutOfRange { index, total });
    }

    Ok(Chunk {
        frame_id: FrameId::from_bytes(header.frame_id),
        index,
        total,
        payload: message.slice(HEADER_LEN..),
    })
}

// ── Chunk planning ────────────────────────────────────────────────────────────

/// Number of chunks needed for `len` bytes. An empty payload still occupies
/// one (empty) chunk so the receiver observes the frame.
pub fn chunk_count(len: usize, chunk_size: usize) -> Result<u32, WireError> {
    if chunk_size == 0 {
        return Err(WireError::ZeroChunkSize);
    }
    let count = len.div_ceil(chunk_size).max(1);
    u32::try_from(count).map_err(|_| WireError::TooManyChunks(count))
}

/// Check that a chunk of `chunk_size` payload bytes fits in one message.
pub fn check_chunk_size(chunk_size: usize, max_message_size: usize) -> Result<(), WireError> {
    if chunk_size == 0 {
        return Err(WireError::ZeroChunkSize);
    }
    let size = HEADER_LEN + chunk_size;
    if size > max_message_size {
        return Err(WireError::MessageTooLarge {
            size,
            max: max_message_size,
        });
    }
    Ok(())
}

/// Split `payload` into ordered chunk payloads of at most `chunk_size` bytes.
///
/// Slices share the payload's buffer. Deterministic: the same input always
/// yields the same split.
pub fn split_payload(payload: &Bytes, chunk_size: usize) -> Result<Vec<Bytes>, WireError> {
    let count = chunk_count(payload.len(), chunk_size)? as usize;
    let parts = (0..count)
        .map(|i| {
            let start = (i * chunk_size).min(payload.len());
            let end = (start + chunk_size).min(payload.len());
            payload.slice(start..end)
        })
        .collect();
    Ok(parts)
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when producing or interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed chunk: {len} bytes is shorter than the {}-byte header", HEADER_LEN)]
    MalformedChunk { len: usize },

    #[error("chunk index {index} out of range for {total} total chunks")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("chunk size must be non-zero")]
    ZeroChunkSize,

    #[error("message of {size} bytes exceeds maximum message size {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("payload needs {0} chunks, more than the index field can address")]
    TooManyChunks(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
