use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::error::{ChannelError, Result};

/// Length prefix: 4-byte little-endian unsigned body length.
pub const PREFIX_SIZE: usize = 4;

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────┐
/// │ Length (4B)  │ Body            │
/// │ u32 LE       │ (Length bytes)  │
/// └──────────────┴─────────────────┘
/// ```
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(ChannelError::FrameTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(PREFIX_SIZE + body.len());
    dst.put_u32_le(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Decode the body length carried by a length prefix.
pub fn decode_prefix(prefix: [u8; PREFIX_SIZE]) -> usize {
    u32::from_le_bytes(prefix) as usize
}

/// Configuration for framed channels.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
