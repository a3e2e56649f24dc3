use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tracing::debug;

use crate::codec::{decode_prefix, FrameConfig, PREFIX_SIZE};
use crate::error::{ChannelError, Result, Section};

/// Reads complete frames from any `Read` stream.
///
/// Partial reads are handled internally, so callers always get complete frames.
/// Nothing past the end of a frame is ever consumed from the stream.
///
/// An error after part of a frame was consumed leaves the stream off a
/// frame boundary. Every later read then fails with
/// [`ChannelError::ReadFailed`] instead of parsing body bytes as a prefix.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
    desynchronized: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            config,
            desynchronized: false,
        }
    }

    /// Read the next complete frame body (blocking).
    ///
    /// Returns `Err(ChannelError::Closed)` when the peer closed the channel
    /// before sending any byte of a new frame.
    pub fn receive_frame(&mut self) -> Result<Bytes> {
        read_frame(
            &mut self.inner,
            self.config.max_frame_size,
            &mut self.desynchronized,
        )
    }

    /// Whether a partially consumed frame has left the stream unusable.
    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent reads.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Read exactly one frame from `reader`.
///
/// Sets `desynchronized` when an error leaves part of a frame consumed;
/// once set, no further bytes are read.
pub(crate) fn read_frame<R: Read>(
    reader: &mut R,
    max_frame_size: usize,
    desynchronized: &mut bool,
) -> Result<Bytes> {
    if *desynchronized {
        return Err(ChannelError::ReadFailed(std::io::Error::new(
            ErrorKind::InvalidData,
            "channel desynchronized by an earlier partial frame",
        )));
    }

    let mut consumed = 0usize;
    let result = read_aligned(reader, max_frame_size, &mut consumed);
    if result.is_err() && consumed > 0 {
        debug!(consumed, "frame boundary lost");
        *desynchronized = true;
    }
    result
}

fn read_aligned<R: Read>(
    reader: &mut R,
    max_frame_size: usize,
    consumed: &mut usize,
) -> Result<Bytes> {
    let mut prefix = [0u8; PREFIX_SIZE];
    match fill(reader, &mut prefix, consumed)? {
        0 => return Err(ChannelError::Closed),
        n if n < PREFIX_SIZE => {
            return Err(ChannelError::TruncatedRead {
                section: Section::Prefix,
                expected: PREFIX_SIZE,
                received: n,
            })
        }
        _ => {}
    }

    let len = decode_prefix(prefix);
    if len > max_frame_size {
        return Err(ChannelError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    let mut body = vec![0u8; len];
    let received = fill(reader, &mut body, consumed)?;
    if received < len {
        return Err(ChannelError::TruncatedRead {
            section: Section::Body,
            expected: len,
            received,
        });
    }

    debug!(len, "received frame");
    Ok(Bytes::from(body))
}

/// Fill `buf` until it is full or the stream reports end of file.
///
/// Returns the number of bytes placed in `buf`. `consumed` counts every
/// byte taken from the stream, including those of a failed call.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8], consumed: &mut usize) -> Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                *consumed += n;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                return Err(ChannelError::Timeout)
            }
            Err(err) => return Err(ChannelError::ReadFailed(err)),
        }
    }
    Ok(filled)
}
