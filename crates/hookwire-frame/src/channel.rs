use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use hookwire_transport::ChannelHandle;

use crate::codec::FrameConfig;
use crate::error::{ChannelError, Result};
use crate::reader::read_frame;
use crate::writer::write_frame;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// A bidirectional framed channel over a single stream.
///
/// The hook side owns exactly one descriptor, so unlike a
/// [`FrameReader`](crate::FrameReader)/[`FrameWriter`](crate::FrameWriter)
/// pair this type never needs to clone the stream.
///
/// Reads and writes track frame boundaries independently. After a failure
/// in the middle of a frame that direction keeps failing.
pub struct FramedChannel<T> {
    inner: T,
    write_buf: BytesMut,
    config: FrameConfig,
    read_desynchronized: bool,
    write_desynchronized: bool,
}

impl<T: Read + Write> FramedChannel<T> {
    /// Create a framed channel with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a framed channel with explicit configuration.
    ///
    /// Timeouts in `config` are not applied to `inner`; see
    /// [`FramedChannel::with_config_handle`].
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            read_desynchronized: false,
            write_desynchronized: false,
        }
    }

    /// Receive one complete frame body.
    pub fn receive_frame(&mut self) -> Result<Bytes> {
        read_frame(
            &mut self.inner,
            self.config.max_frame_size,
            &mut self.read_desynchronized,
        )
    }

    /// Send one complete frame.
    pub fn send_frame(&mut self, body: &[u8]) -> Result<()> {
        write_frame(
            &mut self.inner,
            &mut self.write_buf,
            body,
            self.config.max_frame_size,
            &mut self.write_desynchronized,
        )
    }

    /// Whether an earlier partial frame has left either direction unusable.
    pub fn is_desynchronized(&self) -> bool {
        self.read_desynchronized || self.write_desynchronized
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the channel and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent reads and writes.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current channel configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FramedChannel<ChannelHandle> {
    /// Create a framed channel over a hook handle and apply the configured
    /// socket timeouts.
    pub fn with_config_handle(handle: ChannelHandle, config: FrameConfig) -> Result<Self> {
        handle
            .set_read_timeout(config.read_timeout)
            .map_err(ChannelError::ReadFailed)?;
        handle
            .set_write_timeout(config.write_timeout)
            .map_err(ChannelError::WriteFailed)?;
        Ok(Self::with_config(handle, config))
    }
}
