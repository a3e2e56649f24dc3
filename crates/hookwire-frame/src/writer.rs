use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{ChannelError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// A failure after part of a frame reached the stream poisons the writer:
/// later sends fail with [`ChannelError::WriteFailed`].
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    desynchronized: bool,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            desynchronized: false,
        }
    }

    /// Write the prefix and the full body (blocking).
    pub fn send_frame(&mut self, body: &[u8]) -> Result<()> {
        write_frame(
            &mut self.inner,
            &mut self.buf,
            body,
            self.config.max_frame_size,
            &mut self.desynchronized,
        )
    }

    /// Whether a partially written frame has left the stream unusable.
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent writes.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Encode `body` into `buf` and write the whole frame to `writer`.
///
/// Sets `desynchronized` when the frame fails after some of its bytes were
/// written; once set, nothing more is written.
pub(crate) fn write_frame<W: Write>(
    writer: &mut W,
    buf: &mut BytesMut,
    body: &[u8],
    max_frame_size: usize,
    desynchronized: &mut bool,
) -> Result<()> {
    if *desynchronized {
        return Err(ChannelError::WriteFailed(std::io::Error::new(
            ErrorKind::InvalidData,
            "channel desynchronized by an earlier partial frame",
        )));
    }
    if body.len() > max_frame_size {
        return Err(ChannelError::FrameTooLarge {
            size: body.len(),
            max: max_frame_size,
        });
    }

    buf.clear();
    encode_frame(body, buf)?;

    let mut offset = 0usize;
    if let Err(err) = write_all(writer, buf, &mut offset) {
        if offset > 0 {
            debug!(written = offset, "frame boundary lost");
            *desynchronized = true;
        }
        return Err(err);
    }

    flush(writer)?;
    debug!(len = body.len(), "sent frame");
    Ok(())
}

fn write_all<W: Write>(writer: &mut W, buf: &[u8], offset: &mut usize) -> Result<()> {
    while *offset < buf.len() {
        match writer.write(&buf[*offset..]) {
            Ok(0) => {
                return Err(ChannelError::WriteFailed(std::io::Error::from(
                    ErrorKind::WriteZero,
                )))
            }
            Ok(n) => *offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => return Err(ChannelError::Timeout),
            Err(err) => return Err(ChannelError::WriteFailed(err)),
        }
    }
    Ok(())
}

fn flush<W: Write>(writer: &mut W) -> Result<()> {
    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => return Err(ChannelError::Timeout),
            Err(err) => return Err(ChannelError::WriteFailed(err)),
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_frame(b"hello").unwrap();

        assert_eq!(written(writer), b"\x05\x00\x00\x00hello");
    }

    #[test]
    fn write_multiple_frames_decode_in_order() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_frame(b"one").unwrap();
        writer.send_frame(b"two").unwrap();

        let mut reader = FrameReader::new(Cursor::new(written(writer)));
        assert_eq!(reader.receive_frame().unwrap().as_ref(), b"one");
        assert_eq!(reader.receive_frame().unwrap().as_ref(), b"two");
    }

    #[test]
    fn oversized_body_rejected_without_writing() {
        let cfg = FrameConfig {
            max_frame_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send_frame(b"oversized").unwrap_err();
        assert!(matches!(err, ChannelError::FrameTooLarge { size: 9, max: 4 }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn partial_writes_complete_the_frame() {
        let mut writer = FrameWriter::new(OneByteWriter::default());
        writer.send_frame(b"trickle").unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data, b"\x07\x00\x00\x00trickle");
        assert_eq!(inner.calls, 4 + 7);
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send_frame(b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send_frame(b"retry").unwrap();

        assert_eq!(writer.into_inner().data, b"\x05\x00\x00\x00retry");
    }

    #[test]
    fn zero_length_write_is_write_failed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send_frame(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::WriteFailed(e) if e.kind() == ErrorKind::WriteZero));
    }

    #[test]
    fn would_block_write_is_timeout() {
        let mut writer = FrameWriter::new(WouldBlockWriter);
        assert!(matches!(
            writer.send_frame(b"x"),
            Err(ChannelError::Timeout)
        ));
    }

    #[test]
    fn failure_mid_frame_poisons_writer() {
        let mut writer = FrameWriter::new(StallAfter {
            limit: 3,
            data: Vec::new(),
        });

        assert!(matches!(writer.send_frame(b"hello"), Err(ChannelError::Timeout)));
        assert!(writer.is_desynchronized());

        writer.get_mut().limit = usize::MAX;
        let err = writer.send_frame(b"next").unwrap_err();
        assert!(matches!(err, ChannelError::WriteFailed(ref e) if e.kind() == ErrorKind::InvalidData));
        assert_eq!(writer.into_inner().data, b"\x05\x00\x00");
    }

    #[test]
    fn timeout_before_any_byte_keeps_writer_usable() {
        let mut writer = FrameWriter::new(StallAfter {
            limit: 0,
            data: Vec::new(),
        });

        assert!(matches!(writer.send_frame(b"x"), Err(ChannelError::Timeout)));
        assert!(!writer.is_desynchronized());

        writer.get_mut().limit = usize::MAX;
        writer.send_frame(b"x").unwrap();
        assert_eq!(writer.into_inner().data, b"\x01\x00\x00\x00x");
    }

    #[test]
    fn write_to_closed_peer_fails() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(right);

        let mut writer = FrameWriter::new(left);
        let err = writer.send_frame(b"nobody listening").unwrap_err();
        assert!(matches!(err, ChannelError::WriteFailed(_)));
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mut writer = FrameWriter::new(left);
        writer.send_frame(b"{\"ack\":true}").unwrap();
        drop(writer);

        let mut raw = Vec::new();
        right.read_to_end(&mut raw).unwrap();
        assert_eq!(&raw[..4], &[12, 0, 0, 0]);
        assert_eq!(&raw[4..], b"{\"ack\":true}");
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.set_max_frame_size(8);
        assert_eq!(writer.config().max_frame_size, 8);

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _inner = writer.into_inner();
    }

    #[derive(Default)]
    struct OneByteWriter {
        data: Vec<u8>,
        calls: usize,
    }

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match buf.first() {
                Some(byte) => {
                    self.data.push(*byte);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct WouldBlockWriter;

    impl Write for WouldBlockWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Accepts one byte per call until `limit` bytes, then times out.
    struct StallAfter {
        limit: usize,
        data: Vec<u8>,
    }

    impl Write for StallAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.data.len() >= self.limit || buf.is_empty() {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
