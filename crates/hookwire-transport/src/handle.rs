use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tracing::debug;

/// A resource that can be released exactly once.
pub trait Release {
    /// Release the resource.
    ///
    /// Returns `true` only on the call that actually released it; every
    /// later call is a no-op returning `false`.
    fn release(&mut self) -> bool;
}

/// Owned handle to the hook communication socket.
///
/// The handle always owns a descriptor private to this process (normally a
/// duplicate of the inherited one), so closing it never affects the
/// original descriptor number.
pub struct ChannelHandle {
    stream: Option<UnixStream>,
    fd: RawFd,
    source_fd: Option<RawFd>,
}

impl ChannelHandle {
    /// Wrap an already connected stream.
    pub fn from_stream(stream: UnixStream) -> Self {
        let fd = stream.as_raw_fd();
        Self {
            stream: Some(stream),
            fd,
            source_fd: None,
        }
    }

    /// Adopt a duplicated descriptor, remembering the number it came from.
    pub(crate) fn adopt(owned: OwnedFd, source_fd: RawFd) -> Self {
        let mut handle = Self::from_stream(UnixStream::from(owned));
        handle.source_fd = Some(source_fd);
        handle
    }

    /// Descriptor number owned by this handle, or `None` once released.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|_| self.fd)
    }

    /// Inherited descriptor number this handle was duplicated from.
    pub fn source_fd(&self) -> Option<RawFd> {
        self.source_fd
    }

    /// Whether the handle has been released.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Close the owned descriptor. Idempotent.
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                debug!(fd = self.fd, "closing hook channel");
                drop(stream);
                true
            }
            None => false,
        }
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream()?.set_read_timeout(timeout)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream()?.set_write_timeout(timeout)
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        let fd = self.raw_fd()?;

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open socket descriptor owned by this handle.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }

    fn stream(&self) -> io::Result<&UnixStream> {
        self.stream.as_ref().ok_or_else(closed_error)
    }

    fn stream_mut(&mut self) -> io::Result<&mut UnixStream> {
        self.stream.as_mut().ok_or_else(closed_error)
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "hook channel already released")
}

impl Release for ChannelHandle {
    fn release(&mut self) -> bool {
        self.close()
    }
}

impl Read for ChannelHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream_mut()?.read(buf)
    }
}

impl Write for ChannelHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream_mut()?.flush()
    }
}

impl From<UnixStream> for ChannelHandle {
    fn from(stream: UnixStream) -> Self {
        Self::from_stream(stream)
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("fd", &self.fd)
            .field("source_fd", &self.source_fd)
            .field("closed", &self.is_closed())
            .finish()
    }
}
