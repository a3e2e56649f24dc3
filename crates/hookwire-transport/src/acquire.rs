use std::collections::HashMap;
use std::env::VarError;
use std::fs::File;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;

use tracing::debug;

use crate::error::{AcquireError, Result};
use crate::handle::ChannelHandle;

/// Variable the APT JSON hook protocol uses to pass the socket descriptor.
pub const DEFAULT_SOCKET_VAR: &str = "APT_HOOK_SOCKET";

/// Acquire the hook channel named by [`DEFAULT_SOCKET_VAR`] in `env`.
pub fn acquire(env: &HashMap<String, String>) -> Result<ChannelHandle> {
    acquire_with_var(env, DEFAULT_SOCKET_VAR)
}

/// Acquire the hook channel named by `var` in an injected environment.
pub fn acquire_with_var(env: &HashMap<String, String>, var: &str) -> Result<ChannelHandle> {
    let value = env
        .get(var)
        .ok_or_else(|| AcquireError::MissingVariable {
            var: var.to_string(),
        })?;
    let fd = parse_descriptor(var, value)?;
    duplicate(fd)
}

/// Acquire the hook channel named by `var` in the process environment.
pub fn acquire_from_process(var: &str) -> Result<ChannelHandle> {
    match std::env::var(var) {
        Ok(value) => {
            let fd = parse_descriptor(var, &value)?;
            duplicate(fd)
        }
        Err(VarError::NotPresent) => Err(AcquireError::MissingVariable {
            var: var.to_string(),
        }),
        Err(VarError::NotUnicode(raw)) => Err(AcquireError::InvalidDescriptor {
            var: var.to_string(),
            value: raw.to_string_lossy().into_owned(),
        }),
    }
}

fn parse_descriptor(var: &str, value: &str) -> Result<RawFd> {
    let invalid = || AcquireError::InvalidDescriptor {
        var: var.to_string(),
        value: value.to_string(),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    value.parse::<RawFd>().map_err(|_| invalid())
}

fn duplicate(fd: RawFd) -> Result<ChannelHandle> {
    // SAFETY: F_DUPFD_CLOEXEC only inspects the descriptor table; a closed or
    // out-of-range `fd` is reported as EBADF without touching memory.
    let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if dup < 0 {
        return Err(AcquireError::DuplicationFailed {
            fd,
            source: std::io::Error::last_os_error(),
        });
    }

    // SAFETY: `dup` was just returned by fcntl and nothing else owns it.
    let file = File::from(unsafe { OwnedFd::from_raw_fd(dup) });
    let metadata = file
        .metadata()
        .map_err(|source| AcquireError::DuplicationFailed { fd, source })?;
    if !metadata.file_type().is_socket() {
        return Err(AcquireError::NotASocket { fd });
    }

    debug!(source_fd = fd, fd = dup, "acquired hook channel");
    Ok(ChannelHandle::adopt(OwnedFd::from(file), fd))
}
