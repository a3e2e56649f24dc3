use std::os::fd::RawFd;

/// Errors that can occur while acquiring the inherited hook channel.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// The environment variable naming the descriptor is not set.
    #[error("environment variable {var} is not set")]
    MissingVariable { var: String },

    /// The variable is set but does not hold a non-negative descriptor number.
    #[error("environment variable {var} does not hold a descriptor number: {value:?}")]
    InvalidDescriptor { var: String, value: String },

    /// Duplicating the inherited descriptor failed.
    #[error("failed to duplicate descriptor {fd}: {source}")]
    DuplicationFailed {
        fd: RawFd,
        source: std::io::Error,
    },

    /// The descriptor is open but does not refer to a socket.
    #[error("descriptor {fd} is not a socket")]
    NotASocket { fd: RawFd },
}

impl AcquireError {
    /// Classified name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireError::MissingVariable { .. } => "MissingVariable",
            AcquireError::InvalidDescriptor { .. } => "InvalidDescriptor",
            AcquireError::DuplicationFailed { .. } => "DuplicationFailed",
            AcquireError::NotASocket { .. } => "NotASocket",
        }
    }
}

pub type Result<T> = std::result::Result<T, AcquireError>;
