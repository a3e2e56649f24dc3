use std::fmt;

/// Part of a frame being transferred when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// The fixed-size length prefix.
    Prefix,
    /// The body that follows the prefix.
    Body,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Prefix => f.write_str("length prefix"),
            Section::Body => f.write_str("body"),
        }
    }
}

/// Errors that can occur while receiving or sending frames.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed the channel on a frame boundary.
    ///
    /// This is the normal end of a hook invocation, not a failure.
    #[error("channel closed")]
    Closed,

    /// The peer closed the channel in the middle of a frame.
    #[error("channel closed after {received} of {expected} {section} bytes")]
    TruncatedRead {
        section: Section,
        expected: usize,
        received: usize,
    },

    /// Reading from the channel failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Writing to the channel failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The channel deadline elapsed before the frame was transferred.
    #[error("channel operation timed out")]
    Timeout,
}

impl ChannelError {
    /// Classified name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelError::Closed => "Closed",
            ChannelError::TruncatedRead { .. } => "TruncatedRead",
            ChannelError::ReadFailed(_) => "ReadFailed",
            ChannelError::WriteFailed(_) => "WriteFailed",
            ChannelError::FrameTooLarge { .. } => "FrameTooLarge",
            ChannelError::Timeout => "Timeout",
        }
    }

    /// Whether this is the clean end-of-channel signal.
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
