use hookwire_frame::ChannelError;

/// Errors in the content or order of session messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A frame body is not a structured JSON object.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A well-formed message arrived where the protocol expects another.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// The parent offered a protocol version this hook does not speak.
    #[error("handshake mismatch: peer offered version {offered}, supported {min}..={max}")]
    HandshakeMismatch { offered: u64, min: u64, max: u64 },
}

impl ProtocolError {
    /// Classified name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::MalformedPayload(_) => "MalformedPayload",
            ProtocolError::UnexpectedMessage(_) => "UnexpectedMessage",
            ProtocolError::HandshakeMismatch { .. } => "HandshakeMismatch",
        }
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Frame-level error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Message-level error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
