//! Hook session protocol.
//!
//! This is the "just works" layer. Acquire the inherited channel, accept
//! the parent's handshake, hand every event message to a [`HookHandler`]
//! and report a classified [`Outcome`] once the parent closes the channel.

pub mod error;
pub mod handshake;
pub mod message;
pub mod report;
pub mod session;

pub use error::{ProtocolError, Result, SessionError};
pub use handshake::{
    accept_handshake, negotiate, Handshake, HandshakeConfig, CAPABILITIES_KEY, VERSION_KEY,
};
pub use message::{Message, EVENT_KEY};
pub use report::{
    conclude, run_hook, ChannelSource, HookConfig, HookError, Outcome, EXIT_FAILURE, EXIT_SUCCESS,
};
pub use session::{
    HookHandler, Session, SessionConfig, SessionState, SessionSummary, DEFAULT_TERMINATION_EVENT,
};
