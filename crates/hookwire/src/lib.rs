//! Client side of APT-style JSON hooks.
//!
//! A parent process hands a connected socket to a hook through an
//! environment variable (`APT_HOOK_SOCKET`). hookwire picks that descriptor
//! up, speaks length-prefixed JSON frames over it and reports a classified
//! outcome when the parent is done.
//!
//! # Crate Structure
//!
//! - [`transport`]: descriptor acquisition and the owned channel handle
//! - [`frame`]: exact-length frame reader and writer
//! - [`session`]: handshake, event loop and outcome reporting
//!
//! Most hooks only need [`session::run_hook`]:
//!
//! ```no_run
//! use hookwire::session::{run_hook, ChannelSource, HookConfig, Message};
//!
//! let mut handler = |message: &Message| -> Option<Message> {
//!     eprintln!("event: {:?}", message.event());
//!     None
//! };
//! let outcome = run_hook(&ChannelSource::Process, &HookConfig::default(), &mut handler);
//! std::process::exit(outcome.exit_code());
//! ```

/// Re-export transport types.
pub mod transport {
    pub use hookwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use hookwire_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use hookwire_session::*;
}
