//! Inherited hook channel acquisition.
//!
//! A parent process hands a connected socket to a hook by exporting its
//! descriptor number in an environment variable. This crate resolves that
//! number, duplicates the descriptor and wraps the duplicate in an owned
//! [`ChannelHandle`] so the hook no longer depends on the original number.
//!
//! This is the lowest layer of hookwire. Everything else builds on top of
//! the [`ChannelHandle`] type provided here.

pub mod acquire;
pub mod error;
pub mod handle;

pub use acquire::{acquire, acquire_from_process, acquire_with_var, DEFAULT_SOCKET_VAR};
pub use error::{AcquireError, Result};
pub use handle::{ChannelHandle, Release};
