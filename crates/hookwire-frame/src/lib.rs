//! Length-prefixed message framing for hook channels.
//!
//! Every frame on the wire is a 4-byte little-endian body length followed
//! by exactly that many body bytes. Socket reads and writes may transfer
//! fewer bytes than requested; this crate turns them into all-or-nothing
//! frame operations.
//!
//! No partial frames, no buffer management in user code.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::FramedChannel;
pub use codec::{decode_prefix, encode_frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, PREFIX_SIZE};
pub use error::{ChannelError, Result, Section};
pub use reader::FrameReader;
pub use writer::FrameWriter;
