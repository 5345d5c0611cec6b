//! Bosswave out-of-band frame model, encoding and streaming decoding.
//!
//! This crate provides the low-level wire protocol used between a client and
//! a Bosswave router: the command set, KV metadata pairs, opaque routing and
//! payload objects, the immutable [`Frame`], and a decoder that pulls one
//! frame at a time out of a receive buffer.
//!
//! ## Wire Format
//!
//! ```text
//! +------------------------------------+---------------------------------+
//! | cmd(4) len(10) seq(10) \n          | header; len is written as zeros |
//! +------------------------------------+---------------------------------+
//! | kv <key> <n> \n <n bytes> \n       | zero or more metadata pairs     |
//! +------------------------------------+---------------------------------+
//! | ro <type> <n> \n <n bytes> \n      | zero or more routing objects    |
//! +------------------------------------+---------------------------------+
//! | po <a.b.c.d:num> <n> \n <n bytes>\n| zero or more payload objects    |
//! +------------------------------------+---------------------------------+
//! | end \n                             | terminator                      |
//! +------------------------------------+---------------------------------+
//! ```
//!
//! Item bodies are length-delimited, so they may contain any bytes,
//! including newlines and text that looks like a terminator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod object;

// Re-export main types
pub use codec::{is_valid_key, FrameBuilder};
pub use command::{Command, COMMAND_LEN};
pub use error::WireError;
pub use frame::{Frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, END_MARKER};
pub use object::{KvPair, PayloadObject, PayloadType, RoutingObject, RoutingType};
