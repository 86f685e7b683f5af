//! Relay of a single compressed image over the command link.
//!
//! The link is shared with vehicle control traffic and has no bulk channel,
//! so the image is announced, described by a handshake, streamed as
//! numbered fixed-size chunks and closed by repeating the handshake. Only
//! the announce and handshake stages are acknowledged.

pub mod ack;
pub mod compress;
pub mod protocol;

pub use ack::AckWaiter;
pub use compress::{CompressedImage, compress_image};
pub use protocol::{ImageTransfer, TransferError, TransferReport, TransferStage, chunk_payload};
