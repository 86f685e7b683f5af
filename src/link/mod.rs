//! Connection to the flight controller.
//!
//! `VehicleLink` is the capability the rest of the crate programs against.
//! `UdpLink` speaks the framed binary protocol in [`codec`] over UDP; tests
//! use an in-memory mock.

pub mod codec;
pub mod commands;
pub mod messages;
pub mod udp;
pub mod vehicle;

#[cfg(test)]
pub(crate) mod mock;

pub use codec::{CodecError, decode, encode};
pub use commands::{VehicleCommand, install_command_listener};
pub use messages::{LinkMessage, TransferHandshake};
pub use udp::UdpLink;
pub use vehicle::{ListenerId, ListenerRegistry, MessageCallback, MessagePredicate, VehicleLink};
