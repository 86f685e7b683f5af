//! Messages exchanged with the flight controller.
//!
//! Message and command identifiers follow the autopilot's numbering for the
//! equivalent messages so that a ground station can decode the traffic.

use crate::telemetry::TelemetrySnapshot;

pub const MSG_TELEMETRY: u16 = 33;
pub const MSG_COMMAND: u16 = 76;
pub const MSG_COMMAND_ACK: u16 = 77;
pub const MSG_TRANSFER_HANDSHAKE: u16 = 130;
pub const MSG_ENCAPSULATED_DATA: u16 = 131;
pub const MSG_STATUS_TEXT: u16 = 253;
pub const MSG_IMAGE_CAPTURED: u16 = 263;

/// Custom command: switch flight state, `param1` is the state ordinal.
pub const CMD_SET_FLIGHT_MODE: u16 = 31010;
/// Custom command: drive the status indicator, opaque to this crate.
pub const CMD_SET_INDICATOR: u16 = 31011;
/// Custom command: relay the most recent image.
pub const CMD_REQUEST_IMAGE_RELAY: u16 = 31012;

/// Ack result meaning "accepted".
pub const ACK_ACCEPTED: u8 = 0;

/// Bytes of image payload per encapsulated data message.
pub const CHUNK_SIZE: usize = 253;

/// Header announcing (and closing) an image transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHandshake {
    /// Total payload size in bytes, before padding.
    pub size: u32,
    pub width: u16,
    pub height: u16,
    /// Number of data messages that follow.
    pub packets: u16,
    /// Payload bytes per data message.
    pub payload: u8,
    pub jpg_quality: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkMessage {
    /// Position and attitude from the autopilot.
    Telemetry(TelemetrySnapshot),
    /// Command addressed to the companion computer.
    Command { command: u16, param1: f32 },
    /// Acknowledgement of a command or of a transfer stage.
    CommandAck { command: u16, result: u8 },
    /// Free-form status line for the ground station.
    StatusText(String),
    /// A new image is about to be relayed.
    ImageCaptured { sequence_number: u64, timestamp_ms: u64 },
    TransferHandshake(TransferHandshake),
    /// One numbered chunk of the image, sequence numbers start at 1.
    EncapsulatedData { seqnr: u16, data: Vec<u8> },
}

impl LinkMessage {
    pub fn id(&self) -> u16 {
        match self {
            LinkMessage::Telemetry(_) => MSG_TELEMETRY,
            LinkMessage::Command { .. } => MSG_COMMAND,
            LinkMessage::CommandAck { .. } => MSG_COMMAND_ACK,
            LinkMessage::StatusText(_) => MSG_STATUS_TEXT,
            LinkMessage::ImageCaptured { .. } => MSG_IMAGE_CAPTURED,
            LinkMessage::TransferHandshake(_) => MSG_TRANSFER_HANDSHAKE,
            LinkMessage::EncapsulatedData { .. } => MSG_ENCAPSULATED_DATA,
        }
    }

    /// True for an acknowledgement carrying `command`.
    pub fn is_ack_for(&self, command: u16) -> bool {
        matches!(self, LinkMessage::CommandAck { command: c, .. } if *c == command)
    }
}
