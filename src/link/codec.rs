//! Binary framing for `LinkMessage`.
//!
//! ```text
//! +------+---------+---------+-----------------+---------+
//! | 0xFD | id u16  | len u16 | payload (len)   | crc u16 |
//! +------+---------+---------+-----------------+---------+
//! ```
//! All integers little-endian. The checksum is CRC-16/MCRF4XX (the
//! autopilot's X.25 variant) over id, length and payload.

use thiserror::Error;

use crate::telemetry::TelemetrySnapshot;

use super::messages::*;

pub const FRAME_MAGIC: u8 = 0xFD;
pub const HEADER_LEN: usize = 5;
pub const CRC_LEN: usize = 2;
/// Largest frame the link will ever carry.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + u16::MAX as usize + CRC_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("bad frame magic 0x{0:02X}")]
    BadMagic(u8),

    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{got:04X}")]
    Checksum { expected: u16, got: u16 },

    #[error("unknown message id {0}")]
    UnknownMessage(u16),

    #[error("payload of message {id} has {len} bytes, expected {expected}")]
    PayloadLength { id: u16, len: usize, expected: usize },

    #[error("payload too large: {0} bytes")]
    Oversized(usize),
}

fn crc_accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |crc, &b| crc_accumulate(b, crc))
}

/// Serialize a message into a complete frame.
pub fn encode(message: &LinkMessage) -> Result<Vec<u8>, CodecError> {
    let payload = encode_payload(message);
    if payload.len() > u16::MAX as usize {
        return Err(CodecError::Oversized(payload.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
    frame.push(FRAME_MAGIC);
    frame.extend_from_slice(&message.id().to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = checksum(&frame[1..]);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

fn encode_payload(message: &LinkMessage) -> Vec<u8> {
    let mut out = Vec::new();
    match message {
        LinkMessage::Telemetry(t) => {
            out.extend_from_slice(&t.timestamp_ms.to_le_bytes());
            out.push(t.gps_fix_quality);
            out.extend_from_slice(&t.lat_e7.to_le_bytes());
            out.extend_from_slice(&t.lon_e7.to_le_bytes());
            out.extend_from_slice(&t.relative_alt_mm.to_le_bytes());
            out.extend_from_slice(&t.absolute_alt_mm.to_le_bytes());
            out.extend_from_slice(&t.pitch.to_le_bytes());
            out.extend_from_slice(&t.roll.to_le_bytes());
            out.extend_from_slice(&t.yaw.to_le_bytes());
        }
        LinkMessage::Command { command, param1 } => {
            out.extend_from_slice(&command.to_le_bytes());
            out.extend_from_slice(&param1.to_le_bytes());
        }
        LinkMessage::CommandAck { command, result } => {
            out.extend_from_slice(&command.to_le_bytes());
            out.push(*result);
        }
        LinkMessage::StatusText(text) => out.extend_from_slice(text.as_bytes()),
        LinkMessage::ImageCaptured {
            sequence_number,
            timestamp_ms,
        } => {
            out.extend_from_slice(&sequence_number.to_le_bytes());
            out.extend_from_slice(&timestamp_ms.to_le_bytes());
        }
        LinkMessage::TransferHandshake(h) => {
            out.extend_from_slice(&h.size.to_le_bytes());
            out.extend_from_slice(&h.width.to_le_bytes());
            out.extend_from_slice(&h.height.to_le_bytes());
            out.extend_from_slice(&h.packets.to_le_bytes());
            out.push(h.payload);
            out.push(h.jpg_quality);
        }
        LinkMessage::EncapsulatedData { seqnr, data } => {
            out.extend_from_slice(&seqnr.to_le_bytes());
            out.extend_from_slice(data);
        }
    }
    out
}

/// Parse one complete frame.
pub fn decode(frame: &[u8]) -> Result<LinkMessage, CodecError> {
    if frame.len() < HEADER_LEN + CRC_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN + CRC_LEN,
            got: frame.len(),
        });
    }
    if frame[0] != FRAME_MAGIC {
        return Err(CodecError::BadMagic(frame[0]));
    }

    let id = u16::from_le_bytes([frame[1], frame[2]]);
    let len = u16::from_le_bytes([frame[3], frame[4]]) as usize;
    let needed = HEADER_LEN + len + CRC_LEN;
    if frame.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            got: frame.len(),
        });
    }

    let body_end = HEADER_LEN + len;
    let expected = checksum(&frame[1..body_end]);
    let got = u16::from_le_bytes([frame[body_end], frame[body_end + 1]]);
    if expected != got {
        return Err(CodecError::Checksum { expected, got });
    }

    decode_payload(id, &frame[HEADER_LEN..body_end])
}

fn decode_payload(id: u16, payload: &[u8]) -> Result<LinkMessage, CodecError> {
    let fixed = |expected: usize| {
        if payload.len() == expected {
            Ok(())
        } else {
            Err(CodecError::PayloadLength {
                id,
                len: payload.len(),
                expected,
            })
        }
    };
    let mut r = Reader::new(payload);

    let message = match id {
        MSG_TELEMETRY => {
            fixed(37)?;
            LinkMessage::Telemetry(TelemetrySnapshot {
                timestamp_ms: r.u64(),
                gps_fix_quality: r.u8(),
                lat_e7: r.i32(),
                lon_e7: r.i32(),
                relative_alt_mm: r.i32(),
                absolute_alt_mm: r.i32(),
                pitch: r.f32(),
                roll: r.f32(),
                yaw: r.f32(),
            })
        }
        MSG_COMMAND => {
            fixed(6)?;
            LinkMessage::Command {
                command: r.u16(),
                param1: r.f32(),
            }
        }
        MSG_COMMAND_ACK => {
            fixed(3)?;
            LinkMessage::CommandAck {
                command: r.u16(),
                result: r.u8(),
            }
        }
        MSG_STATUS_TEXT => LinkMessage::StatusText(String::from_utf8_lossy(payload).into_owned()),
        MSG_IMAGE_CAPTURED => {
            fixed(16)?;
            LinkMessage::ImageCaptured {
                sequence_number: r.u64(),
                timestamp_ms: r.u64(),
            }
        }
        MSG_TRANSFER_HANDSHAKE => {
            fixed(12)?;
            LinkMessage::TransferHandshake(TransferHandshake {
                size: r.u32(),
                width: r.u16(),
                height: r.u16(),
                packets: r.u16(),
                payload: r.u8(),
                jpg_quality: r.u8(),
            })
        }
        MSG_ENCAPSULATED_DATA => {
            if payload.len() < 2 {
                return Err(CodecError::PayloadLength {
                    id,
                    len: payload.len(),
                    expected: 2,
                });
            }
            LinkMessage::EncapsulatedData {
                seqnr: r.u16(),
                data: payload[2..].to_vec(),
            }
        }
        other => return Err(CodecError::UnknownMessage(other)),
    };
    Ok(message)
}

/// Cursor over a payload whose length has already been checked.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}
