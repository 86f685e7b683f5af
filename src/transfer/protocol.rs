//! Announce / handshake / stream / finalize state machine.
//!
//! A transfer either completes all four stages or aborts at the first
//! missing acknowledgement. Nothing is retried and nothing persists between
//! transfers; the caller re-requests a relay if it needs one.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::link::messages::{
    ACK_ACCEPTED, CHUNK_SIZE, MSG_IMAGE_CAPTURED, MSG_TRANSFER_HANDSHAKE,
};
use crate::link::{LinkMessage, TransferHandshake, VehicleLink};
use crate::system::messages::ImageRecord;

use super::ack::AckWaiter;
use super::compress::{CompressedImage, compress_image};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Announce,
    Handshake,
    Stream,
    Finalize,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Announce => "announce",
            TransferStage::Handshake => "handshake",
            TransferStage::Stream => "stream",
            TransferStage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to prepare image: {0}")]
    Compress(#[from] image::ImageError),

    #[error("no acknowledgement for {stage} within {timeout:?}")]
    Timeout {
        stage: TransferStage,
        timeout: Duration,
    },

    #[error("{stage} rejected by receiver with result {result}")]
    Rejected { stage: TransferStage, result: u8 },

    #[error("payload of {0} bytes does not fit in one transfer")]
    TooLarge(usize),

    #[error("send failed during {stage}: {reason:#}")]
    Link {
        stage: TransferStage,
        reason: anyhow::Error,
    },
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub sequence_number: u64,
    pub bytes: usize,
    pub chunks: u16,
}

/// Split `payload` into `CHUNK_SIZE` pieces, zero-padding the last one.
pub fn chunk_payload(payload: &[u8]) -> Vec<Vec<u8>> {
    payload
        .chunks(CHUNK_SIZE)
        .map(|c| {
            let mut chunk = c.to_vec();
            chunk.resize(CHUNK_SIZE, 0);
            chunk
        })
        .collect()
}

pub struct ImageTransfer {
    link: Arc<dyn VehicleLink>,

    /// Wait for each of the two handshake acks.
    ack_timeout: Duration,

    /// Gap between chunks so the radio is not flooded.
    chunk_delay: Duration,

    /// Downscale bounds and JPEG quality of the relayed copy.
    max_width: u32,
    max_height: u32,
    jpeg_quality: u8,
}

impl ImageTransfer {
    pub fn new(link: Arc<dyn VehicleLink>, config: &TransferConfig) -> Self {
        Self {
            link,
            ack_timeout: Duration::from_millis(config.ack_timeout_ms),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            max_width: config.max_width,
            max_height: config.max_height,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Compress and relay the image of `record`.
    ///
    /// Blocks for up to two acknowledgement timeouts plus the streaming time.
    pub fn relay(&self, record: &ImageRecord) -> Result<TransferReport, TransferError> {
        let image = compress_image(&record.path, self.max_width, self.max_height, self.jpeg_quality)?;
        debug!(
            sequence_number = record.sequence_number,
            bytes = image.bytes.len(),
            width = image.width,
            height = image.height,
            "image compressed for relay"
        );
        self.send_image(record.sequence_number, record.captured_at_ms(), &image)
    }

    /// Run the protocol for an already compressed image.
    pub fn send_image(
        &self,
        sequence_number: u64,
        timestamp_ms: u64,
        image: &CompressedImage,
    ) -> Result<TransferReport, TransferError> {
        let size = image.bytes.len();
        let chunks = chunk_payload(&image.bytes);
        let packets = u16::try_from(chunks.len()).map_err(|_| TransferError::TooLarge(size))?;
        let handshake = TransferHandshake {
            size: u32::try_from(size).map_err(|_| TransferError::TooLarge(size))?,
            width: image.width.min(u16::MAX as u32) as u16,
            height: image.height.min(u16::MAX as u32) as u16,
            packets,
            payload: CHUNK_SIZE as u8,
            jpg_quality: image.quality,
        };

        self.exchange(
            TransferStage::Announce,
            &LinkMessage::ImageCaptured {
                sequence_number,
                timestamp_ms,
            },
            MSG_IMAGE_CAPTURED,
        )?;

        self.exchange(
            TransferStage::Handshake,
            &LinkMessage::TransferHandshake(handshake),
            MSG_TRANSFER_HANDSHAKE,
        )?;

        for (i, data) in chunks.into_iter().enumerate() {
            let seqnr = (i + 1) as u16;
            self.send(TransferStage::Stream, &LinkMessage::EncapsulatedData { seqnr, data })?;
            thread::sleep(self.chunk_delay);
        }

        self.send(TransferStage::Finalize, &LinkMessage::TransferHandshake(handshake))?;

        info!(sequence_number, bytes = size, chunks = packets, "image relayed");
        Ok(TransferReport {
            sequence_number,
            bytes: size,
            chunks: packets,
        })
    }

    /// Send `message` and wait for an ack of `ack_command`.
    fn exchange(
        &self,
        stage: TransferStage,
        message: &LinkMessage,
        ack_command: u16,
    ) -> Result<(), TransferError> {
        let waiter = AckWaiter::register(self.link.as_ref(), ack_command);
        self.send(stage, message)?;
        match waiter.wait(self.ack_timeout) {
            Some(ACK_ACCEPTED) => {
                debug!(%stage, "acknowledged");
                Ok(())
            }
            Some(result) => Err(TransferError::Rejected { stage, result }),
            None => Err(TransferError::Timeout {
                stage,
                timeout: self.ack_timeout,
            }),
        }
    }

    fn send(&self, stage: TransferStage, message: &LinkMessage) -> Result<(), TransferError> {
        self.link
            .send(message)
            .map_err(|reason| TransferError::Link { stage, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockVehicleLink;

    fn config() -> TransferConfig {
        TransferConfig {
            ack_timeout_ms: 50,
            chunk_delay_ms: 1,
            ..TransferConfig::default()
        }
    }

    fn image(len: usize) -> CompressedImage {
        CompressedImage {
            bytes: (0..len).map(|i| (i % 251) as u8 + 1).collect(),
            width: 320,
            height: 240,
            quality: 50,
        }
    }

    fn chunks_sent(link: &MockVehicleLink) -> Vec<(u16, Vec<u8>)> {
        link.sent()
            .into_iter()
            .filter_map(|m| match m {
                LinkMessage::EncapsulatedData { seqnr, data } => Some((seqnr, data)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chunking_pads_last_chunk() {
        let chunks = chunk_payload(&[7u8; 600]);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == CHUNK_SIZE));
        assert_eq!(chunks[2][..600 - 2 * CHUNK_SIZE], [7u8; 94]);
        assert!(chunks[2][94..].iter().all(|&b| b == 0));
        assert!(chunk_payload(&[]).is_empty());
        assert_eq!(chunk_payload(&[1u8; CHUNK_SIZE]).len(), 1);
    }

    #[test]
    fn test_no_announce_ack_sends_no_chunks() {
        let link = Arc::new(MockVehicleLink::new());
        let transfer = ImageTransfer::new(link.clone(), &config());

        let err = transfer.send_image(9, 0, &image(1000)).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Timeout {
                stage: TransferStage::Announce,
                ..
            }
        ));
        assert_eq!(
            link.sent(),
            vec![LinkMessage::ImageCaptured {
                sequence_number: 9,
                timestamp_ms: 0
            }]
        );
        assert_eq!(link.listener_count(), 0);
    }

    #[test]
    fn test_handshake_timeout_aborts_before_streaming() {
        let link = Arc::new(MockVehicleLink::new());
        link.auto_ack(&[MSG_IMAGE_CAPTURED]);
        let transfer = ImageTransfer::new(link.clone(), &config());

        let err = transfer.send_image(1, 0, &image(1000)).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Timeout {
                stage: TransferStage::Handshake,
                ..
            }
        ));
        assert!(chunks_sent(&link).is_empty());
        assert_eq!(link.sent().len(), 2);
        assert_eq!(link.listener_count(), 0);
    }

    #[test]
    fn test_rejected_announce() {
        let link = Arc::new(MockVehicleLink::new());
        let transfer = ImageTransfer::new(
            link.clone(),
            &TransferConfig {
                ack_timeout_ms: 1000,
                ..config()
            },
        );

        let responder = {
            let link = link.clone();
            thread::spawn(move || {
                while link.listener_count() == 0 {
                    thread::sleep(Duration::from_millis(1));
                }
                link.deliver(&LinkMessage::CommandAck {
                    command: MSG_IMAGE_CAPTURED,
                    result: 4,
                });
            })
        };
        let err = transfer.send_image(1, 0, &image(10)).unwrap_err();
        responder.join().unwrap();
        assert!(matches!(
            err,
            TransferError::Rejected {
                stage: TransferStage::Announce,
                result: 4
            }
        ));
        assert!(chunks_sent(&link).is_empty());
    }

    #[test]
    fn test_complete_transfer_sequence() {
        let link = Arc::new(MockVehicleLink::new());
        link.auto_ack(&[MSG_IMAGE_CAPTURED, MSG_TRANSFER_HANDSHAKE]);
        let transfer = ImageTransfer::new(link.clone(), &config());

        let payload = image(600);
        let report = transfer.send_image(42, 1_700_000_000_000, &payload).unwrap();
        assert_eq!(
            report,
            TransferReport {
                sequence_number: 42,
                bytes: 600,
                chunks: 3
            }
        );

        let sent = link.sent();
        assert_eq!(sent.len(), 6);
        assert!(matches!(sent[0], LinkMessage::ImageCaptured { sequence_number: 42, .. }));
        let LinkMessage::TransferHandshake(handshake) = sent[1] else {
            panic!("expected handshake, got {:?}", sent[1]);
        };
        assert_eq!(handshake.size, 600);
        assert_eq!(handshake.packets, 3);
        assert_eq!(handshake.payload as usize, CHUNK_SIZE);
        assert_eq!((handshake.width, handshake.height), (320, 240));
        assert_eq!(sent[5], LinkMessage::TransferHandshake(handshake));

        let chunks = chunks_sent(&link);
        let seqnrs: Vec<u16> = chunks.iter().map(|(s, _)| *s).collect();
        assert_eq!(seqnrs, vec![1, 2, 3]);
        let reassembled: Vec<u8> = chunks.into_iter().flat_map(|(_, d)| d).take(600).collect();
        assert_eq!(reassembled, payload.bytes);
        assert_eq!(link.listener_count(), 0);
    }
}
