//! Frame building and receive-side frame reconstruction.
//!
//! A frame wraps one packet payload for one node port:
//! start byte (unicast/multicast), destination address (2 bytes, big-endian),
//! port, length byte, payload, CRC-8. The length byte counts the start byte,
//! address and port plus the payload; the length byte itself and the CRC are
//! excluded.

use byteorder::{BigEndian, ByteOrder};
use tracing::{trace, warn};

use gantry_core::{
    constants::{FRAME_HEADER_SIZE, FRAME_LENGTH_BIAS, START_BYTE_MULTICAST, START_BYTE_UNICAST},
    error::{ErrorKind, Result},
};

use crate::crc::Crc8;

/// Whether a frame addresses one node or all nodes on the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitMode {
    /// Addressed to a single node; a response is expected from it.
    Unicast,
    /// Addressed to every node; no unique responder exists.
    Multicast,
}

impl TransmitMode {
    /// The start byte opening frames of this mode.
    pub fn start_byte(&self) -> u8 {
        match self {
            TransmitMode::Unicast => START_BYTE_UNICAST,
            TransmitMode::Multicast => START_BYTE_MULTICAST,
        }
    }

    fn from_start_byte(byte: u8) -> Option<Self> {
        match byte {
            START_BYTE_UNICAST => Some(TransmitMode::Unicast),
            START_BYTE_MULTICAST => Some(TransmitMode::Multicast),
            _ => None,
        }
    }
}

/// A validated, reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Unicast or multicast.
    pub mode: TransmitMode,
    /// Destination node address.
    pub address: u16,
    /// Destination port at the node.
    pub port: u8,
    /// The packet payload carried by the frame.
    pub payload: Vec<u8>,
}

/// Largest payload a single frame can carry, bounded by the length byte.
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize - FRAME_LENGTH_BIAS as usize;

/// Builds the wire bytes for one frame.
pub fn build_frame(
    crc: &Crc8,
    mode: TransmitMode,
    address: u16,
    port: u8,
    payload: &[u8],
) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ErrorKind::FieldOverflow {
            field: "frame_length",
            value: (payload.len() + FRAME_LENGTH_BIAS as usize) as u64,
            width: 1,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + 1);
    frame.push(mode.start_byte());
    frame.extend_from_slice(&address.to_be_bytes());
    frame.push(port);
    frame.push(FRAME_LENGTH_BIAS + payload.len() as u8);
    frame.extend_from_slice(payload);
    crc.append(&mut frame);
    Ok(frame)
}

/// Byte-oriented receive-side frame reconstruction state machine.
///
/// Feed it raw bytes as they arrive; it emits validated frames. Anything that
/// fails validation is dropped and the reader returns to hunting for the next
/// start byte. There is no resynchronization inside a misread tail, so a
/// corrupted length byte can swallow the following frame.
#[derive(Debug)]
pub struct FrameReader {
    crc: Crc8,
    buffer: Vec<u8>,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    /// Creates an idle reader.
    pub fn new() -> Self {
        Self { crc: Crc8::new(), buffer: Vec::new() }
    }

    /// Consumes one inbound byte, yielding a frame when one completes.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        if self.buffer.is_empty() {
            if TransmitMode::from_start_byte(byte).is_none() {
                trace!(byte, "discarding byte outside any frame");
                return None;
            }
            self.buffer.push(byte);
            return None;
        }

        self.buffer.push(byte);

        if self.buffer.len() == FRAME_HEADER_SIZE {
            let declared = self.buffer[FRAME_HEADER_SIZE - 1];
            if declared < FRAME_LENGTH_BIAS {
                warn!(declared, "dropping frame with impossible length byte");
                self.buffer.clear();
                return None;
            }
        }

        if self.buffer.len() >= FRAME_HEADER_SIZE {
            let declared = self.buffer[FRAME_HEADER_SIZE - 1] as usize;
            // Total wire size: declared bytes + the length byte + the CRC.
            if self.buffer.len() == declared + 2 {
                return self.complete_frame();
            }
        }

        None
    }

    /// Consumes a run of inbound bytes, collecting any completed frames.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    /// Returns whether the reader is mid-frame.
    pub fn in_frame(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn complete_frame(&mut self) -> Option<Frame> {
        let buffer = std::mem::take(&mut self.buffer);
        if !self.crc.validate(&buffer) {
            warn!(len = buffer.len(), "dropping frame with bad CRC");
            return None;
        }

        let mode = TransmitMode::from_start_byte(buffer[0])
            .expect("buffer only ever starts at a start byte");
        let address = BigEndian::read_u16(&buffer[1..3]);
        let port = buffer[3];
        let payload = buffer[FRAME_HEADER_SIZE..buffer.len() - 1].to_vec();
        Some(Frame { mode, address, port, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(mode: TransmitMode, address: u16, port: u8, payload: &[u8]) -> Vec<u8> {
        build_frame(&Crc8::new(), mode, address, port, payload).unwrap()
    }

    #[test]
    fn test_build_frame_layout() {
        let bytes = frame_bytes(TransmitMode::Unicast, 0x0102, 7, &[9, 9]);
        assert_eq!(bytes[0], START_BYTE_UNICAST);
        assert_eq!(&bytes[1..3], &[1, 2]);
        assert_eq!(bytes[3], 7);
        assert_eq!(bytes[4], 6); // 4 header bytes + 2 payload bytes
        assert_eq!(&bytes[5..7], &[9, 9]);
        assert!(Crc8::new().validate(&bytes));
    }

    #[test]
    fn test_reader_round_trip() {
        let bytes = frame_bytes(TransmitMode::Multicast, 0xBEEF, 6, &[1, 2, 3]);
        let mut reader = FrameReader::new();
        let frames = reader.extend(&bytes);
        assert_eq!(
            frames,
            vec![Frame {
                mode: TransmitMode::Multicast,
                address: 0xBEEF,
                port: 6,
                payload: vec![1, 2, 3],
            }]
        );
        assert!(!reader.in_frame());
    }

    #[test]
    fn test_reader_skips_noise_between_frames() {
        let mut stream = vec![0x00, 0x31, 0xFF];
        stream.extend(frame_bytes(TransmitMode::Unicast, 5, 1, &[]));
        stream.extend([0x10, 0x20]);
        stream.extend(frame_bytes(TransmitMode::Unicast, 5, 2, &[42]));

        let mut reader = FrameReader::new();
        let frames = reader.extend(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].port, 1);
        assert_eq!(frames[1].payload, vec![42]);
    }

    #[test]
    fn test_reader_drops_corrupt_crc() {
        let mut bytes = frame_bytes(TransmitMode::Unicast, 1, 1, &[5, 5]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut reader = FrameReader::new();
        assert!(reader.extend(&bytes).is_empty());
        assert!(!reader.in_frame());

        // The reader recovers at the next clean frame.
        let clean = frame_bytes(TransmitMode::Unicast, 1, 1, &[5, 5]);
        assert_eq!(reader.extend(&clean).len(), 1);
    }

    #[test]
    fn test_reader_drops_impossible_length() {
        // Length byte of 2 is below the header bias; cannot be a real frame.
        let bytes = [START_BYTE_UNICAST, 0, 1, 1, 2, 0];

        let mut reader = FrameReader::new();
        assert!(reader.extend(&bytes).is_empty());
        assert!(!reader.in_frame());
    }

    #[test]
    fn test_reader_handles_frames_split_across_reads() {
        let bytes = frame_bytes(TransmitMode::Unicast, 300, 9, &[1, 2, 3, 4]);
        let (head, tail) = bytes.split_at(3);

        let mut reader = FrameReader::new();
        assert!(reader.extend(head).is_empty());
        assert!(reader.in_frame());
        let frames = reader.extend(tail);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].address, 300);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        assert!(build_frame(&Crc8::new(), TransmitMode::Unicast, 1, 1, &payload).is_err());
    }

    #[test]
    fn test_empty_payload_frame() {
        let bytes = frame_bytes(TransmitMode::Unicast, 9, 255, &[]);
        let mut reader = FrameReader::new();
        let frames = reader.extend(&bytes);
        assert_eq!(frames[0].payload, Vec::<u8>::new());
        assert_eq!(frames[0].port, 255);
    }
}
