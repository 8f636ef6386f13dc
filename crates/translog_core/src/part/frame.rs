//! Framing of persisted chunks.
//!
//! Every persisted chunk becomes one frame:
//!
//! ```text
//! | magic "TLCH" (4) | crc kind (1) | from (8) | to (8) | count (4) |
//! | payload len (4) | payload (N) | checksum (4) |
//! ```
//!
//! The checksum covers every byte of the frame before it.

use crate::config::Crc;
use crate::error::{CoreError, CoreResult};
use std::io::Read;
use translog_codec::{Packet, SerialNum};

/// Magic bytes at the start of every frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"TLCH";

/// magic (4) + crc (1) + from (8) + to (8) + count (4) + payload len (4)
pub(crate) const FRAME_HEADER_SIZE: usize = 29;

const CHECKSUM_SIZE: usize = 4;

/// Result of reading one frame.
#[derive(Debug)]
pub(crate) enum FrameOutcome {
    /// A complete, verified frame of `len` bytes.
    Frame {
        packet: Packet,
        first: SerialNum,
        len: u64,
    },
    /// No bytes left.
    End,
    /// The remaining bytes do not form a valid frame.
    Torn(CoreError),
}

/// Encodes `packet` as a frame.
pub(crate) fn encode_frame(crc: Crc, packet: &Packet) -> CoreResult<Vec<u8>> {
    let payload = packet.bytes();
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_operation("chunk too large for one frame"))?;
    let count = u32::try_from(packet.size())
        .map_err(|_| CoreError::invalid_operation("too many entries for one frame"))?;
    let range = packet.range();

    let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    data.extend_from_slice(&FRAME_MAGIC);
    data.push(crc.as_byte());
    data.extend_from_slice(&range.from().to_le_bytes());
    data.extend_from_slice(&range.to().to_le_bytes());
    data.extend_from_slice(&count.to_le_bytes());
    data.extend_from_slice(&payload_len.to_le_bytes());
    data.extend_from_slice(payload);

    let checksum = crc.checksum(&data);
    data.extend_from_slice(&checksum.to_le_bytes());
    Ok(data)
}

/// Reads the next frame, given that `available` bytes remain in the file.
///
/// Damage is reported as [`FrameOutcome::Torn`]; only I/O failures are
/// returned as errors.
pub(crate) fn read_frame<R: Read>(reader: &mut R, available: u64) -> CoreResult<FrameOutcome> {
    if available == 0 {
        return Ok(FrameOutcome::End);
    }
    if available < (FRAME_HEADER_SIZE + CHECKSUM_SIZE) as u64 {
        return Ok(torn(format!("{available} trailing bytes")));
    }

    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;
    if header[..4] != FRAME_MAGIC {
        return Ok(torn("bad frame magic".to_string()));
    }
    let Some(crc) = Crc::from_byte(header[4]) else {
        return Ok(torn(format!("unknown crc kind {}", header[4])));
    };
    let from = u64::from_le_bytes(array(&header[5..13]));
    let to = u64::from_le_bytes(array(&header[13..21]));
    let count = u32::from_le_bytes(array(&header[21..25]));
    let payload_len = u32::from_le_bytes(array(&header[25..29]));

    let len = (FRAME_HEADER_SIZE + CHECKSUM_SIZE) as u64 + u64::from(payload_len);
    if len > available {
        return Ok(torn(format!(
            "frame of {len} bytes exceeds the {available} bytes left"
        )));
    }

    let mut rest = vec![0u8; payload_len as usize + CHECKSUM_SIZE];
    reader.read_exact(&mut rest)?;
    let (payload, checksum) = rest.split_at(payload_len as usize);
    let expected = u32::from_le_bytes(array(checksum));
    if crc != Crc::None {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(payload);
        let actual = hasher.finalize();
        if expected != actual {
            return Ok(FrameOutcome::Torn(CoreError::ChecksumMismatch {
                expected,
                actual,
            }));
        }
    }

    let packet = match Packet::from_bytes(payload) {
        Ok(packet) => packet,
        Err(err) => return Ok(FrameOutcome::Torn(err.into())),
    };
    let range = packet.range();
    if packet.is_empty()
        || range.from() != from
        || range.to() != to
        || packet.size() != count as usize
    {
        return Ok(torn(format!(
            "frame header [{from}, {to}] x{count} does not match its payload {range} x{}",
            packet.size()
        )));
    }

    Ok(FrameOutcome::Frame {
        packet,
        first: from,
        len,
    })
}

fn torn(message: String) -> FrameOutcome {
    FrameOutcome::Torn(CoreError::part_corruption(message))
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use translog_codec::Entry;

    fn packet(from: u64, to: u64) -> Packet {
        let mut packet = Packet::new();
        for serial in from..=to {
            packet
                .add(&Entry::new(serial, 1, format!("op-{serial}").into_bytes()))
                .unwrap();
        }
        packet
    }

    fn read(data: &[u8]) -> FrameOutcome {
        read_frame(&mut Cursor::new(data), data.len() as u64).unwrap()
    }

    #[test]
    fn frame_is_readable() {
        let data = encode_frame(Crc::Crc32, &packet(3, 7)).unwrap();
        match read(&data) {
            FrameOutcome::Frame { packet: p, first, len } => {
                assert_eq!(p, packet(3, 7));
                assert_eq!(first, 3);
                assert_eq!(len, data.len() as u64);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn end_of_file() {
        assert!(matches!(read(&[]), FrameOutcome::End));
    }

    #[test]
    fn truncated_frame_is_torn() {
        let data = encode_frame(Crc::Crc32, &packet(1, 4)).unwrap();
        assert!(matches!(read(&data[..data.len() - 1]), FrameOutcome::Torn(_)));
        assert!(matches!(read(&data[..10]), FrameOutcome::Torn(_)));
    }

    #[test]
    fn corrupted_payload_is_torn() {
        let mut data = encode_frame(Crc::Crc32, &packet(1, 4)).unwrap();
        data[FRAME_HEADER_SIZE + 2] ^= 0xff;
        assert!(matches!(
            read(&data),
            FrameOutcome::Torn(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unchecked_frame_skips_checksum() {
        let data = encode_frame(Crc::None, &packet(1, 2)).unwrap();
        assert_eq!(&data[data.len() - 4..], &[0, 0, 0, 0]);
        assert!(matches!(read(&data), FrameOutcome::Frame { .. }));
    }
}
