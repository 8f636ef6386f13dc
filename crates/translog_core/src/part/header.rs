//! Part file header.
//!
//! ```text
//! | magic "TLPT" (4) | header len (4) | version (2) | crc kind (1) | level (1) |
//! | start serial (8) | tag count (2) | { key len (2) key | val len (2) val }* |
//! | header crc32 (4) |
//! ```
//!
//! The header length covers the whole header including magic and checksum.
//! The header checksum is always CRC-32, independent of the frame encoding.

use crate::config::{Crc, Encoding};
use crate::error::{CoreError, CoreResult};
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};
use translog_codec::SerialNum;

/// Magic bytes at the start of every part file.
pub(crate) const PART_MAGIC: [u8; 4] = *b"TLPT";

/// Current part format version.
pub(crate) const PART_VERSION: u16 = 1;

/// magic (4) + header len (4)
const PREFIX_SIZE: usize = 8;

/// version (2) + crc (1) + level (1) + start serial (8) + tag count (2)
const FIXED_SIZE: usize = 14;

const CRC_SIZE: usize = 4;

/// Smallest possible encoded header: no tags.
pub(crate) const MIN_HEADER_SIZE: u64 = (PREFIX_SIZE + FIXED_SIZE + CRC_SIZE) as u64;

const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Key/value tags stored in a part header.
pub type HeaderTags = Vec<(String, String)>;

/// Supplies the tags written into the header of every new part.
pub trait FileHeaderContext: Send + Sync {
    /// Appends tags for a part of domain `name`.
    fn add_tags(&self, tags: &mut HeaderTags, name: &str);
}

/// Tags every part with the domain name and its creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHeaderContext;

impl FileHeaderContext for DefaultHeaderContext {
    fn add_tags(&self, tags: &mut HeaderTags, name: &str) {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        tags.push(("domain".to_string(), name.to_string()));
        tags.push(("createTime".to_string(), created.to_string()));
    }
}

/// Decoded part header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartHeader {
    pub(crate) encoding: Encoding,
    pub(crate) compression_level: u8,
    pub(crate) start_serial: SerialNum,
    pub(crate) tags: HeaderTags,
}

impl PartHeader {
    pub(crate) fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut body = Vec::with_capacity(FIXED_SIZE + 64);
        body.extend_from_slice(&PART_VERSION.to_le_bytes());
        body.push(self.encoding.crc().as_byte());
        body.push(self.compression_level);
        body.extend_from_slice(&self.start_serial.to_le_bytes());

        let count = u16::try_from(self.tags.len())
            .map_err(|_| CoreError::invalid_operation("too many header tags"))?;
        body.extend_from_slice(&count.to_le_bytes());
        for (key, value) in &self.tags {
            put_str(&mut body, key)?;
            put_str(&mut body, value)?;
        }

        let total = PREFIX_SIZE + body.len() + CRC_SIZE;
        if total > MAX_HEADER_SIZE {
            return Err(CoreError::invalid_operation("part header too large"));
        }
        let mut data = Vec::with_capacity(total);
        data.extend_from_slice(&PART_MAGIC);
        // Bounded by MAX_HEADER_SIZE above.
        data.extend_from_slice(&(total as u32).to_le_bytes());
        data.extend_from_slice(&body);
        let crc = Crc::Crc32.checksum(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Reads a header, returning it with its encoded length.
    pub(crate) fn read<R: Read>(reader: &mut R, file_len: u64) -> CoreResult<(Self, u64)> {
        if file_len < MIN_HEADER_SIZE {
            return Err(CoreError::part_corruption(format!(
                "file too short for a header: {file_len} bytes"
            )));
        }

        let mut prefix = [0u8; PREFIX_SIZE];
        reader.read_exact(&mut prefix)?;
        if prefix[..4] != PART_MAGIC {
            return Err(CoreError::part_corruption("bad part magic"));
        }
        let total = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
        if total < PREFIX_SIZE + FIXED_SIZE + CRC_SIZE
            || total > MAX_HEADER_SIZE
            || total as u64 > file_len
        {
            return Err(CoreError::part_corruption(format!(
                "bad header length {total}"
            )));
        }

        let mut rest = vec![0u8; total - PREFIX_SIZE];
        reader.read_exact(&mut rest)?;
        let (body, crc_bytes) = rest.split_at(rest.len() - CRC_SIZE);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let mut checked = Vec::with_capacity(PREFIX_SIZE + body.len());
        checked.extend_from_slice(&prefix);
        checked.extend_from_slice(body);
        let actual = Crc::Crc32.checksum(&checked);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let header = Self::decode_body(body)?;
        Ok((header, total as u64))
    }

    fn decode_body(body: &[u8]) -> CoreResult<Self> {
        let mut cursor = body;
        let version = u16::from_le_bytes(take::<2>(&mut cursor)?);
        if version != PART_VERSION {
            return Err(CoreError::part_corruption(format!(
                "unsupported part version {version}"
            )));
        }
        let [crc_byte] = take::<1>(&mut cursor)?;
        let crc = Crc::from_byte(crc_byte).ok_or_else(|| {
            CoreError::part_corruption(format!("unknown crc kind {crc_byte}"))
        })?;
        let [compression_level] = take::<1>(&mut cursor)?;
        let start_serial = u64::from_le_bytes(take::<8>(&mut cursor)?);
        let count = u16::from_le_bytes(take::<2>(&mut cursor)?);

        let mut tags = HeaderTags::with_capacity(usize::from(count));
        for _ in 0..count {
            let key = get_str(&mut cursor)?;
            let value = get_str(&mut cursor)?;
            tags.push((key, value));
        }
        if !cursor.is_empty() {
            return Err(CoreError::part_corruption("trailing bytes in part header"));
        }

        Ok(Self {
            encoding: Encoding::new(crc),
            compression_level,
            start_serial,
            tags,
        })
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> CoreResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| CoreError::invalid_operation("header tag too long"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn take<const N: usize>(cursor: &mut &[u8]) -> CoreResult<[u8; N]> {
    if cursor.len() < N {
        return Err(CoreError::part_corruption("truncated part header"));
    }
    let (head, tail) = cursor.split_at(N);
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    *cursor = tail;
    Ok(out)
}

fn get_str(cursor: &mut &[u8]) -> CoreResult<String> {
    let len = usize::from(u16::from_le_bytes(take::<2>(cursor)?));
    if cursor.len() < len {
        return Err(CoreError::part_corruption("truncated header tag"));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    String::from_utf8(head.to_vec())
        .map_err(|_| CoreError::part_corruption("header tag is not UTF-8"))
}
