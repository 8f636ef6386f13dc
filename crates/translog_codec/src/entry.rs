//! Log entries.

use crate::error::{CodecError, CodecResult};
use crate::range::SerialNum;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encoded size of an entry header: serial (8) + type (4) + len (4).
pub const ENTRY_HEADER_SIZE: usize = 16;

/// A single operation recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    serial: SerialNum,
    entry_type: u32,
    data: Bytes,
}

impl Entry {
    /// Creates an entry.
    pub fn new(serial: SerialNum, entry_type: u32, data: impl Into<Bytes>) -> Self {
        Self {
            serial,
            entry_type,
            data: data.into(),
        }
    }

    /// Serial number of this entry.
    #[must_use]
    pub fn serial(&self) -> SerialNum {
        self.serial
    }

    /// Application-defined operation type.
    #[must_use]
    pub fn entry_type(&self) -> u32 {
        self.entry_type
    }

    /// Operation payload.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Number of bytes this entry occupies when encoded.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        ENTRY_HEADER_SIZE + self.data.len()
    }

    /// Appends the encoded entry to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EntryTooLarge`] if the payload does not fit a
    /// 4-byte length.
    pub fn serialize(&self, buf: &mut BytesMut) -> CodecResult<()> {
        let len = u32::try_from(self.data.len())
            .map_err(|_| CodecError::EntryTooLarge {
                len: self.data.len(),
            })?;
        buf.reserve(self.encoded_size());
        buf.put_u64_le(self.serial);
        buf.put_u32_le(self.entry_type);
        buf.put_u32_le(len);
        buf.put_slice(&self.data);
        Ok(())
    }

    /// Decodes one entry from the front of `buf`, advancing it past the entry.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if `buf` ends inside the entry. In
    /// that case `buf` is left untouched.
    pub fn deserialize(buf: &mut &[u8]) -> CodecResult<Self> {
        if buf.len() < ENTRY_HEADER_SIZE {
            return Err(CodecError::truncated(ENTRY_HEADER_SIZE, buf.len()));
        }
        let mut header = &buf[..ENTRY_HEADER_SIZE];
        let serial = header.get_u64_le();
        let entry_type = header.get_u32_le();
        let len = header.get_u32_le() as usize;

        let total = ENTRY_HEADER_SIZE + len;
        if buf.len() < total {
            return Err(CodecError::truncated(total, buf.len()));
        }
        let data = Bytes::copy_from_slice(&buf[ENTRY_HEADER_SIZE..total]);
        buf.advance(total);

        Ok(Self {
            serial,
            entry_type,
            data,
        })
    }

    /// Reads the serial of the entry at the front of `buf` without decoding it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if fewer than 8 bytes are available.
    pub fn peek_serial(buf: &[u8]) -> CodecResult<SerialNum> {
        if buf.len() < 8 {
            return Err(CodecError::truncated(8, buf.len()));
        }
        let mut head = &buf[..8];
        Ok(head.get_u64_le())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_layout() {
        let entry = Entry::new(0x0102, 7, &b"abc"[..]);
        let mut buf = BytesMut::new();
        entry.serialize(&mut buf).unwrap();

        assert_eq!(buf.len(), entry.encoded_size());
        assert_eq!(&buf[0..8], &0x0102u64.to_le_bytes());
        assert_eq!(&buf[8..12], &7u32.to_le_bytes());
        assert_eq!(&buf[12..16], &3u32.to_le_bytes());
        assert_eq!(&buf[16..], b"abc");
    }

    #[test]
    fn deserialize_advances_cursor() {
        let mut buf = BytesMut::new();
        Entry::new(1, 0, &b"x"[..]).serialize(&mut buf).unwrap();
        Entry::new(2, 0, &b"yz"[..]).serialize(&mut buf).unwrap();

        let mut cursor = &buf[..];
        let first = Entry::deserialize(&mut cursor).unwrap();
        assert_eq!(first.serial(), 1);
        assert_eq!(cursor.len(), ENTRY_HEADER_SIZE + 2);

        let second = Entry::deserialize(&mut cursor).unwrap();
        assert_eq!(second.data().as_ref(), b"yz");
        assert!(cursor.is_empty());
    }

    #[test]
    fn truncated_payload_leaves_cursor() {
        let mut buf = BytesMut::new();
        Entry::new(9, 1, &b"payload"[..]).serialize(&mut buf).unwrap();

        let short = &buf[..buf.len() - 2];
        let mut cursor = short;
        let err = Entry::deserialize(&mut cursor).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
        assert_eq!(cursor.len(), short.len());
    }

    #[test]
    fn peek_serial_reads_header() {
        let mut buf = BytesMut::new();
        Entry::new(42, 0, Bytes::new()).serialize(&mut buf).unwrap();
        assert_eq!(Entry::peek_serial(&buf).unwrap(), 42);
        assert!(Entry::peek_serial(&buf[..4]).is_err());
    }
}
