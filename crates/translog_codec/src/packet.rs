//! Batches of encoded entries.

use crate::entry::Entry;
use crate::error::{CodecError, CodecResult};
use crate::range::{SerialNum, SerialNumRange};
use bytes::BytesMut;

/// A batch of entries with strictly increasing serials.
///
/// The packet keeps its entries encoded back to back, so merging two
/// packets is a byte copy and the encoded size is known without walking
/// the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    range: SerialNumRange,
    count: usize,
    buf: BytesMut,
}

impl Packet {
    /// Creates an empty packet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty packet with room for `capacity` encoded bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Rebuilds a packet from encoded entries, validating ordering.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is truncated or serials do not increase.
    pub fn from_bytes(data: &[u8]) -> CodecResult<Self> {
        let mut packet = Self::with_capacity(data.len());
        let mut cursor = data;
        while !cursor.is_empty() {
            let entry = Entry::deserialize(&mut cursor)?;
            packet.add(&entry)?;
        }
        Ok(packet)
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfOrder`] if the entry serial is not above the
    /// last serial in the packet.
    pub fn add(&mut self, entry: &Entry) -> CodecResult<()> {
        if !self.is_empty() && entry.serial() <= self.range.to() {
            return Err(CodecError::out_of_order(entry.serial(), self.range.to()));
        }
        entry.serialize(&mut self.buf)?;
        if self.count == 0 {
            self.range = SerialNumRange::single(entry.serial());
        } else {
            self.range.set_to(entry.serial());
        }
        self.count += 1;
        Ok(())
    }

    /// Appends every entry of `other` to this packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::OutOfOrder`] if `other` starts at or below the
    /// last serial in this packet. Nothing is appended in that case.
    pub fn merge(&mut self, other: &Packet) -> CodecResult<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            self.range = other.range;
        } else if other.range.from() <= self.range.to() {
            return Err(CodecError::out_of_order(
                other.range.from(),
                self.range.to(),
            ));
        } else {
            self.range.set_to(other.range.to());
        }
        self.buf.extend_from_slice(&other.buf);
        self.count += other.count;
        Ok(())
    }

    /// Serial range covered by the packet. `[0, 0]` while empty.
    #[must_use]
    pub fn range(&self) -> SerialNumRange {
        self.range
    }

    /// Number of entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.count
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the packet holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Encoded entries.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Decodes the serial of the first entry.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if the packet is empty.
    pub fn first_serial(&self) -> CodecResult<SerialNum> {
        Entry::peek_serial(&self.buf)
    }

    /// Iterates over the entries in serial order.
    #[must_use]
    pub fn iter(&self) -> PacketIter<'_> {
        PacketIter { remaining: &self.buf }
    }
}

impl<'a> IntoIterator for &'a Packet {
    type Item = CodecResult<Entry>;
    type IntoIter = PacketIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`Packet`].
///
/// Stops after the first decoding error.
#[derive(Debug, Clone)]
pub struct PacketIter<'a> {
    remaining: &'a [u8],
}

impl Iterator for PacketIter<'_> {
    type Item = CodecResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        match Entry::deserialize(&mut self.remaining) {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                self.remaining = &[];
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn packet(serials: &[u64]) -> Packet {
        let mut packet = Packet::new();
        for &serial in serials {
            packet
                .add(&Entry::new(serial, 1, format!("op-{serial}").into_bytes()))
                .unwrap();
        }
        packet
    }

    #[test]
    fn empty_packet() {
        let packet = Packet::new();
        assert!(packet.is_empty());
        assert_eq!(packet.size_bytes(), 0);
        assert_eq!(packet.iter().count(), 0);
        assert!(packet.first_serial().is_err());
    }

    #[test]
    fn add_tracks_range() {
        let packet = packet(&[3, 5, 9]);
        assert_eq!(packet.range(), SerialNumRange::new(3, 9));
        assert_eq!(packet.size(), 3);
        assert_eq!(packet.first_serial().unwrap(), 3);
    }

    #[test]
    fn add_rejects_non_increasing() {
        let mut packet = packet(&[4]);
        let before = packet.clone();

        let err = packet.add(&Entry::new(4, 0, Vec::new())).unwrap_err();
        assert_eq!(err, CodecError::out_of_order(4, 4));
        assert_eq!(packet, before);
    }

    #[test]
    fn merge_concatenates() {
        let mut left = packet(&[1, 2]);
        let right = packet(&[5, 6, 7]);
        left.merge(&right).unwrap();

        assert_eq!(left.range(), SerialNumRange::new(1, 7));
        assert_eq!(left.size(), 5);
        let serials: Vec<u64> = left.iter().map(|e| e.unwrap().serial()).collect();
        assert_eq!(serials, vec![1, 2, 5, 6, 7]);
    }

    #[test]
    fn merge_into_empty_takes_range() {
        let mut merged = Packet::new();
        merged.merge(&packet(&[10, 11])).unwrap();
        assert_eq!(merged.range(), SerialNumRange::new(10, 11));
    }

    #[test]
    fn merge_rejects_overlap() {
        let mut left = packet(&[1, 5]);
        let before = left.clone();
        assert!(left.merge(&packet(&[5, 6])).is_err());
        assert_eq!(left, before);
    }

    #[test]
    fn from_bytes_detects_truncation() {
        let packet = packet(&[1, 2]);
        let bytes = packet.bytes();
        let err = Packet::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    proptest! {
        #[test]
        fn from_bytes_restores_packet(gaps in prop::collection::vec(1u64..50, 1..40)) {
            let mut serial = 0u64;
            let serials: Vec<u64> = gaps.iter().map(|gap| { serial += gap; serial }).collect();
            let original = packet(&serials);

            let decoded = Packet::from_bytes(original.bytes()).unwrap();
            prop_assert_eq!(decoded.range(), original.range());
            prop_assert_eq!(decoded.size(), serials.len());
            prop_assert_eq!(decoded.bytes(), original.bytes());
        }
    }
}
