//! # Translog Codec
//!
//! Wire encoding for translog entries and packets.
//!
//! A log is a sequence of [`Entry`] values, each carrying a strictly
//! increasing serial number. Entries travel in batches called [`Packet`]s:
//! a packet is the concatenation of encoded entries together with the
//! serial range they cover.
//!
//! ## Entry Format
//!
//! ```text
//! | serial (8) | type (4) | len (4) | data (len) |
//! ```
//!
//! All integers are little-endian.
//!
//! ## Usage
//!
//! ```
//! use translog_codec::{Entry, Packet};
//!
//! let mut packet = Packet::new();
//! packet.add(&Entry::new(1, 0, &b"first"[..])).unwrap();
//! packet.add(&Entry::new(2, 0, &b"second"[..])).unwrap();
//!
//! assert_eq!(packet.range().from(), 1);
//! assert_eq!(packet.range().to(), 2);
//! assert_eq!(packet.size(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod error;
mod packet;
mod range;

pub use entry::{Entry, ENTRY_HEADER_SIZE};
pub use error::{CodecError, CodecResult};
pub use packet::{Packet, PacketIter};
pub use range::{SerialNum, SerialNumRange};
