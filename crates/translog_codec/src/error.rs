//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building or decoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An entry or packet was added behind the current end of a packet.
    #[error("serial {serial} is not above the last serial {last} in the packet")]
    OutOfOrder {
        /// Serial of the rejected entry.
        serial: u64,
        /// Last serial already present.
        last: u64,
    },

    /// Input ended before a complete entry could be decoded.
    #[error("truncated entry: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Entry payload does not fit the 4-byte length field.
    #[error("entry payload too large: {len} bytes")]
    EntryTooLarge {
        /// Payload length in bytes.
        len: usize,
    },
}

impl CodecError {
    /// Creates an out-of-order error.
    pub fn out_of_order(serial: u64, last: u64) -> Self {
        Self::OutOfOrder { serial, last }
    }

    /// Creates a truncation error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }
}
