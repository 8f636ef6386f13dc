//! Error types for translog core.

use crate::types::SessionId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in translog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Packet codec error.
    #[error("codec error: {0}")]
    Codec(#[from] translog_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A base or domain directory could not be created.
    #[error("failed creating directory {}: {source}", .path.display())]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A commit did not start above the last accepted serial.
    #[error("incoming serial number ({incoming}) must be bigger than the last one ({last})")]
    OutOfOrder {
        /// First serial of the rejected packet.
        incoming: u64,
        /// Last serial accepted by the domain.
        last: u64,
    },

    /// A part file is corrupted or invalid.
    #[error("part corruption: {message}")]
    PartCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A write was attempted on a closed part.
    #[error("part {} is closed", .file.display())]
    PartClosed {
        /// Path of the closed part.
        file: PathBuf,
    },

    /// No session with this id is registered.
    #[error("{id} not found")]
    SessionNotFound {
        /// The requested session id.
        id: SessionId,
    },

    /// A task was submitted to an executor that has been shut down.
    #[error("executor {name} is shut down")]
    ExecutorShutdown {
        /// Name of the executor.
        name: String,
    },

    /// A previous persist failed; the domain no longer accepts commits.
    #[error("domain {domain} failed: {message}")]
    DomainFailed {
        /// Name of the domain.
        domain: String,
        /// Message of the original failure.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a part corruption error.
    pub fn part_corruption(message: impl Into<String>) -> Self {
        Self::PartCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an executor shutdown error.
    pub fn executor_shutdown(name: impl Into<String>) -> Self {
        Self::ExecutorShutdown { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_message() {
        let err = CoreError::OutOfOrder {
            incoming: 3,
            last: 5,
        };
        assert_eq!(
            err.to_string(),
            "incoming serial number (3) must be bigger than the last one (5)"
        );
    }

    #[test]
    fn create_directory_shows_path() {
        let err = CoreError::CreateDirectory {
            path: PathBuf::from("/no/such"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/no/such"));
    }
}
