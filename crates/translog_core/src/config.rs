//! Domain configuration.

use std::time::Duration;

/// Checksum applied to every frame written to a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Crc {
    /// No checksum; the checksum field is written as zero.
    None = 0,
    /// CRC-32 (IEEE).
    #[default]
    Crc32 = 1,
}

impl Crc {
    /// Converts a byte to a checksum kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Crc32),
            _ => None,
        }
    }

    /// Converts the checksum kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Computes the checksum of `data`.
    #[must_use]
    pub fn checksum(self, data: &[u8]) -> u32 {
        match self {
            Self::None => 0,
            Self::Crc32 => crc32fast::hash(data),
        }
    }
}

/// Encoding of frames in newly created parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encoding {
    crc: Crc,
}

impl Encoding {
    /// Creates an encoding.
    #[must_use]
    pub const fn new(crc: Crc) -> Self {
        Self { crc }
    }

    /// Checksum kind.
    #[must_use]
    pub const fn crc(self) -> Crc {
        self.crc
    }
}

/// Configuration for a log domain.
#[derive(Debug, Clone)]
pub struct DomainConfig {
    /// A chunk is handed to the commit pipeline once its encoded size
    /// exceeds this many bytes.
    pub chunk_size_limit: usize,

    /// A non-empty chunk older than this is flushed by
    /// [`Domain::commit_if_stale`](crate::Domain::commit_if_stale).
    pub chunk_age_limit: Duration,

    /// The active part is rotated before the next write once its byte size
    /// exceeds this limit.
    ///
    /// A part holding no entries is never rotated, even when its header
    /// alone exceeds the limit. Chunks are not split, so a part can end up
    /// larger than the limit by one chunk.
    pub part_size_limit: u64,

    /// Whether every persisted chunk is fsynced before its callbacks fire.
    pub fsync_on_commit: bool,

    /// Frame encoding for new parts.
    pub encoding: Encoding,

    /// Compression level recorded in new part headers.
    pub compression_level: u8,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            chunk_size_limit: 256 * 1024,              // 256 KB
            chunk_age_limit: Duration::from_millis(10),
            part_size_limit: 256 * 1024 * 1024,       // 256 MB
            fsync_on_commit: false,
            encoding: Encoding::default(),
            compression_level: 9,
        }
    }
}

impl DomainConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chunk size limit in bytes.
    #[must_use]
    pub const fn chunk_size_limit(mut self, bytes: usize) -> Self {
        self.chunk_size_limit = bytes;
        self
    }

    /// Sets the chunk age limit.
    #[must_use]
    pub const fn chunk_age_limit(mut self, age: Duration) -> Self {
        self.chunk_age_limit = age;
        self
    }

    /// Sets the part size limit in bytes.
    ///
    /// An empty part is never rotated, whatever its size.
    #[must_use]
    pub const fn part_size_limit(mut self, bytes: u64) -> Self {
        self.part_size_limit = bytes;
        self
    }

    /// Sets whether to fsync on every persisted chunk.
    #[must_use]
    pub const fn fsync_on_commit(mut self, value: bool) -> Self {
        self.fsync_on_commit = value;
        self
    }

    /// Sets the frame encoding for new parts.
    #[must_use]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the compression level recorded in new part headers.
    #[must_use]
    pub const fn compression_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }
}
