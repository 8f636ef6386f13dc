//! Point-in-time description of a domain.

use std::path::PathBuf;
use std::time::Duration;
use translog_codec::SerialNumRange;

/// Summary of one part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    /// Serial range held by the part.
    pub range: SerialNumRange,
    /// Number of entries.
    pub num_entries: usize,
    /// File size in bytes.
    pub byte_size: u64,
    /// Path of the part file.
    pub file: PathBuf,
    /// Whether the part is closed. Only the last part accepts commits.
    pub closed: bool,
}

/// Summary of a domain, as returned by
/// [`Domain::domain_info`](crate::Domain::domain_info).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    /// `[begin, end]` of the domain.
    pub range: SerialNumRange,
    /// Entries over all parts.
    pub num_entries: usize,
    /// Bytes over all parts.
    pub byte_size: u64,
    /// Longest run time of any closed session.
    pub max_session_run_time: Duration,
    /// Parts in serial order.
    pub parts: Vec<PartInfo>,
}
