//! # Translog Core
//!
//! The log domain manager of the translog write-ahead log.
//!
//! A [`Domain`] records an append-only sequence of serial-numbered
//! operations for one named stream. This crate provides:
//! - Chunk batching of concurrent commits
//! - A single-writer commit pipeline with optional fsync-on-commit
//! - Rotation of on-disk parts and prefix retention
//! - Replay sessions over serial ranges
//!
//! ## Durability
//!
//! A commit callback fires once the batch has been appended to its part.
//! The batch is on stable storage at that point only when
//! [`DomainConfig::fsync_on_commit`] is set; otherwise it is sequenced and
//! buffered by the operating system until the next sync. Sessions read
//! the same way: with fsync-on-commit they only see synced data.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use translog_core::{Domain, DomainConfig, ThreadExecutor};
//! use translog_codec::{Entry, Packet};
//!
//! let sync_executor = Arc::new(ThreadExecutor::new("tls-sync", 1)?);
//! let session_executor = Arc::new(ThreadExecutor::new("tls-visit", 4)?);
//! let domain = Domain::open(
//!     "docs",
//!     base_dir,
//!     sync_executor,
//!     session_executor,
//!     DomainConfig::default(),
//! )?;
//!
//! let mut packet = Packet::new();
//! packet.add(&Entry::new(1, 0, &b"put"[..]))?;
//! domain.commit(&packet, Box::new(|result| assert!(result.is_ok())))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod config;
mod dir;
mod domain;
mod error;
mod executor;
mod info;
mod part;
mod session;
mod stats;
mod types;

pub use chunk::{CommitResult, DoneCallback};
pub use config::{Crc, DomainConfig, Encoding};
pub use dir::{part_file_name, parse_part_file_name, scan_dir, sync_directory};
pub use domain::Domain;
pub use error::{CoreError, CoreResult};
pub use executor::{Executor, Task, ThreadExecutor};
pub use info::{DomainInfo, PartInfo};
pub use part::{DefaultHeaderContext, DomainPart, FileHeaderContext, HeaderTags};
pub use session::{Destination, SessionState};
pub use stats::{DomainStats, StatsSnapshot};
pub use types::SessionId;

pub use translog_codec::{Entry, Packet, SerialNum, SerialNumRange};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
