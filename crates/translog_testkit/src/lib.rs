//! # Translog Testkit
//!
//! Test utilities for translog.
//!
//! This crate provides:
//! - Fixtures: temporary domains, collecting destinations, commit latches
//! - Property-based test generators using proptest
//! - Integration suites for the commit pipeline, rotation, retention and
//!   replay sessions
//! - Crash recovery and concurrency suites
//!
//! ## Usage
//!
//! ```rust,ignore
//! use translog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_domain() {
//!     let domain = TestDomain::new(DomainConfig::default().chunk_size_limit(0));
//!     let latch = CommitLatch::new();
//!     domain.commit(&packet(1, 3, 8), latch.callback()).unwrap();
//!     assert!(latch.wait(1, WAIT));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use translog_core::{
        CoreError, Domain, DomainConfig, Entry, Packet, SerialNum, SessionId, SessionState,
    };
}

pub use fixtures::*;
pub use generators::*;
