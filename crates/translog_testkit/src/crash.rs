//! Crash recovery testing for translog.
//!
//! Simulates the on-disk states a crash can leave behind and verifies that
//! reopening a domain recovers them:
//!
//! 1. **Torn write** - the last frame of the active part is incomplete
//! 2. **Aborted rotation** - a new, empty part was created but never written
//! 3. **Damaged closed part** - corruption before the tail is fatal
//! 4. **Damaged header** - a complete but invalid part header is fatal,
//!    even in the active part
//!
//! ## Usage
//!
//! ```rust,ignore
//! use translog_testkit::crash::{tear_tail, CrashPoint};
//!
//! test.close();
//! tear_tail(&test.part_path(0), 5)?;
//! test.reopen();
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use translog_core::{DefaultHeaderContext, DomainConfig, DomainPart, SerialNum};

/// Offset of the format version in a part header.
const HEADER_VERSION_OFFSET: usize = 8;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash in the middle of appending a frame.
    DuringAppend,
    /// Crash right after the file of a new part was created.
    AfterPartCreated,
    /// Garbage after the last complete frame of a closed part.
    ClosedPartDamaged,
    /// A flipped version byte in the header of the active part.
    ActiveHeaderDamaged,
}

/// Cuts `bytes` off the end of the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or truncated.
pub fn tear_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

/// Appends `garbage` to the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_garbage(path: &Path, garbage: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(garbage)?;
    file.sync_all()
}

/// Flips every bit of the byte at `offset` in the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn flip_byte(path: &Path, offset: usize) -> io::Result<()> {
    let mut bytes = fs::read(path)?;
    let Some(byte) = bytes.get_mut(offset) else {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("offset {offset} is past the end of {}", path.display()),
        ));
    };
    *byte ^= 0xFF;
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(&bytes)?;
    file.sync_all()
}

/// Leaves behind an empty part of `domain` starting at `start`, as a
/// rotation interrupted right after creating the file would.
///
/// # Errors
///
/// Returns an error if the part cannot be created.
pub fn create_empty_part(
    domain: &str,
    dir: &Path,
    start: SerialNum,
    config: &DomainConfig,
) -> translog_core::CoreResult<()> {
    let part = DomainPart::open(
        domain,
        dir,
        start,
        config.encoding,
        config.compression_level,
        &DefaultHeaderContext,
        true,
    )?;
    part.close()
}

/// Applies `point` to a closed domain whose parts start at `parts`.
///
/// # Errors
///
/// Returns an error if the files cannot be modified.
pub fn simulate(
    point: CrashPoint,
    domain: &str,
    dir: &Path,
    parts: &[SerialNum],
    config: &DomainConfig,
) -> translog_core::CoreResult<()> {
    let part_path = |serial: SerialNum| dir.join(translog_core::part_file_name(domain, serial));
    match point {
        CrashPoint::DuringAppend => {
            let last = parts.last().copied().unwrap_or(0);
            tear_tail(&part_path(last), 7)?;
        }
        CrashPoint::AfterPartCreated => {
            let next = parts.last().copied().unwrap_or(0) + 1_000_000;
            create_empty_part(domain, dir, next, config)?;
        }
        CrashPoint::ClosedPartDamaged => {
            let first = parts.first().copied().unwrap_or(0);
            append_garbage(&part_path(first), b"not a frame")?;
        }
        CrashPoint::ActiveHeaderDamaged => {
            let last = parts.last().copied().unwrap_or(0);
            flip_byte(&part_path(last), HEADER_VERSION_OFFSET)?;
        }
    }
    Ok(())
}
