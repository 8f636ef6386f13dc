//! Domain directory layout.
//!
//! Every domain lives in its own directory below a shared base directory.
//! Each part of the domain is a file named after the domain and the first
//! serial it may hold:
//!
//! ```text
//! <base_dir>/
//! └─ <domain>/
//!    ├─ <domain>-0000000000000000
//!    ├─ <domain>-0000000000004711
//!    └─ <domain>-0000000000009100   # active part
//! ```
//!
//! Names that do not match this exact pattern (for instance a serial that
//! is not zero-padded to 16 digits) are ignored when scanning.

use crate::error::{CoreError, CoreResult};
use std::fs::{self, File};
use std::path::Path;
use translog_codec::SerialNum;

/// Returns the file name of the part of `domain` starting at `serial`.
#[must_use]
pub fn part_file_name(domain: &str, serial: SerialNum) -> String {
    format!("{domain}-{serial:016}")
}

/// Parses a part file name, returning the start serial.
///
/// Returns `None` unless `file_name` is exactly what [`part_file_name`]
/// would produce for `domain`.
#[must_use]
pub fn parse_part_file_name(domain: &str, file_name: &str) -> Option<SerialNum> {
    let digits = file_name.strip_prefix(domain)?.strip_prefix('-')?;
    let serial: SerialNum = digits.parse().ok()?;
    (part_file_name(domain, serial) == file_name).then_some(serial)
}

/// Lists the start serials of all parts of `domain` in `dir`, ascending.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn scan_dir(dir: &Path, domain: &str) -> CoreResult<Vec<SerialNum>> {
    let mut serials = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(serial) = parse_part_file_name(domain, name) {
            serials.push(serial);
        }
    }
    serials.sort_unstable();
    Ok(serials)
}

/// Creates `path` and any missing parents.
pub(crate) fn create_directory(path: &Path) -> CoreResult<()> {
    fs::create_dir_all(path).map_err(|source| CoreError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })
}

/// Syncs a directory so that created, renamed or deleted entries are durable.
///
/// On Windows, directory fsync is not supported in the same way as Unix;
/// NTFS journaling covers metadata, so this is a no-op there.
///
/// # Errors
///
/// Returns an error if the directory cannot be opened or synced.
#[cfg(unix)]
pub fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Syncs a directory so that created, renamed or deleted entries are durable.
#[cfg(not(unix))]
pub fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn file_name_is_zero_padded() {
        assert_eq!(part_file_name("docs", 42), "docs-0000000000000042");
    }

    #[test]
    fn parse_accepts_exact_names() {
        assert_eq!(parse_part_file_name("docs", "docs-0000000000000042"), Some(42));
        assert_eq!(parse_part_file_name("docs", "docs-0000000000000000"), Some(0));
    }

    #[test]
    fn parse_rejects_other_names() {
        assert_eq!(parse_part_file_name("docs", "docs-42"), None);
        assert_eq!(parse_part_file_name("docs", "docs-+000000000000042"), None);
        assert_eq!(parse_part_file_name("docs", "docs_0000000000000042"), None);
        assert_eq!(parse_part_file_name("docs", "other-0000000000000042"), None);
        assert_eq!(parse_part_file_name("doc", "docs-0000000000000042"), None);
        assert_eq!(parse_part_file_name("docs", "docs-0000000000000042.tmp"), None);
    }

    #[test]
    fn scan_dir_sorts_and_filters() {
        let dir = tempdir().unwrap();
        for name in [
            "docs-0000000000000300",
            "docs-0000000000000007",
            "docs-12",
            "users-0000000000000001",
            "README",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let serials = scan_dir(dir.path(), "docs").unwrap();
        assert_eq!(serials, vec![7, 300]);
    }

    #[test]
    fn create_directory_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        create_directory(&nested).unwrap();
        assert!(nested.is_dir());
        sync_directory(&nested).unwrap();
    }

    #[test]
    fn create_directory_fails_on_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        File::create(&file).unwrap();

        let err = create_directory(&file.join("sub")).unwrap_err();
        assert!(matches!(err, CoreError::CreateDirectory { .. }));
    }

    proptest! {
        #[test]
        fn every_serial_names_a_parseable_part(serial in any::<u64>(), name in "[a-z]{1,12}") {
            let file_name = part_file_name(&name, serial);
            prop_assert_eq!(parse_part_file_name(&name, &file_name), Some(serial));
        }
    }
}
