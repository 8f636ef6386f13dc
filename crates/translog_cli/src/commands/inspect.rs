//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use translog_core::Domain;

/// Domain inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Domain name.
    pub domain: String,
    /// Domain directory.
    pub path: String,
    /// First serial held.
    pub begin: u64,
    /// Last serial held.
    pub end: u64,
    /// Last serial on stable storage.
    pub synced: u64,
    /// Number of entries.
    pub entry_count: usize,
    /// Total size in bytes.
    pub byte_size: u64,
    /// Number of part files.
    pub part_count: usize,
    /// Part details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<PartStats>>,
}

/// Statistics for a single part.
#[derive(Debug, Serialize)]
pub struct PartStats {
    /// File name of the part.
    pub file: String,
    /// First serial in the part.
    pub from: u64,
    /// Last serial in the part.
    pub to: u64,
    /// Number of entries.
    pub entry_count: usize,
    /// File size in bytes.
    pub byte_size: u64,
    /// Whether the part is closed.
    pub closed: bool,
}

/// Runs the inspect command.
pub fn run(
    base: &Path,
    name: &str,
    show_parts: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let domain = super::open_domain(base, name)?;
    let result = inspect(&domain, show_parts);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(domain: &Domain, show_parts: bool) -> InspectResult {
    let info = domain.domain_info();
    let parts = show_parts.then(|| {
        info.parts
            .iter()
            .map(|part| PartStats {
                file: part
                    .file
                    .file_name()
                    .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
                from: part.range.from(),
                to: part.range.to(),
                entry_count: part.num_entries,
                byte_size: part.byte_size,
                closed: part.closed,
            })
            .collect()
    });

    InspectResult {
        domain: domain.name().to_string(),
        path: domain.dir().display().to_string(),
        begin: info.range.from(),
        end: info.range.to(),
        synced: domain.synced(),
        entry_count: info.num_entries,
        byte_size: info.byte_size,
        part_count: info.parts.len(),
        parts,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Translog Domain Inspection");
    println!("==========================");
    println!();
    println!("Domain: {}", result.domain);
    println!("Path:   {}", result.path);
    println!();
    println!("Serials:");
    println!("  Range:   [{}, {}]", result.begin, result.end);
    println!("  Synced:  {}", result.synced);
    println!("  Entries: {}", result.entry_count);
    println!();
    println!("Storage:");
    println!("  Parts:      {}", result.part_count);
    println!("  Total size: {} bytes", format_size(result.byte_size));

    if let Some(parts) = &result.parts {
        println!();
        println!("Parts:");
        for part in parts {
            println!(
                "  {} [{}, {}] {} entries, {} bytes{}",
                part.file,
                part.from,
                part.to,
                part.entry_count,
                format_size(part.byte_size),
                if part.closed { "" } else { " (active)" }
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use translog_core::{DomainConfig, Entry, Packet, ThreadExecutor};

    #[test]
    fn inspect_reports_parts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let domain = Domain::open(
                "docs",
                dir.path(),
                Arc::new(ThreadExecutor::new("t-sync", 1).unwrap()),
                Arc::new(ThreadExecutor::new("t-visit", 1).unwrap()),
                DomainConfig::default(),
            )
            .unwrap();
            let mut packet = Packet::new();
            for serial in 1..=3 {
                packet.add(&Entry::new(serial, 0, vec![1u8; 4])).unwrap();
            }
            domain.commit(&packet, Box::new(|_| {})).unwrap();
        }

        let domain = super::super::open_domain(dir.path(), "docs").unwrap();
        let result = inspect(&domain, true);
        assert_eq!(result.begin, 1);
        assert_eq!(result.end, 3);
        assert_eq!(result.entry_count, 3);
        assert_eq!(result.part_count, 1);
        let parts = result.parts.unwrap();
        assert_eq!(parts[0].file, "docs-0000000000000000");
        assert!(!parts[0].closed);
    }

    #[test]
    fn missing_domain_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(super::super::open_domain(dir.path(), "nope").is_err());
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
