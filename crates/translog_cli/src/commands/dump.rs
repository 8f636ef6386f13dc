//! Dump command implementation.
//!
//! Entries are read through a regular replay session, so the dump shows
//! exactly what a session reader would receive.

use serde::Serialize;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use translog_codec::Packet;
use translog_core::{Destination, Domain, SessionId, SessionState};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Log entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Serial number.
    pub serial: u64,
    /// Entry type.
    pub entry_type: u32,
    /// Payload size in bytes.
    pub size: usize,
}

/// Range and limit of a dump.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// First serial to dump.
    pub from: u64,
    /// Dump serials below this one.
    pub to: u64,
    /// Maximum number of entries.
    pub limit: Option<usize>,
}

enum Event {
    Entry(EntryInfo),
    Done,
}

/// Forwards entries to the dumping thread until the limit is reached.
struct ChannelDestination {
    sender: Sender<Event>,
    remaining: usize,
}

impl Destination for ChannelDestination {
    fn send(&mut self, _session: SessionId, _domain: &str, packet: &Packet) -> bool {
        for entry in packet {
            let Ok(entry) = entry else {
                return false;
            };
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            let info = EntryInfo {
                serial: entry.serial(),
                entry_type: entry.entry_type(),
                size: entry.data().len(),
            };
            if self.sender.send(Event::Entry(info)).is_err() {
                return false;
            }
        }
        self.remaining > 0
    }

    fn send_done(&mut self, _session: SessionId, _domain: &str) -> bool {
        self.sender.send(Event::Done).is_ok()
    }
}

/// Runs the dump command.
pub fn run(
    base: &Path,
    name: &str,
    options: &DumpOptions,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let domain = super::open_domain(base, name)?;
    let entries = collect_entries(&domain, options)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn collect_entries(
    domain: &Domain,
    options: &DumpOptions,
) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let (sender, receiver) = mpsc::channel();
    let destination = ChannelDestination {
        sender,
        remaining: options.limit.unwrap_or(usize::MAX),
    };
    let id = domain.visit(options.from, options.to, Box::new(destination));
    domain.start_session(id)?;

    let entries = drain(domain, id, &receiver);
    domain.close_session(id)?;
    tracing::debug!(domain = domain.name(), %id, entries = entries.len(), "dump finished");
    Ok(entries)
}

fn drain(domain: &Domain, id: SessionId, receiver: &Receiver<Event>) -> Vec<EntryInfo> {
    let mut entries = Vec::new();
    loop {
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Entry(info)) => entries.push(info),
            Ok(Event::Done) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let running = matches!(
                    domain.session_state(id),
                    Some(SessionState::Created | SessionState::Running)
                );
                if !running {
                    break;
                }
            }
        }
    }
    // Whatever arrived before the session stopped.
    while let Ok(event) = receiver.try_recv() {
        if let Event::Entry(info) = event {
            entries.push(info);
        }
    }
    entries
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("{:>20}  {:>6}  {:>10}", "SERIAL", "TYPE", "SIZE");
    for entry in entries {
        println!(
            "{:>20}  {:>6}  {:>10}",
            entry.serial, entry.entry_type, entry.size
        );
    }
    println!();
    println!("{} entries", entries.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use translog_core::{DomainConfig, Entry, ThreadExecutor};

    fn populated(dir: &Path) -> Domain {
        let domain = Domain::open(
            "docs",
            dir,
            Arc::new(ThreadExecutor::new("t-sync", 1).unwrap()),
            Arc::new(ThreadExecutor::new("t-visit", 1).unwrap()),
            DomainConfig::default().chunk_size_limit(0),
        )
        .unwrap();
        for serial in 1..=20 {
            let mut packet = Packet::new();
            packet.add(&Entry::new(serial, 7, vec![0u8; 3])).unwrap();
            domain.commit(&packet, Box::new(|_| {})).unwrap();
        }
        domain
    }

    #[test]
    fn dump_range() {
        let dir = tempfile::tempdir().unwrap();
        drop(populated(dir.path()));
        let domain = super::super::open_domain(dir.path(), "docs").unwrap();

        let options = DumpOptions {
            from: 5,
            to: 9,
            limit: None,
        };
        let entries = collect_entries(&domain, &options).unwrap();
        let serials: Vec<u64> = entries.iter().map(|e| e.serial).collect();
        assert_eq!(serials, vec![5, 6, 7, 8]);
        assert!(entries.iter().all(|e| e.entry_type == 7 && e.size == 3));
    }

    #[test]
    fn dump_limit() {
        let dir = tempfile::tempdir().unwrap();
        drop(populated(dir.path()));
        let domain = super::super::open_domain(dir.path(), "docs").unwrap();

        let options = DumpOptions {
            from: 0,
            to: u64::MAX,
            limit: Some(3),
        };
        let entries = collect_entries(&domain, &options).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].serial, 1);
    }
}
