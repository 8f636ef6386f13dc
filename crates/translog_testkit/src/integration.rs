//! Integration helpers and suites for the commit pipeline, rotation,
//! retention and replay sessions.

use crate::fixtures::{collecting_destination, CommitLatch, WAIT};
use std::thread;
use std::time::Duration;
use translog_core::{CoreResult, Domain, Packet, SerialNum};

/// Commits every packet with a callback from `latch`, tagged with the
/// packet's first serial.
///
/// # Errors
///
/// Returns the first commit error.
pub fn commit_all(domain: &Domain, packets: &[Packet], latch: &CommitLatch) -> CoreResult<()> {
    for packet in packets {
        domain.commit(packet, latch.callback_tagged(packet.range().from()))?;
    }
    Ok(())
}

/// Hands the resident chunk to the committer regardless of its age.
///
/// # Errors
///
/// Returns an error if the chunk cannot be submitted.
pub fn flush(domain: &Domain) -> CoreResult<()> {
    let config = domain.config();
    domain.set_config(config.clone().chunk_age_limit(Duration::ZERO));
    thread::sleep(Duration::from_millis(1));
    let result = domain.commit_if_stale();
    domain.set_config(config);
    result.map(|_| ())
}

/// Replays `[from, to)` through a session and returns the serials seen.
///
/// # Errors
///
/// Returns an error if the session cannot be started.
pub fn replay(domain: &Domain, from: SerialNum, to: SerialNum) -> CoreResult<Vec<SerialNum>> {
    let (destination, handle) = collecting_destination();
    let id = domain.visit(from, to, Box::new(destination));
    domain.start_session(id)?;
    handle.wait_done(WAIT);
    domain.close_session(id)?;
    Ok(handle.serials())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{packet, packets_of_sizes, refusing_destination, wait_until, TestDomain};
    use crate::generators::{batch_sizes_strategy, PropTestConfig};
    use proptest::prelude::*;
    use translog_codec::ENTRY_HEADER_SIZE;
    use translog_core::{CoreError, DomainConfig, SessionState};

    const PAYLOAD: usize = 100;
    const ENTRY_SIZE: usize = ENTRY_HEADER_SIZE + PAYLOAD;

    #[test]
    fn chunk_limit_crossed_once_persists_one_chunk() {
        let config = DomainConfig::default().chunk_size_limit(5 * ENTRY_SIZE - 1);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();

        for serial in 1..=4 {
            domain
                .commit(&packet(serial, serial, PAYLOAD), latch.callback_tagged(serial))
                .unwrap();
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(latch.completed(), 0);
        assert_eq!(domain.stats().snapshot().chunks_persisted, 0);

        domain
            .commit(&packet(5, 5, PAYLOAD), latch.callback_tagged(5))
            .unwrap();
        assert!(latch.wait(5, WAIT));

        assert_eq!(latch.order(), vec![1, 2, 3, 4, 5]);
        assert_eq!(latch.succeeded(), 5);
        let stats = domain.stats().snapshot();
        assert_eq!(stats.chunks_persisted, 1);
        assert_eq!(stats.commits, 5);
        assert_eq!(stats.bytes_persisted, 5 * ENTRY_SIZE as u64);
        assert_eq!(domain.end(), 5);
        assert_eq!(domain.size(), 5);
    }

    #[test]
    fn out_of_order_commit_changes_nothing() {
        let domain = TestDomain::new(DomainConfig::default());
        let latch = CommitLatch::new();
        domain.commit(&packet(1, 3, 8), latch.callback()).unwrap();

        let err = domain.commit(&packet(2, 4, 8), latch.callback()).unwrap_err();
        assert!(matches!(err, CoreError::OutOfOrder { incoming: 2, last: 3 }));
        assert_eq!(domain.last_serial(), 3);

        flush(&domain).unwrap();
        assert!(latch.wait(1, WAIT));
        assert_eq!(domain.size(), 3);
        assert_eq!(domain.stats().snapshot().commits, 1);
    }

    #[test]
    fn rotation_places_whole_chunk_in_new_part() {
        let config = DomainConfig::default()
            .chunk_size_limit(0)
            .part_size_limit(200);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();

        for (from, to) in [(1, 2), (3, 4), (5, 6)] {
            domain.commit(&packet(from, to, PAYLOAD), latch.callback()).unwrap();
        }
        assert!(latch.wait(3, WAIT));

        assert_eq!(domain.part_files(), vec![0, 3, 5]);
        let info = domain.domain_info();
        let ranges: Vec<(u64, u64)> = info
            .parts
            .iter()
            .map(|part| (part.range.from(), part.range.to()))
            .collect();
        assert_eq!(ranges, vec![(1, 2), (3, 4), (5, 6)]);
        assert_eq!(domain.stats().snapshot().rotations, 2);
        assert_eq!(domain.begin(), 1);
        assert_eq!(domain.end(), 6);
        assert_eq!(domain.synced(), 4);

        let closed: Vec<bool> = info.parts.iter().map(|part| part.closed).collect();
        assert_eq!(closed, vec![true, true, false]);

        for (from, to) in [(7, 8), (9, 10), (11, 12)] {
            domain.commit(&packet(from, to, PAYLOAD), latch.callback()).unwrap();
        }
        assert!(latch.wait(6, WAIT));
        assert_eq!(latch.failed(), 0);

        let later = domain.domain_info();
        assert!(later.parts.len() > info.parts.len());
        assert_eq!(later.parts[..2], info.parts[..2]);
        assert!(later.parts[2].closed);
        assert_eq!(later.parts[2].range, info.parts[2].range);
        let (active, frozen) = later.parts.split_last().unwrap();
        assert!(!active.closed);
        assert!(frozen.iter().all(|part| part.closed));
        assert_eq!(replay(&domain, 1, 5).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_active_part_is_not_rotated() {
        let config = DomainConfig::default().chunk_size_limit(0).part_size_limit(0);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();

        domain.commit(&packet(1, 1, 8), latch.callback()).unwrap();
        assert!(latch.wait(1, WAIT));
        assert_eq!(domain.part_files(), vec![0]);
    }

    #[test]
    fn session_delivers_exact_range() {
        let domain = TestDomain::new(DomainConfig::default().chunk_size_limit(0));
        let latch = CommitLatch::new();
        commit_all(&domain, &packets_of_sizes(1, &[7, 7, 7, 9], 16), &latch).unwrap();
        assert!(latch.wait(4, WAIT));

        let (destination, handle) = collecting_destination();
        let id = domain.visit(10, 20, Box::new(destination));
        assert_eq!(domain.session_state(id), Some(SessionState::Created));
        domain.start_session(id).unwrap();

        assert!(handle.wait_done(WAIT));
        assert_eq!(handle.serials(), (10..20).collect::<Vec<_>>());
        assert!(wait_until(WAIT, || {
            domain.session_state(id) == Some(SessionState::Finished)
        }));
        domain.close_session(id).unwrap();
        assert_eq!(domain.session_state(id), None);
        assert_eq!(domain.stats().snapshot().sessions_closed, 1);
    }

    #[test]
    fn session_spans_parts() {
        let config = DomainConfig::default()
            .chunk_size_limit(0)
            .part_size_limit(300);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();
        let packets = packets_of_sizes(1, &[3; 10], PAYLOAD);
        commit_all(&domain, &packets, &latch).unwrap();
        assert!(latch.wait(10, WAIT));
        assert!(domain.part_files().len() > 2);

        assert_eq!(replay(&domain, 0, 31).unwrap(), (1..=30).collect::<Vec<_>>());
        assert_eq!(replay(&domain, 8, 23).unwrap(), (8..23).collect::<Vec<_>>());
    }

    #[test]
    fn open_range_session_goes_in_sync() {
        let domain = TestDomain::new(DomainConfig::default().chunk_size_limit(0));
        let latch = CommitLatch::new();
        domain.commit(&packet(1, 10, 8), latch.callback()).unwrap();
        assert!(latch.wait(1, WAIT));

        let (destination, handle) = collecting_destination();
        let id = domain.visit(5, SerialNum::MAX, Box::new(destination));
        domain.start_session(id).unwrap();

        assert!(handle.wait_done(WAIT));
        assert_eq!(handle.serials(), (5..=10).collect::<Vec<_>>());
        assert!(wait_until(WAIT, || {
            domain.session_state(id) == Some(SessionState::InSync)
        }));
        assert_eq!(domain.find_oldest_active_visit(), SerialNum::MAX);
        domain.close_session(id).unwrap();
    }

    #[test]
    fn fsync_on_commit_sessions_see_everything_acknowledged() {
        let config = DomainConfig::default()
            .chunk_size_limit(0)
            .fsync_on_commit(true);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();
        domain.commit(&packet(1, 6, 8), latch.callback()).unwrap();
        assert!(latch.wait(1, WAIT));

        assert_eq!(domain.synced(), 6);
        assert_eq!(replay(&domain, 1, SerialNum::MAX).unwrap(), (1..=6).collect::<Vec<_>>());
    }

    #[test]
    fn refused_packet_finishes_session() {
        let domain = TestDomain::new(DomainConfig::default().chunk_size_limit(0));
        let latch = CommitLatch::new();
        domain.commit(&packet(1, 4, 8), latch.callback()).unwrap();
        assert!(latch.wait(1, WAIT));

        let (destination, handle) = refusing_destination(0);
        let id = domain.visit(1, 100, Box::new(destination));
        domain.start_session(id).unwrap();
        assert!(wait_until(WAIT, || {
            domain.session_state(id) == Some(SessionState::Finished)
        }));
        assert!(!handle.is_done());
        assert!(handle.serials().is_empty());
        domain.close_session(id).unwrap();
    }

    #[test]
    fn start_session_twice_is_rejected() {
        let domain = TestDomain::new(DomainConfig::default());
        let (destination, _handle) = collecting_destination();
        let id = domain.visit(1, 2, Box::new(destination));
        domain.start_session(id).unwrap();

        assert!(matches!(
            domain.start_session(id),
            Err(CoreError::InvalidOperation { .. })
        ));
        domain.close_session(id).unwrap();
    }

    #[test]
    fn oldest_active_visit_tracks_open_sessions() {
        let domain = TestDomain::new(DomainConfig::default());
        assert_eq!(domain.find_oldest_active_visit(), SerialNum::MAX);

        let a = domain.visit(10, 20, Box::new(collecting_destination().0));
        let b = domain.visit(5, 8, Box::new(collecting_destination().0));
        let c = domain.visit(100, 200, Box::new(collecting_destination().0));
        assert_eq!(domain.find_oldest_active_visit(), 5);

        domain.close_session(b).unwrap();
        assert_eq!(domain.find_oldest_active_visit(), 10);
        domain.close_session(a).unwrap();
        assert_eq!(domain.find_oldest_active_visit(), 100);
        domain.close_session(c).unwrap();
        assert_eq!(domain.find_oldest_active_visit(), SerialNum::MAX);
        assert!(a < b && b < c);
    }

    #[test]
    fn erase_keeps_last_part() {
        let config = DomainConfig::default()
            .chunk_size_limit(0)
            .part_size_limit(200);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();
        commit_all(&domain, &packets_of_sizes(1, &[2, 2, 2], PAYLOAD), &latch).unwrap();
        assert!(latch.wait(3, WAIT));
        assert_eq!(domain.part_files(), vec![0, 3, 5]);

        assert!(domain.erase(4).unwrap());
        assert_eq!(domain.part_files(), vec![3, 5]);
        assert_eq!(domain.begin(), 4);
        assert_eq!(domain.end(), 6);
        assert_eq!(replay(&domain, 0, 100).unwrap(), vec![4, 5, 6]);

        assert!(domain.erase(SerialNum::MAX).unwrap());
        assert_eq!(domain.part_files(), vec![5]);
        assert_eq!(domain.begin(), 6);
        assert_eq!(domain.end(), 6);
        assert!(!domain.erase(SerialNum::MAX).unwrap());
        assert_eq!(domain.part_files(), vec![5]);
    }

    #[cfg(unix)]
    #[test]
    fn persist_failure_is_latched() {
        let config = DomainConfig::default()
            .chunk_size_limit(0)
            .part_size_limit(0);
        let domain = TestDomain::new(config);
        let latch = CommitLatch::new();
        domain.commit(&packet(1, 2, 8), latch.callback()).unwrap();
        assert!(latch.wait(1, WAIT));

        std::fs::remove_dir_all(domain.domain_dir()).unwrap();
        domain.commit(&packet(3, 4, 8), latch.callback()).unwrap();
        assert!(latch.wait(2, WAIT));
        assert_eq!(latch.failed(), 1);
        assert_eq!(domain.stats().snapshot().persist_failures, 1);

        let err = domain.commit(&packet(5, 6, 8), latch.callback()).unwrap_err();
        assert!(matches!(err, CoreError::DomainFailed { .. }));
    }

    proptest! {
        #![proptest_config(PropTestConfig::on_disk().to_proptest_config())]

        #[test]
        fn erase_bounds_hold(sizes in batch_sizes_strategy(), to in 0u64..400) {
            let config = DomainConfig::default()
                .chunk_size_limit(0)
                .part_size_limit(400);
            let domain = TestDomain::new(config);
            let latch = CommitLatch::new();
            let packets = packets_of_sizes(1, &sizes, 32);
            commit_all(&domain, &packets, &latch).unwrap();
            prop_assert!(latch.wait(packets.len(), WAIT));

            let end = domain.end();
            let parts = domain.part_files().len();
            domain.erase(to).unwrap();

            prop_assert_eq!(domain.end(), end);
            prop_assert!(domain.begin() >= to.min(end));
            prop_assert!(!domain.part_files().is_empty());
            prop_assert!(domain.part_files().len() <= parts);
        }
    }
}
