//! Property-based test generators using proptest.
//!
//! Provides strategies for payloads, batch layouts and domain
//! configurations that keep serials strictly increasing.

use proptest::prelude::*;
use std::time::Duration;
use translog_core::{Crc, DomainConfig, Encoding, Entry, Packet, SerialNum};

/// Strategy for entry payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Strategy for the number of entries in each of a run of commits.
pub fn batch_sizes_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..8, 1..40)
}

/// Strategy for a packet of entries starting right after `last`, with
/// random gaps between serials and random payloads.
pub fn packet_after_strategy(last: SerialNum) -> impl Strategy<Value = Packet> {
    prop::collection::vec((1u64..4, any::<u32>(), payload_strategy()), 1..16).prop_map(
        move |layout| {
            let mut packet = Packet::new();
            let mut serial = last;
            for (gap, entry_type, data) in layout {
                serial += gap;
                packet
                    .add(&Entry::new(serial, entry_type, data))
                    .expect("Serials are increasing");
            }
            packet
        },
    )
}

/// Strategy for domain configurations with small limits, so a handful of
/// commits exercises chunk flushing and part rotation.
pub fn small_config_strategy() -> impl Strategy<Value = DomainConfig> {
    (0usize..2048, 0u64..4096, any::<bool>(), any::<bool>()).prop_map(
        |(chunk_size_limit, part_size_limit, fsync_on_commit, checked)| {
            let crc = if checked { Crc::Crc32 } else { Crc::None };
            DomainConfig::default()
                .chunk_size_limit(chunk_size_limit)
                .chunk_age_limit(Duration::ZERO)
                .part_size_limit(part_size_limit)
                .fsync_on_commit(fsync_on_commit)
                .encoding(Encoding::new(crc))
        },
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for tests that touch the file system.
    #[must_use]
    pub fn on_disk() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 50,
        }
    }

    /// Creates a configuration for quick in-memory tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 64,
            max_shrink_iters: 200,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn packet_starts_after_last(
            (last, packet) in (0u64..1_000_000).prop_flat_map(|last| (Just(last), packet_after_strategy(last)))
        ) {
            prop_assert!(packet.range().from() > last);
            prop_assert!(!packet.is_empty());
            prop_assert_eq!(Packet::from_bytes(packet.bytes()).unwrap(), packet);
        }

        #[test]
        fn batch_sizes_are_positive(sizes in batch_sizes_strategy()) {
            prop_assert!(sizes.iter().all(|&n| n > 0));
        }
    }
}
