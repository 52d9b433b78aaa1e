//! Staged rollout membership.
//!
//! A client's bucket for a release is derived from a SHA-256 digest of the
//! client id and the release identifier, so the same client always lands in
//! the same bucket for a given release while its buckets for different
//! releases are unrelated. A client is selected while its bucket is below the
//! rollout percentage, which makes raising the percentage only ever add
//! clients to the cohort.

use sha2::{Digest, Sha256};

const DELIMITER: &str = "-";

/// A rollout percentage in `1..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RolloutPercentage(u8);

impl RolloutPercentage {
    pub const FULL: RolloutPercentage = RolloutPercentage(100);

    pub fn new(percentage: u8) -> Option<Self> {
        (1..=100)
            .contains(&percentage)
            .then_some(RolloutPercentage(percentage))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_unfinished(self) -> bool {
        self.0 < 100
    }
}

/// The bucket in `0..100` a client falls into for one release.
pub fn rollout_bucket(client_unique_id: &str, identifier: &str) -> u8 {
    let digest = Sha256::new()
        .chain_update(client_unique_id)
        .chain_update(DELIMITER)
        .chain_update(identifier)
        .finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % 100) as u8
}

/// Whether a client is in the cohort currently eligible for a release.
///
/// `identifier` is the release's label, or its package hash when unlabelled.
pub fn is_selected_for_rollout(
    client_unique_id: &str,
    rollout: RolloutPercentage,
    identifier: &str,
) -> bool {
    rollout_bucket(client_unique_id, identifier) < rollout.get()
}
