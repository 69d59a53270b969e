//! Mutation log returned by a locked session on close (spec §3, "Mutation
//! log"): an ordered list of `(prefix_name, new_state_number)` pairs, one
//! per commit that happened while the session held its lock.

use serde::{Deserialize, Serialize};

/// One commit recorded while a [`crate::session::LockedSession`] was open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Name of the prefix that committed.
    pub prefix_name: String,
    /// The new finalized state number that commit produced.
    pub new_state_number: u64,
}

/// Ordered record of every commit observed by a locked session. Per spec
/// §4.3 "Ordering guarantees": commits across prefixes are applied in
/// order under one locked session, and this log reflects that order, even
/// though each prefix's own state numbers advance independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationLog {
    entries: Vec<MutationRecord>,
}

impl MutationLog {
    /// A fresh, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one commit, in the order it was observed.
    pub fn push(&mut self, prefix_name: impl Into<String>, new_state_number: u64) {
        self.entries.push(MutationRecord {
            prefix_name: prefix_name.into(),
            new_state_number,
        });
    }

    /// The recorded commits, oldest first.
    pub fn entries(&self) -> &[MutationRecord] {
        &self.entries
    }

    /// Number of commits recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no commits were recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize for cross-process / host-language delivery.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_commits_in_order() {
        let mut log = MutationLog::new();
        log.push("a", 1);
        log.push("b", 1);
        log.push("a", 2);
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[2].prefix_name, "a");
        assert_eq!(log.entries()[2].new_state_number, 2);
    }

    #[test]
    fn round_trips_through_msgpack() {
        let mut log = MutationLog::new();
        log.push("inventory", 7);
        let bytes = log.to_bytes().unwrap();
        let back: MutationLog = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back.entries(), log.entries());
    }
}
