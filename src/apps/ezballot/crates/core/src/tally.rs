//! Tally store with copy-on-write snapshots.
//!
//! Writers build a new [`TallySnapshot`] and swap it in under a short write
//! lock. Readers clone the current `Arc`, so a reader always sees one
//! complete point-in-time tally and never waits for a vote commit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::{CandidateId, CandidateSet, VoteError};

/// Vote count for one candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub candidate_id: CandidateId,
    pub count: u64,
}

/// Immutable point-in-time tally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TallySnapshot {
    counts: BTreeMap<CandidateId, u64>,
    version: u64,
}

impl TallySnapshot {
    fn seeded(candidates: &CandidateSet) -> Self {
        Self {
            counts: candidates.ids().map(|id| (id, 0)).collect(),
            version: 0,
        }
    }

    /// Number of increments applied before this snapshot was published.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn count(&self, candidate_id: CandidateId) -> Option<u64> {
        self.counts.get(&candidate_id).copied()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Entries sorted by count descending, ties by candidate id ascending.
    pub fn entries(&self) -> Vec<TallyEntry> {
        let mut entries: Vec<TallyEntry> = self
            .counts
            .iter()
            .map(|(&candidate_id, &count)| TallyEntry {
                candidate_id,
                count,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        entries
    }
}

/// Per-candidate running counts. Counts only ever grow, by one per vote.
#[derive(Debug)]
pub struct TallyStore {
    current: RwLock<Arc<TallySnapshot>>,
}

impl TallyStore {
    /// Create a store with a zero entry for every seeded candidate.
    pub fn new(candidates: &CandidateSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(TallySnapshot::seeded(candidates))),
        }
    }

    /// Add one vote for `candidate_id`. Only the coordinator calls this.
    pub(crate) fn increment(&self, candidate_id: CandidateId) -> Result<TallyEntry, VoteError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if !current.counts.contains_key(&candidate_id) {
            return Err(VoteError::UnknownCandidate(candidate_id));
        }

        let mut next = (**current).clone();
        let count = next
            .counts
            .get_mut(&candidate_id)
            .map(|count| {
                *count += 1;
                *count
            })
            .unwrap_or_default();
        next.version += 1;
        *current = Arc::new(next);

        Ok(TallyEntry {
            candidate_id,
            count,
        })
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<TallySnapshot> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    /// Current entries, sorted by count descending then candidate id.
    pub fn snapshot(&self) -> Vec<TallyEntry> {
        self.current().entries()
    }
}
