//! Identity ledger: which identities have voted, and for whom.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{PoisonError, RwLock};

use crate::{CandidateId, VoteError, VoterIdentity};

/// The single record of one identity's vote. Never mutated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_identity: VoterIdentity,
    pub candidate_id: CandidateId,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Keyed store of vote records. At most one record per identity.
#[derive(Debug, Default)]
pub struct IdentityLedger {
    records: RwLock<HashMap<VoterIdentity, VoteRecord>>,
}

impl IdentityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_voted(&self, identity: &VoterIdentity) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identity)
    }

    /// Check-and-insert under one write lock.
    ///
    /// Only the coordinator calls this, so records and tally stay paired.
    pub(crate) fn record_vote(
        &self,
        identity: VoterIdentity,
        candidate_id: CandidateId,
        timestamp: u64,
    ) -> Result<VoteRecord, VoteError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.entry(identity) {
            Entry::Occupied(entry) => Err(VoteError::AlreadyVoted(entry.key().clone())),
            Entry::Vacant(entry) => {
                let record = VoteRecord {
                    voter_identity: entry.key().clone(),
                    candidate_id,
                    timestamp,
                };
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn get(&self, identity: &VoterIdentity) -> Option<VoteRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records ordered by timestamp, then identity.
    pub fn records(&self) -> Vec<VoteRecord> {
        let mut records: Vec<VoteRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.voter_identity.cmp(&b.voter_identity))
        });
        records
    }
}
