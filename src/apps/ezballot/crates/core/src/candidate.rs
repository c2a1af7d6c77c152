//! Candidates and the seeded candidate set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::Error;

/// Stable candidate identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u32);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A candidate on the ballot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub party: String,
    /// Ballot symbol, if the election uses them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Candidate {
    pub fn new(id: u32, name: impl Into<String>, party: impl Into<String>) -> Self {
        Self {
            id: CandidateId(id),
            name: name.into(),
            party: party.into(),
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// The read-only set of candidates, seeded once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: BTreeMap<CandidateId, Candidate>,
}

impl CandidateSet {
    /// Build the set, rejecting duplicate ids.
    pub fn new(candidates: impl IntoIterator<Item = Candidate>) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        for candidate in candidates {
            let id = candidate.id;
            if map.insert(id, candidate).is_some() {
                return Err(Error::DuplicateCandidate(id));
            }
        }
        Ok(Self { candidates: map })
    }

    pub fn get(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.get(&id)
    }

    pub fn contains(&self, id: CandidateId) -> bool {
        self.candidates.contains_key(&id)
    }

    /// Candidates in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = CandidateId> + '_ {
        self.candidates.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
