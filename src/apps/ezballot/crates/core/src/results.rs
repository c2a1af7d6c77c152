//! Results publisher: aggregated, display-ready results.
//!
//! Every figure in one call is computed from a single [`TallySnapshot`],
//! so totals always equal the sum of their parts even while votes arrive.

use serde::Serialize;
use std::sync::Arc;

use crate::{CandidateId, CandidateSet, EligibilityProvider, TallySnapshot, TallyStore};

/// One row of the results table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CandidateResult {
    pub candidate_id: CandidateId,
    pub candidate_name: String,
    pub party: String,
    pub vote_count: u64,
    /// Share of all votes, 0-100. Zero when no votes exist.
    pub percentage: f64,
}

/// Dashboard view of the election at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultsSummary {
    pub results: Vec<CandidateResult>,
    pub total_votes: u64,
    /// Top row of `results`, absent while no votes exist.
    pub leader: Option<CandidateResult>,
    /// Votes cast as a percentage of the electorate, when it is known.
    pub turnout: Option<f64>,
    /// Tally version the summary was computed from.
    pub version: u64,
}

/// Where turnout gets the electorate size from.
#[derive(Clone, Default)]
pub enum Electorate {
    #[default]
    Unknown,
    Fixed(u64),
    Provider(Arc<dyn EligibilityProvider>),
}

impl Electorate {
    fn size(&self) -> Option<u64> {
        match self {
            Electorate::Unknown => None,
            Electorate::Fixed(size) => Some(*size),
            Electorate::Provider(provider) => provider.electorate_size(),
        }
    }
}

/// Read-only view over the tally.
#[derive(Clone)]
pub struct ResultsPublisher {
    candidates: Arc<CandidateSet>,
    tally: Arc<TallyStore>,
    electorate: Electorate,
}

impl ResultsPublisher {
    pub fn new(candidates: Arc<CandidateSet>, tally: Arc<TallyStore>) -> Self {
        Self {
            candidates,
            tally,
            electorate: Electorate::Unknown,
        }
    }

    pub fn with_electorate(mut self, electorate: Electorate) -> Self {
        self.electorate = electorate;
        self
    }

    /// Results ordered by votes descending, ties by candidate id.
    pub fn get_results(&self) -> Vec<CandidateResult> {
        results_from(&self.candidates, &self.tally.current())
    }

    pub fn summary(&self) -> ResultsSummary {
        let snapshot = self.tally.current();
        let results = results_from(&self.candidates, &snapshot);
        let total_votes = snapshot.total();

        let leader = results.first().filter(|_| total_votes > 0).cloned();
        let turnout = self
            .electorate
            .size()
            .filter(|&size| size > 0)
            .map(|size| total_votes as f64 / size as f64 * 100.0);

        ResultsSummary {
            results,
            total_votes,
            leader,
            turnout,
            version: snapshot.version(),
        }
    }
}

fn results_from(candidates: &CandidateSet, snapshot: &TallySnapshot) -> Vec<CandidateResult> {
    let total = snapshot.total();
    snapshot
        .entries()
        .into_iter()
        .filter_map(|entry| {
            let candidate = candidates.get(entry.candidate_id)?;
            let percentage = if total == 0 {
                0.0
            } else {
                entry.count as f64 / total as f64 * 100.0
            };
            Some(CandidateResult {
                candidate_id: entry.candidate_id,
                candidate_name: candidate.name.clone(),
                party: candidate.party.clone(),
                vote_count: entry.count,
                percentage,
            })
        })
        .collect()
}
