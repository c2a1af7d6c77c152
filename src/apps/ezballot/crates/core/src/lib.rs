//! ezballot-core: vote coordination for the ezballot service.
//!
//! The crate keeps four pieces consistent with each other:
//! - `IdentityLedger`: which identities have voted
//! - `TallyStore`: per-candidate counts with snapshot reads
//! - `VoteCoordinator`: the single entry point that writes both
//! - `ResultsPublisher`: point-in-time results for display
//!
//! Accepted votes are journaled as signed, hash-chained receipts.

mod candidate;
mod clock;
mod coordinator;
pub mod eligibility;
mod error;
mod hash;
mod identity;
mod journal;
mod ledger;
mod receipt;
mod results;
mod tally;

pub use candidate::{Candidate, CandidateId, CandidateSet};
pub use clock::{Clock, StepClock, SystemClock};
pub use coordinator::{VoteCoordinator, VoterStatus};
pub use eligibility::{
    AllowList, EligibilityProvider, OpenEligibility, RegistrationRecord, RegistrationRequest,
    RegistrationStatus, VoterRegistry,
};
pub use error::{Error, VoteError};
pub use hash::Hash;
pub use identity::VoterIdentity;
pub use journal::{FileJournal, MemoryJournal, VoteJournal};
pub use ledger::{IdentityLedger, VoteRecord};
pub use receipt::{ReceiptSigner, VoteReceipt};
pub use results::{CandidateResult, Electorate, ResultsPublisher, ResultsSummary};
pub use tally::{TallyEntry, TallySnapshot, TallyStore};

/// Re-export for convenience
pub use ed25519_dalek::VerifyingKey;
