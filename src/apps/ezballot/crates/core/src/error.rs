//! Error types for ezballot-core.

use thiserror::Error;

use crate::{CandidateId, VoterIdentity};

/// Failures of a vote submission.
///
/// Every variant leaves the ledger and the tally exactly as they were.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VoteError {
    /// The identity already has a vote on record.
    #[error("identity {0} has already voted")]
    AlreadyVoted(VoterIdentity),

    /// The candidate is not part of the seeded candidate set.
    #[error("unknown candidate: {0}")]
    UnknownCandidate(CandidateId),

    /// The eligibility provider refused the identity.
    #[error("identity {0} is not eligible to vote")]
    IdentityNotEligible(VoterIdentity),

    /// The durable store could not accept the vote.
    #[error("vote storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl VoteError {
    /// Whether the voter can do something about this failure.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyVoted(_) | Self::IdentityNotEligible(_))
    }

    /// Short machine-readable category, used for logging and API bodies.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyVoted(_) => "already_voted",
            Self::UnknownCandidate(_) => "unknown_candidate",
            Self::IdentityNotEligible(_) => "not_eligible",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

/// Core errors outside of vote submission.
#[derive(Debug, Error)]
pub enum Error {
    /// A vote submission failed.
    #[error(transparent)]
    Vote(#[from] VoteError),

    /// The raw identity string cannot be used as a voter identity.
    #[error("invalid voter identity: {0}")]
    InvalidIdentity(String),

    /// Two seeded candidates share an id.
    #[error("duplicate candidate id: {0}")]
    DuplicateCandidate(CandidateId),

    /// A registration request failed validation.
    #[error("invalid registration field {field}: {message}")]
    InvalidRegistration { field: &'static str, message: String },

    /// The identity or national id is already registered.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Registrations could not be persisted; nothing was registered.
    #[error("registry storage unavailable: {0}")]
    RegistryUnavailable(String),

    /// The journal does not replay into a consistent ledger.
    #[error("journal corrupt at sequence {sequence}: {reason}")]
    JournalCorrupt { sequence: u64, reason: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt<S: Into<String>>(sequence: u64, reason: S) -> Self {
        Self::JournalCorrupt {
            sequence,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_registration<S: Into<String>>(field: &'static str, message: S) -> Self {
        Self::InvalidRegistration {
            field,
            message: message.into(),
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors() {
        let id = VoterIdentity::new("0xabc").unwrap();
        assert!(VoteError::AlreadyVoted(id.clone()).is_user_recoverable());
        assert!(VoteError::IdentityNotEligible(id).is_user_recoverable());
        assert!(!VoteError::UnknownCandidate(CandidateId(9)).is_user_recoverable());
        assert!(!VoteError::StorageUnavailable("disk".into()).is_user_recoverable());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(
            VoteError::UnknownCandidate(CandidateId(1)).category(),
            "unknown_candidate"
        );
        assert_eq!(
            VoteError::StorageUnavailable(String::new()).category(),
            "storage_unavailable"
        );
    }
}
