//! The vote coordinator: the only writer of the ledger and the tally.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ed25519_dalek::VerifyingKey;
use tracing::{debug, error, info, warn};

use crate::results::Electorate;
use crate::{
    CandidateId, CandidateSet, Clock, EligibilityProvider, Error, Hash, IdentityLedger,
    ReceiptSigner, ResultsPublisher, SystemClock, TallyStore, VoteError, VoteJournal, VoteReceipt,
    VoteRecord, VoterIdentity,
};

/// Per-identity voting state. `Voted` is terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoterStatus {
    NotVoted,
    Voted(VoteRecord),
}

/// State guarded by the write gate.
struct Writer {
    journal: Box<dyn VoteJournal>,
    head: Hash,
    next_sequence: u64,
}

/// Accepts votes, enforcing one vote per identity.
///
/// All submissions go through a single write gate: the ledger check, the
/// journal append, the ledger insert and the tally increment happen while
/// it is held. Reads never take the gate.
pub struct VoteCoordinator {
    candidates: Arc<CandidateSet>,
    ledger: IdentityLedger,
    tally: Arc<TallyStore>,
    receipts: RwLock<HashMap<VoterIdentity, VoteReceipt>>,
    eligibility: Arc<dyn EligibilityProvider>,
    signer: ReceiptSigner,
    clock: Box<dyn Clock>,
    writer: Mutex<Writer>,
}

impl VoteCoordinator {
    /// Open a coordinator, replaying and verifying everything in `journal`.
    pub fn open(
        candidates: CandidateSet,
        eligibility: impl EligibilityProvider + 'static,
        journal: impl VoteJournal + 'static,
        signer: ReceiptSigner,
    ) -> Result<Self, Error> {
        let mut journal: Box<dyn VoteJournal> = Box::new(journal);
        let candidates = Arc::new(candidates);
        let ledger = IdentityLedger::new();
        let tally = Arc::new(TallyStore::new(&candidates));
        let verifying_key = signer.verifying_key();

        let mut receipts = HashMap::new();
        let mut head = Hash::ZERO;

        for (index, receipt) in journal.load()?.into_iter().enumerate() {
            let sequence = index as u64;
            if receipt.sequence != sequence {
                return Err(Error::corrupt(
                    sequence,
                    format!("unexpected sequence number {}", receipt.sequence),
                ));
            }
            if receipt.prev != head {
                return Err(Error::corrupt(sequence, "broken hash link"));
            }
            if !receipt.verify(&verifying_key) {
                return Err(Error::corrupt(sequence, "digest or signature mismatch"));
            }
            if !candidates.contains(receipt.candidate_id) {
                return Err(Error::corrupt(
                    sequence,
                    format!("unknown candidate {}", receipt.candidate_id),
                ));
            }

            ledger
                .record_vote(
                    receipt.voter_identity.clone(),
                    receipt.candidate_id,
                    receipt.timestamp,
                )
                .map_err(|e| Error::corrupt(sequence, e.to_string()))?;
            tally
                .increment(receipt.candidate_id)
                .map_err(|e| Error::corrupt(sequence, e.to_string()))?;

            head = receipt.digest;
            receipts.insert(receipt.voter_identity.clone(), receipt);
        }

        let next_sequence = receipts.len() as u64;
        info!(
            votes = next_sequence,
            candidates = candidates.len(),
            head = %head,
            "Vote journal replayed"
        );

        Ok(Self {
            candidates,
            ledger,
            tally,
            receipts: RwLock::new(receipts),
            eligibility: Arc::new(eligibility),
            signer,
            clock: Box::new(SystemClock),
            writer: Mutex::new(Writer {
                journal,
                head,
                next_sequence,
            }),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Cast a vote for `candidate_id` as `identity`.
    ///
    /// Either the ledger entry and the tally increment both happen, or
    /// neither does. Fails fast; there is no retry.
    pub fn submit_vote(
        &self,
        identity: &VoterIdentity,
        candidate_id: CandidateId,
    ) -> Result<VoteReceipt, VoteError> {
        if !self.candidates.contains(candidate_id) {
            warn!(%identity, %candidate_id, "Rejected vote for unknown candidate");
            return Err(VoteError::UnknownCandidate(candidate_id));
        }

        let mut writer = self.writer.lock().map_err(|_| {
            error!("Vote writer poisoned; refusing further votes");
            VoteError::StorageUnavailable("vote writer is unavailable".to_string())
        })?;

        // A recorded vote is final whatever the eligibility source says now.
        if self.ledger.has_voted(identity) {
            debug!(%identity, "Rejected repeat vote");
            return Err(VoteError::AlreadyVoted(identity.clone()));
        }
        if !self.eligibility.is_eligible(identity) {
            debug!(%identity, "Rejected vote from ineligible identity");
            return Err(VoteError::IdentityNotEligible(identity.clone()));
        }

        let receipt = VoteReceipt::issue(
            writer.next_sequence,
            identity.clone(),
            candidate_id,
            self.clock.now_millis(),
            writer.head,
            &self.signer,
        )
        .map_err(|e| VoteError::StorageUnavailable(e.to_string()))?;

        if let Err(e) = writer.journal.append(&receipt) {
            error!(error = %e, sequence = receipt.sequence, "Failed to journal vote");
            return Err(VoteError::StorageUnavailable(e.to_string()));
        }
        writer.head = receipt.digest;
        writer.next_sequence += 1;

        self.ledger
            .record_vote(identity.clone(), candidate_id, receipt.timestamp)?;
        let entry = self.tally.increment(candidate_id)?;
        self.receipts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.clone(), receipt.clone());

        info!(
            sequence = receipt.sequence,
            %candidate_id,
            candidate_votes = entry.count,
            "Vote accepted"
        );
        Ok(receipt)
    }

    pub fn has_voted(&self, identity: &VoterIdentity) -> bool {
        self.ledger.has_voted(identity)
    }

    pub fn status(&self, identity: &VoterIdentity) -> VoterStatus {
        match self.ledger.get(identity) {
            Some(record) => VoterStatus::Voted(record),
            None => VoterStatus::NotVoted,
        }
    }

    /// The receipt issued for `identity`, if it voted.
    pub fn receipt(&self, identity: &VoterIdentity) -> Option<VoteReceipt> {
        self.receipts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Number of vote records.
    pub fn vote_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    pub fn tally(&self) -> &Arc<TallyStore> {
        &self.tally
    }

    pub fn candidates(&self) -> &Arc<CandidateSet> {
        &self.candidates
    }

    /// Public key that verifies every receipt this coordinator issues.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    /// Digest of the newest receipt, `Hash::ZERO` before the first vote.
    pub fn head(&self) -> Hash {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .head
    }

    /// A results publisher over this coordinator's tally.
    ///
    /// Turnout is computed against `electorate_size` when given, otherwise
    /// against the eligibility provider's electorate.
    pub fn publisher(&self, electorate_size: Option<u64>) -> ResultsPublisher {
        let electorate = match electorate_size {
            Some(size) => Electorate::Fixed(size),
            None => Electorate::Provider(Arc::clone(&self.eligibility)),
        };
        ResultsPublisher::new(Arc::clone(&self.candidates), Arc::clone(&self.tally))
            .with_electorate(electorate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllowList, Candidate, MemoryJournal, OpenEligibility, StepClock};

    fn candidates() -> CandidateSet {
        CandidateSet::new([Candidate::new(1, "A", "P"), Candidate::new(2, "B", "Q")]).unwrap()
    }

    fn id(s: &str) -> VoterIdentity {
        VoterIdentity::new(s).unwrap()
    }

    fn coordinator(journal: MemoryJournal) -> VoteCoordinator {
        VoteCoordinator::open(candidates(), OpenEligibility, journal, ReceiptSigner::generate())
            .unwrap()
            .with_clock(StepClock::starting_at(1_000))
    }

    #[test]
    fn status_moves_from_not_voted_to_voted() {
        let c = coordinator(MemoryJournal::new());
        assert_eq!(c.status(&id("x1")), VoterStatus::NotVoted);

        let receipt = c.submit_vote(&id("x1"), CandidateId(1)).unwrap();
        assert_eq!(c.status(&id("x1")), VoterStatus::Voted(receipt.record()));
        assert_eq!(c.receipt(&id("x1")), Some(receipt));
    }

    #[test]
    fn receipts_chain_and_verify() {
        let c = coordinator(MemoryJournal::new());
        let first = c.submit_vote(&id("x1"), CandidateId(1)).unwrap();
        let second = c.submit_vote(&id("x2"), CandidateId(2)).unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(first.prev, Hash::ZERO);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.prev, first.digest);
        assert_eq!(c.head(), second.digest);
        assert!(first.verify(&c.verifying_key()));
        assert!(second.verify(&c.verifying_key()));
    }

    #[test]
    fn ineligible_identity_is_rejected_without_changes() {
        let journal = MemoryJournal::new();
        let c = VoteCoordinator::open(
            candidates(),
            AllowList::new([id("x1")]),
            journal.clone(),
            ReceiptSigner::generate(),
        )
        .unwrap();

        assert_eq!(
            c.submit_vote(&id("x9"), CandidateId(1)),
            Err(VoteError::IdentityNotEligible(id("x9")))
        );
        assert_eq!(c.vote_count(), 0);
        assert_eq!(c.tally().current().total(), 0);
        assert!(journal.entries().is_empty());
        assert!(c.submit_vote(&id("x1"), CandidateId(1)).is_ok());
    }

    #[test]
    fn recorded_vote_stays_final_after_eligibility_loss() {
        let journal = MemoryJournal::new();
        let signer = ReceiptSigner::generate();
        let seed = signer.seed();
        {
            let c = VoteCoordinator::open(
                candidates(),
                AllowList::new([id("0xabc")]),
                journal.clone(),
                signer,
            )
            .unwrap();
            c.submit_vote(&id("0xabc"), CandidateId(1)).unwrap();
        }

        // Reopen with an eligibility source that no longer knows the voter.
        let c = VoteCoordinator::open(
            candidates(),
            AllowList::default(),
            journal.clone(),
            ReceiptSigner::from_seed(seed),
        )
        .unwrap();
        assert!(c.has_voted(&id("0xabc")));
        assert_eq!(
            c.submit_vote(&id("0xabc"), CandidateId(2)),
            Err(VoteError::AlreadyVoted(id("0xabc")))
        );
        assert_eq!(
            c.submit_vote(&id("0xabc"), CandidateId(99)),
            Err(VoteError::UnknownCandidate(CandidateId(99)))
        );
        assert_eq!(journal.entries().len(), 1);
    }

    #[test]
    fn storage_failure_leaves_state_unchanged() {
        let journal = MemoryJournal::new();
        let c = coordinator(journal.clone());
        c.submit_vote(&id("x1"), CandidateId(1)).unwrap();
        let head = c.head();

        journal.set_unavailable(true);
        let err = c.submit_vote(&id("x2"), CandidateId(2)).unwrap_err();
        assert!(matches!(err, VoteError::StorageUnavailable(_)));
        assert!(!c.has_voted(&id("x2")));
        assert_eq!(c.tally().current().total(), 1);
        assert_eq!(c.head(), head);

        journal.set_unavailable(false);
        let receipt = c.submit_vote(&id("x2"), CandidateId(2)).unwrap();
        assert_eq!(receipt.sequence, 1);
        assert_eq!(receipt.prev, head);
    }

    #[test]
    fn reopen_replays_journal() {
        let journal = MemoryJournal::new();
        let signer = ReceiptSigner::generate();
        let seed = signer.seed();
        {
            let c = VoteCoordinator::open(candidates(), OpenEligibility, journal.clone(), signer)
                .unwrap();
            c.submit_vote(&id("x1"), CandidateId(1)).unwrap();
            c.submit_vote(&id("x2"), CandidateId(2)).unwrap();
            c.submit_vote(&id("x3"), CandidateId(2)).unwrap();
        }

        let c = VoteCoordinator::open(
            candidates(),
            OpenEligibility,
            journal.clone(),
            ReceiptSigner::from_seed(seed),
        )
        .unwrap();
        assert_eq!(c.vote_count(), 3);
        assert_eq!(c.tally().current().count(CandidateId(2)), Some(2));
        assert_eq!(
            c.submit_vote(&id("x1"), CandidateId(2)),
            Err(VoteError::AlreadyVoted(id("x1")))
        );
        assert_eq!(c.submit_vote(&id("x4"), CandidateId(1)).unwrap().sequence, 3);
    }

    #[test]
    fn replay_rejects_tampered_journal() {
        let journal = MemoryJournal::new();
        let signer = ReceiptSigner::generate();
        let seed = signer.seed();
        {
            let c = VoteCoordinator::open(candidates(), OpenEligibility, journal.clone(), signer)
                .unwrap();
            c.submit_vote(&id("x1"), CandidateId(1)).unwrap();
            c.submit_vote(&id("x2"), CandidateId(1)).unwrap();
        }

        let mut entries = journal.entries();
        entries[1].candidate_id = CandidateId(2);
        let result = VoteCoordinator::open(
            candidates(),
            OpenEligibility,
            MemoryJournal::with_entries(entries),
            ReceiptSigner::from_seed(seed),
        );
        assert!(matches!(result, Err(Error::JournalCorrupt { sequence: 1, .. })));

        let mut entries = journal.entries();
        entries.remove(0);
        let result = VoteCoordinator::open(
            candidates(),
            OpenEligibility,
            MemoryJournal::with_entries(entries),
            ReceiptSigner::from_seed(seed),
        );
        assert!(matches!(result, Err(Error::JournalCorrupt { sequence: 0, .. })));
    }

    #[test]
    fn replay_with_wrong_key_fails() {
        let journal = MemoryJournal::new();
        {
            let c = coordinator(journal.clone());
            c.submit_vote(&id("x1"), CandidateId(1)).unwrap();
        }
        let result = VoteCoordinator::open(
            candidates(),
            OpenEligibility,
            journal,
            ReceiptSigner::generate(),
        );
        assert!(matches!(result, Err(Error::JournalCorrupt { sequence: 0, .. })));
    }
}
