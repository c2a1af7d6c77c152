//! Vote receipts.
//!
//! Every accepted vote produces a receipt that links to the previous one:
//! ```text
//! digest    = BLAKE3(CBOR(sequence, voter_identity, candidate_id, timestamp, prev))
//! signature = Ed25519(signer, digest)
//! ```
//! The chain makes the journal tamper-evident, and the signature lets a
//! voter check a receipt with nothing but the service's public key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{CandidateId, Error, Hash, VoteRecord, VoterIdentity};

/// Confirmation of an accepted vote, usable for independent auditing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// Position in the vote journal, starting at 0.
    pub sequence: u64,
    pub voter_identity: VoterIdentity,
    pub candidate_id: CandidateId,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Digest of the previous receipt, `Hash::ZERO` for the first one.
    pub prev: Hash,
    pub digest: Hash,
    /// Ed25519 signature over `digest`.
    pub signature: Vec<u8>,
}

/// Fields covered by the digest.
#[derive(Serialize)]
struct SignableReceipt<'a> {
    sequence: u64,
    voter_identity: &'a VoterIdentity,
    candidate_id: CandidateId,
    timestamp: u64,
    prev: &'a Hash,
}

impl VoteReceipt {
    /// Build and sign the receipt that follows `prev`.
    pub(crate) fn issue(
        sequence: u64,
        voter_identity: VoterIdentity,
        candidate_id: CandidateId,
        timestamp: u64,
        prev: Hash,
        signer: &ReceiptSigner,
    ) -> Result<Self, Error> {
        let mut receipt = Self {
            sequence,
            voter_identity,
            candidate_id,
            timestamp,
            prev,
            digest: Hash::ZERO,
            signature: Vec::new(),
        };
        receipt.digest = receipt.compute_digest()?;
        receipt.signature = signer.sign(&receipt.digest);
        Ok(receipt)
    }

    /// Recompute the digest from the receipt's content.
    pub fn compute_digest(&self) -> Result<Hash, Error> {
        Hash::of_value(&SignableReceipt {
            sequence: self.sequence,
            voter_identity: &self.voter_identity,
            candidate_id: self.candidate_id,
            timestamp: self.timestamp,
            prev: &self.prev,
        })
    }

    /// Check that the digest matches the content and is signed by `key`.
    pub fn verify(&self, key: &VerifyingKey) -> bool {
        match self.compute_digest() {
            Ok(digest) if digest == self.digest => {}
            _ => return false,
        }

        let Ok(sig_bytes) = <[u8; 64]>::try_from(self.signature.as_slice()) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_bytes);
        key.verify(self.digest.as_bytes(), &signature).is_ok()
    }

    /// The ledger view of this receipt.
    pub fn record(&self) -> VoteRecord {
        VoteRecord {
            voter_identity: self.voter_identity.clone(),
            candidate_id: self.candidate_id,
            timestamp: self.timestamp,
        }
    }
}

/// Holds the Ed25519 key that signs receipts.
pub struct ReceiptSigner {
    key: SigningKey,
}

impl ReceiptSigner {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// The secret seed, for persisting the key.
    pub fn seed(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    fn sign(&self, digest: &Hash) -> Vec<u8> {
        self.key.sign(digest.as_bytes()).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for ReceiptSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptSigner")
            .field("verifying_key", &hex::encode(self.verifying_key().to_bytes()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(signer: &ReceiptSigner) -> VoteReceipt {
        VoteReceipt::issue(
            0,
            VoterIdentity::new("x1").unwrap(),
            CandidateId(1),
            1_700_000_000_000,
            Hash::ZERO,
            signer,
        )
        .unwrap()
    }

    #[test]
    fn receipt_verifies_with_signer_key() {
        let signer = ReceiptSigner::generate();
        let receipt = receipt(&signer);
        assert!(receipt.verify(&signer.verifying_key()));
    }

    #[test]
    fn receipt_fails_with_other_key() {
        let signer = ReceiptSigner::generate();
        let other = ReceiptSigner::generate();
        assert!(!receipt(&signer).verify(&other.verifying_key()));
    }

    #[test]
    fn tampered_candidate_is_detected() {
        let signer = ReceiptSigner::generate();
        let mut receipt = receipt(&signer);
        receipt.candidate_id = CandidateId(2);
        assert!(!receipt.verify(&signer.verifying_key()));
    }

    #[test]
    fn corrupted_signature_is_detected() {
        let signer = ReceiptSigner::generate();
        let mut receipt = receipt(&signer);
        receipt.signature[0] ^= 0xFF;
        assert!(!receipt.verify(&signer.verifying_key()));

        receipt.signature.truncate(10);
        assert!(!receipt.verify(&signer.verifying_key()));
    }

    #[test]
    fn seed_restores_same_key() {
        let signer = ReceiptSigner::generate();
        let restored = ReceiptSigner::from_seed(signer.seed());
        assert_eq!(signer.verifying_key(), restored.verifying_key());
    }
}
