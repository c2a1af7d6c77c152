//! Eligibility providers and the voter registry.
//!
//! The coordinator treats eligibility as an opaque gate. [`VoterRegistry`]
//! is the built-in gate: a voter registers an identity against a national
//! id, and only registered identities may vote. The registry keeps a hash
//! of the national id, never the id itself or any other personal field.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::{Clock, Error, Hash, SystemClock, VoterIdentity};

/// Answers whether an identity may vote.
pub trait EligibilityProvider: Send + Sync {
    fn is_eligible(&self, identity: &VoterIdentity) -> bool;

    /// Size of the electorate, when the provider knows it.
    fn electorate_size(&self) -> Option<u64> {
        None
    }
}

/// Every identity is eligible.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenEligibility;

impl EligibilityProvider for OpenEligibility {
    fn is_eligible(&self, _identity: &VoterIdentity) -> bool {
        true
    }
}

/// A fixed set of eligible identities.
#[derive(Clone, Debug, Default)]
pub struct AllowList {
    identities: HashSet<VoterIdentity>,
}

impl AllowList {
    pub fn new(identities: impl IntoIterator<Item = VoterIdentity>) -> Self {
        Self {
            identities: identities.into_iter().collect(),
        }
    }
}

impl EligibilityProvider for AllowList {
    fn is_eligible(&self, identity: &VoterIdentity) -> bool {
        self.identities.contains(identity)
    }

    fn electorate_size(&self) -> Option<u64> {
        Some(self.identities.len() as u64)
    }
}

impl<T: EligibilityProvider + ?Sized> EligibilityProvider for Arc<T> {
    fn is_eligible(&self, identity: &VoterIdentity) -> bool {
        (**self).is_eligible(identity)
    }

    fn electorate_size(&self) -> Option<u64> {
        (**self).electorate_size()
    }
}

/// A voter's registration application.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationRequest {
    /// The identity the voter will vote with (usually a wallet address).
    pub identity: String,
    /// 12-digit national id number.
    pub national_id: String,
    pub full_name: String,
    pub constituency: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Verified,
}

/// What the registry keeps about a registered voter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub registration_id: String,
    pub identity: VoterIdentity,
    pub national_id_hash: Hash,
    pub constituency: String,
    /// Unix timestamp in milliseconds.
    pub registered_at: u64,
    pub status: RegistrationStatus,
}

#[derive(Debug, Default)]
struct Registrations {
    by_identity: HashMap<VoterIdentity, RegistrationRecord>,
    national_ids: HashSet<Hash>,
}

/// Registry of voters who completed registration.
pub struct VoterRegistry {
    inner: RwLock<Registrations>,
    clock: Box<dyn Clock>,
}

impl Default for VoterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VoterRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::default(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Restore a registry from previously exported records.
    pub fn from_records(records: impl IntoIterator<Item = RegistrationRecord>) -> Result<Self, Error> {
        let registry = Self::new();
        {
            let mut inner = registry.inner.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                if !inner.national_ids.insert(record.national_id_hash) {
                    return Err(Error::AlreadyRegistered(format!(
                        "national id of {}",
                        record.registration_id
                    )));
                }
                if inner.by_identity.contains_key(&record.identity) {
                    return Err(Error::AlreadyRegistered(record.identity.to_string()));
                }
                inner.by_identity.insert(record.identity.clone(), record);
            }
        }
        Ok(registry)
    }

    /// Validate and register a voter.
    pub fn register(&self, request: RegistrationRequest) -> Result<RegistrationRecord, Error> {
        self.register_persisted(request, |_| Ok(()))
    }

    /// Validate and register a voter, handing the full record set including
    /// the new registration to `persist` before it takes effect.
    ///
    /// If `persist` fails the registry is left unchanged and the error is
    /// reported as [`Error::RegistryUnavailable`]. The registry write lock is
    /// held across `persist`, so saves never interleave.
    pub fn register_persisted<F>(
        &self,
        request: RegistrationRequest,
        persist: F,
    ) -> Result<RegistrationRecord, Error>
    where
        F: FnOnce(&[RegistrationRecord]) -> std::io::Result<()>,
    {
        let identity = VoterIdentity::new(&request.identity)?;
        let national_id = request.national_id.trim();
        if national_id.len() != 12 || !national_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_registration(
                "national_id",
                "must be exactly 12 digits",
            ));
        }
        if request.full_name.trim().chars().count() < 2 {
            return Err(Error::invalid_registration(
                "full_name",
                "must be at least 2 characters",
            ));
        }
        let constituency = request.constituency.trim();
        if constituency.is_empty() {
            return Err(Error::invalid_registration("constituency", "is required"));
        }

        let national_id_hash = national_id_hash(national_id);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_identity.contains_key(&identity) {
            return Err(Error::AlreadyRegistered(identity.to_string()));
        }
        if inner.national_ids.contains(&national_id_hash) {
            return Err(Error::AlreadyRegistered("national id".to_string()));
        }

        let registered_at = self.clock.now_millis();
        let record = RegistrationRecord {
            registration_id: format!("REG{registered_at}-{}", inner.by_identity.len() + 1),
            identity: identity.clone(),
            national_id_hash,
            constituency: constituency.to_string(),
            registered_at,
            status: RegistrationStatus::Verified,
        };

        let mut records: Vec<RegistrationRecord> = inner.by_identity.values().cloned().collect();
        records.push(record.clone());
        sort_records(&mut records);
        persist(&records).map_err(|e| Error::RegistryUnavailable(e.to_string()))?;

        inner.national_ids.insert(national_id_hash);
        inner.by_identity.insert(identity, record.clone());

        info!(registration_id = %record.registration_id, "Voter registered");
        Ok(record)
    }

    pub fn get(&self, identity: &VoterIdentity) -> Option<RegistrationRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_identity
            .get(identity)
            .cloned()
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<RegistrationRecord> {
        let mut records: Vec<RegistrationRecord> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_identity
            .values()
            .cloned()
            .collect();
        sort_records(&mut records);
        records
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_identity
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EligibilityProvider for VoterRegistry {
    fn is_eligible(&self, identity: &VoterIdentity) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_identity
            .get(identity)
            .is_some_and(|r| r.status == RegistrationStatus::Verified)
    }

    fn electorate_size(&self) -> Option<u64> {
        Some(self.len() as u64)
    }
}

/// Oldest first.
fn sort_records(records: &mut [RegistrationRecord]) {
    records.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.registration_id.cmp(&b.registration_id))
    });
}

fn national_id_hash(national_id: &str) -> Hash {
    let mut data = b"ezballot/national-id/".to_vec();
    data.extend_from_slice(national_id.as_bytes());
    Hash::of(&data)
}
