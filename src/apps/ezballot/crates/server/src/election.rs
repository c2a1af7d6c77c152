use anyhow::{Context, Result};
use ezballot_core::{
    CandidateSet, FileJournal, OpenEligibility, ReceiptSigner, VoteCoordinator, VoteJournal,
    VoterRegistry,
};
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, EligibilityMode};
use crate::storage::{RegistryFile, load_candidates, load_or_create_signer};

/// The registry together with the file it is persisted to.
#[derive(Clone)]
pub struct Registration {
    pub registry: Arc<VoterRegistry>,
    pub file: Arc<RegistryFile>,
}

/// A running election: the coordinator plus, in registry mode, the registry.
pub struct Election {
    pub coordinator: Arc<VoteCoordinator>,
    pub registration: Option<Registration>,
    pub electorate_size: Option<u64>,
}

impl Election {
    /// Open the election described by `config`, replaying its journal.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let candidates = load_candidates(&config.election.candidates_path)?;
        let signer =
            load_or_create_signer(&config.storage.key_path, &config.storage.journal_path)?;
        let journal = FileJournal::open(&config.storage.journal_path).with_context(|| {
            format!(
                "Failed to open vote journal {}",
                config.storage.journal_path.display()
            )
        })?;

        let registration = match config.election.eligibility {
            EligibilityMode::Open => None,
            EligibilityMode::Registry => {
                let file = RegistryFile::new(config.election.registry_path.clone());
                let registry = VoterRegistry::from_records(file.load()?)?;
                info!(
                    "Loaded {} voter registrations from {}",
                    registry.len(),
                    file.path().display()
                );
                Some(Registration {
                    registry: Arc::new(registry),
                    file: Arc::new(file),
                })
            }
        };

        Self::from_parts(
            candidates,
            journal,
            signer,
            registration,
            config.election.electorate_size,
        )
    }

    pub fn from_parts(
        candidates: CandidateSet,
        journal: impl VoteJournal + 'static,
        signer: ReceiptSigner,
        registration: Option<Registration>,
        electorate_size: Option<u64>,
    ) -> Result<Self> {
        let coordinator = match &registration {
            Some(registration) => VoteCoordinator::open(
                candidates,
                Arc::clone(&registration.registry),
                journal,
                signer,
            )?,
            None => VoteCoordinator::open(candidates, OpenEligibility, journal, signer)?,
        };

        Ok(Self {
            coordinator: Arc::new(coordinator),
            registration,
            electorate_size,
        })
    }
}
