//! On-disk election inputs: candidates, the receipt key and registrations.

use anyhow::{Context, Result};
use ezballot_core::{Candidate, CandidateSet, ReceiptSigner, RegistrationRecord};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Deserialize)]
struct CandidateFile {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Load the `[[candidates]]` list from a TOML file.
pub fn load_candidates(path: &Path) -> Result<CandidateSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candidates from {}", path.display()))?;
    let file: CandidateFile = toml::from_str(&content)
        .with_context(|| format!("Invalid candidates file {}", path.display()))?;
    Ok(CandidateSet::new(file.candidates)?)
}

/// Load the receipt signing key, generating and persisting one on first use.
///
/// A key is only generated for a fresh election. When `journal` already
/// holds votes, a missing key is an error: a new key could never verify
/// the existing receipts.
pub fn load_or_create_signer(path: &Path, journal: &Path) -> Result<ReceiptSigner> {
    if path.exists() {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read receipt key {}", path.display()))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "Receipt key {} must be exactly 32 bytes, found {}",
                path.display(),
                bytes.len()
            )
        })?;
        return Ok(ReceiptSigner::from_seed(seed));
    }

    if journal_has_entries(journal)? {
        anyhow::bail!(
            "Receipt key {} is missing but the vote journal {} is not empty",
            path.display(),
            journal.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let signer = ReceiptSigner::generate();
    std::fs::write(path, signer.seed())
        .with_context(|| format!("Failed to write receipt key {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    info!("Generated new receipt signing key at {}", path.display());
    Ok(signer)
}

fn journal_has_entries(journal: &Path) -> Result<bool> {
    match std::fs::metadata(journal) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to inspect vote journal {}", journal.display()))),
    }
}

/// JSON file holding exported voter registrations.
pub struct RegistryFile {
    path: PathBuf,
}

impl RegistryFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records; a missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<RegistrationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let records = serde_json::from_str(&content)
            .with_context(|| format!("Invalid registry file {}", self.path.display()))?;
        Ok(records)
    }

    /// Replace the file with `records` atomically and durably.
    ///
    /// Callers serialize saves; [`VoterRegistry::register_persisted`] holds
    /// the registry lock for the duration.
    ///
    /// [`VoterRegistry::register_persisted`]: ezballot_core::VoterRegistry::register_persisted
    pub fn save(&self, records: &[RegistrationRecord]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(records).map_err(std::io::Error::other)?;
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }
}
