use anyhow::Result;
use clap::{Args, ValueEnum};
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Utility function to expand $HOME in a PathBuf
pub fn expand_home_in_path(path: &PathBuf) -> Result<PathBuf> {
    let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in path"))?;

    if path_str.contains("$HOME") {
        let expanded = path_str.replace("$HOME", home_dir.to_str().unwrap_or("."));
        Ok(PathBuf::from(expanded))
    } else {
        Ok(path.clone())
    }
}

#[derive(Config, Clone, Default, Serialize, Deserialize)]
#[config(layer_attr(derive(Args, Serialize, Clone)))]
pub struct AppConfig {
    #[config(nested, layer_attr(command(flatten)))]
    pub server: ServerConfig,

    #[config(nested, layer_attr(command(flatten)))]
    pub storage: StorageConfig,

    #[config(nested, layer_attr(command(flatten)))]
    pub election: ElectionConfig,

    #[config(nested, layer_attr(command(flatten)))]
    pub results: ResultsConfig,
}

#[derive(Clone, Config, Deserialize, Serialize, Default)]
#[config(layer_attr(derive(Args, Clone, Serialize)))]
pub struct ServerConfig {
    /// The address the HTTP API will bind to
    #[config(
        default = "127.0.0.1:8080",
        env = "EZBALLOT_BIND_ADDR",
        layer_attr(arg(long))
    )]
    pub bind_addr: String,
}

#[derive(Clone, Config, Deserialize, Serialize, Default)]
#[config(layer_attr(derive(Args, Clone, Serialize)))]
pub struct StorageConfig {
    /// The append-only vote journal
    #[config(
        default = "$HOME/.ezballot/votes.journal",
        env = "EZBALLOT_JOURNAL_PATH",
        layer_attr(arg(long))
    )]
    pub journal_path: PathBuf,

    /// The Ed25519 seed used to sign vote receipts (created if missing)
    #[config(default = "$HOME/.ezballot/receipt.key", layer_attr(arg(long)))]
    pub key_path: PathBuf,
}

/// Which identities may vote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EligibilityMode {
    /// Any identity may vote
    Open,
    /// Only identities registered through the API may vote
    #[default]
    Registry,
}

#[derive(Clone, Config, Deserialize, Serialize, Default)]
#[config(layer_attr(derive(Args, Clone, Serialize)))]
pub struct ElectionConfig {
    /// TOML file with the `[[candidates]]` on the ballot
    #[config(
        default = "$HOME/.ezballot/candidates.toml",
        layer_attr(arg(long))
    )]
    pub candidates_path: PathBuf,

    /// Who may vote
    #[config(default = "registry", layer_attr(arg(long, value_enum)))]
    pub eligibility: EligibilityMode,

    /// Where voter registrations are persisted
    #[config(
        default = "$HOME/.ezballot/registry.json",
        layer_attr(arg(long))
    )]
    pub registry_path: PathBuf,

    /// Electorate size used for turnout (defaults to the number of registered voters)
    #[config(layer_attr(arg(long)))]
    pub electorate_size: Option<u64>,
}

#[derive(Clone, Config, Deserialize, Serialize, Default)]
#[config(layer_attr(derive(Args, Clone, Serialize)))]
pub struct ResultsConfig {
    /// How often published results are recomputed, in seconds
    #[config(default = 30, layer_attr(arg(long)))]
    pub refresh_interval_secs: u64,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve all potential $HOME placeholders in configuration paths
    pub fn with_resolved_paths(mut self) -> Result<Self> {
        self.storage.journal_path = expand_home_in_path(&self.storage.journal_path)?;
        self.storage.key_path = expand_home_in_path(&self.storage.key_path)?;
        self.election.candidates_path = expand_home_in_path(&self.election.candidates_path)?;
        self.election.registry_path = expand_home_in_path(&self.election.registry_path)?;
        Ok(self)
    }
}
