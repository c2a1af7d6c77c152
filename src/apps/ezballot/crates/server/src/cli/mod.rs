use crate::{
    AppConfig, api, config::expand_home_in_path, election::Election, refresh::ResultsRefresher,
    state::AppState,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use confique::Config;
use ezballot_core::{Hash, ResultsSummary};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::info;

// Re-export PartialAppConfig for public usage
pub use crate::config::confique_app_config_layer::AppConfigLayer as PartialAppConfig;

#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(name = "ezballot")]
#[command(about = "A one-person-one-vote ballot service")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "$HOME/.ezballot/config.toml")]
    config_path: PathBuf,

    /// Configuration object
    #[command(flatten)]
    config: PartialAppConfig,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Internal helper struct that holds the resolved configuration
pub struct ResolvedCli {
    command: Option<Commands>,
    config: AppConfig,
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the HTTP API (the default)
    Serve,
    /// Replay the vote journal and print the current results
    Results,
    /// Replay and verify the whole vote journal
    Verify,
}

/// Outcome of a successful journal verification.
#[derive(Debug)]
pub struct VerifyReport {
    pub votes: usize,
    pub head: Hash,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let log_level = if self.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(format!(
                "ezballot_server={0},ezballot_core={0},warn",
                log_level
            ))
            .init();

        let resolved_cli = self.resolve_config()?;
        match resolved_cli.command.unwrap_or(Commands::Serve) {
            Commands::Serve => resolved_cli.serve().await,
            Commands::Results => {
                print!("{}", resolved_cli.results()?);
                Ok(())
            }
            Commands::Verify => {
                let report = resolved_cli.verify()?;
                println!(
                    "Journal OK: {} votes, head {}",
                    report.votes,
                    report.head.to_hex()
                );
                Ok(())
            }
        }
    }

    /// Load the configuration and resolve all $HOME placeholders
    fn resolve_config(self) -> Result<ResolvedCli> {
        let config_path = expand_home_in_path(&self.config_path)?;

        let config = AppConfig::builder()
            .preloaded(self.config)
            .env()
            .file(&config_path)
            .load()?
            .with_resolved_paths()?;

        Ok(ResolvedCli {
            command: self.command,
            config,
        })
    }
}

impl ResolvedCli {
    async fn serve(&self) -> Result<()> {
        let election = Election::open(&self.config)?;
        let addr: SocketAddr = self
            .config
            .server
            .bind_addr
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.config.server.bind_addr))?;

        let period = Duration::from_secs(self.config.results.refresh_interval_secs.max(1));
        let refresher =
            ResultsRefresher::new(election.coordinator.publisher(election.electorate_size), period);
        let state = AppState::new(&election, &refresher);

        let shutdown = Arc::new(Notify::new());
        let refresh_task = refresher.spawn(Arc::clone(&shutdown));

        let (bound, server) = warp::serve(api::routes(state))
            .try_bind_with_graceful_shutdown(addr, async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutdown signal received");
            })
            .with_context(|| format!("Failed to bind {addr}"))?;

        info!(
            "ezballot listening on http://{} with {} candidates and {} recorded votes",
            bound,
            election.coordinator.candidates().len(),
            election.coordinator.vote_count()
        );
        server.await;

        shutdown.notify_one();
        refresh_task.await?;
        info!(
            "Stopped with {} recorded votes, journal head {}",
            election.coordinator.vote_count(),
            election.coordinator.head()
        );
        Ok(())
    }

    fn results(&self) -> Result<String> {
        let election = Election::open(&self.config)?;
        let summary = election
            .coordinator
            .publisher(election.electorate_size)
            .summary();
        Ok(render_results(&summary))
    }

    fn verify(&self) -> Result<VerifyReport> {
        let election = Election::open(&self.config).context("Vote journal failed verification")?;
        Ok(VerifyReport {
            votes: election.coordinator.vote_count(),
            head: election.coordinator.head(),
        })
    }
}

fn render_results(summary: &ResultsSummary) -> String {
    let mut out = format!(
        "{:<4} {:<28} {:<40} {:>10} {:>8}\n",
        "#", "Candidate", "Party", "Votes", "Share"
    );
    for (rank, row) in summary.results.iter().enumerate() {
        out.push_str(&format!(
            "{:<4} {:<28} {:<40} {:>10} {:>7.2}%\n",
            rank + 1,
            row.candidate_name,
            row.party,
            row.vote_count,
            row.percentage
        ));
    }
    out.push_str(&format!("\nTotal votes: {}\n", summary.total_votes));
    if let Some(leader) = &summary.leader {
        out.push_str(&format!(
            "Leading: {} ({})\n",
            leader.candidate_name, leader.party
        ));
    }
    if let Some(turnout) = summary.turnout {
        out.push_str(&format!("Turnout: {turnout:.2}%\n"));
    }
    out
}
