use super::*;
use confique::Layer;
use ezballot_core::{CandidateId, FileJournal, VoteJournal, VoterIdentity};
use std::path::Path;
use tempfile::tempdir;

/// Test helper that creates a ResolvedCli with test configuration
fn create_test_cli(temp_path: &Path, command: Commands) -> ResolvedCli {
    std::fs::write(
        temp_path.join("candidates.toml"),
        r#"
[[candidates]]
id = 1
name = "Narendra Modi"
party = "Bharatiya Janata Party (BJP)"

[[candidates]]
id = 2
name = "Arvind Kejriwal"
party = "Aam Aadmi Party (AAP)"
"#,
    )
    .unwrap();

    let mut partial_config = PartialAppConfig::default_values();
    partial_config.storage.journal_path = Some(temp_path.join("votes.journal"));
    partial_config.storage.key_path = Some(temp_path.join("receipt.key"));
    partial_config.election.candidates_path = Some(temp_path.join("candidates.toml"));
    partial_config.election.eligibility = Some(crate::config::EligibilityMode::Open);
    partial_config.election.electorate_size = Some(10);

    let config = AppConfig::builder()
        .preloaded(partial_config)
        .load()
        .expect("Failed to load test config")
        .with_resolved_paths()
        .expect("Failed to resolve paths in test config");

    ResolvedCli {
        command: Some(command),
        config,
    }
}

fn cast_votes(cli: &ResolvedCli, votes: &[(&str, u32)]) {
    let election = Election::open(&cli.config).unwrap();
    for (voter, candidate) in votes {
        election
            .coordinator
            .submit_vote(&VoterIdentity::new(voter).unwrap(), CandidateId(*candidate))
            .unwrap();
    }
}

#[test]
fn test_results_table() {
    let temp_dir = tempdir().unwrap();
    let cli = create_test_cli(temp_dir.path(), Commands::Results);
    cast_votes(&cli, &[("a", 2), ("b", 2), ("c", 1), ("d", 2)]);

    let table = cli.results().unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert!(lines[1].contains("Arvind Kejriwal"));
    assert!(lines[1].contains("75.00%"));
    assert!(lines[2].contains("Narendra Modi"));
    assert!(table.contains("Total votes: 4"));
    assert!(table.contains("Leading: Arvind Kejriwal"));
    assert!(table.contains("Turnout: 40.00%"));
}

#[test]
fn test_verify_reports_head() {
    let temp_dir = tempdir().unwrap();
    let cli = create_test_cli(temp_dir.path(), Commands::Verify);

    let empty = cli.verify().unwrap();
    assert_eq!(empty.votes, 0);
    assert_eq!(empty.head, Hash::ZERO);

    cast_votes(&cli, &[("a", 1), ("b", 2)]);
    let report = cli.verify().unwrap();
    assert_eq!(report.votes, 2);

    let mut journal = FileJournal::open(&cli.config.storage.journal_path).unwrap();
    let receipts = journal.load().unwrap();
    assert_eq!(report.head, receipts[1].digest);
}

#[test]
fn test_verify_fails_on_duplicated_entry() {
    let temp_dir = tempdir().unwrap();
    let cli = create_test_cli(temp_dir.path(), Commands::Verify);
    cast_votes(&cli, &[("a", 1)]);

    let mut journal = FileJournal::open(&cli.config.storage.journal_path).unwrap();
    let receipts = journal.load().unwrap();
    journal.append(&receipts[0]).unwrap();
    drop(journal);

    assert!(cli.verify().is_err());
}

#[test]
fn test_cli_defaults_to_serve() {
    let cli = Cli::try_parse_from(["ezballot"]).unwrap();
    assert!(cli.command.is_none());
    assert!(!cli.verbose);

    let cli = Cli::try_parse_from([
        "ezballot",
        "--verbose",
        "--bind-addr",
        "0.0.0.0:9999",
        "--eligibility",
        "open",
        "verify",
    ])
    .unwrap();
    assert_eq!(cli.command, Some(Commands::Verify));
    assert!(cli.verbose);
    assert_eq!(cli.config.server.bind_addr.as_deref(), Some("0.0.0.0:9999"));
}
