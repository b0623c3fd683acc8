//! Command-line interface for tallyscan.
//!
//! This module provides the CLI structure for the `tally` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    parse_total_fix, ConfigCommand, ExportCommand, OutputFormat, ReportCommand, ScanCommand,
    SettingsCommand, StatusCommand, TxCommand,
};

use crate::logging::Verbosity;

/// tally - Scan receipts and track spending
///
/// Scans receipt text in batches, lets you review and save the results, and
/// reports spending by period.
#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a batch of receipts
    Scan(ScanCommand),

    /// Manage transactions
    #[command(subcommand)]
    Tx(TxCommand),

    /// Summarize spending for a period
    Report(ReportCommand),

    /// Export transactions as CSV
    Export(ExportCommand),

    /// View or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show database status
    Status(StatusCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportPeriod;
    use crate::transaction::{Category, Money};
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "tally");
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["tally", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["tally", "-vv", "status"]).verbosity(), Verbosity::Debug);
        assert_eq!(parse(&["tally", "-q", "status"]).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["tally", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_scan() {
        let cli = parse(&[
            "tally", "scan", "a.txt", "b.txt", "--discard", "b.txt", "--total", "a.txt=4.20",
            "--save",
        ]);
        let Command::Scan(scan) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(scan.files.len(), 2);
        assert_eq!(scan.discard, vec!["b.txt".to_string()]);
        assert_eq!(scan.total, vec![("a.txt".to_string(), Money::from_minor(420))]);
        assert!(scan.save);
    }

    #[test]
    fn test_parse_scan_requires_files() {
        assert!(Cli::try_parse_from(["tally", "scan"]).is_err());
    }

    #[test]
    fn test_parse_tx_add() {
        let cli = parse(&[
            "tally", "tx", "add", "Cafe Luna", "4.50", "--date", "2024-03-09", "--category",
            "restaurant",
        ]);
        let Command::Tx(TxCommand::Add {
            merchant,
            amount,
            date,
            category,
            ..
        }) = cli.command
        else {
            panic!("expected tx add");
        };
        assert_eq!(merchant, "Cafe Luna");
        assert_eq!(amount, Money::from_minor(450));
        assert_eq!(date.map(|d| d.to_string()), Some("2024-03-09".to_string()));
        assert_eq!(category, Some(Category::Restaurant));
    }

    #[test]
    fn test_parse_tx_add_rejects_bad_amount() {
        assert!(Cli::try_parse_from(["tally", "tx", "add", "Cafe", "four"]).is_err());
    }

    #[test]
    fn test_parse_tx_list_category() {
        let cli = parse(&["tally", "tx", "list", "--category", "transport", "-f", "json"]);
        assert!(matches!(
            cli.command,
            Command::Tx(TxCommand::List {
                category: Some(Category::Transport),
                format: OutputFormat::Json,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_report_defaults_to_month() {
        let Command::Report(report) = parse(&["tally", "report"]).command else {
            panic!("expected report");
        };
        assert_eq!(report.period, ReportPeriod::Month);
        assert!(report.date.is_none());
    }

    #[test]
    fn test_parse_settings_set() {
        let cli = parse(&["tally", "settings", "set", "currency", "EUR"]);
        assert!(matches!(
            cli.command,
            Command::Settings(SettingsCommand::Set { .. })
        ));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["tally", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }
}
