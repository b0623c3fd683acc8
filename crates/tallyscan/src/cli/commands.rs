//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::error::{Error, Result};
use crate::report::ReportPeriod;
use crate::transaction::{Category, Money};

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Receipt files (OCR text) to scan as one batch
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Drop a receipt from the batch by file name before saving
    #[arg(long, value_name = "NAME")]
    pub discard: Vec<String>,

    /// Set a receipt's total by file name (e.g. `lunch.txt=12.50`)
    #[arg(long, value_name = "NAME=AMOUNT", value_parser = parse_total_fix)]
    pub total: Vec<(String, Money)>,

    /// Save ready and edited receipts as transactions
    #[arg(short, long)]
    pub save: bool,

    /// Date for receipts without one (defaults to today)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Parse `NAME=AMOUNT`.
///
/// # Errors
///
/// Returns a validation error if the `=` is missing or the amount is invalid.
pub fn parse_total_fix(input: &str) -> Result<(String, Money)> {
    let (name, amount) = input
        .rsplit_once('=')
        .ok_or_else(|| Error::validation("total", format!("expected NAME=AMOUNT, got '{input}'")))?;
    Ok((name.to_string(), Money::parse(amount)?))
}

/// Transaction commands.
#[derive(Debug, Subcommand)]
pub enum TxCommand {
    /// List recent transactions
    List {
        /// Maximum number of results (defaults to the configured page size)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only show this category
        #[arg(long)]
        category: Option<Category>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one transaction
    Show {
        /// Transaction id
        id: i64,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a transaction by hand
    Add {
        /// Merchant name
        merchant: String,

        /// Total amount (e.g. 12.50)
        #[arg(allow_hyphen_values = true)]
        amount: Money,

        /// Transaction date (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Category (inferred from the merchant when omitted)
        #[arg(long)]
        category: Option<Category>,

        /// Currency code (defaults to the configured currency)
        #[arg(long)]
        currency: Option<String>,
    },

    /// Change fields of a transaction
    Edit {
        /// Transaction id
        id: i64,

        /// New merchant name
        #[arg(short, long)]
        merchant: Option<String>,

        /// New total amount
        #[arg(short, long, allow_hyphen_values = true)]
        amount: Option<Money>,

        /// New date
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// New category
        #[arg(long)]
        category: Option<Category>,
    },

    /// Delete a transaction
    Delete {
        /// Transaction id
        id: i64,
    },

    /// Search transactions by merchant
    Search {
        /// Text to look for in merchant names
        query: String,

        /// Maximum number of results (defaults to `storage.recent_limit`)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Report command arguments.
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Period length
    #[arg(short, long, default_value = "month")]
    pub period: ReportPeriod,

    /// Any date inside the period (defaults to today)
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// First date to include
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last date to include
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

/// Settings commands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Change a setting
    Set {
        /// Setting key (currency, week_start, theme, default_category, view,
        /// history_category, page_size)
        key: String,

        /// New value
        value: String,
    },

    /// Restore settings from the configured defaults
    Reset,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per transaction
    #[default]
    Plain,
    /// Aligned columns
    Table,
    /// JSON output
    Json,
}
