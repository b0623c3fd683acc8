//! `tally` - CLI for tallyscan
//!
//! This binary scans receipt batches, manages transactions and settings, and
//! prints period reports against a local database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::{debug, warn};

use tallyscan::cli::{
    Cli, Command, ConfigCommand, ExportCommand, OutputFormat, ReportCommand, ScanCommand,
    SettingsCommand, TxCommand,
};
use tallyscan::review::ReviewSummary;
use tallyscan::{
    export, init_logging, BatchReceipt, BatchReviewStore, BatchScanner, BatchSync, Category,
    Config, Error, PeriodComparison, ReceiptId, ReceiptImage, ReceiptUpdate, ScanSessionStore,
    Settings, SettingsStore, Storage, TextReceiptScanner, Transaction,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let load_config = || Config::load_from(cli.config.clone()).context("failed to load configuration");

    match cli.command {
        Command::Config(ref cmd) => handle_config(cli.config.clone(), cmd),
        Command::Scan(ref cmd) => {
            let config = load_config()?;
            handle_scan(&config, &open_storage(&config)?, cmd)
        }
        Command::Tx(ref cmd) => {
            let config = load_config()?;
            handle_tx(&config, &open_storage(&config)?, cmd)
        }
        Command::Report(ref cmd) => {
            let config = load_config()?;
            handle_report(&config, &open_storage(&config)?, cmd)
        }
        Command::Export(ref cmd) => {
            let config = load_config()?;
            handle_export(&open_storage(&config)?, cmd)
        }
        Command::Settings(ref cmd) => {
            let config = load_config()?;
            handle_settings(&config, &open_storage(&config)?, cmd)
        }
        Command::Status(ref cmd) => {
            let config = load_config()?;
            handle_status(&config, &open_storage(&config)?, cmd.json)
        }
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open database {}", path.display()))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn load_settings(config: &Config, storage: &Storage) -> Result<Settings> {
    Ok(SettingsStore::load(storage, &config.defaults)?.snapshot())
}

fn handle_scan(config: &Config, storage: &Storage, cmd: &ScanCommand) -> Result<()> {
    let settings = load_settings(config, storage)?;

    let session = Arc::new(ScanSessionStore::new(config.scan.max_batch_size));
    for path in &cmd.files {
        let image = ReceiptImage::from_path(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match session.add_image(image) {
            Ok(()) => {}
            Err(err @ Error::DuplicateImage { .. }) => warn!("{err}"),
            Err(err) => return Err(err.into()),
        }
    }

    let scanner = TextReceiptScanner::new(settings.currency.clone())?;
    let batch = BatchScanner::new(
        Arc::new(scanner),
        config.scan.concurrency,
        config.scan.review_threshold,
        settings.currency.clone(),
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let results = runtime.block_on(batch.run(&session))?;

    let review = Arc::new(BatchReviewStore::new());
    review.load(results);
    let sync = BatchSync::new(session.clone(), review.clone());
    sync.on_event(|event| debug!(?event, "Batch event"));

    for name in &cmd.discard {
        let id = receipt_by_name(&review, name)?;
        sync.discard_receipt(&id);
    }
    for (name, total) in &cmd.total {
        let id = receipt_by_name(&review, name)?;
        sync.update_receipt(
            &id,
            ReceiptUpdate {
                total: Some(*total),
                ..ReceiptUpdate::default()
            },
        );
    }

    let receipts = review.receipts();
    let summary = review.summary();
    let report = if cmd.save && !receipts.is_empty() {
        Some(sync.save_batch(&review, storage, cmd.date.unwrap_or_else(today))?)
    } else {
        None
    };

    if cmd.json {
        let output = serde_json::json!({
            "summary": summary,
            "receipts": receipts,
            "saved": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_receipts(&receipts);
    print_review_summary(&summary, &settings.currency);
    if let Some(report) = report {
        println!();
        println!(
            "Saved {} receipt(s), skipped {} duplicate(s), {} need review.",
            report.saved.len(),
            report.duplicates.len(),
            report.rejected.len()
        );
        for (id, reason) in &report.rejected {
            println!("  {id}: {reason}");
        }
        if report.completed {
            println!("Batch complete.");
        }
    } else if !cmd.save && summary.saveable() > 0 {
        println!();
        println!("Run again with --save to store the ready receipts.");
    }
    Ok(())
}

fn receipt_by_name(review: &BatchReviewStore, name: &str) -> Result<ReceiptId> {
    review
        .receipts()
        .into_iter()
        .find(|r| r.image_name == name)
        .map(|r| r.id)
        .with_context(|| format!("no receipt named '{name}' in the batch"))
}

fn print_receipts(receipts: &[BatchReceipt]) {
    println!(
        "{:<8} {:<20} {:<24} {:>10} {:<10} {:>5}",
        "STATUS", "IMAGE", "MERCHANT", "TOTAL", "DATE", "CONF"
    );
    for receipt in receipts {
        let tx = &receipt.transaction;
        println!(
            "{:<8} {:<20} {:<24} {:>10} {:<10} {:>4.0}%",
            receipt.status.to_string(),
            truncate(&receipt.image_name, 20),
            truncate(&tx.merchant, 24),
            tx.total.map_or_else(|| "-".to_string(), |t| t.to_string()),
            tx.date.map_or_else(|| "-".to_string(), |d| d.to_string()),
            receipt.confidence * 100.0
        );
        if let Some(error) = &receipt.error {
            println!("         {error}");
        }
    }
}

fn print_review_summary(summary: &ReviewSummary, currency: &str) {
    println!();
    println!(
        "{} receipt(s): {} ready, {} edited, {} to review, {} failed",
        summary.total, summary.ready, summary.edited, summary.review, summary.error
    );
    println!(
        "Saveable: {} ({} {currency})",
        summary.saveable(),
        summary.saveable_amount
    );
}

fn handle_tx(config: &Config, storage: &Storage, cmd: &TxCommand) -> Result<()> {
    let settings = load_settings(config, storage)?;

    match cmd {
        TxCommand::List {
            limit,
            category,
            format,
        } => {
            let limit = limit.unwrap_or(settings.view.page_size);
            let transactions = match category.or(settings.view.history_category) {
                Some(category) => storage.get_by_category(category, limit)?,
                None => storage.get_recent(limit)?,
            };
            print_transactions(&transactions, *format)?;
        }
        TxCommand::Show { id, json } => {
            let tx = storage
                .get(*id)?
                .ok_or(Error::TransactionNotFound { id: *id })?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&tx)?);
            } else {
                print_transaction_detail(&tx);
            }
        }
        TxCommand::Add {
            merchant,
            amount,
            date,
            category,
            currency,
        } => {
            let mut tx = Transaction::new(merchant.clone(), *amount, date.unwrap_or_else(today))
                .with_currency(
                    currency
                        .as_deref()
                        .map_or_else(|| settings.currency.clone(), str::to_uppercase),
                );
            tx.category = match category {
                Some(category) => *category,
                None if tx.category == Category::Other => settings.default_category,
                None => tx.category,
            };
            match storage.insert(&tx)? {
                Some(id) => println!("Added transaction {id}."),
                None => println!("Transaction already recorded."),
            }
        }
        TxCommand::Edit {
            id,
            merchant,
            amount,
            date,
            category,
        } => {
            let mut tx = storage
                .get(*id)?
                .ok_or(Error::TransactionNotFound { id: *id })?;
            if let Some(merchant) = merchant {
                tx.merchant.clone_from(merchant);
            }
            if let Some(amount) = amount {
                tx.total = *amount;
            }
            if let Some(date) = date {
                tx.date = *date;
            }
            if let Some(category) = category {
                tx.category = *category;
            }
            storage.update(&tx)?;
            println!("Updated transaction {id}.");
        }
        TxCommand::Delete { id } => {
            if !storage.delete(*id)? {
                return Err(Error::TransactionNotFound { id: *id }.into());
            }
            println!("Deleted transaction {id}.");
        }
        TxCommand::Search {
            query,
            limit,
            format,
        } => {
            let transactions =
                storage.search(query, limit.unwrap_or(config.storage.recent_limit))?;
            print_transactions(&transactions, *format)?;
        }
    }
    Ok(())
}

fn print_transactions(transactions: &[Transaction], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(transactions)?);
        }
        OutputFormat::Plain => {
            for tx in transactions {
                println!(
                    "{} {} {} {} {} [{}]",
                    tx.id.unwrap_or_default(),
                    tx.date,
                    tx.merchant,
                    tx.total,
                    tx.currency,
                    tx.category
                );
            }
        }
        OutputFormat::Table => {
            if transactions.is_empty() {
                println!("No transactions.");
                return Ok(());
            }
            println!(
                "{:>6} {:<10} {:<28} {:<14} {:>10} {:<3}",
                "ID", "DATE", "MERCHANT", "CATEGORY", "TOTAL", "CUR"
            );
            for tx in transactions {
                println!(
                    "{:>6} {:<10} {:<28} {:<14} {:>10} {:<3}",
                    tx.id.unwrap_or_default(),
                    tx.date.to_string(),
                    truncate(&tx.merchant, 28),
                    tx.category.as_str(),
                    tx.total.to_string(),
                    tx.currency
                );
            }
        }
    }
    Ok(())
}

fn print_transaction_detail(tx: &Transaction) {
    println!("Transaction {}", tx.id.unwrap_or_default());
    println!("  Merchant:  {}", tx.merchant);
    println!("  Date:      {}", tx.date);
    println!("  Category:  {}", tx.category);
    println!("  Total:     {} {}", tx.total, tx.currency);
    if !tx.items.is_empty() {
        println!("  Items:");
        for item in &tx.items {
            println!("    {:<30} x{:<3} {:>10}", item.name, item.quantity, item.price.to_string());
        }
        let items_total = tx.items_total();
        if items_total != tx.total {
            println!("  Items add up to {items_total}, not {}", tx.total);
        }
    }
    if let Some(hash) = &tx.receipt_hash {
        println!("  Receipt:   {}", &hash[..hash.len().min(16)]);
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}

fn handle_report(config: &Config, storage: &Storage, cmd: &ReportCommand) -> Result<()> {
    let settings = load_settings(config, storage)?;
    let report = PeriodComparison::load(
        storage,
        cmd.period,
        cmd.date.unwrap_or_else(today),
        settings.week_start,
    )?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let current = &report.current;
    let currency = &settings.currency;
    println!("Spending for {} {}", report.period, current.range);
    println!();
    println!(
        "  Total:      {} {currency} ({} transactions)",
        current.total, current.count
    );
    println!("  Average:    {} {currency}", current.average);
    println!("  Per day:    {} {currency}", current.daily_average);
    match report.percent {
        Some(percent) => println!(
            "  Previous:   {} {currency} (change {}, {percent:+.1}%)",
            report.previous.total, report.change
        ),
        None => println!("  Previous:   {} {currency}", report.previous.total),
    }
    if let Some(largest) = &current.largest {
        println!(
            "  Largest:    {} {currency} at {} on {}",
            largest.total, largest.merchant, largest.date
        );
    }

    if !current.by_category.is_empty() {
        println!();
        println!("  By category:");
        for entry in &current.by_category {
            println!(
                "    {:<14} {:>10} {:>5.1}%  ({})",
                entry.category.as_str(),
                entry.total.to_string(),
                entry.share,
                entry.count
            );
        }
    }
    Ok(())
}

fn handle_export(storage: &Storage, cmd: &ExportCommand) -> Result<()> {
    let transactions: Vec<Transaction> = storage
        .get_all()?
        .into_iter()
        .filter(|tx| cmd.from.map_or(true, |from| tx.date >= from))
        .filter(|tx| cmd.to.map_or(true, |to| tx.date <= to))
        .collect();

    match &cmd.output {
        Some(path) => {
            let rows = export::export_file(path, &transactions)
                .with_context(|| format!("failed to export to {}", path.display()))?;
            eprintln!("Exported {rows} transaction(s) to {}", path.display());
        }
        None => {
            export::write_csv(std::io::stdout().lock(), &transactions)?;
        }
    }
    Ok(())
}

fn handle_settings(config: &Config, storage: &Storage, cmd: &SettingsCommand) -> Result<()> {
    let settings = SettingsStore::load(storage, &config.defaults)?;

    match cmd {
        SettingsCommand::Show { json } => {
            let current = settings.snapshot();
            if *json {
                println!("{}", serde_json::to_string_pretty(&current)?);
            } else {
                for key in Settings::KEYS {
                    println!("{key:<18} {}", current.get(key)?);
                }
            }
        }
        SettingsCommand::Set { key, value } => {
            let updated = settings.set(storage, key, value)?;
            println!("{key} = {}", updated.get(key)?);
        }
        SettingsCommand::Reset => {
            settings.reset(storage, &config.defaults)?;
            println!("Settings reset to defaults.");
        }
    }
    Ok(())
}

fn handle_status(config: &Config, storage: &Storage, json: bool) -> Result<()> {
    let stats = storage.stats()?;
    let settings = load_settings(config, storage)?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "transactions": stats.total_transactions,
            "oldest": stats.oldest,
            "newest": stats.newest,
            "db_size_bytes": stats.db_size_bytes,
            "currency": settings.currency,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let show_date = |d: Option<NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());
        println!("tally status");
        println!("------------");
        println!("Database:      {}", storage.path().display());
        println!("Transactions:  {}", stats.total_transactions);
        println!("Oldest:        {}", show_date(stats.oldest));
        println!("Newest:        {}", show_date(stats.newest));
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!("Currency:      {}", settings.currency);
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path).context("failed to load configuration")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[storage]");
                println!("  database_path:    {}", config.database_path().display());
                println!("  recent_limit:     {}", config.storage.recent_limit);
                println!();
                println!("[scan]");
                println!("  concurrency:      {}", config.scan.concurrency);
                println!("  review_threshold: {}", config.scan.review_threshold);
                println!("  max_batch_size:   {}", config.scan.max_batch_size);
                println!();
                println!("[defaults]");
                println!("  currency:         {}", config.defaults.currency);
                println!("  week_start:       {}", config.defaults.week_start);
                println!("  page_size:        {}", config.defaults.page_size);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .clone()
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path)).context("configuration is invalid")?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
