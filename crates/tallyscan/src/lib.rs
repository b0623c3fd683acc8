//! `tallyscan` - receipt scanning and expense tracking core
//!
//! This library scans receipts in batches, keeps the scan session and the
//! review workflow in step while the user discards or edits receipts, and
//! persists the resulting transactions for reporting and export.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod report;
pub mod review;
pub mod scan;
pub mod session;
pub mod settings;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transaction;

pub use batch::{BatchReceipt, ParsedTransaction, ReceiptId, ReceiptStatus, ReceiptUpdate};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use report::{DateRange, PeriodComparison, PeriodSummary, ReportPeriod};
pub use review::{BatchReviewStore, ReviewPhase};
pub use scan::{BatchScanner, ReceiptImage, ReceiptScanner, TextReceiptScanner};
pub use session::{ScanPhase, ScanSessionStore};
pub use settings::{Settings, SettingsStore};
pub use storage::{Storage, StorageStats};
pub use sync::{BatchEvent, BatchSync, ReceiptCache};
pub use transaction::{Category, LineItem, Money, Transaction};
