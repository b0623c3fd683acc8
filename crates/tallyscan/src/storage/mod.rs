//! Storage layer for tallyscan.
//!
//! This module provides `SQLite`-based persistent storage for transactions,
//! including receipt deduplication, search and date-range queries, plus the
//! saved user settings.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::transaction::{Category, Money, Transaction};

/// Metadata key holding the saved settings.
const SETTINGS_KEY: &str = "settings";

/// Column list shared by every transaction query.
const TRANSACTION_COLUMNS: &str =
    "id, date, merchant, category, total, currency, items, receipt_hash, created_at";

/// Storage engine for transactions.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Transaction insertion with receipt deduplication
/// - Merchant search
/// - Filtering by category and date range
/// - Settings persistence
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a transaction.
    ///
    /// Returns the assigned id, or `None` if a transaction from the same
    /// receipt already exists.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid transaction, or an error if
    /// the database operation fails.
    pub fn insert(&self, tx: &Transaction) -> Result<Option<i64>> {
        tx.validate()?;

        if let Some(hash) = &tx.receipt_hash {
            if self.exists_by_hash(hash)? {
                debug!(
                    "Skipping duplicate receipt with hash {}",
                    &hash[..hash.len().min(16)]
                );
                return Ok(None);
            }
        }

        let items = serde_json::to_string(&tx.items)?;
        self.conn.execute(
            r"
            INSERT INTO transactions (date, merchant, category, total, currency, items, receipt_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                tx.date.to_string(),
                tx.merchant,
                tx.category.as_str(),
                tx.total.minor(),
                tx.currency,
                items,
                tx.receipt_hash,
                tx.created_at.to_rfc3339(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted transaction with id {}", id);
        Ok(Some(id))
    }

    fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE receipt_hash = ?1",
            [hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a transaction by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: i64) -> Result<Option<Transaction>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
                [id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(result)
    }

    /// Overwrite a stored transaction.
    ///
    /// The receipt hash and creation time are kept from the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotFound`] if no row has the transaction's
    /// id, or a validation error if the transaction is invalid or has no id.
    pub fn update(&self, tx: &Transaction) -> Result<()> {
        let id = tx
            .id
            .ok_or_else(|| Error::validation("id", "transaction has not been saved"))?;
        tx.validate()?;

        let items = serde_json::to_string(&tx.items)?;
        let affected = self.conn.execute(
            r"
            UPDATE transactions
            SET date = ?1, merchant = ?2, category = ?3, total = ?4, currency = ?5, items = ?6
            WHERE id = ?7
            ",
            params![
                tx.date.to_string(),
                tx.merchant,
                tx.category.as_str(),
                tx.total.minor(),
                tx.currency,
                items,
                id,
            ],
        )?;

        if affected == 0 {
            return Err(Error::TransactionNotFound { id });
        }
        debug!("Updated transaction {}", id);
        Ok(())
    }

    /// Delete a transaction by id.
    ///
    /// Returns `true` if a transaction was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM transactions WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Get the most recent transactions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<Transaction>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY date DESC, id DESC LIMIT ?1"
            ),
            params![limit_i64],
        )
    }

    /// Get every transaction dated within `start..=end`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        self.query(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE date >= ?1 AND date <= ?2 ORDER BY date ASC, id ASC"
            ),
            params![start.to_string(), end.to_string()],
        )
    }

    /// Get every transaction, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_all(&self) -> Result<Vec<Transaction>> {
        self.query(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY date ASC, id ASC"),
            [],
        )
    }

    /// Get transactions in one category, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_by_category(&self, category: Category, limit: usize) -> Result<Vec<Transaction>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE category = ?1 ORDER BY date DESC, id DESC LIMIT ?2"
            ),
            params![category.as_str(), limit_i64],
        )
    }

    /// Search transactions by merchant.
    ///
    /// Performs a case-insensitive substring search.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Transaction>> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE merchant LIKE ?1 ESCAPE '\\' ORDER BY date DESC, id DESC LIMIT ?2"
            ),
            params![pattern, limit_i64],
        )
    }

    /// Count stored transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_transactions = self.count()?;

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_transactions,
            oldest: oldest.and_then(|s| s.parse().ok()),
            newest: newest.and_then(|s| s.parse().ok()),
            db_size_bytes,
        })
    }

    /// Load the saved settings, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the saved value
    /// is not valid settings JSON.
    pub fn load_settings(&self) -> Result<Option<Settings>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    /// Save settings, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (SETTINGS_KEY, json),
        )?;
        debug!("Saved settings");
        Ok(())
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let transactions = stmt
            .query_map(params, Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    /// Convert a database row to a [`Transaction`].
    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let id: i64 = row.get(0)?;
        let date_str: String = row.get(1)?;
        let merchant: String = row.get(2)?;
        let category_str: String = row.get(3)?;
        let total: i64 = row.get(4)?;
        let currency: String = row.get(5)?;
        let items_json: String = row.get(6)?;
        let receipt_hash: Option<String> = row.get(7)?;
        let created_at_str: String = row.get(8)?;

        let date = date_str
            .parse::<NaiveDate>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

        let category = category_str.parse().unwrap_or_else(|_| {
            warn!(
                "Unknown category: {}, defaulting to other",
                category_str
            );
            Category::Other
        });

        let items = serde_json::from_str(&items_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

        Ok(Transaction {
            id: Some(id),
            date,
            merchant,
            category,
            total: Money::from_minor(total),
            currency,
            items,
            receipt_hash,
            created_at,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of transactions stored.
    pub total_transactions: i64,
    /// Date of the oldest transaction.
    pub oldest: Option<NaiveDate>,
    /// Date of the newest transaction.
    pub newest: Option<NaiveDate>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
