//! `SQLite` schema definitions for tallyscan.

/// SQL statement to create the transactions table.
///
/// Amounts are stored in minor units, dates as `YYYY-MM-DD` and line items
/// as a JSON array.
pub const CREATE_TRANSACTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    merchant TEXT NOT NULL,
    category TEXT NOT NULL,
    total INTEGER NOT NULL,
    currency TEXT NOT NULL,
    items TEXT NOT NULL DEFAULT '[]',
    receipt_hash TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create an index on date for period queries.
pub const CREATE_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date DESC)
";

/// SQL statement to create an index on `receipt_hash` for deduplication.
pub const CREATE_HASH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions(receipt_hash)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All base schema statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_TRANSACTIONS_TABLE,
    CREATE_DATE_INDEX,
    CREATE_HASH_INDEX,
    CREATE_METADATA_TABLE,
];

/// Index added by schema version 2.
pub const CREATE_CATEGORY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category, date DESC)
";
