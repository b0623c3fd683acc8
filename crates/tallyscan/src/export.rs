//! CSV export of transactions.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::transaction::{Category, Transaction};

/// Column names, in order.
pub const HEADER: [&str; 7] = ["id", "date", "merchant", "category", "total", "currency", "items"];

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: Option<i64>,
    date: NaiveDate,
    merchant: &'a str,
    category: Category,
    total: String,
    currency: &'a str,
    items: String,
}

impl<'a> From<&'a Transaction> for CsvRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            id: tx.id,
            date: tx.date,
            merchant: &tx.merchant,
            category: tx.category,
            total: tx.total.to_string(),
            currency: &tx.currency,
            items: format_items(tx),
        }
    }
}

/// Items as `name price` pairs separated by `; `, with `xN` for
/// multi-unit lines.
fn format_items(tx: &Transaction) -> String {
    tx.items
        .iter()
        .map(|item| {
            if item.quantity == 1 {
                format!("{} {}", item.name, item.price)
            } else {
                format!("{} x{} {}", item.name, item.quantity, item.price)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Write transactions as CSV, header first.
///
/// Returns the number of rows written, excluding the header.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv<W: Write>(writer: W, transactions: &[Transaction]) -> Result<usize> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv.write_record(HEADER)?;
    for tx in transactions {
        csv.serialize(CsvRow::from(tx))?;
    }
    csv.flush()?;
    Ok(transactions.len())
}

/// Write transactions to a CSV file, replacing it if it exists.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn export_file(path: impl AsRef<Path>, transactions: &[Transaction]) -> Result<usize> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    let rows = write_csv(std::io::BufWriter::new(file), transactions)?;
    info!(rows, path = %path.display(), "Exported transactions");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{LineItem, Money};

    fn sample() -> Transaction {
        let mut tx = Transaction::new(
            "Corner Market, Main St",
            Money::from_minor(750),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        )
        .with_items(vec![
            LineItem::new("Apples", Money::from_minor(450)),
            LineItem {
                name: "Milk".to_string(),
                price: Money::from_minor(300),
                quantity: 2,
            },
        ]);
        tx.id = Some(7);
        tx
    }

    fn export(transactions: &[Transaction]) -> String {
        let mut out = Vec::new();
        write_csv(&mut out, transactions).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header_only_when_empty() {
        assert_eq!(export(&[]), "id,date,merchant,category,total,currency,items\n");
    }

    #[test]
    fn test_row_format() {
        let csv = export(&[sample()]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "7,2024-03-09,\"Corner Market, Main St\",supermarket,7.50,USD,Apples 4.50; Milk x2 3.00"
        );
    }

    #[test]
    fn test_rows_read_back() {
        let csv = export(&[sample(), sample()]);
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), HEADER.to_vec());

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "Corner Market, Main St");
    }

    #[test]
    fn test_export_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert_eq!(export_file(&path, &[sample()]).unwrap(), 1);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("id,date"));
    }
}
