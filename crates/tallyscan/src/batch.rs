//! Batch receipt records.
//!
//! A batch is the set of receipts produced by one multi-image scan. Each
//! receipt carries the transaction parsed from its image and a status that
//! drives the review workflow.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transaction::{Category, LineItem, Money, Transaction, DEFAULT_CURRENCY};

/// Identity of a receipt within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(String);

impl ReceiptId {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identity as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReceiptId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ReceiptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Review status of a batch receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Parsed confidently; can be saved as is.
    Ready,
    /// Parsed, but needs a human look before saving.
    Review,
    /// Scanning failed.
    Error,
    /// Changed by the user during review.
    Edited,
}

impl ReceiptStatus {
    /// Whether a receipt in this status may be saved as a transaction.
    #[must_use]
    pub const fn is_saveable(self) -> bool {
        matches!(self, Self::Ready | Self::Edited)
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Review => write!(f, "review"),
            Self::Error => write!(f, "error"),
            Self::Edited => write!(f, "edited"),
        }
    }
}

/// Transaction fields as recovered from a receipt image.
///
/// Unlike [`Transaction`], the date and total may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedTransaction {
    /// Store name.
    pub merchant: String,
    /// Date printed on the receipt.
    pub date: Option<NaiveDate>,
    /// Total printed on the receipt.
    pub total: Option<Money>,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Store category.
    pub category: Category,
    /// Receipt lines.
    pub items: Vec<LineItem>,
}

impl ParsedTransaction {
    /// Create an empty parse result in the given currency.
    #[must_use]
    pub fn empty(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            ..Self::default()
        }
    }

    /// Turn the parsed fields into a transaction ready for storage.
    ///
    /// A missing date falls back to `fallback_date`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the total is missing or the
    /// resulting transaction does not validate.
    pub fn to_transaction(&self, fallback_date: NaiveDate) -> Result<Transaction> {
        let total = self
            .total
            .ok_or_else(|| Error::validation("total", "receipt has no total"))?;
        let currency = if self.currency.is_empty() {
            DEFAULT_CURRENCY
        } else {
            self.currency.as_str()
        };

        let tx = Transaction::new(
            self.merchant.clone(),
            total,
            self.date.unwrap_or(fallback_date),
        )
        .with_category(self.category)
        .with_currency(currency)
        .with_items(self.items.clone());
        tx.validate()?;
        Ok(tx)
    }
}

/// One receipt within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReceipt {
    /// Identity shared by every store that holds this receipt.
    pub id: ReceiptId,
    /// Name of the source image.
    pub image_name: String,
    /// BLAKE3 hash of the source image.
    pub image_hash: String,
    /// Review status.
    pub status: ReceiptStatus,
    /// Parsed transaction fields.
    pub transaction: ParsedTransaction,
    /// Scanner confidence in `0.0..=1.0`.
    pub confidence: f32,
    /// Why scanning failed, for [`ReceiptStatus::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchReceipt {
    /// Create a receipt from a successful scan.
    #[must_use]
    pub fn scanned(
        image_name: impl Into<String>,
        image_hash: impl Into<String>,
        transaction: ParsedTransaction,
        confidence: f32,
        review_threshold: f32,
    ) -> Self {
        let status = if transaction.total.is_none() || confidence < review_threshold {
            ReceiptStatus::Review
        } else {
            ReceiptStatus::Ready
        };
        Self {
            id: ReceiptId::generate(),
            image_name: image_name.into(),
            image_hash: image_hash.into(),
            status,
            transaction,
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    /// Create a receipt for an image that failed to scan.
    #[must_use]
    pub fn failed(
        image_name: impl Into<String>,
        image_hash: impl Into<String>,
        currency: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: ReceiptId::generate(),
            image_name: image_name.into(),
            image_hash: image_hash.into(),
            status: ReceiptStatus::Error,
            transaction: ParsedTransaction::empty(currency),
            confidence: 0.0,
            error: Some(error.into()),
        }
    }

    /// Apply a partial update in place.
    ///
    /// Returns `true` if anything changed.
    pub fn apply(&mut self, update: &ReceiptUpdate) -> bool {
        if update.is_empty() {
            return false;
        }

        let before = self.clone();
        let tx = &mut self.transaction;
        if let Some(merchant) = &update.merchant {
            tx.merchant.clone_from(merchant);
        }
        if let Some(date) = update.date {
            tx.date = Some(date);
        }
        if let Some(total) = update.total {
            tx.total = Some(total);
        }
        if let Some(category) = update.category {
            tx.category = category;
        }
        if let Some(items) = &update.items {
            tx.items.clone_from(items);
        }

        match update.status {
            Some(status) => self.status = status,
            None if update.has_fields() => {
                self.status = ReceiptStatus::Edited;
                self.error = None;
            }
            None => {}
        }

        *self != before
    }

    /// Whether applying `update` would change this receipt.
    #[must_use]
    pub fn changed_by(&self, update: &ReceiptUpdate) -> bool {
        self.clone().apply(update)
    }
}

/// Partial changes to a batch receipt.
///
/// Absent fields are left untouched. An update that carries data fields but
/// no status marks the receipt as [`ReceiptStatus::Edited`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptUpdate {
    /// New store name.
    pub merchant: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// New total.
    pub total: Option<Money>,
    /// New category.
    pub category: Option<Category>,
    /// Replacement line items.
    pub items: Option<Vec<LineItem>>,
    /// Explicit status.
    pub status: Option<ReceiptStatus>,
}

impl ReceiptUpdate {
    /// An update that only changes the status.
    #[must_use]
    pub fn status(status: ReceiptStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Whether the update carries any data field (status excluded).
    #[must_use]
    pub fn has_fields(&self) -> bool {
        self.merchant.is_some()
            || self.date.is_some()
            || self.total.is_some()
            || self.category.is_some()
            || self.items.is_some()
    }

    /// Whether the update carries nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_fields() && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(total: Option<i64>) -> ParsedTransaction {
        ParsedTransaction {
            merchant: "Corner Market".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 9),
            total: total.map(Money::from_minor),
            currency: "USD".to_string(),
            category: Category::Supermarket,
            items: vec![LineItem::new("Apples", Money::from_minor(450))],
        }
    }

    #[test]
    fn test_receipt_id_generate_is_unique() {
        assert_ne!(ReceiptId::generate(), ReceiptId::generate());
        assert_eq!(ReceiptId::from("abc").as_str(), "abc");
    }

    #[test]
    fn test_status_display_and_saveable() {
        assert_eq!(ReceiptStatus::Review.to_string(), "review");
        assert!(ReceiptStatus::Ready.is_saveable());
        assert!(ReceiptStatus::Edited.is_saveable());
        assert!(!ReceiptStatus::Review.is_saveable());
        assert!(!ReceiptStatus::Error.is_saveable());
    }

    #[test]
    fn test_scanned_classification() {
        let ready = BatchReceipt::scanned("a", "h1", parsed(Some(450)), 0.9, 0.7);
        assert_eq!(ready.status, ReceiptStatus::Ready);

        let low = BatchReceipt::scanned("b", "h2", parsed(Some(450)), 0.5, 0.7);
        assert_eq!(low.status, ReceiptStatus::Review);

        let no_total = BatchReceipt::scanned("c", "h3", parsed(None), 1.0, 0.7);
        assert_eq!(no_total.status, ReceiptStatus::Review);
    }

    #[test]
    fn test_failed_receipt() {
        let receipt = BatchReceipt::failed("bad.txt", "h", "USD", "unreadable");
        assert_eq!(receipt.status, ReceiptStatus::Error);
        assert_eq!(receipt.error.as_deref(), Some("unreadable"));
        assert!(receipt.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_apply_marks_edited() {
        let mut receipt = BatchReceipt::scanned("a", "h", parsed(Some(450)), 0.9, 0.7);
        let update = ReceiptUpdate {
            merchant: Some("Farmers Market".to_string()),
            ..ReceiptUpdate::default()
        };
        assert!(receipt.apply(&update));
        assert_eq!(receipt.transaction.merchant, "Farmers Market");
        assert_eq!(receipt.status, ReceiptStatus::Edited);
        assert_eq!(receipt.transaction.total, Some(Money::from_minor(450)));
    }

    #[test]
    fn test_apply_explicit_status_wins() {
        let mut receipt = BatchReceipt::scanned("a", "h", parsed(Some(450)), 0.9, 0.7);
        let update = ReceiptUpdate {
            total: Some(Money::from_minor(500)),
            status: Some(ReceiptStatus::Review),
            ..ReceiptUpdate::default()
        };
        assert!(receipt.apply(&update));
        assert_eq!(receipt.status, ReceiptStatus::Review);
    }

    #[test]
    fn test_apply_empty_update_is_noop() {
        let mut receipt = BatchReceipt::scanned("a", "h", parsed(Some(450)), 0.9, 0.7);
        let before = receipt.clone();
        assert!(!receipt.apply(&ReceiptUpdate::default()));
        assert_eq!(receipt, before);
    }

    #[test]
    fn test_apply_clears_error_on_edit() {
        let mut receipt = BatchReceipt::failed("bad", "h", "USD", "unreadable");
        let update = ReceiptUpdate {
            merchant: Some("Cafe".to_string()),
            total: Some(Money::from_minor(320)),
            ..ReceiptUpdate::default()
        };
        assert!(receipt.apply(&update));
        assert_eq!(receipt.status, ReceiptStatus::Edited);
        assert!(receipt.error.is_none());
    }

    #[test]
    fn test_to_transaction() {
        let fallback = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let tx = parsed(Some(450)).to_transaction(fallback).unwrap();
        assert_eq!(tx.total, Money::from_minor(450));
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(tx.category, Category::Supermarket);

        let mut undated = parsed(Some(450));
        undated.date = None;
        assert_eq!(undated.to_transaction(fallback).unwrap().date, fallback);

        assert!(parsed(None).to_transaction(fallback).is_err());
    }

    #[test]
    fn test_update_serde_defaults() {
        let update: ReceiptUpdate = serde_json::from_str(r#"{"total": 1200}"#).unwrap();
        assert_eq!(update.total, Some(Money::from_minor(1200)));
        assert!(update.has_fields());
        assert!(ReceiptUpdate::default().is_empty());
        assert!(!ReceiptUpdate::status(ReceiptStatus::Ready).has_fields());
    }
}
