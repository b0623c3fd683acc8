//! Receipt ingestion.
//!
//! Receipt images are turned into parsed transactions by a [`ReceiptScanner`].
//! [`BatchScanner`] drives a scanner over every image queued in the scan
//! session, bounded by a concurrency limit, and records the classified
//! results back into the session.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::batch::{BatchReceipt, ParsedTransaction};
use crate::error::{Error, Result};
use crate::session::ScanSessionStore;
use crate::transaction::{Category, LineItem, Money};

/// A receipt image queued for scanning.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceiptImage {
    /// Display name, usually the file name.
    pub name: String,
    /// Raw image bytes.
    pub bytes: Arc<[u8]>,
    /// BLAKE3 hash of the bytes for deduplication.
    pub content_hash: String,
}

impl fmt::Debug for ReceiptImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiptImage")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

impl ReceiptImage {
    /// Create an image from raw bytes.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let content_hash = Self::compute_hash(&bytes);
        Self {
            name: name.into(),
            bytes: bytes.into(),
            content_hash,
        }
    }

    /// Read an image from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, bytes))
    }

    /// Compute the BLAKE3 hash of the given bytes.
    #[must_use]
    pub fn compute_hash(bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}

/// What a scanner recovered from one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Parsed transaction fields.
    pub transaction: ParsedTransaction,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f32,
}

/// Turns receipt images into parsed transactions.
#[async_trait]
pub trait ReceiptScanner: Send + Sync {
    /// The name of this scanner (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Scan one image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be read as a receipt.
    async fn scan(&self, image: &ReceiptImage) -> Result<ScanOutcome>;
}

/// Words that mark a line as something other than a purchased item.
const NON_ITEM_WORDS: &[&str] = &[
    "total", "subtotal", "sub-total", "tax", "vat", "change", "cash", "card", "visa",
    "mastercard", "balance", "tip", "discount", "amount",
];

/// Scanner for OCR text output.
///
/// Reads the image bytes as UTF-8 text. The first line with letters that is
/// not an item or a total names the merchant; a `TOTAL` line gives the total;
/// the first `YYYY-MM-DD`, `DD/MM/YYYY` or `DD.MM.YYYY` date is the receipt
/// date; `name  price` lines are items.
#[derive(Debug)]
pub struct TextReceiptScanner {
    default_currency: String,
    total_re: Regex,
    iso_date_re: Regex,
    dmy_date_re: Regex,
    item_re: Regex,
}

impl TextReceiptScanner {
    /// Create a scanner that assumes `default_currency` unless the receipt
    /// shows a currency symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new(default_currency: impl Into<String>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::internal(format!("bad receipt pattern: {e}")))
        };
        Ok(Self {
            default_currency: default_currency.into(),
            total_re: compile(r"(?i)^(?:grand\s+)?total(?:\s+due)?\b[^\d-]*(-?\d[\d.,]*)")?,
            iso_date_re: compile(r"\b(\d{4})-(\d{2})-(\d{2})\b")?,
            dmy_date_re: compile(r"\b(\d{1,2})[/.](\d{1,2})[/.](\d{4})\b")?,
            item_re: compile(r"^(?:(\d+)\s*[xX]\s+)?(.*?[A-Za-z].*?)\s+[$€£]?(-?\d+[.,]\d{2})$")?,
        })
    }

    /// Parse receipt text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scan`] if the text has no usable lines.
    pub fn parse_text(&self, name: &str, text: &str) -> Result<ScanOutcome> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(Error::scan(name, "receipt is empty"));
        }

        let mut parsed = ParsedTransaction::empty(self.detect_currency(text));
        let mut merchant: Option<&str> = None;

        for line in &lines {
            if let Some(caps) = self.total_re.captures(line) {
                match Money::parse(&caps[1]) {
                    Ok(total) => parsed.total = Some(total),
                    Err(err) => debug!(line, error = %err, "Ignoring unreadable total"),
                }
                continue;
            }
            if parsed.date.is_none() {
                parsed.date = self.parse_date(line);
            }
            if let Some(item) = self.parse_item(line) {
                parsed.items.push(item);
                continue;
            }
            if merchant.is_none()
                && line.chars().any(char::is_alphabetic)
                && !is_non_item(line)
                && self.parse_date(line).is_none()
            {
                merchant = Some(line);
            }
        }

        parsed.merchant = merchant.unwrap_or_default().to_string();
        parsed.category = Category::infer(&parsed.merchant);

        let confidence = Self::confidence(&parsed);
        debug!(
            receipt = name,
            merchant = %parsed.merchant,
            items = parsed.items.len(),
            confidence,
            "Parsed receipt text"
        );
        Ok(ScanOutcome {
            transaction: parsed,
            confidence,
        })
    }

    fn detect_currency(&self, text: &str) -> String {
        if text.contains('€') || text.contains("EUR") {
            "EUR".to_string()
        } else if text.contains('£') || text.contains("GBP") {
            "GBP".to_string()
        } else {
            self.default_currency.clone()
        }
    }

    fn parse_date(&self, line: &str) -> Option<NaiveDate> {
        if let Some(caps) = self.iso_date_re.captures(line) {
            return NaiveDate::from_ymd_opt(
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            );
        }
        let caps = self.dmy_date_re.captures(line)?;
        NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[2].parse().ok()?,
            caps[1].parse().ok()?,
        )
    }

    fn parse_item(&self, line: &str) -> Option<LineItem> {
        let caps = self.item_re.captures(line)?;
        let name = caps[2].trim();
        if is_non_item(name) {
            return None;
        }
        let price = Money::parse(&caps[3]).ok()?;
        let quantity = caps
            .get(1)
            .and_then(|q| q.as_str().parse().ok())
            .filter(|q| *q > 0)
            .unwrap_or(1);
        Some(LineItem {
            name: name.to_string(),
            price,
            quantity,
        })
    }

    /// One quarter per field found; a mismatch between the item sum and the
    /// total costs a quarter of what remains.
    fn confidence(parsed: &ParsedTransaction) -> f32 {
        let found = [
            !parsed.merchant.is_empty(),
            parsed.total.is_some(),
            parsed.date.is_some(),
            !parsed.items.is_empty(),
        ]
        .into_iter()
        .filter(|f| *f)
        .count();

        #[allow(clippy::cast_precision_loss)]
        let mut confidence = found as f32 / 4.0;
        if let Some(total) = parsed.total {
            let items: Money = parsed.items.iter().map(|i| i.price).sum();
            if !parsed.items.is_empty() && items != total {
                confidence *= 0.75;
            }
        }
        confidence
    }
}

fn is_non_item(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|word| NON_ITEM_WORDS.contains(&word))
}

#[async_trait]
impl ReceiptScanner for TextReceiptScanner {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn scan(&self, image: &ReceiptImage) -> Result<ScanOutcome> {
        let text = std::str::from_utf8(&image.bytes)
            .map_err(|_| Error::scan(&image.name, "receipt is not UTF-8 text"))?;
        self.parse_text(&image.name, text)
    }
}

/// Scans every image in a session with bounded concurrency.
pub struct BatchScanner {
    scanner: Arc<dyn ReceiptScanner>,
    concurrency: usize,
    review_threshold: f32,
    currency: String,
}

impl fmt::Debug for BatchScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScanner")
            .field("scanner", &self.scanner.name())
            .field("concurrency", &self.concurrency)
            .field("review_threshold", &self.review_threshold)
            .field("currency", &self.currency)
            .finish()
    }
}

impl BatchScanner {
    /// Create a batch scanner.
    ///
    /// Results with confidence below `review_threshold` are flagged for review.
    #[must_use]
    pub fn new(
        scanner: Arc<dyn ReceiptScanner>,
        concurrency: usize,
        review_threshold: f32,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            scanner,
            concurrency: concurrency.max(1),
            review_threshold,
            currency: currency.into(),
        }
    }

    /// Scan every queued image and move the session to review.
    ///
    /// Results are recorded in the order the images were queued. A failed
    /// scan becomes a receipt with [`crate::batch::ReceiptStatus::Error`]
    /// rather than failing the batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] if the session has nothing to process.
    pub async fn run(&self, session: &ScanSessionStore) -> Result<Vec<BatchReceipt>> {
        let images = session.begin_processing()?;
        info!(
            images = images.len(),
            scanner = self.scanner.name(),
            concurrency = self.concurrency,
            "Scanning batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (index, image) in images.iter().cloned().enumerate() {
            let scanner = Arc::clone(&self.scanner);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = scanner.scan(&image).await;
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<ScanOutcome>>> = images.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(err) => warn!(error = %err, "Scan task failed"),
            }
        }

        for (image, outcome) in images.iter().zip(outcomes) {
            let receipt = match outcome {
                Some(Ok(outcome)) => BatchReceipt::scanned(
                    image.name.clone(),
                    image.content_hash.clone(),
                    outcome.transaction,
                    outcome.confidence,
                    self.review_threshold,
                ),
                Some(Err(err)) => {
                    warn!(image = %image.name, error = %err, "Receipt scan failed");
                    BatchReceipt::failed(
                        image.name.clone(),
                        image.content_hash.clone(),
                        self.currency.clone(),
                        err.to_string(),
                    )
                }
                None => BatchReceipt::failed(
                    image.name.clone(),
                    image.content_hash.clone(),
                    self.currency.clone(),
                    "scan task did not complete",
                ),
            };
            session.record_result(receipt)?;
        }

        session.finish_processing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ReceiptStatus;
    use crate::session::ScanPhase;

    const GROCERY: &str = "\
CORNER MARKET
123 Main St
2024-03-09 14:22
Apples            4.50
2 x Milk          3.00
SUBTOTAL          7.50
TAX               0.00
TOTAL             7.50
VISA **** 1234
";

    fn scanner() -> TextReceiptScanner {
        TextReceiptScanner::new("USD").unwrap()
    }

    #[test]
    fn test_image_hash() {
        let a = ReceiptImage::new("a", b"same".to_vec());
        let b = ReceiptImage::new("b", b"same".to_vec());
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.content_hash, ReceiptImage::compute_hash(b"other"));
        assert!(format!("{a:?}").contains("len"));
    }

    #[test]
    fn test_image_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lunch.txt");
        std::fs::write(&path, "CAFE\nTOTAL 3.20\n").unwrap();
        let image = ReceiptImage::from_path(&path).unwrap();
        assert_eq!(image.name, "lunch.txt");
        assert_eq!(&*image.bytes, b"CAFE\nTOTAL 3.20\n");
    }

    #[test]
    fn test_parse_full_receipt() {
        let outcome = scanner().parse_text("grocery", GROCERY).unwrap();
        let tx = outcome.transaction;
        assert_eq!(tx.merchant, "CORNER MARKET");
        assert_eq!(tx.category, Category::Supermarket);
        assert_eq!(tx.total, Some(Money::from_minor(750)));
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 9));
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.items.len(), 2);
        assert_eq!(tx.items[1].name, "Milk");
        assert_eq!(tx.items[1].quantity, 2);
        assert!((outcome.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_dmy_date_and_euro() {
        let text = "Bistro Roma\n09.03.2024\nPasta  12,50\nTotal: € 12,50\n";
        let tx = scanner().parse_text("r", text).unwrap().transaction;
        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 3, 9));
        assert_eq!(tx.currency, "EUR");
        assert_eq!(tx.total, Some(Money::from_minor(1250)));
        assert_eq!(tx.category, Category::Restaurant);
    }

    #[test]
    fn test_parse_mismatched_items_lowers_confidence() {
        let text = "Shop\n2024-01-02\nThing  5.00\nTOTAL 9.00\n";
        let outcome = scanner().parse_text("r", text).unwrap();
        assert!((outcome.confidence - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_missing_total() {
        let outcome = scanner().parse_text("r", "Kiosk\nGum  1.00\n").unwrap();
        assert!(outcome.transaction.total.is_none());
        assert!((outcome.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_empty_text_fails() {
        let err = scanner().parse_text("blank", " \n\n").unwrap_err();
        assert!(err.to_string().contains("blank"));
    }

    #[test]
    fn test_non_item_lines_skipped() {
        assert!(is_non_item("SUBTOTAL"));
        assert!(is_non_item("Card payment"));
        assert!(!is_non_item("Apples"));
    }

    #[tokio::test]
    async fn test_scan_rejects_binary() {
        let image = ReceiptImage::new("photo.jpg", vec![0xff, 0xd8, 0xff, 0xe0]);
        let err = scanner().scan(&image).await.unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_batch_scanner_records_in_order() {
        let session = ScanSessionStore::new(10);
        session
            .add_image(ReceiptImage::new("one", GROCERY.as_bytes().to_vec()))
            .unwrap();
        session
            .add_image(ReceiptImage::new("two", vec![0xff, 0xfe]))
            .unwrap();
        session
            .add_image(ReceiptImage::new("three", b"Kiosk\nGum  1.00\n".to_vec()))
            .unwrap();

        let batch = BatchScanner::new(Arc::new(scanner()), 2, 0.7, "USD");
        let results = batch.run(&session).await.unwrap();

        let names: Vec<_> = results.iter().map(|r| r.image_name.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
        assert_eq!(results[0].status, ReceiptStatus::Ready);
        assert_eq!(results[1].status, ReceiptStatus::Error);
        assert_eq!(results[2].status, ReceiptStatus::Review);
        assert_eq!(session.phase(), ScanPhase::Reviewing);
        assert_eq!(session.snapshot().processed, 3);
    }

    #[tokio::test]
    async fn test_batch_scanner_requires_images() {
        let session = ScanSessionStore::new(10);
        let batch = BatchScanner::new(Arc::new(scanner()), 2, 0.7, "USD");
        assert!(batch.run(&session).await.is_err());
    }
}
