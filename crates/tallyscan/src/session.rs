//! Scan-session store.
//!
//! Tracks one multi-image scan from capture through processing. Once
//! processing finishes, the session keeps the scan results so that the
//! review workflow and the session agree on which receipts exist.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::batch::{BatchReceipt, ReceiptId, ReceiptUpdate};
use crate::error::{Error, Result};
use crate::scan::ReceiptImage;
use crate::store::Store;
use crate::sync::ReceiptCache;

/// Where a scan session is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// No batch in progress.
    #[default]
    Idle,
    /// Images are being collected.
    Capturing,
    /// Images are being scanned.
    Processing,
    /// Results are waiting for review.
    Reviewing,
    /// Every receipt has been saved or discarded.
    Complete,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Capturing => write!(f, "capturing"),
            Self::Processing => write!(f, "processing"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// State held by the scan-session store.
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    /// Lifecycle phase.
    pub phase: ScanPhase,
    /// Images queued for scanning.
    pub images: Vec<ReceiptImage>,
    /// Scan results, in image order.
    pub results: Vec<BatchReceipt>,
    /// Number of images scanned so far.
    pub processed: usize,
    /// The last update applied to a result.
    pub last_update: Option<Arc<ReceiptUpdate>>,
}

impl ScanSession {
    /// Fraction of queued images already scanned.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f32 {
        if self.images.is_empty() {
            0.0
        } else {
            self.processed as f32 / self.images.len() as f32
        }
    }
}

/// Store for the active scan session.
#[derive(Debug)]
pub struct ScanSessionStore {
    store: Store<ScanSession>,
    max_batch_size: usize,
}

impl ScanSessionStore {
    /// Create an idle session store.
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            store: Store::new("scan_session", ScanSession::default()),
            max_batch_size,
        }
    }

    /// The underlying observable store.
    #[must_use]
    pub fn store(&self) -> &Store<ScanSession> {
        &self.store
    }

    /// Clone the current session.
    #[must_use]
    pub fn snapshot(&self) -> ScanSession {
        self.store.snapshot()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ScanPhase {
        self.store.read(|s| s.phase)
    }

    /// Clone the current scan results.
    #[must_use]
    pub fn results(&self) -> Vec<BatchReceipt> {
        self.store.read(|s| s.results.clone())
    }

    /// Begin collecting images for a new batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] while a batch is being processed.
    pub fn start_batch(&self) -> Result<()> {
        self.store.update(|s| {
            if s.phase == ScanPhase::Processing {
                return Err(Error::invalid_phase("start a batch", s.phase));
            }
            *s = ScanSession {
                phase: ScanPhase::Capturing,
                ..ScanSession::default()
            };
            Ok(())
        })?;
        debug!("Started new scan batch");
        Ok(())
    }

    /// Queue an image for scanning.
    ///
    /// An idle session starts a batch implicitly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateImage`] if an image with the same content is
    /// already queued, [`Error::BatchFull`] when the batch limit is reached,
    /// or [`Error::InvalidPhase`] outside the capturing phase.
    pub fn add_image(&self, image: ReceiptImage) -> Result<()> {
        let limit = self.max_batch_size;
        self.store.update(|s| {
            match s.phase {
                ScanPhase::Idle | ScanPhase::Complete => {
                    *s = ScanSession {
                        phase: ScanPhase::Capturing,
                        ..ScanSession::default()
                    };
                }
                ScanPhase::Capturing => {}
                phase => return Err(Error::invalid_phase("add images", phase)),
            }
            if s.images.iter().any(|i| i.content_hash == image.content_hash) {
                return Err(Error::DuplicateImage { name: image.name });
            }
            if s.images.len() >= limit {
                return Err(Error::BatchFull { limit });
            }
            debug!(image = %image.name, "Queued receipt image");
            s.images.push(image);
            Ok(())
        })
    }

    /// Remove a queued image by content hash.
    ///
    /// Returns `false` if no queued image has that hash.
    pub fn remove_image(&self, content_hash: &str) -> bool {
        self.store.update(|s| {
            if s.phase != ScanPhase::Capturing {
                return false;
            }
            let before = s.images.len();
            s.images.retain(|i| i.content_hash != content_hash);
            s.images.len() != before
        })
    }

    /// Move to processing and hand out the queued images.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] unless capturing with at least one image.
    pub fn begin_processing(&self) -> Result<Vec<ReceiptImage>> {
        self.store.update(|s| {
            if s.phase != ScanPhase::Capturing || s.images.is_empty() {
                return Err(Error::invalid_phase("process", s.phase));
            }
            s.phase = ScanPhase::Processing;
            s.processed = 0;
            s.results.clear();
            Ok(s.images.clone())
        })
    }

    /// Record the result for one image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] outside processing.
    pub fn record_result(&self, receipt: BatchReceipt) -> Result<()> {
        self.store.update(|s| {
            if s.phase != ScanPhase::Processing {
                return Err(Error::invalid_phase("record results", s.phase));
            }
            s.results.push(receipt);
            s.processed += 1;
            Ok(())
        })
    }

    /// Finish processing and hand the results to review.
    ///
    /// A batch with no results is complete immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] outside processing.
    pub fn finish_processing(&self) -> Result<Vec<BatchReceipt>> {
        let results = self.store.update(|s| {
            if s.phase != ScanPhase::Processing {
                return Err(Error::invalid_phase("finish processing", s.phase));
            }
            s.phase = if s.results.is_empty() {
                ScanPhase::Complete
            } else {
                ScanPhase::Reviewing
            };
            Ok(s.results.clone())
        })?;
        info!(receipts = results.len(), "Scan batch processed");
        Ok(results)
    }

    /// Drop the session and return to idle.
    pub fn reset(&self) {
        self.store.update(|s| *s = ScanSession::default());
    }
}

impl ReceiptCache for ScanSessionStore {
    fn cache_name(&self) -> &'static str {
        self.store.name()
    }

    fn contains_receipt(&self, id: &ReceiptId) -> bool {
        self.store.read(|s| s.results.iter().any(|r| &r.id == id))
    }

    fn receipt_count(&self) -> usize {
        self.store.read(|s| s.results.len())
    }

    fn remove_receipt(&self, id: &ReceiptId) -> bool {
        if !self.contains_receipt(id) {
            return false;
        }
        self.store.mutate(|s| {
            let before = s.results.len();
            s.results.retain(|r| &r.id != id);
            s.results.len() != before
        })
    }

    fn update_receipt(&self, id: &ReceiptId, update: &Arc<ReceiptUpdate>) -> bool {
        let changes = self
            .store
            .read(|s| s.results.iter().any(|r| &r.id == id && r.changed_by(update)));
        if !changes {
            return false;
        }
        self.store.mutate(|s| {
            let changed = s
                .results
                .iter_mut()
                .find(|r| &r.id == id)
                .is_some_and(|r| r.apply(update));
            if changed {
                s.last_update = Some(Arc::clone(update));
            }
            changed
        })
    }

    fn finish_batch(&self) {
        self.store.mutate(|s| {
            s.phase = ScanPhase::Complete;
            s.images.clear();
        });
    }

    fn publish(&self) {
        self.store.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ParsedTransaction, ReceiptStatus};

    fn image(name: &str, text: &str) -> ReceiptImage {
        ReceiptImage::new(name, text.as_bytes().to_vec())
    }

    fn receipt(name: &str) -> BatchReceipt {
        BatchReceipt::scanned(name, name, ParsedTransaction::empty("USD"), 1.0, 0.7)
    }

    #[test]
    fn test_new_session_is_idle() {
        let store = ScanSessionStore::new(5);
        assert_eq!(store.phase(), ScanPhase::Idle);
        assert!(store.results().is_empty());
    }

    #[test]
    fn test_add_image_starts_batch() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "one")).unwrap();
        assert_eq!(store.phase(), ScanPhase::Capturing);
        assert_eq!(store.snapshot().images.len(), 1);
    }

    #[test]
    fn test_add_duplicate_image_rejected() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "same")).unwrap();
        let err = store.add_image(image("b", "same")).unwrap_err();
        assert!(matches!(err, Error::DuplicateImage { name } if name == "b"));
    }

    #[test]
    fn test_batch_limit() {
        let store = ScanSessionStore::new(2);
        store.add_image(image("a", "1")).unwrap();
        store.add_image(image("b", "2")).unwrap();
        let err = store.add_image(image("c", "3")).unwrap_err();
        assert!(matches!(err, Error::BatchFull { limit: 2 }));
    }

    #[test]
    fn test_remove_image() {
        let store = ScanSessionStore::new(5);
        let img = image("a", "1");
        let hash = img.content_hash.clone();
        store.add_image(img).unwrap();
        assert!(store.remove_image(&hash));
        assert!(!store.remove_image(&hash));
    }

    #[test]
    fn test_processing_lifecycle() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.add_image(image("b", "2")).unwrap();

        let images = store.begin_processing().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(store.phase(), ScanPhase::Processing);
        assert!(store.add_image(image("c", "3")).is_err());

        store.record_result(receipt("a")).unwrap();
        assert!((store.snapshot().progress() - 0.5).abs() < f32::EPSILON);
        store.record_result(receipt("b")).unwrap();

        let results = store.finish_processing().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(store.phase(), ScanPhase::Reviewing);
    }

    #[test]
    fn test_begin_processing_requires_images() {
        let store = ScanSessionStore::new(5);
        store.start_batch().unwrap();
        assert!(store.begin_processing().is_err());
    }

    #[test]
    fn test_start_batch_rejected_while_processing() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.begin_processing().unwrap();
        assert!(store.start_batch().is_err());
    }

    #[test]
    fn test_finish_empty_processing_completes() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.begin_processing().unwrap();
        store.finish_processing().unwrap();
        assert_eq!(store.phase(), ScanPhase::Complete);
    }

    #[test]
    fn test_cache_remove_is_silent() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.begin_processing().unwrap();
        let r = receipt("a");
        let id = r.id.clone();
        store.record_result(r).unwrap();

        let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        store.store().subscribe(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        assert!(store.remove_receipt(&id));
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 0);
        store.publish();
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!store.remove_receipt(&id));
    }

    #[test]
    fn test_cache_update_applies() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.begin_processing().unwrap();
        let r = receipt("a");
        let id = r.id.clone();
        store.record_result(r).unwrap();

        let update = Arc::new(ReceiptUpdate::status(ReceiptStatus::Ready));
        assert!(store.update_receipt(&id, &update));
        assert_eq!(store.results()[0].status, ReceiptStatus::Ready);
        assert!(!store.update_receipt(&ReceiptId::from("missing"), &update));
    }

    #[test]
    fn test_cache_update_without_change_leaves_state() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.begin_processing().unwrap();
        let r = receipt("a");
        let id = r.id.clone();
        store.record_result(r).unwrap();

        let first = Arc::new(ReceiptUpdate::status(ReceiptStatus::Ready));
        assert!(store.update_receipt(&id, &first));
        let version = store.store().version();

        let repeat = Arc::new(ReceiptUpdate::status(ReceiptStatus::Ready));
        assert!(!store.update_receipt(&id, &repeat));
        assert_eq!(store.store().version(), version);
        let last = store.snapshot().last_update.unwrap();
        assert!(Arc::ptr_eq(&last, &first));
    }

    #[test]
    fn test_reset() {
        let store = ScanSessionStore::new(5);
        store.add_image(image("a", "1")).unwrap();
        store.reset();
        assert_eq!(store.phase(), ScanPhase::Idle);
        assert!(store.snapshot().images.is_empty());
    }
}
