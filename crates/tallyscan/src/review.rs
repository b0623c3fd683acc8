//! Batch-review store.
//!
//! Holds the receipts of a processed batch while the user inspects, edits,
//! saves or discards them.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::batch::{BatchReceipt, ReceiptId, ReceiptStatus, ReceiptUpdate};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::sync::ReceiptCache;
use crate::transaction::Money;

/// Where the review workflow is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPhase {
    /// Nothing loaded.
    #[default]
    Idle,
    /// Receipts are listed for review.
    Reviewing,
    /// One receipt is open in the editor.
    Editing,
    /// Saveable receipts are being written to storage.
    Saving,
    /// The batch is empty; nothing left to review.
    Complete,
}

impl fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Editing => write!(f, "editing"),
            Self::Saving => write!(f, "saving"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// State held by the batch-review store.
#[derive(Debug, Clone, Default)]
pub struct BatchReview {
    /// Workflow phase.
    pub phase: ReviewPhase,
    /// Receipts still in the batch.
    pub receipts: Vec<BatchReceipt>,
    /// The receipt open in the editor.
    pub editing: Option<ReceiptId>,
    /// Storage ids of transactions saved from this batch.
    pub saved: Vec<i64>,
    /// The last update applied to a receipt.
    pub last_update: Option<Arc<ReceiptUpdate>>,
}

/// Counts and totals over the receipts in review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    /// Receipts in the batch.
    pub total: usize,
    /// Receipts ready to save.
    pub ready: usize,
    /// Receipts that need a look.
    pub review: usize,
    /// Receipts that failed to scan.
    pub error: usize,
    /// Receipts changed by the user.
    pub edited: usize,
    /// Sum of totals over saveable receipts.
    pub saveable_amount: Money,
}

impl ReviewSummary {
    /// Number of receipts that may be saved now.
    #[must_use]
    pub fn saveable(&self) -> usize {
        self.ready + self.edited
    }
}

/// Store for the review workflow.
#[derive(Debug)]
pub struct BatchReviewStore {
    store: Store<BatchReview>,
}

impl Default for BatchReviewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReviewStore {
    /// Create an idle review store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Store::new("batch_review", BatchReview::default()),
        }
    }

    /// The underlying observable store.
    #[must_use]
    pub fn store(&self) -> &Store<BatchReview> {
        &self.store
    }

    /// Clone the current review state.
    #[must_use]
    pub fn snapshot(&self) -> BatchReview {
        self.store.snapshot()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ReviewPhase {
        self.store.read(|s| s.phase)
    }

    /// Clone the receipts in review.
    #[must_use]
    pub fn receipts(&self) -> Vec<BatchReceipt> {
        self.store.read(|s| s.receipts.clone())
    }

    /// Clone one receipt.
    #[must_use]
    pub fn receipt(&self, id: &ReceiptId) -> Option<BatchReceipt> {
        self.store
            .read(|s| s.receipts.iter().find(|r| &r.id == id).cloned())
    }

    /// Load a processed batch for review.
    ///
    /// An empty batch is complete immediately.
    pub fn load(&self, receipts: Vec<BatchReceipt>) {
        debug!(receipts = receipts.len(), "Loading batch for review");
        self.store.update(|s| {
            *s = BatchReview {
                phase: if receipts.is_empty() {
                    ReviewPhase::Complete
                } else {
                    ReviewPhase::Reviewing
                },
                receipts,
                ..BatchReview::default()
            };
        });
    }

    /// Open a receipt in the editor.
    ///
    /// Returns `false` if the receipt is not in the batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] unless reviewing or editing.
    pub fn start_editing(&self, id: &ReceiptId) -> Result<bool> {
        self.store.update(|s| {
            if !matches!(s.phase, ReviewPhase::Reviewing | ReviewPhase::Editing) {
                return Err(Error::invalid_phase("edit", s.phase));
            }
            if !s.receipts.iter().any(|r| &r.id == id) {
                return Ok(false);
            }
            s.editing = Some(id.clone());
            s.phase = ReviewPhase::Editing;
            Ok(true)
        })
    }

    /// Close the editor.
    pub fn stop_editing(&self) {
        self.store.update(|s| {
            s.editing = None;
            if s.phase == ReviewPhase::Editing {
                s.phase = ReviewPhase::Reviewing;
            }
        });
    }

    /// Summarize the receipts in review.
    #[must_use]
    pub fn summary(&self) -> ReviewSummary {
        self.store.read(|s| {
            let mut summary = ReviewSummary {
                total: s.receipts.len(),
                ..ReviewSummary::default()
            };
            for receipt in &s.receipts {
                match receipt.status {
                    ReceiptStatus::Ready => summary.ready += 1,
                    ReceiptStatus::Review => summary.review += 1,
                    ReceiptStatus::Error => summary.error += 1,
                    ReceiptStatus::Edited => summary.edited += 1,
                }
                if receipt.status.is_saveable() {
                    summary.saveable_amount =
                        summary.saveable_amount + receipt.transaction.total.unwrap_or_default();
                }
            }
            summary
        })
    }

    /// Clone the receipts that may be saved now.
    #[must_use]
    pub fn saveable(&self) -> Vec<BatchReceipt> {
        self.store.read(|s| {
            s.receipts
                .iter()
                .filter(|r| r.status.is_saveable())
                .cloned()
                .collect()
        })
    }

    /// Enter the saving phase and hand out the saveable receipts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhase`] unless reviewing or editing.
    pub fn begin_saving(&self) -> Result<Vec<BatchReceipt>> {
        self.store.update(|s| {
            if !matches!(s.phase, ReviewPhase::Reviewing | ReviewPhase::Editing) {
                return Err(Error::invalid_phase("save", s.phase));
            }
            s.phase = ReviewPhase::Saving;
            s.editing = None;
            Ok(s.receipts
                .iter()
                .filter(|r| r.status.is_saveable())
                .cloned()
                .collect())
        })
    }

    /// Remember a transaction saved from this batch.
    pub fn record_saved(&self, transaction_id: i64) {
        self.store.update(|s| s.saved.push(transaction_id));
    }

    /// Leave the saving phase.
    ///
    /// A batch completed while saving stays complete.
    pub fn end_saving(&self) {
        self.store.update(|s| {
            if s.phase == ReviewPhase::Saving {
                s.phase = ReviewPhase::Reviewing;
            }
        });
    }

    /// Drop the review and return to idle.
    pub fn reset(&self) {
        self.store.update(|s| *s = BatchReview::default());
    }
}

impl ReceiptCache for BatchReviewStore {
    fn cache_name(&self) -> &'static str {
        self.store.name()
    }

    fn contains_receipt(&self, id: &ReceiptId) -> bool {
        self.store.read(|s| s.receipts.iter().any(|r| &r.id == id))
    }

    fn receipt_count(&self) -> usize {
        self.store.read(|s| s.receipts.len())
    }

    fn remove_receipt(&self, id: &ReceiptId) -> bool {
        if !self.contains_receipt(id) {
            return false;
        }
        self.store.mutate(|s| {
            let before = s.receipts.len();
            s.receipts.retain(|r| &r.id != id);
            if s.editing.as_ref() == Some(id) {
                s.editing = None;
                if s.phase == ReviewPhase::Editing {
                    s.phase = ReviewPhase::Reviewing;
                }
            }
            s.receipts.len() != before
        })
    }

    fn update_receipt(&self, id: &ReceiptId, update: &Arc<ReceiptUpdate>) -> bool {
        let changes = self
            .store
            .read(|s| s.receipts.iter().any(|r| &r.id == id && r.changed_by(update)));
        if !changes {
            return false;
        }
        self.store.mutate(|s| {
            let changed = s
                .receipts
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
            s.phase = ReviewPhase::Complete;
            s.editing = None;
        });
    }

    fn publish(&self) {
        self.store.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ParsedTransaction;

    fn receipt(total: Option<i64>, confidence: f32) -> BatchReceipt {
        let tx = ParsedTransaction {
            merchant: "Store".to_string(),
            total: total.map(Money::from_minor),
            ..ParsedTransaction::empty("USD")
        };
        BatchReceipt::scanned("img", "hash", tx, confidence, 0.7)
    }

    fn loaded() -> (BatchReviewStore, Vec<BatchReceipt>) {
        let receipts = vec![
            receipt(Some(1000), 0.9),
            receipt(Some(250), 0.4),
            BatchReceipt::failed("bad", "h", "USD", "unreadable"),
        ];
        let store = BatchReviewStore::new();
        store.load(receipts.clone());
        (store, receipts)
    }

    #[test]
    fn test_load_sets_phase() {
        let (store, _) = loaded();
        assert_eq!(store.phase(), ReviewPhase::Reviewing);

        let empty = BatchReviewStore::new();
        empty.load(Vec::new());
        assert_eq!(empty.phase(), ReviewPhase::Complete);
    }

    #[test]
    fn test_summary_counts() {
        let (store, _) = loaded();
        let summary = store.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.review, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.saveable(), 1);
        assert_eq!(summary.saveable_amount, Money::from_minor(1000));
    }

    #[test]
    fn test_editing() {
        let (store, receipts) = loaded();
        assert!(store.start_editing(&receipts[1].id).unwrap());
        assert_eq!(store.phase(), ReviewPhase::Editing);
        assert_eq!(store.snapshot().editing, Some(receipts[1].id.clone()));

        assert!(!store.start_editing(&ReceiptId::from("nope")).unwrap());

        store.stop_editing();
        assert_eq!(store.phase(), ReviewPhase::Reviewing);
        assert!(store.snapshot().editing.is_none());
    }

    #[test]
    fn test_editing_rejected_when_idle() {
        let store = BatchReviewStore::new();
        assert!(store.start_editing(&ReceiptId::from("x")).is_err());
    }

    #[test]
    fn test_removing_edited_receipt_closes_editor() {
        let (store, receipts) = loaded();
        store.start_editing(&receipts[0].id).unwrap();
        assert!(store.remove_receipt(&receipts[0].id));
        let state = store.snapshot();
        assert!(state.editing.is_none());
        assert_eq!(state.phase, ReviewPhase::Reviewing);
        assert_eq!(state.receipts.len(), 2);
    }

    #[test]
    fn test_saving_phase() {
        let (store, _) = loaded();
        let saveable = store.begin_saving().unwrap();
        assert_eq!(saveable.len(), 1);
        assert_eq!(store.phase(), ReviewPhase::Saving);
        assert!(store.begin_saving().is_err());

        store.record_saved(42);
        store.end_saving();
        assert_eq!(store.phase(), ReviewPhase::Reviewing);
        assert_eq!(store.snapshot().saved, vec![42]);
    }

    #[test]
    fn test_end_saving_keeps_complete() {
        let (store, _) = loaded();
        store.begin_saving().unwrap();
        store.finish_batch();
        store.end_saving();
        assert_eq!(store.phase(), ReviewPhase::Complete);
    }

    #[test]
    fn test_update_receipt_marks_edited() {
        let (store, receipts) = loaded();
        let update = Arc::new(ReceiptUpdate {
            total: Some(Money::from_minor(300)),
            ..ReceiptUpdate::default()
        });
        assert!(store.update_receipt(&receipts[1].id, &update));
        let updated = store.receipt(&receipts[1].id).unwrap();
        assert_eq!(updated.status, ReceiptStatus::Edited);
        assert_eq!(store.summary().saveable(), 2);
    }

    #[test]
    fn test_update_receipt_without_change_leaves_state() {
        let (store, receipts) = loaded();
        let same_total = Arc::new(ReceiptUpdate {
            total: Some(Money::from_minor(1000)),
            status: Some(ReceiptStatus::Ready),
            ..ReceiptUpdate::default()
        });
        let version = store.store().version();

        assert!(!store.update_receipt(&receipts[0].id, &same_total));
        assert_eq!(store.store().version(), version);
        assert!(store.snapshot().last_update.is_none());
    }

    #[test]
    fn test_reset() {
        let (store, _) = loaded();
        store.reset();
        assert_eq!(store.phase(), ReviewPhase::Idle);
        assert_eq!(store.receipt_count(), 0);
    }
}
