//! Cross-store discard and update for batch receipts.
//!
//! The scan-session store and the batch-review store each hold a copy of the
//! batch. [`BatchSync`] is the only path that discards or edits a receipt, so
//! both copies change together:
//!
//! - caches are mutated in a fixed order: session first, then review;
//! - listeners are notified only after every cache has been mutated;
//! - both caches receive the same `Arc<ReceiptUpdate>` allocation;
//! - unknown ids are a no-op in every cache and notify nobody;
//! - removing the last receipt finishes the batch in both caches, once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::{ReceiptId, ReceiptStatus, ReceiptUpdate};
use crate::error::{Error, Result};
use crate::review::BatchReviewStore;
use crate::storage::Storage;

/// A cache of batch receipts that [`BatchSync`] keeps consistent.
///
/// `remove_receipt`, `update_receipt` and `finish_batch` must not notify
/// observers; [`BatchSync`] calls `publish` once every cache is mutated.
pub trait ReceiptCache: Send + Sync {
    /// Name used in logs.
    fn cache_name(&self) -> &'static str;

    /// Whether a receipt with this id is present.
    fn contains_receipt(&self, id: &ReceiptId) -> bool;

    /// Number of receipts held.
    fn receipt_count(&self) -> usize;

    /// Remove a receipt. Returns `false` if it was absent.
    fn remove_receipt(&self, id: &ReceiptId) -> bool;

    /// Apply a shared partial update. Returns `false` if nothing changed.
    fn update_receipt(&self, id: &ReceiptId, update: &Arc<ReceiptUpdate>) -> bool;

    /// Mark the batch as finished.
    fn finish_batch(&self);

    /// Notify observers of the current state.
    fn publish(&self);
}

/// Something that happened to the batch, delivered after all caches agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A receipt left the batch.
    Discarded(ReceiptId),
    /// A receipt was edited.
    Updated(ReceiptId),
    /// The last receipt left the batch.
    Completed,
}

/// Result of [`BatchSync::discard_receipt`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardOutcome {
    /// The session cache held the receipt.
    pub from_session: bool,
    /// The review cache held the receipt.
    pub from_review: bool,
    /// This discard emptied the batch.
    pub completed: bool,
}

impl DiscardOutcome {
    /// Whether any cache changed.
    #[must_use]
    pub fn removed(&self) -> bool {
        self.from_session || self.from_review
    }
}

/// Result of [`BatchSync::save_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    /// Receipts written to storage, with their transaction ids.
    pub saved: Vec<(ReceiptId, i64)>,
    /// Receipts whose image was already stored.
    pub duplicates: Vec<ReceiptId>,
    /// Receipts that failed validation and went back to review.
    pub rejected: Vec<(ReceiptId, String)>,
    /// Saving emptied the batch.
    pub completed: bool,
}

type EventListener = Arc<dyn Fn(&BatchEvent) + Send + Sync>;

/// Keeps the session and review caches in step.
///
/// Operations are serialized: one discard, update or save runs at a time,
/// from the first cache mutation through the last event. Store listeners and
/// event listeners run inside that window and must not call back into the
/// same `BatchSync`.
pub struct BatchSync {
    session: Arc<dyn ReceiptCache>,
    review: Arc<dyn ReceiptCache>,
    listeners: Mutex<Vec<EventListener>>,
    gate: Mutex<()>,
}

impl fmt::Debug for BatchSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSync")
            .field("session", &self.session.cache_name())
            .field("review", &self.review.cache_name())
            .finish_non_exhaustive()
    }
}

impl BatchSync {
    /// Coordinate the given session and review caches.
    #[must_use]
    pub fn new(session: Arc<dyn ReceiptCache>, review: Arc<dyn ReceiptCache>) -> Self {
        Self {
            session,
            review,
            listeners: Mutex::new(Vec::new()),
            gate: Mutex::new(()),
        }
    }

    /// Caches in mutation order.
    fn caches(&self) -> [&dyn ReceiptCache; 2] {
        [self.session.as_ref(), self.review.as_ref()]
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for batch events.
    pub fn on_event(&self, listener: impl Fn(&BatchEvent) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    fn emit(&self, event: &BatchEvent) {
        let listeners: Vec<EventListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(event);
        }
    }

    fn publish_all(&self) {
        for cache in self.caches() {
            cache.publish();
        }
    }

    /// Remove a receipt from both caches.
    ///
    /// Discarding an id that no cache holds does nothing. When the discard
    /// empties the batch, both caches are finished before anyone is notified
    /// and a [`BatchEvent::Completed`] follows the discard event.
    pub fn discard_receipt(&self, id: &ReceiptId) -> DiscardOutcome {
        let _gate = self.lock_gate();
        self.discard_locked(id)
    }

    fn discard_locked(&self, id: &ReceiptId) -> DiscardOutcome {
        let mut outcome = DiscardOutcome {
            from_session: self.session.remove_receipt(id),
            from_review: self.review.remove_receipt(id),
            completed: false,
        };

        if !outcome.removed() {
            debug!(receipt = %id, "Discard ignored; receipt not in batch");
            return outcome;
        }

        outcome.completed = self.caches().iter().all(|c| c.receipt_count() == 0);
        if outcome.completed {
            for cache in self.caches() {
                cache.finish_batch();
            }
        }

        self.publish_all();
        debug!(receipt = %id, "Discarded receipt");
        self.emit(&BatchEvent::Discarded(id.clone()));
        if outcome.completed {
            info!("Batch complete; no receipts left");
            self.emit(&BatchEvent::Completed);
        }
        outcome
    }

    /// Apply a partial update to a receipt in both caches.
    ///
    /// Returns `true` if any cache changed.
    pub fn update_receipt(&self, id: &ReceiptId, update: ReceiptUpdate) -> bool {
        let _gate = self.lock_gate();
        self.update_locked(id, update)
    }

    fn update_locked(&self, id: &ReceiptId, update: ReceiptUpdate) -> bool {
        let shared = Arc::new(update);
        let changed_session = self.session.update_receipt(id, &shared);
        let changed_review = self.review.update_receipt(id, &shared);

        if !(changed_session || changed_review) {
            debug!(receipt = %id, "Update ignored; nothing changed");
            return false;
        }

        self.publish_all();
        debug!(receipt = %id, "Updated receipt");
        self.emit(&BatchEvent::Updated(id.clone()));
        true
    }

    /// Save every saveable receipt, then discard it from the batch.
    ///
    /// `review` must be the review cache this `BatchSync` was built with.
    /// Receipts whose image hash is already stored are discarded as
    /// duplicates. Receipts that fail validation are sent back to
    /// [`ReceiptStatus::Review`] and stay in the batch. A missing date falls
    /// back to `fallback_date`.
    ///
    /// # Errors
    ///
    /// Returns an error if `review` is a different store, if it is not in a
    /// saveable phase, or if a storage write fails. Receipts saved before the
    /// failure stay saved.
    pub fn save_batch(
        &self,
        review: &BatchReviewStore,
        storage: &Storage,
        fallback_date: NaiveDate,
    ) -> Result<SaveReport> {
        let registered = Arc::as_ptr(&self.review).cast::<()>();
        if registered != (review as *const BatchReviewStore).cast::<()>() {
            return Err(Error::internal(
                "save_batch called with a review store this batch does not sync",
            ));
        }

        let _gate = self.lock_gate();
        let receipts = review.begin_saving()?;
        let mut report = SaveReport::default();

        let result = (|| -> Result<()> {
            for receipt in receipts {
                let mut tx = match receipt.transaction.to_transaction(fallback_date) {
                    Ok(tx) => tx,
                    Err(err) => {
                        warn!(receipt = %receipt.id, error = %err, "Receipt not saveable");
                        self.update_locked(&receipt.id, ReceiptUpdate::status(ReceiptStatus::Review));
                        report.rejected.push((receipt.id, err.to_string()));
                        continue;
                    }
                };
                tx.receipt_hash = Some(receipt.image_hash.clone());

                match storage.insert(&tx)? {
                    Some(tx_id) => {
                        review.record_saved(tx_id);
                        report.saved.push((receipt.id.clone(), tx_id));
                    }
                    None => report.duplicates.push(receipt.id.clone()),
                }
                if self.discard_locked(&receipt.id).completed {
                    report.completed = true;
                }
            }
            Ok(())
        })();

        review.end_saving();
        result?;

        info!(
            saved = report.saved.len(),
            duplicates = report.duplicates.len(),
            rejected = report.rejected.len(),
            "Saved batch"
        );
        Ok(report)
    }
}
