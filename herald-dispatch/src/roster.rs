//! Recipient queues with durable membership
//!
//! Two ordered sequences, pending and completed, behind one async lock.
//! Every membership mutation snapshots both sequences to the store while
//! the lock is held, so concurrent callers serialize and the durable image
//! never interleaves. A crash loses at most the single in-flight recipient
//! that had been popped but not yet completed or requeued; that gap is the
//! documented at-least-once trade-off.

use std::{collections::VecDeque, sync::Arc};

use herald_common::Recipient;
use herald_store::{RecipientSnapshot, StateStore};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Default)]
struct RosterInner {
    pending: VecDeque<Recipient>,
    completed: Vec<Recipient>,
}

impl RosterInner {
    fn snapshot(&self) -> RecipientSnapshot {
        RecipientSnapshot {
            pending: self.pending.iter().cloned().collect(),
            completed: self.completed.clone(),
        }
    }
}

/// The pending and completed recipient queues.
///
/// Recipients are never mutated, only moved: import appends to pending, a
/// successful send moves to completed, a failed send re-appends to the
/// pending tail, and a send skipped for lack of an identity goes back to
/// the pending head. Nothing is ever silently dropped.
#[derive(Debug)]
pub struct RecipientRoster {
    inner: Mutex<RosterInner>,
    store: Arc<dyn StateStore>,
}

impl RecipientRoster {
    /// Load the persisted queues from the store.
    ///
    /// # Errors
    /// Returns an error if the persisted snapshot cannot be read.
    pub async fn restore(store: Arc<dyn StateStore>) -> herald_store::Result<Self> {
        let snapshot = store.load_recipients().await?;
        Ok(Self {
            inner: Mutex::new(RosterInner {
                pending: snapshot.pending.into(),
                completed: snapshot.completed,
            }),
            store,
        })
    }

    /// Persist the queues; a failure is logged and absorbed so in-memory
    /// state keeps advancing.
    async fn persist(&self, inner: &RosterInner) {
        if let Err(e) = self.store.save_recipients(&inner.snapshot()).await {
            warn!(error = %e, "Failed to persist recipient snapshot; queues advance in memory");
        }
    }

    /// Atomically remove and return the head of pending.
    pub async fn pop_pending(&self) -> Option<Recipient> {
        let mut inner = self.inner.lock().await;
        let recipient = inner.pending.pop_front()?;
        self.persist(&inner).await;
        Some(recipient)
    }

    /// Return a recipient to the head of pending. Used when the system,
    /// not the recipient, was the reason a send could not happen.
    pub async fn push_pending_front(&self, recipient: Recipient) {
        let mut inner = self.inner.lock().await;
        inner.pending.push_front(recipient);
        self.persist(&inner).await;
    }

    /// Append a recipient to the tail of pending, behind everything
    /// currently queued. Used after a per-recipient failure.
    pub async fn push_pending_back(&self, recipient: Recipient) {
        let mut inner = self.inner.lock().await;
        inner.pending.push_back(recipient);
        self.persist(&inner).await;
    }

    /// Record a successful delivery.
    pub async fn mark_completed(&self, recipient: Recipient) {
        let mut inner = self.inner.lock().await;
        inner.completed.push(recipient);
        self.persist(&inner).await;
    }

    /// Append imported recipients to pending, skipping any without an
    /// email. Duplicates across uploads are deliberately kept.
    pub async fn import<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = Recipient>,
    {
        let mut inner = self.inner.lock().await;
        let before = inner.pending.len();
        inner
            .pending
            .extend(records.into_iter().filter(Recipient::has_email));
        let imported = inner.pending.len() - before;

        if imported > 0 {
            self.persist(&inner).await;
        }
        imported
    }

    /// Remove every pending recipient with the given address. Returns the
    /// number removed.
    pub async fn remove_pending(&self, email: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.pending.len();
        inner.pending.retain(|recipient| recipient.email != email);
        let removed = before - inner.pending.len();

        if removed > 0 {
            self.persist(&inner).await;
        }
        removed
    }

    /// Drop the entire pending queue. Returns the number removed.
    pub async fn clear_pending(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let removed = inner.pending.len();
        inner.pending.clear();

        if removed > 0 {
            self.persist(&inner).await;
        }
        removed
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn completed_len(&self) -> usize {
        self.inner.lock().await.completed.len()
    }

    /// One page of the pending queue, in queue order.
    pub async fn pending_page(&self, offset: usize, limit: usize) -> Vec<Recipient> {
        let inner = self.inner.lock().await;
        inner
            .pending
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// One page of the completed list, in completion order.
    pub async fn completed_page(&self, offset: usize, limit: usize) -> Vec<Recipient> {
        let inner = self.inner.lock().await;
        inner
            .completed
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}
