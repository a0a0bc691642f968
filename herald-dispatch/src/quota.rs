//! Per-identity usage tracking over a trailing 24-hour window
//!
//! Each successful send appends a timestamp to the identity's usage
//! sequence; entries older than the window are pruned lazily on read and
//! write, and the limit check always counts *after* pruning. Usage is
//! persisted before `record_use` returns so an identity cannot be oversold
//! across a crash.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use herald_store::{StateStore, UsageLog};
use tokio::sync::Mutex;

/// The trailing window a daily limit applies to.
pub const USAGE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Tracks send timestamps per identity and answers "is this identity under
/// its limit right now".
///
/// All access goes through one async lock, so a limit check and the
/// recording that follows it cannot interleave with another recording for
/// the same identity.
#[derive(Debug)]
pub struct QuotaTracker {
    daily_limit: usize,
    usage: Mutex<UsageLog>,
    store: Arc<dyn StateStore>,
}

impl QuotaTracker {
    /// Load persisted usage from the store.
    ///
    /// # Errors
    /// Returns an error if the persisted usage log cannot be read.
    pub async fn restore(
        store: Arc<dyn StateStore>,
        daily_limit: usize,
    ) -> herald_store::Result<Self> {
        let usage = store.load_usage().await?;
        Ok(Self {
            daily_limit,
            usage: Mutex::new(usage),
            store,
        })
    }

    /// The configured per-identity limit.
    #[must_use]
    pub const fn daily_limit(&self) -> usize {
        self.daily_limit
    }

    /// Record one send for `identity` at `now` and persist the log.
    ///
    /// # Errors
    /// Returns an error if the durable write fails. In-memory usage has
    /// already advanced at that point, so in-process enforcement still
    /// holds; the caller decides whether to surface the durability gap.
    pub async fn record_use(
        &self,
        identity: &str,
        now: SystemTime,
    ) -> herald_store::Result<()> {
        let mut usage = self.usage.lock().await;
        let entries = usage.entry(identity.to_string()).or_default();
        entries.push(now);
        prune(entries, now);

        self.store.save_usage(&usage).await
    }

    /// Sends within the window for `identity`, pruning expired entries.
    /// An identity with no record has used nothing.
    pub async fn usage_count(&self, identity: &str, now: SystemTime) -> usize {
        let mut usage = self.usage.lock().await;
        usage.get_mut(identity).map_or(0, |entries| {
            prune(entries, now);
            entries.len()
        })
    }

    /// Whether `identity` may send right now.
    pub async fn under_limit(&self, identity: &str, now: SystemTime) -> bool {
        self.usage_count(identity, now).await < self.daily_limit
    }

    /// Per-identity usage counts, sorted by address for stable output.
    pub async fn usage_summary(&self, now: SystemTime) -> Vec<(String, usize)> {
        let mut usage = self.usage.lock().await;
        let mut summary: Vec<(String, usize)> = usage
            .iter_mut()
            .map(|(identity, entries)| {
                prune(entries, now);
                (identity.clone(), entries.len())
            })
            .collect();
        summary.sort();
        summary
    }
}

/// Drop entries older than the window. Entries from the future (clock
/// adjustments) are kept; they age into the window rather than vanishing.
fn prune(entries: &mut Vec<SystemTime>, now: SystemTime) {
    entries.retain(|stamp| {
        now.duration_since(*stamp)
            .map_or(true, |age| age < USAGE_WINDOW)
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use herald_store::MemoryStateStore;
    use pretty_assertions::assert_eq;

    use super::*;

    async fn tracker(limit: usize) -> QuotaTracker {
        QuotaTracker::restore(Arc::new(MemoryStateStore::new()), limit)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_absent_identity_has_zero_usage() {
        let tracker = tracker(3).await;
        let now = SystemTime::now();
        assert_eq!(tracker.usage_count("nobody@example.com", now).await, 0);
        assert!(tracker.under_limit("nobody@example.com", now).await);
    }

    #[tokio::test]
    async fn test_limit_enforced_after_pruning() {
        let tracker = tracker(3).await;
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);

        // Three sends inside ten minutes exhaust a limit of three.
        for i in 0..3 {
            tracker
                .record_use("a@example.com", start + Duration::from_secs(i * 200))
                .await
                .unwrap();
        }
        let after = start + Duration::from_secs(600);
        assert_eq!(tracker.usage_count("a@example.com", after).await, 3);
        assert!(!tracker.under_limit("a@example.com", after).await);

        // Once the window rolls past the first send, capacity returns.
        let rolled = start + USAGE_WINDOW + Duration::from_secs(1);
        assert!(tracker.under_limit("a@example.com", rolled).await);
        assert_eq!(tracker.usage_count("a@example.com", rolled).await, 0);
    }

    #[tokio::test]
    async fn test_window_is_trailing_not_calendar() {
        let tracker = tracker(2).await;
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);

        tracker.record_use("a@example.com", start).await.unwrap();
        tracker
            .record_use("a@example.com", start + Duration::from_secs(3600))
            .await
            .unwrap();

        // 24h after the first send only the second remains.
        let later = start + USAGE_WINDOW + Duration::from_secs(1);
        assert_eq!(tracker.usage_count("a@example.com", later).await, 1);
        assert!(tracker.under_limit("a@example.com", later).await);
    }

    #[tokio::test]
    async fn test_usage_persisted_before_return() {
        let store = Arc::new(MemoryStateStore::new());
        let tracker = QuotaTracker::restore(Arc::clone(&store) as Arc<dyn StateStore>, 5)
            .await
            .unwrap();
        let now = SystemTime::now();

        tracker.record_use("a@example.com", now).await.unwrap();

        let persisted = store.load_usage().await.unwrap();
        assert_eq!(persisted.get("a@example.com").map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_restore_resumes_counts() {
        let store = Arc::new(MemoryStateStore::new());
        let now = SystemTime::now();
        {
            let tracker = QuotaTracker::restore(Arc::clone(&store) as Arc<dyn StateStore>, 2)
                .await
                .unwrap();
            tracker.record_use("a@example.com", now).await.unwrap();
            tracker.record_use("a@example.com", now).await.unwrap();
        }

        let tracker = QuotaTracker::restore(Arc::clone(&store) as Arc<dyn StateStore>, 2)
            .await
            .unwrap();
        assert!(!tracker.under_limit("a@example.com", now).await);
    }

    #[tokio::test]
    async fn test_usage_summary_sorted() {
        let tracker = tracker(10).await;
        let now = SystemTime::now();
        tracker.record_use("b@example.com", now).await.unwrap();
        tracker.record_use("a@example.com", now).await.unwrap();
        tracker.record_use("b@example.com", now).await.unwrap();

        let summary = tracker.usage_summary(now).await;
        assert_eq!(
            summary,
            vec![
                ("a@example.com".to_string(), 1),
                ("b@example.com".to_string(), 2)
            ]
        );
    }
}
