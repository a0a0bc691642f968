//! Sender identity pool and round-robin rotation
//!
//! The pool owns the ordered identity registry and a rotation cursor.
//! Rotation order is registry insertion order, deliberately round-robin
//! fairness, not least-loaded selection. Registry mutations persist
//! immediately and are visible to the next `next_available` call, but never
//! affect an identity already handed out for an in-flight send.

use std::{sync::Arc, time::SystemTime};

use herald_common::{SenderIdentity, tracing::debug};
use herald_store::StateStore;
use tokio::sync::Mutex;

use crate::quota::QuotaTracker;

#[derive(Debug, Default)]
struct PoolInner {
    identities: Vec<SenderIdentity>,
    cursor: usize,
}

/// Ordered set of sender identities with an enable flag and a rotation
/// cursor; consults the quota tracker for availability.
#[derive(Debug)]
pub struct IdentityPool {
    inner: Mutex<PoolInner>,
    quota: Arc<QuotaTracker>,
    store: Arc<dyn StateStore>,
}

impl IdentityPool {
    /// Load the persisted registry from the store.
    ///
    /// # Errors
    /// Returns an error if the persisted registry cannot be read.
    pub async fn restore(
        store: Arc<dyn StateStore>,
        quota: Arc<QuotaTracker>,
    ) -> herald_store::Result<Self> {
        let identities = store.load_identities().await?;
        Ok(Self {
            inner: Mutex::new(PoolInner {
                identities,
                cursor: 0,
            }),
            quota,
            store,
        })
    }

    /// The next enabled identity under its limit, advancing the rotation
    /// cursor past everything examined.
    ///
    /// Scans at most one full wrap starting at the cursor. When every
    /// enabled identity is at its limit the scan returns `None`, but the
    /// cursor still comes to rest one slot past where the scan began, so
    /// consecutive exhausted scans start from different offsets.
    pub async fn next_available(&self, now: SystemTime) -> Option<SenderIdentity> {
        let mut inner = self.inner.lock().await;
        let len = inner.identities.len();
        if len == 0 {
            return None;
        }

        let start = inner.cursor % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            if !inner.identities[idx].enabled {
                continue;
            }

            let address = inner.identities[idx].address.clone();
            if self.quota.under_limit(&address, now).await {
                inner.cursor = (idx + 1) % len;
                return Some(inner.identities[idx].clone());
            }

            debug!(identity = %address, "Identity at daily limit, rotating past");
        }

        inner.cursor = (start + 1) % len;
        None
    }

    /// Insert a new identity at the tail of the rotation, or replace an
    /// existing one in place (its rotation slot is kept).
    ///
    /// # Errors
    /// Returns an error if the registry snapshot cannot be persisted.
    pub async fn upsert(&self, identity: SenderIdentity) -> herald_store::Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner
            .identities
            .iter_mut()
            .find(|existing| existing.address == identity.address)
        {
            *existing = identity;
        } else {
            inner.identities.push(identity);
        }

        self.store.save_identities(&inner.identities).await
    }

    /// Enable or disable an identity. Returns `false` when the address is
    /// not registered.
    ///
    /// # Errors
    /// Returns an error if the registry snapshot cannot be persisted.
    pub async fn set_enabled(
        &self,
        address: &str,
        enabled: bool,
    ) -> herald_store::Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(identity) = inner
            .identities
            .iter_mut()
            .find(|identity| identity.address == address)
        else {
            return Ok(false);
        };

        identity.enabled = enabled;
        self.store.save_identities(&inner.identities).await?;
        Ok(true)
    }

    /// Remove an identity from future rotation. An in-flight send holding a
    /// clone is unaffected. Returns `false` when the address is not
    /// registered.
    ///
    /// # Errors
    /// Returns an error if the registry snapshot cannot be persisted.
    pub async fn remove(&self, address: &str) -> herald_store::Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.identities.len();
        inner.identities.retain(|identity| identity.address != address);
        if inner.identities.len() == before {
            return Ok(false);
        }

        self.store.save_identities(&inner.identities).await?;
        Ok(true)
    }

    /// The registry in rotation order.
    pub async fn list(&self) -> Vec<SenderIdentity> {
        self.inner.lock().await.identities.clone()
    }

    /// Whether at least one identity is enabled (job submission gate).
    pub async fn has_enabled(&self) -> bool {
        self.inner
            .lock()
            .await
            .identities
            .iter()
            .any(|identity| identity.enabled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use herald_store::MemoryStateStore;
    use pretty_assertions::assert_eq;

    use super::*;

    async fn pool_with(addresses: &[&str], limit: usize) -> IdentityPool {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let quota = Arc::new(
            QuotaTracker::restore(Arc::clone(&store), limit)
                .await
                .unwrap(),
        );
        let pool = IdentityPool::restore(store, quota).await.unwrap();
        for address in addresses {
            pool.upsert(SenderIdentity::new(*address, "secret"))
                .await
                .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn test_rotation_is_round_robin() {
        let pool = pool_with(&["a@x.com", "b@x.com", "c@x.com"], 10).await;
        let now = SystemTime::now();

        let picks: Vec<String> = [
            pool.next_available(now).await.unwrap().address,
            pool.next_available(now).await.unwrap().address,
            pool.next_available(now).await.unwrap().address,
            pool.next_available(now).await.unwrap().address,
        ]
        .into();

        assert_eq!(picks, vec!["a@x.com", "b@x.com", "c@x.com", "a@x.com"]);
    }

    #[tokio::test]
    async fn test_disabled_identities_are_skipped() {
        let pool = pool_with(&["a@x.com", "b@x.com"], 10).await;
        pool.set_enabled("a@x.com", false).await.unwrap();
        let now = SystemTime::now();

        assert_eq!(pool.next_available(now).await.unwrap().address, "b@x.com");
        assert_eq!(pool.next_available(now).await.unwrap().address, "b@x.com");
    }

    #[tokio::test]
    async fn test_exhausted_pool_returns_none_and_advances_cursor() {
        let pool = pool_with(&["a@x.com", "b@x.com"], 1).await;
        let now = SystemTime::now();

        // Use up both identities.
        for _ in 0..2 {
            let identity = pool.next_available(now).await.unwrap();
            pool.quota.record_use(&identity.address, now).await.unwrap();
        }
        assert!(pool.next_available(now).await.is_none());

        // Cursor moved even though the scan failed.
        let cursor_after_first = pool.inner.lock().await.cursor;
        assert!(pool.next_available(now).await.is_none());
        let cursor_after_second = pool.inner.lock().await.cursor;
        assert_ne!(cursor_after_first, cursor_after_second);
    }

    #[tokio::test]
    async fn test_empty_pool_returns_none() {
        let pool = pool_with(&[], 10).await;
        assert!(pool.next_available(SystemTime::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_preserves_rotation_slot() {
        let pool = pool_with(&["a@x.com", "b@x.com"], 10).await;

        let replacement = SenderIdentity::new("a@x.com", "rotated-secret");
        pool.upsert(replacement).await.unwrap();

        let listed = pool.list().await;
        assert_eq!(listed[0].address, "a@x.com");
        assert_eq!(listed[0].credential.expose(), "rotated-secret");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_is_immediate() {
        let pool = pool_with(&["a@x.com", "b@x.com"], 10).await;
        assert!(pool.remove("a@x.com").await.unwrap());
        assert!(!pool.remove("a@x.com").await.unwrap());

        let now = SystemTime::now();
        assert_eq!(pool.next_available(now).await.unwrap().address, "b@x.com");
    }

    #[tokio::test]
    async fn test_registry_persists_across_restore() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let quota = Arc::new(
            QuotaTracker::restore(Arc::clone(&store), 10).await.unwrap(),
        );
        {
            let pool = IdentityPool::restore(Arc::clone(&store), Arc::clone(&quota))
                .await
                .unwrap();
            pool.upsert(SenderIdentity::new("a@x.com", "s")).await.unwrap();
        }

        let pool = IdentityPool::restore(store, quota).await.unwrap();
        assert_eq!(pool.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_has_enabled_reflects_flags() {
        let pool = pool_with(&["a@x.com"], 10).await;
        assert!(pool.has_enabled().await);
        pool.set_enabled("a@x.com", false).await.unwrap();
        assert!(!pool.has_enabled().await);
    }
}
