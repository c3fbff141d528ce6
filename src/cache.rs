//! Account View Cache
//!
//! Cached account views (balance, transaction ledger, receipts) that depend on
//! settled deposits. Approval of a payment invalidates them through the
//! [`Reconciler`] seam.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Account views whose contents change when a deposit settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Balance,
    Transactions,
    Receipts,
}

/// Views invalidated when a payment is approved.
pub const APPROVAL_INVALIDATIONS: [CacheKey; 3] =
    [CacheKey::Balance, CacheKey::Transactions, CacheKey::Receipts];

/// Refreshes cached account state after a payment settles.
///
/// Implementations must tolerate being invoked for the same keys from
/// several intents.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn invalidate(&self, payment_id: &str, keys: &[CacheKey]);
}

/// In-memory account view cache.
#[derive(Debug, Default)]
pub struct AccountCache {
    views: RwLock<HashMap<CacheKey, Value>>,
    invalidations: AtomicU64,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a freshly fetched view.
    pub async fn store(&self, key: CacheKey, view: Value) {
        let mut views = self.views.write().await;
        views.insert(key, view);
    }

    /// Returns the cached view, or `None` if missing or invalidated.
    pub async fn get(&self, key: CacheKey) -> Option<Value> {
        let views = self.views.read().await;
        views.get(&key).cloned()
    }

    /// Number of reconciliation calls received so far.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reconciler for AccountCache {
    async fn invalidate(&self, payment_id: &str, keys: &[CacheKey]) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        let mut views = self.views.write().await;
        for key in keys {
            views.remove(key);
        }
        debug!("Invalidated {:?} after payment {}", keys, payment_id);
    }
}
