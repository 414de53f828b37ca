//! In-memory [`ContextCache`] backed by [`DashMap`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use opwire_core::{CallInformation, ClockSource, SystemClock, TransactionId};
use tracing::debug;

use super::ContextCache;
use crate::config::DEFAULT_CONTEXT_TTL;

#[derive(Debug, Clone)]
struct CachedCall {
    call: CallInformation,
    expires_at_ms: u64,
}

/// Sharded map of call contexts with per-entry expiry.
///
/// An expired entry is evicted when it is read. Entries that are never read
/// (an inbound-only process writes one per call) are swept by `put`, at most
/// once per TTL, so the map holds roughly two TTL windows of writes at most.
pub struct InMemoryContextCache {
    entries: DashMap<TransactionId, CachedCall>,
    ttl: Duration,
    clock: Arc<dyn ClockSource>,
    next_sweep_ms: AtomicU64,
}

impl InMemoryContextCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn ClockSource>) -> Self {
        let mut cache = Self {
            entries: DashMap::new(),
            ttl,
            clock,
            next_sweep_ms: AtomicU64::new(0),
        };
        let first_sweep = cache.clock.now().saturating_add(cache.ttl_millis());
        *cache.next_sweep_ms.get_mut() = first_sweep;
        cache
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry that has expired by `now`. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at_ms);
        before.saturating_sub(self.entries.len())
    }

    fn ttl_millis(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    /// Sweeps once the clock passes the scheduled time; one caller wins the slot.
    fn maybe_sweep(&self, now: u64) {
        let due = self.next_sweep_ms.load(Ordering::Acquire);
        if now < due {
            return;
        }
        let next = now.saturating_add(self.ttl_millis());
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let removed = self.purge_expired();
            if removed > 0 {
                debug!(source = "ContextCache", removed, "swept expired call contexts");
            }
        }
    }
}

impl Default for InMemoryContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_TTL)
    }
}

#[async_trait]
impl ContextCache for InMemoryContextCache {
    async fn put(&self, transaction_id: TransactionId, call: &CallInformation) -> anyhow::Result<bool> {
        let now = self.clock.now();
        self.maybe_sweep(now);
        let expires_at_ms = now.saturating_add(self.ttl_millis());
        self.entries.insert(
            transaction_id,
            CachedCall {
                call: call.clone(),
                expires_at_ms,
            },
        );
        Ok(true)
    }

    async fn get(&self, transaction_id: TransactionId) -> anyhow::Result<Option<CallInformation>> {
        let now = self.clock.now();
        // The read guard must be released before `remove_if` takes the shard lock.
        let live = match self.entries.get(&transaction_id) {
            None => return Ok(None),
            Some(entry) if now < entry.expires_at_ms => Some(entry.call.clone()),
            Some(_) => None,
        };
        if live.is_none() {
            // A concurrent put may have refreshed the entry in between.
            self.entries
                .remove_if(&transaction_id, |_, entry| now >= entry.expires_at_ms);
        }
        Ok(live)
    }
}
