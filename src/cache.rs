use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::{config::CacheConfig, resolver::BatchView};

#[derive(Clone)]
struct CachedLookup {
    /// `None` remembers that the token resolved to nothing.
    view: Option<BatchView>,
    cached_until: DateTime<Utc>,
}

/// Short-lived link lookups keyed by token. Only answers metadata queries;
/// the gated download always reads the store.
///
/// Every invalidation bumps `generation`. A lookup notes the generation
/// before reading the store and its result is dropped if it changed, so a
/// read that started before a download cannot cache the stale view.
#[derive(Clone)]
pub struct LinkCache {
    entries: Arc<RwLock<HashMap<String, CachedLookup>>>,
    generation: Arc<AtomicU64>,
    cfg: CacheConfig,
}

impl LinkCache {
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            cfg,
        }
    }

    /// Outer `None` is a miss, inner `None` a cached "not found".
    pub async fn get(&self, token: &str, now: DateTime<Utc>) -> Option<Option<BatchView>> {
        if !self.cfg.enabled {
            return None;
        }

        let entries = self.entries.read().await;
        let entry = entries.get(token)?;
        (now < entry.cached_until).then(|| entry.view.clone())
    }

    /// Take this before reading the store and hand it to [`LinkCache::put`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn put(
        &self,
        token: &str,
        view: Option<BatchView>,
        now: DateTime<Utc>,
        seen_generation: u64,
    ) {
        if !self.cfg.enabled {
            return;
        }

        let ttl = self.ttl_for(view.as_ref(), now);
        let mut entries = self.entries.write().await;
        if self.generation() != seen_generation {
            tracing::trace!(token, "store changed during lookup, not caching");
            return;
        }
        entries.retain(|_, entry| now < entry.cached_until);
        entries.insert(
            token.to_string(),
            CachedLookup {
                view,
                cached_until: now + ttl,
            },
        );
    }

    pub async fn invalidate(&self, token: &str) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if entries.remove(token).is_some() {
            tracing::trace!(token, "cache entry invalidated");
        }
    }

    /// One-time links and links close to expiry flip state at any moment, so
    /// they are cached for the short TTL only.
    pub fn ttl_for(&self, view: Option<&BatchView>, now: DateTime<Utc>) -> Duration {
        let normal = Duration::seconds(self.cfg.ttl_secs);
        let volatile = Duration::seconds(self.cfg.volatile_ttl_secs);

        let Some(view) = view else {
            return normal;
        };

        let imminent = view
            .expires_at
            .is_some_and(|at| at - now < Duration::minutes(self.cfg.imminent_expiry_mins));

        if view.one_time_view || imminent {
            volatile.min(normal)
        } else {
            normal
        }
    }
}
