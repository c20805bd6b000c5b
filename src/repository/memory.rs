use std::{collections::HashMap, sync::Arc};

use axum::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{LockedBatch, RecordStore};
use crate::{
    errors::{AppError, AppResult},
    models::{NewBatch, ShareRecord, StoreStats},
};

#[derive(Default)]
struct State {
    /// Records per token, in upload order.
    batches: HashMap<String, Vec<ShareRecord>>,
}

/// Record store kept in process memory. Per-token mutexes stand in for
/// row locks, so the gated download behaves as it does on Postgres.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    state: Arc<RwLock<State>>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn token_lock(&self, token: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forgets the token's mutex unless someone else still holds or waits
    /// on it. Clones are only handed out under `locks`, so the count is
    /// stable while we look at it.
    async fn release_lock(&self, token: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(token)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(token);
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_batch(&self, batch: &NewBatch) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.batches.contains_key(&batch.token) {
            return Err(AppError::TokenTaken);
        }

        state.batches.insert(batch.token.clone(), batch.records());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Vec<ShareRecord>> {
        let state = self.state.read().await;
        Ok(state.batches.get(token).cloned().unwrap_or_default())
    }

    async fn lock_batch(&self, token: &str) -> AppResult<Box<dyn LockedBatch>> {
        let lock = self.token_lock(token).await;
        let guard = lock.clone().lock_owned().await;
        let records = self.find_by_token(token).await?;

        // unknown token, its mutex must not outlive this call
        let guard = if records.is_empty() {
            drop(guard);
            self.release_lock(token, lock).await;
            None
        } else {
            Some(guard)
        };

        Ok(Box::new(MemoryLockedBatch {
            _guard: guard,
            state: self.state.clone(),
            token: token.to_string(),
            records,
            pending_increments: 0,
        }))
    }

    async fn token_exists(&self, token: &str) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.batches.contains_key(token))
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.write().await;

        let token = state
            .batches
            .iter()
            .find(|(_, records)| records.iter().any(|record| record.id == id))
            .map(|(token, _)| token.clone());

        let Some(token) = token else {
            return Ok(());
        };

        let now_empty = match state.batches.get_mut(&token) {
            Some(records) => {
                records.retain(|record| record.id != id);
                records.is_empty()
            }
            None => false,
        };

        if now_empty {
            state.batches.remove(&token);
            drop(state);
            self.locks.lock().await.remove(&token);
        }

        Ok(())
    }

    async fn find_expired(&self, before: DateTime<Utc>) -> AppResult<Vec<ShareRecord>> {
        let state = self.state.read().await;
        let mut expired: Vec<ShareRecord> = state
            .batches
            .values()
            .flatten()
            .filter(|record| record.expires_at.is_some_and(|at| at < before))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.link_token.cmp(&b.link_token));
        Ok(expired)
    }

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<StoreStats> {
        let state = self.state.read().await;
        let mut stats = StoreStats::default();

        for records in state.batches.values() {
            if let Some(first) = records.first() {
                stats.total_downloads += first.download_count;
            }

            for record in records {
                stats.total_files += 1;
                stats.total_size += record.size;
                match record.expires_at {
                    Some(at) if at < now => stats.expired_files += 1,
                    _ => stats.active_files += 1,
                }
            }
        }

        Ok(stats)
    }
}

struct MemoryLockedBatch {
    _guard: Option<OwnedMutexGuard<()>>,
    state: Arc<RwLock<State>>,
    token: String,
    records: Vec<ShareRecord>,
    pending_increments: i64,
}

#[async_trait]
impl LockedBatch for MemoryLockedBatch {
    fn records(&self) -> &[ShareRecord] {
        &self.records
    }

    async fn increment_download_count(&mut self) -> AppResult<()> {
        self.pending_increments += 1;
        for record in &mut self.records {
            record.download_count += 1;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        if self.pending_increments == 0 {
            return Ok(());
        }

        let mut state = self.state.write().await;
        if let Some(records) = state.batches.get_mut(&self.token) {
            for record in records {
                record.download_count += self.pending_increments;
            }
        }
        Ok(())
    }
}
