mod memory;
mod postgres;

use axum::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

use crate::{
    errors::AppResult,
    models::{NewBatch, ShareRecord, StoreStats},
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts every file of the batch or none of them. Fails with
    /// `AppError::TokenTaken` when the token is already in use.
    async fn insert_batch(&self, batch: &NewBatch) -> AppResult<()>;

    /// Non-locking read, records in upload order.
    async fn find_by_token(&self, token: &str) -> AppResult<Vec<ShareRecord>>;

    /// Locking read. Blocks while another caller holds the same token.
    async fn lock_batch(&self, token: &str) -> AppResult<Box<dyn LockedBatch>>;

    async fn token_exists(&self, token: &str) -> AppResult<bool>;

    /// Removes one record; the batch goes with its last record.
    async fn delete(&self, id: &str) -> AppResult<()>;

    async fn find_expired(&self, before: DateTime<Utc>) -> AppResult<Vec<ShareRecord>>;

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<StoreStats>;
}

#[async_trait]
pub trait LockedBatch: Send {
    /// State as of acquiring the lock. Empty when the token is unknown.
    fn records(&self) -> &[ShareRecord];

    /// Bumps the batch counter once, visible to others only after commit.
    async fn increment_download_count(&mut self) -> AppResult<()>;

    /// Dropping the batch without committing discards the increment.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
