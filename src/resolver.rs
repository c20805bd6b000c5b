use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    access::{self, AccessState, BatchState},
    cache::LinkCache,
    errors::{AppError, AppResult},
    models::ShareRecord,
    repository::RecordStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
}

/// Everything a recipient may learn about a link before downloading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchView {
    pub token: String,
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub one_time_view: bool,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub files: Vec<FileSummary>,
}

impl BatchView {
    /// `None` when `records` is empty.
    pub fn from_records(records: &[ShareRecord]) -> Option<Self> {
        let first = records.first()?;

        Some(Self {
            token: first.link_token.clone(),
            password_hash: first.password_hash.clone(),
            expires_at: first.expires_at,
            one_time_view: first.one_time_view,
            download_count: first.download_count,
            created_at: first.created_at,
            files: records
                .iter()
                .map(|record| FileSummary {
                    id: record.id.clone(),
                    original_name: record.original_name.clone(),
                    size: record.size,
                    mime_type: record.mime_type.clone(),
                })
                .collect(),
        })
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn state(&self) -> BatchState {
        BatchState {
            expires_at: self.expires_at,
            one_time_view: self.one_time_view,
            download_count: self.download_count,
        }
    }

    pub fn access(&self, now: DateTime<Utc>) -> AccessState {
        access::evaluate(Some(self.state()), now)
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - now).max(Duration::zero()))
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_size(&self) -> i64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

/// Pure read of a token's records.
pub async fn resolve(store: &dyn RecordStore, token: &str) -> AppResult<BatchView> {
    let records = store.find_by_token(token).await?;
    BatchView::from_records(&records).ok_or(AppError::NotFound)
}

#[derive(Clone)]
pub struct LinkResolver {
    store: Arc<dyn RecordStore>,
    cache: LinkCache,
}

impl LinkResolver {
    pub fn new(store: Arc<dyn RecordStore>, cache: LinkCache) -> Self {
        Self { store, cache }
    }

    /// [`resolve`] behind the link cache.
    pub async fn lookup(&self, token: &str) -> AppResult<BatchView> {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(token, now).await {
            return cached.ok_or(AppError::NotFound);
        }

        let generation = self.cache.generation();
        match resolve(self.store.as_ref(), token).await {
            Ok(view) => {
                self.cache.put(token, Some(view.clone()), now, generation).await;
                Ok(view)
            }
            Err(AppError::NotFound) => {
                self.cache.put(token, None, now, generation).await;
                Err(AppError::NotFound)
            }
            Err(why) => Err(why),
        }
    }

    /// Access state as every read path reports it.
    pub async fn access_state(&self, token: &str) -> AppResult<AccessState> {
        match self.lookup(token).await {
            Ok(view) => Ok(view.access(Utc::now())),
            Err(AppError::NotFound) => Ok(AccessState::NotFound),
            Err(why) => Err(why),
        }
    }
}
