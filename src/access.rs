use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{AppError, AppResult},
    models::ShareRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    NotFound,
    Expired,
    /// One-time-view batch that was already downloaded.
    Consumed,
    Available,
}

impl AccessState {
    pub fn ensure_available(self) -> AppResult<()> {
        match self {
            Self::NotFound => Err(AppError::NotFound),
            Self::Expired => Err(AppError::Expired),
            Self::Consumed => Err(AppError::Consumed),
            Self::Available => Ok(()),
        }
    }
}

/// The lifecycle fields shared by every record of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchState {
    pub expires_at: Option<DateTime<Utc>>,
    pub one_time_view: bool,
    pub download_count: i64,
}

impl From<&ShareRecord> for BatchState {
    fn from(record: &ShareRecord) -> Self {
        Self {
            expires_at: record.expires_at,
            one_time_view: record.one_time_view,
            download_count: record.download_count,
        }
    }
}

pub fn evaluate(batch: Option<BatchState>, now: DateTime<Utc>) -> AccessState {
    let Some(batch) = batch else {
        return AccessState::NotFound;
    };

    match batch.expires_at {
        Some(expires_at) if now > expires_at => AccessState::Expired,
        _ if batch.one_time_view && batch.download_count > 0 => AccessState::Consumed,
        _ => AccessState::Available,
    }
}

pub fn evaluate_records(records: &[ShareRecord], now: DateTime<Utc>) -> AccessState {
    evaluate(records.first().map(BatchState::from), now)
}
