use std::{collections::HashSet, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{errors::AppResult, models::ShareRecord, AppContext};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub deleted_count: usize,
    pub errors: Vec<String>,
}

/// Deletes every record that expired before `now`, blob first. A failure on
/// one record is reported and the sweep moves on.
pub async fn sweep_expired(ctx: &AppContext, now: DateTime<Utc>) -> AppResult<SweepReport> {
    let expired = ctx.records.find_expired(now).await?;
    let mut report = SweepReport::default();
    let mut touched = HashSet::new();

    for record in expired {
        match remove_record(ctx, &record).await {
            Ok(()) => report.deleted_count += 1,
            Err(why) => {
                tracing::warn!(token = %record.link_token, "failed to sweep record `{}`: {why:?}", record.id);
                report
                    .errors
                    .push(format!("failed to delete file {}: {why}", record.id));
            }
        }
        touched.insert(record.link_token);
    }

    for token in &touched {
        ctx.cache.invalidate(token).await;
    }

    if report.deleted_count > 0 || !report.errors.is_empty() {
        tracing::info!(
            deleted = report.deleted_count,
            failed = report.errors.len(),
            links = touched.len(),
            "expired links swept"
        );
    }

    Ok(report)
}

async fn remove_record(ctx: &AppContext, record: &ShareRecord) -> AppResult<()> {
    ctx.blobs.delete(&record.stored_name).await?;
    ctx.records.delete(&record.id).await
}

/// Runs [`sweep_expired`] every `sweep_interval_secs`; zero turns it off.
pub fn spawn_sweeper(ctx: AppContext) -> Option<JoinHandle<()>> {
    let secs = ctx.cfg.lifecycle.sweep_interval_secs;
    if secs == 0 {
        tracing::info!("expiry sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(why) = sweep_expired(&ctx, Utc::now()).await {
                tracing::error!("expiry sweep failed: {why:?}");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::async_trait;
    use chrono::Duration;
    use tokio::io::AsyncRead;

    use super::*;
    use crate::{
        blobs::{BlobReader, BlobStore, LocalBlobStore},
        config::Config,
        errors::AppError,
        repository::MemoryRecordStore,
        tests::support::{seed_batch, test_app},
    };

    /// Local storage that refuses to delete one key.
    struct StubbornBlobs {
        inner: LocalBlobStore,
        stuck: String,
    }

    #[async_trait]
    impl BlobStore for StubbornBlobs {
        async fn exists(&self, key: &str) -> AppResult<bool> {
            self.inner.exists(key).await
        }

        async fn write(
            &self,
            key: &str,
            body: &mut (dyn AsyncRead + Send + Unpin),
        ) -> AppResult<u64> {
            self.inner.write(key, body).await
        }

        async fn open_read(&self, key: &str) -> AppResult<BlobReader> {
            self.inner.open_read(key).await
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            if key == self.stuck {
                return Err(AppError::Other(anyhow::anyhow!("permission denied")));
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn removes_expired_blobs_and_records() {
        let app = test_app().await;
        let now = Utc::now();

        seed_batch(&app.ctx, "old", Some(now - Duration::hours(1)), &[b"one", b"two"]).await;
        seed_batch(&app.ctx, "fresh", Some(now + Duration::hours(1)), &[b"three"]).await;

        let report = sweep_expired(&app.ctx, now).await.unwrap();
        assert_eq!(report.deleted_count, 2);
        assert!(report.errors.is_empty());

        assert!(app.ctx.records.find_by_token("old").await.unwrap().is_empty());
        assert!(!app.ctx.records.token_exists("old").await.unwrap());
        assert!(!app.ctx.blobs.exists("old-0.bin").await.unwrap());

        let fresh = app.ctx.records.find_by_token("fresh").await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert!(app.ctx.blobs.exists("fresh-0.bin").await.unwrap());
    }

    #[tokio::test]
    async fn missing_blob_does_not_stop_the_sweep() {
        let app = test_app().await;
        let now = Utc::now();

        seed_batch(&app.ctx, "old", Some(now - Duration::minutes(5)), &[b"one"]).await;
        app.ctx.blobs.delete("old-0.bin").await.unwrap();

        let report = sweep_expired(&app.ctx, now).await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert!(app.ctx.records.find_by_token("old").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nothing_to_sweep() {
        let app = test_app().await;
        let report = sweep_expired(&app.ctx, Utc::now()).await.unwrap();
        assert_eq!(report.deleted_count, 0);
    }

    #[tokio::test]
    async fn failed_delete_is_reported_and_the_rest_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = StubbornBlobs {
            inner: LocalBlobStore::open(dir.path()).await.unwrap(),
            stuck: "old-1.bin".to_string(),
        };
        let ctx = AppContext::new(
            Config::default(),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(blobs),
        );
        let now = Utc::now();

        seed_batch(&ctx, "old", Some(now - Duration::hours(1)), &[b"one", b"two", b"three"]).await;

        let report = sweep_expired(&ctx, now).await.unwrap();
        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("old-1"));

        let left = ctx.records.find_by_token("old").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "old-1");
        assert!(ctx.blobs.exists("old-1.bin").await.unwrap());
        assert!(!ctx.blobs.exists("old-0.bin").await.unwrap());

        // the next sweep retries what was left
        let again = sweep_expired(&ctx, now).await.unwrap();
        assert_eq!(again.deleted_count, 0);
        assert_eq!(again.errors.len(), 1);
    }
}
