use axum::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use super::{LockedBatch, RecordStore};
use crate::{
    config::DatabaseConfig,
    errors::{AppError, AppResult},
    models::{NewBatch, ShareRecord, StoreStats},
};

const SELECT_RECORDS: &str = r#"
    SELECT
        r.id,
        r.token AS link_token,
        r.original_name,
        r.stored_name,
        b.password_hash,
        b.expires_at,
        b.one_time_view,
        b.download_count,
        r.size,
        r.mime_type,
        r.created_at
    FROM share_records r
    JOIN batches b ON b.token = r.token
"#;

#[derive(Clone)]
pub struct PgRecordStore {
    db: PgPool,
}

impl PgRecordStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(url: &str, cfg: &DatabaseConfig) -> AppResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        Ok(Self::new(db))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_batch(&self, batch: &NewBatch) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO batches
                (token, password_hash, expires_at, one_time_view, created_at)
            VALUES
                ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&batch.token)
        .bind(&batch.policy.password_hash)
        .bind(batch.policy.expires_at)
        .bind(batch.policy.one_time_view)
        .bind(batch.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Err(why) if is_unique_violation(&why) => return Err(AppError::TokenTaken),
            other => other?,
        };

        for (position, file) in batch.files.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO share_records
                    (id, token, position, original_name, stored_name, size, mime_type, created_at)
                VALUES
                    ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&file.id)
            .bind(&batch.token)
            .bind(position as i32)
            .bind(&file.original_name)
            .bind(&file.stored_name)
            .bind(file.size)
            .bind(&file.mime_type)
            .bind(batch.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Vec<ShareRecord>> {
        let query = format!("{SELECT_RECORDS} WHERE r.token = $1 ORDER BY r.position");
        let records = sqlx::query_as::<_, ShareRecord>(&query)
            .bind(token)
            .fetch_all(&self.db)
            .await?;
        Ok(records)
    }

    async fn lock_batch(&self, token: &str) -> AppResult<Box<dyn LockedBatch>> {
        let mut tx = self.db.begin().await?;

        // The batch row is the lock; share_records rows are never mutated.
        let locked = sqlx::query_scalar::<_, String>(
            "SELECT token FROM batches WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let records = match locked {
            Some(_) => {
                let query = format!("{SELECT_RECORDS} WHERE r.token = $1 ORDER BY r.position");
                sqlx::query_as::<_, ShareRecord>(&query)
                    .bind(token)
                    .fetch_all(&mut *tx)
                    .await?
            }
            None => Vec::new(),
        };

        Ok(Box::new(PgLockedBatch {
            tx,
            token: token.to_string(),
            records,
        }))
    }

    async fn token_exists(&self, token: &str) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM batches WHERE token = $1)",
        )
        .bind(token)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let token = sqlx::query_scalar::<_, String>(
            "DELETE FROM share_records WHERE id = $1 RETURNING token",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(token) = token {
            sqlx::query(
                r#"
                DELETE FROM batches
                WHERE token = $1
                  AND NOT EXISTS (SELECT 1 FROM share_records WHERE token = $1)
                "#,
            )
            .bind(token)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_expired(&self, before: DateTime<Utc>) -> AppResult<Vec<ShareRecord>> {
        let query = format!(
            "{SELECT_RECORDS} WHERE b.expires_at < $1 ORDER BY r.token, r.position"
        );
        let records = sqlx::query_as::<_, ShareRecord>(&query)
            .bind(before)
            .fetch_all(&self.db)
            .await?;
        Ok(records)
    }

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<StoreStats> {
        let stats = sqlx::query_as::<_, StoreStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM share_records) AS total_files,
                (SELECT COALESCE(SUM(download_count), 0)::BIGINT FROM batches) AS total_downloads,
                COUNT(*) FILTER (WHERE b.expires_at < $1) AS expired_files,
                COUNT(*) FILTER (WHERE b.expires_at IS NULL OR b.expires_at >= $1) AS active_files,
                COALESCE(SUM(r.size), 0)::BIGINT AS total_size
            FROM share_records r
            JOIN batches b ON b.token = r.token
            "#,
        )
        .bind(now)
        .fetch_one(&self.db)
        .await?;
        Ok(stats)
    }
}

struct PgLockedBatch {
    tx: Transaction<'static, Postgres>,
    token: String,
    records: Vec<ShareRecord>,
}

#[async_trait]
impl LockedBatch for PgLockedBatch {
    fn records(&self) -> &[ShareRecord] {
        &self.records
    }

    async fn increment_download_count(&mut self) -> AppResult<()> {
        sqlx::query("UPDATE batches SET download_count = download_count + 1 WHERE token = $1")
            .bind(&self.token)
            .execute(&mut *self.tx)
            .await?;

        for record in &mut self.records {
            record.download_count += 1;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
