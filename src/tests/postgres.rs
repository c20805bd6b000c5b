//! Run with `cargo test -- --ignored` and `DATABASE_URL` pointing at a
//! Postgres server the tests may create databases on.

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::join_all;
use sqlx::PgPool;

use crate::{
    download::gated_download,
    errors::AppError,
    models::{BatchPolicy, NewBatch, NewFile},
    repository::{PgRecordStore, RecordStore},
};

fn batch(token: &str, files: usize, policy: BatchPolicy) -> NewBatch {
    NewBatch {
        token: token.to_string(),
        policy,
        files: (0..files)
            .map(|i| NewFile {
                id: format!("{token}-{i}"),
                original_name: format!("file{i}.txt"),
                stored_name: format!("{token}-{i}.bin"),
                size: 10 * (i as i64 + 1),
                mime_type: "text/plain".to_string(),
            })
            .collect(),
        created_at: Utc::now(),
    }
}

fn expiring_in(duration: Duration) -> BatchPolicy {
    BatchPolicy {
        expires_at: Some(Utc::now() + duration),
        ..BatchPolicy::default()
    }
}

#[sqlx::test]
#[ignore = "needs a Postgres server"]
async fn batch_reads_back_in_order(pool: PgPool) {
    let store = PgRecordStore::new(pool);
    store
        .insert_batch(&batch("ordered", 3, expiring_in(Duration::hours(1))))
        .await
        .unwrap();

    let records = store.find_by_token("ordered").await.unwrap();
    let ids: Vec<_> = records.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, ["ordered-0", "ordered-1", "ordered-2"]);
    assert!(store.token_exists("ordered").await.unwrap());
    assert!(!store.token_exists("other").await.unwrap());

    let duplicate = store
        .insert_batch(&batch("ordered", 1, BatchPolicy::default()))
        .await;
    assert!(matches!(duplicate, Err(AppError::TokenTaken)));
    assert_eq!(store.find_by_token("ordered").await.unwrap().len(), 3);
}

#[sqlx::test]
#[ignore = "needs a Postgres server"]
async fn one_time_link_has_exactly_one_winner(pool: PgPool) {
    let store = Arc::new(PgRecordStore::new(pool));
    let policy = BatchPolicy {
        one_time_view: true,
        ..expiring_in(Duration::hours(1))
    };
    store.insert_batch(&batch("once", 2, policy)).await.unwrap();

    let tasks = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { gated_download(store.as_ref(), "once", None, Utc::now()).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|result| result.is_err())
        .all(|result| matches!(result, Err(AppError::Consumed))));

    let records = store.find_by_token("once").await.unwrap();
    assert!(records.iter().all(|record| record.download_count == 1));
}

#[sqlx::test]
#[ignore = "needs a Postgres server"]
async fn dropped_lock_rolls_back(pool: PgPool) {
    let store = PgRecordStore::new(pool);
    store
        .insert_batch(&batch("undo", 1, BatchPolicy::default()))
        .await
        .unwrap();

    {
        let mut locked = store.lock_batch("undo").await.unwrap();
        locked.increment_download_count().await.unwrap();
    }

    let records = store.find_by_token("undo").await.unwrap();
    assert_eq!(records[0].download_count, 0);

    let mut locked = store.lock_batch("undo").await.unwrap();
    locked.increment_download_count().await.unwrap();
    locked.commit().await.unwrap();
    assert_eq!(store.find_by_token("undo").await.unwrap()[0].download_count, 1);
}

#[sqlx::test]
#[ignore = "needs a Postgres server"]
async fn expiry_and_deletion(pool: PgPool) {
    let store = PgRecordStore::new(pool);
    let now = Utc::now();
    store
        .insert_batch(&batch("old", 2, expiring_in(-Duration::hours(1))))
        .await
        .unwrap();
    store
        .insert_batch(&batch("new", 1, expiring_in(Duration::hours(1))))
        .await
        .unwrap();

    let stats = store.stats(now).await.unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.expired_files, 2);
    assert_eq!(stats.active_files, 1);
    assert_eq!(stats.total_size, 40);

    let expired = store.find_expired(now).await.unwrap();
    assert_eq!(expired.len(), 2);

    store.delete("old-0").await.unwrap();
    assert!(store.token_exists("old").await.unwrap());
    store.delete("old-1").await.unwrap();
    assert!(!store.token_exists("old").await.unwrap());
    assert!(store.find_expired(now).await.unwrap().is_empty());
}
