//! The gated download.
//!
//! Checking access and counting the download happen under the batch lock in
//! one transaction; streaming happens only after that transaction commits. A
//! download that fails or is cancelled while streaming still counts.

use std::path::Path;

use axum::{
    body::Body,
    http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::{
    access, archive,
    errors::{AppError, AppResult},
    gate,
    models::ShareRecord,
    repository::RecordStore,
    transfer::TransferStream,
    utilities::content_disposition,
    AppContext,
};

pub enum DownloadResult {
    Direct {
        file_name: String,
        mime_type: String,
        size: i64,
        stream: TransferStream,
    },
    Archive(archive::Archive),
}

impl DownloadResult {
    pub fn file_name(&self) -> &str {
        match self {
            Self::Direct { file_name, .. } => file_name,
            Self::Archive(archive) => &archive.file_name,
        }
    }
}

impl IntoResponse for DownloadResult {
    fn into_response(self) -> Response {
        let (file_name, mime_type, size, stream) = match self {
            Self::Direct {
                file_name,
                mime_type,
                size,
                stream,
            } => (file_name, mime_type, size.max(0) as u64, stream),
            Self::Archive(archive) => (
                archive.file_name,
                "application/zip".to_string(),
                archive.size,
                archive.stream,
            ),
        };

        (
            [
                (CONTENT_TYPE, mime_type),
                (CONTENT_DISPOSITION, content_disposition(&file_name)),
                (CONTENT_LENGTH, size.to_string()),
            ],
            Body::from_stream(stream),
        )
            .into_response()
    }
}

/// Locks the batch, re-checks it, verifies the password and counts the
/// download. Nothing changes unless every check passes.
pub async fn gated_download(
    store: &dyn RecordStore,
    token: &str,
    password: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Vec<ShareRecord>> {
    let mut locked = store.lock_batch(token).await?;

    {
        let records = locked.records();
        access::evaluate_records(records, now).ensure_available()?;
        let password_hash = records.first().and_then(|r| r.password_hash.as_deref());
        gate::check(password_hash, password)?;
    }

    locked.increment_download_count().await?;
    let records = locked.records().to_vec();
    locked.commit().await?;

    Ok(records)
}

#[tracing::instrument(skip(ctx, password))]
pub async fn download(
    ctx: &AppContext,
    token: &str,
    password: Option<&str>,
) -> AppResult<DownloadResult> {
    let records = gated_download(ctx.records.as_ref(), token, password, Utc::now()).await?;
    ctx.cache.invalidate(token).await;

    tracing::info!(
        files = records.len(),
        download_count = records[0].download_count,
        "download granted"
    );

    let result = deliver(ctx, records).await?;
    if let DownloadResult::Archive(archive) = &result {
        tracing::debug!(entries = ?archive.entries, size = archive.size, "archive assembled");
    }
    tracing::debug!("streaming `{}`", result.file_name());

    Ok(result)
}

async fn deliver(ctx: &AppContext, records: Vec<ShareRecord>) -> AppResult<DownloadResult> {
    let stream_timeout = ctx.cfg.transfer.stream_timeout();

    if let [record] = records.as_slice() {
        let reader = match ctx.blobs.open_read(&record.stored_name).await {
            Ok(reader) => reader,
            Err(why) => {
                tracing::error!(
                    token = %record.link_token,
                    record = %record.id,
                    "failed to open blob `{}` after the download was counted: {why:?}",
                    record.stored_name
                );
                return Err(why);
            }
        };

        return Ok(DownloadResult::Direct {
            file_name: record.original_name.clone(),
            mime_type: record.mime_type.clone(),
            size: record.size,
            stream: TransferStream::new(reader, stream_timeout),
        });
    }

    let archive = archive::assemble(
        ctx.blobs.as_ref(),
        &records,
        Path::new(&ctx.cfg.general.temp_dir),
        ctx.cfg.transfer.archive_timeout(),
        stream_timeout,
    )
    .await?;

    Ok(DownloadResult::Archive(archive))
}
