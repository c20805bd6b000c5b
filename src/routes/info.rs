use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{errors::AppResult, extractors, resolver::FileSummary, AppContext};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub token: String,
    pub has_password: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub download_count: i64,
    pub one_time_view: bool,
    pub created_at: DateTime<Utc>,
    /// Milliseconds until expiry, zero once it has passed.
    pub time_remaining: Option<i64>,
    pub files: Vec<FileSummary>,
    pub total_files: usize,
    pub total_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[tracing::instrument(skip(ctx))]
pub async fn info_endpoint(
    ctx: Extension<AppContext>,
    extractors::Path(token): extractors::Path<String>,
) -> AppResult<Json<InfoResponse>> {
    let view = ctx.resolver.lookup(&token).await?;
    let now = Utc::now();
    view.access(now).ensure_available()?;

    let single = match view.files.as_slice() {
        [file] => Some(file),
        _ => None,
    };

    Ok(Json(InfoResponse {
        has_password: view.has_password(),
        expires_at: view.expires_at,
        download_count: view.download_count,
        one_time_view: view.one_time_view,
        created_at: view.created_at,
        time_remaining: view.time_remaining(now).map(|left| left.num_milliseconds()),
        total_files: view.total_files(),
        total_size: view.total_size(),
        original_name: single.map(|file| file.original_name.clone()),
        size: single.map(|file| file.size),
        files: view.files,
        token: view.token,
    }))
}
