use axum::Extension;
use serde::Deserialize;

use crate::{
    download::{download, DownloadResult},
    errors::AppResult,
    extractors,
    AppContext,
};

use super::password::PasswordBody;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    password: Option<String>,
}

#[tracing::instrument(skip(ctx, query))]
pub async fn download_endpoint(
    ctx: Extension<AppContext>,
    extractors::Path(token): extractors::Path<String>,
    extractors::Query(query): extractors::Query<DownloadQuery>,
) -> AppResult<DownloadResult> {
    download(&ctx, &token, query.password.as_deref()).await
}

/// Same as [`download_endpoint`] with the password kept out of the URL. A
/// missing or unreadable body counts as no password.
#[tracing::instrument(skip(ctx, body))]
pub async fn download_with_body_endpoint(
    ctx: Extension<AppContext>,
    extractors::Path(token): extractors::Path<String>,
    body: Option<extractors::Json<PasswordBody>>,
) -> AppResult<DownloadResult> {
    let password = body.and_then(|extractors::Json(body)| body.password);
    download(&ctx, &token, password.as_deref()).await
}
