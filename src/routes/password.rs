use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::{errors::AppResult, extractors, gate, AppContext};

#[derive(Debug, Default, Deserialize)]
pub struct PasswordBody {
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
}

/// Checks a password without counting a download. Expiry is not checked
/// here; the download itself does that.
#[tracing::instrument(skip(ctx, body))]
pub async fn validate_password_endpoint(
    ctx: Extension<AppContext>,
    extractors::Path(token): extractors::Path<String>,
    extractors::Json(body): extractors::Json<PasswordBody>,
) -> AppResult<Json<ValidationResponse>> {
    let view = ctx.resolver.lookup(&token).await?;
    gate::check(view.password_hash.as_deref(), body.password.as_deref())?;

    Ok(Json(ValidationResponse { valid: true }))
}
