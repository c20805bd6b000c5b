use axum::{http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::{access::AccessState, errors::AppResult, extractors, AppContext};

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: AccessState,
}

#[tracing::instrument(skip(ctx))]
pub async fn status_endpoint(
    ctx: Extension<AppContext>,
    extractors::Path(token): extractors::Path<String>,
) -> AppResult<(StatusCode, Json<StatusResponse>)> {
    let status = ctx.resolver.access_state(&token).await?;

    let code = match status {
        AccessState::Available => StatusCode::OK,
        AccessState::NotFound => StatusCode::NOT_FOUND,
        AccessState::Expired | AccessState::Consumed => StatusCode::GONE,
    };

    Ok((code, Json(StatusResponse { status })))
}
