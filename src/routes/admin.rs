use axum::{Extension, Json};
use chrono::Utc;

use crate::{
    errors::AppResult,
    models::StoreStats,
    sweep::{sweep_expired, SweepReport},
    AppContext,
};

#[tracing::instrument(skip(ctx))]
pub async fn stats_endpoint(ctx: Extension<AppContext>) -> AppResult<Json<StoreStats>> {
    Ok(Json(ctx.records.stats(Utc::now()).await?))
}

#[tracing::instrument(skip(ctx))]
pub async fn cleanup_endpoint(ctx: Extension<AppContext>) -> AppResult<Json<SweepReport>> {
    Ok(Json(sweep_expired(&ctx, Utc::now()).await?))
}
