mod access;
mod archive;
mod blobs;
mod cache;
mod config;
mod download;
mod errors;
mod extractors;
mod gate;
mod instrumentation;
mod models;
mod repository;
mod resolver;
mod routes;
mod sweep;
mod tests;
mod transfer;
mod upload;
mod utilities;

use std::{future, sync::Arc, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Extension, Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
};

use crate::{
    blobs::{BlobStore, LocalBlobStore},
    cache::LinkCache,
    config::Config,
    errors::{AppError, AppResult},
    repository::{MemoryRecordStore, PgRecordStore, RecordStore},
    resolver::LinkResolver,
    routes::{
        admin::{cleanup_endpoint, stats_endpoint},
        download::{download_endpoint, download_with_body_endpoint},
        info::info_endpoint,
        password::validate_password_endpoint,
        status::status_endpoint,
        upload::{upload_batch_endpoint, upload_endpoint},
    },
};

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppContext {
    cfg: Arc<Config>,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    cache: LinkCache,
    resolver: LinkResolver,
}

impl AppContext {
    pub fn new(cfg: Config, records: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let cache = LinkCache::new(cfg.cache.clone());
        let resolver = LinkResolver::new(records.clone(), cache.clone());

        Self {
            cfg: Arc::new(cfg),
            records,
            blobs,
            cache,
            resolver,
        }
    }
}

fn router(ctx: AppContext) -> AppResult<Router> {
    let origin = HeaderValue::from_str(&ctx.cfg.general.cors_origin).map_err(|_| {
        AppError::Other(anyhow::anyhow!(
            "invalid cors origin `{}`",
            ctx.cfg.general.cors_origin
        ))
    })?;

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    // uploads and downloads run as long as the transfer takes
    let metadata = Router::new()
        .route("/file/:token", get(info_endpoint))
        .route("/file/:token/status", get(status_endpoint))
        .route("/file/:token/validate-password", post(validate_password_endpoint))
        .route("/admin/stats", get(stats_endpoint))
        .route("/admin/cleanup-expired", post(cleanup_endpoint))
        .layer(TimeoutLayer::new(METADATA_TIMEOUT));

    let router = Router::new()
        .route("/file/upload", post(upload_endpoint))
        .route("/file/upload-batch", post(upload_batch_endpoint))
        .route(
            "/file/:token/download",
            get(download_endpoint).post(download_with_body_endpoint),
        )
        .merge(metadata)
        .layer((
            DefaultBodyLimit::disable(),
            RequestBodyLimitLayer::new(ctx.cfg.general.max_request_bytes),
            Extension(ctx),
            cors_layer,
        ));

    Ok(instrumentation::add_layer(router))
}

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();

    let config_path = dotenvy::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load_config(&config_path).await?;
    instrumentation::setup(&cfg.instrumentation)?;

    let records: Arc<dyn RecordStore> = match &cfg.database.url {
        Some(url) => Arc::new(PgRecordStore::connect(url, &cfg.database).await?),
        None => {
            tracing::warn!("no database configured, links are kept in memory and lost on restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let blobs = Arc::new(LocalBlobStore::open(&cfg.general.storage_dir).await?);
    tokio::fs::create_dir_all(&cfg.general.temp_dir).await?;

    let address = cfg.general.bind_address.clone();
    let ctx = AppContext::new(cfg, records, blobs);
    sweep::spawn_sweeper(ctx.clone());

    let listener = TcpListener::bind(&address).await?;
    tracing::info!("api is available on http://{address}");

    axum::serve(listener, router(ctx)?)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(why) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {why}");
            future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(why) => {
                tracing::error!("failed to listen for SIGTERM: {why}");
                future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
