use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::Router;
use common::utils::logging::init_logging_from_env;
use configs::{AppConfig, IndexBackend};
use dotenvy::dotenv;
use migration::MigratorTrait;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::errors::StartupError;
use crate::routes::{self, AppState};
use service::{
    catalog::{seed, BlobMirror, CatalogOptions, CatalogService, IndexStore, MemoryIndexStore, SeaOrmIndexStore},
    storage::FsBlobStore,
};

/// Initialize logging via shared common utils
fn init_logging() {
    init_logging_from_env();
}

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Config file first, environment variables as the fallback.
pub fn load_config() -> Result<AppConfig, StartupError> {
    load_config_with(&configs::default_path(), |key| std::env::var(key).ok())
}

/// Only a missing file falls back to `lookup`; a file that exists but does
/// not parse or validate is a startup error.
pub fn load_config_with<F>(path: &str, lookup: F) -> Result<AppConfig, StartupError>
where
    F: Fn(&str) -> Option<String>,
{
    match AppConfig::load_and_validate_from(path) {
        Ok(cfg) => Ok(cfg),
        Err(e) if configs::is_missing_file(&e) => {
            warn!(%path, "config file not found; using environment");
            AppConfig::from_lookup(lookup).map_err(|e| StartupError::InvalidConfig(e.to_string()))
        }
        Err(e) => Err(StartupError::InvalidConfig(format!("{path}: {e}"))),
    }
}

async fn open_index(cfg: &AppConfig) -> anyhow::Result<Arc<dyn IndexStore>> {
    match cfg.catalog.index_backend {
        IndexBackend::Postgres => {
            let db = models::db::connect_with_config(&cfg.database).await?;
            migration::Migrator::up(&db, None).await?;
            info!("index backend: postgres");
            Ok(Arc::new(SeaOrmIndexStore::new(db)))
        }
        IndexBackend::Memory => {
            warn!("index backend: memory; catalog rows are lost on restart");
            Ok(Arc::new(MemoryIndexStore::new()))
        }
    }
}

/// Open both stores, seed an empty index and report any divergence found.
pub async fn build_state(cfg: &AppConfig) -> Result<AppState, StartupError> {
    common::env::ensure_env(&cfg.catalog.blob_dir).await?;

    let index = open_index(cfg).await?;
    let blobs = FsBlobStore::new(&cfg.catalog.blob_dir)
        .await
        .map_err(|e| StartupError::InvalidConfig(format!("blob_dir {}: {e}", cfg.catalog.blob_dir)))?;
    let mirror = BlobMirror::new(Arc::new(blobs), cfg.catalog.key_scheme);
    let opts = CatalogOptions { serialize_creates: cfg.catalog.serialize_creates };
    let catalog = CatalogService::new(index, mirror, opts);

    let seed_path = cfg.catalog.seed_path.as_deref();
    if seed_path.is_some() && !common::env::check_optional_file(seed_path).await {
        return Err(StartupError::InvalidConfig(format!("seed file not found: {}", seed_path.unwrap_or_default())));
    }
    let books = seed::load(seed_path.map(Path::new)).await?;
    let seeded = catalog.seed_if_empty(&books).await?;

    let report = catalog.check_congruence().await?;
    info!(
        seeded,
        key_scheme = ?cfg.catalog.key_scheme,
        serialize_creates = cfg.catalog.serialize_creates,
        congruent = report.is_congruent(),
        "catalog ready"
    );

    Ok(AppState { catalog: Arc::new(catalog) })
}

/// Public entry: build the app and run the HTTP server
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let cfg = load_config()?;
    let state = build_state(&cfg).await?;

    let cors = build_cors();
    let app: Router = routes::build_router(state, cors);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!(%addr, "starting book catalog server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
