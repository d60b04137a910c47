//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;

use tracing::{info, warn};

/// Ensure the blob bucket directory exists, creating it (and parents) if missing.
pub async fn ensure_env(blob_dir: &str) -> anyhow::Result<()> {
    if tokio::fs::metadata(blob_dir).await.is_err() {
        warn!(%blob_dir, "blob directory not found; creating it");
    }
    tokio::fs::create_dir_all(blob_dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {blob_dir}: {e}"))?;
    Ok(())
}

/// Warn when an optional file (e.g. a seed override) is configured but missing.
pub async fn check_optional_file(path: Option<&str>) -> bool {
    match path {
        Some(p) if tokio::fs::metadata(Path::new(p)).await.is_ok() => {
            info!(path = %p, "optional file present");
            true
        }
        Some(p) => {
            warn!(path = %p, "optional file configured but not found");
            false
        }
        None => false,
    }
}
