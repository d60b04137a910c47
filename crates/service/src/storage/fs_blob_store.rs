use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::blob_store::{BlobError, BlobStore};

/// Directory-backed blob store: one file per key inside a bucket directory.
///
/// File names are the URL-encoded keys, with a leading `.` escaped as well,
/// so no key can address anything outside the bucket. Names starting with `.`
/// are reserved for in-flight temp files and are never listed.
pub struct FsBlobStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl FsBlobStore {
    /// Open the bucket at `root`, creating the directory if missing.
    pub async fn new<P: Into<PathBuf>>(root: P) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, tmp_seq: AtomicU64::new(0) })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn key_to_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        Ok(self.root.join(encode_key(key)?))
    }
}

fn encode_key(key: &str) -> Result<String, BlobError> {
    if key.is_empty() || key.contains('\0') {
        return Err(BlobError::InvalidKey(key.to_string()));
    }
    let encoded = urlencoding::encode(key);
    // `.` is unreserved, but a leading one would hide the file from listing
    if let Some(rest) = encoded.strip_prefix('.') {
        return Ok(format!("%2E{rest}"));
    }
    Ok(encoded.into_owned())
}

fn decode_key(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|k| k.into_owned())
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), BlobError> {
        let path = self.key_to_path(key)?;
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.root.join(format!(".tmp-{}-{}", std::process::id(), seq));
        fs::write(&tmp, &body).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(%key, bytes = body.len(), "blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, BlobError> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(key) = decode_key(name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
