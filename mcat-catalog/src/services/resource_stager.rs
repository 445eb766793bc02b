//! Resource staging
//!
//! Copies raw bytes into the process-owned cache directory so they get a
//! durable path. File names are `<random token>-<sanitized original name>`.

use crate::error::{CatalogError, CatalogResult};
use crate::models::DurablePath;
use crate::services::file_system::FileSystemAccess;
use crate::services::path_resolver;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_NAME_LEN: usize = 120;

/// Writes bytes into the staging cache
pub struct ResourceStager {
    cache_dir: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    writes: AtomicU64,
}

impl ResourceStager {
    /// Create a stager rooted at `cache_dir` (made absolute against the CWD)
    pub fn new(cache_dir: impl Into<PathBuf>, fs: Arc<dyn FileSystemAccess>) -> CatalogResult<Self> {
        let cache_dir = cache_dir.into();
        let cache_dir = if cache_dir.is_absolute() {
            cache_dir
        } else {
            std::env::current_dir()?.join(cache_dir)
        };
        Ok(Self {
            cache_dir,
            fs,
            writes: AtomicU64::new(0),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Number of successful staging writes since construction
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Write `bytes` to a fresh file in the cache and return its durable path
    pub async fn stage(&self, bytes: &[u8], suggested_name: &str) -> CatalogResult<DurablePath> {
        // Idempotent; concurrent callers racing on creation both succeed
        self.fs
            .create_dir_all(&self.cache_dir)
            .await
            .map_err(|source| CatalogError::StagingIo {
                path: self.cache_dir.clone(),
                source,
            })?;

        let file_name = format!(
            "{}-{}",
            mcat_common::uuid_utils::short_token(),
            sanitize_file_name(suggested_name)
        );
        let target = self.cache_dir.join(file_name);

        self.fs
            .write_file(&target, bytes)
            .await
            .map_err(|source| CatalogError::StagingIo {
                path: target.clone(),
                source,
            })?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(path = %target.display(), len = bytes.len(), "Staged resource");

        path_resolver::from_absolute(target.clone()).ok_or_else(|| CatalogError::StagingIo {
            path: target,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "staged path not absolute"),
        })
    }

    /// Best-effort removal of a staged file (only inside the cache)
    pub async fn discard(&self, path: &DurablePath) {
        if !path.as_path().starts_with(&self.cache_dir) {
            return;
        }
        if let Err(e) = self.fs.remove_file(path.as_path()).await {
            tracing::warn!(path = %path, error = %e, "Failed to discard staged file");
        }
    }
}

/// Make `name` safe as a single file-name component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "file".to_string();
    }

    if cleaned.len() <= MAX_NAME_LEN {
        return cleaned.to_string();
    }

    // Keep the extension when truncating
    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if ext.len() < 16 => (stem, Some(ext)),
        _ => (cleaned, None),
    };
    let budget = MAX_NAME_LEN - ext.map_or(0, |e| e.len() + 1);
    let mut end = budget.min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    match ext {
        Some(ext) => format!("{}.{}", &stem[..end], ext),
        None => stem[..end].to_string(),
    }
}
