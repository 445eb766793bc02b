//! Store and file fixtures

use super::fakes::FakeAnalysisClient;
use mcat_catalog::db::{MemoryKvStore, PersistenceAdapter, CATALOG_KEY, QUOTA_KEY};
use mcat_catalog::models::{CycleStatus, QuotaState};
use mcat_catalog::services::FileSystemAccess;
use mcat_catalog::{CatalogStore, CatalogStoreBuilder, QuotaTier};
use mcat_common::time;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Temp root, in-memory persistence and a fake analysis service
///
/// Reopening with the same `TestCatalog` simulates a restart: the
/// persisted values survive, handles do not.
pub struct TestCatalog {
    pub dir: TempDir,
    pub kv: Arc<MemoryKvStore>,
    pub analysis: Arc<FakeAnalysisClient>,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            kv: Arc::new(MemoryKvStore::new()),
            analysis: Arc::new(FakeAnalysisClient::new()),
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    /// Builder on the free tier with the fake analysis client
    pub fn builder(&self) -> CatalogStoreBuilder {
        let persistence: Arc<dyn PersistenceAdapter> = self.kv.clone();
        CatalogStoreBuilder::new(persistence, self.cache_dir())
            .with_analysis_client(self.analysis.clone())
            .with_quota(QuotaTier::Free, None)
    }

    /// Builder using a custom file system
    pub fn builder_with_fs(&self, fs: Arc<dyn FileSystemAccess>) -> CatalogStoreBuilder {
        self.builder().with_file_system(fs)
    }
}

/// Open a store and wait for rehydration
pub async fn open_store(catalog: &TestCatalog) -> CatalogStore {
    let (store, _report) = catalog
        .builder()
        .open_ready()
        .await
        .expect("Failed to open store");
    store
}

/// Write a media file under `dir`, returning its absolute path
pub fn write_media(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    std::fs::create_dir_all(dir).expect("Failed to create media dir");
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write media file");
    path
}

/// Seed a free-tier ledger for the current cycle
pub fn seed_quota(kv: &MemoryKvStore, used: u64) {
    seed_quota_state(
        kv,
        QuotaState {
            tier: QuotaTier::Free,
            monthly_cap: Some(200),
            used,
            cycle_status: if used >= 200 {
                CycleStatus::Exhausted
            } else {
                CycleStatus::Active
            },
            cycle_start: time::month_start(time::now()),
        },
    );
}

pub fn seed_quota_state(kv: &MemoryKvStore, state: QuotaState) {
    kv.insert(QUOTA_KEY, serde_json::to_value(state).expect("Failed to encode quota"));
}

pub fn seed_snapshot(kv: &MemoryKvStore, value: Value) {
    kv.insert(CATALOG_KEY, value);
}

/// Files currently in a directory (empty when it does not exist)
pub fn cache_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    }
}
