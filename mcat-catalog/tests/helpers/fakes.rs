//! Instrumented collaborators

use async_trait::async_trait;
use mcat_catalog::error::{CatalogError, CatalogResult};
use mcat_catalog::services::{AnalysisClient, AnalysisRequest, FileSystemAccess, LocalFileSystem};
use mcat_catalog::MediaAnalysis;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Analysis client with controllable failures
///
/// Each result carries a suggested rename of `suggested-<name>`.
#[derive(Default)]
pub struct FakeAnalysisClient {
    /// Drop this many results from the end of every response
    short_by: AtomicUsize,
    fail: AtomicBool,
    calls: AtomicUsize,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeAnalysisClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_short_by(&self, n: usize) {
        self.short_by.store(n, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalysisClient {
    async fn analyze(&self, requests: &[AnalysisRequest]) -> CatalogResult<Vec<MediaAnalysis>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().extend_from_slice(requests);

        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Analysis("connection refused".to_string()));
        }

        let mut results: Vec<MediaAnalysis> = requests
            .iter()
            .map(|r| {
                let mut analysis = MediaAnalysis::basic(&r.name, &r.mime_type, r.size_bytes);
                analysis.suggested.rename = format!("suggested-{}", r.name);
                analysis.suggested.confidence = 0.9;
                analysis
            })
            .collect();
        let keep = results.len().saturating_sub(self.short_by.load(Ordering::SeqCst));
        results.truncate(keep);
        Ok(results)
    }
}

/// Local file system whose reads (or writes) block until [`GatedFileSystem::open`]
pub struct GatedFileSystem {
    inner: LocalFileSystem,
    gate: Semaphore,
    gate_writes: bool,
    reads_started: AtomicUsize,
    writes_started: AtomicUsize,
}

impl GatedFileSystem {
    pub fn new() -> Self {
        Self {
            inner: LocalFileSystem,
            gate: Semaphore::new(0),
            gate_writes: false,
            reads_started: AtomicUsize::new(0),
            writes_started: AtomicUsize::new(0),
        }
    }

    /// Reads pass straight through; writes wait for the gate
    pub fn gating_writes() -> Self {
        Self {
            gate_writes: true,
            ..Self::new()
        }
    }

    /// Let every pending and future call proceed
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Wait until at least `n` reads are blocked on the gate
    pub async fn wait_for_reads(&self, n: usize) {
        wait_for(&self.reads_started, n, "reads").await;
    }

    /// Wait until at least `n` writes are blocked on the gate
    pub async fn wait_for_writes(&self, n: usize) {
        wait_for(&self.writes_started, n, "writes").await;
    }

    async fn pass(&self) -> io::Result<()> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(())
    }
}

async fn wait_for(counter: &AtomicUsize, n: usize, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < n {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[async_trait]
impl FileSystemAccess for GatedFileSystem {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        if !self.gate_writes {
            self.reads_started.fetch_add(1, Ordering::SeqCst);
            self.pass().await?;
        }
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if self.gate_writes {
            self.writes_started.fetch_add(1, Ordering::SeqCst);
            self.pass().await?;
        }
        self.inner.write_file(path, bytes).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }
}

/// Local file system that refuses writes to files ending in `suffix`
pub struct FlakyFileSystem {
    inner: LocalFileSystem,
    suffix: String,
}

impl FlakyFileSystem {
    pub fn failing_writes_to(suffix: &str) -> Self {
        Self {
            inner: LocalFileSystem,
            suffix: suffix.to_string(),
        }
    }
}

#[async_trait]
impl FileSystemAccess for FlakyFileSystem {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if path.to_string_lossy().ends_with(&self.suffix) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "disk says no"));
        }
        self.inner.write_file(path, bytes).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_file(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }
}
