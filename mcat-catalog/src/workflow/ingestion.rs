//! Ingestion pipeline
//!
//! Turns a quota-truncated batch of sources into catalog items ready to be
//! committed: stage or read each source, mint a transient handle, then call
//! the analysis service once for the whole batch.
//!
//! Per-item failures (classification, staging, read) skip that item only.
//! A failed or mis-sized analysis response abandons the whole batch: every
//! minted handle is released and every staged file discarded, and nothing
//! reaches the store.

use crate::error::{CatalogError, CatalogResult};
use crate::models::{CatalogItem, DurablePath};
use crate::services::analysis_client::{AnalysisClient, AnalysisRequest};
use crate::services::file_system::FileSystemAccess;
use crate::services::handle_registry::{HandleRegistry, TransientHandle};
use crate::services::path_resolver::{self, truncate_for_log};
use crate::services::resource_stager::ResourceStager;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

/// Sources staged or read concurrently within one batch
const ADMISSION_CONCURRENCY: usize = 4;

const FALLBACK_MIME: &str = "application/octet-stream";

/// One input to an ingestion batch
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// Reference to an existing file (plain path or `file://` URL)
    Path {
        reference: String,
        /// Size reported by the picker, if known
        size_bytes: Option<u64>,
    },
    /// Raw bytes without a durable location (drag and drop, paste)
    Bytes { bytes: Vec<u8>, name: String },
}

impl IngestSource {
    pub fn path(reference: impl Into<String>) -> Self {
        IngestSource::Path {
            reference: reference.into(),
            size_bytes: None,
        }
    }

    pub fn bytes(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        IngestSource::Bytes {
            bytes,
            name: name.into(),
        }
    }

    /// Short description for logs and failure reports
    pub fn label(&self) -> String {
        match self {
            IngestSource::Path { reference, .. } => truncate_for_log(reference),
            IngestSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// A source that could not be admitted
#[derive(Debug)]
pub struct IngestFailure {
    pub source: String,
    pub error: CatalogError,
}

/// Result of [`crate::store::CatalogStore::ingest`]
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Ids of committed items, in input order
    pub admitted: Vec<Uuid>,
    /// Sources cut by the quota before any work was done
    pub dropped_by_quota: usize,
    /// Sources skipped because staging, reading or classification failed
    pub failures: Vec<IngestFailure>,
}

/// Item staged and analyzed, awaiting commit
pub(crate) struct PreparedItem {
    pub item: CatalogItem,
    pub handle: TransientHandle,
}

pub(crate) struct PreparedBatch {
    pub items: Vec<PreparedItem>,
    pub failures: Vec<IngestFailure>,
}

struct Admitted {
    item: CatalogItem,
    path: DurablePath,
    handle: TransientHandle,
    /// Path was written by the stager (and must be discarded on abandon)
    staged: bool,
}

/// Stages, reads and analyzes ingestion batches
pub struct IngestionPipeline {
    registry: HandleRegistry,
    stager: Arc<ResourceStager>,
    fs: Arc<dyn FileSystemAccess>,
    analysis: Arc<dyn AnalysisClient>,
}

impl IngestionPipeline {
    pub fn new(
        registry: HandleRegistry,
        stager: Arc<ResourceStager>,
        fs: Arc<dyn FileSystemAccess>,
        analysis: Arc<dyn AnalysisClient>,
    ) -> Self {
        Self {
            registry,
            stager,
            fs,
            analysis,
        }
    }

    /// Admit and analyze `sources` (already truncated to the quota)
    pub(crate) async fn prepare(
        &self,
        sources: Vec<IngestSource>,
        collection_id: &str,
    ) -> CatalogResult<PreparedBatch> {
        let results: Vec<(String, CatalogResult<Admitted>)> = stream::iter(sources)
            .map(|source| async move {
                let label = source.label();
                (label, self.admit(source, collection_id).await)
            })
            .buffered(ADMISSION_CONCURRENCY)
            .collect()
            .await;

        let mut admitted = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (label, result) in results {
            match result {
                Ok(entry) => admitted.push(entry),
                Err(error) => {
                    tracing::warn!(source = %label, error = %error, "Skipping source");
                    failures.push(IngestFailure {
                        source: label,
                        error,
                    });
                }
            }
        }

        if admitted.is_empty() {
            return Ok(PreparedBatch {
                items: Vec::new(),
                failures,
            });
        }

        let requests: Vec<AnalysisRequest> = admitted
            .iter()
            .map(|entry| AnalysisRequest {
                durable_path: entry.path.as_path().to_path_buf(),
                name: entry.item.name.clone(),
                mime_type: entry.item.mime_type.clone(),
                size_bytes: Some(entry.item.size_bytes),
            })
            .collect();

        let analyses = match self.analysis.analyze(&requests).await {
            Ok(analyses) if analyses.len() == admitted.len() => analyses,
            Ok(analyses) => {
                let error = CatalogError::AnalysisMismatch {
                    expected: admitted.len(),
                    actual: analyses.len(),
                };
                tracing::error!(error = %error, "Abandoning ingestion batch");
                self.abandon(admitted).await;
                return Err(error);
            }
            Err(error) => {
                tracing::error!(error = %error, "Analysis failed; abandoning ingestion batch");
                self.abandon(admitted).await;
                return Err(error);
            }
        };

        let items = admitted
            .into_iter()
            .zip(analyses)
            .map(|(mut entry, analysis)| {
                entry.item.analysis = Some(analysis);
                PreparedItem {
                    item: entry.item,
                    handle: entry.handle,
                }
            })
            .collect();

        Ok(PreparedBatch { items, failures })
    }

    async fn admit(&self, source: IngestSource, collection_id: &str) -> CatalogResult<Admitted> {
        let (durable_path, bytes, name, staged) = match source {
            IngestSource::Bytes { bytes, name } => {
                let path = self.stager.stage(&bytes, &name).await?;
                (path, bytes, name, true)
            }
            IngestSource::Path {
                reference,
                size_bytes,
            } => {
                let path = path_resolver::require_durable(&reference)?;
                let bytes = self.fs.read_file(path.as_path()).await?;
                if let Some(reported) = size_bytes.filter(|s| *s != bytes.len() as u64) {
                    tracing::debug!(path = %path, reported, actual = bytes.len(), "Reported size differs from file size");
                }
                let name = path.file_name().unwrap_or_else(|| "file".to_string());
                (path, bytes, name, false)
            }
        };

        let mime_type = sniff_mime_type(&bytes, &name);
        let size_bytes = bytes.len() as u64;
        let handle = self.registry.acquire(bytes);

        let item = CatalogItem {
            id: Uuid::new_v4(),
            durable_path: Some(durable_path.clone()),
            name,
            mime_type,
            size_bytes,
            created_at: mcat_common::time::now(),
            renamed_to: None,
            analysis: None,
            transient_handle: Some(handle.id()),
            collection_id: collection_id.to_string(),
            legacy_ref: None,
        };

        Ok(Admitted {
            item,
            path: durable_path,
            handle,
            staged,
        })
    }

    async fn abandon(&self, admitted: Vec<Admitted>) {
        for entry in admitted {
            entry.handle.release();
            if entry.staged {
                self.stager.discard(&entry.path).await;
            }
        }
    }
}

/// MIME type from content, then extension, then a generic fallback
pub fn sniff_mime_type(bytes: &[u8], name: &str) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}
