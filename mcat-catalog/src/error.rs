//! Error types for mcat-catalog
//!
//! Per-item failures (classification, staging, legacy decode) are logged and
//! isolated by the caller; batch-level failures (analysis mismatch, analysis
//! transport) abort the whole operation without mutating state.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Catalog error type
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Reference is not a durable filesystem path (non-fatal, per item)
    #[error("Not a durable path ({reason}): {reference}")]
    PathClassification { reference: String, reason: String },

    /// Staging directory creation or write failed (aborts one item)
    #[error("Staging failed for {path}: {source}")]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Analysis response length differs from request length (fatal for the batch)
    #[error("Analysis returned {actual} results for {expected} requests")]
    AnalysisMismatch { expected: usize, actual: usize },

    /// Legacy payload could not be decoded (item kept without handle)
    #[error("Legacy reference could not be decoded: {0}")]
    RehydrationDecode(String),

    /// Analysis call failed (transport, HTTP status, or response decode)
    #[error("Analysis failed: {0}")]
    Analysis(String),

    /// Item id is not in the catalog
    #[error("Item not found: {0}")]
    NotFound(Uuid),

    /// Persisted snapshot envelope is unsupported or corrupt
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistence adapter or configuration error
    #[error("Common error: {0}")]
    Common(#[from] mcat_common::Error),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
