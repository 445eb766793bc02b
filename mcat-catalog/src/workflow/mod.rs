//! Catalog workflows
//!
//! - [`ingestion`]: stage, read and analyze new sources before commit
//! - [`rehydration`]: rebuild transient handles and migrate legacy
//!   references after a snapshot is loaded

pub mod ingestion;
pub mod rehydration;

pub use ingestion::{sniff_mime_type, IngestFailure, IngestOutcome, IngestSource, IngestionPipeline};
pub use rehydration::{RehydrationEngine, RehydrationReport};
