//! mcat-catalog library interface
//!
//! Media catalog store with quota-gated ingestion and load-time
//! rehydration of transient handles. The `mcat` binary is a thin CLI over
//! [`store::CatalogStore`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod workflow;

pub use crate::config::CatalogSettings;
pub use crate::error::{CatalogError, CatalogResult};
pub use crate::models::{CatalogItem, DurablePath, MediaAnalysis, QuotaState, QuotaTier, SortKey};
pub use crate::store::{CatalogStore, CatalogStoreBuilder};
pub use crate::workflow::{IngestOutcome, IngestSource, RehydrationReport};
