//! Service modules for the media catalog
//!
//! Leaf components used by the store and workflows: reference
//! classification, staging, legacy decoding, transient handles, quota
//! accounting, file system access and the analysis client.

pub mod analysis_client;
pub mod file_system;
pub mod handle_registry;
pub mod legacy_decoder;
pub mod path_resolver;
pub mod quota_ledger;
pub mod resource_stager;

pub use analysis_client::{AnalysisClient, AnalysisRequest, HttpAnalysisClient, LocalAnalysisClient};
pub use file_system::{FileSystemAccess, LocalFileSystem};
pub use handle_registry::{HandleId, HandleRegistry, TransientHandle};
pub use legacy_decoder::LegacyPayload;
pub use path_resolver::{Classification, NotDurableReason};
pub use quota_ledger::QuotaLedger;
pub use resource_stager::ResourceStager;
