//! Data models for mcat-catalog

pub mod analysis;
pub mod catalog_item;
pub mod quota;

pub use analysis::{FileType, MediaAnalysis, Suggested, Tagging};
pub use catalog_item::{CatalogItem, DurablePath, SortKey};
pub use quota::{CycleStatus, QuotaState, QuotaTier};
