//! Catalog item model
//!
//! A [`CatalogItem`] is the in-memory record of one media file the user has
//! added. Its `transient_handle` refers to decoded bytes owned by the store
//! and is never persisted.

use crate::models::MediaAnalysis;
use crate::services::handle_registry::HandleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Absolute filesystem path that survives process restart
///
/// Only constructed through the path resolver, so a transient, remote or
/// embedded reference can never end up here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DurablePath(PathBuf);

impl DurablePath {
    pub(crate) fn new_unchecked(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Final path component, if any
    pub fn file_name(&self) -> Option<String> {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

impl fmt::Display for DurablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for DurablePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// One media item in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    /// Unique, never reused
    pub id: Uuid,
    /// None only for items that could not be recovered at load time
    pub durable_path: Option<DurablePath>,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub renamed_to: Option<String>,
    pub analysis: Option<MediaAnalysis>,
    /// Live decoded bytes; process-local, never persisted
    pub transient_handle: Option<HandleId>,
    pub collection_id: String,
    /// Pre-migration non-durable reference, kept until migrated
    pub legacy_ref: Option<String>,
}

impl CatalogItem {
    /// Name shown to the user (rename wins over the original name)
    pub fn display_name(&self) -> &str {
        self.renamed_to.as_deref().unwrap_or(&self.name)
    }

    /// True when the item has live bytes
    pub fn is_live(&self) -> bool {
        self.transient_handle.is_some()
    }
}

/// Catalog ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Insertion order or explicit reorder
    #[default]
    Manual,
    Name,
    CreatedAt,
    Size,
    MimeType,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Manual => "manual",
            SortKey::Name => "name",
            SortKey::CreatedAt => "created_at",
            SortKey::Size => "size",
            SortKey::MimeType => "mime_type",
        }
    }

    /// Stable sort of `items` by this key (manual leaves order untouched)
    pub fn apply(&self, items: &mut [CatalogItem]) {
        match self {
            SortKey::Manual => {}
            SortKey::Name => items.sort_by_key(|i| i.display_name().to_lowercase()),
            SortKey::CreatedAt => items.sort_by_key(|i| i.created_at),
            SortKey::Size => items.sort_by_key(|i| i.size_bytes),
            SortKey::MimeType => items.sort_by(|a, b| a.mime_type.cmp(&b.mime_type)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SortKey::Manual),
            "name" => Ok(SortKey::Name),
            "created_at" | "created" => Ok(SortKey::CreatedAt),
            "size" => Ok(SortKey::Size),
            "mime_type" | "type" => Ok(SortKey::MimeType),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}
