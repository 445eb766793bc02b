//! Persisted catalog snapshot
//!
//! The snapshot is a tagged envelope, `{"version": "v2", "items": [...],
//! "sort_key": "..."}`. Older builds wrote `"v1"` envelopes or a bare item
//! array; both decode as v1 and are migrated to the current model.
//!
//! Records are decoded one at a time against the field list of their
//! version. Unknown keys are logged and ignored; a record that fails to
//! decode is logged and skipped so one bad entry cannot lose the catalog.
//! Transient handles are never written.

use crate::error::{CatalogError, CatalogResult};
use crate::models::{CatalogItem, DurablePath, MediaAnalysis, SortKey};
use crate::services::path_resolver::{self, truncate_for_log, Classification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Collection assigned to records that predate collections
pub const DEFAULT_COLLECTION: &str = "default";

/// Persisted keys of a v1 record
pub const V1_FIELDS: &[&str] = &[
    "path",
    "url",
    "name",
    "mime_type",
    "size_bytes",
    "created_at",
    "analysis",
    "collection_id",
];

/// Persisted keys of a v2 record
pub const V2_FIELDS: &[&str] = &[
    "id",
    "durable_path",
    "name",
    "mime_type",
    "size_bytes",
    "created_at",
    "renamed_to",
    "analysis",
    "collection_id",
    "legacy_ref",
];

/// Snapshot schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotVersion {
    V1,
    V2,
}

impl SnapshotVersion {
    pub const CURRENT: SnapshotVersion = SnapshotVersion::V2;

    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            SnapshotVersion::V1 => V1_FIELDS,
            SnapshotVersion::V2 => V2_FIELDS,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            SnapshotVersion::V1 => "v1",
            SnapshotVersion::V2 => "v2",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "version")]
enum Envelope {
    #[serde(rename = "v1")]
    V1 { items: Vec<Value> },
    #[serde(rename = "v2")]
    V2 {
        items: Vec<Value>,
        #[serde(default)]
        sort_key: SortKey,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordV2 {
    id: Uuid,
    #[serde(default)]
    durable_path: Option<String>,
    name: String,
    mime_type: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
    #[serde(default)]
    renamed_to: Option<String>,
    #[serde(default)]
    analysis: Option<MediaAnalysis>,
    #[serde(default = "default_collection")]
    collection_id: String,
    #[serde(default)]
    legacy_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordV1 {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    url: Option<String>,
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    analysis: Option<MediaAnalysis>,
    #[serde(default = "default_collection")]
    collection_id: String,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

/// Result of decoding a snapshot
#[derive(Debug)]
pub struct DecodedSnapshot {
    pub version: SnapshotVersion,
    pub items: Vec<CatalogItem>,
    pub sort_key: SortKey,
    /// Records that failed to decode
    pub skipped: usize,
    /// Records given a fresh id because theirs was already taken
    pub reassigned: usize,
}

impl DecodedSnapshot {
    /// Whether the stored form differs from what [`encode`] would write now
    pub fn needs_rewrite(&self) -> bool {
        self.version != SnapshotVersion::CURRENT || self.skipped > 0 || self.reassigned > 0
    }
}

/// Encode the catalog in the current schema
pub fn encode(items: &[CatalogItem], sort_key: SortKey) -> CatalogResult<Value> {
    let items = items
        .iter()
        .map(|item| {
            serde_json::to_value(RecordV2 {
                id: item.id,
                durable_path: item
                    .durable_path
                    .as_ref()
                    .map(|p| p.as_path().to_string_lossy().into_owned()),
                name: item.name.clone(),
                mime_type: item.mime_type.clone(),
                size_bytes: item.size_bytes,
                created_at: item.created_at,
                renamed_to: item.renamed_to.clone(),
                analysis: item.analysis.clone(),
                collection_id: item.collection_id.clone(),
                legacy_ref: item.legacy_ref.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CatalogError::Snapshot(format!("encode failed: {}", e)))?;

    serde_json::to_value(Envelope::V2 { items, sort_key })
        .map_err(|e| CatalogError::Snapshot(format!("encode failed: {}", e)))
}

/// Decode a stored snapshot of any supported version
pub fn decode(value: Value) -> CatalogResult<DecodedSnapshot> {
    let (version, records, sort_key) = match value {
        Value::Array(records) => (SnapshotVersion::V1, records, SortKey::Manual),
        Value::Object(_) => match serde_json::from_value::<Envelope>(value) {
            Ok(Envelope::V1 { items }) => (SnapshotVersion::V1, items, SortKey::Manual),
            Ok(Envelope::V2 { items, sort_key }) => (SnapshotVersion::V2, items, sort_key),
            Err(e) => return Err(CatalogError::Snapshot(format!("unsupported envelope: {}", e))),
        },
        other => {
            return Err(CatalogError::Snapshot(format!(
                "expected object or array, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut items = Vec::with_capacity(records.len());
    let mut seen = HashSet::with_capacity(records.len());
    let mut skipped = 0;
    let mut reassigned = 0;

    for (index, record) in records.into_iter().enumerate() {
        let Value::Object(fields) = record else {
            tracing::warn!(index, version = version.tag(), "Skipping non-object snapshot record");
            skipped += 1;
            continue;
        };
        warn_unknown_fields(version, index, &fields);

        let decoded = match version {
            SnapshotVersion::V1 => decode_v1(fields),
            SnapshotVersion::V2 => decode_v2(fields),
        };
        let mut item = match decoded {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(index, version = version.tag(), error = %e, "Skipping undecodable snapshot record");
                skipped += 1;
                continue;
            }
        };

        if !seen.insert(item.id) {
            let fresh = Uuid::new_v4();
            tracing::warn!(index, duplicate = %item.id, new_id = %fresh, "Duplicate item id in snapshot; reassigned");
            item.id = fresh;
            seen.insert(fresh);
            reassigned += 1;
        }
        items.push(item);
    }

    Ok(DecodedSnapshot {
        version,
        items,
        sort_key,
        skipped,
        reassigned,
    })
}

fn warn_unknown_fields(version: SnapshotVersion, index: usize, fields: &Map<String, Value>) {
    let allowed = version.fields();
    for key in fields.keys().filter(|k| !allowed.contains(&k.as_str())) {
        tracing::warn!(index, version = version.tag(), field = %key, "Ignoring unknown snapshot field");
    }
}

fn decode_v2(fields: Map<String, Value>) -> Result<CatalogItem, serde_json::Error> {
    let record: RecordV2 = serde_json::from_value(Value::Object(fields))?;

    let mut legacy_ref = record.legacy_ref;
    let durable_path = match record.durable_path {
        Some(stored) => match path_resolver::classify(&stored) {
            Classification::Durable(path) => Some(path),
            Classification::NotDurable(reason) => {
                // A non-durable value here is corrupt; keep it for migration
                tracing::warn!(
                    item_id = %record.id,
                    reference = %truncate_for_log(&stored),
                    %reason,
                    "Stored durable_path is not durable"
                );
                legacy_ref = legacy_ref.or(Some(stored));
                None
            }
        },
        None => None,
    };

    Ok(CatalogItem {
        id: record.id,
        durable_path,
        name: record.name,
        mime_type: record.mime_type,
        size_bytes: record.size_bytes,
        created_at: record.created_at,
        renamed_to: record.renamed_to,
        analysis: record.analysis,
        transient_handle: None,
        collection_id: record.collection_id,
        legacy_ref,
    })
}

fn decode_v1(fields: Map<String, Value>) -> Result<CatalogItem, serde_json::Error> {
    let record: RecordV1 = serde_json::from_value(Value::Object(fields))?;

    let references: Vec<String> = [record.path, record.url]
        .into_iter()
        .flatten()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let durable_path: Option<DurablePath> = references
        .iter()
        .find_map(|r| path_resolver::classify(r).durable());

    // Inline payloads outlive the process that wrote them; prefer those
    let legacy_ref = match durable_path {
        Some(_) => None,
        None => references
            .iter()
            .find(|r| r.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")))
            .or_else(|| references.first())
            .cloned(),
    };

    let mime_type = record
        .mime_type
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(CatalogItem {
        id: Uuid::new_v4(),
        durable_path,
        name: record.name,
        mime_type,
        size_bytes: record.size_bytes,
        created_at: record.created_at.unwrap_or_else(mcat_common::time::now),
        renamed_to: None,
        analysis: record.analysis,
        transient_handle: None,
        collection_id: record.collection_id,
        legacy_ref,
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
