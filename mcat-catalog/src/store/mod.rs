//! Catalog store
//!
//! Owns the in-memory item list, the live transient handles and the quota
//! ledger, and is the only writer of the persisted snapshot.
//!
//! State lives behind one async `RwLock`. Every mutation reads and writes
//! state inside a single lock scope, bumps a revision and encodes the
//! snapshot before the lock is released. Writes then go through a separate
//! persistence mutex that drops any snapshot older than the last one
//! written, so the stored value always follows mutation order.

pub mod snapshot;

use crate::db::kv_store::{PersistenceAdapter, CATALOG_KEY, QUOTA_KEY};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{CatalogItem, DurablePath, QuotaState, QuotaTier, SortKey};
use crate::services::analysis_client::{AnalysisClient, AnalysisRequest, LocalAnalysisClient};
use crate::services::file_system::{FileSystemAccess, LocalFileSystem};
use crate::services::handle_registry::{HandleRegistry, TransientHandle};
use crate::services::quota_ledger::QuotaLedger;
use crate::services::resource_stager::ResourceStager;
use crate::workflow::ingestion::{IngestOutcome, IngestSource, IngestionPipeline};
use crate::workflow::rehydration::{RehydrationEngine, RehydrationReport, RehydrationTarget};
use mcat_common::events::{CatalogEvent, EventBus};
use mcat_common::time;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Builder for [`CatalogStore`]
pub struct CatalogStoreBuilder {
    persistence: Arc<dyn PersistenceAdapter>,
    cache_dir: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    analysis: Arc<dyn AnalysisClient>,
    quota_tier: QuotaTier,
    quota_cap: Option<u64>,
    events: Option<EventBus>,
}

impl CatalogStoreBuilder {
    /// Local file system, offline analysis and the free tier by default
    pub fn new(persistence: Arc<dyn PersistenceAdapter>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            persistence,
            cache_dir: cache_dir.into(),
            fs: Arc::new(LocalFileSystem),
            analysis: Arc::new(LocalAnalysisClient),
            quota_tier: QuotaTier::Free,
            quota_cap: None,
            events: None,
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_analysis_client(mut self, analysis: Arc<dyn AnalysisClient>) -> Self {
        self.analysis = analysis;
        self
    }

    /// Tier and optional cap override
    pub fn with_quota(mut self, tier: QuotaTier, monthly_cap: Option<u64>) -> Self {
        self.quota_tier = tier;
        self.quota_cap = monthly_cap;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Load the last snapshot and quota ledger
    ///
    /// The store is not ready until [`CatalogStore::start_rehydration`] has
    /// run to completion.
    pub async fn open(self) -> CatalogResult<CatalogStore> {
        let decoded = match self.persistence.get(CATALOG_KEY).await? {
            Some(value) => Some(snapshot::decode(value)?),
            None => None,
        };

        let now = time::now();
        let (mut quota, mut quota_dirty) = match self.persistence.get(QUOTA_KEY).await? {
            Some(value) => {
                let state: QuotaState = serde_json::from_value(value)
                    .map_err(|e| CatalogError::Snapshot(format!("quota ledger: {}", e)))?;
                (QuotaLedger::from_state(state), false)
            }
            None => (QuotaLedger::new(self.quota_tier, self.quota_cap, now), true),
        };
        quota_dirty |= quota.reconfigure(self.quota_tier, self.quota_cap);
        quota_dirty |= quota.roll_over(now);

        let (items, sort_key, snapshot_stale) = match decoded {
            Some(decoded) => {
                tracing::info!(
                    version = ?decoded.version,
                    items = decoded.items.len(),
                    skipped = decoded.skipped,
                    reassigned = decoded.reassigned,
                    "Loaded catalog snapshot"
                );
                let stale = decoded.needs_rewrite();
                (decoded.items, decoded.sort_key, stale)
            }
            None => {
                tracing::info!("No catalog snapshot found; starting empty");
                (Vec::new(), SortKey::default(), false)
            }
        };

        let registry = HandleRegistry::new();
        let stager = Arc::new(ResourceStager::new(self.cache_dir, Arc::clone(&self.fs))?);
        let pipeline = IngestionPipeline::new(
            registry.clone(),
            Arc::clone(&stager),
            Arc::clone(&self.fs),
            Arc::clone(&self.analysis),
        );

        let mut state = StoreState {
            items,
            handles: HashMap::new(),
            quota,
            sort_key,
            pending: 0,
            busy: false,
            ready: false,
            revision: 0,
            snapshot_stale,
        };
        let quota_plan = if quota_dirty {
            Some(state.plan(false, true)?)
        } else {
            None
        };

        let store = CatalogStore {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                persistence: self.persistence,
                persisted: Mutex::new(PersistCursor::default()),
                ingest_gate: Mutex::new(()),
                registry,
                stager,
                fs: self.fs,
                analysis: self.analysis,
                pipeline,
                events: self
                    .events
                    .unwrap_or_else(|| EventBus::new(EVENT_CHANNEL_CAPACITY)),
            }),
        };

        if let Some(plan) = quota_plan {
            store.persist(plan).await?;
        }

        Ok(store)
    }

    /// Open and wait for rehydration to finish
    pub async fn open_ready(self) -> CatalogResult<(CatalogStore, RehydrationReport)> {
        let store = self.open().await?;
        let report = store
            .start_rehydration()
            .await
            .map_err(|e| mcat_common::Error::Internal(format!("rehydration task failed: {}", e)))??;
        Ok((store, report))
    }
}

/// Shared handle to the catalog; clones share one store
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    persistence: Arc<dyn PersistenceAdapter>,
    persisted: Mutex<PersistCursor>,
    /// Serializes ingestion and re-analysis batches
    ingest_gate: Mutex<()>,
    registry: HandleRegistry,
    stager: Arc<ResourceStager>,
    fs: Arc<dyn FileSystemAccess>,
    analysis: Arc<dyn AnalysisClient>,
    pipeline: IngestionPipeline,
    events: EventBus,
}

struct StoreState {
    items: Vec<CatalogItem>,
    /// Owning guards for every live handle, keyed by item id
    handles: HashMap<Uuid, TransientHandle>,
    quota: QuotaLedger,
    sort_key: SortKey,
    /// Sources admitted by an in-flight batch but not yet committed
    pending: u64,
    busy: bool,
    ready: bool,
    revision: u64,
    /// Loaded snapshot differs from what encoding the current items would write
    snapshot_stale: bool,
}

impl StoreState {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    fn resort(&mut self) {
        let key = self.sort_key;
        key.apply(&mut self.items);
    }

    /// Snapshot the parts of state a mutation touched
    fn plan(&mut self, catalog: bool, quota: bool) -> CatalogResult<PersistPlan> {
        self.revision += 1;
        let catalog = if catalog {
            Some(snapshot::encode(&self.items, self.sort_key)?)
        } else {
            None
        };
        let quota = if quota {
            Some(serde_json::to_value(self.quota.state()).map_err(mcat_common::Error::from)?)
        } else {
            None
        };
        Ok(PersistPlan {
            revision: self.revision,
            catalog,
            quota,
        })
    }
}

/// Encoded values to write after a mutation
pub(crate) struct PersistPlan {
    revision: u64,
    catalog: Option<Value>,
    quota: Option<Value>,
}

/// Revision of the last value written per key
#[derive(Debug, Default)]
struct PersistCursor {
    catalog: u64,
    quota: u64,
}

impl CatalogStore {
    pub fn builder(
        persistence: Arc<dyn PersistenceAdapter>,
        cache_dir: impl Into<PathBuf>,
    ) -> CatalogStoreBuilder {
        CatalogStoreBuilder::new(persistence, cache_dir)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All items in display order
    pub async fn items(&self) -> Vec<CatalogItem> {
        self.inner.state.read().await.items.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<CatalogItem> {
        let state = self.inner.state.read().await;
        state.items.iter().find(|item| item.id == id).cloned()
    }

    /// Live bytes of an item, if its handle is installed
    pub async fn item_bytes(&self, id: Uuid) -> Option<Arc<[u8]>> {
        let state = self.inner.state.read().await;
        state.handles.get(&id).and_then(|handle| handle.bytes())
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.state.read().await.busy
    }

    /// True once load-time rehydration has finished
    pub async fn is_ready(&self) -> bool {
        self.inner.state.read().await.ready
    }

    pub async fn sort_key(&self) -> SortKey {
        self.inner.state.read().await.sort_key
    }

    /// Admissions still possible this cycle (None = unlimited)
    pub async fn remaining_quota(&self) -> Option<u64> {
        let state = self.inner.state.read().await;
        let mut ledger = state.quota.clone();
        ledger.roll_over(time::now());
        ledger.remaining(state.pending)
    }

    /// Current quota state (as of the current cycle)
    pub async fn quota(&self) -> QuotaState {
        let state = self.inner.state.read().await;
        let mut ledger = state.quota.clone();
        ledger.roll_over(time::now());
        ledger.state().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn handle_registry(&self) -> &HandleRegistry {
        &self.inner.registry
    }

    pub fn stager(&self) -> &ResourceStager {
        &self.inner.stager
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Admit a batch of sources into `collection_id`
    ///
    /// The batch is truncated to the remaining quota. Items and the quota
    /// increment are committed together, after a successful analysis call.
    pub async fn ingest(
        &self,
        sources: Vec<IngestSource>,
        collection_id: &str,
    ) -> CatalogResult<IngestOutcome> {
        let _gate = self.inner.ingest_gate.lock().await;
        let requested = sources.len();

        let (admissible, rollover) = {
            let mut state = self.inner.state.write().await;
            let rollover = if state.quota.roll_over(time::now()) {
                Some(state.plan(false, true)?)
            } else {
                None
            };
            let admissible = state.quota.admissible(requested, state.pending);
            state.pending += admissible as u64;
            state.busy = true;
            (admissible, rollover)
        };
        self.emit(CatalogEvent::BusyChanged {
            busy: true,
            timestamp: time::now(),
        });

        let result = self
            .ingest_admitted(sources, admissible, collection_id, rollover)
            .await;

        {
            let mut state = self.inner.state.write().await;
            state.pending = state.pending.saturating_sub(admissible as u64);
            state.busy = false;
        }
        self.emit(CatalogEvent::BusyChanged {
            busy: false,
            timestamp: time::now(),
        });

        result
    }

    async fn ingest_admitted(
        &self,
        mut sources: Vec<IngestSource>,
        admissible: usize,
        collection_id: &str,
        rollover: Option<PersistPlan>,
    ) -> CatalogResult<IngestOutcome> {
        if let Some(plan) = rollover {
            self.persist(plan).await?;
            self.emit_quota().await;
        }

        let dropped = sources.len().saturating_sub(admissible);
        if dropped > 0 {
            tracing::info!(
                requested = sources.len(),
                admitted = admissible,
                dropped,
                "Quota limit reached; dropping excess sources"
            );
        }
        sources.truncate(admissible);

        let batch = self.inner.pipeline.prepare(sources, collection_id).await?;
        let mut outcome = IngestOutcome {
            admitted: Vec::with_capacity(batch.items.len()),
            dropped_by_quota: dropped,
            failures: batch.failures,
        };
        if batch.items.is_empty() {
            return Ok(outcome);
        }

        let (plan, used) = {
            let mut state = self.inner.state.write().await;
            for prepared in batch.items {
                let id = prepared.item.id;
                outcome.admitted.push(id);
                state.handles.insert(id, prepared.handle);
                state.items.push(prepared.item);
            }
            state.resort();
            state.quota.commit(outcome.admitted.len() as i64);
            (state.plan(true, true)?, state.quota.used())
        };

        tracing::info!(
            collection = %collection_id,
            admitted = outcome.admitted.len(),
            failed = outcome.failures.len(),
            quota_used = used,
            "Committed ingestion batch"
        );

        self.persist(plan).await?;
        self.emit(CatalogEvent::ItemsAdded {
            item_ids: outcome.admitted.clone(),
            quota_used: used,
            timestamp: time::now(),
        });
        self.emit_quota().await;

        Ok(outcome)
    }

    /// Remove one item by id, releasing its handle
    ///
    /// Quota usage is not refunded. Other items with the same path are kept.
    pub async fn delete(&self, id: Uuid) -> CatalogResult<()> {
        let plan = {
            let mut state = self.inner.state.write().await;
            let index = state.position(id).ok_or(CatalogError::NotFound(id))?;
            if let Some(handle) = state.handles.remove(&id) {
                handle.release();
            }
            state.items.remove(index);
            state.plan(true, false)?
        };

        tracing::debug!(item_id = %id, "Deleted item");
        self.persist(plan).await?;
        self.emit(CatalogEvent::ItemRemoved {
            item_id: id,
            timestamp: time::now(),
        });
        Ok(())
    }

    /// Set the display name of an item
    pub async fn rename(&self, id: Uuid, new_name: &str) -> CatalogResult<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(mcat_common::Error::InvalidInput("name must not be empty".to_string()).into());
        }

        let plan = {
            let mut state = self.inner.state.write().await;
            let index = state.position(id).ok_or(CatalogError::NotFound(id))?;
            state.items[index].renamed_to = Some(new_name.to_string());
            state.resort();
            state.plan(true, false)?
        };

        tracing::debug!(item_id = %id, name = %new_name, "Renamed item");
        self.persist(plan).await?;
        self.emit_updated(id, "renamed");
        Ok(())
    }

    /// Rename an item to its analysis suggestion
    ///
    /// Returns the applied name, or None when there is no suggestion.
    pub async fn apply_suggested_rename(&self, id: Uuid) -> CatalogResult<Option<String>> {
        let suggestion = {
            let state = self.inner.state.read().await;
            let item = state
                .items
                .iter()
                .find(|item| item.id == id)
                .ok_or(CatalogError::NotFound(id))?;
            item.analysis
                .as_ref()
                .and_then(|a| a.suggested_rename())
                .map(str::to_string)
        };

        match suggestion {
            Some(name) => {
                self.rename(id, &name).await?;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    /// Run analysis again for one item and replace its result
    pub async fn reanalyze(&self, id: Uuid) -> CatalogResult<()> {
        let _gate = self.inner.ingest_gate.lock().await;

        let request = {
            let state = self.inner.state.read().await;
            let item = state
                .items
                .iter()
                .find(|item| item.id == id)
                .ok_or(CatalogError::NotFound(id))?;
            let path = item
                .durable_path
                .as_ref()
                .ok_or_else(|| CatalogError::PathClassification {
                    reference: item.legacy_ref.clone().unwrap_or_default(),
                    reason: "item has no durable path".to_string(),
                })?;
            AnalysisRequest {
                durable_path: path.as_path().to_path_buf(),
                name: item.name.clone(),
                mime_type: item.mime_type.clone(),
                size_bytes: Some(item.size_bytes),
            }
        };

        self.set_busy(true).await;
        let result = match self.inner.analysis.analyze(std::slice::from_ref(&request)).await {
            Ok(mut analyses) if analyses.len() == 1 => Ok(analyses.remove(0)),
            Ok(analyses) => Err(CatalogError::AnalysisMismatch {
                expected: 1,
                actual: analyses.len(),
            }),
            Err(e) => Err(e),
        };
        let applied = match result {
            Ok(analysis) => self.apply_analysis(id, analysis).await,
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "Re-analysis failed");
                Err(e)
            }
        };
        self.set_busy(false).await;

        applied
    }

    async fn apply_analysis(&self, id: Uuid, analysis: crate::models::MediaAnalysis) -> CatalogResult<()> {
        let plan = {
            let mut state = self.inner.state.write().await;
            let index = state.position(id).ok_or(CatalogError::NotFound(id))?;
            state.items[index].analysis = Some(analysis);
            state.plan(true, false)?
        };
        self.persist(plan).await?;
        self.emit_updated(id, "reanalyzed");
        Ok(())
    }

    /// Remove every item, releasing all handles first
    ///
    /// Returns the number of items removed. Quota usage is kept.
    pub async fn clear_all(&self) -> CatalogResult<usize> {
        let (removed, plan) = {
            let mut state = self.inner.state.write().await;
            for (_, handle) in state.handles.drain() {
                handle.release();
            }
            let removed = state.items.len();
            state.items.clear();
            (removed, state.plan(true, false)?)
        };

        tracing::info!(removed, "Cleared catalog");
        self.persist(plan).await?;
        self.emit(CatalogEvent::CatalogCleared {
            removed,
            timestamp: time::now(),
        });
        Ok(removed)
    }

    /// Change the ordering and re-sort
    pub async fn set_sort_key(&self, key: SortKey) -> CatalogResult<()> {
        let plan = {
            let mut state = self.inner.state.write().await;
            state.sort_key = key;
            state.resort();
            state.plan(true, false)?
        };
        self.persist(plan).await?;
        self.emit(CatalogEvent::CatalogReordered {
            sort_key: key.to_string(),
            timestamp: time::now(),
        });
        Ok(())
    }

    /// Move `ids` to the front in the given order and switch to manual order
    ///
    /// Items not listed keep their relative order after the listed ones.
    pub async fn reorder(&self, ids: &[Uuid]) -> CatalogResult<()> {
        let plan = {
            let mut state = self.inner.state.write().await;
            if let Some(missing) = ids.iter().find(|id| state.position(**id).is_none()) {
                return Err(CatalogError::NotFound(*missing));
            }

            let mut rest = std::mem::take(&mut state.items);
            let mut ordered = Vec::with_capacity(rest.len());
            for id in ids {
                if let Some(pos) = rest.iter().position(|item| item.id == *id) {
                    ordered.push(rest.remove(pos));
                }
            }
            ordered.extend(rest);
            state.items = ordered;
            state.sort_key = SortKey::Manual;
            state.plan(true, false)?
        };
        self.persist(plan).await?;
        self.emit(CatalogEvent::CatalogReordered {
            sort_key: SortKey::Manual.to_string(),
            timestamp: time::now(),
        });
        Ok(())
    }

    /// Spawn load-time rehydration
    ///
    /// Items are repaired concurrently; the store becomes ready when the
    /// returned task finishes.
    pub fn start_rehydration(&self) -> JoinHandle<CatalogResult<RehydrationReport>> {
        RehydrationEngine::new(
            self.clone(),
            self.inner.registry.clone(),
            Arc::clone(&self.inner.fs),
            Arc::clone(&self.inner.stager),
        )
        .spawn()
    }

    // ------------------------------------------------------------------
    // Rehydration hooks
    // ------------------------------------------------------------------

    /// Items with no live handle
    pub(crate) async fn rehydration_targets(&self) -> Vec<RehydrationTarget> {
        let state = self.inner.state.read().await;
        state
            .items
            .iter()
            .filter(|item| !state.handles.contains_key(&item.id))
            .map(|item| RehydrationTarget {
                id: item.id,
                name: item.name.clone(),
                durable_path: item.durable_path.clone(),
                legacy_ref: item.legacy_ref.clone(),
            })
            .collect()
    }

    pub(crate) async fn contains(&self, id: Uuid) -> bool {
        self.inner.state.read().await.position(id).is_some()
    }

    /// Install `handle` on item `id`, then release any previous handle
    ///
    /// With `migrated_to`, the item's path is rewritten and its legacy
    /// reference cleared; the returned plan must be persisted. If the item
    /// no longer exists the handle is given back untouched.
    pub(crate) async fn install_handle(
        &self,
        id: Uuid,
        handle: TransientHandle,
        migrated_to: Option<DurablePath>,
    ) -> Result<Option<PersistPlan>, TransientHandle> {
        let mut state = self.inner.state.write().await;
        let Some(index) = state.position(id) else {
            return Err(handle);
        };

        let item = &mut state.items[index];
        item.transient_handle = Some(handle.id());
        let sized = item.size_bytes == 0 && !handle.is_empty();
        if sized {
            item.size_bytes = handle.len() as u64;
        }
        let migrated = migrated_to.is_some();
        if let Some(path) = migrated_to {
            item.durable_path = Some(path);
            item.legacy_ref = None;
        }
        // Written once by finish_rehydration
        state.snapshot_stale |= sized;

        if let Some(previous) = state.handles.insert(id, handle) {
            previous.release();
        }

        if !migrated {
            return Ok(None);
        }
        match state.plan(true, false) {
            Ok(plan) => Ok(Some(plan)),
            Err(e) => {
                tracing::error!(item_id = %id, error = %e, "Failed to encode snapshot after migration");
                Ok(None)
            }
        }
    }

    /// Mark the store ready and rewrite an outdated snapshot
    pub(crate) async fn finish_rehydration(&self, report: &RehydrationReport) -> CatalogResult<()> {
        let plan = {
            let mut state = self.inner.state.write().await;
            state.ready = true;
            if state.snapshot_stale {
                state.snapshot_stale = false;
                Some(state.plan(true, false)?)
            } else {
                None
            }
        };
        if let Some(plan) = plan {
            tracing::info!("Rewriting catalog snapshot in current format");
            self.persist(plan).await?;
        }

        self.emit(CatalogEvent::RehydrationCompleted {
            restored: report.restored,
            migrated: report.migrated,
            unrecoverable: report.unrecoverable,
            discarded: report.discarded,
            timestamp: time::now(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Write a plan unless a newer revision already landed
    pub(crate) async fn persist(&self, plan: PersistPlan) -> CatalogResult<()> {
        let mut cursor = self.inner.persisted.lock().await;

        // Quota first: a crash between the two writes over-counts usage
        // rather than handing out admissions twice
        if let Some(quota) = plan.quota {
            if plan.revision > cursor.quota {
                self.inner.persistence.set(QUOTA_KEY, quota).await?;
                cursor.quota = plan.revision;
            }
        }
        if let Some(catalog) = plan.catalog {
            if plan.revision > cursor.catalog {
                self.inner.persistence.set(CATALOG_KEY, catalog).await?;
                cursor.catalog = plan.revision;
            } else {
                tracing::trace!(revision = plan.revision, "Skipping superseded snapshot");
            }
        }
        Ok(())
    }

    async fn set_busy(&self, busy: bool) {
        self.inner.state.write().await.busy = busy;
        self.emit(CatalogEvent::BusyChanged {
            busy,
            timestamp: time::now(),
        });
    }

    async fn emit_quota(&self) {
        let (used, monthly_cap) = {
            let state = self.inner.state.read().await;
            (state.quota.used(), state.quota.monthly_cap())
        };
        self.emit(CatalogEvent::QuotaChanged {
            used,
            monthly_cap,
            timestamp: time::now(),
        });
    }

    fn emit_updated(&self, id: Uuid, change: &str) {
        self.emit(CatalogEvent::ItemUpdated {
            item_id: id,
            change: change.to_string(),
            timestamp: time::now(),
        });
    }

    fn emit(&self, event: CatalogEvent) {
        tracing::trace!(event = event.event_type(), "Emitting catalog event");
        self.inner.events.emit_lossy(event);
    }
}
