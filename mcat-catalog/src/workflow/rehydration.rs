//! Load-time rehydration
//!
//! Transient handles do not survive a restart. After a snapshot is loaded,
//! every item without a live handle is repaired concurrently:
//!
//! 1. Durable path readable: read the bytes and mint a handle.
//! 2. Otherwise, legacy reference present: decode it, stage the bytes to a
//!    new durable path, mint a handle and rewrite the item (migration).
//! 3. Otherwise the item is kept without a handle and reported.
//!
//! Results are applied as they complete. Each apply re-checks that the item
//! still exists; a result for a deleted item is discarded and its fresh
//! handle released.

use crate::error::CatalogResult;
use crate::models::DurablePath;
use crate::services::file_system::FileSystemAccess;
use crate::services::handle_registry::{HandleRegistry, TransientHandle};
use crate::services::legacy_decoder;
use crate::services::path_resolver::truncate_for_log;
use crate::services::resource_stager::ResourceStager;
use crate::store::CatalogStore;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Counts from one rehydration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RehydrationReport {
    /// Handle rebuilt from the existing durable path
    pub restored: usize,
    /// Legacy reference decoded and staged to a new durable path
    pub migrated: usize,
    /// Kept without a handle
    pub unrecoverable: usize,
    /// Item deleted while its rehydration was in flight
    pub discarded: usize,
}

/// What the engine needs to know about one item
#[derive(Debug, Clone)]
pub(crate) struct RehydrationTarget {
    pub id: Uuid,
    pub name: String,
    pub durable_path: Option<DurablePath>,
    pub legacy_ref: Option<String>,
}

enum Recovered {
    Restored(TransientHandle),
    Migrated {
        handle: TransientHandle,
        path: DurablePath,
    },
    Unrecoverable(String),
}

/// Rebuilds transient handles for a freshly loaded store
pub struct RehydrationEngine {
    store: CatalogStore,
    registry: HandleRegistry,
    fs: Arc<dyn FileSystemAccess>,
    stager: Arc<ResourceStager>,
}

impl RehydrationEngine {
    pub(crate) fn new(
        store: CatalogStore,
        registry: HandleRegistry,
        fs: Arc<dyn FileSystemAccess>,
        stager: Arc<ResourceStager>,
    ) -> Self {
        Self {
            store,
            registry,
            fs,
            stager,
        }
    }

    pub fn spawn(self) -> JoinHandle<CatalogResult<RehydrationReport>> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(self) -> CatalogResult<RehydrationReport> {
        let targets = self.store.rehydration_targets().await;
        tracing::info!(items = targets.len(), "Starting rehydration");

        let mut report = RehydrationReport::default();
        let mut tasks = FuturesUnordered::new();
        for target in targets {
            tasks.push(self.recover(target));
        }

        while let Some((id, recovered)) = tasks.next().await {
            match recovered {
                Recovered::Restored(handle) => {
                    match self.store.install_handle(id, handle, None).await {
                        Ok(_) => report.restored += 1,
                        Err(stale) => {
                            stale.release();
                            tracing::debug!(item_id = %id, "Item deleted during rehydration; discarding");
                            report.discarded += 1;
                        }
                    }
                }
                Recovered::Migrated { handle, path } => {
                    match self.store.install_handle(id, handle, Some(path.clone())).await {
                        Ok(plan) => {
                            tracing::info!(item_id = %id, path = %path, "Migrated legacy reference");
                            report.migrated += 1;
                            if let Some(plan) = plan {
                                if let Err(e) = self.store.persist(plan).await {
                                    tracing::error!(item_id = %id, error = %e, "Failed to persist migration");
                                }
                            }
                        }
                        Err(stale) => {
                            stale.release();
                            self.stager.discard(&path).await;
                            tracing::debug!(item_id = %id, "Item deleted during migration; discarding");
                            report.discarded += 1;
                        }
                    }
                }
                Recovered::Unrecoverable(reason) => {
                    if self.store.contains(id).await {
                        tracing::warn!(item_id = %id, reason = %reason, "Item unrecoverable; kept without handle");
                        report.unrecoverable += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
            }
        }

        tracing::info!(
            restored = report.restored,
            migrated = report.migrated,
            unrecoverable = report.unrecoverable,
            discarded = report.discarded,
            "Rehydration complete"
        );
        self.store.finish_rehydration(&report).await?;

        Ok(report)
    }

    async fn recover(&self, target: RehydrationTarget) -> (Uuid, Recovered) {
        if let Some(path) = &target.durable_path {
            match self.fs.read_file(path.as_path()).await {
                Ok(bytes) => return (target.id, Recovered::Restored(self.registry.acquire(bytes))),
                Err(e) => {
                    tracing::warn!(item_id = %target.id, path = %path, error = %e, "Durable path unreadable");
                }
            }
        }

        let Some(legacy) = target.legacy_ref.as_deref() else {
            return (
                target.id,
                Recovered::Unrecoverable("no readable durable path or legacy reference".to_string()),
            );
        };

        match self.migrate(legacy, &target.name).await {
            Ok((handle, path)) => (target.id, Recovered::Migrated { handle, path }),
            Err(e) => {
                tracing::warn!(
                    item_id = %target.id,
                    reference = %truncate_for_log(legacy),
                    error = %e,
                    "Legacy reference could not be migrated"
                );
                (target.id, Recovered::Unrecoverable(e.to_string()))
            }
        }
    }

    async fn migrate(&self, legacy: &str, name: &str) -> CatalogResult<(TransientHandle, DurablePath)> {
        let payload = legacy_decoder::decode(legacy, &self.registry)?;
        let path = self.stager.stage(&payload.bytes, name).await?;
        Ok((self.registry.acquire(payload.bytes), path))
    }
}
