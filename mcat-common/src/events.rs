//! Event types for the mcat event system
//!
//! Provides the shared event definitions and EventBus used by the catalog
//! store to notify observers (CLI, UI bridges, tests) about state changes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Catalog event types
///
/// Events are broadcast via EventBus and can be serialized for transport.
/// All store notifications use this central enum for exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CatalogEvent {
    /// An ingestion batch was committed
    ///
    /// Emitted once per batch, after both the catalog append and the quota
    /// increment are visible.
    ItemsAdded {
        /// Ids of the committed items, in catalog order
        item_ids: Vec<Uuid>,
        /// Quota usage after the commit
        quota_used: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item was deleted by id
    ItemRemoved {
        item_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An item changed in place (rename, re-analysis, handle install, migration)
    ItemUpdated {
        item_id: Uuid,
        /// What changed ("renamed", "reanalyzed", "rehydrated", "migrated")
        change: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All items were removed
    CatalogCleared {
        /// Number of items removed
        removed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Catalog order changed (sort key or manual reorder)
    CatalogReordered {
        sort_key: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Quota usage or cycle changed
    QuotaChanged {
        used: u64,
        /// None = unlimited
        monthly_cap: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Busy flag toggled (ingestion started or finished)
    BusyChanged {
        busy: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Load-time rehydration finished for every item
    RehydrationCompleted {
        restored: usize,
        migrated: usize,
        unrecoverable: usize,
        discarded: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CatalogEvent {
    /// Event type name (matches the serde tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            CatalogEvent::ItemsAdded { .. } => "ItemsAdded",
            CatalogEvent::ItemRemoved { .. } => "ItemRemoved",
            CatalogEvent::ItemUpdated { .. } => "ItemUpdated",
            CatalogEvent::CatalogCleared { .. } => "CatalogCleared",
            CatalogEvent::CatalogReordered { .. } => "CatalogReordered",
            CatalogEvent::QuotaChanged { .. } => "QuotaChanged",
            CatalogEvent::BusyChanged { .. } => "BusyChanged",
            CatalogEvent::RehydrationCompleted { .. } => "RehydrationCompleted",
        }
    }
}

/// Broadcast bus for [`CatalogEvent`]s
///
/// Cloning is cheap; all clones share one channel.
///
/// # Examples
///
/// ```
/// use mcat_common::events::{CatalogEvent, EventBus};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
/// bus.emit_lossy(CatalogEvent::BusyChanged {
///     busy: true,
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CatalogEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CatalogEvent,
    ) -> Result<usize, broadcast::error::SendError<CatalogEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CatalogEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
