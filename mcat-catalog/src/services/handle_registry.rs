//! Transient handle registry
//!
//! Process-local table of decoded media bytes, addressed by object-URL style
//! references (`blob:mcat/<uuid>`). A [`TransientHandle`] is the owning
//! guard for one entry: it cannot be cloned, and the entry is removed exactly
//! once, when the guard is released or dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const REFERENCE_PREFIX: &str = "blob:mcat/";

/// Identifier of a live handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Object-URL style reference for this handle
    pub fn reference(&self) -> String {
        format!("{}{}", REFERENCE_PREFIX, self.0)
    }

    /// Parse a reference produced by [`HandleId::reference`]
    pub fn from_reference(reference: &str) -> Option<Self> {
        reference
            .strip_prefix(REFERENCE_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .map(HandleId)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}

type Entries = HashMap<HandleId, Arc<[u8]>>;

/// Shared registry of live handles
#[derive(Clone, Default)]
pub struct HandleRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mint a handle over `bytes`
    pub fn acquire(&self, bytes: Vec<u8>) -> TransientHandle {
        let id = HandleId(Uuid::new_v4());
        let len = bytes.len();
        self.lock().insert(id, Arc::from(bytes));
        tracing::trace!(handle = %id, len, "Acquired transient handle");
        TransientHandle {
            id,
            len,
            registry: self.clone(),
        }
    }

    /// Bytes behind a live handle
    pub fn bytes(&self, id: &HandleId) -> Option<Arc<[u8]>> {
        self.lock().get(id).cloned()
    }

    /// Resolve an object-URL style reference to live bytes
    pub fn resolve_reference(&self, reference: &str) -> Option<Arc<[u8]>> {
        HandleId::from_reference(reference).and_then(|id| self.bytes(&id))
    }

    /// Number of handles not yet released
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_live(&self, id: &HandleId) -> bool {
        self.lock().contains_key(id)
    }

    fn remove(&self, id: &HandleId) {
        if self.lock().remove(id).is_none() {
            tracing::warn!(handle = %id, "Transient handle released twice");
        }
    }
}

/// Owning guard for one registry entry
///
/// Releasing consumes the guard, so a handle is released at most once;
/// dropping an unreleased guard releases it.
#[derive(Debug)]
pub struct TransientHandle {
    id: HandleId,
    len: usize,
    registry: HandleRegistry,
}

impl TransientHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Byte length at acquisition
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.registry.bytes(&self.id)
    }

    /// Release the underlying bytes
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for TransientHandle {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
        tracing::trace!(handle = %self.id, "Released transient handle");
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}
