//! Late-Join Reconciler.
//!
//! Shared per-choice presentation objects (one per catalog entry) are
//! created once per session. A client initializing after others first looks
//! for existing objects and attaches to them; only keys still missing when
//! the timeout expires are created locally. Creation goes through
//! [`SharedObjectRegistry::get_or_create`], so two clients racing past the
//! timeout still end up with a single object per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use muster_core::{CatalogKind, SelectionCatalog};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::collaborators::SelectionPresentation;

/// Default time a late joiner waits for existing shared objects.
pub const DEFAULT_RECONCILE_TIMEOUT_MS: u64 = 2000;

/// Identifies the shared object for one catalog choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedObjectKey {
    pub kind: CatalogKind,
    pub index: usize,
}

impl SharedObjectKey {
    /// One key per entry of both catalog lists, characters first.
    pub fn for_catalog(catalog: &SelectionCatalog) -> Vec<Self> {
        let characters = catalog.characters().iter().map(|e| Self {
            kind: CatalogKind::Character,
            index: e.index,
        });
        let pets = catalog.pets().iter().map(|e| Self {
            kind: CatalogKind::Pet,
            index: e.index,
        });
        characters.chain(pets).collect()
    }
}

/// Handle to a shared presentation object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedObjectId(pub u64);

// ============================================================================
// Registry
// ============================================================================

/// Session-wide directory of shared selection objects.
#[derive(Debug, Default)]
pub struct SharedObjectRegistry {
    objects: Mutex<HashMap<SharedObjectKey, SharedObjectId>>,
    next_id: AtomicU64,
    changed: Notify,
}

impl SharedObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, key: SharedObjectKey) -> Option<SharedObjectId> {
        self.objects().get(&key).copied()
    }

    /// Return the existing object for `key`, or create it.
    ///
    /// The boolean is `true` when this call created the object.
    pub fn get_or_create(&self, key: SharedObjectKey) -> (SharedObjectId, bool) {
        let (id, created) = {
            let mut objects = self.objects();
            match objects.get(&key) {
                Some(&id) => (id, false),
                None => {
                    let id = SharedObjectId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
                    objects.insert(key, id);
                    (id, true)
                }
            }
        };
        if created {
            self.changed.notify_waiters();
        }
        (id, created)
    }

    /// Wait until an object exists for `key`.
    pub async fn wait_for(&self, key: SharedObjectKey) -> SharedObjectId {
        loop {
            // Registered before the lookup so an insert in between is not missed.
            let notified = self.changed.notified();
            if let Some(id) = self.find(key) {
                return id;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    /// Drop every object. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut objects = self.objects();
        let removed = objects.len();
        objects.clear();
        removed
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<SharedObjectKey, SharedObjectId>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`SelectionPresentation`] backed by a [`SharedObjectRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryPresentation {
    registry: Arc<SharedObjectRegistry>,
    keys: Vec<SharedObjectKey>,
}

impl RegistryPresentation {
    pub fn new(registry: Arc<SharedObjectRegistry>, catalog: &SelectionCatalog) -> Self {
        Self {
            registry,
            keys: SharedObjectKey::for_catalog(catalog),
        }
    }

    pub fn registry(&self) -> &Arc<SharedObjectRegistry> {
        &self.registry
    }
}

impl SelectionPresentation for RegistryPresentation {
    fn ensure_shared_objects_spawned(&self) {
        let created = self
            .keys
            .iter()
            .filter(|key| self.registry.get_or_create(**key).1)
            .count();
        if created > 0 {
            tracing::debug!(target: "muster::reconcile", created, "shared selection objects spawned");
        }
    }

    fn teardown_selection_ui(&self) {
        let removed = self.registry.clear();
        tracing::debug!(target: "muster::reconcile", removed, "shared selection objects released");
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// What a late joiner ended up with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Keys that already existed (or were created by someone else first).
    pub attached: Vec<(SharedObjectKey, SharedObjectId)>,
    /// Keys this client created after the timeout.
    pub created: Vec<(SharedObjectKey, SharedObjectId)>,
}

impl ReconcileReport {
    pub fn object(&self, key: SharedObjectKey) -> Option<SharedObjectId> {
        self.attached
            .iter()
            .chain(&self.created)
            .find(|(k, _)| *k == key)
            .map(|(_, id)| *id)
    }
}

/// Attaches a newly initializing client to existing shared objects.
#[derive(Debug, Clone)]
pub struct LateJoinReconciler {
    registry: Arc<SharedObjectRegistry>,
    timeout: Duration,
}

impl LateJoinReconciler {
    pub fn new(registry: Arc<SharedObjectRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Resolve every key, waiting at most `timeout` in total.
    pub async fn reconcile(&self, keys: &[SharedObjectKey]) -> ReconcileReport {
        let deadline = Instant::now() + self.timeout;
        let mut report = ReconcileReport::default();

        for &key in keys {
            match tokio::time::timeout_at(deadline, self.registry.wait_for(key)).await {
                Ok(id) => report.attached.push((key, id)),
                Err(_) => {
                    let (id, created) = self.registry.get_or_create(key);
                    if created {
                        report.created.push((key, id));
                    } else {
                        report.attached.push((key, id));
                    }
                }
            }
        }

        tracing::debug!(
            target: "muster::reconcile",
            attached = report.attached.len(),
            created = report.created.len(),
            "late join reconciled"
        );
        report
    }
}
