//! Invalidation registry: per-name back-references to dependent caches.
//!
//! The registry maps a property name to the set of caches whose cached
//! fact depends on that name's prototype-chain state. It is a non-owning
//! observation relationship: entries are weak back-references, a cache may
//! be discarded by its owner at any time, and the registry skips (and
//! prunes) dead entries instead of assuming they live.
//!
//! Two registration classes:
//! - **Proto**: the cache depends on a property found on an ancestor
//!   (Proto-kind entries and ancestor-accessor entries).
//! - **StoreField**: the cache holds a not-yet-finalized add-property
//!   transition (Local kind with a recorded pre-addition shape). These are
//!   conservatively cleared wholesale when any prototype link is
//!   rewritten.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use opal_core::intern::PropertyName;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::inline_cache::CacheCell;

/// Which dependency class a cache registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationClass {
    /// Depends on an ancestor's property state.
    Proto,
    /// Depends on a pending add-property transition.
    StoreField,
}

/// Snapshot of registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Names with at least one proto-class registration.
    pub proto_names: usize,
    /// Names with at least one store-field-class registration.
    pub store_field_names: usize,
    /// Total registrations ever made.
    pub registered: u64,
    /// Total caches cleared through invalidation.
    pub invalidated: u64,
}

/// Per-execution-context registry of cache back-references.
pub struct InvalidationRegistry {
    proto: RwLock<FxHashMap<PropertyName, Vec<Weak<CacheCell>>>>,
    store_field: RwLock<FxHashMap<PropertyName, Vec<Weak<CacheCell>>>>,
    registered: AtomicU64,
    invalidated: AtomicU64,
}

impl InvalidationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            proto: RwLock::new(FxHashMap::default()),
            store_field: RwLock::new(FxHashMap::default()),
            registered: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    fn table(
        &self,
        class: RegistrationClass,
    ) -> &RwLock<FxHashMap<PropertyName, Vec<Weak<CacheCell>>>> {
        match class {
            RegistrationClass::Proto => &self.proto,
            RegistrationClass::StoreField => &self.store_field,
        }
    }

    /// Register a cache under a name.
    pub fn register(&self, class: RegistrationClass, name: PropertyName, cell: Weak<CacheCell>) {
        self.table(class).write().entry(name).or_default().push(cell);
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove one cache's registration under a name, if present.
    pub fn unregister(&self, class: RegistrationClass, name: &PropertyName, cell: &Arc<CacheCell>) {
        let mut table = self.table(class).write();
        if let Some(entries) = table.get_mut(name) {
            entries.retain(|weak| !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(cell)));
            if entries.is_empty() {
                table.remove(name);
            }
        }
    }

    /// Clear and deregister every live cache registered under `name`, in
    /// both classes.
    pub fn invalidate(&self, name: &PropertyName) {
        for class in [RegistrationClass::Proto, RegistrationClass::StoreField] {
            let entries = self.table(class).write().remove(name);
            let Some(entries) = entries else { continue };
            for weak in entries {
                if let Some(cell) = weak.upgrade() {
                    cell.clear_without_unregister();
                    self.invalidated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Conservative prototype-rewrite path: clear every store-field-class
    /// registration regardless of name.
    pub fn invalidate_all_store_field(&self) {
        let drained: Vec<Vec<Weak<CacheCell>>> = {
            let mut table = self.store_field.write();
            table.drain().map(|(_, entries)| entries).collect()
        };
        for entries in drained {
            for weak in entries {
                if let Some(cell) = weak.upgrade() {
                    cell.clear_without_unregister();
                    self.invalidated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Drop dead weak references.
    pub fn prune(&self) {
        for table in [&self.proto, &self.store_field] {
            let mut table = table.write();
            table.retain(|_, entries| {
                entries.retain(|weak| weak.strong_count() > 0);
                !entries.is_empty()
            });
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            proto_names: self.proto.read().len(),
            store_field_names: self.store_field.read().len(),
            registered: self.registered.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
        }
    }
}

impl Default for InvalidationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InvalidationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("InvalidationRegistry")
            .field("proto_names", &stats.proto_names)
            .field("store_field_names", &stats.store_field_names)
            .finish()
    }
}
