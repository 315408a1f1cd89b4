//! Single-entry inline cache: one prior property resolution against one
//! shape.
//!
//! A cache holds exactly one populated kind at a time:
//!
//! - **Local**: the property lives directly on the receiver. Optionally
//!   records the receiver's *pre-addition* shape, which lets a write site
//!   replay an add-property transition without a full resolve.
//! - **Proto**: the property was found on an ancestor; the cache pins the
//!   ancestor instance and the slot on it.
//! - **Accessor**: a getter/setter pair, found on the receiver or an
//!   ancestor.
//!
//! Population overwrites whatever kind was there before. Matching is by
//! shape identity only — never structural equality — so a hit costs one
//! id comparison.
//!
//! Registration contract: a cache registers with the invalidation
//! registry exactly when its validity is not fully captured by the
//! receiver's shape identity — Proto kind, ancestor accessors, and Local
//! kind carrying a pre-addition shape. Receiver-only Local entries need no
//! registration: no mutation elsewhere can falsify them without changing
//! the receiver's own shape reference.

use std::sync::Arc;

use opal_core::intern::PropertyName;
use parking_lot::Mutex;

use opal_runtime::object::descriptor::SlotRef;
use opal_runtime::object::dyn_object::ObjectRef;
use opal_runtime::object::shape::{Shape, ShapeId};
use opal_runtime::value::FunctionRef;

use crate::invalidation::{InvalidationRegistry, RegistrationClass};

// =============================================================================
// Cache Kinds
// =============================================================================

/// The tagged union of cached resolutions.
#[derive(Debug, Clone)]
pub enum CacheKind {
    /// Nothing cached.
    Empty,
    /// Property lives directly on the receiver.
    Local {
        /// Matched receiver shape.
        shape: Arc<Shape>,
        /// Slot on the receiver.
        slot: SlotRef,
        /// The receiver's shape before the property was added, when this
        /// entry was populated by an add-property write.
        pre_shape: Option<Arc<Shape>>,
    },
    /// Property found on an ancestor.
    Proto {
        /// Matched receiver shape.
        shape: Arc<Shape>,
        /// The ancestor holding the property.
        holder: ObjectRef,
        /// Slot on the holder.
        slot: SlotRef,
    },
    /// Accessor property, on the receiver or an ancestor.
    Accessor {
        /// Matched receiver shape.
        shape: Arc<Shape>,
        /// The ancestor holding the accessor, when not on the receiver.
        holder: Option<ObjectRef>,
        /// The getter, if any.
        getter: Option<FunctionRef>,
        /// The setter, if any.
        setter: Option<FunctionRef>,
        /// Whether the accessor was found on the receiver itself.
        on_receiver: bool,
    },
}

impl CacheKind {
    fn matched_shape_id(&self) -> Option<ShapeId> {
        match self {
            CacheKind::Empty => None,
            CacheKind::Local { shape, .. }
            | CacheKind::Proto { shape, .. }
            | CacheKind::Accessor { shape, .. } => Some(shape.id()),
        }
    }
}

/// Payload of an accessor-kind hit.
#[derive(Debug, Clone)]
pub struct AccessorHit {
    /// The getter, if any.
    pub getter: Option<FunctionRef>,
    /// The setter, if any.
    pub setter: Option<FunctionRef>,
    /// The ancestor holding the accessor, when not on the receiver.
    pub holder: Option<ObjectRef>,
    /// Whether the accessor lives on the receiver itself.
    pub on_receiver: bool,
}

/// Snapshot of one cache's hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Probe hits.
    pub hits: u64,
    /// Probe misses.
    pub misses: u64,
}

// =============================================================================
// Cache Cell
// =============================================================================

struct CacheState {
    kind: CacheKind,
    /// Name and class this cell is currently registered under, if any.
    registration: Option<(PropertyName, RegistrationClass)>,
    hits: u64,
    misses: u64,
}

/// The shared unit the invalidation registry holds weak back-references
/// to. Owners hold it through `PropertyCache`.
pub struct CacheCell {
    state: Mutex<CacheState>,
}

impl CacheCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                kind: CacheKind::Empty,
                registration: None,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Empty the cell without touching the registry. Used by the registry
    /// itself, which has already removed the back-reference.
    pub(crate) fn clear_without_unregister(&self) {
        let mut state = self.state.lock();
        state.kind = CacheKind::Empty;
        state.registration = None;
    }
}

impl std::fmt::Debug for CacheCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CacheCell")
            .field("shape", &state.kind.matched_shape_id())
            .finish()
    }
}

// =============================================================================
// Property Cache
// =============================================================================

/// Per-call-site single-entry inline cache handle.
#[derive(Clone)]
pub struct PropertyCache {
    cell: Arc<CacheCell>,
}

impl PropertyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: Arc::new(CacheCell::new()),
        }
    }

    /// The shared cell, for registry registration.
    #[must_use]
    pub fn cell(&self) -> &Arc<CacheCell> {
        &self.cell
    }

    /// Check if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.cell.state.lock().kind, CacheKind::Empty)
    }

    /// The shape id this cache would hit on, if populated.
    #[must_use]
    pub fn cached_shape_id(&self) -> Option<ShapeId> {
        self.cell.state.lock().kind.matched_shape_id()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.cell.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
        }
    }

    // -------------------------------------------------------------------------
    // Probes
    // -------------------------------------------------------------------------

    /// Local-kind probe: hit iff the Local kind is populated and its
    /// matched shape equals `shape_id`.
    #[must_use]
    pub fn try_local(&self, shape_id: ShapeId) -> Option<SlotRef> {
        let mut state = self.cell.state.lock();
        match &state.kind {
            CacheKind::Local { shape, slot, .. } if shape.id() == shape_id => {
                let slot = *slot;
                state.hits += 1;
                Some(slot)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Write-transition probe: hit iff the Local kind carries a
    /// pre-addition shape equal to `pre_shape_id`. Returns the
    /// post-addition shape and the new property's slot.
    #[must_use]
    pub fn try_set_with_transition(
        &self,
        pre_shape_id: ShapeId,
    ) -> Option<(Arc<Shape>, SlotRef)> {
        let mut state = self.cell.state.lock();
        match &state.kind {
            CacheKind::Local {
                shape,
                slot,
                pre_shape: Some(pre),
            } if pre.id() == pre_shape_id => {
                let result = (Arc::clone(shape), *slot);
                state.hits += 1;
                Some(result)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Proto-kind probe. Returns the ancestor instance and its slot.
    #[must_use]
    pub fn try_proto(&self, shape_id: ShapeId) -> Option<(ObjectRef, SlotRef)> {
        let mut state = self.cell.state.lock();
        match &state.kind {
            CacheKind::Proto {
                shape,
                holder,
                slot,
            } if shape.id() == shape_id => {
                let result = (holder.clone(), *slot);
                state.hits += 1;
                Some(result)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Accessor-kind probe.
    #[must_use]
    pub fn try_accessor(&self, shape_id: ShapeId) -> Option<AccessorHit> {
        let mut state = self.cell.state.lock();
        match &state.kind {
            CacheKind::Accessor {
                shape,
                holder,
                getter,
                setter,
                on_receiver,
            } if shape.id() == shape_id => {
                let hit = AccessorHit {
                    getter: getter.clone(),
                    setter: setter.clone(),
                    holder: holder.clone(),
                    on_receiver: *on_receiver,
                };
                state.hits += 1;
                Some(hit)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Population
    // -------------------------------------------------------------------------

    /// Populate the Local kind.
    ///
    /// Registers under `name` in the store-field class iff a pre-addition
    /// shape is recorded; receiver-only entries are valid by shape
    /// identity alone.
    pub fn cache_local(
        &self,
        registry: &InvalidationRegistry,
        name: &PropertyName,
        shape: Arc<Shape>,
        slot: SlotRef,
        pre_shape: Option<Arc<Shape>>,
    ) {
        // A cached shape may now outlive its object.
        shape.mark_layout_shared();
        if let Some(pre) = &pre_shape {
            pre.mark_layout_shared();
        }
        let registration = pre_shape
            .is_some()
            .then(|| (name.clone(), RegistrationClass::StoreField));
        self.replace(
            registry,
            CacheKind::Local {
                shape,
                slot,
                pre_shape,
            },
            registration,
        );
    }

    /// Populate the Proto kind. Always registers (proto class).
    pub fn cache_proto(
        &self,
        registry: &InvalidationRegistry,
        name: &PropertyName,
        shape: Arc<Shape>,
        holder: ObjectRef,
        slot: SlotRef,
    ) {
        shape.mark_layout_shared();
        self.replace(
            registry,
            CacheKind::Proto {
                shape,
                holder,
                slot,
            },
            Some((name.clone(), RegistrationClass::Proto)),
        );
    }

    /// Populate the Accessor kind. Registers (proto class) iff the
    /// accessor lives on an ancestor.
    pub fn cache_accessor(
        &self,
        registry: &InvalidationRegistry,
        name: &PropertyName,
        shape: Arc<Shape>,
        holder: Option<ObjectRef>,
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
        on_receiver: bool,
    ) {
        shape.mark_layout_shared();
        let registration =
            (!on_receiver).then(|| (name.clone(), RegistrationClass::Proto));
        self.replace(
            registry,
            CacheKind::Accessor {
                shape,
                holder,
                getter,
                setter,
                on_receiver,
            },
            registration,
        );
    }

    /// Empty the cache and unregister it.
    pub fn clear(&self, registry: &InvalidationRegistry) {
        self.replace(registry, CacheKind::Empty, None);
    }

    /// Swap in a new kind/registration, then fix up the registry outside
    /// the cell lock.
    fn replace(
        &self,
        registry: &InvalidationRegistry,
        kind: CacheKind,
        registration: Option<(PropertyName, RegistrationClass)>,
    ) {
        let old = {
            let mut state = self.cell.state.lock();
            state.kind = kind;
            std::mem::replace(&mut state.registration, registration.clone())
        };
        if let Some((name, class)) = old {
            registry.unregister(class, &name, &self.cell);
        }
        if let Some((name, class)) = registration {
            registry.register(class, name, Arc::downgrade(&self.cell));
        }
    }
}

impl Default for PropertyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PropertyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyCache")
            .field("shape", &self.cached_shape_id())
            .finish()
    }
}
