//! Shapes: the identity objects that make property layouts cacheable.
//!
//! # Architecture
//!
//! An object's header references exactly one `Shape`. A shape pairs a
//! `PropertyLayout` with object-level flags and a fresh `ShapeId`; caches
//! key off shape identity, never structural equality. Objects built by the
//! identical sequence of default-attribute property additions share shapes
//! through cached transition edges:
//!
//! ```text
//!     root
//!       |
//!   +---+---+
//!   |       |
//!  "a"     "b"
//!   |       |
//!  S1      S2
//!   |
//!  "b"
//!   |
//!  S3 (a at slot 0, b at slot 1)
//! ```
//!
//! A layout cell is marked *shared* once it can be referenced by more than
//! one object or by any cache. Shared cells are never mutated in place for
//! observable changes; mutation forks a private clone and publishes a new
//! shape — publication is always the last step, so a reader holding an
//! `Arc<Shape>` never observes a half-built one.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use opal_core::error::{OpalError, OpalResult};
use opal_core::intern::PropertyName;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;

use crate::object::descriptor::{
    IndexedPropertyDescriptor, PropertyDescriptor, PropertyFlags, SlotRef,
};
use crate::object::dyn_object::{ObjectRef, WeakObjectRef};
use crate::object::indexed::IndexedElementLayout;
use crate::object::layout::{FixedSetLayout, HashedLayout, PropertyLayout, INLINE_CAPACITY};
use crate::value::FunctionRef;

// =============================================================================
// Shape ID
// =============================================================================

/// Unique identifier for a shape within one context.
///
/// Used for fast comparison and cache keying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// Get the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// =============================================================================
// Shape Flags
// =============================================================================

bitflags::bitflags! {
    /// Object-level flags carried by a shape.
    ///
    /// `IS_PROTOTYPE` and `HAS_KNOWN_SLOT0` describe the object, not the
    /// layout, and survive every transition verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u8 {
        /// New properties may be added.
        const EXTENSIBLE = 1 << 0;
        /// Sealed: no additions or deletions.
        const SEALED = 1 << 1;
        /// Frozen: sealed and no data writes.
        const FROZEN = 1 << 2;
        /// The object is used as a prototype somewhere; mutations must
        /// consult the invalidation registry.
        const IS_PROTOTYPE = 1 << 3;
        /// Slot 0 holds a known root-object binding.
        const HAS_KNOWN_SLOT0 = 1 << 4;
    }
}

// =============================================================================
// Layout Cell
// =============================================================================

/// Shared holder of one `PropertyLayout` with a fork-on-write bit.
///
/// The shared bit means "may be referenced by more than one object, or by
/// any cache". Once set it never clears, and every observable mutation of
/// the layout must go through a private fork instead.
#[derive(Debug)]
pub struct LayoutCell {
    layout: RwLock<PropertyLayout>,
    shared: AtomicBool,
}

impl LayoutCell {
    /// Create an unshared cell.
    #[must_use]
    pub fn new(layout: PropertyLayout) -> Self {
        Self {
            layout: RwLock::new(layout),
            shared: AtomicBool::new(false),
        }
    }

    /// Read access to the layout.
    pub fn read(&self) -> RwLockReadGuard<'_, PropertyLayout> {
        self.layout.read()
    }

    /// Write access to the layout. Callers must hold the fork-on-write
    /// rule: no observable mutation through a shared cell.
    pub fn write(&self) -> RwLockWriteGuard<'_, PropertyLayout> {
        self.layout.write()
    }

    /// Check the shared bit.
    #[inline]
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared.load(Ordering::Acquire)
    }

    /// Set the shared bit (sticky).
    #[inline]
    pub fn mark_shared(&self) {
        self.shared.store(true, Ordering::Release);
    }

    /// Clone the layout into a fresh, unshared cell.
    #[must_use]
    pub fn fork(&self) -> Arc<LayoutCell> {
        Arc::new(LayoutCell::new(self.layout.read().clone()))
    }
}

// =============================================================================
// Shape
// =============================================================================

/// The identity object an object's header references.
///
/// Immutable once published. Two shapes are different cache keys even when
/// structurally identical.
#[derive(Debug)]
pub struct Shape {
    id: ShapeId,
    flags: ShapeFlags,
    layout: Arc<LayoutCell>,
    /// Cached transition edges for default-attribute additions
    /// (lazily populated).
    transitions: RwLock<FxHashMap<PropertyName, Arc<Shape>>>,
}

impl Shape {
    /// This shape's identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Object-level flags.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> ShapeFlags {
        self.flags
    }

    /// Check the extensible flag.
    #[inline]
    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.flags.contains(ShapeFlags::EXTENSIBLE)
    }

    /// Check the sealed flag.
    #[inline]
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(ShapeFlags::SEALED)
    }

    /// Check the frozen flag.
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.flags.contains(ShapeFlags::FROZEN)
    }

    /// Check the prototype flag.
    #[inline]
    #[must_use]
    pub fn is_prototype(&self) -> bool {
        self.flags.contains(ShapeFlags::IS_PROTOTYPE)
    }

    /// The layout cell.
    #[inline]
    #[must_use]
    pub fn layout_cell(&self) -> &Arc<LayoutCell> {
        &self.layout
    }

    /// Mark the layout as shared (a second object or a cache now
    /// references this shape).
    pub fn mark_layout_shared(&self) {
        self.layout.mark_shared();
    }

    /// Look up a property descriptor by name (clones the descriptor).
    #[must_use]
    pub fn lookup(&self, name: &PropertyName) -> Option<PropertyDescriptor> {
        self.layout.read().lookup(name).cloned()
    }

    /// Number of cached transition edges out of this shape.
    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.transitions.read().len()
    }
}

// =============================================================================
// Shape Context
// =============================================================================

/// Snapshot of shape-context counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeStats {
    /// Shapes published so far.
    pub shapes_published: u32,
    /// Transition-edge cache hits.
    pub transition_hits: u64,
}

/// Per-execution-context shape state: the id counter, the root shape, the
/// default attribute constants, and the per-prototype root table.
///
/// Everything that would be a process-wide static lives here instead, so
/// independent execution contexts never interfere.
pub struct ShapeContext {
    next_id: AtomicU32,
    root: Arc<Shape>,
    default_flags: PropertyFlags,
    default_item_flags: PropertyFlags,
    /// Empty shapes keyed by prototype identity, so objects with the same
    /// prototype share a transition lineage and objects with different
    /// prototypes never share a shape.
    proto_roots: RwLock<FxHashMap<usize, (WeakObjectRef, Arc<Shape>)>>,
    transition_hits: AtomicU64,
}

impl ShapeContext {
    /// Create a fresh context with an empty, extensible root shape.
    #[must_use]
    pub fn new() -> Self {
        let next_id = AtomicU32::new(0);
        let cell = Arc::new(LayoutCell::new(PropertyLayout::FixedSet(
            FixedSetLayout::new(),
        )));
        // The root backs every new object.
        cell.mark_shared();
        let root = Arc::new(Shape {
            id: ShapeId(next_id.fetch_add(1, Ordering::Relaxed)),
            flags: ShapeFlags::EXTENSIBLE,
            layout: cell,
            transitions: RwLock::new(FxHashMap::default()),
        });
        Self {
            next_id,
            root,
            default_flags: PropertyFlags::data(),
            default_item_flags: PropertyFlags::data(),
            proto_roots: RwLock::new(FxHashMap::default()),
            transition_hits: AtomicU64::new(0),
        }
    }

    /// The empty root shape.
    #[must_use]
    pub fn root(&self) -> Arc<Shape> {
        Arc::clone(&self.root)
    }

    /// Default attributes for plain property additions.
    #[inline]
    #[must_use]
    pub fn default_flags(&self) -> PropertyFlags {
        self.default_flags
    }

    /// Default attributes for array elements without explicit descriptors.
    #[inline]
    #[must_use]
    pub fn default_item_flags(&self) -> PropertyFlags {
        self.default_item_flags
    }

    fn fresh_id(&self) -> ShapeId {
        ShapeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn publish(&self, flags: ShapeFlags, cell: Arc<LayoutCell>) -> Arc<Shape> {
        Arc::new(Shape {
            id: self.fresh_id(),
            flags,
            layout: cell,
            transitions: RwLock::new(FxHashMap::default()),
        })
    }

    /// A writable cell derived from a shape: the shape's own cell when it
    /// is still private, otherwise a private fork.
    fn writable_cell(&self, from: &Shape) -> Arc<LayoutCell> {
        if from.layout.is_shared() {
            from.layout.fork()
        } else {
            Arc::clone(&from.layout)
        }
    }

    /// Root shape for the language-runtime root object: a hashed layout in
    /// root-object mode with the known-slot-0 flag.
    #[must_use]
    pub fn root_object_shape(&self) -> Arc<Shape> {
        let cell = Arc::new(LayoutCell::new(PropertyLayout::Hashed(HashedLayout::new(
            INLINE_CAPACITY as u16,
            true,
        ))));
        self.publish(
            ShapeFlags::EXTENSIBLE | ShapeFlags::HAS_KNOWN_SLOT0,
            cell,
        )
    }

    /// The empty shape for objects created with a given prototype.
    ///
    /// Same prototype, same starting shape (so constructor instances share
    /// a transition lineage); different prototypes never share a shape,
    /// which keeps prototype-kind caches keyed on the receiver's shape
    /// sound.
    #[must_use]
    pub fn root_for_prototype(&self, proto: &ObjectRef) -> Arc<Shape> {
        let key = proto.as_ptr() as usize;
        {
            let roots = self.proto_roots.read();
            if let Some((weak, shape)) = roots.get(&key) {
                if weak.upgrade().is_some() {
                    return Arc::clone(shape);
                }
            }
        }
        let shape = self.publish(self.root.flags, Arc::clone(&self.root.layout));
        self.proto_roots
            .write()
            .insert(key, (proto.downgrade(), Arc::clone(&shape)));
        shape
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Add a property, publishing the successor shape and the assigned
    /// slot.
    ///
    /// Default-attribute additions on shareable fixed-set layouts reuse
    /// cached transition edges, so identical addition histories end at the
    /// identical shape. Everything else forks (if shared) or mutates the
    /// private layout, and always publishes a fresh shape.
    pub fn transition_add(
        &self,
        from: &Arc<Shape>,
        name: &PropertyName,
        flags: PropertyFlags,
    ) -> OpalResult<(Arc<Shape>, SlotRef)> {
        if !from.is_extensible() {
            return Err(OpalError::NotExtensible {
                name: name.as_str().to_string(),
            });
        }

        if flags == self.default_flags {
            if let Some(hit) = self.cached_edge(from, name) {
                return Ok(hit);
            }
            if let Some(built) = self.build_edge(from, name, flags) {
                return Ok(built);
            }
        }

        let cell = self.writable_cell(from);
        let slot = {
            let mut layout = cell.write();
            match &mut *layout {
                PropertyLayout::FixedSet(fs) => {
                    if fs.can_add(name) {
                        fs.add(name.clone(), flags)
                    } else {
                        // Capacity exceeded: convert to hashed.
                        let mut hashed = HashedLayout::from_fixed(fs, INLINE_CAPACITY as u16);
                        let slot = hashed.add(name, flags);
                        *layout = PropertyLayout::Hashed(hashed);
                        slot
                    }
                }
                PropertyLayout::Hashed(h) => h.add(name, flags),
                PropertyLayout::Indexed(ix) => ix.named_mut().add(name, flags),
            }
        };
        Ok((self.publish(from.flags, cell), slot))
    }

    fn cached_edge(
        &self,
        from: &Shape,
        name: &PropertyName,
    ) -> Option<(Arc<Shape>, SlotRef)> {
        let next = from.transitions.read().get(name).cloned()?;
        let slot = next.layout.read().lookup(name).map(|d| d.slot)?;
        self.transition_hits.fetch_add(1, Ordering::Relaxed);
        Some((next, slot))
    }

    fn build_edge(
        &self,
        from: &Arc<Shape>,
        name: &PropertyName,
        flags: PropertyFlags,
    ) -> Option<(Arc<Shape>, SlotRef)> {
        let forked = {
            let layout = from.layout.read();
            match &*layout {
                PropertyLayout::FixedSet(fs)
                    if fs.is_shareable(self.default_flags)
                        && fs.lookup(name).is_none()
                        && fs.can_add(name) =>
                {
                    Some(fs.clone())
                }
                _ => None,
            }
        };
        let mut fs = forked?;
        let slot = fs.add(name.clone(), flags);
        let cell = Arc::new(LayoutCell::new(PropertyLayout::FixedSet(fs)));
        // Any number of objects may take this edge later.
        cell.mark_shared();
        let shape = self.publish(from.flags, cell);
        from.transitions
            .write()
            .insert(name.clone(), Arc::clone(&shape));
        Some((shape, slot))
    }

    /// Delete a property.
    ///
    /// Returns `Ok(None)` when the property is absent or already deleted
    /// (idempotent success, nothing mutated); otherwise the successor
    /// shape and the tombstoned slot.
    pub fn transition_delete(
        &self,
        from: &Arc<Shape>,
        name: &PropertyName,
    ) -> OpalResult<Option<(Arc<Shape>, SlotRef)>> {
        let Some(desc) = from.lookup(name) else {
            return Ok(None);
        };
        if desc.is_deleted() {
            return Ok(None);
        }
        if !desc.flags.is_deletable() {
            return Err(OpalError::DeleteNonConfigurable {
                name: name.as_str().to_string(),
            });
        }

        let cell = self.writable_cell(from);
        let slot = {
            let mut layout = cell.write();
            match &mut *layout {
                PropertyLayout::FixedSet(fs) => {
                    if fs.len() == 1 {
                        fs.mark_sole_deleted(name).unwrap_or(desc.slot)
                    } else {
                        // Deleting from a multi-entry fixed set would shift
                        // slot indices; convert first.
                        let mut hashed = HashedLayout::from_fixed(fs, INLINE_CAPACITY as u16);
                        let slot = hashed.tombstone(name).unwrap_or(desc.slot);
                        *layout = PropertyLayout::Hashed(hashed);
                        slot
                    }
                }
                PropertyLayout::Hashed(h) => h.tombstone(name).unwrap_or(desc.slot),
                PropertyLayout::Indexed(ix) => {
                    ix.named_mut().tombstone(name).unwrap_or(desc.slot)
                }
            }
        };
        Ok(Some((self.publish(from.flags, cell), slot)))
    }

    /// Replace a live property's attributes.
    ///
    /// Returns `Ok(None)` when the property is absent or deleted.
    pub fn transition_reconfigure(
        &self,
        from: &Arc<Shape>,
        name: &PropertyName,
        flags: PropertyFlags,
    ) -> OpalResult<Option<Arc<Shape>>> {
        let Some(desc) = from.lookup(name) else {
            return Ok(None);
        };
        if desc.is_deleted() {
            return Ok(None);
        }
        if !desc.is_configurable() {
            return Err(OpalError::RedefineNonConfigurable {
                name: name.as_str().to_string(),
            });
        }

        let cell = self.writable_cell(from);
        {
            let mut layout = cell.write();
            let changed = match &mut *layout {
                PropertyLayout::FixedSet(fs) => {
                    // Fixed-set entries stay data-only; non-default
                    // attributes are fine, the layout just stops being a
                    // shareable edge source.
                    let mut hashed = HashedLayout::from_fixed(fs, INLINE_CAPACITY as u16);
                    let changed = hashed.reconfigure(name, flags);
                    *layout = PropertyLayout::Hashed(hashed);
                    changed
                }
                PropertyLayout::Hashed(h) => h.reconfigure(name, flags),
                PropertyLayout::Indexed(ix) => ix.named_mut().reconfigure(name, flags),
            };
            debug_assert!(changed);
        }
        Ok(Some(self.publish(from.flags, cell)))
    }

    /// Install an accessor property, publishing the successor shape.
    ///
    /// Fixed-set layouts convert to hashed first; accessor entries only
    /// live in hashed layouts.
    pub fn transition_define_accessor(
        &self,
        from: &Arc<Shape>,
        name: &PropertyName,
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
        flags: PropertyFlags,
    ) -> OpalResult<(Arc<Shape>, SlotRef)> {
        match from.lookup(name) {
            Some(desc) if !desc.is_deleted() && !desc.is_configurable() => {
                return Err(OpalError::RedefineNonConfigurable {
                    name: name.as_str().to_string(),
                });
            }
            Some(_) => {}
            None => {
                if !from.is_extensible() {
                    return Err(OpalError::NotExtensible {
                        name: name.as_str().to_string(),
                    });
                }
            }
        }

        let cell = self.writable_cell(from);
        let slot = {
            let mut layout = cell.write();
            match &mut *layout {
                PropertyLayout::FixedSet(fs) => {
                    let mut hashed = HashedLayout::from_fixed(fs, INLINE_CAPACITY as u16);
                    let slot = hashed.install_accessor(name, getter, setter, flags);
                    *layout = PropertyLayout::Hashed(hashed);
                    slot
                }
                PropertyLayout::Hashed(h) => h.install_accessor(name, getter, setter, flags),
                PropertyLayout::Indexed(ix) => {
                    ix.named_mut().install_accessor(name, getter, setter, flags)
                }
            }
        };
        Ok((self.publish(from.flags, cell), slot))
    }

    /// Seal or freeze: strips per-property attributes and republishes with
    /// the object-level flags set.
    #[must_use]
    pub fn transition_seal(&self, from: &Arc<Shape>, freeze: bool) -> Arc<Shape> {
        let cell = self.writable_cell(from);
        {
            let mut layout = cell.write();
            match &mut *layout {
                PropertyLayout::FixedSet(fs) => {
                    let mut hashed = HashedLayout::from_fixed(fs, INLINE_CAPACITY as u16);
                    hashed.strip_for_seal(freeze);
                    *layout = PropertyLayout::Hashed(hashed);
                }
                PropertyLayout::Hashed(h) => h.strip_for_seal(freeze),
                PropertyLayout::Indexed(ix) => {
                    ix.named_mut().strip_for_seal(freeze);
                    ix.seal_indices(freeze);
                }
            }
        }
        let mut flags = from.flags;
        flags.remove(ShapeFlags::EXTENSIBLE);
        flags.insert(ShapeFlags::SEALED);
        if freeze {
            flags.insert(ShapeFlags::FROZEN);
        }
        self.publish(flags, cell)
    }

    /// Convert to the indexed-element layout (no-op when already indexed).
    #[must_use]
    pub fn convert_to_indexed(&self, from: &Arc<Shape>) -> Arc<Shape> {
        if matches!(&*from.layout.read(), PropertyLayout::Indexed(_)) {
            return Arc::clone(from);
        }
        let cell = self.writable_cell(from);
        {
            let mut layout = cell.write();
            let named = match &*layout {
                PropertyLayout::FixedSet(fs) => {
                    HashedLayout::from_fixed(fs, INLINE_CAPACITY as u16)
                }
                PropertyLayout::Hashed(h) => h.clone(),
                PropertyLayout::Indexed(_) => return Arc::clone(from),
            };
            *layout = PropertyLayout::Indexed(IndexedElementLayout::from_hashed(
                named,
                self.default_item_flags,
            ));
        }
        self.publish(from.flags, cell)
    }

    /// Install an explicit descriptor for a numeric index, converting to
    /// the indexed layout if needed.
    pub fn transition_define_index(
        &self,
        from: &Arc<Shape>,
        index: u32,
        desc: IndexedPropertyDescriptor,
    ) -> OpalResult<Arc<Shape>> {
        let indexed = self.convert_to_indexed(from);
        {
            let layout = indexed.layout.read();
            if let PropertyLayout::Indexed(ix) = &*layout {
                let existing = ix.index_flags(index);
                if !existing.is_deleted() && !existing.is_configurable() {
                    return Err(OpalError::RedefineNonConfigurable {
                        name: index.to_string(),
                    });
                }
                if ix.index_descriptor(index).is_none() && !indexed.is_extensible() {
                    return Err(OpalError::NotExtensible {
                        name: index.to_string(),
                    });
                }
            }
        }
        let cell = self.writable_cell(&indexed);
        {
            let mut layout = cell.write();
            if let PropertyLayout::Indexed(ix) = &mut *layout {
                ix.define_index(index, desc);
            }
        }
        Ok(self.publish(indexed.flags, cell))
    }

    /// Tombstone a numeric index.
    ///
    /// Returns `Ok(None)` when the shape is not indexed or the index is
    /// already tombstoned (caller handles plain element holes).
    pub fn transition_delete_index(
        &self,
        from: &Arc<Shape>,
        index: u32,
    ) -> OpalResult<Option<Arc<Shape>>> {
        {
            let layout = from.layout.read();
            let PropertyLayout::Indexed(ix) = &*layout else {
                return Ok(None);
            };
            let flags = ix.index_flags(index);
            if flags.is_deleted() {
                return Ok(None);
            }
            if !flags.is_deletable() {
                return Err(OpalError::DeleteNonConfigurable {
                    name: index.to_string(),
                });
            }
        }
        let cell = self.writable_cell(from);
        {
            let mut layout = cell.write();
            if let PropertyLayout::Indexed(ix) = &mut *layout {
                ix.tombstone_index(index);
            }
        }
        Ok(Some(self.publish(from.flags, cell)))
    }

    /// Republish a shape with the same layout cell and adjusted flags.
    ///
    /// Used for seal-free flag changes (mark-as-prototype) and for
    /// prototype rewrites, where only the identity must change so that
    /// receiver-keyed caches miss.
    #[must_use]
    pub fn republish(&self, from: &Arc<Shape>, set: ShapeFlags, clear: ShapeFlags) -> Arc<Shape> {
        // Two shapes now reference the cell.
        from.layout.mark_shared();
        let mut flags = from.flags;
        flags.insert(set);
        flags.remove(clear);
        self.publish(flags, Arc::clone(&from.layout))
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> ShapeStats {
        ShapeStats {
            shapes_published: self.next_id.load(Ordering::Relaxed),
            transition_hits: self.transition_hits.load(Ordering::Relaxed),
        }
    }
}

impl Default for ShapeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShapeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeContext")
            .field("shapes_published", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
