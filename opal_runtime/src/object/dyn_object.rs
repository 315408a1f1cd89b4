//! The dynamic object: shape header, inline slots, overflow storage,
//! element backing, and the prototype link.
//!
//! Storage is only ever addressed through slot indices, never raw
//! addresses, so a collector may relocate the overflow array by rewriting
//! the object's own field — no cache needs invalidating for that.
//!
//! Slot IO fails closed: a slot reference that falls outside the storage
//! actually allocated reads as `None` and writes as a rejected `false`,
//! never out of bounds.

use std::sync::{Arc, Weak};

use opal_core::error::{OpalError, OpalResult};
use opal_core::intern::PropertyName;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::object::descriptor::{
    IndexedPropertyDescriptor, PropertyFlags, SlotRef, SlotRegion,
};
use crate::object::layout::{PropertyLayout, INLINE_CAPACITY};
use crate::object::shape::{Shape, ShapeContext, ShapeFlags, ShapeId};
use crate::value::{FunctionRef, Value};

// =============================================================================
// Inline Slots
// =============================================================================

/// Fixed-capacity slot storage embedded in the object.
///
/// Sized once at creation and locked: `used` only grows, never shrinks,
/// so a slot index handed to a cache stays valid for the object's
/// lifetime.
#[derive(Debug)]
struct InlineSlots {
    slots: [Value; INLINE_CAPACITY],
    used: u16,
}

impl InlineSlots {
    fn new(used: u16) -> Self {
        debug_assert!(used as usize <= INLINE_CAPACITY);
        Self {
            slots: std::array::from_fn(|_| Value::Undefined),
            used: used.min(INLINE_CAPACITY as u16),
        }
    }

    #[inline]
    fn get(&self, index: u16) -> Option<&Value> {
        if index < self.used {
            self.slots.get(index as usize)
        } else {
            None
        }
    }

    /// Write an already-allocated slot. Fails closed on out-of-range.
    #[inline]
    fn set(&mut self, index: u16, value: Value) -> bool {
        if index < self.used {
            self.slots[index as usize] = value;
            true
        } else {
            false
        }
    }

    /// Grow `used` to cover `index`, then write it.
    fn ensure_and_set(&mut self, index: u16, value: Value) -> bool {
        if index as usize >= INLINE_CAPACITY {
            return false;
        }
        if index >= self.used {
            self.used = index + 1;
        }
        self.slots[index as usize] = value;
        true
    }
}

// =============================================================================
// Own-Property Lookup
// =============================================================================

/// Result of an own-property lookup.
#[derive(Debug, Clone)]
pub enum OwnProperty {
    /// A live data property.
    Data {
        /// Storage location.
        slot: SlotRef,
        /// Attribute flags.
        flags: PropertyFlags,
    },
    /// A live accessor property.
    Accessor {
        /// The getter, if any.
        getter: Option<FunctionRef>,
        /// The setter, if any.
        setter: Option<FunctionRef>,
        /// Attribute flags.
        flags: PropertyFlags,
    },
    /// A tombstoned (deleted) entry.
    Deleted,
}

/// Result of an own-property set.
#[derive(Debug)]
pub enum SetOutcome {
    /// Wrote an existing live data property.
    WroteExisting {
        /// The slot written.
        slot: SlotRef,
    },
    /// Added a new property (or revived a tombstone), transitioning the
    /// shape. `pre_shape` is the shape before the addition — the evidence
    /// a write cache needs to accelerate the same transition later.
    Added {
        /// The receiver's shape before the addition.
        pre_shape: Arc<Shape>,
        /// The slot assigned to the new property.
        slot: SlotRef,
    },
    /// The property is an accessor; the caller must invoke the setter.
    AccessorNeeded {
        /// The setter, if any.
        setter: Option<FunctionRef>,
    },
}

// =============================================================================
// Dynamic Object
// =============================================================================

/// A dynamically-typed object with shape-described property storage.
#[derive(Debug)]
pub struct DynObject {
    shape: Arc<Shape>,
    inline: InlineSlots,
    overflow: Vec<Value>,
    elements: Vec<Value>,
    prototype: Option<ObjectRef>,
}

impl DynObject {
    /// Create an empty object with the context's root shape.
    #[must_use]
    pub fn new(shapes: &ShapeContext) -> Self {
        Self::with_shape(shapes.root())
    }

    /// Create an empty object whose prototype is already known.
    ///
    /// Objects with the same prototype start from the same shape and so
    /// share a transition lineage; objects with different prototypes never
    /// share a shape. The prototype is flagged `IS_PROTOTYPE` here, at the
    /// moment it starts backing a chain, so mutations on it route through
    /// cache invalidation from the very first link.
    #[must_use]
    pub fn with_prototype(shapes: &ShapeContext, proto: ObjectRef) -> Self {
        proto.write().mark_as_prototype(shapes);
        let shape = shapes.root_for_prototype(&proto);
        let mut obj = Self::with_shape(shape);
        obj.prototype = Some(proto);
        obj
    }

    /// Create an object with a published shape and an already-resolved
    /// prototype link. Used by the constructor fast path, where the shape
    /// came out of the prototype's own transition lineage and needs no
    /// republish.
    #[must_use]
    pub fn with_shape_and_prototype(shape: Arc<Shape>, proto: Option<ObjectRef>) -> Self {
        let mut obj = Self::with_shape(shape);
        obj.prototype = proto;
        obj
    }

    /// Create an object directly with a published shape, sizing storage
    /// from the shape's slot usage. Used by the constructor fast path.
    #[must_use]
    pub fn with_shape(shape: Arc<Shape>) -> Self {
        let (inline_used, overflow_used) = shape.layout_cell().read().slot_usage();
        Self {
            shape,
            inline: InlineSlots::new(inline_used),
            overflow: vec![Value::Undefined; overflow_used as usize],
            elements: Vec::new(),
            prototype: None,
        }
    }

    /// The object's current shape.
    #[inline]
    #[must_use]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// The current shape's identity.
    #[inline]
    #[must_use]
    pub fn shape_id(&self) -> ShapeId {
        self.shape.id()
    }

    /// Swap the shape header. The new shape must describe this object's
    /// storage (it came out of a transition on the current shape).
    pub fn set_shape(&mut self, shape: Arc<Shape>) {
        self.shape = shape;
    }

    /// The prototype link, if any.
    #[inline]
    #[must_use]
    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.prototype.as_ref()
    }

    // -------------------------------------------------------------------------
    // Slot IO
    // -------------------------------------------------------------------------

    /// Read a slot. Out-of-range references fail closed as `None`.
    #[must_use]
    pub fn read_slot(&self, slot: SlotRef) -> Option<Value> {
        match slot.region {
            SlotRegion::Inline => self.inline.get(slot.index).cloned(),
            SlotRegion::Overflow => self.overflow.get(slot.index as usize).cloned(),
        }
    }

    /// Write an already-allocated slot. Fails closed on out-of-range.
    pub fn write_slot_checked(&mut self, slot: SlotRef, value: Value) -> bool {
        match slot.region {
            SlotRegion::Inline => self.inline.set(slot.index, value),
            SlotRegion::Overflow => match self.overflow.get_mut(slot.index as usize) {
                Some(cell) => {
                    *cell = value;
                    true
                }
                None => false,
            },
        }
    }

    /// Write a slot, growing storage to cover it if needed.
    ///
    /// Used on the add-property path, where the layout just allocated the
    /// slot.
    pub fn store_slot(&mut self, slot: SlotRef, value: Value) -> OpalResult<()> {
        match slot.region {
            SlotRegion::Inline => {
                if self.inline.ensure_and_set(slot.index, value) {
                    Ok(())
                } else {
                    Err(OpalError::AllocationFailure {
                        what: "inline slots",
                    })
                }
            }
            SlotRegion::Overflow => {
                let needed = slot.index as usize + 1;
                if needed > self.overflow.len() {
                    self.overflow
                        .try_reserve(needed - self.overflow.len())
                        .map_err(|_| OpalError::AllocationFailure {
                            what: "overflow slots",
                        })?;
                    self.overflow.resize(needed, Value::Undefined);
                }
                self.overflow[slot.index as usize] = value;
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Named properties
    // -------------------------------------------------------------------------

    /// Look up an own property.
    #[must_use]
    pub fn own_property(&self, name: &PropertyName) -> Option<OwnProperty> {
        let desc = self.shape.lookup(name)?;
        if desc.is_deleted() {
            return Some(OwnProperty::Deleted);
        }
        if desc.is_accessor() {
            let (getter, setter) = match desc.accessor {
                Some(pair) => (pair.getter, pair.setter),
                None => (None, None),
            };
            return Some(OwnProperty::Accessor {
                getter,
                setter,
                flags: desc.flags,
            });
        }
        Some(OwnProperty::Data {
            slot: desc.slot,
            flags: desc.flags,
        })
    }

    /// Read an own data property's value.
    #[must_use]
    pub fn get(&self, name: &PropertyName) -> Option<Value> {
        match self.own_property(name)? {
            OwnProperty::Data { slot, .. } => self.read_slot(slot),
            _ => None,
        }
    }

    /// Set an own property: write an existing data slot, report an
    /// accessor, or add the property with default attributes.
    ///
    /// This only consults the receiver; prototype-chain write semantics
    /// live with the resolver.
    pub fn set_property(
        &mut self,
        shapes: &ShapeContext,
        name: &PropertyName,
        value: Value,
    ) -> OpalResult<SetOutcome> {
        if self.shape.is_frozen() {
            return Err(OpalError::WriteNotWritable {
                name: name.as_str().to_string(),
            });
        }
        match self.own_property(name) {
            Some(OwnProperty::Data { slot, flags }) => {
                if !flags.is_writable() {
                    return Err(OpalError::WriteNotWritable {
                        name: name.as_str().to_string(),
                    });
                }
                self.store_slot(slot, value)?;
                Ok(SetOutcome::WroteExisting { slot })
            }
            Some(OwnProperty::Accessor { setter, .. }) => {
                Ok(SetOutcome::AccessorNeeded { setter })
            }
            Some(OwnProperty::Deleted) | None => {
                self.add_property(shapes, name, value, shapes.default_flags())
            }
        }
    }

    /// Add a property with explicit attributes, transitioning the shape.
    pub fn add_property(
        &mut self,
        shapes: &ShapeContext,
        name: &PropertyName,
        value: Value,
        flags: PropertyFlags,
    ) -> OpalResult<SetOutcome> {
        let pre_shape = Arc::clone(&self.shape);
        let (next, slot) = shapes.transition_add(&pre_shape, name, flags)?;
        self.store_slot(slot, value)?;
        self.shape = next;
        Ok(SetOutcome::Added { pre_shape, slot })
    }

    /// Declare a root-object let-like binding: reassignable, not
    /// deletable.
    pub fn define_let_binding(
        &mut self,
        shapes: &ShapeContext,
        name: &PropertyName,
        value: Value,
    ) -> OpalResult<SetOutcome> {
        self.add_property(shapes, name, value, PropertyFlags::let_binding())
    }

    /// Delete an own property. Idempotent: deleting a missing or
    /// already-deleted property succeeds without mutating anything.
    pub fn delete_property(
        &mut self,
        shapes: &ShapeContext,
        name: &PropertyName,
    ) -> OpalResult<bool> {
        match shapes.transition_delete(&self.shape, name)? {
            None => Ok(true),
            Some((next, slot)) => {
                // Release the stored value; the slot itself is retained.
                let _ = self.write_slot_checked(slot, Value::Undefined);
                self.shape = next;
                Ok(true)
            }
        }
    }

    /// Replace a live property's attributes. Returns `false` when the
    /// property is absent (a silent no-op for the caller to interpret).
    pub fn reconfigure_property(
        &mut self,
        shapes: &ShapeContext,
        name: &PropertyName,
        flags: PropertyFlags,
    ) -> OpalResult<bool> {
        match shapes.transition_reconfigure(&self.shape, name, flags)? {
            None => Ok(false),
            Some(next) => {
                self.shape = next;
                Ok(true)
            }
        }
    }

    /// Install an accessor property.
    pub fn define_accessor(
        &mut self,
        shapes: &ShapeContext,
        name: &PropertyName,
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
        flags: PropertyFlags,
    ) -> OpalResult<()> {
        let (next, slot) =
            shapes.transition_define_accessor(&self.shape, name, getter, setter, flags)?;
        // The value slot of an accessor entry is unused but must exist.
        self.store_slot(slot, Value::Undefined)?;
        self.shape = next;
        Ok(())
    }

    /// Live own property names in slot order.
    #[must_use]
    pub fn own_names(&self) -> Vec<PropertyName> {
        self.shape
            .layout_cell()
            .read()
            .live_names_in_slot_order()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Seal / freeze / prototype
    // -------------------------------------------------------------------------

    /// Whether this object carries element storage or already uses the
    /// indexed layout.
    #[must_use]
    pub fn is_array_like(&self) -> bool {
        !self.elements.is_empty()
            || matches!(&*self.shape.layout_cell().read(), PropertyLayout::Indexed(_))
    }

    /// Seal: no additions or deletions. Array-likes convert to the
    /// indexed layout first so every index is individually trackable.
    pub fn seal(&mut self, shapes: &ShapeContext) {
        if self.is_array_like() {
            self.shape = shapes.convert_to_indexed(&self.shape);
        }
        self.shape = shapes.transition_seal(&self.shape, false);
    }

    /// Freeze: sealed plus no data writes, and the element length locks.
    pub fn freeze(&mut self, shapes: &ShapeContext) {
        if self.is_array_like() {
            self.shape = shapes.convert_to_indexed(&self.shape);
        }
        self.shape = shapes.transition_seal(&self.shape, true);
    }

    /// Rewrite the prototype link. Republishes the shape so every cache
    /// keyed on the old identity misses.
    pub fn set_prototype(&mut self, shapes: &ShapeContext, proto: Option<ObjectRef>) {
        self.prototype = proto;
        self.shape = shapes.republish(&self.shape, ShapeFlags::empty(), ShapeFlags::empty());
    }

    /// Flag this object as being used as a prototype (idempotent).
    pub fn mark_as_prototype(&mut self, shapes: &ShapeContext) {
        if !self.shape.is_prototype() {
            self.shape =
                shapes.republish(&self.shape, ShapeFlags::IS_PROTOTYPE, ShapeFlags::empty());
        }
    }

    // -------------------------------------------------------------------------
    // Elements
    // -------------------------------------------------------------------------

    /// Element backing length.
    #[must_use]
    pub fn element_len(&self) -> usize {
        self.elements.len()
    }

    /// Read an element value. Tombstoned and accessor indices read as
    /// `None`; use `index_descriptor` for those.
    #[must_use]
    pub fn get_element(&self, index: u32) -> Option<Value> {
        let value = self.elements.get(index as usize)?;
        if let PropertyLayout::Indexed(ix) = &*self.shape.layout_cell().read() {
            let flags = ix.index_flags(index);
            if flags.is_deleted() || flags.contains(PropertyFlags::ACCESSOR) {
                return None;
            }
        }
        Some(value.clone())
    }

    /// The explicit descriptor for an index, if the object is indexed and
    /// one was defined.
    #[must_use]
    pub fn index_descriptor(&self, index: u32) -> Option<IndexedPropertyDescriptor> {
        match &*self.shape.layout_cell().read() {
            PropertyLayout::Indexed(ix) => ix.index_descriptor(index).cloned(),
            _ => None,
        }
    }

    /// Write an element, growing the backing if permitted.
    pub fn set_element(
        &mut self,
        shapes: &ShapeContext,
        index: u32,
        value: Value,
    ) -> OpalResult<()> {
        if self.shape.is_frozen() {
            return Err(OpalError::WriteNotWritable {
                name: index.to_string(),
            });
        }
        let i = index as usize;
        let (writable, tombstoned, can_grow) =
            match &*self.shape.layout_cell().read() {
                PropertyLayout::Indexed(ix) => {
                    let flags = ix.index_flags(index);
                    (flags.is_writable(), flags.is_deleted(), ix.can_grow())
                }
                _ => (true, false, true),
            };
        if tombstoned {
            // Re-adding a deleted index: fresh default attributes.
            self.shape = shapes.transition_define_index(
                &self.shape,
                index,
                IndexedPropertyDescriptor::data(shapes.default_item_flags()),
            )?;
        } else if !writable {
            return Err(OpalError::WriteNotWritable {
                name: index.to_string(),
            });
        }
        if i >= self.elements.len() {
            if !can_grow {
                return Err(OpalError::WriteNotWritable {
                    name: "length".to_string(),
                });
            }
            self.elements
                .try_reserve(i + 1 - self.elements.len())
                .map_err(|_| OpalError::AllocationFailure { what: "elements" })?;
            self.elements.resize(i + 1, Value::Undefined);
        }
        self.elements[i] = value;
        Ok(())
    }

    /// Delete an element. Idempotent like named deletion.
    pub fn delete_element(&mut self, shapes: &ShapeContext, index: u32) -> OpalResult<bool> {
        match shapes.transition_delete_index(&self.shape, index)? {
            Some(next) => {
                if let Some(cell) = self.elements.get_mut(index as usize) {
                    *cell = Value::Undefined;
                }
                self.shape = next;
                Ok(true)
            }
            None => {
                // Not indexed (or already tombstoned): plain hole.
                if let Some(cell) = self.elements.get_mut(index as usize) {
                    *cell = Value::Undefined;
                }
                Ok(true)
            }
        }
    }

    /// Install an explicit index descriptor, converting to the indexed
    /// layout if needed.
    pub fn define_index(
        &mut self,
        shapes: &ShapeContext,
        index: u32,
        desc: IndexedPropertyDescriptor,
    ) -> OpalResult<()> {
        self.shape = shapes.transition_define_index(&self.shape, index, desc)?;
        Ok(())
    }

    /// Next live explicitly-described index after `after` (indexed
    /// layouts only).
    #[must_use]
    pub fn next_live_index(&self, after: Option<u32>) -> Option<u32> {
        match &*self.shape.layout_cell().read() {
            PropertyLayout::Indexed(ix) => ix.next_live_index(after),
            _ => None,
        }
    }
}

// =============================================================================
// Object References
// =============================================================================

/// Shared, identity-bearing handle to a dynamic object.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Arc<RwLock<DynObject>>,
}

impl ObjectRef {
    /// Wrap an object into a shared handle.
    #[must_use]
    pub fn new(obj: DynObject) -> Self {
        Self {
            inner: Arc::new(RwLock::new(obj)),
        }
    }

    /// Read access.
    pub fn read(&self) -> RwLockReadGuard<'_, DynObject> {
        self.inner.read()
    }

    /// Write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, DynObject> {
        self.inner.write()
    }

    /// Identity comparison.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable identity pointer.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.inner).cast()
    }

    /// Downgrade to a weak handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectRef({:p})", self.as_ptr())
    }
}

/// Weak counterpart of `ObjectRef`.
#[derive(Clone)]
pub struct WeakObjectRef {
    inner: Weak<RwLock<DynObject>>,
}

impl WeakObjectRef {
    /// Try to upgrade to a strong handle.
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.inner.upgrade().map(|inner| ObjectRef { inner })
    }
}

impl std::fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakObjectRef")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::intern::NameInterner;

    fn setup() -> (ShapeContext, NameInterner) {
        (ShapeContext::new(), NameInterner::new())
    }

    // -------------------------------------------------------------------------
    // Slot IO
    // -------------------------------------------------------------------------

    #[test]
    fn test_slot_io_fails_closed() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);

        assert!(obj.read_slot(SlotRef::inline(0)).is_none());
        assert!(obj.read_slot(SlotRef::overflow(7)).is_none());
        assert!(!obj.write_slot_checked(SlotRef::inline(0), Value::Int(1)));
        assert!(!obj.write_slot_checked(SlotRef::overflow(0), Value::Int(1)));
    }

    #[test]
    fn test_store_slot_grows_overflow() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);

        obj.store_slot(SlotRef::overflow(2), Value::Int(9)).expect("store");
        assert_eq!(obj.read_slot(SlotRef::overflow(2)), Some(Value::Int(9)));
        assert_eq!(obj.read_slot(SlotRef::overflow(1)), Some(Value::Undefined));
    }

    // -------------------------------------------------------------------------
    // Property add / read / write
    // -------------------------------------------------------------------------

    #[test]
    fn test_add_then_get() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let a = names.intern("a");

        let outcome = obj.set_property(&shapes, &a, Value::Int(1)).expect("set");
        assert!(matches!(outcome, SetOutcome::Added { .. }));
        assert_eq!(obj.get(&a), Some(Value::Int(1)));
    }

    #[test]
    fn test_second_write_hits_existing_slot() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let a = names.intern("a");

        obj.set_property(&shapes, &a, Value::Int(1)).expect("set");
        let shape_after_add = obj.shape_id();
        let outcome = obj.set_property(&shapes, &a, Value::Int(2)).expect("set");

        assert!(matches!(outcome, SetOutcome::WroteExisting { .. }));
        assert_eq!(obj.shape_id(), shape_after_add); // No new transition
        assert_eq!(obj.get(&a), Some(Value::Int(2)));
    }

    #[test]
    fn test_objects_with_same_history_share_shape() {
        let (shapes, names) = setup();
        let a = names.intern("a");
        let b = names.intern("b");

        let mut o1 = DynObject::new(&shapes);
        let mut o2 = DynObject::new(&shapes);
        o1.set_property(&shapes, &a, Value::Int(1)).expect("set");
        o1.set_property(&shapes, &b, Value::Int(2)).expect("set");
        o2.set_property(&shapes, &a, Value::Int(3)).expect("set");
        o2.set_property(&shapes, &b, Value::Int(4)).expect("set");

        assert_eq!(o1.shape_id(), o2.shape_id());
        assert!(Arc::ptr_eq(o1.shape().layout_cell(), o2.shape().layout_cell()));
    }

    #[test]
    fn test_many_properties_spill_to_overflow() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);

        for i in 0..12 {
            let name = names.intern(&format!("p{i}"));
            obj.set_property(&shapes, &name, Value::Int(i)).expect("set");
        }
        for i in 0..12 {
            let name = names.intern(&format!("p{i}"));
            assert_eq!(obj.get(&name), Some(Value::Int(i)));
        }
        // First 8 inline, rest overflow
        let last = names.intern("p11");
        assert!(matches!(
            obj.own_property(&last),
            Some(OwnProperty::Data { slot, .. }) if !slot.is_inline()
        ));
    }

    // -------------------------------------------------------------------------
    // Deletion
    // -------------------------------------------------------------------------

    #[test]
    fn test_delete_then_reassign_uses_default_attributes() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let a = names.intern("a");
        let b = names.intern("b");

        obj.set_property(&shapes, &a, Value::Int(1)).expect("set");
        obj.set_property(&shapes, &b, Value::Int(2)).expect("set");
        // Give b non-default (but still configurable) attributes.
        obj.reconfigure_property(&shapes, &b, PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE)
            .expect("reconfigure");

        let slot_before = match obj.own_property(&b) {
            Some(OwnProperty::Data { slot, .. }) => slot,
            other => panic!("expected data property, got {other:?}"),
        };
        assert!(obj.delete_property(&shapes, &b).expect("delete"));
        obj.set_property(&shapes, &b, Value::Int(5)).expect("reassign");

        // Attributes equal the layout defaults, not the pre-deletion ones,
        // and the slot was reused.
        match obj.own_property(&b) {
            Some(OwnProperty::Data { slot, flags }) => {
                assert_eq!(flags, PropertyFlags::data());
                assert_eq!(slot, slot_before);
            }
            other => panic!("expected data property, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_non_configurable_errors() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let b = names.intern("b");
        obj.set_property(&shapes, &b, Value::Int(2)).expect("set");
        obj.reconfigure_property(&shapes, &b, PropertyFlags::sealed_data())
            .expect("reconfigure");

        assert!(matches!(
            obj.delete_property(&shapes, &b),
            Err(OpalError::DeleteNonConfigurable { .. })
        ));
        // Attribute changes are locked out too
        assert!(matches!(
            obj.reconfigure_property(&shapes, &b, PropertyFlags::data()),
            Err(OpalError::RedefineNonConfigurable { .. })
        ));
    }

    #[test]
    fn test_delete_is_idempotent_and_releases_value() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let a = names.intern("a");
        let b = names.intern("b");

        obj.set_property(&shapes, &a, Value::Int(1)).expect("set");
        obj.set_property(&shapes, &b, Value::str("big")).expect("set");

        assert!(obj.delete_property(&shapes, &b).expect("delete"));
        assert!(obj.delete_property(&shapes, &b).expect("delete")); // Idempotent
        assert!(obj.delete_property(&shapes, &names.intern("ghost")).expect("delete"));
        assert!(obj.get(&b).is_none());
        assert!(matches!(obj.own_property(&b), Some(OwnProperty::Deleted)));

        // The tombstoned slot now reads as undefined (value released)
        obj.set_property(&shapes, &b, Value::Int(5)).expect("set");
        assert_eq!(obj.get(&b), Some(Value::Int(5)));
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[test]
    fn test_define_accessor_and_set_reports_setter() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let x = names.intern("x");
        let setter = FunctionRef::new("set_x");

        obj.define_accessor(
            &shapes,
            &x,
            Some(FunctionRef::new("get_x")),
            Some(setter.clone()),
            PropertyFlags::ENUMERABLE | PropertyFlags::CONFIGURABLE,
        )
        .expect("define");

        match obj.set_property(&shapes, &x, Value::Int(1)).expect("set") {
            SetOutcome::AccessorNeeded { setter: Some(s) } => assert_eq!(s, setter),
            other => panic!("expected accessor, got {other:?}"),
        }
    }

    // -------------------------------------------------------------------------
    // Seal / freeze
    // -------------------------------------------------------------------------

    #[test]
    fn test_frozen_object_rejects_writes_and_adds() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let a = names.intern("a");
        obj.set_property(&shapes, &a, Value::Int(1)).expect("set");

        obj.freeze(&shapes);
        assert!(matches!(
            obj.set_property(&shapes, &a, Value::Int(2)),
            Err(OpalError::WriteNotWritable { .. })
        ));
        assert!(matches!(
            obj.set_property(&shapes, &names.intern("b"), Value::Int(3)),
            Err(OpalError::WriteNotWritable { .. })
        ));
        assert_eq!(obj.get(&a), Some(Value::Int(1)));
    }

    #[test]
    fn test_sealed_object_allows_writes_rejects_adds() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        let a = names.intern("a");
        obj.set_property(&shapes, &a, Value::Int(1)).expect("set");

        obj.seal(&shapes);
        obj.set_property(&shapes, &a, Value::Int(2)).expect("write ok");
        assert!(matches!(
            obj.set_property(&shapes, &names.intern("b"), Value::Int(3)),
            Err(OpalError::NotExtensible { .. })
        ));
        assert!(matches!(
            obj.delete_property(&shapes, &a),
            Err(OpalError::DeleteNonConfigurable { .. })
        ));
    }

    #[test]
    fn test_seal_of_array_like_converts_to_indexed() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);
        obj.set_element(&shapes, 0, Value::Int(1)).expect("elem");
        obj.seal(&shapes);
        assert!(obj.is_array_like());
        assert_eq!(obj.shape().layout_cell().read().kind_name(), "indexed");
    }

    // -------------------------------------------------------------------------
    // Elements
    // -------------------------------------------------------------------------

    #[test]
    fn test_element_roundtrip_and_growth() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);

        obj.set_element(&shapes, 3, Value::Int(7)).expect("elem");
        assert_eq!(obj.element_len(), 4);
        assert_eq!(obj.get_element(3), Some(Value::Int(7)));
        assert_eq!(obj.get_element(1), Some(Value::Undefined));
        assert_eq!(obj.get_element(9), None);
    }

    #[test]
    fn test_frozen_array_rejects_growth() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);
        obj.set_element(&shapes, 1, Value::Int(1)).expect("elem");
        obj.freeze(&shapes);

        assert!(obj.set_element(&shapes, 5, Value::Int(2)).is_err());
        assert_eq!(obj.element_len(), 2);
    }

    #[test]
    fn test_deleted_element_rewrites_with_default_attributes() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);
        obj.define_index(
            &shapes,
            0,
            IndexedPropertyDescriptor::data(PropertyFlags::data()),
        )
        .expect("define");
        obj.set_element(&shapes, 0, Value::Int(1)).expect("elem");

        assert!(obj.delete_element(&shapes, 0).expect("delete"));
        assert_eq!(obj.get_element(0), None);

        obj.set_element(&shapes, 0, Value::Int(2)).expect("rewrite");
        assert_eq!(obj.get_element(0), Some(Value::Int(2)));
    }

    #[test]
    fn test_element_enumeration_skips_tombstones() {
        let (shapes, _) = setup();
        let mut obj = DynObject::new(&shapes);
        for i in [0u32, 1, 2] {
            obj.define_index(
                &shapes,
                i,
                IndexedPropertyDescriptor::data(PropertyFlags::data()),
            )
            .expect("define");
            obj.set_element(&shapes, i, Value::Int(i64::from(i))).expect("elem");
        }
        obj.delete_element(&shapes, 1).expect("delete");

        assert_eq!(obj.next_live_index(None), Some(0));
        assert_eq!(obj.next_live_index(Some(0)), Some(2));
        assert_eq!(obj.next_live_index(Some(2)), None);
    }

    // -------------------------------------------------------------------------
    // Prototype link
    // -------------------------------------------------------------------------

    #[test]
    fn test_set_prototype_republishes_shape() {
        let (shapes, _) = setup();
        let proto = ObjectRef::new(DynObject::new(&shapes));
        let mut obj = DynObject::new(&shapes);
        let before = obj.shape_id();

        obj.set_prototype(&shapes, Some(proto.clone()));
        assert_ne!(obj.shape_id(), before);
        assert!(obj.prototype().is_some_and(|p| p.ptr_eq(&proto)));
    }

    #[test]
    fn test_same_prototype_shares_starting_shape() {
        let (shapes, _) = setup();
        let proto = ObjectRef::new(DynObject::new(&shapes));

        let o1 = DynObject::with_prototype(&shapes, proto.clone());
        let o2 = DynObject::with_prototype(&shapes, proto.clone());
        assert_eq!(o1.shape_id(), o2.shape_id());
        // Backing a chain flags the prototype immediately
        assert!(proto.read().shape().is_prototype());

        let other = ObjectRef::new(DynObject::new(&shapes));
        let o3 = DynObject::with_prototype(&shapes, other);
        assert_ne!(o1.shape_id(), o3.shape_id());
    }

    #[test]
    fn test_own_names_in_slot_order() {
        let (shapes, names) = setup();
        let mut obj = DynObject::new(&shapes);
        for n in ["z", "a", "m"] {
            obj.set_property(&shapes, &names.intern(n), Value::Int(0)).expect("set");
        }
        let listed: Vec<_> = obj.own_names().iter().map(|n| n.as_str().to_string()).collect();
        assert_eq!(listed, vec!["z", "a", "m"]); // Insertion order, not alphabetical
    }
}
