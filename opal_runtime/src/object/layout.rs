//! Property layouts: the shape-storage strategies.
//!
//! Three interchangeable variants, chosen per object and converted one way
//! as usage patterns demand:
//!
//! - `FixedSetLayout`: a tiny embedded array for newly-observed small
//!   objects. Cheap to allocate and share.
//! - `HashedLayout`: unbounded name → descriptor map with explicit slot
//!   allocation; the terminal layout for dynamic property sets.
//! - `IndexedElementLayout`: hashed layout plus per-index descriptors for
//!   array-like objects (see `indexed.rs`).
//!
//! Conversion is monotonic (Fixed → Hashed → Indexed); an object never
//! downgrades, and every conversion re-publishes a new `Shape`.
//!
//! Layout invariant: for the lifetime of one layout instance a given name
//! always maps to the same `SlotRef`. Deletion tombstones entries (the
//! slot is retained); re-adding a deleted name reuses its slot with fresh
//! default attributes.

use opal_core::intern::PropertyName;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::object::descriptor::{PropertyDescriptor, PropertyFlags, SlotRef};
use crate::object::indexed::IndexedElementLayout;
use crate::value::FunctionRef;

/// Capacity of the fixed-set layout's embedded descriptor array.
pub const FIXED_SET_CAPACITY: usize = 2;

/// Number of inline property slots embedded in each object.
///
/// Sized once at object creation; never shrinks. Properties past this
/// capacity spill to overflow storage.
pub const INLINE_CAPACITY: usize = 8;

// =============================================================================
// Layout
// =============================================================================

/// The closed set of property-storage strategies.
///
/// No fourth kind is ever added at run time, so this is a plain enum
/// rather than open-ended dynamic dispatch.
#[derive(Debug, Clone)]
pub enum PropertyLayout {
    /// Small embedded descriptor array.
    FixedSet(FixedSetLayout),
    /// Unbounded hash map.
    Hashed(HashedLayout),
    /// Hashed named properties plus per-index element descriptors.
    Indexed(IndexedElementLayout),
}

impl PropertyLayout {
    /// Look up a property descriptor (live or tombstoned).
    #[must_use]
    pub fn lookup(&self, name: &PropertyName) -> Option<&PropertyDescriptor> {
        match self {
            PropertyLayout::FixedSet(fs) => fs.lookup(name),
            PropertyLayout::Hashed(h) => h.lookup(name),
            PropertyLayout::Indexed(ix) => ix.named().lookup(name),
        }
    }

    /// Number of live (non-tombstoned) named properties.
    #[must_use]
    pub fn live_count(&self) -> usize {
        match self {
            PropertyLayout::FixedSet(fs) => fs.live_count(),
            PropertyLayout::Hashed(h) => h.live_count(),
            PropertyLayout::Indexed(ix) => ix.named().live_count(),
        }
    }

    /// Slots handed out so far: `(inline, overflow)` counts.
    ///
    /// Used to size the storage of an object allocated directly with a
    /// cached shape.
    #[must_use]
    pub fn slot_usage(&self) -> (u16, u16) {
        match self {
            PropertyLayout::FixedSet(fs) => (fs.entries.len() as u16, 0),
            PropertyLayout::Hashed(h) => h.slot_usage(),
            PropertyLayout::Indexed(ix) => ix.named().slot_usage(),
        }
    }

    /// Live property names in slot order (inline first, then overflow).
    #[must_use]
    pub fn live_names_in_slot_order(&self) -> Vec<(PropertyName, SlotRef)> {
        let mut out: Vec<(PropertyName, SlotRef)> = match self {
            PropertyLayout::FixedSet(fs) => fs
                .entries
                .iter()
                .filter(|(_, d)| !d.is_deleted())
                .map(|(n, d)| (n.clone(), d.slot))
                .collect(),
            PropertyLayout::Hashed(h) => h
                .map
                .iter()
                .filter(|(_, d)| !d.is_deleted())
                .map(|(n, d)| (n.clone(), d.slot))
                .collect(),
            PropertyLayout::Indexed(ix) => {
                return PropertyLayout::live_names_of_hashed(ix.named());
            }
        };
        out.sort_by_key(|(_, slot)| *slot);
        out
    }

    fn live_names_of_hashed(h: &HashedLayout) -> Vec<(PropertyName, SlotRef)> {
        let mut out: Vec<(PropertyName, SlotRef)> = h
            .map
            .iter()
            .filter(|(_, d)| !d.is_deleted())
            .map(|(n, d)| (n.clone(), d.slot))
            .collect();
        out.sort_by_key(|(_, slot)| *slot);
        out
    }

    /// Diagnostic name of the layout kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyLayout::FixedSet(_) => "fixed-set",
            PropertyLayout::Hashed(_) => "hashed",
            PropertyLayout::Indexed(_) => "indexed",
        }
    }
}

// =============================================================================
// Fixed-Set Layout
// =============================================================================

/// Small embedded descriptor array for newly-observed objects.
///
/// Slot indices equal entry positions and never shift; deletion is only
/// supported in place when the layout holds exactly one descriptor
/// (degenerating to an empty layout) — anything else converts to
/// `HashedLayout` first.
#[derive(Debug, Clone, Default)]
pub struct FixedSetLayout {
    entries: SmallVec<[(PropertyName, PropertyDescriptor); FIXED_SET_CAPACITY]>,
}

impl FixedSetLayout {
    /// Create an empty fixed-set layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn lookup(&self, name: &PropertyName) -> Option<&PropertyDescriptor> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    /// Total entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check for no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|(_, d)| !d.is_deleted()).count()
    }

    /// Whether another name can be added without converting to hashed.
    #[must_use]
    pub fn can_add(&self, name: &PropertyName) -> bool {
        self.lookup(name).is_some_and(PropertyDescriptor::is_deleted)
            || self.entries.len() < FIXED_SET_CAPACITY
    }

    /// Whether this instance may back a shared transition edge: every
    /// entry is a live data property with the given default attributes.
    #[must_use]
    pub fn is_shareable(&self, default_flags: PropertyFlags) -> bool {
        self.entries
            .iter()
            .all(|(_, d)| d.flags == default_flags && !d.is_accessor())
    }

    /// Add a property (or revive its tombstone), returning its slot.
    ///
    /// Caller must have checked `can_add`. Adding a name that is already
    /// live fails closed: the existing slot is returned with its
    /// attributes untouched.
    pub fn add(&mut self, name: PropertyName, flags: PropertyFlags) -> SlotRef {
        if let Some((_, d)) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            if d.is_deleted() {
                d.revive(flags);
            }
            return d.slot;
        }
        debug_assert!(self.entries.len() < FIXED_SET_CAPACITY);
        let slot = SlotRef::inline(self.entries.len() as u16);
        self.entries
            .push((name, PropertyDescriptor::data(slot, flags)));
        slot
    }

    /// Tombstone the sole entry in place.
    ///
    /// Only legal when the layout holds exactly one descriptor; deleting
    /// from a larger fixed set would shift slot indices other code may
    /// have cached, so those conversions go through `HashedLayout`.
    pub fn mark_sole_deleted(&mut self, name: &PropertyName) -> Option<SlotRef> {
        debug_assert_eq!(self.entries.len(), 1);
        let (n, d) = self.entries.first_mut()?;
        if n != name || d.is_deleted() {
            return None;
        }
        d.mark_deleted();
        Some(d.slot)
    }

    /// Iterate all entries, tombstones included.
    pub fn entries(&self) -> impl Iterator<Item = &(PropertyName, PropertyDescriptor)> {
        self.entries.iter()
    }
}

// =============================================================================
// Hashed Layout
// =============================================================================

/// Unbounded name → descriptor map with explicit slot allocation.
///
/// The terminal layout for objects with large or highly dynamic property
/// sets, and for the language-runtime root object (which additionally
/// carries `NO_DELETE` bindings).
#[derive(Debug, Clone)]
pub struct HashedLayout {
    map: FxHashMap<PropertyName, PropertyDescriptor>,
    /// Next free inline slot index.
    next_inline: u16,
    /// Next free overflow slot index.
    next_overflow: u16,
    /// Inline region capacity, fixed at conversion time.
    inline_capacity: u16,
    /// Root-object mode (global bindings).
    root_object: bool,
}

impl HashedLayout {
    /// Create an empty hashed layout.
    #[must_use]
    pub fn new(inline_capacity: u16, root_object: bool) -> Self {
        Self {
            map: FxHashMap::default(),
            next_inline: 0,
            next_overflow: 0,
            inline_capacity,
            root_object,
        }
    }

    /// Convert from a fixed-set layout, carrying every entry (tombstones
    /// included) at its existing slot.
    #[must_use]
    pub fn from_fixed(fixed: &FixedSetLayout, inline_capacity: u16) -> Self {
        let mut layout = Self::new(inline_capacity, false);
        for (name, desc) in fixed.entries() {
            layout.map.insert(name.clone(), desc.clone());
        }
        layout.next_inline = fixed.len() as u16;
        layout
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn lookup(&self, name: &PropertyName) -> Option<&PropertyDescriptor> {
        self.map.get(name)
    }

    /// Total entries, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check for no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Live entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.map.values().filter(|d| !d.is_deleted()).count()
    }

    /// Root-object mode.
    #[must_use]
    pub fn is_root_object(&self) -> bool {
        self.root_object
    }

    /// Slots handed out so far: `(inline, overflow)`.
    #[must_use]
    pub fn slot_usage(&self) -> (u16, u16) {
        (self.next_inline, self.next_overflow)
    }

    fn alloc_slot(&mut self) -> SlotRef {
        if self.next_inline < self.inline_capacity {
            let slot = SlotRef::inline(self.next_inline);
            self.next_inline += 1;
            slot
        } else {
            let slot = SlotRef::overflow(self.next_overflow);
            self.next_overflow += 1;
            slot
        }
    }

    /// Add a property (or revive its tombstone), returning its slot.
    ///
    /// Adding a name that is already live fails closed: the existing slot
    /// is returned and its attributes are left untouched (`reconfigure` is
    /// the path for attribute changes).
    pub fn add(&mut self, name: &PropertyName, flags: PropertyFlags) -> SlotRef {
        if let Some(desc) = self.map.get_mut(name) {
            if desc.is_deleted() {
                desc.revive(flags);
            }
            return desc.slot;
        }
        let slot = self.alloc_slot();
        self.map
            .insert(name.clone(), PropertyDescriptor::data(slot, flags));
        slot
    }

    /// Tombstone a live entry, returning its retained slot.
    ///
    /// Returns `None` when the entry is absent or already tombstoned.
    pub fn tombstone(&mut self, name: &PropertyName) -> Option<SlotRef> {
        let desc = self.map.get_mut(name)?;
        if desc.is_deleted() {
            return None;
        }
        desc.mark_deleted();
        Some(desc.slot)
    }

    /// Replace a live entry's attribute flags. Returns `false` when the
    /// entry is absent or tombstoned.
    pub fn reconfigure(&mut self, name: &PropertyName, flags: PropertyFlags) -> bool {
        match self.map.get_mut(name) {
            Some(desc) if !desc.is_deleted() => {
                let accessor_bit = desc.flags & PropertyFlags::ACCESSOR;
                desc.flags = flags | accessor_bit;
                true
            }
            _ => false,
        }
    }

    /// Install an accessor pair under a name, allocating (or reusing) its
    /// slot. The value slot of an accessor entry is unused.
    pub fn install_accessor(
        &mut self,
        name: &PropertyName,
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
        flags: PropertyFlags,
    ) -> SlotRef {
        if let Some(desc) = self.map.get_mut(name) {
            let slot = desc.slot;
            *desc = PropertyDescriptor::accessor(slot, flags, getter, setter);
            return slot;
        }
        let slot = self.alloc_slot();
        self.map.insert(
            name.clone(),
            PropertyDescriptor::accessor(slot, flags, getter, setter),
        );
        slot
    }

    /// Strip `CONFIGURABLE` (and, when freezing, `WRITABLE`) from every
    /// live entry.
    pub fn strip_for_seal(&mut self, freeze: bool) {
        for desc in self.map.values_mut() {
            if desc.is_deleted() {
                continue;
            }
            desc.flags.remove(PropertyFlags::CONFIGURABLE);
            if freeze {
                desc.flags.remove(PropertyFlags::WRITABLE);
            }
        }
    }
}
