//! Property descriptors: attribute flags and slot references.

use crate::value::FunctionRef;

// =============================================================================
// Property Attributes
// =============================================================================

bitflags::bitflags! {
    /// Per-property attribute flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyFlags: u8 {
        /// Property value can be changed.
        const WRITABLE = 1 << 0;
        /// Property appears in enumeration.
        const ENUMERABLE = 1 << 1;
        /// Property can be deleted or have attributes changed.
        const CONFIGURABLE = 1 << 2;
        /// Tombstone: the property was deleted but its slot is retained so
        /// surviving slot references never shift.
        const DELETED = 1 << 3;
        /// Property is an accessor (getter/setter) rather than a data slot.
        const ACCESSOR = 1 << 4;
        /// Root-object binding that can be reassigned but never deleted
        /// (let/const-like declaration on the global object).
        const NO_DELETE = 1 << 5;
    }
}

impl Default for PropertyFlags {
    /// Default data-property attributes: writable, enumerable, configurable.
    #[inline]
    fn default() -> Self {
        Self::data()
    }
}

impl PropertyFlags {
    /// Standard data property: writable, enumerable, configurable.
    #[inline]
    pub const fn data() -> Self {
        Self::WRITABLE
            .union(Self::ENUMERABLE)
            .union(Self::CONFIGURABLE)
    }

    /// Data property on a sealed object: writable but not configurable.
    #[inline]
    pub const fn sealed_data() -> Self {
        Self::WRITABLE.union(Self::ENUMERABLE)
    }

    /// Data property on a frozen object: neither writable nor configurable.
    #[inline]
    pub const fn frozen_data() -> Self {
        Self::ENUMERABLE
    }

    /// Root-object let-like binding: reassignable, not deletable.
    #[inline]
    pub const fn let_binding() -> Self {
        Self::WRITABLE.union(Self::ENUMERABLE).union(Self::NO_DELETE)
    }

    /// Check the writable bit.
    #[inline]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Check the enumerable bit.
    #[inline]
    pub const fn is_enumerable(self) -> bool {
        self.contains(Self::ENUMERABLE)
    }

    /// Check the configurable bit.
    #[inline]
    pub const fn is_configurable(self) -> bool {
        self.contains(Self::CONFIGURABLE)
    }

    /// Check the tombstone bit.
    #[inline]
    pub const fn is_deleted(self) -> bool {
        self.contains(Self::DELETED)
    }

    /// Check whether deletion is permitted (configurable and not a
    /// no-delete binding).
    #[inline]
    pub const fn is_deletable(self) -> bool {
        self.contains(Self::CONFIGURABLE) && !self.contains(Self::NO_DELETE)
    }
}

// =============================================================================
// Slot References
// =============================================================================

/// Which storage region a slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotRegion {
    /// Fixed-capacity storage embedded in the object itself.
    Inline,
    /// Independently growable side array.
    Overflow,
}

/// A property's storage location: slot index plus storage region.
///
/// The region is an explicit field rather than a tag bit folded into the
/// cache key; two slots with the same index but different regions never
/// alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotRef {
    /// Storage region.
    pub region: SlotRegion,
    /// 0-based index within the region.
    pub index: u16,
}

impl SlotRef {
    /// Reference an inline slot.
    #[inline]
    #[must_use]
    pub const fn inline(index: u16) -> Self {
        Self {
            region: SlotRegion::Inline,
            index,
        }
    }

    /// Reference an overflow slot.
    #[inline]
    #[must_use]
    pub const fn overflow(index: u16) -> Self {
        Self {
            region: SlotRegion::Overflow,
            index,
        }
    }

    /// Check if this references inline storage.
    #[inline]
    #[must_use]
    pub const fn is_inline(self) -> bool {
        matches!(self.region, SlotRegion::Inline)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// Getter/setter pair for an accessor property.
#[derive(Debug, Clone)]
pub struct AccessorPair {
    /// The getter, if any.
    pub getter: Option<FunctionRef>,
    /// The setter, if any.
    pub setter: Option<FunctionRef>,
}

/// Describes one named property: its slot, attributes, and (for accessor
/// properties) the getter/setter pair.
///
/// Invariant: for the lifetime of one layout instance, a given name always
/// maps to the same `SlotRef` — deletion tombstones the entry rather than
/// freeing the slot.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Storage location of the property value.
    pub slot: SlotRef,
    /// Attribute flags.
    pub flags: PropertyFlags,
    /// Accessor pair, present iff `flags` has `ACCESSOR`.
    pub accessor: Option<Box<AccessorPair>>,
}

impl PropertyDescriptor {
    /// Create a data property descriptor.
    #[inline]
    #[must_use]
    pub fn data(slot: SlotRef, flags: PropertyFlags) -> Self {
        Self {
            slot,
            flags,
            accessor: None,
        }
    }

    /// Create an accessor property descriptor.
    #[must_use]
    pub fn accessor(
        slot: SlotRef,
        flags: PropertyFlags,
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
    ) -> Self {
        Self {
            slot,
            flags: flags | PropertyFlags::ACCESSOR,
            accessor: Some(Box::new(AccessorPair { getter, setter })),
        }
    }

    /// Check if the property value can be changed.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags.is_writable()
    }

    /// Check if attributes can be changed and the property deleted.
    #[inline]
    pub fn is_configurable(&self) -> bool {
        self.flags.is_configurable()
    }

    /// Check if this entry is a tombstone.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.is_deleted()
    }

    /// Check if this is an accessor property.
    #[inline]
    pub fn is_accessor(&self) -> bool {
        self.flags.contains(PropertyFlags::ACCESSOR)
    }

    /// Tombstone this entry in place, retaining the slot.
    pub fn mark_deleted(&mut self) {
        self.flags = PropertyFlags::DELETED;
        self.accessor = None;
    }

    /// Revive a tombstoned entry with fresh attributes, reusing the slot.
    pub fn revive(&mut self, flags: PropertyFlags) {
        debug_assert!(self.is_deleted());
        self.flags = flags;
        self.accessor = None;
    }
}

/// Describes one numeric index of an array-like object with an explicit
/// per-index override (attributes and/or accessors).
///
/// Entries marked `DELETED` are retained rather than erased, preserving
/// enumeration-cursor stability.
#[derive(Debug, Clone)]
pub struct IndexedPropertyDescriptor {
    /// Attribute flags for this index.
    pub flags: PropertyFlags,
    /// The getter, if this index is an accessor.
    pub getter: Option<FunctionRef>,
    /// The setter, if this index is an accessor.
    pub setter: Option<FunctionRef>,
}

impl IndexedPropertyDescriptor {
    /// Create a data-index descriptor.
    #[inline]
    #[must_use]
    pub fn data(flags: PropertyFlags) -> Self {
        Self {
            flags,
            getter: None,
            setter: None,
        }
    }

    /// Create an accessor-index descriptor.
    #[must_use]
    pub fn accessor(
        flags: PropertyFlags,
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
    ) -> Self {
        Self {
            flags: flags | PropertyFlags::ACCESSOR,
            getter,
            setter,
        }
    }

    /// Check if this entry is a tombstone.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.is_deleted()
    }

    /// Tombstone this entry in place.
    pub fn mark_deleted(&mut self) {
        self.flags = PropertyFlags::DELETED;
        self.getter = None;
        self.setter = None;
    }
}
