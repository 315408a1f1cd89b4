//! Indexed-element layout: per-index descriptors for array-like objects.
//!
//! An array-like object converts to this layout once any numeric index is
//! given explicit attributes, a getter/setter, or the object is sealed or
//! frozen (which forces every index to be individually trackable). Named
//! properties keep living in the wrapped `HashedLayout`.
//!
//! Deleted index entries are retained as tombstones rather than erased,
//! which keeps enumeration cursors stable across deletions.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::object::descriptor::{IndexedPropertyDescriptor, PropertyFlags};
use crate::object::layout::HashedLayout;

// =============================================================================
// Index Descriptor Map
// =============================================================================

/// Sparse map of explicit per-index descriptors with ordered enumeration
/// support.
///
/// The sorted index list is rebuilt lazily after mutations; forward
/// enumeration continues in amortized O(1) from a last-visited cursor and
/// falls back to binary search when restarted at an arbitrary index.
#[derive(Debug)]
pub struct IndexDescriptorMap {
    map: FxHashMap<u32, IndexedPropertyDescriptor>,
    enum_state: Mutex<EnumState>,
}

#[derive(Debug, Default)]
struct EnumState {
    /// Sorted indices of every entry, tombstones included.
    sorted: Vec<u32>,
    dirty: bool,
    /// Last index handed out and its position in `sorted`.
    last: Option<(u32, usize)>,
}

impl IndexDescriptorMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            enum_state: Mutex::new(EnumState::default()),
        }
    }

    /// Get the explicit descriptor for an index, if any.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&IndexedPropertyDescriptor> {
        self.map.get(&index)
    }

    /// Insert or replace the descriptor for an index.
    pub fn insert(&mut self, index: u32, desc: IndexedPropertyDescriptor) {
        let fresh = self.map.insert(index, desc).is_none();
        if fresh {
            self.enum_state.get_mut().dirty = true;
        }
    }

    /// Tombstone an index. Returns `true` if anything changed.
    ///
    /// An index with no explicit descriptor gets a tombstone entry so that
    /// enumeration skips it from now on.
    pub fn tombstone(&mut self, index: u32) -> bool {
        match self.map.get_mut(&index) {
            Some(desc) if desc.is_deleted() => false,
            Some(desc) => {
                desc.mark_deleted();
                true
            }
            None => {
                self.map
                    .insert(index, IndexedPropertyDescriptor::data(PropertyFlags::DELETED));
                self.enum_state.get_mut().dirty = true;
                true
            }
        }
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

    /// Next live index strictly after `after` (or the first live index
    /// when `after` is `None`), in ascending order.
    pub fn next_live_index(&self, after: Option<u32>) -> Option<u32> {
        let mut state = self.enum_state.lock();
        if state.dirty {
            let mut sorted: Vec<u32> = self.map.keys().copied().collect();
            sorted.sort_unstable();
            state.sorted = sorted;
            state.dirty = false;
            state.last = None;
        }

        let start = match after {
            None => 0,
            Some(a) => match state.last {
                // Continuation from the cursor: O(1)
                Some((last_index, pos)) if last_index == a => pos + 1,
                // Arbitrary restart: binary search
                _ => match state.sorted.binary_search(&a) {
                    Ok(pos) => pos + 1,
                    Err(pos) => pos,
                },
            },
        };

        for pos in start..state.sorted.len() {
            let index = state.sorted[pos];
            if self.map.get(&index).is_some_and(|d| !d.is_deleted()) {
                state.last = Some((index, pos));
                return Some(index);
            }
        }
        None
    }
}

impl Default for IndexDescriptorMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for IndexDescriptorMap {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            // The clone rebuilds its sorted list on first enumeration.
            enum_state: Mutex::new(EnumState {
                sorted: Vec::new(),
                dirty: true,
                last: None,
            }),
        }
    }
}

// =============================================================================
// Indexed-Element Layout
// =============================================================================

/// Hashed named properties plus per-index element descriptors.
#[derive(Debug, Clone)]
pub struct IndexedElementLayout {
    named: HashedLayout,
    indices: IndexDescriptorMap,
    /// Attributes applied to indices with no explicit descriptor.
    default_item_flags: PropertyFlags,
    /// Gate on growing the element backing past its previous length.
    length_writable: bool,
}

impl IndexedElementLayout {
    /// Wrap a hashed layout, starting with no explicit index descriptors.
    #[must_use]
    pub fn from_hashed(named: HashedLayout, default_item_flags: PropertyFlags) -> Self {
        Self {
            named,
            indices: IndexDescriptorMap::new(),
            default_item_flags,
            length_writable: true,
        }
    }

    /// The named-property side.
    #[must_use]
    pub fn named(&self) -> &HashedLayout {
        &self.named
    }

    /// Mutable named-property side.
    pub fn named_mut(&mut self) -> &mut HashedLayout {
        &mut self.named
    }

    /// The explicit index-descriptor map.
    #[must_use]
    pub fn indices(&self) -> &IndexDescriptorMap {
        &self.indices
    }

    /// Effective attribute flags for an index: its explicit descriptor's,
    /// or the shared default item attributes.
    #[must_use]
    pub fn index_flags(&self, index: u32) -> PropertyFlags {
        self.indices
            .get(index)
            .map_or(self.default_item_flags, |d| d.flags)
    }

    /// The explicit descriptor for an index, if any.
    #[must_use]
    pub fn index_descriptor(&self, index: u32) -> Option<&IndexedPropertyDescriptor> {
        self.indices.get(index)
    }

    /// Install or replace an explicit index descriptor.
    pub fn define_index(&mut self, index: u32, desc: IndexedPropertyDescriptor) {
        self.indices.insert(index, desc);
    }

    /// Tombstone an index. Returns `true` if anything changed.
    pub fn tombstone_index(&mut self, index: u32) -> bool {
        self.indices.tombstone(index)
    }

    /// Whether the element backing may grow past its previous length.
    #[must_use]
    pub fn can_grow(&self) -> bool {
        self.length_writable
    }

    /// Set the length-writability gate.
    pub fn set_length_writable(&mut self, writable: bool) {
        self.length_writable = writable;
    }

    /// Shared default item attributes.
    #[must_use]
    pub fn default_item_flags(&self) -> PropertyFlags {
        self.default_item_flags
    }

    /// Seal or freeze every index: strips the shared default attributes
    /// and every explicit live descriptor; freezing also locks the length.
    pub fn seal_indices(&mut self, freeze: bool) {
        self.default_item_flags.remove(PropertyFlags::CONFIGURABLE);
        if freeze {
            self.default_item_flags.remove(PropertyFlags::WRITABLE);
            self.length_writable = false;
        }
        self.indices.strip_for_seal(freeze);
    }

    /// Next live explicitly-described index after `after`.
    pub fn next_live_index(&self, after: Option<u32>) -> Option<u32> {
        self.indices.next_live_index(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_desc() -> IndexedPropertyDescriptor {
        IndexedPropertyDescriptor::data(PropertyFlags::data())
    }

    // -------------------------------------------------------------------------
    // Index descriptor map
    // -------------------------------------------------------------------------

    #[test]
    fn test_forward_enumeration_in_sorted_order() {
        let mut map = IndexDescriptorMap::new();
        map.insert(10, data_desc());
        map.insert(2, data_desc());
        map.insert(7, data_desc());

        assert_eq!(map.next_live_index(None), Some(2));
        assert_eq!(map.next_live_index(Some(2)), Some(7));
        assert_eq!(map.next_live_index(Some(7)), Some(10));
        assert_eq!(map.next_live_index(Some(10)), None);
    }

    #[test]
    fn test_enumeration_skips_tombstones_but_retains_entries() {
        let mut map = IndexDescriptorMap::new();
        map.insert(1, data_desc());
        map.insert(2, data_desc());
        map.insert(3, data_desc());
        map.tombstone(2);

        assert_eq!(map.len(), 3); // Tombstone retained
        assert_eq!(map.live_count(), 2);
        assert_eq!(map.next_live_index(Some(1)), Some(3));
    }

    #[test]
    fn test_enumeration_restart_at_arbitrary_index() {
        let mut map = IndexDescriptorMap::new();
        for i in [4u32, 8, 15, 16, 23, 42] {
            map.insert(i, data_desc());
        }

        // Walk forward a bit to set the cursor
        assert_eq!(map.next_live_index(None), Some(4));
        assert_eq!(map.next_live_index(Some(4)), Some(8));

        // Restart somewhere the cursor does not match (binary search path)
        assert_eq!(map.next_live_index(Some(16)), Some(23));
        // Restart at a value between entries
        assert_eq!(map.next_live_index(Some(20)), Some(23));
    }

    #[test]
    fn test_tombstone_of_unrecorded_index_inserts_entry() {
        let mut map = IndexDescriptorMap::new();
        assert!(map.tombstone(5));
        assert!(!map.tombstone(5)); // Already tombstoned
        assert_eq!(map.len(), 1);
        assert_eq!(map.live_count(), 0);
    }

    #[test]
    fn test_insert_after_enumeration_refreshes_sorted_list() {
        let mut map = IndexDescriptorMap::new();
        map.insert(1, data_desc());
        assert_eq!(map.next_live_index(None), Some(1));

        map.insert(0, data_desc());
        assert_eq!(map.next_live_index(None), Some(0));
        assert_eq!(map.next_live_index(Some(0)), Some(1));
    }

    // -------------------------------------------------------------------------
    // Indexed-element layout
    // -------------------------------------------------------------------------

    #[test]
    fn test_default_item_flags_apply_without_explicit_descriptor() {
        let layout = IndexedElementLayout::from_hashed(
            HashedLayout::new(8, false),
            PropertyFlags::data(),
        );
        assert!(layout.index_flags(99).is_writable());
        assert!(layout.index_descriptor(99).is_none());
    }

    #[test]
    fn test_explicit_descriptor_overrides_defaults() {
        let mut layout = IndexedElementLayout::from_hashed(
            HashedLayout::new(8, false),
            PropertyFlags::data(),
        );
        layout.define_index(3, IndexedPropertyDescriptor::data(PropertyFlags::frozen_data()));

        assert!(!layout.index_flags(3).is_writable());
        assert!(layout.index_flags(4).is_writable());
    }

    #[test]
    fn test_freeze_locks_length_and_strips_writability() {
        let mut layout = IndexedElementLayout::from_hashed(
            HashedLayout::new(8, false),
            PropertyFlags::data(),
        );
        layout.define_index(0, data_desc());

        layout.seal_indices(false);
        assert!(layout.can_grow());
        assert!(!layout.index_flags(0).is_configurable());
        assert!(layout.index_flags(0).is_writable());

        layout.seal_indices(true);
        assert!(!layout.can_grow());
        assert!(!layout.index_flags(0).is_writable());
        assert!(!layout.index_flags(7).is_writable()); // Default flags too
    }
}
