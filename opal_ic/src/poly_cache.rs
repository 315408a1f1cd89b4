//! Polymorphic inline cache: a fixed bank of single-entry caches for call
//! sites that see more than one receiver shape.
//!
//! Each entry is an ordinary [`PropertyCache`], so the probe, population,
//! and registration rules are identical to the monomorphic case; this
//! module only decides *which* entry a given shape uses.
//!
//! Entry selection hashes the shape id to a home index. A probe checks the
//! home entry first, then scans the rest of the bank, so a shape displaced
//! from its home by a collision is still found. On insert, a colliding
//! incumbent is relocated to the lowest-numbered empty entry rather than
//! evicted; a full bank rejects new shapes and the call site stays on the
//! general path for them.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use opal_runtime::object::shape::ShapeId;

use crate::inline_cache::{CacheStats, PropertyCache};

/// Number of entries in a polymorphic bank.
pub const POLY_CACHE_SIZE: usize = 8;

fn home_index(shape_id: ShapeId) -> usize {
    let mut hasher = FxHasher::default();
    shape_id.raw().hash(&mut hasher);
    (hasher.finish() as usize) & (POLY_CACHE_SIZE - 1)
}

/// Fixed-size bank of inline caches, one per observed receiver shape.
pub struct PolymorphicInlineCache {
    entries: Vec<PropertyCache>,
}

impl PolymorphicInlineCache {
    /// Create a bank of empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: (0..POLY_CACHE_SIZE).map(|_| PropertyCache::new()).collect(),
        }
    }

    /// Find the entry already caching `shape_id`, if any. Home probe
    /// first, then a full scan.
    #[must_use]
    pub fn entry_for(&self, shape_id: ShapeId) -> Option<&PropertyCache> {
        let home = &self.entries[home_index(shape_id)];
        if home.cached_shape_id() == Some(shape_id) {
            return Some(home);
        }
        self.entries
            .iter()
            .find(|entry| entry.cached_shape_id() == Some(shape_id))
    }

    /// Find or make room for an entry for `shape_id`. Returns `None` when
    /// the bank is full of other shapes; nothing is evicted.
    pub fn entry_for_insert(&mut self, shape_id: ShapeId) -> Option<&PropertyCache> {
        if let Some(i) = self
            .entries
            .iter()
            .position(|entry| entry.cached_shape_id() == Some(shape_id))
        {
            return Some(&self.entries[i]);
        }

        let home = home_index(shape_id);
        if self.entries[home].is_empty() {
            return Some(&self.entries[home]);
        }

        // Home is held by a different shape. Relocate the incumbent to the
        // lowest empty entry; the handles move, the cells they share with
        // the registry do not.
        let empty = self.entries.iter().position(PropertyCache::is_empty)?;
        self.entries.swap(home, empty);
        Some(&self.entries[home])
    }

    /// Whether every entry is populated.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.iter().all(|entry| !entry.is_empty())
    }

    /// Number of populated entries.
    #[must_use]
    pub fn populated(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_empty()).count()
    }

    /// Aggregate counter snapshot across the bank.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.entries.iter().fold(CacheStats::default(), |acc, entry| {
            let s = entry.stats();
            CacheStats {
                hits: acc.hits + s.hits,
                misses: acc.misses + s.misses,
            }
        })
    }
}

impl Default for PolymorphicInlineCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolymorphicInlineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolymorphicInlineCache")
            .field("populated", &self.populated())
            .finish()
    }
}
