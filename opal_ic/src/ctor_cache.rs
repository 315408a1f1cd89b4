//! Constructor cache: remembers the shape a constructor's instances end up
//! with, so the next `new F()` can allocate the final layout directly
//! instead of replaying the constructor's property additions one
//! transition at a time.
//!
//! The cache is replace-wholesale: a snapshot is immutable except for two
//! sticky invalidation flags, and updates swap in a fresh snapshot. The
//! first time a construction finishes with a shape other than the cached
//! one, the cache re-learns; a second mismatch marks it polymorphic, after
//! which it is kept (so clones held by in-flight callers observe the flag)
//! but never trusted again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use opal_runtime::object::dyn_object::ObjectRef;
use opal_runtime::object::shape::Shape;
use opal_runtime::value::FunctionRef;

// =============================================================================
// Cache Snapshot
// =============================================================================

/// One learned allocation shape, plus the sticky flags that can outlive
/// the snapshot's validity.
pub struct ConstructorCache {
    shape: Option<Arc<Shape>>,
    /// How many times the cache has re-learned after a mismatch.
    update_count: u8,
    /// Instances settle on more than one shape; never trust this cache.
    polymorphic: AtomicBool,
    /// `F.prototype` was reassigned while this snapshot was current.
    prototype_changed: AtomicBool,
    /// A shape is installed, so allocation can skip building the instance
    /// up from the root shape.
    skip_default_alloc: bool,
    /// The cached shape has not yet been confirmed by a completed
    /// construction.
    needs_update_after_ctor: AtomicBool,
}

impl ConstructorCache {
    /// A cache that has observed nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            shape: None,
            update_count: 0,
            polymorphic: AtomicBool::new(false),
            prototype_changed: AtomicBool::new(false),
            skip_default_alloc: false,
            needs_update_after_ctor: AtomicBool::new(true),
        }
    }

    fn learned(shape: Arc<Shape>, update_count: u8) -> Self {
        Self {
            shape: Some(shape),
            update_count,
            polymorphic: AtomicBool::new(false),
            prototype_changed: AtomicBool::new(false),
            skip_default_alloc: true,
            needs_update_after_ctor: AtomicBool::new(true),
        }
    }

    /// The cached shape, iff this snapshot is still trustworthy.
    #[must_use]
    pub fn valid_shape(&self) -> Option<&Arc<Shape>> {
        if self.polymorphic.load(Ordering::Acquire)
            || self.prototype_changed.load(Ordering::Acquire)
        {
            return None;
        }
        self.shape.as_ref()
    }

    /// Whether instances have settled on more than one shape.
    #[must_use]
    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic.load(Ordering::Acquire)
    }

    /// Whether allocation may skip the build-from-root path.
    #[must_use]
    pub fn skips_default_alloc(&self) -> bool {
        self.skip_default_alloc && self.valid_shape().is_some()
    }

    /// Whether the snapshot still awaits confirmation by a completed
    /// construction.
    #[must_use]
    pub fn needs_update_after_ctor(&self) -> bool {
        self.needs_update_after_ctor.load(Ordering::Acquire)
    }

    /// Re-learn count of this snapshot.
    #[must_use]
    pub fn update_count(&self) -> u8 {
        self.update_count
    }

    fn mark_polymorphic(&self) {
        self.polymorphic.store(true, Ordering::Release);
    }

    fn mark_prototype_changed(&self) {
        self.prototype_changed.store(true, Ordering::Release);
    }

    fn confirm(&self) {
        self.needs_update_after_ctor.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ConstructorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorCache")
            .field("shape", &self.shape.as_ref().map(|s| s.id()))
            .field("update_count", &self.update_count)
            .field("polymorphic", &self.is_polymorphic())
            .finish()
    }
}

// =============================================================================
// Constructor Function
// =============================================================================

/// A constructible function: identity, its `prototype` object, and the
/// current cache snapshot.
pub struct ConstructorFunction {
    func: FunctionRef,
    prototype: RwLock<Option<ObjectRef>>,
    cache: Mutex<Arc<ConstructorCache>>,
    fast_path_hits: AtomicU64,
    invalidations: AtomicU64,
}

impl ConstructorFunction {
    /// Create a constructor with no prototype object and an empty cache.
    #[must_use]
    pub fn new(func: FunctionRef) -> Self {
        Self {
            func,
            prototype: RwLock::new(None),
            cache: Mutex::new(Arc::new(ConstructorCache::empty())),
            fast_path_hits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// The underlying function identity.
    #[must_use]
    pub fn func(&self) -> &FunctionRef {
        &self.func
    }

    /// The current `prototype` object, if assigned.
    #[must_use]
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.prototype.read().clone()
    }

    /// The current cache snapshot.
    #[must_use]
    pub fn cache(&self) -> Arc<ConstructorCache> {
        Arc::clone(&self.cache.lock())
    }

    /// Reassign `F.prototype`. Monomorphic caches are replaced wholesale;
    /// a polymorphic snapshot is retained, flagged, so in-flight holders
    /// observe the change.
    pub fn set_prototype(&self, proto: Option<ObjectRef>) {
        *self.prototype.write() = proto;
        let mut cache = self.cache.lock();
        if cache.is_polymorphic() {
            cache.mark_prototype_changed();
        } else {
            *cache = Arc::new(ConstructorCache::empty());
        }
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the shape an instance ended construction with.
    ///
    /// Empty cache learns; a matching shape confirms the snapshot; the
    /// first mismatch re-learns and the second marks the cache
    /// polymorphic.
    pub fn note_final_shape(&self, final_shape: &Arc<Shape>) {
        let mut cache = self.cache.lock();
        match &cache.shape {
            None => {
                if !cache.is_polymorphic() {
                    *cache = Arc::new(ConstructorCache::learned(
                        Arc::clone(final_shape),
                        cache.update_count,
                    ));
                }
            }
            Some(learned) if learned.id() == final_shape.id() => {
                cache.confirm();
            }
            Some(_) => {
                if cache.update_count >= 1 {
                    cache.mark_polymorphic();
                } else {
                    *cache = Arc::new(ConstructorCache::learned(
                        Arc::clone(final_shape),
                        cache.update_count + 1,
                    ));
                }
            }
        }
    }

    /// Count one allocation that used the cached shape.
    pub fn count_fast_path_hit(&self) {
        self.fast_path_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Fast-path allocation count.
    #[must_use]
    pub fn fast_path_hits(&self) -> u64 {
        self.fast_path_hits.load(Ordering::Relaxed)
    }

    /// Prototype-reassignment count.
    #[must_use]
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ConstructorFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstructorFunction")
            .field("func", &self.func)
            .field("cache", &*self.cache.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::intern::NameInterner;
    use opal_runtime::object::shape::ShapeContext;

    fn shape_after_add(shapes: &ShapeContext, names: &NameInterner, name: &str) -> Arc<Shape> {
        let name = names.intern(name);
        let (shape, _) = shapes
            .transition_add(&shapes.root(), &name, shapes.default_flags())
            .expect("add");
        shape
    }

    #[test]
    fn test_empty_cache_has_no_valid_shape() {
        let ctor = ConstructorFunction::new(FunctionRef::new("F"));
        assert!(ctor.cache().valid_shape().is_none());
        assert!(!ctor.cache().skips_default_alloc());
    }

    #[test]
    fn test_first_construction_learns_shape() {
        let shapes = ShapeContext::new();
        let names = NameInterner::new();
        let shape = shape_after_add(&shapes, &names, "x");

        let ctor = ConstructorFunction::new(FunctionRef::new("F"));
        ctor.note_final_shape(&shape);

        let cache = ctor.cache();
        let cached = cache.valid_shape().expect("learned");
        assert!(Arc::ptr_eq(cached, &shape));
        assert!(cache.skips_default_alloc());
        assert!(cache.needs_update_after_ctor());
    }

    #[test]
    fn test_matching_construction_confirms() {
        let shapes = ShapeContext::new();
        let names = NameInterner::new();
        let shape = shape_after_add(&shapes, &names, "x");

        let ctor = ConstructorFunction::new(FunctionRef::new("F"));
        ctor.note_final_shape(&shape);
        ctor.note_final_shape(&shape);
        assert!(!ctor.cache().needs_update_after_ctor());
    }

    #[test]
    fn test_first_mismatch_relearns_second_goes_polymorphic() {
        let shapes = ShapeContext::new();
        let names = NameInterner::new();
        let a = shape_after_add(&shapes, &names, "a");
        let b = shape_after_add(&shapes, &names, "b");
        let c = shape_after_add(&shapes, &names, "c");

        let ctor = ConstructorFunction::new(FunctionRef::new("F"));
        ctor.note_final_shape(&a);

        // First mismatch: re-learn
        ctor.note_final_shape(&b);
        let cache = ctor.cache();
        assert!(Arc::ptr_eq(cache.valid_shape().expect("relearned"), &b));
        assert_eq!(cache.update_count(), 1);

        // Second mismatch: polymorphic, snapshot retained
        ctor.note_final_shape(&c);
        assert!(cache.is_polymorphic());
        assert!(ctor.cache().valid_shape().is_none());

        // Polymorphic caches never learn again
        ctor.note_final_shape(&c);
        assert!(ctor.cache().is_polymorphic());
    }

    #[test]
    fn test_prototype_reassignment_replaces_monomorphic_cache() {
        let shapes = ShapeContext::new();
        let names = NameInterner::new();
        let shape = shape_after_add(&shapes, &names, "x");

        let ctor = ConstructorFunction::new(FunctionRef::new("F"));
        ctor.note_final_shape(&shape);
        let before = ctor.cache();

        ctor.set_prototype(None);
        assert!(ctor.cache().valid_shape().is_none());
        assert_eq!(ctor.invalidations(), 1);
        // Replaced wholesale, old snapshot untouched
        assert!(before.valid_shape().is_some());
    }

    #[test]
    fn test_prototype_reassignment_flags_polymorphic_cache_in_place() {
        let shapes = ShapeContext::new();
        let names = NameInterner::new();
        let a = shape_after_add(&shapes, &names, "a");
        let b = shape_after_add(&shapes, &names, "b");
        let c = shape_after_add(&shapes, &names, "c");

        let ctor = ConstructorFunction::new(FunctionRef::new("F"));
        ctor.note_final_shape(&a);
        ctor.note_final_shape(&b);
        ctor.note_final_shape(&c);
        let held = ctor.cache();
        assert!(held.is_polymorphic());

        ctor.set_prototype(None);
        // Same snapshot, now also flagged for the prototype change
        assert!(Arc::ptr_eq(&held, &ctor.cache()));
        assert!(held.valid_shape().is_none());
    }
}
