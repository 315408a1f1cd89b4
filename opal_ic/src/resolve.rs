//! Cache-accelerated property resolution and the mutation paths that keep
//! the caches honest.
//!
//! The resolvers are the interpreter-facing surface: each property access
//! site calls `resolve_for_read`/`resolve_for_write` (or the polymorphic
//! variants) with its own cache. A probe hit short-circuits the lookup; a
//! miss falls through to the general resolver, which walks the prototype
//! chain, populates the cache, and registers it with the invalidation
//! registry per the rules in [`crate::inline_cache`].
//!
//! A `PropertyCache` belongs to one access site and therefore to one kind
//! of access: read sites and write sites use separate caches, so a
//! read-populated entry is never consulted to justify a write.
//!
//! The mutation wrappers (`delete_property`, `define_accessor`,
//! `reconfigure_property`, `seal_object`, `freeze_object`,
//! `set_prototype`) are the paths that can falsify cached facts held by
//! *other* objects' caches; they consult the registry whenever the mutated
//! object is flagged as a prototype. Plain data writes never invalidate:
//! Proto-kind caches hold the holder and slot, not the value.

use std::sync::Arc;

use opal_core::error::{OpalError, OpalResult};
use opal_core::intern::{NameInterner, PropertyName};

use opal_runtime::object::descriptor::PropertyFlags;
use opal_runtime::object::dyn_object::{DynObject, ObjectRef, OwnProperty, SetOutcome};
use opal_runtime::object::shape::{ShapeContext, ShapeId};
use opal_runtime::value::{FunctionRef, Value};

use crate::ctor_cache::ConstructorFunction;
use crate::inline_cache::PropertyCache;
use crate::invalidation::InvalidationRegistry;
use crate::poly_cache::PolymorphicInlineCache;

// =============================================================================
// Engine Context
// =============================================================================

/// Everything one execution context owns: the shape universe, the name
/// interner, and the cache invalidation registry. No global state; two
/// contexts never share shapes or names.
pub struct EngineContext {
    /// Shape publication and transition-edge caching.
    pub shapes: ShapeContext,
    /// Property name interning.
    pub names: NameInterner,
    /// Cache back-references for prototype-chain invalidation.
    pub registry: InvalidationRegistry,
}

impl EngineContext {
    /// Create a fresh context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shapes: ShapeContext::new(),
            names: NameInterner::new(),
            registry: InvalidationRegistry::new(),
        }
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("shapes", &self.shapes.stats())
            .field("registry", &self.registry.stats())
            .finish()
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a property read.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A data value.
    Value(Value),
    /// An accessor property; the caller invokes the getter against the
    /// receiver.
    Accessor {
        /// The getter, if any (`None` reads as undefined).
        getter: Option<FunctionRef>,
        /// The ancestor holding the accessor, when not on the receiver.
        holder: Option<ObjectRef>,
    },
    /// Not found anywhere on the chain.
    Absent,
}

/// Result of a property write.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The value was stored.
    Written,
    /// An accessor intercepts the write; the caller invokes the setter
    /// against the receiver.
    AccessorNeeded {
        /// The setter, if any (`None` means the write is dropped, or
        /// raised as an error by a strict-mode caller).
        setter: Option<FunctionRef>,
        /// The ancestor holding the accessor, when not on the receiver.
        holder: Option<ObjectRef>,
    },
}

// =============================================================================
// Probes
// =============================================================================

fn probe_read(
    cache: &PropertyCache,
    shape_id: ShapeId,
    receiver: &ObjectRef,
) -> Option<ReadOutcome> {
    if let Some(slot) = cache.try_local(shape_id) {
        // A fail-closed slot read falls back to the general path.
        return receiver.read().read_slot(slot).map(ReadOutcome::Value);
    }
    if let Some((holder, slot)) = cache.try_proto(shape_id) {
        return holder.read().read_slot(slot).map(ReadOutcome::Value);
    }
    if let Some(hit) = cache.try_accessor(shape_id) {
        return Some(ReadOutcome::Accessor {
            getter: hit.getter,
            holder: hit.holder,
        });
    }
    None
}

fn probe_write(
    ctx: &EngineContext,
    cache: &PropertyCache,
    shape_id: ShapeId,
    receiver: &ObjectRef,
    name: &PropertyName,
    value: &Value,
) -> Option<OpalResult<WriteOutcome>> {
    if let Some(slot) = cache.try_local(shape_id) {
        if receiver.write().write_slot_checked(slot, value.clone()) {
            return Some(Ok(WriteOutcome::Written));
        }
        return None;
    }
    if let Some((new_shape, slot)) = cache.try_set_with_transition(shape_id) {
        // Replay the cached add-property transition wholesale.
        {
            let mut guard = receiver.write();
            if let Err(err) = guard.store_slot(slot, value.clone()) {
                return Some(Err(err));
            }
            guard.set_shape(Arc::clone(&new_shape));
        }
        if new_shape.is_prototype() {
            ctx.registry.invalidate(name);
        }
        return Some(Ok(WriteOutcome::Written));
    }
    if let Some(hit) = cache.try_accessor(shape_id) {
        return Some(Ok(WriteOutcome::AccessorNeeded {
            setter: hit.setter,
            holder: hit.holder,
        }));
    }
    None
}

// =============================================================================
// Resolvers
// =============================================================================

/// Read `name` from `receiver` through a monomorphic cache.
pub fn resolve_for_read(
    ctx: &EngineContext,
    cache: &PropertyCache,
    receiver: &ObjectRef,
    name: &PropertyName,
) -> ReadOutcome {
    let shape_id = receiver.read().shape_id();
    if let Some(outcome) = probe_read(cache, shape_id, receiver) {
        return outcome;
    }
    general_read(ctx, receiver, name, Some(cache))
}

/// Write `name` on `receiver` through a monomorphic cache.
pub fn resolve_for_write(
    ctx: &EngineContext,
    cache: &PropertyCache,
    receiver: &ObjectRef,
    name: &PropertyName,
    value: Value,
) -> OpalResult<WriteOutcome> {
    let shape_id = receiver.read().shape_id();
    if let Some(result) = probe_write(ctx, cache, shape_id, receiver, name, &value) {
        return result;
    }
    general_write(ctx, receiver, name, value, Some(cache))
}

/// Read `name` from `receiver` through a polymorphic cache bank.
pub fn resolve_for_read_poly(
    ctx: &EngineContext,
    bank: &mut PolymorphicInlineCache,
    receiver: &ObjectRef,
    name: &PropertyName,
) -> ReadOutcome {
    let shape_id = receiver.read().shape_id();
    if let Some(entry) = bank.entry_for(shape_id) {
        if let Some(outcome) = probe_read(entry, shape_id, receiver) {
            return outcome;
        }
        return general_read(ctx, receiver, name, Some(entry));
    }
    match bank.entry_for_insert(shape_id) {
        Some(entry) => general_read(ctx, receiver, name, Some(entry)),
        // Full bank: this shape stays on the general path.
        None => general_read(ctx, receiver, name, None),
    }
}

/// Write `name` on `receiver` through a polymorphic cache bank.
pub fn resolve_for_write_poly(
    ctx: &EngineContext,
    bank: &mut PolymorphicInlineCache,
    receiver: &ObjectRef,
    name: &PropertyName,
    value: Value,
) -> OpalResult<WriteOutcome> {
    let shape_id = receiver.read().shape_id();
    if let Some(entry) = bank.entry_for(shape_id) {
        if let Some(result) = probe_write(ctx, entry, shape_id, receiver, name, &value) {
            return result;
        }
        return general_write(ctx, receiver, name, value, Some(entry));
    }
    match bank.entry_for_insert(shape_id) {
        Some(entry) => general_write(ctx, receiver, name, value, Some(entry)),
        None => general_write(ctx, receiver, name, value, None),
    }
}

/// Read `name` from `receiver` through the general path only. Populates
/// no cache; the oracle the cached paths must agree with.
pub fn read_property(ctx: &EngineContext, receiver: &ObjectRef, name: &PropertyName) -> ReadOutcome {
    general_read(ctx, receiver, name, None)
}

/// Write `name` on `receiver` through the general path only.
pub fn write_property(
    ctx: &EngineContext,
    receiver: &ObjectRef,
    name: &PropertyName,
    value: Value,
) -> OpalResult<WriteOutcome> {
    general_write(ctx, receiver, name, value, None)
}

// =============================================================================
// General Paths
// =============================================================================

/// Ensure a chain object carries the prototype flag before a cache comes
/// to depend on the chain through it; the flag is what routes later
/// mutations of the object through the registry. Every object a caching
/// resolve traverses gets the flag, not just the final holder: an add on
/// an intermediate link can shadow the cached fact just as well.
fn mark_as_chain_member(ctx: &EngineContext, holder: &ObjectRef) {
    if !holder.read().shape().is_prototype() {
        holder.write().mark_as_prototype(&ctx.shapes);
    }
}

enum ChainFind {
    Data {
        slot: opal_runtime::object::descriptor::SlotRef,
        flags: PropertyFlags,
        value: Value,
    },
    Accessor {
        getter: Option<FunctionRef>,
        setter: Option<FunctionRef>,
    },
}

fn general_read(
    ctx: &EngineContext,
    receiver: &ObjectRef,
    name: &PropertyName,
    cache: Option<&PropertyCache>,
) -> ReadOutcome {
    let receiver_shape = {
        let guard = receiver.read();
        match guard.own_property(name) {
            Some(OwnProperty::Data { slot, .. }) => {
                let value = guard.read_slot(slot).unwrap_or_default();
                let shape = Arc::clone(guard.shape());
                drop(guard);
                if let Some(cache) = cache {
                    cache.cache_local(&ctx.registry, name, shape, slot, None);
                }
                return ReadOutcome::Value(value);
            }
            Some(OwnProperty::Accessor { getter, setter, .. }) => {
                let shape = Arc::clone(guard.shape());
                drop(guard);
                if let Some(cache) = cache {
                    cache.cache_accessor(
                        &ctx.registry,
                        name,
                        shape,
                        None,
                        getter.clone(),
                        setter,
                        true,
                    );
                }
                return ReadOutcome::Accessor {
                    getter,
                    holder: None,
                };
            }
            // A tombstone does not shadow the chain.
            Some(OwnProperty::Deleted) | None => Arc::clone(guard.shape()),
        }
    };

    let mut current = receiver.read().prototype().cloned();
    while let Some(holder) = current {
        if cache.is_some() {
            mark_as_chain_member(ctx, &holder);
        }
        let found = {
            let guard = holder.read();
            match guard.own_property(name) {
                Some(OwnProperty::Data { slot, flags }) => Some(ChainFind::Data {
                    slot,
                    flags,
                    value: guard.read_slot(slot).unwrap_or_default(),
                }),
                Some(OwnProperty::Accessor { getter, setter, .. }) => {
                    Some(ChainFind::Accessor { getter, setter })
                }
                Some(OwnProperty::Deleted) | None => None,
            }
        };
        match found {
            Some(ChainFind::Data { slot, value, .. }) => {
                if let Some(cache) = cache {
                    cache.cache_proto(
                        &ctx.registry,
                        name,
                        Arc::clone(&receiver_shape),
                        holder.clone(),
                        slot,
                    );
                }
                return ReadOutcome::Value(value);
            }
            Some(ChainFind::Accessor { getter, setter }) => {
                if let Some(cache) = cache {
                    cache.cache_accessor(
                        &ctx.registry,
                        name,
                        Arc::clone(&receiver_shape),
                        Some(holder.clone()),
                        getter.clone(),
                        setter,
                        false,
                    );
                }
                return ReadOutcome::Accessor {
                    getter,
                    holder: Some(holder),
                };
            }
            None => {
                current = holder.read().prototype().cloned();
            }
        }
    }

    // Absence is never cached; the next access resolves again.
    ReadOutcome::Absent
}

fn general_write(
    ctx: &EngineContext,
    receiver: &ObjectRef,
    name: &PropertyName,
    value: Value,
    cache: Option<&PropertyCache>,
) -> OpalResult<WriteOutcome> {
    // Own property first. Failed writes return before any cache update.
    {
        let mut guard = receiver.write();
        if guard.shape().is_frozen() {
            return Err(OpalError::WriteNotWritable {
                name: name.as_str().to_string(),
            });
        }
        match guard.own_property(name) {
            Some(OwnProperty::Data { slot, flags }) => {
                if !flags.is_writable() {
                    return Err(OpalError::WriteNotWritable {
                        name: name.as_str().to_string(),
                    });
                }
                guard.store_slot(slot, value)?;
                let shape = Arc::clone(guard.shape());
                drop(guard);
                if let Some(cache) = cache {
                    cache.cache_local(&ctx.registry, name, shape, slot, None);
                }
                return Ok(WriteOutcome::Written);
            }
            Some(OwnProperty::Accessor { getter, setter, .. }) => {
                let shape = Arc::clone(guard.shape());
                drop(guard);
                if let Some(cache) = cache {
                    cache.cache_accessor(
                        &ctx.registry,
                        name,
                        shape,
                        None,
                        getter,
                        setter.clone(),
                        true,
                    );
                }
                return Ok(WriteOutcome::AccessorNeeded {
                    setter,
                    holder: None,
                });
            }
            Some(OwnProperty::Deleted) | None => {}
        }
    }

    // The chain can intercept the write before the receiver shadows it.
    let receiver_shape = Arc::clone(receiver.read().shape());
    let mut current = receiver.read().prototype().cloned();
    while let Some(holder) = current {
        if cache.is_some() {
            mark_as_chain_member(ctx, &holder);
        }
        let found = {
            let guard = holder.read();
            match guard.own_property(name) {
                Some(OwnProperty::Data { slot, flags }) => Some(ChainFind::Data {
                    slot,
                    flags,
                    value: Value::Undefined,
                }),
                Some(OwnProperty::Accessor { getter, setter, .. }) => {
                    Some(ChainFind::Accessor { getter, setter })
                }
                Some(OwnProperty::Deleted) | None => None,
            }
        };
        match found {
            Some(ChainFind::Data { flags, .. }) => {
                if !flags.is_writable() {
                    // Inherited read-only data blocks the shadow.
                    return Err(OpalError::WriteNotWritable {
                        name: name.as_str().to_string(),
                    });
                }
                // Inherited writable data: shadow on the receiver.
                break;
            }
            Some(ChainFind::Accessor { getter, setter }) => {
                if let Some(cache) = cache {
                    cache.cache_accessor(
                        &ctx.registry,
                        name,
                        Arc::clone(&receiver_shape),
                        Some(holder.clone()),
                        getter,
                        setter.clone(),
                        false,
                    );
                }
                return Ok(WriteOutcome::AccessorNeeded {
                    setter,
                    holder: Some(holder),
                });
            }
            None => {
                current = holder.read().prototype().cloned();
            }
        }
    }

    // Add on the receiver with default attributes.
    let outcome = receiver.write().set_property(&ctx.shapes, name, value)?;
    match outcome {
        SetOutcome::Added { pre_shape, slot } => {
            let (post_shape, on_prototype) = {
                let guard = receiver.read();
                (Arc::clone(guard.shape()), guard.shape().is_prototype())
            };
            if let Some(cache) = cache {
                cache.cache_local(&ctx.registry, name, post_shape, slot, Some(pre_shape));
            }
            // A new property on a prototype can shadow deeper chain facts.
            if on_prototype {
                ctx.registry.invalidate(name);
            }
            Ok(WriteOutcome::Written)
        }
        SetOutcome::WroteExisting { slot } => {
            if let Some(cache) = cache {
                let shape = Arc::clone(receiver.read().shape());
                cache.cache_local(&ctx.registry, name, shape, slot, None);
            }
            Ok(WriteOutcome::Written)
        }
        SetOutcome::AccessorNeeded { setter } => Ok(WriteOutcome::AccessorNeeded {
            setter,
            holder: None,
        }),
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Allocate an instance for `new F()`, run the constructor body against
/// it, and feed the final shape back into the constructor cache.
///
/// A valid cached shape allocates the final layout directly; otherwise the
/// instance starts empty on the prototype's shape lineage and the body's
/// additions transition it one property at a time.
pub fn resolve_construct<F>(
    ctx: &EngineContext,
    ctor: &ConstructorFunction,
    body: F,
) -> OpalResult<ObjectRef>
where
    F: FnOnce(&EngineContext, &ObjectRef) -> OpalResult<()>,
{
    let cache = ctor.cache();
    let obj = match cache.valid_shape() {
        Some(shape) => {
            // The shape now backs an object the cache did not build.
            shape.mark_layout_shared();
            ctor.count_fast_path_hit();
            DynObject::with_shape_and_prototype(Arc::clone(shape), ctor.prototype())
        }
        None => match ctor.prototype() {
            Some(proto) => DynObject::with_prototype(&ctx.shapes, proto),
            None => DynObject::new(&ctx.shapes),
        },
    };
    let instance = ObjectRef::new(obj);
    body(ctx, &instance)?;

    let final_shape = Arc::clone(instance.read().shape());
    ctor.note_final_shape(&final_shape);
    Ok(instance)
}

// =============================================================================
// Mutation Paths
// =============================================================================

fn invalidate_if_prototype(ctx: &EngineContext, obj: &ObjectRef, name: &PropertyName) {
    if obj.read().shape().is_prototype() {
        ctx.registry.invalidate(name);
    }
}

/// Delete a property. Idempotent; deleting a prototype's property clears
/// every cache registered under the name.
pub fn delete_property(
    ctx: &EngineContext,
    obj: &ObjectRef,
    name: &PropertyName,
) -> OpalResult<bool> {
    let deleted = obj.write().delete_property(&ctx.shapes, name)?;
    invalidate_if_prototype(ctx, obj, name);
    Ok(deleted)
}

/// Install an accessor pair, converting a data property if present.
pub fn define_accessor(
    ctx: &EngineContext,
    obj: &ObjectRef,
    name: &PropertyName,
    getter: Option<FunctionRef>,
    setter: Option<FunctionRef>,
    flags: PropertyFlags,
) -> OpalResult<()> {
    obj.write()
        .define_accessor(&ctx.shapes, name, getter, setter, flags)?;
    invalidate_if_prototype(ctx, obj, name);
    Ok(())
}

/// Change a property's attributes.
pub fn reconfigure_property(
    ctx: &EngineContext,
    obj: &ObjectRef,
    name: &PropertyName,
    flags: PropertyFlags,
) -> OpalResult<bool> {
    let changed = obj.write().reconfigure_property(&ctx.shapes, name, flags)?;
    if changed {
        invalidate_if_prototype(ctx, obj, name);
    }
    Ok(changed)
}

/// Seal an object. Sealing a prototype changes every property's
/// attributes at once, so each live name is invalidated.
pub fn seal_object(ctx: &EngineContext, obj: &ObjectRef) {
    let names = obj.read().own_names();
    obj.write().seal(&ctx.shapes);
    if obj.read().shape().is_prototype() {
        for name in &names {
            ctx.registry.invalidate(name);
        }
    }
}

/// Freeze an object (seal plus read-only data).
pub fn freeze_object(ctx: &EngineContext, obj: &ObjectRef) {
    let names = obj.read().own_names();
    obj.write().freeze(&ctx.shapes);
    if obj.read().shape().is_prototype() {
        for name in &names {
            ctx.registry.invalidate(name);
        }
    }
}

/// Rewrite an object's prototype link.
///
/// The object's shape is republished, so caches keyed on the old identity
/// miss; caches holding not-yet-finalized add transitions anywhere in the
/// context are cleared conservatively.
pub fn set_prototype(ctx: &EngineContext, obj: &ObjectRef, proto: Option<ObjectRef>) {
    if let Some(proto) = &proto {
        proto.write().mark_as_prototype(&ctx.shapes);
    }
    obj.write().set_prototype(&ctx.shapes, proto);
    ctx.registry.invalidate_all_store_field();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EngineContext {
        EngineContext::new()
    }

    #[test]
    fn test_read_miss_then_hit_local() {
        let ctx = ctx();
        let name = ctx.names.intern("a");
        let obj = ObjectRef::new(DynObject::new(&ctx.shapes));
        assert!(matches!(
            write_property(&ctx, &obj, &name, Value::Int(7)),
            Ok(WriteOutcome::Written)
        ));

        let cache = PropertyCache::new();
        // First read populates
        assert!(matches!(
            resolve_for_read(&ctx, &cache, &obj, &name),
            ReadOutcome::Value(Value::Int(7))
        ));
        assert!(!cache.is_empty());
        // Second read hits
        let before = cache.stats().hits;
        assert!(matches!(
            resolve_for_read(&ctx, &cache, &obj, &name),
            ReadOutcome::Value(Value::Int(7))
        ));
        assert!(cache.stats().hits > before);
    }

    #[test]
    fn test_absent_read_is_not_cached() {
        let ctx = ctx();
        let name = ctx.names.intern("missing");
        let obj = ObjectRef::new(DynObject::new(&ctx.shapes));

        let cache = PropertyCache::new();
        assert!(matches!(
            resolve_for_read(&ctx, &cache, &obj, &name),
            ReadOutcome::Absent
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_write_populates_transition_cache() {
        let ctx = ctx();
        let name = ctx.names.intern("a");
        let cache = PropertyCache::new();

        let first = ObjectRef::new(DynObject::new(&ctx.shapes));
        let pre_id = first.read().shape_id();
        assert!(matches!(
            resolve_for_write(&ctx, &cache, &first, &name, Value::Int(1)),
            Ok(WriteOutcome::Written)
        ));

        // A fresh object with the same starting shape replays the cached
        // transition without a general resolve.
        let second = ObjectRef::new(DynObject::new(&ctx.shapes));
        assert_eq!(second.read().shape_id(), pre_id);
        let hits_before = cache.stats().hits;
        assert!(matches!(
            resolve_for_write(&ctx, &cache, &second, &name, Value::Int(2)),
            Ok(WriteOutcome::Written)
        ));
        assert!(cache.stats().hits > hits_before);
        assert_eq!(second.read().shape_id(), first.read().shape_id());
        assert_eq!(second.read().get(&name), Some(Value::Int(2)));
    }

    #[test]
    fn test_failed_write_does_not_populate_cache() {
        let ctx = ctx();
        let name = ctx.names.intern("x");
        let obj = ObjectRef::new(DynObject::new(&ctx.shapes));
        assert!(matches!(
            write_property(&ctx, &obj, &name, Value::Int(1)),
            Ok(WriteOutcome::Written)
        ));
        freeze_object(&ctx, &obj);

        let cache = PropertyCache::new();
        assert!(matches!(
            resolve_for_write(&ctx, &cache, &obj, &name, Value::Int(2)),
            Err(OpalError::WriteNotWritable { .. })
        ));
        assert!(cache.is_empty());
        assert_eq!(obj.read().get(&name), Some(Value::Int(1)));
    }

    #[test]
    fn test_proto_read_marks_holder_and_registers() {
        let ctx = ctx();
        let name = ctx.names.intern("shared");
        let proto = ObjectRef::new(DynObject::new(&ctx.shapes));
        assert!(matches!(
            write_property(&ctx, &proto, &name, Value::Int(10)),
            Ok(WriteOutcome::Written)
        ));

        let obj = ObjectRef::new(DynObject::with_prototype(&ctx.shapes, proto.clone()));
        let cache = PropertyCache::new();
        assert!(matches!(
            resolve_for_read(&ctx, &cache, &obj, &name),
            ReadOutcome::Value(Value::Int(10))
        ));
        assert!(proto.read().shape().is_prototype());
        assert_eq!(ctx.registry.stats().proto_names, 1);

        // Deleting on the prototype clears the cache
        assert!(delete_property(&ctx, &proto, &name).expect("delete"));
        assert!(cache.is_empty());
        assert!(matches!(
            resolve_for_read(&ctx, &cache, &obj, &name),
            ReadOutcome::Absent
        ));
    }

    #[test]
    fn test_inherited_setter_intercepts_write() {
        let ctx = ctx();
        let name = ctx.names.intern("x");
        let setter = FunctionRef::new("set_x");
        let proto = ObjectRef::new(DynObject::new(&ctx.shapes));
        define_accessor(
            &ctx,
            &proto,
            &name,
            None,
            Some(setter.clone()),
            PropertyFlags::data(),
        )
        .expect("accessor");

        let obj = ObjectRef::new(DynObject::with_prototype(&ctx.shapes, proto));
        let cache = PropertyCache::new();
        match resolve_for_write(&ctx, &cache, &obj, &name, Value::Int(1)).expect("write") {
            WriteOutcome::AccessorNeeded {
                setter: Some(s),
                holder: Some(_),
            } => assert!(s.ptr_eq(&setter)),
            other => panic!("expected inherited setter, got {other:?}"),
        }
        // No own property materialized on the receiver
        assert!(obj.read().own_property(&name).is_none());
    }

    #[test]
    fn test_inherited_readonly_data_blocks_shadow() {
        let ctx = ctx();
        let name = ctx.names.intern("k");
        let proto = ObjectRef::new(DynObject::new(&ctx.shapes));
        assert!(matches!(
            write_property(&ctx, &proto, &name, Value::Int(1)),
            Ok(WriteOutcome::Written)
        ));
        reconfigure_property(&ctx, &proto, &name, PropertyFlags::frozen_data())
            .expect("reconfigure");

        let obj = ObjectRef::new(DynObject::with_prototype(&ctx.shapes, proto));
        assert!(matches!(
            write_property(&ctx, &obj, &name, Value::Int(2)),
            Err(OpalError::WriteNotWritable { .. })
        ));
    }

    #[test]
    fn test_set_prototype_clears_store_field_caches() {
        let ctx = ctx();
        let name = ctx.names.intern("a");
        let cache = PropertyCache::new();

        let obj = ObjectRef::new(DynObject::new(&ctx.shapes));
        assert!(matches!(
            resolve_for_write(&ctx, &cache, &obj, &name, Value::Int(1)),
            Ok(WriteOutcome::Written)
        ));
        assert_eq!(ctx.registry.stats().store_field_names, 1);

        let new_proto = ObjectRef::new(DynObject::new(&ctx.shapes));
        let old_id = obj.read().shape_id();
        set_prototype(&ctx, &obj, Some(new_proto));
        assert!(cache.is_empty());
        assert_ne!(obj.read().shape_id(), old_id);
    }

    #[test]
    fn test_construct_fast_path_after_first_learn() {
        let ctx = ctx();
        let name = ctx.names.intern("v");
        let ctor = ConstructorFunction::new(FunctionRef::new("F"));

        let build = |ctx: &EngineContext, obj: &ObjectRef| {
            write_property(ctx, obj, &name, Value::Int(1)).map(|_| ())
        };

        let a = resolve_construct(&ctx, &ctor, build).expect("construct");
        assert_eq!(ctor.fast_path_hits(), 0);
        let b = resolve_construct(&ctx, &ctor, build).expect("construct");
        assert_eq!(ctor.fast_path_hits(), 1);
        assert_eq!(a.read().shape_id(), b.read().shape_id());
        assert_eq!(b.read().get(&name), Some(Value::Int(1)));
    }
}
