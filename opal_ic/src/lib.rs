//! # Opal Inline Caches
//!
//! The caching side of the Opal object engine: per-call-site caches that
//! let repeated property reads, writes, and constructions skip the general
//! lookup algorithm, plus the invalidation protocol that keeps them honest.
//!
//! # Architecture
//!
//! ```text
//!   call site ---> PropertyCache ----------+
//!       |            (one entry)           |  registers under the
//!       |                                  v  property name
//!   call site ---> PolymorphicInlineCache  InvalidationRegistry
//!       |            (8 entries)           ^
//!       |                                  |  invalidate(name) on
//!   new F() -----> ConstructorCache        |  prototype mutations
//!                                          |
//!   mutation paths (delete/seal/reprototype) ---+
//! ```
//!
//! A cache hit returns a slot reference (or accessor) directly; a miss
//! falls through to the general resolver, which walks the prototype chain,
//! populates the cache, and registers it with the invalidation registry
//! exactly when the cached fact depends on prototype-chain state or on a
//! pending add-property transition. Caches are sound by construction: a
//! populated entry matches on shape identity, and every mutation that
//! could falsify a cached fact either changes the receiver's shape or
//! clears the affected caches through the registry.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod ctor_cache;
pub mod inline_cache;
pub mod invalidation;
pub mod poly_cache;
pub mod resolve;


pub use ctor_cache::{ConstructorCache, ConstructorFunction};
pub use inline_cache::{AccessorHit, CacheKind, CacheStats, PropertyCache};
pub use invalidation::{InvalidationRegistry, RegistrationClass, RegistryStats};
pub use poly_cache::{PolymorphicInlineCache, POLY_CACHE_SIZE};
pub use resolve::{
    delete_property, define_accessor, freeze_object, read_property, reconfigure_property,
    resolve_construct, resolve_for_read, resolve_for_read_poly, resolve_for_write,
    resolve_for_write_poly, seal_object, set_prototype, write_property, EngineContext,
    ReadOutcome, WriteOutcome,
};
