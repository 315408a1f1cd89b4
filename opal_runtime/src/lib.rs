//! # Opal Runtime
//!
//! The storage side of the Opal object engine: dynamically-typed objects
//! with mutable property sets, given densely-packed slot storage through
//! shape-based hidden classes.
//!
//! # Architecture
//!
//! - **Values**: the engine value representation handed through slots
//! - **Descriptors**: per-property attributes and slot references
//! - **Layouts**: the three property-storage strategies (fixed-set, hashed,
//!   indexed-element), convertible one way as usage patterns demand
//! - **Shapes**: the identity objects that pair a layout with object-level
//!   flags and form the transition tree
//! - **Objects**: the dynamic object itself — inline slots, overflow
//!   storage, element backing, and the prototype link

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod object;
pub mod value;

pub use object::descriptor::{
    AccessorPair, IndexedPropertyDescriptor, PropertyDescriptor, PropertyFlags, SlotRef, SlotRegion,
};
pub use object::dyn_object::{DynObject, ObjectRef, OwnProperty, SetOutcome, WeakObjectRef};
pub use object::indexed::{IndexDescriptorMap, IndexedElementLayout};
pub use object::layout::{
    FixedSetLayout, HashedLayout, PropertyLayout, FIXED_SET_CAPACITY, INLINE_CAPACITY,
};
pub use object::shape::{LayoutCell, Shape, ShapeContext, ShapeFlags, ShapeId};
pub use value::{FunctionRef, Value};
