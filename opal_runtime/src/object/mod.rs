//! Dynamic objects with shape-based property storage.
//!
//! # Architecture
//!
//! ```text
//!  +------------+       +---------+       +----------------+
//!  | DynObject  | ----> |  Shape  | ----> |  LayoutCell    |
//!  | inline[8]  |       | id      |       |  (fork on      |
//!  | overflow[] |       | flags   |       |   write)       |
//!  | elements[] |       | edges   |       +----------------+
//!  | prototype  |       +---------+               |
//!  +------------+                        +--------+--------+
//!                                        | PropertyLayout  |
//!                                        |  FixedSet (<=2) |
//!                                        |  Hashed         |
//!                                        |  Indexed        |
//!                                        +-----------------+
//! ```
//!
//! An object's header references exactly one `Shape`; objects built by the
//! identical sequence of property additions share shapes, and caches key
//! off shape identity. Mutations never edit a shared layout in place —
//! they fork a private copy and publish a fresh shape.

pub mod descriptor;
pub mod dyn_object;
pub mod indexed;
pub mod layout;
pub mod shape;

pub use descriptor::{
    AccessorPair, IndexedPropertyDescriptor, PropertyDescriptor, PropertyFlags, SlotRef, SlotRegion,
};
pub use dyn_object::{DynObject, ObjectRef, OwnProperty, SetOutcome, WeakObjectRef};
pub use indexed::{IndexDescriptorMap, IndexedElementLayout};
pub use layout::{FixedSetLayout, HashedLayout, PropertyLayout, FIXED_SET_CAPACITY, INLINE_CAPACITY};
pub use shape::{LayoutCell, Shape, ShapeContext, ShapeFlags, ShapeId};
