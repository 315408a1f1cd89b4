//! # Opal Core
//!
//! Foundational types shared across the Opal object-engine crates:
//!
//! - **Error Handling**: the subsystem error taxonomy and result alias
//! - **Interning**: property-name interning for O(1) identifier equality
//!
//! Everything here is context-owned; this crate deliberately exposes no
//! process-wide mutable state, so independent execution contexts never
//! interfere with one another.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod error;
pub mod intern;

pub use error::{OpalError, OpalResult};
pub use intern::{NameInterner, PropertyName};

/// Opal engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
