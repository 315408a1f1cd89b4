//! Engine value representation.
//!
//! `Value` is the unit stored in property slots and element backing. It is
//! a plain tagged union; object and function values are identity-bearing
//! shared handles, everything else is compared by content.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::object::dyn_object::ObjectRef;

// =============================================================================
// Value
// =============================================================================

/// A dynamically-typed engine value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The undefined value (also the content of never-written slots).
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A double-precision float.
    Float(f64),
    /// An immutable string.
    Str(Arc<str>),
    /// A reference to a dynamic object (identity equality).
    Object(ObjectRef),
    /// A reference to a function (identity equality).
    Function(FunctionRef),
}

impl Value {
    /// Human-readable type name, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Check if this is the undefined value.
    #[inline]
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Create a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Reference types compare by identity.
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.into())
    }
}

// =============================================================================
// Function References
// =============================================================================

/// An opaque, identity-bearing reference to a function.
///
/// The interpreter that would actually call the function is external to
/// this subsystem; here a function reference only needs cheap cloning and
/// O(1) identity comparison, so caches can record "this exact getter".
#[derive(Clone)]
pub struct FunctionRef {
    inner: Arc<FunctionData>,
}

struct FunctionData {
    name: Box<str>,
}

impl FunctionRef {
    /// Create a new function reference with a diagnostic name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(FunctionData { name: name.into() }),
        }
    }

    /// Diagnostic name of the function.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identity comparison.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for FunctionRef {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for FunctionRef {}

impl Hash for FunctionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionRef({})", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_default_is_undefined() {
        assert!(Value::default().is_undefined());
    }

    #[test]
    fn test_value_equality_by_content() {
        assert_eq!(Value::Int(3), Value::Int(3));
        assert_ne!(Value::Int(3), Value::Int(4));
        assert_ne!(Value::Int(3), Value::Float(3.0));
        assert_eq!(Value::str("a"), Value::str("a"));
    }

    #[test]
    fn test_function_identity_equality() {
        let f = FunctionRef::new("getter");
        let g = FunctionRef::new("getter");

        assert_eq!(f, f.clone());
        assert_ne!(f, g); // Same name, different identity
    }

    #[test]
    fn test_value_function_equality() {
        let f = FunctionRef::new("f");
        assert_eq!(Value::Function(f.clone()), Value::Function(f.clone()));
        assert_ne!(
            Value::Function(f),
            Value::Function(FunctionRef::new("f"))
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::Int(0).type_name(), "int");
        assert_eq!(Value::Function(FunctionRef::new("x")).type_name(), "function");
    }
}
