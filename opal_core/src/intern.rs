//! Property-name interning for O(1) identifier equality.
//!
//! This module provides an interner that stores unique copies of property
//! names and returns lightweight handles. Interned names can be compared by
//! pointer equality, so cache keys and layout lookups never touch string
//! content on the hot path.
//!
//! The interner is context-owned: each execution context creates its own
//! `NameInterner`, and handles from different interners never compare equal
//! even when their content matches. There is no process-wide interner.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A handle to an interned property name.
///
/// `PropertyName` is a thin wrapper around an `Arc<str>` that provides O(1)
/// equality via pointer comparison. Two `PropertyName`s are equal if and
/// only if they were produced by the same interner for the same content.
#[derive(Clone)]
pub struct PropertyName {
    inner: Arc<str>,
}

impl PropertyName {
    #[inline]
    fn new(s: Arc<str>) -> Self {
        Self { inner: s }
    }

    /// Get the name content.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the name is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the pointer address for identity comparison.
    #[inline]
    fn ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }
}

impl PartialEq for PropertyName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        // Pointer comparison for O(1) equality
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PropertyName {}

impl Hash for PropertyName {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash the pointer for consistency with Eq
        self.ptr().hash(state);
    }
}

impl fmt::Debug for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyName({:?})", self.as_str())
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for PropertyName {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::ops::Deref for PropertyName {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl PartialEq<str> for PropertyName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for PropertyName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Thread-safe property-name interner.
///
/// The interner maintains a set of unique names and returns handles to them.
/// Interning the same name multiple times returns the same handle.
pub struct NameInterner {
    table: RwLock<FxHashMap<Arc<str>, PropertyName>>,
}

impl NameInterner {
    /// Create a new, empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RwLock::new(FxHashMap::default()),
        }
    }

    /// Create a new interner with preallocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: RwLock::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
        }
    }

    /// Intern a name, returning a handle.
    ///
    /// If the name has been interned before, the same handle is returned.
    /// This method is thread-safe.
    pub fn intern(&self, s: &str) -> PropertyName {
        // Fast path: check if already interned with read lock
        {
            let table = self.table.read();
            if let Some(name) = table.get(s) {
                return name.clone();
            }
        }

        // Slow path: insert with write lock
        let mut table = self.table.write();

        // Double-check after acquiring write lock
        if let Some(name) = table.get(s) {
            return name.clone();
        }

        let arc: Arc<str> = s.into();
        let name = PropertyName::new(arc.clone());
        table.insert(arc, name.clone());
        name
    }

    /// Get an already-interned name without creating a new one.
    ///
    /// Returns `None` if the name has not been interned.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<PropertyName> {
        self.table.read().get(s).cloned()
    }

    /// Check if a name has been interned.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.table.read().contains_key(s)
    }

    /// Get the number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Check if the interner is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl Default for NameInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NameInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameInterner")
            .field("count", &self.table.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_same_name_returns_same_handle() {
        let interner = NameInterner::new();
        let n1 = interner.intern("x");
        let n2 = interner.intern("x");

        assert!(Arc::ptr_eq(&n1.inner, &n2.inner));
        assert_eq!(n1, n2);
    }

    #[test]
    fn test_intern_different_names_returns_different_handles() {
        let interner = NameInterner::new();
        let n1 = interner.intern("x");
        let n2 = interner.intern("y");

        assert!(!Arc::ptr_eq(&n1.inner, &n2.inner));
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_separate_interners_are_independent() {
        let a = NameInterner::new();
        let b = NameInterner::new();
        let n1 = a.intern("shared");
        let n2 = b.intern("shared");

        // Same content, different contexts: not equal
        assert_ne!(n1, n2);
        assert_eq!(n1.as_str(), n2.as_str());
    }

    #[test]
    fn test_name_as_str() {
        let interner = NameInterner::new();
        let n = interner.intern("value");
        assert_eq!(n.as_str(), "value");
    }

    #[test]
    fn test_interner_get() {
        let interner = NameInterner::new();
        interner.intern("present");

        assert!(interner.get("present").is_some());
        assert!(interner.get("absent").is_none());
    }

    #[test]
    fn test_interner_contains() {
        let interner = NameInterner::new();
        interner.intern("present");

        assert!(interner.contains("present"));
        assert!(!interner.contains("absent"));
    }

    #[test]
    fn test_interner_len() {
        let interner = NameInterner::new();
        assert_eq!(interner.len(), 0);

        interner.intern("one");
        interner.intern("two");
        interner.intern("one"); // Duplicate
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_name_hash_consistent_with_eq() {
        use std::collections::HashMap;

        let interner = NameInterner::new();
        let n1 = interner.intern("key");
        let n2 = interner.intern("key");

        let mut map = HashMap::new();
        map.insert(n1, 42);
        assert_eq!(map.get(&n2), Some(&42));
    }

    #[test]
    fn test_name_eq_str() {
        let interner = NameInterner::new();
        let n = interner.intern("compare");

        assert!(n == "compare");
        assert!(n != "different");
    }

    #[test]
    fn test_name_display_and_debug() {
        let interner = NameInterner::new();
        let n = interner.intern("shown");

        assert_eq!(format!("{}", n), "shown");
        assert!(format!("{:?}", n).contains("shown"));
    }

    #[test]
    fn test_empty_name() {
        let interner = NameInterner::new();
        let n1 = interner.intern("");
        let n2 = interner.intern("");

        assert_eq!(n1, n2);
        assert!(n1.is_empty());
    }

    #[test]
    fn test_unicode_names() {
        let interner = NameInterner::new();
        let n1 = interner.intern("長さ");
        let n2 = interner.intern("長さ");

        assert_eq!(n1, n2);
        assert_eq!(n1.as_str(), "長さ");
    }

    #[test]
    fn test_concurrent_interning() {
        use std::thread;

        let interner = Arc::new(NameInterner::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let interner = Arc::clone(&interner);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    interner.intern("shared_name");
                }
                interner.intern("shared_name")
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results[1..] {
            assert_eq!(&results[0], result);
        }
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_interner_default() {
        let interner = NameInterner::default();
        assert!(interner.is_empty());
    }
}
