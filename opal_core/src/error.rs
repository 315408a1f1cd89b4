//! Error types and result definitions for the Opal object engine.
//!
//! The taxonomy is deliberately small: storage growth failures are fatal,
//! attribute violations are failure signals the caller maps to either a
//! silent no-op or a language-level error depending on its strict-mode
//! flag, and a cache miss is not an error at all (it is the expected,
//! common fallback path and is expressed as `Option`/outcome enums at the
//! call sites instead).

use thiserror::Error;

/// The unified result type used throughout Opal.
pub type OpalResult<T> = Result<T, OpalError>;

/// Errors surfaced by the property-storage and caching subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpalError {
    /// Growing inline/overflow storage or a property layout failed.
    ///
    /// Not locally recoverable; the embedding engine treats this as a
    /// fatal out-of-memory condition.
    #[error("allocation failure while growing {what}")]
    AllocationFailure {
        /// Description of the storage that failed to grow.
        what: &'static str,
    },

    /// Attempt to reconfigure an attribute of a non-configurable property.
    ///
    /// The caller decides whether this becomes a silent no-op or a
    /// language-level error (strict mode).
    #[error("cannot redefine non-configurable property '{name}'")]
    RedefineNonConfigurable {
        /// The property that was targeted.
        name: String,
    },

    /// Attempt to delete a non-configurable (or non-deletable) property.
    #[error("cannot delete non-configurable property '{name}'")]
    DeleteNonConfigurable {
        /// The property that was targeted.
        name: String,
    },

    /// Attempt to write a non-writable data property or any property of a
    /// frozen object.
    #[error("cannot assign to read-only property '{name}'")]
    WriteNotWritable {
        /// The property that was targeted.
        name: String,
    },

    /// Attempt to add a property to a non-extensible object.
    #[error("cannot add property '{name}': object is not extensible")]
    NotExtensible {
        /// The property that was targeted.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpalError::RedefineNonConfigurable {
            name: "length".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot redefine non-configurable property 'length'"
        );
    }

    #[test]
    fn test_error_equality() {
        let a = OpalError::DeleteNonConfigurable {
            name: "x".to_string(),
        };
        let b = OpalError::DeleteNonConfigurable {
            name: "x".to_string(),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocation_failure_display() {
        let err = OpalError::AllocationFailure {
            what: "overflow slots",
        };
        assert_eq!(
            err.to_string(),
            "allocation failure while growing overflow slots"
        );
    }
}
