//! Error taxonomy for DBZero (spec §7)
//!
//! `DbZeroError` is the single error type returned by every public
//! operation across the workspace. Variant shape follows the teacher's
//! `StrataError`: named fields, one `#[error(...)]` message per kind, and
//! small classifier methods (`is_retryable`, `is_fatal`) instead of string
//! matching at call sites.

use crate::types::{ClassUuid, ObjectUuid, PrefixUuid};
use thiserror::Error;

/// Result alias used throughout DBZero.
pub type DbZeroResult<T> = std::result::Result<T, DbZeroError>;

/// Unified error type (spec §7 "Error taxonomy").
#[derive(Debug, Error)]
pub enum DbZeroError {
    /// Internal invariant violation in the slab allocator or page layout.
    /// Fatal: the owning prefix is marked poisoned until reopened.
    #[error("slab corruption in prefix {prefix}: {detail}")]
    SlabCorruption {
        /// Prefix where the corruption was detected.
        prefix: PrefixUuid,
        /// Description of the violated invariant.
        detail: String,
    },

    /// An address computed from a DP id / offset pair did not resolve to
    /// a valid location. Fatal, same poisoning behavior as
    /// `SlabCorruption`.
    #[error("invalid address: dp={dp_id} offset={offset}")]
    InvalidAddress {
        /// Offending data-page id.
        dp_id: u64,
        /// Offending byte offset within the page.
        offset: u32,
    },

    /// A request exceeded the slab size and cannot be served by any
    /// slab. Recoverable: reported to the caller with no side effects.
    #[error("allocation of {requested} bytes exceeds slab size {slab_size}")]
    AllocationExceeded {
        /// Bytes requested.
        requested: u64,
        /// Configured slab size.
        slab_size: u64,
    },

    /// Assigning a memo object from a different prefix without going
    /// through a weak proxy.
    #[error("cannot assign object {target} (prefix {target_prefix}) into prefix {owner_prefix} without a weak proxy")]
    CrossPrefixReference {
        /// The object being assigned.
        target: ObjectUuid,
        /// Prefix the target object actually lives in.
        target_prefix: PrefixUuid,
        /// Prefix of the field being assigned into.
        owner_prefix: PrefixUuid,
    },

    /// Access through a weak proxy whose target no longer exists. The
    /// proxy's uuid remains readable even after this error.
    #[error("weak proxy to {target} has expired")]
    ExpiredReference {
        /// Uuid of the now-gone target.
        target: ObjectUuid,
    },

    /// Type metadata for a class is not available (model class not
    /// imported on this process). Callers may retry treating the object
    /// as its base class.
    #[error("class not found: {class}")]
    ClassNotFound {
        /// The missing class uuid.
        class: ClassUuid,
    },

    /// A snapshot or `await_prefix_state` call targets a state older
    /// than retention, or one that has never existed.
    #[error("state {requested} not available for prefix {prefix} (retained from {earliest})")]
    StateNotAvailable {
        /// Prefix being queried.
        prefix: PrefixUuid,
        /// State number requested.
        requested: u64,
        /// Oldest state number still retained.
        earliest: u64,
    },

    /// A mutation was attempted via a snapshot-bound handle, or on a
    /// prefix that is closed.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Human-readable reason.
        reason: String,
    },

    /// A key of non-hashable shape (e.g. a list) was supplied where a
    /// dict/set key was required.
    #[error("unhashable key: {detail}")]
    Unhashable {
        /// Description of the offending key.
        detail: String,
    },

    /// A group-by scan exceeded the configured `max_scan` budget; the
    /// engine may retry with the budget removed (spec §7, optional).
    #[error("group-by scan exceeded max_scan budget of {max_scan} rows")]
    MaxScanExceeded {
        /// Configured budget that was exceeded.
        max_scan: u64,
    },

    /// Low-level I/O failure from the page store / metaio log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all for conditions that don't yet have a dedicated variant;
    /// kept distinct from `InvalidState` so classifiers don't misreport
    /// it as retryable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DbZeroError {
    /// Whether the caller can reasonably retry the operation unchanged
    /// (e.g. after backing off). Conflicts and transient states are
    /// retryable; corruption and structural mismatches are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbZeroError::StateNotAvailable { .. })
    }

    /// Whether the error indicates the owning prefix must be reopened
    /// before further use (spec §7: "commit aborted, prefix marked
    /// poisoned until reopen").
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbZeroError::SlabCorruption { .. } | DbZeroError::InvalidAddress { .. }
        )
    }
}

impl From<bincode::Error> for DbZeroError {
    fn from(e: bincode::Error) -> Self {
        DbZeroError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_not_retryable() {
        let err = DbZeroError::SlabCorruption {
            prefix: PrefixUuid::from_name("p"),
            detail: "bitset checksum mismatch".into(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn state_not_available_is_retryable_not_fatal() {
        let err = DbZeroError::StateNotAvailable {
            prefix: PrefixUuid::from_name("p"),
            requested: 3,
            earliest: 10,
        };
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn display_includes_key_fields() {
        let err = DbZeroError::AllocationExceeded {
            requested: 5_000_000,
            slab_size: 1_048_576,
        };
        let msg = err.to_string();
        assert!(msg.contains("5000000") || msg.contains("5_000_000"));
        assert!(msg.contains("1048576") || msg.contains("1_048_576"));
    }
}
