//! The per-prefix lifecycle state machine (spec §4.3).
//!
//! `closed -> open-read | open-rw`; from `open-rw`, a prefix may additionally
//! carry any combination of `atomic-begun` (nested depth), `locked`, and
//! `snapshot-pinned` — these are not exclusive of one another, so they are
//! tracked as counters alongside the base [`Lifecycle`] rather than as
//! extra enum variants.

use dbzero_core::{DbZeroError, DbZeroResult};

/// The base open/closed state of a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No file handle held; the prefix must be opened before use.
    Closed,
    /// Open for reads only. Any number of processes may hold this.
    OpenRead,
    /// Open for reads and writes. At most one process may hold this.
    OpenRw,
}

impl Lifecycle {
    /// Whether a mutation is permitted in this base state. Atomic/locked
    /// sessions are a further restriction checked separately.
    pub fn allows_write(&self) -> bool {
        matches!(self, Lifecycle::OpenRw)
    }

    /// Validate a requested transition, per spec §4.3's
    /// `closed -> open-read | open-rw` shape.
    pub fn validate_open(&self, writable: bool) -> DbZeroResult<Lifecycle> {
        match self {
            Lifecycle::Closed => Ok(if writable {
                Lifecycle::OpenRw
            } else {
                Lifecycle::OpenRead
            }),
            _ => Err(DbZeroError::InvalidState {
                reason: format!("prefix already open ({self:?}); close before reopening"),
            }),
        }
    }

    /// Validate a close from the current state.
    pub fn validate_close(&self) -> DbZeroResult<()> {
        match self {
            Lifecycle::Closed => Err(DbZeroError::InvalidState {
                reason: "prefix is already closed".to_string(),
            }),
            _ => Ok(()),
        }
    }
}
