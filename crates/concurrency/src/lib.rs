//! Prefix transaction manager for DBZero (spec §4.3).
//!
//! - [`state`]: the `closed -> open-read | open-rw` lifecycle.
//! - [`prefix`]: [`prefix::PrefixHandle`], the per-prefix runtime tying
//!   the lifecycle, dirty cache and durable store together, plus the
//!   waiter registry backing `await_prefix_state`.
//! - [`session`]: RAII [`session::AtomicSession`], [`session::LockedSession`]
//!   and [`session::Snapshot`] handles.
//! - [`mutation_log`]: the ordered commit log a locked session returns.
//! - [`autocommit`]: the background commit ticker.
//! - [`manager`]: [`manager::ConcurrencyManager`], the entry point tying
//!   everything together by prefix name.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod autocommit;
pub mod manager;
pub mod mutation_log;
pub mod prefix;
pub mod session;
pub mod state;

pub use autocommit::{AutocommitSwitch, AutocommitTicker};
pub use manager::ConcurrencyManager;
pub use mutation_log::{MutationLog, MutationRecord};
pub use prefix::PrefixHandle;
pub use session::{AtomicSession, LockedSession, Snapshot};
pub use state::Lifecycle;
