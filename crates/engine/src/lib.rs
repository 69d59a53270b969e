//! Orchestrator tying DBZero's slab, storage, durability, concurrency,
//! object and query layers into one `Engine` handle with an explicit
//! `open`/`close` lifecycle.
//!
//! Every other crate in this workspace is a pure, standalone layer with
//! no notion of "a running database": `dbzero-concurrency` hands out
//! `PrefixHandle`s but has no object model, `dbzero-objects` has no file
//! handles, `dbzero-query`/`dbzero-fastquery` evaluate against whatever
//! `QuerySource` they're given. This crate is where those pieces are
//! wired together behind one handle per data directory (no global
//! state, no process-wide singleton).

pub mod background;
pub mod config;
pub mod engine;
pub mod indexes;
pub mod objectlog;
pub mod query_source;

pub use background::{BackgroundScheduler, BackpressureError, SchedulerStats, TaskPriority};
pub use config::{DbZeroConfig, CONFIG_FILE_NAME};
pub use engine::Engine;
pub use indexes::PrefixIndexes;
pub use objectlog::ObjectOp;
pub use query_source::PrefixQuerySource;
