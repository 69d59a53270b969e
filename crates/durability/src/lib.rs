//! Durable, crash-recoverable page storage for DBZero.
//!
//! - [`format`]: the on-disk prefix file header and metaio record layout.
//! - [`metaio`]: the append-only metaio log, including tail-truncation
//!   recovery for torn writes.
//! - [`pagefile`]: [`pagefile::PageFile`], the `dbzero_core::PageStore`
//!   implementation that ties the base region and metaio log together.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod metaio;
pub mod pagefile;

pub use format::{FileHeader, MetaioRecord, RecordKind, FORMAT_VERSION};
pub use metaio::MetaioLog;
pub use pagefile::PageFile;
