//! The durable page store for one prefix: a base region holding each
//! DP's current materialized image, backed by a metaio log that is the
//! source of truth for history and crash recovery (spec §4.2).
//!
//! The base region is a pure cache of "what does this DP look like right
//! now" — every write is durable the moment it's appended (and fsynced)
//! to the metaio log, and the base region is fully rebuildable by
//! replaying that log. This mirrors the teacher's WAL-plus-materialized-
//! state split, except the log here *is* the page store rather than a
//! side channel feeding one.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dbzero_core::{DbZeroError, DbZeroResult, Limits, PageStore, PrefixUuid};
use parking_lot::Mutex;

use crate::format::{self, FileHeader, MetaioRecord, RecordKind, HEADER_SIZE};
use crate::metaio::MetaioLog;

/// One historical write to a DP, as replayed from the metaio log.
#[derive(Debug, Clone)]
struct HistoryEntry {
    state_num: u64,
    kind: RecordKind,
    payload: Vec<u8>,
}

/// The durable, crash-recoverable page store for a single prefix.
pub struct PageFile {
    prefix: PrefixUuid,
    dp_size: u32,
    base_path: PathBuf,
    base: Mutex<File>,
    metaio: Mutex<MetaioLog>,
    history: DashMap<u64, Vec<HistoryEntry>>,
    current_state_num: AtomicU64,
}

fn base_file_path(dir: &Path) -> PathBuf {
    dir.join("base.dat")
}

fn metaio_file_path(dir: &Path) -> PathBuf {
    dir.join("meta.log")
}

impl PageFile {
    /// Create a brand-new, empty page store under `dir`.
    pub fn create(dir: &Path, prefix: PrefixUuid, limits: &Limits) -> DbZeroResult<Self> {
        std::fs::create_dir_all(dir)?;
        let base_path = base_file_path(dir);
        let mut base = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&base_path)?;

        let header = FileHeader {
            prefix_uuid: *prefix.as_bytes(),
            dp_size: limits.dp_size,
            meta_io_step_size: limits.meta_io_step_size,
            created_at_micros: 0,
        };
        base.write_all(&header.to_bytes())?;

        let metaio = MetaioLog::create(metaio_file_path(dir))?;

        Ok(Self {
            prefix,
            dp_size: limits.dp_size,
            base_path,
            base: Mutex::new(base),
            metaio: Mutex::new(metaio),
            history: DashMap::new(),
            current_state_num: AtomicU64::new(0),
        })
    }

    /// Open an existing page store, replaying the metaio log to rebuild
    /// the base region and the in-memory history index (spec §4.2: crash
    /// recovery via metaio tail truncation).
    pub fn recover(dir: &Path) -> DbZeroResult<Self> {
        let base_path = base_file_path(dir);
        let mut base = OpenOptions::new().read(true).write(true).open(&base_path)?;

        let mut header_bytes = [0u8; HEADER_SIZE];
        base.read_exact(&mut header_bytes)?;
        let header = FileHeader::from_bytes(&header_bytes)
            .map_err(|e| DbZeroError::Internal(format!("corrupt prefix header: {e}")))?;

        let (metaio, records) = MetaioLog::recover(metaio_file_path(dir))?;

        let prefix = PrefixUuid::from_bytes(header.prefix_uuid);
        let store = Self {
            prefix,
            dp_size: header.dp_size,
            base_path,
            base: Mutex::new(base),
            metaio: Mutex::new(metaio),
            history: DashMap::new(),
            current_state_num: AtomicU64::new(0),
        };

        let mut max_state = 0u64;
        for record in &records {
            store.record_history(record);
            max_state = max_state.max(record.state_num);
        }
        store.current_state_num.store(max_state, Ordering::SeqCst);
        store.rebuild_base_region()?;

        tracing::info!(
            prefix = %store.prefix,
            records = records.len(),
            state_num = max_state,
            "recovered prefix from metaio log"
        );

        Ok(store)
    }

    fn record_history(&self, record: &MetaioRecord) {
        self.history
            .entry(record.dp_id)
            .or_default()
            .push(HistoryEntry {
                state_num: record.state_num,
                kind: record.kind,
                payload: record.payload.clone(),
            });
    }

    fn rebuild_base_region(&self) -> DbZeroResult<()> {
        let dp_ids: Vec<u64> = self.history.iter().map(|e| *e.key()).collect();
        for dp_id in dp_ids {
            let image = self.reconstruct_at(dp_id, u64::MAX);
            if let Some(bytes) = image {
                self.write_base_region(dp_id, &bytes)?;
            }
        }
        Ok(())
    }

    fn reconstruct_at(&self, dp_id: u64, max_state: u64) -> Option<Vec<u8>> {
        let entries = self.history.get(&dp_id)?;
        let mut image: Vec<u8> = Vec::new();
        let mut seen = false;
        for entry in entries.iter() {
            if entry.state_num > max_state {
                break;
            }
            match entry.kind {
                RecordKind::FullPage => {
                    image = entry.payload.clone();
                }
                RecordKind::Diff => {
                    if let Ok((base_len, ranges)) = format::decode_diff_payload(&entry.payload) {
                        image = format::apply_diff(&image, base_len, &ranges);
                    }
                }
            }
            seen = true;
        }
        seen.then_some(image)
    }

    fn base_offset(&self, dp_id: u64) -> u64 {
        HEADER_SIZE as u64 + dp_id * self.dp_size as u64
    }

    fn write_base_region(&self, dp_id: u64, bytes: &[u8]) -> DbZeroResult<()> {
        let mut base = self.base.lock();
        let offset = self.base_offset(dp_id);
        let needed_len = offset + self.dp_size as u64;
        if base.metadata()?.len() < needed_len {
            base.set_len(needed_len)?;
        }
        base.seek(SeekFrom::Start(offset))?;
        let mut padded = bytes.to_vec();
        padded.resize(self.dp_size as usize, 0);
        base.write_all(&padded)?;
        Ok(())
    }

    fn read_base_region(&self, dp_id: u64) -> DbZeroResult<Option<Vec<u8>>> {
        let mut base = self.base.lock();
        let offset = self.base_offset(dp_id);
        let len = base.metadata()?.len();
        if offset + self.dp_size as u64 > len {
            return Ok(None);
        }
        base.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.dp_size as usize];
        base.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    /// Durably commit one DP's new image at `state_num`: append the
    /// metaio record (fsynced), then refresh the base-region cache.
    pub fn commit_full_page(&self, dp_id: u64, state_num: u64, bytes: Vec<u8>) -> DbZeroResult<()> {
        let record = MetaioRecord {
            kind: RecordKind::FullPage,
            state_num,
            dp_id,
            payload: bytes.clone(),
        };
        self.metaio.lock().append(&record)?;
        self.record_history(&record);
        self.write_base_region(dp_id, &bytes)?;
        self.current_state_num.fetch_max(state_num, Ordering::SeqCst);
        tracing::debug!(dp_id, state_num, "committed full page");
        Ok(())
    }

    /// Durably commit a diff record: `ranges` are `(offset, bytes)` pairs
    /// against the DP's prior image, truncated/extended to `base_len`.
    pub fn commit_diff(
        &self,
        dp_id: u64,
        state_num: u64,
        base_len: usize,
        ranges: Vec<(usize, Vec<u8>)>,
    ) -> DbZeroResult<()> {
        let payload = format::encode_diff_payload(base_len, &ranges);
        let record = MetaioRecord {
            kind: RecordKind::Diff,
            state_num,
            dp_id,
            payload,
        };
        self.metaio.lock().append(&record)?;
        self.record_history(&record);

        let prior = self.read_base_region(dp_id)?.unwrap_or_default();
        let new_image = format::apply_diff(&prior, base_len, &ranges);
        self.write_base_region(dp_id, &new_image)?;
        self.current_state_num.fetch_max(state_num, Ordering::SeqCst);
        tracing::debug!(dp_id, state_num, "committed diff record");
        Ok(())
    }

    /// Commit a dirty-cache decision for one DP (spec §4.2: the dirty
    /// cache decides full-page vs diff, the page store just durably
    /// records whichever it picked).
    pub fn commit_action(
        &self,
        dp_id: u64,
        state_num: u64,
        action: dbzero_storage::CommitAction,
    ) -> DbZeroResult<()> {
        match action {
            dbzero_storage::CommitAction::FullPage(bytes) => {
                self.commit_full_page(dp_id, state_num, bytes)
            }
            dbzero_storage::CommitAction::Diff { base_len, ranges } => {
                self.commit_diff(dp_id, state_num, base_len, ranges)
            }
        }
    }

    /// Every DP id this store has ever recorded a write for.
    pub fn known_dp_ids(&self) -> Vec<u64> {
        self.history.iter().map(|e| *e.key()).collect()
    }

    /// History length (number of recorded writes) for a DP, for tests and
    /// diagnostics.
    pub fn history_len(&self, dp_id: u64) -> usize {
        self.history.get(&dp_id).map(|e| e.len()).unwrap_or(0)
    }

    /// Path to the base region file, for tooling that needs to inspect it
    /// directly (e.g. the CLI's `dump` command).
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Take a fresh read-only mmap of the base region, for bulk scans
    /// (e.g. dumping every DP of a class) that would otherwise pay a
    /// syscall per page via [`Self::read_page`]. The DBZero on-disk
    /// format stores fields in native byte order specifically so this
    /// kind of mmap-and-scan is sound on little-endian hosts (see
    /// `dbzero_core::require_little_endian`).
    pub fn mmap_base_region(&self) -> DbZeroResult<memmap2::Mmap> {
        let base = self.base.lock();
        // Safety: the base file is only ever extended (never truncated
        // except during recovery, before any mmap is taken), so a mapping
        // of its current length stays valid for the mapping's lifetime.
        let mmap = unsafe { memmap2::MmapOptions::new().map(&*base)? };
        Ok(mmap)
    }
}

impl dbzero_storage::CommitSink for PageFile {
    fn commit_dp(&self, dp_id: u64, state_num: u64, action: dbzero_storage::CommitAction) -> DbZeroResult<()> {
        self.commit_action(dp_id, state_num, action)
    }
}

impl PageStore for PageFile {
    fn read_page(&self, dp_id: u64) -> DbZeroResult<Option<Vec<u8>>> {
        self.read_base_region(dp_id)
    }

    fn read_page_at(&self, dp_id: u64, state_num: u64) -> DbZeroResult<Option<Vec<u8>>> {
        Ok(self.reconstruct_at(dp_id, state_num))
    }

    fn prefix(&self) -> PrefixUuid {
        self.prefix
    }

    fn current_state_num(&self) -> u64 {
        self.current_state_num.load(Ordering::SeqCst)
    }
}

/// A read-only index into a prefix's history, useful for tooling that
/// wants a sorted `state_num -> dp_id` view without locking the store
/// (e.g. `dbzero-cli dump`).
pub fn commit_index(store: &PageFile) -> BTreeMap<u64, Vec<u64>> {
    let mut index: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for dp_id in store.known_dp_ids() {
        if let Some(entries) = store.history.get(&dp_id) {
            for entry in entries.iter() {
                index.entry(entry.state_num).or_default().push(dp_id);
            }
        }
    }
    index
}
