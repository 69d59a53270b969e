//! The metaio append log: a sequence of [`MetaioRecord`]s recording every
//! committed page write, used both to replay the base region on crash
//! recovery and to let other processes tail a prefix's commits cheaply
//! (spec §4.2).
//!
//! Recovery walks the log from the start, stopping at the first record
//! that fails to parse or fails its checksum — a torn write from a crash
//! mid-append. The file is then truncated to the last good record
//! boundary (mirrors the teacher's WAL segment `truncate` used during
//! recovery).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::format::MetaioRecord;

/// Append-only log of [`MetaioRecord`]s backing one prefix.
pub struct MetaioLog {
    file: File,
    path: PathBuf,
    len: u64,
}

impl MetaioLog {
    /// Create a new, empty metaio log file. Errors if it already exists.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self { file, path, len: 0 })
    }

    /// Open an existing metaio log for appending, without running
    /// recovery. Use [`Self::recover`] on startup instead when the file
    /// may contain a torn tail write.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.seek(SeekFrom::End(0))?;
        Ok(Self { file, path, len })
    }

    /// Open an existing metaio log, truncating any trailing partial or
    /// corrupted record. Returns the log plus every valid record read, in
    /// log order.
    pub fn recover(path: impl AsRef<Path>) -> std::io::Result<(Self, Vec<MetaioRecord>)> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match MetaioRecord::from_bytes(&bytes[offset..]) {
                Ok((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                }
                Err(_) => break,
            }
        }

        if offset != bytes.len() {
            file.set_len(offset as u64)?;
        }
        file.seek(SeekFrom::Start(offset as u64))?;

        Ok((
            Self {
                file,
                path,
                len: offset as u64,
            },
            records,
        ))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the log, in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if the log has never had a record appended.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one record and fsync it durably.
    pub fn append(&mut self, record: &MetaioRecord) -> std::io::Result<()> {
        let bytes = record.to_bytes();
        self.file.write_all(&bytes)?;
        self.file.sync_data()?;
        self.len += bytes.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::RecordKind;
    use tempfile::tempdir;

    fn rec(state_num: u64, dp_id: u64) -> MetaioRecord {
        MetaioRecord {
            kind: RecordKind::FullPage,
            state_num,
            dp_id,
            payload: vec![state_num as u8; 8],
        }
    }

    #[test]
    fn append_then_recover_returns_all_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.log");
        {
            let mut log = MetaioLog::create(&path).unwrap();
            log.append(&rec(1, 0)).unwrap();
            log.append(&rec(2, 1)).unwrap();
        }
        let (log, records) = MetaioLog::recover(&path).unwrap();
        assert_eq!(records, vec![rec(1, 0), rec(2, 1)]);
        assert_eq!(log.len(), records.iter().map(|r| r.to_bytes().len() as u64).sum::<u64>());
    }

    #[test]
    fn recover_truncates_torn_tail_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.log");
        {
            let mut log = MetaioLog::create(&path).unwrap();
            log.append(&rec(1, 0)).unwrap();
        }
        // Simulate a crash mid-write: append a few garbage bytes.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[1, 2, 3]).unwrap();
        }
        let (log, records) = MetaioLog::recover(&path).unwrap();
        assert_eq!(records, vec![rec(1, 0)]);
        assert_eq!(log.len(), rec(1, 0).to_bytes().len() as u64);

        let on_disk = std::fs::metadata(&path).unwrap().len();
        assert_eq!(on_disk, log.len());
    }

    #[test]
    fn recover_on_empty_file_yields_no_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.log");
        MetaioLog::create(&path).unwrap();
        let (log, records) = MetaioLog::recover(&path).unwrap();
        assert!(records.is_empty());
        assert!(log.is_empty());
    }
}
