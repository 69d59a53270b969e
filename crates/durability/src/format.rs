//! On-disk file format: the prefix file header and metaio log records.
//!
//! # Prefix file header (64 bytes)
//!
//! ```text
//! ┌────────────┬──────────────┬──────────────┬─────────┬───────────────┬───────────┐
//! │ magic (4)  │ version (4)  │ prefix (16)  │ dp (4)  │ meta step (4) │ created(8)│
//! └────────────┴──────────────┴──────────────┴─────────┴───────────────┴───────────┘
//! ```
//!
//! # Metaio record layout
//!
//! ```text
//! ┌──────────┬──────────┬───────────┬────────┬─────────────────┬─────────┐
//! │ len (4)  │ kind (1) │ state (8) │ dp (8) │ payload (var)    │ crc (4) │
//! └──────────┴──────────┴───────────┴────────┴─────────────────┴─────────┘
//! ```
//!
//! `len` covers everything between itself and the trailing CRC (inclusive
//! of `kind`/`state`/`dp`/`payload`). Fixed-step padding after a record is
//! zero-filled so cross-process tailing can always seek to the next
//! `meta_io_step_size` boundary even mid-record (spec §4.2).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{self, Cursor, Read, Write};

/// Magic bytes identifying a DBZero prefix file: "DBZ0".
pub const FILE_MAGIC: [u8; 4] = *b"DBZ0";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the prefix file header, in bytes.
pub const HEADER_SIZE: usize = 40;

/// The fixed header written at the start of every prefix's base file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Owning prefix's uuid bytes.
    pub prefix_uuid: [u8; 16],
    /// Data-page size in bytes, for this prefix's lifetime.
    pub dp_size: u32,
    /// Metaio log step size, in bytes.
    pub meta_io_step_size: u32,
    /// Creation time, microseconds since Unix epoch.
    pub created_at_micros: u64,
}

impl FileHeader {
    /// Serialize to a fixed-size byte array.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        cursor.write_all(&FILE_MAGIC).unwrap();
        cursor.write_u32::<LittleEndian>(FORMAT_VERSION).unwrap();
        cursor.write_all(&self.prefix_uuid).unwrap();
        cursor.write_u32::<LittleEndian>(self.dp_size).unwrap();
        cursor.write_u32::<LittleEndian>(self.meta_io_step_size).unwrap();
        cursor.write_u64::<LittleEndian>(self.created_at_micros).unwrap();
        buf
    }

    /// Parse from a fixed-size byte array, validating magic and version.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, FormatError> {
        let mut cursor = Cursor::new(&buf[..]);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != FILE_MAGIC {
            return Err(FormatError::BadMagic);
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let mut prefix_uuid = [0u8; 16];
        cursor.read_exact(&mut prefix_uuid)?;
        let dp_size = cursor.read_u32::<LittleEndian>()?;
        let meta_io_step_size = cursor.read_u32::<LittleEndian>()?;
        let created_at_micros = cursor.read_u64::<LittleEndian>()?;
        Ok(Self {
            prefix_uuid,
            dp_size,
            meta_io_step_size,
            created_at_micros,
        })
    }
}

/// Whether a metaio record carries a full page image or a sparse diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Full page contents follow.
    FullPage = 0,
    /// A sequence of `(offset, bytes)` diff ranges follows.
    Diff = 1,
}

impl RecordKind {
    fn from_u8(b: u8) -> Result<Self, FormatError> {
        match b {
            0 => Ok(Self::FullPage),
            1 => Ok(Self::Diff),
            other => Err(FormatError::UnknownRecordKind(other)),
        }
    }
}

/// One durable write: a single DP's new image at a given state number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaioRecord {
    /// Kind of payload carried.
    pub kind: RecordKind,
    /// The finalized state number this write belongs to.
    pub state_num: u64,
    /// The flat DP id this record updates.
    pub dp_id: u64,
    /// Raw payload bytes: the full page, or an encoded diff range list.
    pub payload: Vec<u8>,
}

impl MetaioRecord {
    /// Serialize to bytes: `len(4) + kind(1) + state(8) + dp(8) + payload + crc(4)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(17 + self.payload.len());
        body.push(self.kind as u8);
        body.extend_from_slice(&self.state_num.to_le_bytes());
        body.extend_from_slice(&self.dp_id.to_le_bytes());
        body.extend_from_slice(&self.payload);

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let total_len = body.len() + 4;
        let mut out = Vec::with_capacity(4 + total_len);
        out.extend_from_slice(&(total_len as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Parse one record from the front of `bytes`, returning the record
    /// and how many bytes it consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), FormatError> {
        if bytes.len() < 4 {
            return Err(FormatError::Truncated);
        }
        let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        if len < 17 + 4 || bytes.len() < 4 + len {
            return Err(FormatError::Truncated);
        }
        let body_and_crc = &bytes[4..4 + len];
        let body = &body_and_crc[..len - 4];
        let stored_crc = u32::from_le_bytes(body_and_crc[len - 4..].try_into().unwrap());

        let mut hasher = Hasher::new();
        hasher.update(body);
        let computed = hasher.finalize();
        if computed != stored_crc {
            return Err(FormatError::ChecksumMismatch);
        }

        let kind = RecordKind::from_u8(body[0])?;
        let state_num = u64::from_le_bytes(body[1..9].try_into().unwrap());
        let dp_id = u64::from_le_bytes(body[9..17].try_into().unwrap());
        let payload = body[17..].to_vec();

        Ok((
            Self {
                kind,
                state_num,
                dp_id,
                payload,
            },
            4 + len,
        ))
    }
}

/// One changed byte range within a diff record: `(offset, bytes)`.
pub type DiffRange = (usize, Vec<u8>);

/// Encode a diff record payload: `base_len(8) + count(4)` followed by
/// `offset(8) + len(4) + bytes` per range.
pub fn encode_diff_payload(base_len: usize, ranges: &[DiffRange]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(base_len as u64).to_le_bytes());
    out.extend_from_slice(&(ranges.len() as u32).to_le_bytes());
    for (offset, bytes) in ranges {
        out.extend_from_slice(&(*offset as u64).to_le_bytes());
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Decode a diff record payload produced by [`encode_diff_payload`].
pub fn decode_diff_payload(payload: &[u8]) -> Result<(usize, Vec<DiffRange>), FormatError> {
    if payload.len() < 12 {
        return Err(FormatError::Truncated);
    }
    let base_len = u64::from_le_bytes(payload[0..8].try_into().unwrap()) as usize;
    let count = u32::from_le_bytes(payload[8..12].try_into().unwrap()) as usize;
    let mut ranges = Vec::with_capacity(count);
    let mut cursor = 12usize;
    for _ in 0..count {
        if payload.len() < cursor + 12 {
            return Err(FormatError::Truncated);
        }
        let offset = u64::from_le_bytes(payload[cursor..cursor + 8].try_into().unwrap()) as usize;
        let len = u32::from_le_bytes(payload[cursor + 8..cursor + 12].try_into().unwrap()) as usize;
        cursor += 12;
        if payload.len() < cursor + len {
            return Err(FormatError::Truncated);
        }
        ranges.push((offset, payload[cursor..cursor + len].to_vec()));
        cursor += len;
    }
    Ok((base_len, ranges))
}

/// Apply decoded diff ranges onto a base image, growing it if the diff
/// touches bytes past the current end (mirrors `base_len` from the
/// original commit so a reconstructed page matches exactly).
pub fn apply_diff(base: &[u8], base_len: usize, ranges: &[DiffRange]) -> Vec<u8> {
    let mut out = base.to_vec();
    out.resize(base_len.max(out.len()), 0);
    for (offset, bytes) in ranges {
        let end = offset + bytes.len();
        if out.len() < end {
            out.resize(end, 0);
        }
        out[*offset..end].copy_from_slice(bytes);
    }
    out
}

/// Errors parsing the file header or metaio records.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Header magic bytes did not match.
    #[error("bad file magic")]
    BadMagic,
    /// Header/record version is not understood by this build.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    /// Record kind byte was neither FullPage nor Diff.
    #[error("unknown record kind byte {0}")]
    UnknownRecordKind(u8),
    /// Not enough bytes remained to parse a complete record.
    #[error("truncated record")]
    Truncated,
    /// CRC32 did not match the record body.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_payload_roundtrips() {
        let ranges: Vec<DiffRange> = vec![(2, vec![9, 9]), (10, vec![1])];
        let encoded = encode_diff_payload(20, &ranges);
        let (base_len, decoded) = decode_diff_payload(&encoded).unwrap();
        assert_eq!(base_len, 20);
        assert_eq!(decoded, ranges);
    }

    #[test]
    fn apply_diff_patches_in_place_and_grows_as_needed() {
        let base = vec![0u8; 5];
        let ranges: Vec<DiffRange> = vec![(2, vec![7, 8]), (6, vec![9])];
        let result = apply_diff(&base, 7, &ranges);
        assert_eq!(result, vec![0, 0, 7, 8, 0, 0, 9]);
    }

    #[test]
    fn header_roundtrips() {
        let header = FileHeader {
            prefix_uuid: [7u8; 16],
            dp_size: 65536,
            meta_io_step_size: 4096,
            created_at_micros: 1_700_000_000_000_000,
        };
        let bytes = header.to_bytes();
        let parsed = FileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = FileHeader {
            prefix_uuid: [0; 16],
            dp_size: 4096,
            meta_io_step_size: 4096,
            created_at_micros: 0,
        }
        .to_bytes();
        bytes[0] = b'X';
        assert!(matches!(FileHeader::from_bytes(&bytes), Err(FormatError::BadMagic)));
    }

    #[test]
    fn metaio_record_roundtrips() {
        let record = MetaioRecord {
            kind: RecordKind::FullPage,
            state_num: 42,
            dp_id: 7,
            payload: vec![1, 2, 3, 4],
        };
        let bytes = record.to_bytes();
        let (parsed, consumed) = MetaioRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn metaio_record_detects_corruption() {
        let record = MetaioRecord {
            kind: RecordKind::Diff,
            state_num: 1,
            dp_id: 1,
            payload: vec![9, 9],
        };
        let mut bytes = record.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            MetaioRecord::from_bytes(&bytes),
            Err(FormatError::ChecksumMismatch)
        ));
    }

    #[test]
    fn metaio_record_reports_truncation() {
        let record = MetaioRecord {
            kind: RecordKind::FullPage,
            state_num: 1,
            dp_id: 1,
            payload: vec![1, 2, 3],
        };
        let bytes = record.to_bytes();
        assert!(matches!(
            MetaioRecord::from_bytes(&bytes[..bytes.len() - 2]),
            Err(FormatError::Truncated)
        ));
    }

    #[test]
    fn sequential_records_parse_back_to_back() {
        let records = vec![
            MetaioRecord {
                kind: RecordKind::FullPage,
                state_num: 1,
                dp_id: 0,
                payload: vec![1, 2, 3],
            },
            MetaioRecord {
                kind: RecordKind::Diff,
                state_num: 2,
                dp_id: 1,
                payload: vec![],
            },
        ];
        let mut all = Vec::new();
        for r in &records {
            all.extend_from_slice(&r.to_bytes());
        }
        let mut offset = 0;
        for expected in &records {
            let (parsed, consumed) = MetaioRecord::from_bytes(&all[offset..]).unwrap();
            assert_eq!(&parsed, expected);
            offset += consumed;
        }
        assert_eq!(offset, all.len());
    }
}
