//! Core identifiers for DBZero
//!
//! - `PrefixId`: identifies a named logical volume (one file per prefix)
//! - `ObjectUuid`: 128-bit identifier for a memo object, base32-printable
//! - `ClassUuid`: 128-bit identifier for a memo class
//! - `TypeTag`: discriminates tag-key kinds (string / enum / class / as-tag)

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Base32 alphabet used for printing object/class uuids (Crockford-style,
/// no padding). Chosen so that a 128-bit uuid prints in at most 22 chars,
/// matching the spec's `ObjectUuid` size bound.
const BASE32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

fn encode_base32(bytes: &[u8; 16]) -> String {
    let mut bits: u128 = 0;
    for b in bytes {
        bits = (bits << 8) | (*b as u128);
    }
    let mut out = Vec::with_capacity(26);
    // 128 bits / 5 bits-per-char = 25.6 -> 26 chars before trimming
    for shift in (0..26).rev() {
        let idx = ((bits >> (shift * 5)) & 0x1F) as usize;
        out.push(BASE32_ALPHABET[idx]);
    }
    // Strip leading zero-symbols but always keep at least one char.
    let first_nonzero = out.iter().position(|c| *c != b'0').unwrap_or(out.len() - 1);
    String::from_utf8(out[first_nonzero..].to_vec()).expect("ascii")
}

/// Identifies a named logical volume (prefix). A prefix is backed by one
/// file and is either writable by at most one process or readable by any
/// number of processes (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefixUuid(Uuid);

impl PrefixUuid {
    /// Create a new random prefix uuid.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derive a prefix uuid deterministically from a name, so that
    /// reopening the same name always yields the same uuid even before
    /// the file header has been read.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    /// Build from raw bytes (e.g. decoded from a file header).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw bytes of this uuid.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for PrefixUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrefixUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 128-bit identifier for a memo object. Printable as a base32 string of
/// at most 22 characters (spec §3, "Memo object").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectUuid(Uuid);

impl ObjectUuid {
    /// Create a new random object uuid.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build from raw bytes (e.g. decoded from storage).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw bytes, as stored on disk.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Base32 printable form, <= 22 chars.
    pub fn to_base32(&self) -> String {
        encode_base32(self.0.as_bytes())
    }

    /// Deterministic singleton uuid, derived from (class, prefix) so that
    /// exactly one instance of a singleton class exists per prefix
    /// (spec §4.5 "Singletons").
    pub fn singleton_of(class: ClassUuid, prefix: PrefixUuid) -> Self {
        let mut seed = Vec::with_capacity(32);
        seed.extend_from_slice(class.as_bytes());
        seed.extend_from_slice(prefix.as_bytes());
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, &seed))
    }
}

impl Default for ObjectUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

/// 128-bit identifier for a memo class (spec §3, "Memo class").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassUuid(Uuid);

impl ClassUuid {
    /// Create a new random class uuid.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derive a stable class uuid from a fully-qualified name (module +
    /// display name), so re-registering the same class across restarts
    /// is idempotent.
    pub fn from_qualified_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes()))
    }

    /// Build from raw bytes (e.g. decoded from storage).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ClassUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClassUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discriminates the kind of a tag key (spec §4.6, "Tag store").
///
/// Ordering here governs canonical sort order when a composite key is
/// hashed for a query signature; it is NOT persisted on disk (tag keys
/// carry their own discriminant byte in storage, see `dbzero-durability`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagKey {
    /// An interned string (string-pool retained).
    String(String),
    /// An enum value: (enum class uuid, ordinal).
    Enum(ClassUuid, u32),
    /// A class acting as a type tag.
    Class(ClassUuid),
    /// A memo object used as a tag ("as-tag").
    Object(ObjectUuid),
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagKey::String(s) => write!(f, "'{s}'"),
            TagKey::Enum(c, ord) => write!(f, "{c}#{ord}"),
            TagKey::Class(c) => write!(f, "class:{c}"),
            TagKey::Object(o) => write!(f, "obj:{o}"),
        }
    }
}
