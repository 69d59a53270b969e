//! Ref-counted string interning for tag names (spec §4.6, "String
//! pool").

use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;

/// Opaque handle to an interned string. Cheap to copy and compare.
#[derive(Debug, Clone)]
pub struct InternedString(Arc<str>);

impl InternedString {
    /// Borrow the interned text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for InternedString {}

impl std::fmt::Display for InternedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Slot {
    text: Arc<str>,
    refs: u32,
}

/// Ref-counted string interning table. "Adding a tag name bumps its
/// count; removal decrements. When a count reaches zero the slot is
/// reclaimed" (spec §4.6).
#[derive(Default)]
pub struct StringPool {
    slots: DashMap<Arc<str>, Slot>,
}

impl StringPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, bumping its refcount (creating the slot on first
    /// use).
    pub fn intern(&self, text: &str) -> InternedString {
        if let Some(mut slot) = self.slots.get_mut(text) {
            slot.refs += 1;
            return InternedString(Arc::clone(&slot.text));
        }
        let arc: Arc<str> = Arc::from(text);
        self.slots.insert(
            Arc::clone(&arc),
            Slot {
                text: Arc::clone(&arc),
                refs: 1,
            },
        );
        InternedString(arc)
    }

    /// Release one reference to `text`; reclaims the slot if the count
    /// reaches zero. No-op if `text` is not interned.
    pub fn release(&self, text: &str) {
        let mut reclaim = false;
        if let Some(mut slot) = self.slots.get_mut(text) {
            slot.refs = slot.refs.saturating_sub(1);
            reclaim = slot.refs == 0;
        }
        if reclaim {
            self.slots.remove(text);
        }
    }

    /// Current refcount for `text`, or 0 if not interned.
    pub fn ref_count(&self, text: &str) -> u32 {
        self.slots.get(text).map(|s| s.refs).unwrap_or(0)
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no strings.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Snapshot of every interned string and its refcount, for tooling
    /// (e.g. `dbzero-cli dump`).
    pub fn snapshot(&self) -> FxHashMap<String, u32> {
        self.slots.iter().map(|e| (e.key().to_string(), e.refs)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_intern_shares_the_slot_and_bumps_refcount() {
        let pool = StringPool::new();
        pool.intern("tag");
        pool.intern("tag");
        assert_eq!(pool.ref_count("tag"), 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn release_to_zero_reclaims_the_slot() {
        let pool = StringPool::new();
        pool.intern("tag");
        pool.release("tag");
        assert_eq!(pool.ref_count("tag"), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn release_of_unknown_string_is_harmless() {
        let pool = StringPool::new();
        pool.release("ghost");
        assert!(pool.is_empty());
    }
}
