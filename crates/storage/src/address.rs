//! Data-page addressing.
//!
//! A DP is addressed globally by packing its owning slab id into the high
//! bits and its local index within that slab into the low bits, so a
//! `dp_id: u64` round-trips through `PageStore`/`SnapshotView` (spec §3,
//! §4.1) without the allocator needing a side table.

/// A global data-page address: `(slab_id, local_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DpAddress {
    /// Owning slab.
    pub slab_id: u32,
    /// Index of the DP within that slab.
    pub local_index: u32,
}

impl DpAddress {
    /// Construct from parts.
    pub fn new(slab_id: u32, local_index: u32) -> Self {
        Self {
            slab_id,
            local_index,
        }
    }

    /// Pack into the flat `u64` used by `PageStore::read_page`.
    pub fn to_u64(self) -> u64 {
        ((self.slab_id as u64) << 32) | self.local_index as u64
    }

    /// Unpack from a flat `u64`.
    pub fn from_u64(raw: u64) -> Self {
        Self {
            slab_id: (raw >> 32) as u32,
            local_index: raw as u32,
        }
    }
}

impl From<DpAddress> for u64 {
    fn from(addr: DpAddress) -> u64 {
        addr.to_u64()
    }
}

impl From<u64> for DpAddress {
    fn from(raw: u64) -> DpAddress {
        DpAddress::from_u64(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u64() {
        let addr = DpAddress::new(7, 42);
        assert_eq!(DpAddress::from_u64(addr.to_u64()), addr);
    }

    #[test]
    fn slab_id_occupies_high_bits() {
        let addr = DpAddress::new(1, 0);
        assert_eq!(addr.to_u64(), 1u64 << 32);
    }
}
