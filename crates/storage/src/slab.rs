//! A single slab: a fixed-size region segmented into equal-sized data
//! pages, tracked by one `DpBitset` (spec §4.1).

use dbzero_core::Limits;

use crate::bitset::DpBitset;

/// One allocated slab. Owns only bookkeeping state; the actual bytes live
/// in the durable page store, which the allocator never touches directly
/// (spec §4.1/§4.2 split between allocation and storage).
#[derive(Debug)]
pub struct Slab {
    id: u32,
    bitset: DpBitset,
    dp_size: u32,
}

impl Slab {
    /// Create a fresh, fully-free slab sized per `limits`.
    pub fn new(id: u32, limits: &Limits) -> Self {
        Self {
            id,
            bitset: DpBitset::new(limits.dps_per_slab()),
            dp_size: limits.dp_size,
        }
    }

    /// This slab's id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Size of each DP in this slab, in bytes.
    pub fn dp_size(&self) -> u32 {
        self.dp_size
    }

    /// Number of DPs still free.
    pub fn free_count(&self) -> u32 {
        self.bitset.free_count()
    }

    /// Total DPs tracked by this slab.
    pub fn capacity(&self) -> u32 {
        self.bitset.len()
    }

    /// Allocate a single DP, returning its local index.
    pub fn alloc_one(&mut self) -> Option<u32> {
        self.bitset.alloc_one()
    }

    /// Allocate a contiguous run of `count` DPs (a wide lock), returning
    /// the starting local index.
    pub fn alloc_run(&mut self, count: u32) -> Option<u32> {
        self.bitset.alloc_run(count)
    }

    /// Release a single DP back to the free pool.
    pub fn free_one(&mut self, local_index: u32) {
        self.bitset.free_one(local_index);
    }

    /// Release a contiguous run back to the free pool.
    pub fn free_run(&mut self, start: u32, count: u32) {
        self.bitset.free_run(start, count);
    }

    /// True once every DP in the slab has been allocated at least once
    /// and none are currently free; used by the allocator to decide when
    /// to provision a new slab instead of scanning a full one.
    pub fn is_exhausted(&self) -> bool {
        self.bitset.free_count() == 0
    }
}
