//! Slab allocator: owns the set of slabs for one prefix and serves DP
//! allocations/deallocations against them (spec §4.1).
//!
//! Mirrors the teacher's sharded-map idiom: each slab is its own lock
//! domain behind a `DashMap`, so allocations against different slabs never
//! contend. Unlike the teacher's per-branch sharding, slabs here are
//! provisioned lazily and in order — allocation always tries the
//! lowest-id non-exhausted slab before creating a new one, to keep
//! occupancy dense.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use dbzero_core::{DbZeroError, DbZeroResult, Limits, PrefixUuid};
use parking_lot::RwLock;

use crate::address::DpAddress;
use crate::slab::Slab;

/// A reserved, well-known allocation carved out of slab 0 at prefix
/// creation, before any user data exists (spec §4.6: string pool; §4.5:
/// class records).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedRegion {
    /// The string pool's backing DPs.
    StringPool,
    /// The class descriptor table's backing DPs.
    ClassRecords,
}

/// Allocates and releases data pages across a growing set of slabs for a
/// single prefix.
pub struct SlabAllocator {
    prefix: PrefixUuid,
    limits: Limits,
    slabs: DashMap<u32, RwLock<Slab>>,
    next_slab_id: AtomicU32,
    reserved: DashMap<ReservedRegion, DpAddress>,
}

impl SlabAllocator {
    /// Create an allocator with no slabs yet provisioned.
    pub fn new(prefix: PrefixUuid, limits: Limits) -> Self {
        Self {
            prefix,
            limits,
            slabs: DashMap::new(),
            next_slab_id: AtomicU32::new(0),
            reserved: DashMap::new(),
        }
    }

    /// The prefix this allocator serves.
    pub fn prefix(&self) -> PrefixUuid {
        self.prefix
    }

    /// Number of slabs currently provisioned.
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    fn provision_slab(&self) -> u32 {
        let id = self.next_slab_id.fetch_add(1, Ordering::SeqCst);
        self.slabs.insert(id, RwLock::new(Slab::new(id, &self.limits)));
        id
    }

    /// Allocate a single DP, provisioning a new slab if every existing one
    /// is exhausted.
    pub fn alloc_one(&self) -> DbZeroResult<DpAddress> {
        if let Some(addr) = self.try_alloc_one_existing() {
            return Ok(addr);
        }
        let id = self.provision_slab();
        let slab = self.slabs.get(&id).expect("just inserted");
        let local = slab
            .write()
            .alloc_one()
            .ok_or_else(|| DbZeroError::AllocationExceeded {
                requested: self.limits.dp_size as u64,
                slab_size: self.limits.slab_size,
            })?;
        Ok(DpAddress::new(id, local))
    }

    fn try_alloc_one_existing(&self) -> Option<DpAddress> {
        let mut ids: Vec<u32> = self.slabs.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        for id in ids {
            let slab = self.slabs.get(&id)?;
            if let Some(local) = slab.write().alloc_one() {
                return Some(DpAddress::new(id, local));
            }
        }
        None
    }

    /// Allocate a contiguous run of `count` DPs within a single slab (a
    /// wide lock, spec §4.1). Provisions a fresh slab if no existing one
    /// has a large-enough contiguous gap.
    pub fn alloc_run(&self, count: u32) -> DbZeroResult<DpAddress> {
        if (count as u64) > self.limits.dps_per_slab() as u64 {
            return Err(DbZeroError::AllocationExceeded {
                requested: count as u64 * self.limits.dp_size as u64,
                slab_size: self.limits.slab_size,
            });
        }
        let mut ids: Vec<u32> = self.slabs.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(slab) = self.slabs.get(&id) {
                if let Some(local) = slab.write().alloc_run(count) {
                    return Ok(DpAddress::new(id, local));
                }
            }
        }
        let id = self.provision_slab();
        let slab = self.slabs.get(&id).expect("just inserted");
        let local = slab
            .write()
            .alloc_run(count)
            .ok_or_else(|| DbZeroError::AllocationExceeded {
                requested: count as u64 * self.limits.dp_size as u64,
                slab_size: self.limits.slab_size,
            })?;
        Ok(DpAddress::new(id, local))
    }

    /// Release a single DP back to its slab.
    pub fn free_one(&self, addr: DpAddress) -> DbZeroResult<()> {
        let slab = self.slabs.get(&addr.slab_id).ok_or(DbZeroError::InvalidAddress {
            dp_id: addr.to_u64(),
            offset: 0,
        })?;
        slab.write().free_one(addr.local_index);
        Ok(())
    }

    /// Release a contiguous run back to its slab.
    pub fn free_run(&self, addr: DpAddress, count: u32) -> DbZeroResult<()> {
        let slab = self.slabs.get(&addr.slab_id).ok_or(DbZeroError::InvalidAddress {
            dp_id: addr.to_u64(),
            offset: 0,
        })?;
        slab.write().free_run(addr.local_index, count);
        Ok(())
    }

    /// Reserve a fixed region (called once at prefix creation).
    pub fn reserve(&self, region: ReservedRegion, count: u32) -> DbZeroResult<DpAddress> {
        let addr = self.alloc_run(count)?;
        self.reserved.insert(region, addr);
        Ok(addr)
    }

    /// Look up a previously reserved region's address.
    pub fn reserved_address(&self, region: ReservedRegion) -> Option<DpAddress> {
        self.reserved.get(&region).map(|e| *e.value())
    }

    /// Total free DPs across all provisioned slabs.
    pub fn total_free(&self) -> u32 {
        self.slabs.iter().map(|e| e.value().read().free_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> SlabAllocator {
        let limits = Limits::new(1 << 20, 64 * 1024, 4096).unwrap();
        SlabAllocator::new(PrefixUuid::from_name("test"), limits)
    }

    #[test]
    fn alloc_one_provisions_first_slab_lazily() {
        let alloc = allocator();
        assert_eq!(alloc.slab_count(), 0);
        let addr = alloc.alloc_one().unwrap();
        assert_eq!(addr.slab_id, 0);
        assert_eq!(alloc.slab_count(), 1);
    }

    #[test]
    fn alloc_one_fills_existing_slabs_before_provisioning() {
        let alloc = allocator();
        for _ in 0..16 {
            alloc.alloc_one().unwrap();
        }
        assert_eq!(alloc.slab_count(), 1);
        let addr = alloc.alloc_one().unwrap();
        assert_eq!(addr.slab_id, 1);
        assert_eq!(alloc.slab_count(), 2);
    }

    #[test]
    fn free_then_alloc_reuses_the_slot() {
        let alloc = allocator();
        let addr = alloc.alloc_one().unwrap();
        alloc.free_one(addr).unwrap();
        assert_eq!(alloc.total_free(), 16);
    }

    #[test]
    fn wide_lock_run_too_large_for_any_slab_is_rejected() {
        let alloc = allocator();
        assert!(alloc.alloc_run(17).is_err());
    }

    #[test]
    fn reserved_region_is_retrievable() {
        let alloc = allocator();
        let addr = alloc.reserve(ReservedRegion::StringPool, 2).unwrap();
        assert_eq!(alloc.reserved_address(ReservedRegion::StringPool), Some(addr));
        assert_eq!(alloc.reserved_address(ReservedRegion::ClassRecords), None);
    }

    #[test]
    fn invalid_slab_id_free_is_rejected() {
        let alloc = allocator();
        let bogus = DpAddress::new(999, 0);
        assert!(alloc.free_one(bogus).is_err());
    }
}
