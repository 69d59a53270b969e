//! Size limits for slabs, keys and values.

/// Default minimum slab size (1 MiB, spec §4.1).
pub const MIN_SLAB_SIZE: u64 = 1 << 20;

/// Default maximum slab size (1 GiB, spec §4.1).
pub const MAX_SLAB_SIZE: u64 = 1 << 30;

/// Default data-page size within a slab (64 KiB).
pub const DEFAULT_DP_SIZE: u32 = 64 * 1024;

/// Default metaio step size (4 KiB), chosen so that cross-process tailing
/// reads in fixed, page-aligned chunks (spec §4.2).
pub const DEFAULT_META_IO_STEP_SIZE: u32 = 4096;

/// Hard cap on an object uuid's printable length (spec §3).
pub const MAX_OBJECT_UUID_PRINTABLE_LEN: usize = 22;

/// Validated size limits for a prefix. Constructed via `Limits::new`,
/// which rejects configurations the allocator cannot serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Size of each slab, in bytes.
    pub slab_size: u64,
    /// Size of a data page within a slab, in bytes.
    pub dp_size: u32,
    /// Metaio log step size, in bytes.
    pub meta_io_step_size: u32,
}

/// Error constructing a `Limits` value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LimitError {
    /// Slab size outside `[MIN_SLAB_SIZE, MAX_SLAB_SIZE]`.
    #[error("slab size {0} outside [{MIN_SLAB_SIZE}, {MAX_SLAB_SIZE}]")]
    SlabSizeOutOfRange(u64),
    /// DP size not a power of two, or larger than the slab.
    #[error("dp size {dp_size} must be a power of two and <= slab size {slab_size}")]
    InvalidDpSize {
        /// Offending DP size.
        dp_size: u32,
        /// Configured slab size.
        slab_size: u64,
    },
    /// Metaio step size is zero.
    #[error("meta_io_step_size must be > 0")]
    ZeroMetaIoStep,
}

impl Limits {
    /// Validate and construct a `Limits`.
    pub fn new(slab_size: u64, dp_size: u32, meta_io_step_size: u32) -> Result<Self, LimitError> {
        if !(MIN_SLAB_SIZE..=MAX_SLAB_SIZE).contains(&slab_size) {
            return Err(LimitError::SlabSizeOutOfRange(slab_size));
        }
        if dp_size == 0 || !dp_size.is_power_of_two() || (dp_size as u64) > slab_size {
            return Err(LimitError::InvalidDpSize { dp_size, slab_size });
        }
        if meta_io_step_size == 0 {
            return Err(LimitError::ZeroMetaIoStep);
        }
        Ok(Self {
            slab_size,
            dp_size,
            meta_io_step_size,
        })
    }

    /// Number of DPs that fit in one slab.
    pub fn dps_per_slab(&self) -> u32 {
        (self.slab_size / self.dp_size as u64) as u32
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(MIN_SLAB_SIZE, DEFAULT_DP_SIZE, DEFAULT_META_IO_STEP_SIZE)
            .expect("default limits are always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_dp_size() {
        assert_eq!(
            Limits::new(MIN_SLAB_SIZE, 3000, DEFAULT_META_IO_STEP_SIZE),
            Err(LimitError::InvalidDpSize {
                dp_size: 3000,
                slab_size: MIN_SLAB_SIZE
            })
        );
    }

    #[test]
    fn rejects_slab_outside_range() {
        assert!(Limits::new(100, DEFAULT_DP_SIZE, DEFAULT_META_IO_STEP_SIZE).is_err());
    }

    #[test]
    fn dps_per_slab_is_exact_division() {
        let limits = Limits::new(1 << 20, 64 * 1024, 4096).unwrap();
        assert_eq!(limits.dps_per_slab(), 16);
    }
}
