//! Address decomposition: split a 64-bit virtual address into (tag, index, block)
//! given a cache's geometry. Hot inner loop — kept branch-light and allocation-free.

use crate::error::{Result, SimulationError};

/// The geometry of one cache level: total size, line size, and associativity, all in
/// bytes/ways. Shared by the decoder and every cache variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub cache_size: u64,
    pub line_size: u32,
    pub set_size: u32,
}

impl Geometry {
    /// Validates that `cache_size`, `line_size`, and `set_size` are all powers of
    /// two, that `line_size` divides `cache_size`, that `set_size` divides the
    /// resulting line count, and that the index fits comfortably under 62 bits.
    /// `InfiniteCache` does not go through this (it has no real geometry to check).
    pub fn validate(&self) -> Result<()> {
        if !self.cache_size.is_power_of_two() {
            return Err(SimulationError::InvalidCacheGeometry(format!(
                "cache_size {} is not a power of two",
                self.cache_size
            )));
        }
        if self.line_size == 0 || !self.line_size.is_power_of_two() {
            return Err(SimulationError::InvalidCacheGeometry(format!(
                "line_size {} is not a power of two",
                self.line_size
            )));
        }
        if self.cache_size % self.line_size as u64 != 0 {
            return Err(SimulationError::InvalidCacheGeometry(format!(
                "line_size {} does not divide cache_size {}",
                self.line_size, self.cache_size
            )));
        }
        if self.set_size == 0 || !self.set_size.is_power_of_two() {
            return Err(SimulationError::InvalidCacheGeometry(format!(
                "set_size {} is not a power of two",
                self.set_size
            )));
        }
        let lines = self.cache_size / self.line_size as u64;
        if lines % self.set_size as u64 != 0 {
            return Err(SimulationError::InvalidCacheGeometry(format!(
                "set_size {} does not divide cache_size/line_size ({})",
                self.set_size, lines
            )));
        }
        let index_bits = self.index_bits();
        if index_bits >= 62 {
            return Err(SimulationError::InvalidCacheGeometry(format!(
                "index needs {index_bits} bits, which does not fit under 62"
            )));
        }
        Ok(())
    }

    pub fn block_bits(&self) -> u32 {
        self.line_size.trailing_zeros()
    }

    pub fn num_sets(&self) -> u64 {
        self.cache_size / (self.line_size as u64 * self.set_size as u64)
    }

    /// Valid only once the geometry has passed [`Geometry::validate`] (`num_sets` is then
    /// guaranteed to be an exact power of two).
    pub fn index_bits(&self) -> u32 {
        self.num_sets().max(1).trailing_zeros()
    }
}

/// A decoded address: the three fields a cache variant needs to look up a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheAddress {
    pub tag: u64,
    pub index: u32,
    pub block: u32,
}

/// Splits `addr` into (tag, index, block) per the given geometry. Pure, constant-time.
pub fn decode(addr: u64, geo: &Geometry) -> CacheAddress {
    let block_bits = geo.block_bits();
    let index_bits = geo.index_bits();
    let block_mask = (1u64 << block_bits) - 1;
    let index_mask = if index_bits == 0 {
        0
    } else {
        (1u64 << index_bits) - 1
    };

    let block = (addr & block_mask) as u32;
    let index = ((addr >> block_bits) & index_mask) as u32;
    let tag = addr >> (block_bits + index_bits);

    CacheAddress { tag, index, block }
}

/// Inverse of [`decode`]: reassembles the raw address bits a `CacheAddress` stands for.
pub fn reconstruct(address: &CacheAddress, geo: &Geometry) -> u64 {
    let block_bits = geo.block_bits();
    let index_bits = geo.index_bits();
    (address.tag << (block_bits + index_bits))
        | ((address.index as u64) << block_bits)
        | address.block as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> Geometry {
        Geometry {
            cache_size: 32 * 1024,
            line_size: 64,
            set_size: 4,
        }
    }

    #[test]
    fn validate_accepts_legal_geometry() {
        assert!(geo().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_power_of_two_size() {
        let g = Geometry {
            cache_size: 3000,
            ..geo()
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn validate_rejects_indivisible_line_size() {
        let g = Geometry {
            line_size: 48,
            ..geo()
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn validate_rejects_indivisible_set_size() {
        let g = Geometry {
            set_size: 3,
            ..geo()
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn decode_block_and_index_within_range() {
        let g = geo();
        let addr = 0x1234_5678_9u64;
        let a = decode(addr, &g);
        assert!(a.block < g.line_size);
        assert!((a.index as u64) < g.num_sets());
    }

    #[test]
    fn round_trip_identity_for_many_addresses() {
        let g = geo();
        for addr in [
            0u64,
            1,
            0x1000,
            0xffff_ffff_ffff_ffff,
            0xdead_beef_cafe_babe,
            1 << 40,
        ] {
            let decoded = decode(addr, &g);
            assert_eq!(reconstruct(&decoded, &g), addr);
        }
    }

    #[test]
    fn same_index_different_tag_for_aliasing_addresses() {
        let g = geo();
        let a0 = decode(0, &g);
        let stride = 1u64 << (g.block_bits() + g.index_bits());
        let a1 = decode(stride, &g);
        assert_eq!(a0.index, a1.index);
        assert_ne!(a0.tag, a1.tag);
    }
}
