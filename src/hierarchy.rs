//! Composes N cache levels into one hierarchy: shared clock, lower-to-upper probe
//! ordering, multi-line splitting, inter-level traffic accounting, and scatter/gather
//! bundle statistics.

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::cache::{Cache, CacheConfig};
use crate::clock::{Clock, ClockHandle};
use crate::config::Config;
use crate::entry::CacheEvents;
use crate::error::{Result, SimulationError};
use crate::trace::{MemoryRequest, BUNDLE_KIND_SENTINEL};

/// Per-pc scatter/gather bundle counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BundleStats {
    pub times_encountered: u64,
    pub total_ops: u64,
}

/// An ordered stack of cache levels sharing one logical clock.
pub struct CacheHierarchy {
    levels: Vec<Cache>,
    clock: ClockHandle,
    /// `traffic[0]` = bytes requested by the caller (CPU → L1); `traffic[k]` for
    /// `k in 1..=nlevels` = bytes fetched from level k+1 into level k on a miss.
    traffic: Vec<u64>,
    bundles: HashMap<u64, BundleStats>,
}

impl CacheHierarchy {
    /// Builds a hierarchy directly from per-level configs. All levels must share the
    /// same `line_size`.
    pub fn new(configs: Vec<CacheConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "a cache hierarchy needs at least one level".into(),
            ));
        }
        let line_size = configs[0].line_size;
        if configs.iter().any(|c| c.line_size != line_size) {
            return Err(SimulationError::InvalidConfig(
                "cache hierarchy does not have the same line size throughout".into(),
            ));
        }

        let clock: ClockHandle = Rc::new(Clock::new());
        let nlevels = configs.len();
        let mut levels = Vec::with_capacity(nlevels);
        for config in configs {
            levels.push(Cache::new(config, Rc::clone(&clock))?);
        }

        debug!("constructed cache hierarchy with {nlevels} levels, line_size={line_size}");

        Ok(Self {
            levels,
            clock,
            traffic: vec![0; nlevels + 1],
            bundles: HashMap::new(),
        })
    }

    /// Builds a hierarchy from a resolved [`Config`] (see `config::parse`).
    pub fn from_config(config: Config) -> Result<Self> {
        Self::new(config.levels)
    }

    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    pub fn current_cycle(&self) -> u64 {
        self.clock.current_cycle()
    }

    pub fn level(&self, level: usize) -> &Cache {
        &self.levels[level - 1]
    }

    pub fn hits(&self, level: usize) -> u64 {
        self.level(level).hits()
    }

    pub fn misses(&self, level: usize) -> u64 {
        self.level(level).misses()
    }

    pub fn total_accesses(&self, level: usize) -> u64 {
        self.level(level).total_accesses()
    }

    pub fn evictions(&self, level: usize) -> u64 {
        self.level(level).evictions()
    }

    /// Bytes transferred across interface `from_level`: 0 is CPU→L1 (total bytes
    /// requested), `k` is level `k` → level `k+1`.
    pub fn traffic(&self, from_level: usize) -> u64 {
        self.traffic[from_level]
    }

    pub fn lifetimes(&self, level: usize) -> &HashMap<u64, u64> {
        self.level(level).lifetime_histogram()
    }

    pub fn bundles(&self) -> &HashMap<u64, BundleStats> {
        &self.bundles
    }

    /// Runs one raw access through every level, lower to upper, stopping at the
    /// first hit. Each level that misses pulls one full line from the level above
    /// (accounted as traffic on that interface). Advances the clock by one tick once
    /// the whole (possibly multi-line) access completes.
    pub fn touch(&mut self, address: u64, size: u32) {
        self.traffic[0] += size as u64;

        let line_size = self.levels[0].line_size() as u64;
        let mut remaining = size as u64;
        let mut cursor = address;

        while remaining > 0 {
            let block = cursor & (line_size - 1);

            for (level_index, level) in self.levels.iter_mut().enumerate() {
                let events: CacheEvents = level.touch_line(cursor);
                if events.is_hit() {
                    break;
                }
                self.traffic[level_index + 1] += line_size;
            }

            let covered = line_size - block;
            remaining = remaining.saturating_sub(covered);
            cursor += covered;
        }

        self.clock.tick();
    }

    /// Equivalent to `touch(access.address, access.size)`.
    pub fn touch_sized(&mut self, access: crate::cache::SizedAccess) {
        self.touch(access.address, access.size);
    }

    /// Runs one trace request through the hierarchy. Bundle fields drive the bundle
    /// tally (below); they are otherwise ignored by the probe protocol itself.
    pub fn touch_request(&mut self, request: &MemoryRequest) {
        if request.is_bundle() && request.bundle_kind != BUNDLE_KIND_SENTINEL {
            let stats = self.bundles.entry(request.pc).or_default();
            stats.total_ops += 1;
            if request.is_bundle_start() {
                stats.times_encountered += 1;
            }
        }
        self.touch(request.address, request.size as u32);
    }

    pub fn touch_many(&mut self, addresses: &[u64], size: u32) {
        for &address in addresses {
            self.touch(address, size);
        }
    }

    pub fn touch_many_sized(&mut self, accesses: &[crate::cache::SizedAccess]) {
        for access in accesses {
            self.touch_sized(*access);
        }
    }

    pub fn touch_many_requests(&mut self, requests: &[MemoryRequest]) {
        for request in requests {
            self.touch_request(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKind;

    fn two_level_32k_64b_4way() -> CacheHierarchy {
        let cfg = CacheConfig {
            kind: CacheKind::SetAssociative,
            size: 32 * 1024,
            line_size: 64,
            set_size: 4,
        };
        CacheHierarchy::new(vec![cfg.clone(), cfg]).unwrap()
    }

    #[test]
    fn rejects_mixed_line_sizes() {
        let l1 = CacheConfig {
            kind: CacheKind::DirectMapped,
            size: 4096,
            line_size: 32,
            set_size: 1,
        };
        let l2 = CacheConfig {
            kind: CacheKind::DirectMapped,
            size: 8192,
            line_size: 64,
            set_size: 1,
        };
        assert!(CacheHierarchy::new(vec![l1, l2]).is_err());
    }

    #[test]
    fn scenario_repeated_access_hits_l1_only() {
        let mut h = two_level_32k_64b_4way();
        h.touch(0x1000, 64);
        assert_eq!(h.misses(1), 1);
        assert_eq!(h.misses(2), 1);

        h.touch(0x1000, 64);
        assert_eq!(h.hits(1), 1);
        assert_eq!(h.misses(2), 1);
        assert_eq!(h.hits(2), 0);

        assert_eq!(h.traffic(0), 128);
        assert_eq!(h.traffic(1), 64);
        assert_eq!(h.traffic(2), 64);
    }

    #[test]
    fn first_touch_misses_every_level() {
        let mut h = two_level_32k_64b_4way();
        h.touch(0x2000, 1);
        assert_eq!(h.misses(1), 1);
        assert_eq!(h.misses(2), 1);
    }

    #[test]
    fn multi_line_access_yields_k_l1_misses() {
        let mut h = two_level_32k_64b_4way();
        h.touch(0, 64 * 5);
        assert_eq!(h.misses(1), 5);
    }

    #[test]
    fn three_level_warm_and_conflict_pattern() {
        let cfg = |size: u64| CacheConfig {
            kind: CacheKind::DirectMapped,
            size,
            line_size: 64,
            set_size: 1,
        };
        let mut h = CacheHierarchy::new(vec![cfg(1024), cfg(2048), cfg(4096)]).unwrap();

        for addr in (0..1024).step_by(64) {
            h.touch(addr, 1);
        }
        assert_eq!(h.misses(1), 16);
        assert_eq!(h.misses(2), 16);
        assert_eq!(h.misses(3), 16);

        for addr in (1024..2048).step_by(64) {
            h.touch(addr, 1);
        }
        assert_eq!(h.misses(1), 32);
        assert_eq!(h.misses(2), 32);
        assert_eq!(h.misses(3), 32);

        for addr in (0..1024).step_by(64) {
            h.touch(addr, 1);
        }
        assert_eq!(h.misses(1), 48);
        assert_eq!(h.hits(2), 16);
        assert_eq!(h.misses(3), 32);
    }

    #[test]
    fn five_entry_text_trace_end_to_end() {
        let text = "\
            32,0,0,0,16,0xffff37414010,0x40091c\n\
            33,0,0,1,16,0xffff37313010,0x400924\n\
            4016116,0,3,0,8,0x6cf540,0x40e364\n\
            4016118,0,2,0,8,0x6cf580,0x40e364\n\
            4016123,0,6,0,8,0x6cf620,0x40e364\n";
        let trace = crate::trace::parse_text(std::io::Cursor::new(text)).unwrap();

        let mut h = two_level_32k_64b_4way();
        h.touch_many_requests(trace.requests());

        assert_eq!(h.current_cycle(), 5);
        let stats = h.bundles().get(&0x0040_e364).unwrap();
        assert_eq!(stats.times_encountered, 1);
        assert_eq!(stats.total_ops, 3);
    }

    #[test]
    fn bundle_sentinel_is_skipped_by_the_tally() {
        let mut h = two_level_32k_64b_4way();
        let req = MemoryRequest::new(0, 8, BUNDLE_KIND_SENTINEL, false, 0x10, 0x99);
        h.touch_request(&req);
        assert!(h.bundles().get(&0x99).is_none());
    }

    /// One bundle group is `Start, Middle.., End`; `times_encountered` should tick
    /// once per group sharing a pc, not once per trace or once per op.
    fn bundle_group(pc: u64, ops: u32, address: u64) -> Vec<MemoryRequest> {
        (0..ops)
            .map(|i| {
                let kind = if i == 0 {
                    0b001
                } else if i == ops - 1 {
                    0b100
                } else {
                    0b010
                };
                MemoryRequest::new(0, 8, kind, false, address + i as u64 * 8, pc)
            })
            .collect()
    }

    #[test]
    fn bundle_tally_counts_groups_not_total_ops() {
        let mut requests = bundle_group(0x40e364, 4, 0x1000);
        requests.extend(bundle_group(0x40e364, 4, 0x2000));
        requests.extend(bundle_group(0x40e200, 6, 0x3000));

        let mut h = two_level_32k_64b_4way();
        h.touch_many_requests(&requests);

        let a = h.bundles().get(&0x40e364).unwrap();
        assert_eq!(a.times_encountered, 2);
        assert_eq!(a.total_ops, 8);

        let b = h.bundles().get(&0x40e200).unwrap();
        assert_eq!(b.times_encountered, 1);
        assert_eq!(b.total_ops, 6);
    }
}
