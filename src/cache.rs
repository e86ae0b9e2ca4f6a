//! A single cache level: address decomposition, pluggable replacement policy, and
//! per-level accounting (hits, misses, evictions, cache-line lifetime histogram).

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::address::{self, Geometry};
use crate::clock::ClockHandle;
use crate::entry::{CacheEntry, CacheEvents};
use crate::error::{Result, SimulationError};
use crate::trace::MemoryRequest;

/// Which replacement policy a cache level uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    Infinite,
    DirectMapped,
    SetAssociative,
}

/// Geometry plus replacement policy for one cache level.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub size: u64,
    pub line_size: u32,
    pub set_size: u32,
}

impl CacheConfig {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            cache_size: self.size,
            line_size: self.line_size,
            set_size: self.set_size,
        }
    }
}

/// A raw (address, size) pair — the simplest form of memory access.
#[derive(Clone, Copy, Debug)]
pub struct SizedAccess {
    pub address: u64,
    pub size: u32,
}

enum Variant {
    Infinite { resident: HashSet<u64> },
    DirectMapped { lines: Vec<CacheEntry> },
    SetAssociative { sets: Vec<Vec<CacheEntry>> },
}

/// One level of the cache hierarchy. Owns its geometry, replacement state, and a
/// read-only handle to the shared [`Clock`](crate::clock::Clock).
pub struct Cache {
    config: CacheConfig,
    clock: ClockHandle,
    variant: Variant,
    hits: u64,
    misses: u64,
    evictions: u64,
    lifetimes: HashMap<u64, u64>,
}

impl Cache {
    pub fn new(config: CacheConfig, clock: ClockHandle) -> Result<Self> {
        let variant = match config.kind {
            CacheKind::Infinite => Variant::Infinite {
                resident: HashSet::new(),
            },
            CacheKind::DirectMapped => {
                config.geometry().validate()?;
                let num_lines = config.size / config.line_size as u64;
                Variant::DirectMapped {
                    lines: vec![CacheEntry::default(); num_lines as usize],
                }
            }
            CacheKind::SetAssociative => {
                config.geometry().validate()?;
                let num_sets = config.geometry().num_sets();
                Variant::SetAssociative {
                    sets: vec![vec![CacheEntry::default(); config.set_size as usize]; num_sets as usize],
                }
            }
        };

        debug!(
            "constructed {:?} cache: size={}, line_size={}, set_size={}",
            config.kind, config.size, config.line_size, config.set_size
        );

        Ok(Self {
            config,
            clock,
            variant,
            hits: 0,
            misses: 0,
            evictions: 0,
            lifetimes: HashMap::new(),
        })
    }

    pub fn kind(&self) -> CacheKind {
        self.config.kind
    }

    pub fn size(&self) -> u64 {
        self.config.size
    }

    pub fn line_size(&self) -> u32 {
        self.config.line_size
    }

    pub fn set_size(&self) -> u32 {
        self.config.set_size
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Histogram of cycles elapsed between a line's insertion and its eviction, over
    /// every eviction this level has ever performed.
    pub fn lifetime_histogram(&self) -> &HashMap<u64, u64> {
        &self.lifetimes
    }

    /// Cycles-since-load for every line currently resident. `InfiniteCache` never
    /// evicts, so asking for its lifetimes (a notion tied to eviction) is a logic
    /// error, not an empty histogram.
    pub fn current_lifetimes(&self) -> Result<HashMap<u64, u64>> {
        let now = self.clock.current_cycle();
        match &self.variant {
            Variant::Infinite { .. } => Err(SimulationError::UnsupportedOperation(
                "an InfiniteCache never evicts, so it has no lifetime histogram".into(),
            )),
            Variant::DirectMapped { lines } => Ok(Self::lifetimes_of(lines.iter(), now)),
            Variant::SetAssociative { sets } => {
                Ok(Self::lifetimes_of(sets.iter().flatten(), now))
            }
        }
    }

    fn lifetimes_of<'a>(
        entries: impl Iterator<Item = &'a CacheEntry>,
        now: u64,
    ) -> HashMap<u64, u64> {
        let mut histogram = HashMap::new();
        for entry in entries.filter(|e| e.valid) {
            *histogram.entry(now - entry.loaded_at).or_insert(0) += 1;
        }
        histogram
    }

    /// Touches the single cache line containing `address`, dispatching to the
    /// variant-specific replacement policy. This is the hot inner-loop primitive
    /// every other `touch_*` method is built from.
    pub fn touch_line(&mut self, address: u64) -> CacheEvents {
        let now = self.clock.current_cycle();
        let block_bits = self.config.line_size.trailing_zeros();

        let (events, evicted_loaded_at) = match &mut self.variant {
            Variant::Infinite { resident } => {
                let line_index = address >> block_bits;
                if resident.insert(line_index) {
                    (CacheEvents::miss(), None)
                } else {
                    (CacheEvents::hit(), None)
                }
            }
            Variant::DirectMapped { lines } => {
                let decoded = address::decode(address, &self.config.geometry());
                let slot = &mut lines[decoded.index as usize];
                if slot.valid && slot.tag == decoded.tag {
                    (CacheEvents::hit(), None)
                } else {
                    let evicted = slot.valid.then_some(slot.loaded_at);
                    slot.set(decoded.tag, now);
                    let events = if evicted.is_some() {
                        CacheEvents::miss().with_eviction()
                    } else {
                        CacheEvents::miss()
                    };
                    (events, evicted)
                }
            }
            Variant::SetAssociative { sets } => {
                let decoded = address::decode(address, &self.config.geometry());
                let set = &mut sets[decoded.index as usize];

                let mut hit = false;
                let mut victim = 0usize;
                let mut max_age = set[0].age;
                for (i, line) in set.iter_mut().enumerate() {
                    line.age += 1;
                    if line.valid && line.tag == decoded.tag {
                        hit = true;
                    }
                    if line.age > max_age {
                        max_age = line.age;
                        victim = i;
                    }
                }

                if hit {
                    (CacheEvents::hit(), None)
                } else {
                    let slot = &mut set[victim];
                    let evicted = slot.valid.then_some(slot.loaded_at);
                    slot.set(decoded.tag, now);
                    let events = if evicted.is_some() {
                        CacheEvents::miss().with_eviction()
                    } else {
                        CacheEvents::miss()
                    };
                    (events, evicted)
                }
            }
        };

        self.hits += events.hits;
        self.misses += events.misses;
        self.evictions += events.evictions;
        if let Some(loaded_at) = evicted_loaded_at {
            *self.lifetimes.entry(now - loaded_at).or_insert(0) += 1;
        }

        events
    }

    /// Splits a multi-byte access into per-line probes and sums their events.
    pub fn touch(&mut self, address: u64, size: u32) -> CacheEvents {
        let line_size = self.config.line_size as u64;
        let mut remaining = size as u64;
        let mut cursor = address;
        let mut total = CacheEvents::default();

        while remaining > 0 {
            let block = cursor & (line_size - 1);
            total.merge(self.touch_line(cursor));
            let covered = line_size - block;
            remaining = remaining.saturating_sub(covered);
            cursor += covered;
        }

        total
    }

    pub fn touch_sized(&mut self, access: SizedAccess) -> CacheEvents {
        self.touch(access.address, access.size)
    }

    pub fn touch_request(&mut self, request: &MemoryRequest) -> CacheEvents {
        self.touch(request.address, request.size as u32)
    }

    pub fn touch_many_addresses(&mut self, addresses: &[u64], size: u32) -> CacheEvents {
        let mut total = CacheEvents::default();
        for &address in addresses {
            total.merge(self.touch(address, size));
        }
        total
    }

    pub fn touch_many_sized(&mut self, accesses: &[SizedAccess]) -> CacheEvents {
        let mut total = CacheEvents::default();
        for access in accesses {
            total.merge(self.touch_sized(*access));
        }
        total
    }

    pub fn touch_many_requests(&mut self, requests: &[MemoryRequest]) -> CacheEvents {
        let mut total = CacheEvents::default();
        for request in requests {
            total.merge(self.touch_request(request));
        }
        total
    }
}
