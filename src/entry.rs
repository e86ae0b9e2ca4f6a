//! Per-line metadata and per-access event tallies shared by every cache variant.

/// One resident (or not-yet-filled) cache line slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheEntry {
    pub tag: u64,
    pub valid: bool,
    /// Meaningful only for set-associative variants: ticks on every probe of its set.
    pub age: u64,
    /// Meaningful only when `valid` is true.
    pub loaded_at: u64,
}

impl CacheEntry {
    /// Installs a freshly-fetched line: sets tag/loaded_at, marks valid, resets age.
    pub fn set(&mut self, tag: u64, loaded_at: u64) {
        self.tag = tag;
        self.loaded_at = loaded_at;
        self.valid = true;
        self.age = 0;
    }
}

/// Additive counters produced by a single line-level probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheEvents {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheEvents {
    pub fn hit() -> Self {
        Self {
            hits: 1,
            ..Default::default()
        }
    }

    pub fn miss() -> Self {
        Self {
            misses: 1,
            ..Default::default()
        }
    }

    pub fn with_eviction(mut self) -> Self {
        self.evictions += 1;
        self
    }

    /// A single probe is a hit exactly when it recorded no misses.
    pub fn is_hit(&self) -> bool {
        self.misses == 0
    }

    pub fn merge(&mut self, other: CacheEvents) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
    }
}
