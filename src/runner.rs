//! The in-scope half of "Runner & output": drive one or many configurations against
//! a trace and hand back structured results. Rendering those results as CSV/text
//! reports, parsing CLI arguments, and expanding batch files are out of scope here.

use std::collections::HashMap;

use log::info;

use crate::cache::CacheConfig;
use crate::config::Config;
use crate::error::Result;
use crate::hierarchy::{BundleStats, CacheHierarchy};
use crate::trace::MemoryTrace;

/// Per-level snapshot of a completed run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelResult {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub traffic_in: u64,
    pub lifetimes: HashMap<u64, u64>,
}

/// The structured output of driving one `CacheHierarchy` across one `MemoryTrace` to
/// completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunResult {
    pub final_cycle: u64,
    pub traffic_requested: u64,
    pub levels: Vec<LevelResult>,
    pub bundles: HashMap<u64, BundleStats>,
}

/// Builds a hierarchy from `config`, replays every request in `trace`, and returns
/// the structured result. This is the sequential core every fan-out path calls.
pub fn run_one(config: Config, trace: &MemoryTrace) -> Result<RunResult> {
    let nlevels = config.levels.len();
    let mut hierarchy = CacheHierarchy::from_config(config)?;
    hierarchy.touch_many_requests(trace.requests());

    let levels = (1..=nlevels)
        .map(|level| LevelResult {
            hits: hierarchy.hits(level),
            misses: hierarchy.misses(level),
            evictions: hierarchy.evictions(level),
            traffic_in: hierarchy.traffic(level),
            lifetimes: hierarchy.lifetimes(level).clone(),
        })
        .collect();

    info!(
        "run complete: {} levels, {} cycles, {} requests",
        nlevels,
        hierarchy.current_cycle(),
        trace.len()
    );

    Ok(RunResult {
        final_cycle: hierarchy.current_cycle(),
        traffic_requested: hierarchy.traffic(0),
        levels,
        bundles: hierarchy.bundles().clone(),
    })
}

/// Drives every config in `configs` against the (read-only, shared) `trace`, one
/// scoped OS thread per configuration, and collects results aligned to input order.
/// Mirrors the fork-join shape of the parallel trace reader: independent work items,
/// no shared mutable state, join before returning.
pub fn run_many(configs: Vec<Config>, trace: &MemoryTrace) -> Vec<Result<RunResult>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = configs
            .into_iter()
            .map(|config| scope.spawn(move || run_one(config, trace)))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("hierarchy run thread panicked"))
            .collect()
    })
}

/// Convenience for a single flat geometry applied at every named level, without
/// going through the INI config parser.
pub fn run_levels(levels: Vec<CacheConfig>, trace: &MemoryTrace) -> Result<RunResult> {
    run_one(Config { levels }, trace)
}
