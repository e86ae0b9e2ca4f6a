//! Demo run: replays a small synthetic trace through a two-level hierarchy and
//! prints per-level hit/miss/traffic stats. Exit-code mapping is left here (rather
//! than in the library) since a real CLI front-end is out of scope for this crate.

use cachesim::{
    run_one, CacheConfig, CacheKind, Config, MemoryRequest, MemoryTrace, SimulationError,
};

const EXIT_INVALID_CONFIG: i32 = 2;
const EXIT_INVALID_TRACE: i32 = 3;
const EXIT_CACHE_GEOMETRY: i32 = 4;
const EXIT_UNSUPPORTED: i32 = 5;

fn synthetic_trace() -> MemoryTrace {
    let mut requests = Vec::new();
    for i in 0..256u64 {
        let reuse_every = 8;
        let address = (i % reuse_every) * 64;
        requests.push(MemoryRequest::new(0, 8, 0, i % 5 == 0, address, 0x4000 + i));
    }
    MemoryTrace::from_requests(requests)
}

fn demo_config() -> Config {
    Config {
        levels: vec![
            CacheConfig {
                kind: CacheKind::SetAssociative,
                size: 32 * 1024,
                line_size: 64,
                set_size: 4,
            },
            CacheConfig {
                kind: CacheKind::DirectMapped,
                size: 256 * 1024,
                line_size: 64,
                set_size: 1,
            },
        ],
    }
}

fn main() {
    env_logger::init();

    let trace = synthetic_trace();
    let config = demo_config();

    match run_one(config, &trace) {
        Ok(result) => {
            println!("=== Cache Hierarchy Simulation ===\n");
            println!("cycles: {}", result.final_cycle);
            println!("traffic(cpu->L1): {} bytes", result.traffic_requested);
            for (i, level) in result.levels.iter().enumerate() {
                let level_no = i + 1;
                println!(
                    "L{level_no}: hits={} misses={} evictions={} traffic_in={}",
                    level.hits, level.misses, level.evictions, level.traffic_in
                );
            }
            if !result.bundles.is_empty() {
                println!("\nbundles:");
                for (pc, stats) in &result.bundles {
                    println!(
                        "  pc={pc:#x}: times_encountered={} total_ops={}",
                        stats.times_encountered, stats.total_ops
                    );
                }
            }
        }
        Err(err) => {
            eprintln!("simulation failed: {err}");
            std::process::exit(match err {
                SimulationError::InvalidCacheGeometry(_) => EXIT_CACHE_GEOMETRY,
                SimulationError::InvalidConfig(_) | SimulationError::ParseInt(_) => {
                    EXIT_INVALID_CONFIG
                }
                SimulationError::InvalidTrace(_) | SimulationError::Io(_) => EXIT_INVALID_TRACE,
                SimulationError::UnsupportedOperation(_) => EXIT_UNSUPPORTED,
            });
        }
    }
}
