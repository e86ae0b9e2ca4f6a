//! A small, purpose-built scanner for the INI-style fields this crate recognizes.
//! Not a general-purpose INI library — only `[section]` headers, `key = value`
//! lines, and the fixed set of cache-level keys below are understood.

use std::collections::HashMap;
use std::io::BufRead;

use crate::cache::{CacheConfig, CacheKind};
use crate::error::{Result, SimulationError};

const SECTION_HIERARCHY: &str = "hierarchy";
const KEY_LEVELS: &str = "levels";

/// A fully-resolved cache hierarchy configuration: one [`CacheConfig`] per level,
/// level 1 first.
#[derive(Clone, Debug)]
pub struct Config {
    pub levels: Vec<CacheConfig>,
}

type SectionMap = HashMap<String, HashMap<String, String>>;

/// Scans `key = value` lines grouped under `[section]` headers. Lines outside any
/// section are grouped under the empty-string section, matching the "default
/// section" behavior a single-level config relies on.
fn scan_sections(reader: impl BufRead) -> Result<SectionMap> {
    let mut sections: SectionMap = HashMap::new();
    let mut current = String::new();
    sections.entry(current.clone()).or_default();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_lowercase();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    Ok(sections)
}

fn normalize_type(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !c.is_ascii_punctuation())
        .collect::<String>()
        .to_lowercase()
}

fn parse_kind(raw: &str) -> Result<CacheKind> {
    match normalize_type(raw).as_str() {
        "infinite" => Ok(CacheKind::Infinite),
        "directmapped" => Ok(CacheKind::DirectMapped),
        "setassociative" => Ok(CacheKind::SetAssociative),
        other => Err(SimulationError::InvalidConfig(format!(
            "unknown cache type {other:?}"
        ))),
    }
}

fn parse_level(level: &HashMap<String, String>) -> Result<CacheConfig> {
    let get = |key: &str| -> Result<&String> {
        level
            .get(key)
            .ok_or_else(|| SimulationError::InvalidConfig(format!("missing key {key:?}")))
    };

    let kind = parse_kind(get("type")?)?;
    let size: u64 = get("cache_size")?.parse()?;
    let line_size: u32 = get("line_size")?.parse()?;
    let set_size: u32 = match level.get("set_size") {
        Some(raw) => raw.parse()?,
        None => 1,
    };

    Ok(CacheConfig {
        kind,
        size,
        line_size,
        set_size,
    })
}

/// Parses a `Config` from an INI-style reader. Accepts either the multi-level form
/// (`[hierarchy] levels = N` plus one `[L1]`..`[LN]` section each) or a single
/// implicit/unnamed section describing one level.
pub fn parse(reader: impl BufRead) -> Result<Config> {
    let sections = scan_sections(reader)?;

    if let Some(hierarchy) = sections.get(SECTION_HIERARCHY) {
        let nlevels: usize = hierarchy
            .get(KEY_LEVELS)
            .ok_or_else(|| SimulationError::InvalidConfig("missing [hierarchy] levels".into()))?
            .parse()
            .map_err(|_| SimulationError::InvalidConfig("levels is not an integer".into()))?;
        if nlevels == 0 {
            return Err(SimulationError::InvalidConfig(
                "levels must be a positive integer".into(),
            ));
        }

        let mut levels = Vec::with_capacity(nlevels);
        let mut line_sizes = Vec::with_capacity(nlevels);
        for k in 1..=nlevels {
            let section_name = format!("l{k}");
            let section = sections.get(&section_name).ok_or_else(|| {
                SimulationError::InvalidConfig(format!(
                    "hierarchy of {nlevels} levels does not define level {k}"
                ))
            })?;
            let level = parse_level(section)?;
            line_sizes.push(level.line_size);
            levels.push(level);
        }

        if line_sizes.iter().any(|&ls| ls != line_sizes[0]) {
            return Err(SimulationError::InvalidConfig(
                "cache hierarchy does not have the same line size throughout".into(),
            ));
        }

        return Ok(Config { levels });
    }

    // Single-level form: either the unnamed default section, or if there's exactly
    // one named, non-hierarchy section, use that.
    let single = sections
        .get("")
        .filter(|s| !s.is_empty())
        .or_else(|| sections.values().find(|s| !s.is_empty()))
        .ok_or_else(|| {
            SimulationError::InvalidConfig("no [hierarchy] section and no level defined".into())
        })?;

    Ok(Config {
        levels: vec![parse_level(single)?],
    })
}
