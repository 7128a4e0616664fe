//! CPU utility functions
//!
//! Utilities for querying CPU information from /sys filesystem.

use anyhow::{Context, Result};
use std::fs;

use crate::domain::CpuId;

const ONLINE_CPUS_PATH: &str = "/sys/devices/system/cpu/online";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// Returns a vector of CPU IDs (e.g., [0, 1, 2, 3] for a 4-core system).
/// The format in /sys is like "0-3" or "0-3,8-11" for NUMA systems.
///
/// # Errors
/// Returns an error if the online file cannot be read or parsed.
pub fn online_cpus() -> Result<Vec<CpuId>> {
    let content = fs::read_to_string(ONLINE_CPUS_PATH)
        .with_context(|| format!("Failed to read {ONLINE_CPUS_PATH}"))?;
    parse_cpu_list(content.trim())
}

fn parse_cpu_list(list: &str) -> Result<Vec<CpuId>> {
    let mut cpus = Vec::new();

    for range in list.split(',') {
        if let Some((start, end)) = range.split_once('-') {
            // Range like "0-3"
            let start: u32 = start.parse().context("parse cpu range start")?;
            let end: u32 = end.parse().context("parse cpu range end")?;
            for cpu in start..=end {
                cpus.push(CpuId(cpu));
            }
        } else {
            // Single CPU like "5"
            let cpu: u32 = range.parse().context("parse cpu id")?;
            cpus.push(CpuId(cpu));
        }
    }

    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_range() {
        let cpus = parse_cpu_list("0-3").unwrap();
        assert_eq!(cpus, vec![CpuId(0), CpuId(1), CpuId(2), CpuId(3)]);
    }

    #[test]
    fn test_parse_numa_ranges() {
        let cpus = parse_cpu_list("0-1,8-9").unwrap();
        assert_eq!(cpus, vec![CpuId(0), CpuId(1), CpuId(8), CpuId(9)]);
    }

    #[test]
    fn test_parse_single_cpu() {
        let cpus = parse_cpu_list("5").unwrap();
        assert_eq!(cpus, vec![CpuId(5)]);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_cpu_list("zero").is_err());
        assert!(parse_cpu_list("").is_err());
    }

    #[test]
    fn test_online_cpus() {
        // Relies on /sys being available (Linux only)
        let result = online_cpus();

        #[cfg(target_os = "linux")]
        {
            let cpus = result.unwrap();
            assert!(!cpus.is_empty(), "Should have at least one CPU");
            assert!(cpus.contains(&CpuId(0)));
        }

        #[cfg(not(target_os = "linux"))]
        assert!(result.is_err());
    }
}
