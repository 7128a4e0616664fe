//! Memory mapping records for process address space analysis
//!
//! Parses `/proc/<pid>/maps` into [`ProcessMemoryMap`] records so raw
//! instruction pointers can be attributed to the mapped binary that contains
//! them. File access for a process goes through `/proc/<pid>/root` so
//! binaries inside containers resolve to the files the process actually
//! mapped.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::domain::Pid;

/// Permissions column of one maps record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapPerms {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub private: bool,
}

/// A single mapped-region record for a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessMemoryMap {
    /// First address of the mapping.
    pub start: u64,
    /// One past the last address of the mapping.
    pub end: u64,
    pub perms: MapPerms,
    /// Offset into the backing file where the mapping starts.
    pub file_offset: u64,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub inode: u64,
    /// Backing file path as the process sees it; empty for anonymous
    /// mappings, bracketed for pseudo entries like `[vdso]`.
    pub path: String,
}

impl ProcessMemoryMap {
    /// Check if an address falls within this mapping
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// True for mappings worth symbolizing: executable and backed by a
    /// real file.
    #[must_use]
    pub fn is_file_backed_executable(&self) -> bool {
        self.perms.executable && self.inode != 0 && self.path.starts_with('/')
    }
}

/// Root directory through which a process's files are reached.
///
/// Opening mapped binaries under this prefix makes container paths resolve
/// against the mount namespace of the process itself.
#[must_use]
pub fn proc_root(pid: Pid) -> PathBuf {
    PathBuf::from(format!("/proc/{}/root", pid.0))
}

/// Read and parse the memory map of one process.
///
/// # Errors
/// Returns an error when `/proc/<pid>/maps` cannot be read, typically
/// because the process exited; callers treat that as "no symbolization for
/// this process this round".
pub fn read_process_maps(pid: Pid) -> Result<Vec<ProcessMemoryMap>> {
    let maps_path = format!("/proc/{}/maps", pid.0);
    let content =
        fs::read_to_string(&maps_path).with_context(|| format!("Failed to read {maps_path}"))?;
    Ok(parse_maps(&content))
}

fn parse_maps(content: &str) -> Vec<ProcessMemoryMap> {
    content.lines().filter_map(parse_maps_line).collect()
}

/// Parse one line: `start-end perms offset dev inode pathname`.
fn parse_maps_line(line: &str) -> Option<ProcessMemoryMap> {
    let mut parts = line.split_whitespace();

    let range = parts.next()?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    let perms = parse_perms(parts.next()?);
    let file_offset = u64::from_str_radix(parts.next()?, 16).ok()?;

    let dev = parts.next()?;
    let (dev_major, dev_minor) = dev.split_once(':')?;
    let dev_major = u32::from_str_radix(dev_major, 16).ok()?;
    let dev_minor = u32::from_str_radix(dev_minor, 16).ok()?;

    let inode = parts.next()?.parse().ok()?;
    let path = parts.next().unwrap_or("").to_string();

    Some(ProcessMemoryMap {
        start,
        end,
        perms,
        file_offset,
        dev_major,
        dev_minor,
        inode,
        path,
    })
}

fn parse_perms(perms: &str) -> MapPerms {
    let mut chars = perms.chars();
    let readable = chars.next() == Some('r');
    let writable = chars.next() == Some('w');
    let executable = chars.next() == Some('x');
    let private = chars.next() == Some('p');
    MapPerms {
        readable,
        writable,
        executable,
        private,
    }
}
