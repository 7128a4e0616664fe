//! Per-process symbolization state
//!
//! [`SymbolCache`] is the session's entry point into symbolization: it maps
//! (process, address, round) to a name. Each tracked process holds a
//! snapshot of its executable mappings plus one lazily-built [`ElfTable`]
//! per backing file. A process's memory map can change between rounds (new
//! libraries, remaps), so a snapshot is only trusted for the round it was
//! taken in; tables whose mapping record changed are rebuilt, not reused.
//!
//! The process set is LRU-bounded. Evicting a process drops its tables;
//! resolvers shared through the [`ElfCache`] survive for the other
//! processes still using them.

use log::warn;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::elf_cache::ElfCache;
use super::elf_table::ElfTable;
use super::kallsyms::KallsymsTable;
use super::lru::LruIndex;
use super::proc_maps::{self, ProcessMemoryMap};
use super::resolver::SymbolResolver;
use crate::domain::Pid;

#[derive(Default)]
struct ProcessEntry {
    maps: Vec<ProcessMemoryMap>,
    tables: HashMap<PathBuf, ElfTable>,
    /// Round the maps snapshot was taken in; 0 means never.
    round: u64,
}

impl ProcessEntry {
    /// Re-read the process's mappings and drop tables bound to mappings
    /// that no longer exist in this exact form.
    fn refresh(&mut self, pid: Pid) {
        let maps = match proc_maps::read_process_maps(pid) {
            Ok(maps) => maps,
            Err(err) => {
                // Process likely exited mid-round; its frames degrade to
                // unknown until it is evicted.
                warn!("no memory maps for {pid}: {err:#}");
                self.maps.clear();
                self.tables.clear();
                return;
            }
        };
        let maps: Vec<_> = maps
            .into_iter()
            .filter(ProcessMemoryMap::is_file_backed_executable)
            .collect();
        self.tables.retain(|path, table| {
            maps.iter()
                .any(|map| Path::new(&map.path) == path && table.matches(map))
        });
        self.maps = maps;
    }
}

/// Bounded per-process collection of symbol tables.
pub struct SymbolCache {
    processes: LruIndex<Pid, ProcessEntry>,
    elf_cache: ElfCache,
    kallsyms: Option<KallsymsTable>,
    kallsyms_loaded: bool,
}

impl SymbolCache {
    #[must_use]
    pub fn new(pid_cache_size: usize, elf_cache_size: usize) -> Self {
        Self {
            processes: LruIndex::new(pid_cache_size),
            elf_cache: ElfCache::new(elf_cache_size),
            kallsyms: None,
            kallsyms_loaded: false,
        }
    }

    /// Resolve one frame of one process for the given round.
    ///
    /// Pid 0 addresses kernel space. Any failure — unknown mapping, exited
    /// process, unparseable binary — is `None`, never an error.
    pub fn resolve(&mut self, pid: Pid, addr: u64, round: u64) -> Option<String> {
        if pid.0 == 0 {
            return self.resolve_kernel(addr);
        }

        let entry = self
            .processes
            .get_or_insert_with(pid, ProcessEntry::default);
        if entry.round != round {
            entry.refresh(pid);
            entry.round = round;
        }

        let map = entry.maps.iter().find(|map| map.contains(addr))?.clone();
        let table = entry
            .tables
            .entry(PathBuf::from(&map.path))
            .or_insert_with(|| {
                ElfTable::new(proc_maps::proc_root(pid), PathBuf::from(&map.path), map.clone())
            });
        table.resolve(addr, &mut self.elf_cache)
    }

    fn resolve_kernel(&mut self, addr: u64) -> Option<String> {
        if !self.kallsyms_loaded {
            self.kallsyms_loaded = true;
            match KallsymsTable::load() {
                Ok(table) => self.kallsyms = Some(table),
                Err(err) => warn!("kernel symbols unavailable: {err}"),
            }
        }
        self.kallsyms.as_ref()?.resolve(addr)
    }

    /// Number of processes currently tracked.
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.processes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_count_is_bounded() {
        let mut cache = SymbolCache::new(2, 4);
        // Pids far outside anything alive: each resolve tracks the process
        // (with an empty snapshot) and must respect the LRU bound.
        for pid in 3_000_000..3_000_005u32 {
            assert_eq!(cache.resolve(Pid(pid), 0x1000, 1), None);
        }
        assert_eq!(cache.process_count(), 2);
    }

    #[test]
    fn test_resolve_own_process_smoke() {
        // Resolving an address inside our own text segment exercises the
        // whole maps → table → resolver path. Symbol presence depends on
        // the build environment, so only the address-to-mapping step is
        // asserted strictly.
        let mut cache = SymbolCache::new(4, 4);
        let pid = Pid(std::process::id());
        let addr = test_resolve_own_process_smoke as usize as u64;
        let name = cache.resolve(pid, addr, 1);
        if let Some(name) = name {
            assert!(!name.is_empty());
        }
        assert_eq!(cache.process_count(), 1);
    }

    #[test]
    fn test_unmapped_address_is_none() {
        let mut cache = SymbolCache::new(4, 4);
        let pid = Pid(std::process::id());
        assert_eq!(cache.resolve(pid, 0x1, 1), None);
    }
}
