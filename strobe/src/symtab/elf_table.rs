//! Per-mapped-binary lazy symbolizer
//!
//! An [`ElfTable`] belongs to one executable mapping of one process. On
//! first use it computes the load base, consults the [`ElfCache`], hunts
//! for a separate debug-information file, and only then parses symbol
//! tables. Loading happens at most once: success and failure are both
//! terminal for the table's lifetime.

use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::elf::{BuildId, ElfFile, LoadSegment};
use super::elf_cache::{ElfCache, FileStat, SharedResolver};
use super::proc_maps::ProcessMemoryMap;
use super::resolver::GoTableWithFallback;
use crate::domain::SymbolError;

/// Fixed system directory indexed by build-id and mirrored by debug-link
/// lookups.
const GLOBAL_DEBUG_DIR: &str = "/usr/lib/debug";

enum TableState {
    Unloaded,
    Loaded(SharedResolver),
    Failed,
}

/// Lazily-loaded symbolizer for one mapped ELF binary.
pub struct ElfTable {
    /// Filesystem root the process's paths are resolved under
    /// (`/proc/<pid>/root`).
    fs_root: PathBuf,
    /// Mapping path as the process sees it.
    elf_path: PathBuf,
    proc_map: ProcessMemoryMap,
    base: u64,
    state: TableState,
}

impl ElfTable {
    #[must_use]
    pub fn new(fs_root: PathBuf, elf_path: PathBuf, proc_map: ProcessMemoryMap) -> Self {
        Self {
            fs_root,
            elf_path,
            proc_map,
            base: 0,
            state: TableState::Unloaded,
        }
    }

    /// Whether this table was built for exactly this mapping record.
    #[must_use]
    pub fn matches(&self, map: &ProcessMemoryMap) -> bool {
        self.proc_map == *map
    }

    /// Resolve an absolute program counter to a name.
    ///
    /// Triggers the one-shot load on first use; after a failed load every
    /// call reports `None` without retrying.
    pub fn resolve(&mut self, pc: u64, cache: &mut ElfCache) -> Option<String> {
        if matches!(self.state, TableState::Unloaded) {
            self.state = match self.load(cache) {
                Ok(resolver) => TableState::Loaded(resolver),
                Err(err) => {
                    debug!("symbol table load failed for {}: {err}", self.elf_path.display());
                    TableState::Failed
                }
            };
        }
        match &self.state {
            TableState::Loaded(resolver) => resolver.resolve(pc.wrapping_sub(self.base)),
            TableState::Unloaded | TableState::Failed => None,
        }
    }

    fn load(&mut self, cache: &mut ElfCache) -> Result<SharedResolver, SymbolError> {
        let fs_path = join_root(&self.fs_root, &self.elf_path);
        let elf = ElfFile::open(&fs_path)?;

        self.base = find_base(&elf, &self.proc_map)?;

        let build_id = elf.build_id()?;
        if let Some(resolver) = cache.get_by_build_id(build_id.as_ref()) {
            return Ok(resolver);
        }
        let stat = FileStat::of(&fs_path)?;
        if let Some(resolver) = cache.get_by_stat(&stat) {
            return Ok(resolver);
        }

        if let Some((debug_path, debug_stat)) = self.find_debug_file(build_id.as_ref(), &elf) {
            if let Some(resolver) = cache.get_by_stat(&debug_stat) {
                return Ok(resolver);
            }
            let debug_elf = ElfFile::open(&join_root(&self.fs_root, &debug_path))?;
            let resolver = build_resolver(&debug_elf)?;
            cache.cache_by_build_id(build_id, &resolver);
            cache.cache_by_stat(debug_stat, &resolver);
            return Ok(resolver);
        }

        let resolver = build_resolver(&elf)?;
        cache.cache_by_build_id(build_id, &resolver);
        cache.cache_by_stat(stat, &resolver);
        Ok(resolver)
    }

    /// Locate a separate debug-information file: the build-id convention
    /// wins over the `.gnu_debuglink` candidates.
    fn find_debug_file(
        &self,
        build_id: Option<&BuildId>,
        elf: &ElfFile,
    ) -> Option<(PathBuf, FileStat)> {
        if let Some(found) = self.find_debug_file_with_build_id(build_id) {
            return Some(found);
        }
        self.find_debug_file_with_debug_link(elf)
    }

    fn find_debug_file_with_build_id(
        &self,
        build_id: Option<&BuildId>,
    ) -> Option<(PathBuf, FileStat)> {
        let id = build_id?.hex();
        let debug_file = build_id_debug_path(&id)?;
        let stat = FileStat::of(&join_root(&self.fs_root, &debug_file)).ok()?;
        Some((debug_file, stat))
    }

    fn find_debug_file_with_debug_link(&self, elf: &ElfFile) -> Option<(PathBuf, FileStat)> {
        let link = elf.gnu_debuglink().ok().flatten()?;
        for candidate in debug_link_candidates(&self.elf_path, &link) {
            if let Ok(stat) = FileStat::of(&join_root(&self.fs_root, &candidate)) {
                return Some((candidate, stat));
            }
        }
        None
    }
}

/// `/usr/lib/debug/.build-id/ab/cdef...debug` for build-id `abcdef...`.
fn build_id_debug_path(id: &str) -> Option<PathBuf> {
    if id.len() < 3 {
        return None;
    }
    Some(PathBuf::from(format!(
        "{GLOBAL_DEBUG_DIR}/.build-id/{}/{}.debug",
        &id[..2],
        &id[2..]
    )))
}

/// The conventional `.gnu_debuglink` lookup locations, in order: next to
/// the binary, in its `.debug/` subdirectory, and in the global debug tree
/// mirroring the binary's directory.
fn debug_link_candidates(elf_path: &Path, link: &str) -> Vec<PathBuf> {
    let dir = elf_path.parent().unwrap_or_else(|| Path::new("/"));
    let mirrored = Path::new(GLOBAL_DEBUG_DIR).join(dir.strip_prefix("/").unwrap_or(dir));
    vec![
        dir.join(link),
        dir.join(".debug").join(link),
        mirrored.join(link),
    ]
}

/// Load base of a mapped binary: fixed-address executables load where they
/// were linked; otherwise the executable segment whose file offset matches
/// the mapping anchors the computation.
fn find_base(elf: &ElfFile, map: &ProcessMemoryMap) -> Result<u64, SymbolError> {
    if elf.is_fixed_address_executable()? {
        return Ok(0);
    }
    base_for_segments(&elf.executable_load_segments()?, map).ok_or(SymbolError::ElfBaseNotFound)
}

fn base_for_segments(segments: &[LoadSegment], map: &ProcessMemoryMap) -> Option<u64> {
    segments
        .iter()
        .find(|segment| segment.file_offset == map.file_offset)
        .map(|segment| map.start.wrapping_sub(segment.vaddr))
}

/// Try both table builders against the chosen file; combine when both
/// succeed, fail only when neither does.
fn build_resolver(elf: &ElfFile) -> Result<SharedResolver, SymbolError> {
    match (elf.go_table(), elf.symbol_table()) {
        (Ok(go), Ok(sym)) => Ok(Arc::new(GoTableWithFallback { go, sym })),
        (Ok(go), Err(_)) => Ok(Arc::new(go)),
        (Err(_), Ok(sym)) => Ok(Arc::new(sym)),
        (Err(go), Err(sym)) => Err(SymbolError::NoTables {
            sym: Box::new(sym),
            go: Box::new(go),
        }),
    }
}

fn join_root(root: &Path, path: &Path) -> PathBuf {
    root.join(path.strip_prefix("/").unwrap_or(path))
}
