//! # Symbol Resolution and Address Translation
//!
//! Converts raw instruction pointers captured by the sampling object into
//! function names. The kernel hands back addresses like `0x55f3a2b4c780`;
//! this module turns them into `tokio::runtime::park::Inner::park` by
//! walking three layers, cheapest first:
//!
//! 1. **Process layer** ([`symbol_cache`]): which binary contains the
//!    address? `/proc/<pid>/maps` is snapshotted once per collection round
//!    and each executable file-backed mapping gets an [`ElfTable`].
//! 2. **Binary layer** ([`elf_table`]): translate the runtime address to a
//!    file-relative one (load base from the ELF type and program headers —
//!    PIE binaries land at randomized bases) and pick the symbol source:
//!    the binary itself or a separate debug file found via build-id or
//!    `.gnu_debuglink`.
//! 3. **Table layer** ([`elf`], [`gosym`], [`kallsyms`]): nearest-symbol
//!    lookup in the native symtab, the Go runtime's pclntab, or the
//!    kernel's kallsyms for kernel-space frames.
//!
//! Parsing is the expensive step, so built resolvers are shared process-
//! wide through the [`ElfCache`], keyed by build-id and by file identity —
//! fifty containers running the same image symbolize its libc once.
//!
//! Everything here degrades instead of failing: an unresolvable frame is
//! reported as `None` and shows up as "[unknown]" in profiles.

pub mod elf;
pub mod elf_cache;
pub mod elf_table;
pub mod gosym;
pub mod kallsyms;
pub mod lru;
pub mod proc_maps;
pub mod resolver;
pub mod symbol_cache;

pub use elf::{BuildId, ElfFile, SymbolTable};
pub use elf_cache::{ElfCache, FileStat};
pub use elf_table::ElfTable;
pub use gosym::GoTable;
pub use kallsyms::KallsymsTable;
pub use proc_maps::{read_process_maps, ProcessMemoryMap};
pub use resolver::SymbolResolver;
pub use symbol_cache::SymbolCache;
