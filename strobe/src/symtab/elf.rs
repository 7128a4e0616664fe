//! Memory-mapped ELF binaries and their native symbol tables
//!
//! [`ElfFile`] is a read-only mapped view over one binary on disk. It stays
//! open only while a symbol table is being built; the extracted
//! [`SymbolTable`] owns plain data and outlives the mapping.

use memmap2::Mmap;
use object::{Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};
use rustc_demangle::demangle;
use std::fs::File;
use std::path::{Path, PathBuf};

use super::gosym::GoTable;
use super::resolver::SymbolResolver;
use crate::domain::SymbolError;

/// GNU build-id note contents: stable across copies of one compiled
/// artifact, the primary cache key for symbol tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildId(pub Vec<u8>);

impl BuildId {
    /// Lowercase hex rendering, as used by the debug-file directory layout.
    #[must_use]
    pub fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// An executable `PT_LOAD` program header, as needed for load-base
/// computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    pub vaddr: u64,
    pub file_offset: u64,
}

/// Memory-mapped view over one ELF binary.
pub struct ElfFile {
    path: PathBuf,
    mmap: Mmap,
}

impl ElfFile {
    /// Map the file read-only.
    ///
    /// # Errors
    /// Fails when the file cannot be opened or mapped.
    pub fn open(path: &Path) -> Result<Self, SymbolError> {
        let file = File::open(path)?;
        // SAFETY: read-only private mapping of a regular file; a concurrent
        // truncate would fault, which is the accepted mmap contract here.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            path: path.to_owned(),
            mmap,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn object(&self) -> Result<object::File<'_>, SymbolError> {
        Ok(object::File::parse(&*self.mmap)?)
    }

    /// True for fixed-address (ET_EXEC) binaries, which load at their link
    /// address and need no base adjustment.
    ///
    /// # Errors
    /// Fails when the ELF header cannot be parsed.
    pub fn is_fixed_address_executable(&self) -> Result<bool, SymbolError> {
        Ok(self.object()?.kind() == object::ObjectKind::Executable)
    }

    /// Executable `PT_LOAD` segments, for matching against a process
    /// mapping's file offset.
    ///
    /// # Errors
    /// Fails when the program headers cannot be parsed.
    pub fn executable_load_segments(&self) -> Result<Vec<LoadSegment>, SymbolError> {
        let obj = self.object()?;
        let mut segments = Vec::new();
        for segment in obj.segments() {
            let object::SegmentFlags::Elf { p_flags } = segment.flags() else {
                continue;
            };
            if p_flags & object::elf::PF_X == 0 {
                continue;
            }
            let (file_offset, _) = segment.file_range();
            segments.push(LoadSegment {
                vaddr: segment.address(),
                file_offset,
            });
        }
        Ok(segments)
    }

    /// The GNU build-id note, if the binary carries one.
    ///
    /// # Errors
    /// Fails on a malformed note section.
    pub fn build_id(&self) -> Result<Option<BuildId>, SymbolError> {
        Ok(self.object()?.build_id()?.map(|id| BuildId(id.to_vec())))
    }

    /// The `.gnu_debuglink` file name, if present. The embedded CRC is
    /// intentionally ignored; existence of a candidate decides.
    ///
    /// # Errors
    /// Fails on a malformed section.
    pub fn gnu_debuglink(&self) -> Result<Option<String>, SymbolError> {
        Ok(self
            .object()?
            .gnu_debuglink()?
            .map(|(name, _crc)| String::from_utf8_lossy(name).into_owned()))
    }

    /// Build the native symbol table from `.symtab` and `.dynsym`.
    ///
    /// # Errors
    /// Fails when parsing fails or no text symbols exist at all.
    pub fn symbol_table(&self) -> Result<SymbolTable, SymbolError> {
        let obj = self.object()?;
        let mut entries = Vec::new();
        for symbol in obj.symbols().chain(obj.dynamic_symbols()) {
            if symbol.is_undefined() || symbol.kind() != SymbolKind::Text {
                continue;
            }
            if symbol.address() == 0 {
                continue;
            }
            let Ok(name) = symbol.name() else { continue };
            if name.is_empty() {
                continue;
            }
            entries.push(SymEntry {
                addr: symbol.address(),
                size: symbol.size(),
                name: name.to_string(),
            });
        }
        if entries.is_empty() {
            return Err(SymbolError::NoSymbols);
        }
        entries.sort_by_key(|entry| entry.addr);
        entries.dedup_by_key(|entry| entry.addr);
        Ok(SymbolTable { entries })
    }

    /// Build the Go runtime function table from `.gopclntab`.
    ///
    /// # Errors
    /// Fails when the section is absent or its layout is not understood.
    pub fn go_table(&self) -> Result<GoTable, SymbolError> {
        let obj = self.object()?;
        let section = obj
            .section_by_name(".gopclntab")
            .ok_or(SymbolError::NoGoTable)?;
        let data = section.uncompressed_data()?;
        GoTable::parse(&data)
    }
}

struct SymEntry {
    addr: u64,
    size: u64,
    name: String,
}

/// Sorted native symbol table extracted from one ELF file.
///
/// Resolution is nearest-symbol-below, bounded by the symbol size when the
/// producer recorded one. Names are demangled on resolve.
pub struct SymbolTable {
    entries: Vec<SymEntry>,
}

impl SymbolTable {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, addr: u64) -> Option<&SymEntry> {
        let idx = self.entries.partition_point(|entry| entry.addr <= addr);
        if idx == 0 {
            return None;
        }
        let entry = &self.entries[idx - 1];
        if entry.size > 0 && addr >= entry.addr + entry.size {
            return None;
        }
        Some(entry)
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, addr: u64) -> Option<String> {
        self.find(addr)
            .map(|entry| format!("{:#}", demangle(&entry.name)))
    }
}
