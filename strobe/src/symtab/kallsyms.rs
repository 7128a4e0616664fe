//! Kernel symbol table from /proc/kallsyms
//!
//! Kernel stacks carry addresses no ELF on disk can explain; the kernel
//! publishes its own text symbols instead. Resolution is nearest symbol at
//! or below the address. Unprivileged readers see zeroed addresses, which
//! leaves the table empty and every kernel frame unresolved.

use std::fs;
use std::io;

use super::resolver::SymbolResolver;

const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Sorted kernel text symbols.
pub struct KallsymsTable {
    syms: Vec<(u64, String)>,
}

impl KallsymsTable {
    /// Load the live kernel's symbols.
    ///
    /// # Errors
    /// Fails when `/proc/kallsyms` cannot be read.
    pub fn load() -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(KALLSYMS_PATH)?))
    }

    fn parse(content: &str) -> Self {
        let mut syms = Vec::new();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(addr), Some(kind), Some(name)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            // Text symbols only; weak ones included.
            if !matches!(kind, "T" | "t" | "W" | "w") {
                continue;
            }
            let Ok(addr) = u64::from_str_radix(addr, 16) else {
                continue;
            };
            if addr == 0 {
                continue;
            }
            syms.push((addr, name.to_string()));
        }
        syms.sort_by_key(|(addr, _)| *addr);
        Self { syms }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.syms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

impl SymbolResolver for KallsymsTable {
    fn resolve(&self, addr: u64) -> Option<String> {
        let idx = self.syms.partition_point(|(start, _)| *start <= addr);
        if idx == 0 {
            return None;
        }
        Some(self.syms[idx - 1].1.clone())
    }
}
