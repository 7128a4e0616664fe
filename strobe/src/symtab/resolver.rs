//! Symbol name resolution capability
//!
//! Which table answers for a binary (native symtab, Go runtime table, or
//! both) is decided once when the binary is loaded; afterwards everything
//! goes through this one trait.

use super::elf::SymbolTable;
use super::gosym::GoTable;

/// Resolves a file-relative address to a symbol name.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, addr: u64) -> Option<String>;
}

/// Resolver for binaries carrying both a Go runtime table and a native
/// symbol table: the Go table wins, the symtab fills its gaps (cgo,
/// linked-in C code).
pub struct GoTableWithFallback {
    pub go: GoTable,
    pub sym: SymbolTable,
}

impl SymbolResolver for GoTableWithFallback {
    fn resolve(&self, addr: u64) -> Option<String> {
        self.go.resolve(addr).or_else(|| self.sym.resolve(addr))
    }
}
