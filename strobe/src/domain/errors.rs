//! Structured error types for strobe
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Map {0} not found in sampling object")]
    MapNotFound(&'static str),

    #[error("Program {0} not found in sampling object")]
    ProgramNotFound(&'static str),

    #[error("Session is not started")]
    NotStarted,
}

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("elf load base not found")]
    ElfBaseNotFound,

    #[error("no symbols in ELF file")]
    NoSymbols,

    #[error("no .gopclntab section")]
    NoGoTable,

    #[error("unsupported .gopclntab magic: {0:#x}")]
    UnsupportedGoMagic(u32),

    #[error("malformed .gopclntab: {0}")]
    MalformedGoTable(&'static str),

    #[error("no symbol table: sym: {sym}; go: {go}")]
    NoTables {
        sym: Box<SymbolError>,
        go: Box<SymbolError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] object::read::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_error_display() {
        let err = ProfilerError::MapNotFound("counts");
        assert_eq!(err.to_string(), "Map counts not found in sampling object");
    }

    #[test]
    fn test_symbol_error_display() {
        let err = SymbolError::UnsupportedGoMagic(0xdead_beef);
        assert!(err.to_string().contains("0xdeadbeef"));

        let err = SymbolError::NoTables {
            sym: Box::new(SymbolError::NoSymbols),
            go: Box::new(SymbolError::NoGoTable),
        };
        assert!(err.to_string().contains("no symbols"));
        assert!(err.to_string().contains(".gopclntab"));
    }
}
