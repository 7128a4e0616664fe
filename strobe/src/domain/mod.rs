//! Domain model for strobe
//!
//! Core newtypes and structured errors. The newtype wrappers keep process
//! ids, CPU ids and kernel stack ids from being mixed up in signatures.

pub mod errors;
pub mod types;

pub use types::{CpuId, Pid, StackId};

pub use errors::{ProfilerError, SymbolError};
