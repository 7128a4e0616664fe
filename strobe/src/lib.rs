//! # strobe - eBPF CPU-Profiling Core
//!
//! strobe is the native CPU-profiling engine of a telemetry agent. A
//! precompiled eBPF sampling object fires on per-CPU perf events and
//! aggregates (process, stack ids) → count in kernel maps; this crate owns
//! everything on the userspace side of that boundary.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Kernel (sampling object)               │
//! │   perf events ──▶ do_perf_event ──▶ counts / stacks maps │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │ one drain per collection round
//!                         ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                    strobe (this crate)                   │
//! │                                                          │
//! │  ┌─────────┐    ┌─────────────┐    ┌─────────────────┐  │
//! │  │ Session │───▶│ SymbolCache │───▶│ ElfTable / Elf  │  │
//! │  │ (rounds)│    │  (per pid)  │    │ Cache (shared)  │  │
//! │  └────┬────┘    └─────────────┘    └─────────────────┘  │
//! │       │ labels via TargetFinder                          │
//! │       ▼                                                  │
//! │   sink(labels, frames, count, pid)                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`session`]: session lifecycle (load object, per-CPU perf attach),
//!   collection rounds, stack walking and frame ordering
//! - [`symtab`]: symbolization — `/proc` maps, ELF and Go symbol tables,
//!   debug-file discovery, and the two-level caching that makes repeated
//!   symbolization affordable
//! - [`discovery`]: the target-discovery boundary (pid → label set)
//! - [`domain`]: core newtypes and error enums
//! - [`cli`]: argument parsing for the demo binary

pub mod cli;
pub mod discovery;
pub mod domain;
pub mod session;
pub mod symtab;
