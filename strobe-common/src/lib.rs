//! # Shared Definitions (sampling object ↔ userspace)
//!
//! The kernel side of strobe is a precompiled eBPF object loaded at runtime.
//! Userspace addresses its maps and program strictly by name and exchanges
//! `#[repr(C)]` records with it, so both halves of the contract live here.
//!
//! The sampling object exposes:
//!
//! - `counts`: hash map of [`SampleKey`] → `u32` sample count, aggregated
//!   in-kernel across perf-event fires.
//! - `stacks`: hash map of stack id (`u32`) → [`RawStack`], the raw captured
//!   instruction pointers.
//! - `args`: single-slot array map holding [`ProfileArgs`].
//! - `do_perf_event`: the perf-event program attached once per online CPU.

#![no_std]

/// Maximum number of stack frames captured per stack.
///
/// Kernel eBPF programs are limited to 127 frames due to verifier
/// constraints; the stack arrays are zero-terminated below that.
pub const MAX_STACK_DEPTH: usize = 127;

/// Length of the kernel task command name, including the NUL terminator.
pub const COMM_LEN: usize = 16;

/// Name of the sample-count aggregation map.
pub const COUNTS_MAP: &str = "counts";

/// Name of the stack id → raw address array map.
pub const STACKS_MAP: &str = "stacks";

/// Name of the single-slot argument map.
pub const ARGS_MAP: &str = "args";

/// Name of the perf-event program inside the sampling object.
pub const PERF_PROGRAM: &str = "do_perf_event";

/// Raw captured stack: up to [`MAX_STACK_DEPTH`] little-endian instruction
/// pointers, terminated early by a zero entry.
pub type RawStack = [u64; MAX_STACK_DEPTH];

/// Key of one aggregated sample in the `counts` map.
///
/// Written only by the sampling object; userspace treats it as read-only.
/// A negative stack id means the corresponding stack was not captured.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleKey {
    /// Process id (TGID) of the sampled task.
    pub pid: u32,
    /// Explicit padding so the i64 fields stay 8-byte aligned.
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
    /// Kernel stack id into the `stacks` map, or negative if absent.
    pub kern_stack: i64,
    /// User stack id into the `stacks` map, or negative if absent.
    pub user_stack: i64,
    /// Task command name, NUL-terminated.
    pub comm: [u8; COMM_LEN],
}

impl SampleKey {
    /// The command name up to the first NUL byte.
    #[must_use]
    pub fn comm_str(&self) -> &str {
        let len = self.comm.iter().position(|b| *b == 0).unwrap_or(COMM_LEN);
        core::str::from_utf8(&self.comm[..len]).unwrap_or("")
    }
}

/// Arguments written into the `args` map before attachment.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfileArgs {
    /// Only sample tasks of this TGID; 0 samples every task.
    pub tgid_filter: u32,
}

#[cfg(feature = "user")]
use aya::Pod;

// These unsafe impls are required for eBPF <-> userspace communication
// Pod trait ensures types can be safely transmitted as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SampleKey {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ProfileArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comm_str_stops_at_nul() {
        let mut key = SampleKey {
            pid: 1,
            _padding: 0,
            kern_stack: -1,
            user_stack: -1,
            comm: [0; COMM_LEN],
        };
        key.comm[..4].copy_from_slice(b"curl");
        assert_eq!(key.comm_str(), "curl");
    }

    #[test]
    fn test_comm_str_full_width() {
        let key = SampleKey {
            pid: 1,
            _padding: 0,
            kern_stack: 0,
            user_stack: 0,
            comm: *b"sixteen-byte-cmd",
        };
        assert_eq!(key.comm_str(), "sixteen-byte-cmd");
    }
}
