//! Profiling session lifecycle and collection rounds
//!
//! A [`Session`] owns the loaded sampling object, one perf-event handle per
//! online CPU, and the symbolization caches. The kernel side aggregates
//! samples on its own; userspace never blocks waiting for them. Each
//! [`Session::collect`] call is one *round*: drain the aggregation map,
//! attribute samples to discovered targets, symbolize their stacks, hand
//! them to the sink, then delete exactly what was read. Entries the kernel
//! inserts between read and delete survive into the next round — accepted,
//! bounded staleness rather than data loss.
//!
//! `start`, `collect` and `stop` take `&mut self`: the exclusive borrow is
//! the lock that keeps kernel-map access from interleaving.

pub mod cpu;
pub mod perf_event;

use std::borrow::Borrow;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use aya::maps::{Array, HashMap as BpfHashMap, MapData};
use aya::Ebpf;
use aya_log::EbpfLogger;
use log::debug;

use strobe_common::{ProfileArgs, RawStack, SampleKey, ARGS_MAP, COUNTS_MAP, STACKS_MAP};

use crate::discovery::{Target, TargetFinder};
use crate::domain::{Pid, ProfilerError, StackId};
use crate::symtab::SymbolCache;

use perf_event::{attach_perf_events, PerfHandle};

/// Name substituted when a frame cannot be resolved.
pub const UNKNOWN_SYMBOL: &str = "[unknown]";

/// Tuning knobs for one profiling session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Samples per second per CPU.
    pub sample_rate: u32,
    /// Restrict sampling to one process id; <= 0 samples everything.
    pub pid: i32,
    /// Maximum processes with live symbol tables.
    pub pid_cache_size: usize,
    /// Maximum cached ELF resolvers, per cache index.
    pub elf_cache_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sample_rate: 97,
            pid: -1,
            pid_cache_size: 64,
            elf_cache_size: 128,
        }
    }
}

/// Sink invoked once per collected sample: labels, ordered frame names,
/// sample count, process id. An error aborts the remainder of the round.
pub type SampleSink<'a> = dyn FnMut(&Target, &[String], u64, Pid) -> Result<()> + 'a;

/// One sampling-and-symbolization session over one precompiled sampling
/// object. Created once, started once, stopped once; not restartable.
pub struct Session {
    target_finder: Arc<dyn TargetFinder + Send + Sync>,
    bpf_object: Vec<u8>,
    options: SessionOptions,
    bpf: Option<Ebpf>,
    perf_handles: Vec<PerfHandle>,
    sym_cache: SymbolCache,
    round_number: u64,
}

struct RawSample {
    pid: Pid,
    labels: Arc<Target>,
    comm: String,
    user_stack: Option<RawStack>,
    kern_stack: Option<RawStack>,
    count: u64,
}

impl Session {
    #[must_use]
    pub fn new(
        target_finder: Arc<dyn TargetFinder + Send + Sync>,
        bpf_object: Vec<u8>,
        options: SessionOptions,
    ) -> Self {
        let sym_cache = SymbolCache::new(options.pid_cache_size, options.elf_cache_size);
        Self {
            target_finder,
            bpf_object,
            options,
            bpf: None,
            perf_handles: Vec::new(),
            sym_cache,
            round_number: 0,
        }
    }

    /// Load the sampling object and attach one handle per online CPU.
    ///
    /// # Errors
    /// Fatal on rlimit, load, argument-init, or any CPU's attach failure;
    /// the caller must abort. Handles attached before a failure are
    /// released on the error path.
    pub fn start(&mut self) -> Result<()> {
        raise_memlock_rlimit().context("raise memlock rlimit")?;

        let mut bpf = Ebpf::load(&self.bpf_object).context("load bpf object")?;
        if let Err(err) = EbpfLogger::init(&mut bpf) {
            // The sampling object is free not to carry log maps.
            debug!("no kernel-side logger in sampling object: {err}");
        }
        self.init_args(&mut bpf).context("init bpf args")?;
        self.perf_handles =
            attach_perf_events(&mut bpf, self.options.sample_rate).context("attach perf events")?;
        self.bpf = Some(bpf);
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn init_args(&self, bpf: &mut Ebpf) -> Result<()> {
        let tgid_filter = if self.options.pid <= 0 {
            0
        } else {
            self.options.pid as u32
        };
        let mut args: Array<_, ProfileArgs> =
            Array::try_from(bpf.map_mut(ARGS_MAP).ok_or(ProfilerError::MapNotFound(ARGS_MAP))?)?;
        args.set(0, ProfileArgs { tgid_filter }, 0)?;
        Ok(())
    }

    /// Run one collection round.
    ///
    /// Emits one sink call per sample whose process has a discovery target.
    /// Frame order is command name first, then user-space frames reversed
    /// to caller-first order, then kernel-space frames likewise.
    /// Unresolvable frames become [`UNKNOWN_SYMBOL`]; absent or already
    /// cleared stack ids contribute no frames. Afterwards exactly the
    /// entries read this round are deleted from the kernel maps.
    ///
    /// # Errors
    /// A failed map read or clear aborts the round (the session survives;
    /// the next round may succeed). A sink error aborts before the clears,
    /// so unprocessed entries are re-read next round.
    pub fn collect(&mut self, sink: &mut SampleSink<'_>) -> Result<()> {
        self.round_number += 1;
        let round = self.round_number;
        debug!("collection round {round}");

        let bpf = self.bpf.as_mut().ok_or(ProfilerError::NotStarted)?;

        let entries: Vec<(SampleKey, u32)> = {
            let counts: BpfHashMap<_, SampleKey, u32> =
                BpfHashMap::try_from(bpf.map(COUNTS_MAP).ok_or(ProfilerError::MapNotFound(COUNTS_MAP))?)?;
            counts
                .iter()
                .collect::<std::result::Result<_, _>>()
                .context("read counts map")?
        };

        let mut known_stacks: HashSet<u32> = HashSet::new();
        let mut samples: Vec<RawSample> = Vec::new();
        {
            let stacks: BpfHashMap<_, u32, RawStack> =
                BpfHashMap::try_from(bpf.map(STACKS_MAP).ok_or(ProfilerError::MapNotFound(STACKS_MAP))?)?;
            for (key, count) in &entries {
                let user_stack = StackId(key.user_stack);
                let kern_stack = StackId(key.kern_stack);
                if let Some(id) = user_stack.as_map_key() {
                    known_stacks.insert(id);
                }
                if let Some(id) = kern_stack.as_map_key() {
                    known_stacks.insert(id);
                }
                let pid = Pid(key.pid);
                let Some(labels) = self.target_finder.find_target(pid) else {
                    continue;
                };
                samples.push(RawSample {
                    pid,
                    labels,
                    comm: key.comm_str().to_string(),
                    user_stack: lookup_stack(&stacks, user_stack),
                    kern_stack: lookup_stack(&stacks, kern_stack),
                    count: u64::from(*count),
                });
            }
        }

        let mut frames: Vec<String> = Vec::new();
        for sample in &samples {
            frames.clear();
            frames.push(sample.comm.clone());
            walk_stack(
                &mut frames,
                sample.user_stack.as_ref(),
                sample.pid,
                round,
                &mut self.sym_cache,
            );
            walk_stack(
                &mut frames,
                sample.kern_stack.as_ref(),
                Pid(0),
                round,
                &mut self.sym_cache,
            );
            sink(&sample.labels, &frames, sample.count, sample.pid)?;
        }

        {
            let mut counts: BpfHashMap<_, SampleKey, u32> = BpfHashMap::try_from(
                bpf.map_mut(COUNTS_MAP)
                    .ok_or(ProfilerError::MapNotFound(COUNTS_MAP))?,
            )?;
            for (key, _) in &entries {
                counts.remove(key).context("clear counts map")?;
            }
        }
        {
            let mut stacks: BpfHashMap<_, u32, RawStack> = BpfHashMap::try_from(
                bpf.map_mut(STACKS_MAP)
                    .ok_or(ProfilerError::MapNotFound(STACKS_MAP))?,
            )?;
            for id in &known_stacks {
                stacks.remove(id).context("clear stacks map")?;
            }
        }
        Ok(())
    }

    /// Detach every perf handle, then release the sampling object and its
    /// maps. Call once, after the last `collect`.
    pub fn stop(&mut self) {
        self.perf_handles.clear();
        self.bpf = None;
    }
}

/// Raise RLIMIT_MEMLOCK so map creation is not rejected on kernels that
/// still account BPF memory against it.
fn raise_memlock_rlimit() -> Result<()> {
    let limit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    // SAFETY: setrlimit only reads the struct we pass.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error()).context("setrlimit(RLIMIT_MEMLOCK)");
    }
    Ok(())
}

fn lookup_stack<T: Borrow<MapData>>(
    stacks: &BpfHashMap<T, u32, RawStack>,
    id: StackId,
) -> Option<RawStack> {
    let key = id.as_map_key()?;
    // A lookup miss means the id was recycled since the sample was taken;
    // the sample just loses those frames.
    stacks.get(&key, 0).ok()
}

fn walk_stack(
    frames: &mut Vec<String>,
    stack: Option<&RawStack>,
    pid: Pid,
    round: u64,
    sym_cache: &mut SymbolCache,
) {
    let Some(stack) = stack else { return };
    append_frames(frames, stack, |ip| sym_cache.resolve(pid, ip, round));
}

/// Resolve and append one stack's frames in caller-first order. The raw
/// records are innermost-first, so the resolved names are reversed before
/// appending.
fn append_frames(
    frames: &mut Vec<String>,
    stack: &RawStack,
    mut resolve: impl FnMut(u64) -> Option<String>,
) {
    let mut resolved: Vec<String> = frame_pointers(stack)
        .map(|ip| resolve(ip).unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()))
        .collect();
    resolved.reverse();
    frames.append(&mut resolved);
}

/// The captured instruction pointers: fixed-width little-endian records,
/// terminated early by a zero entry.
fn frame_pointers(stack: &RawStack) -> impl Iterator<Item = u64> + '_ {
    stack.iter().copied().take_while(|ip| *ip != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strobe_common::MAX_STACK_DEPTH;

    fn raw_stack(ips: &[u64]) -> RawStack {
        let mut stack = [0u64; MAX_STACK_DEPTH];
        stack[..ips.len()].copy_from_slice(ips);
        stack
    }

    #[test]
    fn test_frame_pointers_stop_at_zero() {
        let stack = raw_stack(&[0x10, 0x20, 0, 0x30]);
        let ips: Vec<u64> = frame_pointers(&stack).collect();
        assert_eq!(ips, vec![0x10, 0x20]);
    }

    #[test]
    fn test_frame_pointers_full_stack() {
        let stack = raw_stack(&[1; MAX_STACK_DEPTH]);
        assert_eq!(frame_pointers(&stack).count(), MAX_STACK_DEPTH);
    }

    #[test]
    fn test_append_frames_caller_first_order() {
        // Raw order is innermost-first: "main" is the sampled leaf, "run"
        // its caller. The emitted order is comm, then caller-first frames.
        let mut frames = vec!["proc42".to_string()];
        let stack = raw_stack(&[0x1000, 0x2000]);
        append_frames(&mut frames, &stack, |ip| match ip {
            0x1000 => Some("main".to_string()),
            0x2000 => Some("run".to_string()),
            _ => None,
        });
        assert_eq!(frames, vec!["proc42", "run", "main"]);
    }

    #[test]
    fn test_append_frames_unknown_substitution() {
        let mut frames = Vec::new();
        let stack = raw_stack(&[0x1000, 0xdead]);
        append_frames(&mut frames, &stack, |ip| {
            (ip == 0x1000).then(|| "known".to_string())
        });
        assert_eq!(frames, vec![UNKNOWN_SYMBOL.to_string(), "known".to_string()]);
    }

    #[test]
    fn test_empty_stack_contributes_no_frames() {
        let mut frames = vec!["comm".to_string()];
        let stack = raw_stack(&[]);
        append_frames(&mut frames, &stack, |_| Some("x".to_string()));
        assert_eq!(frames, vec!["comm"]);

        // Absent stack id: no bytes at all.
        let mut sym_cache = SymbolCache::new(2, 2);
        walk_stack(&mut frames, None, Pid(1), 1, &mut sym_cache);
        assert_eq!(frames, vec!["comm"]);
    }

    #[test]
    fn test_session_options_defaults() {
        let options = SessionOptions::default();
        assert!(options.pid <= 0, "default profiles all processes");
        assert!(options.sample_rate > 0);
        assert!(options.pid_cache_size > 0);
        assert!(options.elf_cache_size > 0);
    }
}
