//! Per-CPU sampling handles
//!
//! One perf-event handle per online CPU, each with the sampling program
//! attached. The kernel fires the program on every counter overflow; no
//! userspace ring buffer is involved, samples aggregate in-kernel.

use anyhow::{Context, Result};
use aya::programs::{perf_event, PerfEvent};
use aya::Ebpf;
use log::debug;

use strobe_common::PERF_PROGRAM;

use crate::domain::{CpuId, ProfilerError};

use super::cpu::online_cpus;

/// One CPU's attached sampling handle.
///
/// Dropping the handle detaches the program and closes the underlying
/// perf-event fd.
pub struct PerfHandle {
    cpu: CpuId,
    _link: perf_event::PerfEventLink,
}

impl PerfHandle {
    #[must_use]
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }
}

/// Attach the sampling program to every online CPU.
///
/// CPU-clock software event, frequency sampling, all processes on that
/// CPU. Any single failure aborts the whole attachment; handles already
/// created are detached when the partial vector drops.
///
/// # Errors
/// Returns an error if CPU enumeration, program load, or any CPU's attach
/// fails.
pub fn attach_perf_events(bpf: &mut Ebpf, sample_rate: u32) -> Result<Vec<PerfHandle>> {
    let cpus = online_cpus().context("get online cpus")?;

    let program: &mut PerfEvent = bpf
        .program_mut(PERF_PROGRAM)
        .ok_or(ProfilerError::ProgramNotFound(PERF_PROGRAM))?
        .try_into()?;
    program.load()?;

    let mut handles = Vec::with_capacity(cpus.len());
    for cpu in cpus {
        let link_id = program
            .attach(
                perf_event::PerfTypeId::Software,
                perf_event::perf_sw_ids::PERF_COUNT_SW_CPU_CLOCK as u64,
                perf_event::PerfEventScope::AllProcessesOneCpu { cpu: cpu.0 },
                perf_event::SamplePolicy::Frequency(u64::from(sample_rate)),
                false,
            )
            .with_context(|| format!("attach perf event on {cpu}"))?;
        let link = program.take_link(link_id)?;
        debug!("attached sampling program on {cpu}");
        handles.push(PerfHandle { cpu, _link: link });
    }
    Ok(handles)
}
