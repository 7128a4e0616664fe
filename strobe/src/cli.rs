//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "strobe",
    about = "Sample CPU stacks through a precompiled eBPF object and print folded profiles",
    after_help = "\
EXAMPLES:
    sudo strobe --bpf-object profile.bpf.o                 Profile every process
    sudo strobe --bpf-object profile.bpf.o --pid 1234      Profile one process
    sudo strobe --bpf-object profile.bpf.o --duration 30   Stop after 30 seconds"
)]
pub struct Args {
    /// Path to the precompiled sampling object
    #[arg(long, value_name = "FILE")]
    pub bpf_object: PathBuf,

    /// Process ID to profile (default: all processes)
    #[arg(short, long, default_value_t = -1)]
    pub pid: i32,

    /// Samples per second per CPU
    #[arg(long, default_value_t = 97)]
    pub sample_rate: u32,

    /// Seconds between collection rounds
    #[arg(long, default_value_t = 5)]
    pub interval: u64,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    pub duration: u64,

    /// service_name label attached to every sample
    #[arg(long, default_value = "strobe")]
    pub service_name: String,
}
