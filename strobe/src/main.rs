//! # strobe - Main Entry Point
//!
//! Thin lifecycle wiring around [`strobe::session::Session`]: load the
//! sampling object, start the session, collect on an interval, print
//! folded stacks to stdout until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use strobe::cli::Args;
use strobe::discovery::StaticTargetFinder;
use strobe::session::{Session, SessionOptions};

const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    let bpf_object = fs::read(&args.bpf_object)
        .with_context(|| format!("read {}", args.bpf_object.display()))?;
    let finder = Arc::new(StaticTargetFinder::new(&args.service_name));

    let mut session = Session::new(
        finder,
        bpf_object,
        SessionOptions {
            sample_rate: args.sample_rate,
            pid: args.pid,
            ..SessionOptions::default()
        },
    );
    session.start().context("start profiling session")?;
    info!("session started, collecting every {}s", args.interval);

    let deadline = (args.duration > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(args.duration));
    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut emitted = 0u64;
                session
                    .collect(&mut |target, frames, count, pid| {
                        println!("{pid} {} {} {count}", target.service_name(), frames.join(";"));
                        emitted += 1;
                        Ok(())
                    })
                    .context("collect profiles")?;
                info!("round complete, {emitted} samples");
                if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    session.stop();
    Ok(())
}
