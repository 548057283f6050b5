//! Instrumented demo target.
//!
//! Runs a transaction loop with two probes so a profiler has something to
//! attach to.
//!
//! ```bash
//! # Run the target; it writes xpedite-appinfo.txt with its control port
//! cargo run --example demo-target -- --txn-count 100000
//!
//! # Block until a profiler attaches and begins a profile
//! cargo run --example demo-target -- --await-profile-begin
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
struct Args {
    /// Where to write the app-info file profilers read
    #[arg(long, default_value = "xpedite-appinfo.txt")]
    app_info: PathBuf,

    /// Number of transactions to run
    #[arg(long, default_value_t = 10_000)]
    txn_count: u64,

    /// Pause between transactions in microseconds
    #[arg(long, default_value_t = 100)]
    txn_pause_us: u64,

    /// Block startup until a profiler begins a profile
    #[arg(long)]
    await_profile_begin: bool,
}

fn transaction(payload: u64) -> u64 {
    // a little work so samples land somewhere interesting
    (0..64).fold(payload, |acc, i| acc.rotate_left(1) ^ i)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let txn_begin = xpedite::probes::registry().register("demo-target.rs", 60, "txnBegin");
    let txn_end = xpedite::probes::registry().register("demo-target.rs", 62, "txnEnd");

    if !xpedite::initialize_with(&args.app_info, "", args.await_profile_begin) {
        anyhow::bail!("failed to initialize xpedite");
    }
    println!("profiling control plane up - app info at {}", args.app_info.display());

    let mut checksum = 0u64;
    for i in 0..args.txn_count {
        txn_begin.fire();
        checksum = checksum.wrapping_add(transaction(i));
        txn_end.fire();
        std::thread::sleep(Duration::from_micros(args.txn_pause_us));
    }
    println!("ran {} transactions (checksum {checksum:x})", args.txn_count);

    xpedite::halt();
    Ok(())
}
