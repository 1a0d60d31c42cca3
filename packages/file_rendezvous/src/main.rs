#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]

//! Binary entry point: runs one worker of a shared-storage rendezvous benchmark.
//!
//! The launcher starts one of these per worker with `NUMBER_OF_WORKERS` and `TMP_PATH` set,
//! plus either `WORKER_NUMBER` or `--claim-id`. Each completed round prints one line of five
//! comma-separated phase durations in seconds to stdout. Diagnostics go to stderr, filtered by
//! `RUST_LOG`.
//!
//! This module is excluded from mutation testing because testing process entry/exit behavior
//! requires spawning subprocesses, which the integration tests do instead.

use std::error::Error;
use std::io;
use std::num::NonZero;
use std::process::ExitCode;
use std::time::Duration;

use argh::FromArgs;
use file_rendezvous::{
    CsvSink, DEFAULT_PARTITION_SIZE, DEFAULT_ROUNDS, PartitionSequence, PollSpec, RoundLoop,
    RunEnvironment, RunSummary, SharedDir, ViolationPolicy, WorkerState, claim_worker_id,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs one worker of a benchmark in which processes coordinate only through files in a
/// shared directory.
#[derive(FromArgs)]
struct Args {
    /// number of rounds to run (default 100)
    #[argh(option, default = "DEFAULT_ROUNDS")]
    rounds: usize,

    /// number of mailbox elements per worker (default 4096000)
    #[argh(option, default = "DEFAULT_PARTITION_SIZE")]
    partition_size: NonZero<usize>,

    /// how to wait for peers: spin or sleep:<microseconds> (default spin)
    #[argh(option, default = "PollSpec::default()")]
    poll: PollSpec,

    /// what to do when a consumed mailbox fails validation: abort or continue (default abort)
    #[argh(option, default = "ViolationPolicy::default()")]
    on_violation: ViolationPolicy,

    /// claim the worker id through the shared directory instead of reading WORKER_NUMBER
    #[argh(switch)]
    claim_id: bool,

    /// seconds to wait for every worker to claim an id (default 60)
    #[argh(option, default = "60")]
    claim_timeout_secs: u64,
}

// Binary entry point - mutations would require subprocess testing which is impractical.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Args = argh::from_env();

    match run(&args) {
        Ok(summary) => {
            info!(
                rounds = summary.rounds_completed(),
                final_stage = summary.final_stage(),
                violations = summary.violations().len(),
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg_attr(test, mutants::skip)]
fn run(args: &Args) -> Result<RunSummary, Box<dyn Error>> {
    let environment = RunEnvironment::from_env()?;
    let shared = SharedDir::new(environment.shared_path());

    let config = if args.claim_id {
        let worker_id = claim_worker_id(
            &shared,
            environment.worker_count(),
            Duration::from_secs(args.claim_timeout_secs),
        )?;

        environment.with_worker_id(worker_id)?
    } else {
        environment.into_worker_config()?
    };

    let state = WorkerState::new(&config, args.partition_size)?;

    let mut round_loop = RoundLoop::new(shared, state, PartitionSequence, args.poll)
        .with_violation_policy(args.on_violation);

    let mut sink = CsvSink::new(io::stdout().lock());

    Ok(round_loop.run(args.rounds, &mut sink)?)
}
