//! Example that runs a single worker through a few rounds in a temporary shared directory.
//!
//! A lone worker never waits on anyone, so this shows the round structure and the timing report
//! without needing a launcher.

use std::num::NonZero;

use file_rendezvous::{
    BusySpin, CsvSink, PartitionSequence, RoundLoop, SharedDir, WorkerConfig, WorkerState,
};

fn main() {
    println!("=== Single Worker Example ===");

    let dir = tempfile::tempdir().unwrap();

    let config = WorkerConfig::new(0, NonZero::new(1).unwrap(), dir.path()).unwrap();
    let state = WorkerState::new(&config, NonZero::new(1024).unwrap()).unwrap();

    let shared = SharedDir::new(config.shared_path());
    let mut round_loop = RoundLoop::new(shared, state, PartitionSequence, BusySpin);

    println!("compute,publish,publish_barrier,consume,consume_barrier");
    let mut sink = CsvSink::new(std::io::stdout().lock());
    let summary = round_loop.run(3, &mut sink).unwrap();

    assert_eq!(summary.rounds_completed(), 3);
    println!(
        "Completed {} rounds, last stage {}",
        summary.rounds_completed(),
        summary.final_stage()
    );
}
