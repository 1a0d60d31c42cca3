#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Measures what it costs a group of processes to work, synchronize and exchange data when the
//! only thing they share is a directory.
//!
//! Each worker is a separate process with its own identity in `[0, worker_count)`. Workers do
//! not share memory and never talk to each other directly. Instead, every worker owns two files
//! in the shared directory: a stage counter that peers poll to implement a barrier, and a
//! single-slot mailbox that peers read to receive the worker's data.
//!
//! Every round, a worker:
//!
//! 1. computes its partition into a local buffer ([`Workload`]),
//! 2. publishes the buffer to its mailbox ([`Mailbox::publish()`]),
//! 3. waits until every peer has published ([`Barrier::enter_after_publish()`]),
//! 4. reads every peer's mailbox and checks its sentinel ([`Mailbox::consume()`]),
//! 5. waits until every peer has finished reading ([`Barrier::enter()`]),
//!
//! and reports how long each phase took ([`PhaseTimings`]).
//!
//! The barrier busy-waits by default and has no timeout: a worker that crashes or hangs leaves
//! all its peers waiting forever. Fault tolerance is not a goal of this crate.
//!
//! # Example
//!
//! A single worker runs alone, so its barriers never wait on anyone:
//!
//! ```
//! use std::num::NonZero;
//!
//! use file_rendezvous::{
//!     BusySpin, PartitionSequence, PhaseTimings, RoundLoop, SharedDir, WorkerConfig, WorkerState,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//!
//! let config = WorkerConfig::new(0, NonZero::new(1).unwrap(), dir.path())?;
//! let state = WorkerState::new(&config, NonZero::new(1024).unwrap())?;
//!
//! let shared = SharedDir::new(config.shared_path());
//! let mut round_loop = RoundLoop::new(shared, state, PartitionSequence, BusySpin);
//!
//! let mut timings: Vec<PhaseTimings> = Vec::new();
//! let summary = round_loop.run(3, &mut timings)?;
//!
//! assert_eq!(summary.rounds_completed(), 3);
//! assert_eq!(timings.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! # Shared storage layout
//!
//! All integers are native-sized and native-endian, so every worker of a run must run on the
//! same kind of machine.
//!
//! | File | Contents |
//! |------|----------|
//! | `barrier<id>` | one `i64`: the last stage worker `id` has entered |
//! | `data<id>` | `partition_size` `i64`s: worker `id`'s last published buffer |
//!
//! The first element of `data<id>` is always `partition_size * id`, which consumers check.

mod barrier;
mod claim;
mod config;
mod error;
mod mailbox;
mod pal;
mod poll;
mod report;
mod round;
mod shared_dir;
mod state;
mod timing;
mod workload;

pub use barrier::*;
pub use claim::*;
pub use config::*;
pub use error::{ClaimError, ConfigError, ProtocolViolation, RunError, WaitAbandoned};
pub use mailbox::*;
pub use poll::*;
pub use report::*;
pub use round::*;
pub use shared_dir::*;
pub use state::*;
pub use timing::PhaseTimings;
pub use workload::*;
