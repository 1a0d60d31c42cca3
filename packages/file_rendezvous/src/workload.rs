use std::fmt::Debug;

use crate::WorkerState;

/// The local computation a worker performs at the start of every round.
///
/// It must not perform I/O or synchronize with anyone: its cost is what the compute phase
/// measures. Whatever it leaves in the buffer is what the worker publishes.
pub trait Workload: Debug {
    /// Fills `buffer`, which holds exactly one partition.
    fn compute(&mut self, state: &WorkerState, buffer: &mut [i64]);
}

/// Fills the buffer with the worker's partition of a conceptually larger address space.
///
/// Worker `w` with partition size `n` produces `n * w, n * w + 1, ..., n * (w + 1) - 1`, so the
/// first element is always the sentinel that consumers of the mailbox check for.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PartitionSequence;

impl Workload for PartitionSequence {
    fn compute(&mut self, state: &WorkerState, buffer: &mut [i64]) {
        let start = state.sentinel_for(state.id());

        for (value, next) in buffer.iter_mut().zip(start..) {
            *value = next;
        }
    }
}
