use std::num::NonZero;

use crate::{ConfigError, WorkerConfig};

/// Everything a worker knows about its own position in the run.
///
/// Owned by the round loop and lent to the barrier and mailbox operations. The stage is the
/// number that the next barrier entry will publish. It starts at 1, which is consumed by the
/// initial implicit barrier, and only ever grows by one per completed barrier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerState {
    id: usize,
    worker_count: NonZero<usize>,
    stage: u64,
    partition_size: NonZero<usize>,
}

impl WorkerState {
    /// Creates the state of a worker that has not yet entered any barrier.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox contents of the highest worker would not fit into
    /// the mailbox element type.
    pub fn new(config: &WorkerConfig, partition_size: NonZero<usize>) -> Result<Self, ConfigError> {
        let worker_count = config.worker_count();

        // The largest element any worker ever publishes is one less than this.
        partition_size
            .get()
            .checked_mul(worker_count.get())
            .and_then(|end| i64::try_from(end).ok())
            .ok_or(ConfigError::PartitionTooLarge {
                partition_size: partition_size.get(),
                worker_count: worker_count.get(),
            })?;

        Ok(Self {
            id: config.worker_id(),
            worker_count,
            stage: 1,
            partition_size,
        })
    }

    /// The identity of this worker.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// The number of cooperating workers.
    #[must_use]
    pub fn worker_count(&self) -> NonZero<usize> {
        self.worker_count
    }

    /// The stage that the next barrier entry will publish.
    #[must_use]
    pub fn next_stage(&self) -> u64 {
        self.stage
    }

    /// How many barriers this worker has completed so far.
    #[must_use]
    pub fn completed_stages(&self) -> u64 {
        self.stage.saturating_sub(1)
    }

    /// The number of elements in every mailbox.
    #[must_use]
    pub fn partition_size(&self) -> NonZero<usize> {
        self.partition_size
    }

    /// Every worker of the run except this one, in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = usize> + use<> {
        let id = self.id;
        (0..self.worker_count.get()).filter(move |&peer| peer != id)
    }

    /// The value that the first element of `worker`'s mailbox must hold.
    ///
    /// This is also the first element of `worker`'s partition of the global address space.
    #[must_use]
    pub fn sentinel_for(&self, worker: usize) -> i64 {
        debug_assert!(worker < self.worker_count.get());

        // Cannot overflow for in-range workers, checked in new().
        let start = self.partition_size.get().wrapping_mul(worker);
        i64::try_from(start).unwrap_or(i64::MAX)
    }

    pub(crate) fn advance(&mut self) {
        self.stage = self.stage.saturating_add(1);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config(worker_id: usize, worker_count: usize) -> WorkerConfig {
        WorkerConfig::new(
            worker_id,
            NonZero::new(worker_count).unwrap(),
            PathBuf::from("/shared"),
        )
        .unwrap()
    }

    #[test]
    fn starts_at_stage_one() {
        let state = WorkerState::new(&config(0, 2), NonZero::new(4).unwrap()).unwrap();

        assert_eq!(state.next_stage(), 1);
        assert_eq!(state.completed_stages(), 0);
    }

    #[test]
    fn advance_is_monotone_by_one() {
        let mut state = WorkerState::new(&config(0, 2), NonZero::new(4).unwrap()).unwrap();

        for expected in 2..10 {
            state.advance();
            assert_eq!(state.next_stage(), expected);
        }
    }

    #[test]
    fn peers_exclude_self() {
        let state = WorkerState::new(&config(2, 4), NonZero::new(4).unwrap()).unwrap();

        assert_eq!(state.peers().collect::<Vec<_>>(), vec![0, 1, 3]);
    }

    #[test]
    fn single_worker_has_no_peers() {
        let state = WorkerState::new(&config(0, 1), NonZero::new(4).unwrap()).unwrap();

        assert_eq!(state.peers().count(), 0);
    }

    #[test]
    fn sentinel_is_partition_start() {
        let state = WorkerState::new(&config(0, 2), NonZero::new(4).unwrap()).unwrap();

        assert_eq!(state.sentinel_for(0), 0);
        assert_eq!(state.sentinel_for(1), 4);
    }

    #[test]
    fn oversized_partition_is_rejected() {
        let result = WorkerState::new(&config(0, 4), NonZero::new(usize::MAX / 2).unwrap());

        assert!(matches!(
            result,
            Err(ConfigError::PartitionTooLarge { worker_count: 4, .. })
        ));
    }
}
