use tracing::{debug, trace};

use crate::error::Result;
use crate::{PollStrategy, Published, SharedDir, WaitAbandoned, WorkerState};

/// Rendezvous of all workers of a run, built from nothing but files on shared storage.
///
/// Entering the barrier publishes the worker's next stage to its stage counter file and then
/// reads every peer's counter until each shows at least that stage. What happens between two
/// unsuccessful reads is up to the [`PollStrategy`]; the protocol itself has no timeout, so a
/// peer that never arrives keeps everyone else waiting forever.
///
/// A worker that has passed stage `s` may already be publishing `s + 1` while a slower peer is
/// still reading counters for `s`. Because a counter only ever grows and the check is `>=`,
/// the slower peer still passes, so workers are never more than one stage apart.
#[derive(Debug)]
pub struct Barrier<P> {
    shared: SharedDir,
    poll: P,
}

impl<P: PollStrategy> Barrier<P> {
    /// Creates a barrier that coordinates through `shared`.
    #[must_use]
    pub fn new(shared: SharedDir, poll: P) -> Self {
        Self { shared, poll }
    }

    /// Publishes the worker's next stage and blocks until every peer has reached it.
    ///
    /// On success the worker's stage advances by one.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage counter cannot be written or if the poll strategy gives
    /// up on a peer. In both cases the worker's stage does not advance.
    pub fn enter(&mut self, state: &mut WorkerState) -> Result<()> {
        let stage = state.next_stage();
        debug!(worker = state.id(), stage, "entering barrier");

        self.shared.write_stage(state.id(), stage)?;

        for peer in state.peers() {
            let attempts = self.wait_for(peer, stage)?;
            trace!(worker = state.id(), peer, stage, attempts, "peer reached stage");
        }

        state.advance();
        debug!(worker = state.id(), stage, "passed barrier");

        Ok(())
    }

    /// Same as [`enter()`][Self::enter], for the barrier that follows a mailbox publish.
    ///
    /// Taking the receipt of the publish guarantees that the mailbox contents are on storage
    /// before the stage counter that tells peers to read them.
    ///
    /// # Errors
    ///
    /// Same as [`enter()`][Self::enter].
    pub fn enter_after_publish(&mut self, state: &mut WorkerState, receipt: Published) -> Result<()> {
        debug_assert_eq!(receipt.worker(), state.id());
        debug_assert_eq!(receipt.stage(), state.next_stage());

        self.enter(state)
    }

    /// Blocks until `peer`'s stage counter shows at least `stage`.
    ///
    /// Returns how many times the counter was read. A counter that is missing, unreadable or
    /// caught mid-write counts as not having reached the stage.
    ///
    /// # Errors
    ///
    /// Returns an error only if the poll strategy gives up.
    pub fn wait_for(&mut self, peer: usize, stage: u64) -> std::result::Result<u64, WaitAbandoned> {
        let mut attempts: u64 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            if self
                .shared
                .read_stage(peer)
                .is_some_and(|observed| observed >= stage)
            {
                return Ok(attempts);
            }

            if self.poll.on_miss(attempts).is_break() {
                return Err(WaitAbandoned {
                    peer,
                    stage,
                    attempts,
                });
            }
        }
    }
}
