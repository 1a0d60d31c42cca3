use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::timing::PhaseClock;
use crate::{
    Barrier, Mailbox, PhaseTimings, PollStrategy, ProtocolViolation, ReportSink, RunError,
    SharedDir, WorkerState, Workload,
};

/// What the round loop does when a consumed mailbox fails validation.
#[derive(Clone, Copy, Debug, Default, derive_more::Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum ViolationPolicy {
    /// End the run immediately with the violation as the error.
    #[default]
    #[display("abort")]
    Abort,

    /// Log the violation, remember it in the summary and carry on with the round.
    #[display("continue")]
    ReportAndContinue,
}

impl FromStr for ViolationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::ReportAndContinue),
            _ => Err(format!(
                "invalid violation policy: '{s}'. Valid options are: abort, continue"
            )),
        }
    }
}

/// The result of one round.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundOutcome {
    timings: PhaseTimings,
    violations: Vec<ProtocolViolation>,
}

impl RoundOutcome {
    /// How long each phase took.
    #[must_use]
    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    /// Violations that were tolerated under [`ViolationPolicy::ReportAndContinue`].
    #[must_use]
    pub fn violations(&self) -> &[ProtocolViolation] {
        &self.violations
    }
}

/// The result of a whole run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    rounds_completed: usize,
    final_stage: u64,
    violations: Vec<ProtocolViolation>,
}

impl RunSummary {
    /// How many rounds were completed and reported.
    #[must_use]
    pub fn rounds_completed(&self) -> usize {
        self.rounds_completed
    }

    /// The last stage this worker published.
    #[must_use]
    pub fn final_stage(&self) -> u64 {
        self.final_stage
    }

    /// Every violation tolerated during the run, in the order observed.
    #[must_use]
    pub fn violations(&self) -> &[ProtocolViolation] {
        &self.violations
    }
}

/// Drives one worker through its rounds.
///
/// Before the first round, every worker passes one barrier so that nobody publishes before
/// everybody is up. After that each round is:
///
/// 1. compute into the local buffer
/// 2. publish the buffer to our mailbox
/// 3. barrier, after which every peer's mailbox holds this round's data
/// 4. consume every peer's mailbox
/// 5. barrier, after which nobody is still reading a mailbox we are about to overwrite
#[derive(Debug)]
pub struct RoundLoop<W, P> {
    shared: SharedDir,
    state: WorkerState,
    mailbox: Mailbox,
    barrier: Barrier<P>,
    workload: W,
    policy: ViolationPolicy,
    started: bool,
}

impl<W: Workload, P: PollStrategy> RoundLoop<W, P> {
    /// Creates the round loop of one worker.
    #[must_use]
    pub fn new(shared: SharedDir, state: WorkerState, workload: W, poll: P) -> Self {
        Self {
            mailbox: Mailbox::new(state.partition_size()),
            barrier: Barrier::new(shared.clone(), poll),
            shared,
            state,
            workload,
            policy: ViolationPolicy::default(),
            started: false,
        }
    }

    /// Sets what happens when a consumed mailbox fails validation.
    #[must_use]
    pub fn with_violation_policy(mut self, policy: ViolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The worker's current state.
    #[must_use]
    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// The worker's mailbox buffer, holding the last mailbox consumed (or, before any consume,
    /// the last computed buffer).
    #[must_use]
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Passes the initial barrier that every worker enters before its first round.
    ///
    /// Calling this is optional: the first round does it if needed. Calling it again has no
    /// effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the barrier cannot be passed.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        info!(
            worker = self.state.id(),
            worker_count = self.state.worker_count().get(),
            "worker {} of {}",
            self.state.id(),
            self.state.worker_count()
        );

        self.barrier.enter(&mut self.state)?;
        self.started = true;

        Ok(())
    }

    /// Runs a single round.
    ///
    /// # Errors
    ///
    /// Returns an error if shared storage fails, if a barrier cannot be passed or if a mailbox
    /// fails validation under [`ViolationPolicy::Abort`]. The round is abandoned on the spot.
    pub fn run_round(&mut self) -> Result<RoundOutcome> {
        self.start()?;

        let mut violations = Vec::new();
        let mut clock = PhaseClock::start();

        self.workload.compute(&self.state, self.mailbox.values_mut());
        let compute = clock.lap();

        let receipt = self.mailbox.publish(&self.shared, &self.state)?;
        let publish = clock.lap();

        self.barrier.enter_after_publish(&mut self.state, receipt)?;
        let publish_barrier = clock.lap();

        for peer in self.state.peers() {
            match self.mailbox.consume(&self.shared, &self.state, peer) {
                Ok(()) => {}
                Err(RunError::Protocol(violation)) => match self.policy {
                    ViolationPolicy::Abort => return Err(violation.into()),
                    ViolationPolicy::ReportAndContinue => {
                        warn!(worker = self.state.id(), %violation, "tolerating protocol violation");
                        violations.push(violation);
                    }
                },
                Err(e) => return Err(e),
            }
        }
        let consume = clock.lap();

        self.barrier.enter(&mut self.state)?;
        let consume_barrier = clock.lap();

        let timings = PhaseTimings {
            compute,
            publish,
            publish_barrier,
            consume,
            consume_barrier,
        };

        debug!(
            worker = self.state.id(),
            stage = self.state.completed_stages(),
            total = ?timings.total(),
            "round complete"
        );

        Ok(RoundOutcome {
            timings,
            violations,
        })
    }

    /// Runs `rounds` rounds, handing the timings of each to `sink` as soon as it completes.
    ///
    /// # Errors
    ///
    /// Returns the first error of any round, or of the sink. Rounds reported before the error
    /// stay reported.
    pub fn run(&mut self, rounds: usize, sink: &mut impl ReportSink) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for round in 0..rounds {
            let outcome = self.run_round()?;

            sink.record(round, &outcome.timings)
                .map_err(RunError::Report)?;

            summary.rounds_completed = summary.rounds_completed.saturating_add(1);
            summary.violations.extend(outcome.violations);
        }

        summary.final_stage = self.state.completed_stages();

        Ok(summary)
    }
}
