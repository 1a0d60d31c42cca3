use std::fmt::Debug;
use std::num::NonZero;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

/// Decides what a waiting worker does between two unsuccessful reads of a peer's stage counter.
///
/// The barrier protocol itself never sleeps, yields or times out. All of that is delegated here
/// so that the same protocol can run as a tight busy-wait in a benchmark and as a bounded wait
/// in a test.
pub trait PollStrategy: Debug {
    /// Called after the `attempts`-th read of a peer's counter did not show the awaited stage.
    ///
    /// Returning [`ControlFlow::Break`] abandons the wait.
    fn on_miss(&mut self, attempts: u64) -> ControlFlow<()>;
}

/// Reads again immediately, burning a full processor core for the duration of the wait.
///
/// This adds the least possible latency on top of the storage itself.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BusySpin;

impl PollStrategy for BusySpin {
    fn on_miss(&mut self, _attempts: u64) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Sleeps for a fixed interval before reading again.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SleepBetween(pub Duration);

impl PollStrategy for SleepBetween {
    fn on_miss(&mut self, _attempts: u64) -> ControlFlow<()> {
        thread::sleep(self.0);
        ControlFlow::Continue(())
    }
}

/// Wraps another strategy and abandons the wait after a fixed number of reads.
///
/// Intended for tests, where a peer that never arrives must not hang the test forever.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GiveUpAfter<P> {
    inner: P,
    max_attempts: NonZero<u64>,
}

impl<P> GiveUpAfter<P> {
    /// Abandons any single wait once `max_attempts` reads of the peer's counter have missed.
    #[must_use]
    pub fn new(inner: P, max_attempts: NonZero<u64>) -> Self {
        Self {
            inner,
            max_attempts,
        }
    }
}

impl<P: PollStrategy> PollStrategy for GiveUpAfter<P> {
    fn on_miss(&mut self, attempts: u64) -> ControlFlow<()> {
        if attempts >= self.max_attempts.get() {
            return ControlFlow::Break(());
        }

        self.inner.on_miss(attempts)
    }
}

/// A poll strategy chosen by the operator, as accepted on the command line.
///
/// The textual forms are `spin` and `sleep:<microseconds>`.
#[derive(Clone, Copy, Debug, Default, derive_more::Display, Eq, PartialEq)]
#[non_exhaustive]
pub enum PollSpec {
    /// See [`BusySpin`].
    #[default]
    #[display("spin")]
    Spin,

    /// See [`SleepBetween`].
    #[display("sleep:{}", _0.as_micros())]
    Sleep(Duration),
}

impl PollStrategy for PollSpec {
    fn on_miss(&mut self, attempts: u64) -> ControlFlow<()> {
        match self {
            Self::Spin => BusySpin.on_miss(attempts),
            Self::Sleep(interval) => SleepBetween(*interval).on_miss(attempts),
        }
    }
}

impl FromStr for PollSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.eq_ignore_ascii_case("spin") {
            return Ok(Self::Spin);
        }

        if let Some(micros) = s.strip_prefix("sleep:") {
            return micros
                .parse::<u64>()
                .map(|micros| Self::Sleep(Duration::from_micros(micros)))
                .map_err(|e| format!("invalid sleep interval '{micros}': {e}"));
        }

        Err(format!(
            "invalid poll strategy: '{s}'. Valid options are: spin, sleep:<microseconds>"
        ))
    }
}
