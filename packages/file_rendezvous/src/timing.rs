use std::fmt;
use std::time::{Duration, Instant};

use itertools::Itertools;

/// Wall-clock durations of the phases of one round, in the order they run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PhaseTimings {
    /// Filling the local buffer.
    pub compute: Duration,

    /// Writing our mailbox.
    pub publish: Duration,

    /// Waiting for every peer to publish.
    pub publish_barrier: Duration,

    /// Reading every peer's mailbox.
    pub consume: Duration,

    /// Waiting for every peer to finish reading.
    pub consume_barrier: Duration,
}

impl PhaseTimings {
    /// The durations in the order the phases run.
    #[must_use]
    pub fn phases(&self) -> [Duration; 5] {
        [
            self.compute,
            self.publish,
            self.publish_barrier,
            self.consume,
            self.consume_barrier,
        ]
    }

    /// The duration of the whole round.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.phases().iter().sum()
    }
}

/// Formats as five comma-separated floating-point seconds, one per phase.
impl fmt::Display for PhaseTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.phases().iter().map(Duration::as_secs_f64).join(",")
        )
    }
}

/// Measures consecutive phases with a single running clock.
#[derive(Debug)]
pub(crate) struct PhaseClock {
    last: Instant,
}

impl PhaseClock {
    pub(crate) fn start() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Time since the previous lap (or the start), restarting the clock.
    pub(crate) fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        elapsed
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn display_is_five_seconds_in_phase_order() {
        let timings = PhaseTimings {
            compute: Duration::from_millis(1500),
            publish: Duration::from_millis(250),
            publish_barrier: Duration::ZERO,
            consume: Duration::from_secs(2),
            consume_barrier: Duration::from_micros(125),
        };

        assert_eq!(timings.to_string(), "1.5,0.25,0,2,0.000125");
    }

    #[test]
    fn total_sums_all_phases() {
        let timings = PhaseTimings {
            compute: Duration::from_millis(1),
            publish: Duration::from_millis(2),
            publish_barrier: Duration::from_millis(3),
            consume: Duration::from_millis(4),
            consume_barrier: Duration::from_millis(5),
        };

        assert_eq!(timings.total(), Duration::from_millis(15));
    }

    #[test]
    fn laps_do_not_overlap() {
        let started = Instant::now();
        let mut clock = PhaseClock::start();

        let first = clock.lap();
        let second = clock.lap();

        assert!(first + second <= started.elapsed());
    }
}
