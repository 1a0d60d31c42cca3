use std::io::{self, Write};

use crate::PhaseTimings;

/// Receives the timings of every completed round.
pub trait ReportSink {
    /// Records the timings of round `round` (zero-based).
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored, which ends the run.
    fn record(&mut self, round: usize, timings: &PhaseTimings) -> io::Result<()>;
}

/// Keeps every record in memory.
impl ReportSink for Vec<PhaseTimings> {
    fn record(&mut self, _round: usize, timings: &PhaseTimings) -> io::Result<()> {
        self.push(*timings);
        Ok(())
    }
}

/// Writes one line of comma-separated phase seconds per round.
///
/// Every line is flushed as soon as it is written, so an observer sees progress as it happens
/// and a worker that hangs in a later round still leaves its completed rounds behind.
#[derive(Debug)]
pub struct CsvSink<W> {
    out: W,
}

impl<W: Write> CsvSink<W> {
    /// Creates a sink writing to `out`.
    #[must_use]
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Returns the underlying writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for CsvSink<W> {
    fn record(&mut self, _round: usize, timings: &PhaseTimings) -> io::Result<()> {
        writeln!(self.out, "{timings}")?;
        self.out.flush()
    }
}
