use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The worker configuration could not be established.
///
/// This is always fatal at startup: a worker with a bad configuration never touches the
/// shared storage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("environment variable {name} is not set")]
    Missing {
        /// Name of the variable.
        name: &'static str,
    },

    /// A value was present but could not be parsed.
    #[error("{name} has invalid value '{value}': {problem}")]
    Invalid {
        /// Name of the variable or option.
        name: &'static str,

        /// The value as it was provided.
        value: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// The worker identity does not fall inside `[0, worker_count)`.
    #[error("worker id {worker_id} is out of range for {worker_count} workers")]
    WorkerIdOutOfRange {
        /// The configured worker id.
        worker_id: usize,

        /// The configured worker count.
        worker_count: usize,
    },

    /// The sentinel values of the highest worker would not fit into a mailbox element.
    #[error("partition size {partition_size} is too large for {worker_count} workers")]
    PartitionTooLarge {
        /// The configured partition size.
        partition_size: usize,

        /// The configured worker count.
        worker_count: usize,
    },

    /// The shared storage path does not exist or is not a directory.
    #[error("shared path {} is not a directory", .path.display())]
    NotADirectory {
        /// The configured shared path.
        path: PathBuf,
    },
}

/// A consumed mailbox did not look like the one its owner is expected to publish.
///
/// This signals that a reader raced ahead of a writer, i.e. the barrier ordering was
/// violated, or that something other than the owning worker wrote the file.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum ProtocolViolation {
    /// The first element of the mailbox was not the peer's sentinel value.
    #[error(
        "mailbox of worker {peer} starts with {observed} but {expected} was expected (stage {stage})"
    )]
    SentinelMismatch {
        /// The worker whose mailbox was consumed.
        peer: usize,

        /// The sentinel value that should have been observed.
        expected: i64,

        /// The value that was actually observed.
        observed: i64,

        /// The stage the consuming worker had reached.
        stage: u64,
    },

    /// The mailbox file was shorter than one full partition.
    #[error("mailbox of worker {peer} holds {observed_bytes} bytes but {expected_bytes} were expected")]
    TruncatedMailbox {
        /// The worker whose mailbox was consumed.
        peer: usize,

        /// The size of a full mailbox.
        expected_bytes: usize,

        /// The number of bytes that could be read.
        observed_bytes: usize,
    },

    /// The mailbox file was longer than one partition, as written by a worker configured with
    /// a larger partition size.
    #[error("mailbox of worker {peer} holds more than the {expected_bytes} bytes expected")]
    OversizedMailbox {
        /// The worker whose mailbox was consumed.
        peer: usize,

        /// The size of a full mailbox.
        expected_bytes: usize,
    },
}

/// A poll strategy gave up waiting for a peer.
///
/// The production strategies never give up, so this is only ever seen when a bounded strategy
/// has been injected, typically by a test.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("gave up waiting for worker {peer} to reach stage {stage} after {attempts} attempts")]
pub struct WaitAbandoned {
    /// The worker that was being waited for.
    pub peer: usize,

    /// The stage that the peer had to reach.
    pub stage: u64,

    /// How many times the peer's stage counter was read before giving up.
    pub attempts: u64,
}

/// Claiming a worker id through the shared storage failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimError {
    /// The claim files could not be accessed.
    #[error("cannot access claim file {}: {source}", .path.display())]
    Io {
        /// The file that was being accessed.
        path: PathBuf,

        /// The underlying error.
        source: io::Error,
    },

    /// The shared claim counter contains something that is not a worker id.
    #[error("claim file {} holds '{contents}' which is not a worker id", .path.display())]
    Corrupt {
        /// The claim counter file.
        path: PathBuf,

        /// What the file contained.
        contents: String,
    },

    /// More workers tried to claim an id than the run has room for.
    #[error("claimed worker id {worker_id} is out of range for {worker_count} workers")]
    OutOfRange {
        /// The id handed out by the shared counter.
        worker_id: usize,

        /// The configured worker count.
        worker_count: usize,
    },

    /// Not every worker claimed an id within the allowed time.
    #[error("timed out after {waited:?} waiting for all {worker_count} workers to claim an id")]
    Timeout {
        /// How long we waited.
        waited: Duration,

        /// The configured worker count.
        worker_count: usize,
    },
}

/// A benchmark run did not complete.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Shared storage could not be read or written.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// The file that was being accessed.
        path: PathBuf,

        /// The underlying error.
        source: io::Error,
    },

    /// A consumed mailbox failed validation and the run was configured to abort.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// A bounded poll strategy gave up waiting for a peer.
    #[error(transparent)]
    WaitAbandoned(#[from] WaitAbandoned),

    /// The report sink refused a timing record.
    #[error("cannot write timing report: {0}")]
    Report(#[source] io::Error),
}

/// A specialized `Result` type for rendezvous operations, returning the crate's
/// [`RunError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, RunError>;
