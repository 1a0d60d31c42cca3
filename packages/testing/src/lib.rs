#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the file rendezvous benchmark.
//!
//! The workers of a real run are separate processes. Most tests instead run them as threads of
//! the test process that share a temporary directory, which exercises exactly the same files.

use std::panic;
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

/// Runs a test with a timeout to prevent infinite hangs.
///
/// A broken barrier does not fail, it waits forever. Wrapping a test in this function turns
/// such a hang into a panic after 10 seconds (60 seconds under Miri).
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly, so that mutation testing can detect mutations
/// that hang.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 2 + 2);
/// assert_eq!(answer, 4);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout, probably stuck in a barrier");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => panic::resume_unwind(e),
        },
    }
}

/// Creates an empty directory for the workers of one test to share.
///
/// The directory is deleted when the returned value is dropped.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn shared_dir() -> TempDir {
    tempfile::tempdir().expect("temporary directory must be creatable")
}

/// Runs `worker_fn` on `worker_count` threads at once, passing each its worker id, and returns
/// the results ordered by worker id.
///
/// All threads are released together, so that no worker gets a head start from thread
/// creation order.
///
/// # Panics
///
/// Resumes the panic of the first worker (by id) that panicked.
pub fn run_workers<F, R>(worker_count: usize, worker_fn: F) -> Vec<R>
where
    F: Fn(usize) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    let worker_fn = Arc::new(worker_fn);
    let start = Arc::new(Barrier::new(worker_count));

    let handles: Vec<_> = (0..worker_count)
        .map(|worker_id| {
            let worker_fn = Arc::clone(&worker_fn);
            let start = Arc::clone(&start);

            thread::spawn(move || {
                start.wait();
                worker_fn(worker_id)
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap_or_else(|e| panic::resume_unwind(e)))
        .collect()
}

/// Asserts that `f` is still running after `duration` and then waits for it to finish.
///
/// Use this with a bounded poll strategy: the operation must block for a while, but it must
/// also eventually give up, or the test hangs.
///
/// # Panics
///
/// Panics if `f` completes within `duration`, or resumes the panic of `f`.
pub fn assert_blocks_for<F, R>(duration: Duration, f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let result = f();
        drop(tx.send(()));
        result
    });

    match rx.recv_timeout(duration) {
        Ok(()) => panic!("operation completed within {duration:?} but was expected to block"),
        // Disconnected means the operation panicked, which the join below reports.
        Err(mpsc::RecvTimeoutError::Timeout | mpsc::RecvTimeoutError::Disconnected) => {}
    }

    handle.join().unwrap_or_else(|e| panic::resume_unwind(e))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn watchdog_allows_fast_tests() {
        assert_eq!(with_watchdog(|| 42), 42);
    }

    #[test]
    #[should_panic]
    fn watchdog_propagates_panics() {
        let _: () = with_watchdog(|| panic!("boom"));
    }

    #[test]
    fn workers_return_in_id_order() {
        let results = run_workers(4, |worker_id| worker_id * 10);

        assert_eq!(results, vec![0, 10, 20, 30]);
    }

    #[test]
    fn workers_run_concurrently() {
        let arrived = Arc::new(AtomicUsize::new(0));
        let rendezvous = Arc::new(Barrier::new(3));

        let arrived_clone = Arc::clone(&arrived);
        let results = run_workers(3, move |_| {
            arrived_clone.fetch_add(1, Ordering::SeqCst);
            // Would deadlock if the workers ran one after another.
            rendezvous.wait();
        });

        assert_eq!(results.len(), 3);
        assert_eq!(arrived.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn shared_dir_starts_empty() {
        let dir = shared_dir();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn blocking_operation_passes() {
        let value = assert_blocks_for(Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(100));
            7
        });

        assert_eq!(value, 7);
    }

    #[test]
    #[should_panic]
    fn completing_operation_fails() {
        assert_blocks_for(Duration::from_secs(5), || 7);
    }
}
