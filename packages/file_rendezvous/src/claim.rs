use std::io;
use std::num::NonZero;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::Result;
use crate::pal::Storage;
use crate::{ClaimError, RunError, SharedDir};

/// How long a claimer sleeps before trying to take the claim lock again.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// How long a claimer sleeps between checks of whether everyone has claimed an id.
const ROLL_CALL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest claim counter we will read. Any valid worker id fits many times over.
const CLAIM_COUNTER_MAX_LEN: usize = 32;

/// Resets the shared directory for a new run of `worker_count` workers.
///
/// Every stage counter is set to 0 and every mailbox is removed, so that files left behind by
/// an earlier run cannot satisfy a barrier or a consume of this one. This must happen before
/// any worker of the new run enters a barrier.
///
/// # Errors
///
/// Returns an error if a file cannot be written or removed.
pub fn prepare_shared_dir(shared: &SharedDir, worker_count: NonZero<usize>) -> Result<()> {
    for worker in 0..worker_count.get() {
        shared.write_stage(worker, 0)?;

        let mailbox = shared.mailbox_path(worker);
        shared
            .storage()
            .remove(&mailbox)
            .map_err(SharedDir::io_error(mailbox))?;
    }

    debug!(worker_count = worker_count.get(), "prepared shared directory");

    Ok(())
}

/// Claims the next free worker id of the run and waits until every worker has claimed one.
///
/// This is the alternative to having the launcher assign ids. Claims are serialized by a lock
/// file in the shared directory. The first claimer gets id 0 and prepares the shared directory
/// (see [`prepare_shared_dir()`]) while still holding the lock, which is before anyone else can
/// have an id, let alone enter a barrier.
///
/// A claim counter left behind by an earlier run must be removed before the run starts.
///
/// # Errors
///
/// Returns an error if the claim files cannot be accessed, if more than `worker_count` workers
/// claim an id or if not every worker has claimed one within `timeout`.
pub fn claim_worker_id(
    shared: &SharedDir,
    worker_count: NonZero<usize>,
    timeout: Duration,
) -> std::result::Result<usize, ClaimError> {
    let started = Instant::now();

    let worker_id = {
        acquire_claim_lock(shared, started, timeout, worker_count)?;
        let _lock = scopeguard::guard(shared.clone(), release_claim_lock);

        let worker_id = read_claim_counter(shared)?.unwrap_or(0);

        if worker_id == 0 {
            prepare_shared_dir(shared, worker_count).map_err(|e| match e {
                RunError::Io { path, source } => ClaimError::Io { path, source },
                other => ClaimError::Io {
                    path: shared.root().to_path_buf(),
                    source: io::Error::other(other),
                },
            })?;
        }

        write_claim_counter(shared, worker_id.saturating_add(1))?;
        worker_id
    };

    if worker_id >= worker_count.get() {
        return Err(ClaimError::OutOfRange {
            worker_id,
            worker_count: worker_count.get(),
        });
    }

    info!(worker_id, "claimed worker id");

    loop {
        // Read without the lock, so the counter may be caught mid-write.
        let claimed = match read_claim_counter(shared) {
            Ok(claimed) => claimed.unwrap_or(0),
            Err(ClaimError::Corrupt { .. }) => 0,
            Err(e) => return Err(e),
        };

        if claimed >= worker_count.get() {
            return Ok(worker_id);
        }

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(ClaimError::Timeout {
                waited,
                worker_count: worker_count.get(),
            });
        }

        debug!(worker_id, claimed, "waiting for remaining workers to claim an id");
        thread::sleep(ROLL_CALL_INTERVAL);
    }
}

fn acquire_claim_lock(
    shared: &SharedDir,
    started: Instant,
    timeout: Duration,
    worker_count: NonZero<usize>,
) -> std::result::Result<(), ClaimError> {
    let path = shared.claim_lock_path();

    loop {
        match shared.storage().create_exclusive(&path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(source) => return Err(ClaimError::Io { path, source }),
        }

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(ClaimError::Timeout {
                waited,
                worker_count: worker_count.get(),
            });
        }

        thread::sleep(LOCK_RETRY_INTERVAL);
    }
}

fn release_claim_lock(shared: SharedDir) {
    let path = shared.claim_lock_path();

    // Nothing sensible can be done about a lock we cannot remove; the peers will time out.
    if let Err(e) = shared.storage().remove(&path) {
        tracing::error!(path = %path.display(), error = %e, "cannot release claim lock");
    }
}

fn read_claim_counter(shared: &SharedDir) -> std::result::Result<Option<usize>, ClaimError> {
    let path = shared.claim_counter_path();
    let mut buf = [0_u8; CLAIM_COUNTER_MAX_LEN];

    let read = match shared.storage().read_into(&path, &mut buf) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ClaimError::Io { path, source }),
    };

    let text = buf.get(..read).unwrap_or_default();
    let text = String::from_utf8_lossy(text);

    text.trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ClaimError::Corrupt {
            path,
            contents: text.into_owned(),
        })
}

fn write_claim_counter(shared: &SharedDir, next: usize) -> std::result::Result<(), ClaimError> {
    let path = shared.claim_counter_path();

    shared
        .storage()
        .overwrite(&path, next.to_string().as_bytes(), true)
        .map_err(|source| ClaimError::Io { path, source })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Arc, Barrier as ThreadBarrier};

    use super::*;
    use crate::pal::{MockStorage, StorageFacade};

    const GENEROUS: Duration = Duration::from_secs(10);

    #[test]
    fn lone_worker_claims_zero() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());

        let id = claim_worker_id(&shared, NonZero::new(1).unwrap(), GENEROUS).unwrap();

        assert_eq!(id, 0);
        assert_eq!(read_claim_counter(&shared).unwrap(), Some(1));
        assert!(!shared.claim_lock_path().exists());
    }

    #[test]
    fn first_claimer_prepares_shared_dir() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());

        // Leftovers of an earlier run.
        shared.write_stage(0, 99).unwrap();
        shared.write_stage(1, 99).unwrap();
        std::fs::write(shared.mailbox_path(1), b"stale").unwrap();

        claim_worker_id(&shared, NonZero::new(1).unwrap(), GENEROUS).unwrap();

        assert_eq!(shared.read_stage(0), Some(0));
        // Only the workers of this run are reset.
        assert_eq!(shared.read_stage(1), Some(99));
        assert!(shared.mailbox_path(1).exists());
    }

    #[test]
    fn concurrent_claimers_get_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());
        let worker_count = NonZero::new(4).unwrap();
        let start = Arc::new(ThreadBarrier::new(worker_count.get()));

        let handles: Vec<_> = (0..worker_count.get())
            .map(|_| {
                let shared = shared.clone();
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    claim_worker_id(&shared, worker_count, GENEROUS).unwrap()
                })
            })
            .collect();

        let mut ids: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();

        assert_eq!(ids, vec![0, 1, 2, 3]);
        for worker in 0..worker_count.get() {
            assert_eq!(shared.read_stage(worker), Some(0));
        }
    }

    #[test]
    fn excess_claimer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());
        let worker_count = NonZero::new(1).unwrap();

        claim_worker_id(&shared, worker_count, GENEROUS).unwrap();
        let error = claim_worker_id(&shared, worker_count, GENEROUS).unwrap_err();

        assert!(matches!(
            error,
            ClaimError::OutOfRange {
                worker_id: 1,
                worker_count: 1
            }
        ));
    }

    #[test]
    fn missing_workers_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());

        let error =
            claim_worker_id(&shared, NonZero::new(2).unwrap(), Duration::from_millis(50))
                .unwrap_err();

        assert!(matches!(error, ClaimError::Timeout { worker_count: 2, .. }));
        assert!(!shared.claim_lock_path().exists());
    }

    #[test]
    fn held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());
        std::fs::write(shared.claim_lock_path(), b"").unwrap();

        let error =
            claim_worker_id(&shared, NonZero::new(1).unwrap(), Duration::from_millis(20))
                .unwrap_err();

        assert!(matches!(error, ClaimError::Timeout { .. }));
        // Somebody else's lock is left alone.
        assert!(shared.claim_lock_path().exists());
    }

    #[test]
    fn corrupt_counter_is_reported() {
        let mut mock = MockStorage::new();
        mock.expect_create_exclusive().returning(|_| Ok(()));
        mock.expect_remove().returning(|_| Ok(()));
        mock.expect_read_into().returning(|_, buf| {
            buf[..3].copy_from_slice(b"two");
            Ok(3)
        });

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        let error = claim_worker_id(&shared, NonZero::new(2).unwrap(), GENEROUS).unwrap_err();

        assert!(matches!(error, ClaimError::Corrupt { ref contents, .. } if contents == "two"));
    }

    #[test]
    fn lock_is_released_on_failure() {
        let mut mock = MockStorage::new();
        mock.expect_create_exclusive().times(1).returning(|_| Ok(()));
        mock.expect_read_into()
            .returning(|_, _| Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        mock.expect_remove()
            .withf(|path| path.ends_with("worker_num_sync.lock"))
            .times(1)
            .returning(|_| Ok(()));

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        let error = claim_worker_id(&shared, NonZero::new(2).unwrap(), GENEROUS).unwrap_err();

        assert!(matches!(error, ClaimError::Io { .. }));
    }

    #[test]
    fn prepare_resets_every_worker() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());

        shared.write_stage(2, 7).unwrap();
        std::fs::write(shared.mailbox_path(0), b"stale").unwrap();

        prepare_shared_dir(&shared, NonZero::new(3).unwrap()).unwrap();

        for worker in 0..3 {
            assert_eq!(shared.read_stage(worker), Some(0));
            assert!(!shared.mailbox_path(worker).exists());
        }
    }
}
