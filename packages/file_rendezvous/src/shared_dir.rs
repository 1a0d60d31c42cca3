use std::io;
use std::path::{Path, PathBuf};

use crate::pal::{Storage, StorageFacade};
use crate::{RunError, error::Result};

/// Size of a stage counter file: exactly one native-sized signed integer.
pub const STAGE_COUNTER_LEN: usize = size_of::<i64>();

/// Size of one mailbox element.
pub const MAILBOX_ELEMENT_LEN: usize = size_of::<i64>();

const STAGE_COUNTER_PREFIX: &str = "barrier";
const MAILBOX_PREFIX: &str = "data";
const CLAIM_COUNTER_NAME: &str = "worker_num_sync";
const CLAIM_LOCK_NAME: &str = "worker_num_sync.lock";

/// The shared storage directory through which workers coordinate.
///
/// Each worker owns two files in here and writes nothing else:
///
/// * `barrier<id>` holds the worker's stage counter as one native-endian `i64`.
/// * `data<id>` holds the worker's mailbox as `partition_size` native-endian `i64`s.
///
/// Both are overwritten in place. There is no locking and no atomic rename, so a reader may
/// observe a file mid-write.
#[derive(Clone, Debug)]
pub struct SharedDir {
    root: PathBuf,
    storage: StorageFacade,
}

impl SharedDir {
    /// Uses an existing directory, visible to all workers, as the shared storage.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_storage(root, StorageFacade::target())
    }

    pub(crate) fn with_storage(root: impl Into<PathBuf>, storage: StorageFacade) -> Self {
        Self {
            root: root.into(),
            storage,
        }
    }

    /// The shared storage directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stage counter file owned by `worker`.
    #[must_use]
    pub fn stage_counter_path(&self, worker: usize) -> PathBuf {
        self.root.join(format!("{STAGE_COUNTER_PREFIX}{worker}"))
    }

    /// Path of the mailbox file owned by `worker`.
    #[must_use]
    pub fn mailbox_path(&self, worker: usize) -> PathBuf {
        self.root.join(format!("{MAILBOX_PREFIX}{worker}"))
    }

    pub(crate) fn claim_counter_path(&self) -> PathBuf {
        self.root.join(CLAIM_COUNTER_NAME)
    }

    pub(crate) fn claim_lock_path(&self) -> PathBuf {
        self.root.join(CLAIM_LOCK_NAME)
    }

    pub(crate) fn storage(&self) -> &StorageFacade {
        &self.storage
    }

    /// Overwrites the stage counter of `worker` with `stage`.
    pub(crate) fn write_stage(&self, worker: usize, stage: u64) -> Result<()> {
        let path = self.stage_counter_path(worker);
        let encoded = i64::try_from(stage).unwrap_or(i64::MAX).to_ne_bytes();

        self.storage
            .overwrite(&path, &encoded, false)
            .map_err(|source| RunError::Io { path, source })
    }

    /// Reads the stage counter of `worker`.
    ///
    /// Returns `None` if the counter cannot be observed in full right now: the file may be
    /// absent, unreadable or caught mid-write. Callers treat that the same as "not there yet".
    pub(crate) fn read_stage(&self, worker: usize) -> Option<u64> {
        let path = self.stage_counter_path(worker);
        let mut buf = [0_u8; STAGE_COUNTER_LEN];

        match self.storage.read_into(&path, &mut buf) {
            Ok(STAGE_COUNTER_LEN) => u64::try_from(i64::from_ne_bytes(buf)).ok(),
            Ok(_) | Err(_) => None,
        }
    }

    pub(crate) fn io_error(path: PathBuf) -> impl FnOnce(io::Error) -> RunError {
        move |source| RunError::Io { path, source }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io;

    use mockall::predicate::eq;

    use super::*;
    use crate::pal::MockStorage;

    #[test]
    fn files_are_named_after_owner() {
        let shared = SharedDir::new("/shared");

        assert_eq!(shared.stage_counter_path(3), Path::new("/shared/barrier3"));
        assert_eq!(shared.mailbox_path(12), Path::new("/shared/data12"));
    }

    #[test]
    fn stage_is_written_as_native_i64() {
        let mut mock = MockStorage::new();

        mock.expect_overwrite()
            .with(
                eq(PathBuf::from("/shared/barrier1")),
                eq(7_i64.to_ne_bytes().to_vec()),
                eq(false),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        shared.write_stage(1, 7).unwrap();
    }

    #[test]
    fn write_failure_names_the_file() {
        let mut mock = MockStorage::new();

        mock.expect_overwrite()
            .returning(|_, _, _| Err(io::Error::from(io::ErrorKind::PermissionDenied)));

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        let error = shared.write_stage(0, 1).unwrap_err();
        assert!(matches!(error, RunError::Io { ref path, .. } if path == Path::new("/shared/barrier0")));
    }

    #[test]
    fn complete_counter_is_observed() {
        let mut mock = MockStorage::new();

        mock.expect_read_into().returning(|_, buf| {
            buf.copy_from_slice(&5_i64.to_ne_bytes());
            Ok(STAGE_COUNTER_LEN)
        });

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        assert_eq!(shared.read_stage(0), Some(5));
    }

    #[test]
    fn torn_counter_is_not_observed() {
        let mut mock = MockStorage::new();

        mock.expect_read_into().returning(|_, buf| {
            // Only the first half of the value has landed.
            buf[..4].copy_from_slice(&5_i64.to_ne_bytes()[..4]);
            Ok(4)
        });

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        assert_eq!(shared.read_stage(0), None);
    }

    #[test]
    fn missing_counter_is_not_observed() {
        let mut mock = MockStorage::new();

        mock.expect_read_into()
            .returning(|_, _| Err(io::Error::from(io::ErrorKind::NotFound)));

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        assert_eq!(shared.read_stage(0), None);
    }

    #[test]
    fn negative_counter_is_not_observed() {
        let mut mock = MockStorage::new();

        mock.expect_read_into().returning(|_, buf| {
            buf.copy_from_slice(&(-1_i64).to_ne_bytes());
            Ok(STAGE_COUNTER_LEN)
        });

        let shared = SharedDir::with_storage("/shared", StorageFacade::from_mock(mock));

        assert_eq!(shared.read_stage(0), None);
    }

    #[test]
    fn real_storage_round_trips_stage() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedDir::new(dir.path());

        assert_eq!(shared.read_stage(0), None);

        shared.write_stage(0, 42).unwrap();
        assert_eq!(shared.read_stage(0), Some(42));

        let raw = std::fs::read(shared.stage_counter_path(0)).unwrap();
        assert_eq!(raw, 42_i64.to_ne_bytes());
    }
}
