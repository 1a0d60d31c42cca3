use std::num::NonZero;
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Environment variable holding the worker identity.
pub const WORKER_ID_VAR: &str = "WORKER_NUMBER";

/// Environment variable holding the number of cooperating workers.
pub const WORKER_COUNT_VAR: &str = "NUMBER_OF_WORKERS";

/// Environment variable holding the shared storage path.
pub const SHARED_PATH_VAR: &str = "TMP_PATH";

/// Number of rounds a worker runs unless told otherwise.
pub const DEFAULT_ROUNDS: usize = 100;

/// Number of mailbox elements per worker unless told otherwise.
pub const DEFAULT_PARTITION_SIZE: NonZero<usize> = NonZero::new(4_096_000).unwrap();

/// What the launcher told this process about the run, before a worker identity is settled.
///
/// The worker identity is optional here because it may instead be claimed through the shared
/// storage (see [`claim_worker_id()`][crate::claim_worker_id]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunEnvironment {
    worker_id: Option<usize>,
    worker_count: NonZero<usize>,
    shared_path: PathBuf,
}

impl RunEnvironment {
    /// Reads the run environment from the variables of the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker count or shared path is missing or invalid, or if a
    /// worker identity is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the run environment through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env()`][Self::from_env].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let worker_count = parse_var(&lookup, WORKER_COUNT_VAR)?;
        let worker_count = NonZero::new(worker_count).ok_or_else(|| ConfigError::Invalid {
            name: WORKER_COUNT_VAR,
            value: worker_count.to_string(),
            problem: "at least one worker is required".to_string(),
        })?;

        let worker_id = match lookup(WORKER_ID_VAR) {
            Some(_) => Some(parse_var(&lookup, WORKER_ID_VAR)?),
            None => None,
        };

        let shared_path = lookup(SHARED_PATH_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing {
                name: SHARED_PATH_VAR,
            })?;

        if !shared_path.is_dir() {
            return Err(ConfigError::NotADirectory { path: shared_path });
        }

        Ok(Self {
            worker_id,
            worker_count,
            shared_path,
        })
    }

    /// The worker identity assigned by the launcher, if any.
    #[must_use]
    pub fn worker_id(&self) -> Option<usize> {
        self.worker_id
    }

    /// The number of cooperating workers.
    #[must_use]
    pub fn worker_count(&self) -> NonZero<usize> {
        self.worker_count
    }

    /// The shared storage path.
    #[must_use]
    pub fn shared_path(&self) -> &Path {
        &self.shared_path
    }

    /// Settles the worker identity using the one assigned by the launcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the launcher did not assign an identity or it is out of range.
    pub fn into_worker_config(self) -> Result<WorkerConfig, ConfigError> {
        let worker_id = self.worker_id.ok_or(ConfigError::Missing {
            name: WORKER_ID_VAR,
        })?;

        WorkerConfig::new(worker_id, self.worker_count, self.shared_path)
    }

    /// Settles the worker identity using one obtained elsewhere, ignoring any assigned one.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is out of range.
    pub fn with_worker_id(self, worker_id: usize) -> Result<WorkerConfig, ConfigError> {
        WorkerConfig::new(worker_id, self.worker_count, self.shared_path)
    }
}

/// Identity of one worker within a run, immutable for the lifetime of the process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerConfig {
    worker_id: usize,
    worker_count: NonZero<usize>,
    shared_path: PathBuf,
}

impl WorkerConfig {
    /// Creates a worker configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `worker_id` is not in `[0, worker_count)`.
    pub fn new(
        worker_id: usize,
        worker_count: NonZero<usize>,
        shared_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if worker_id >= worker_count.get() {
            return Err(ConfigError::WorkerIdOutOfRange {
                worker_id,
                worker_count: worker_count.get(),
            });
        }

        Ok(Self {
            worker_id,
            worker_count,
            shared_path: shared_path.into(),
        })
    }

    /// The identity of this worker.
    #[must_use]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// The number of cooperating workers.
    #[must_use]
    pub fn worker_count(&self) -> NonZero<usize> {
        self.worker_count
    }

    /// The shared storage path.
    #[must_use]
    pub fn shared_path(&self) -> &Path {
        &self.shared_path
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<usize, ConfigError> {
    let value = lookup(name).ok_or(ConfigError::Missing { name })?;

    value
        .trim()
        .parse::<usize>()
        .map_err(|e| ConfigError::Invalid {
            name,
            value: value.clone(),
            problem: e.to_string(),
        })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(
        vars: &'a [(&'a str, String)],
    ) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, String> = vars.iter().cloned().collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_complete_environment() {
        let dir = tempfile::tempdir().unwrap();
        let vars = [
            (WORKER_ID_VAR, "1".to_string()),
            (WORKER_COUNT_VAR, "3".to_string()),
            (SHARED_PATH_VAR, dir.path().display().to_string()),
        ];

        let env = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(env.worker_id(), Some(1));
        assert_eq!(env.worker_count().get(), 3);
        assert_eq!(env.shared_path(), dir.path());

        let config = env.into_worker_config().unwrap();
        assert_eq!(config.worker_id(), 1);
    }

    #[test]
    fn worker_id_is_optional_until_settled() {
        let dir = tempfile::tempdir().unwrap();
        let vars = [
            (WORKER_COUNT_VAR, "2".to_string()),
            (SHARED_PATH_VAR, dir.path().display().to_string()),
        ];

        let env = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(env.worker_id(), None);

        let error = env.clone().into_worker_config().unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Missing {
                name: WORKER_ID_VAR
            }
        ));

        let config = env.with_worker_id(1).unwrap();
        assert_eq!(config.worker_id(), 1);
    }

    #[test]
    fn missing_worker_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vars = [
            (WORKER_ID_VAR, "0".to_string()),
            (SHARED_PATH_VAR, dir.path().display().to_string()),
        ];

        let error = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap_err();

        assert!(matches!(
            error,
            ConfigError::Missing {
                name: WORKER_COUNT_VAR
            }
        ));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vars = [
            (WORKER_COUNT_VAR, "0".to_string()),
            (SHARED_PATH_VAR, dir.path().display().to_string()),
        ];

        let error = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap_err();

        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: WORKER_COUNT_VAR,
                ..
            }
        ));
    }

    #[test]
    fn garbage_worker_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vars = [
            (WORKER_ID_VAR, "first".to_string()),
            (WORKER_COUNT_VAR, "2".to_string()),
            (SHARED_PATH_VAR, dir.path().display().to_string()),
        ];

        let error = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap_err();

        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: WORKER_ID_VAR,
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_worker_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vars = [
            (WORKER_ID_VAR, "2".to_string()),
            (WORKER_COUNT_VAR, "2".to_string()),
            (SHARED_PATH_VAR, dir.path().display().to_string()),
        ];

        let env = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap();
        let error = env.into_worker_config().unwrap_err();

        assert!(matches!(
            error,
            ConfigError::WorkerIdOutOfRange {
                worker_id: 2,
                worker_count: 2
            }
        ));
    }

    #[test]
    fn shared_path_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let vars = [
            (WORKER_COUNT_VAR, "2".to_string()),
            (SHARED_PATH_VAR, missing.display().to_string()),
        ];

        let error = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap_err();

        assert!(matches!(error, ConfigError::NotADirectory { path } if path == missing));
    }

    #[test]
    fn empty_shared_path_is_missing() {
        let vars = [
            (WORKER_COUNT_VAR, "2".to_string()),
            (SHARED_PATH_VAR, String::new()),
        ];

        let error = RunEnvironment::from_lookup(lookup_from(&vars)).unwrap_err();

        assert!(matches!(
            error,
            ConfigError::Missing {
                name: SHARED_PATH_VAR
            }
        ));
    }
}
