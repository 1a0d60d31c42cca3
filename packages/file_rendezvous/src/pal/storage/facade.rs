// Facade that dispatches to either the real storage or a mock in tests.

use std::io;
use std::path::Path;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::pal::MockStorage;
use crate::pal::{BuildTargetStorage, Storage};

/// Facade over shared storage operations, dispatching to the real or mock implementation.
#[derive(Clone)]
pub(crate) enum StorageFacade {
    Target(&'static BuildTargetStorage),

    #[cfg(test)]
    Mock(Arc<MockStorage>),
}

// Debug implementations have no API contract to test.
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg_attr(test, mutants::skip)]
impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(_) => f.debug_struct("StorageFacade::Target").finish(),
            #[cfg(test)]
            Self::Mock(_) => f.debug_struct("StorageFacade::Mock").finish(),
        }
    }
}

static BUILD_TARGET_STORAGE: BuildTargetStorage = BuildTargetStorage;

// Facade types are trivial pass-through layers - not worth testing.
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg_attr(test, mutants::skip)]
impl StorageFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BUILD_TARGET_STORAGE)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockStorage) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

// Facade types are trivial pass-through layers - not worth testing.
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg_attr(test, mutants::skip)]
impl Storage for StorageFacade {
    fn overwrite(&self, path: &Path, contents: &[u8], sync: bool) -> io::Result<()> {
        match self {
            Self::Target(s) => s.overwrite(path, contents, sync),
            #[cfg(test)]
            Self::Mock(mock) => mock.overwrite(path, contents, sync),
        }
    }

    fn read_into(&self, path: &Path, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Target(s) => s.read_into(path, buf),
            #[cfg(test)]
            Self::Mock(mock) => mock.read_into(path, buf),
        }
    }

    fn create_exclusive(&self, path: &Path) -> io::Result<()> {
        match self {
            Self::Target(s) => s.create_exclusive(path),
            #[cfg(test)]
            Self::Mock(mock) => mock.create_exclusive(path),
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match self {
            Self::Target(s) => s.remove(path),
            #[cfg(test)]
            Self::Mock(mock) => mock.remove(path),
        }
    }
}

// Facade types are trivial pass-through layers - not worth testing.
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg_attr(test, mutants::skip)]
impl Default for StorageFacade {
    fn default() -> Self {
        Self::target()
    }
}
