// Real storage implementation that delegates to std::fs.
//
// This is a thin forwarder to system APIs and is excluded from coverage and mutation testing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::pal::Storage;

/// Storage backed by whatever filesystem the shared path lives on.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetStorage;

// Trivial forwarder to system APIs - not worth testing.
#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg_attr(test, mutants::skip)]
impl Storage for BuildTargetStorage {
    fn overwrite(&self, path: &Path, contents: &[u8], sync: bool) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(contents)?;

        if sync {
            file.sync_data()?;
        }

        Ok(())
    }

    fn read_into(&self, path: &Path, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = File::open(path)?;
        let mut filled = 0;

        while let Some(remaining) = buf.get_mut(filled..) {
            if remaining.is_empty() {
                break;
            }

            match file.read(remaining) {
                Ok(0) => break,
                Ok(n) => filled = filled.saturating_add(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }

    fn create_exclusive(&self, path: &Path) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(drop)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
