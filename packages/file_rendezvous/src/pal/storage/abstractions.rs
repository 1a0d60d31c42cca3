use std::fmt::Debug;
use std::io;
use std::path::Path;

/// Operations the rendezvous protocol performs against shared storage.
///
/// Each operation opens, uses and closes the file again. Nothing is cached between calls
/// because the whole point is to observe what peers have written in the meantime.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Storage: Debug + Send + Sync + 'static {
    /// Truncates the file (creating it if needed) and writes `contents` with a single write.
    ///
    /// If `sync` is set, the data is flushed to the storage device before returning.
    fn overwrite(&self, path: &Path, contents: &[u8], sync: bool) -> io::Result<()>;

    /// Reads from the start of the file into `buf` until either the buffer is full or the
    /// end of the file is reached. Returns the number of bytes read.
    fn read_into(&self, path: &Path, buf: &mut [u8]) -> io::Result<usize>;

    /// Creates the file, failing with [`io::ErrorKind::AlreadyExists`] if it already exists.
    fn create_exclusive(&self, path: &Path) -> io::Result<()>;

    /// Removes the file. A file that does not exist is not an error.
    fn remove(&self, path: &Path) -> io::Result<()>;
}
