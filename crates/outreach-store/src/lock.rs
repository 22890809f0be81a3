//! Advisory file locks shared by every process that opens the same store.
//!
//! On unix these are `flock(2)` locks: released when the guard drops or the
//! process dies, so a crash never leaves the store wedged. Elsewhere only the
//! in-process mutex applies.

use crate::error::{StoreError, StoreResult};
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// Held exclusive lock on one lock file.
pub(crate) struct FileLock {
    #[cfg(unix)]
    _flock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl FileLock {
    /// Block until the lock is ours.
    pub(crate) fn exclusive(path: &Path) -> StoreResult<Self> {
        let file = open_lock_file(path)?;
        Self::lock(path, file, false)?.ok_or_else(|| StoreError::Busy {
            path: path.to_path_buf(),
        })
    }

    /// Take the lock if nobody holds it.
    pub(crate) fn try_exclusive(path: &Path) -> StoreResult<Option<Self>> {
        let file = open_lock_file(path)?;
        Self::lock(path, file, true)
    }

    #[cfg(unix)]
    fn lock(path: &Path, file: File, nonblocking: bool) -> StoreResult<Option<Self>> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let arg = if nonblocking {
            FlockArg::LockExclusiveNonblock
        } else {
            FlockArg::LockExclusive
        };
        match Flock::lock(file, arg) {
            Ok(flock) => Ok(Some(Self { _flock: flock })),
            Err((_, errno)) if nonblocking && errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(StoreError::io(path, std::io::Error::from(errno))),
        }
    }

    #[cfg(not(unix))]
    fn lock(_path: &Path, file: File, _nonblocking: bool) -> StoreResult<Option<Self>> {
        Ok(Some(Self { _file: file }))
    }
}

fn open_lock_file(path: &Path) -> StoreResult<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|err| StoreError::io(path, err))
}
