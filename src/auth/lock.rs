// src/auth/lock.rs

//! Cross-process advisory lock on a lock file.
//!
//! On unix this is `flock(LOCK_EX)` on a 0600 file; the lock is released
//! when the guard drops (or the process dies). A lock only counts if the
//! locked inode is still the one at the lock path, so a file unlinked by
//! [`FileLock::unlink`] can never be held by two processes at once.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// How often a contended lock is retried.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Attempts per `try_acquire` when the lock file is swapped under us.
const REOPEN_ATTEMPTS: usize = 3;

/// Held exclusive lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Try once. `Ok(None)` means another holder has it.
    pub fn try_acquire(path: &Path) -> io::Result<Option<FileLock>> {
        for _ in 0..REOPEN_ATTEMPTS {
            let file = open_lock_file(path)?;
            if !sys::try_lock(&file)? {
                return Ok(None);
            }
            if sys::is_current(&file, path)? {
                trace!(path = ?path, "lock acquired");
                return Ok(Some(FileLock {
                    file,
                    path: path.to_path_buf(),
                }));
            }
            // Locked an inode that was unlinked after we opened it.
            debug!(path = ?path, "lock file replaced while locking; reopening");
            drop(file);
        }
        Ok(None)
    }

    /// Retry until acquired or `timeout` elapses (`ErrorKind::TimedOut`).
    pub async fn acquire(path: &Path, timeout: Duration) -> io::Result<FileLock> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out waiting for lock {}", path.display()),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file while still holding it, then release.
    pub fn unlink(self) -> io::Result<()> {
        fs::remove_file(&self.path)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = sys::unlock(&self.file) {
            debug!(path = ?self.path, error = %e, "failed to release lock");
        }
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

#[cfg(unix)]
mod sys {
    use std::fs::{self, File};
    use std::io;
    use std::os::unix::fs::MetadataExt;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    pub fn try_lock(file: &File) -> io::Result<bool> {
        // SAFETY: the fd is owned by `file` and valid for the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Ok(false)
        } else {
            Err(err)
        }
    }

    pub fn unlock(file: &File) -> io::Result<()> {
        // SAFETY: as above.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// `file` is still the inode found at `path`.
    pub fn is_current(file: &File, path: &Path) -> io::Result<bool> {
        let held = file.metadata()?;
        match fs::metadata(path) {
            Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;
    use std::path::Path;

    pub fn try_lock(file: &File) -> io::Result<bool> {
        match file.try_lock() {
            Ok(()) => Ok(true),
            Err(std::fs::TryLockError::WouldBlock) => Ok(false),
            Err(std::fs::TryLockError::Error(e)) => Err(e),
        }
    }

    pub fn unlock(file: &File) -> io::Result<()> {
        file.unlock()
    }

    /// Open files cannot be deleted here, so the path always names `file`.
    pub fn is_current(_file: &File, _path: &Path) -> io::Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_file_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.lock");

        let first = FileLock::try_acquire(&path).unwrap().expect("first lock");
        assert!(FileLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(FileLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn unlinked_lock_file_is_recreated_by_the_next_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.lock");

        let first = FileLock::try_acquire(&path).unwrap().expect("first lock");
        first.unlink().unwrap();
        assert!(!path.exists());

        let second = FileLock::try_acquire(&path).unwrap().expect("second lock");
        assert!(path.exists());
        assert!(FileLock::try_acquire(&path).unwrap().is_none());
        drop(second);
    }

    #[tokio::test]
    async fn acquire_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.lock");
        let _held = FileLock::try_acquire(&path).unwrap().unwrap();

        let err = FileLock::acquire(&path, Duration::from_millis(80))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
