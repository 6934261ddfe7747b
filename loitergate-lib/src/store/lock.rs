//! Advisory locking for the shared counter region.
//!
//! A single exclusive whole-file lock is used for both reads and writes.
//! This sacrifices read parallelism for strict consistency, which is
//! acceptable because the region is twelve bytes and hold times are
//! microseconds.

use std::fs::File;
use std::io;
use std::time::Duration;

use fs2::FileExt;
use tracing::trace;

use crate::error::{LoiterError, Result};

/// Give up on a contended lock after this many attempts. Admission decisions
/// must never hang a connection acceptor.
const MAX_ATTEMPTS: u32 = 10;

/// Sleep between contended attempts.
const RETRY_DELAY: Duration = Duration::from_millis(5);

/// Run `body` while holding the exclusive advisory lock on `file`.
///
/// Acquisition retries on contention up to [`MAX_ATTEMPTS`] times, then fails
/// with [`LoiterError::LockTimeout`]. Any other lock error propagates
/// immediately. The lock is released on every exit path, including an error
/// return from `body`.
pub fn with_lock<T>(file: &File, body: impl FnOnce() -> Result<T>) -> Result<T> {
    acquire(file)?;
    let guard = UnlockGuard { file };
    let result = body();
    drop(guard);
    result
}

fn acquire(file: &File) -> Result<()> {
    let mut attempts = 1;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                trace!(attempts, "acquired exclusive lock on counter region");
                return Ok(());
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                if attempts >= MAX_ATTEMPTS {
                    return Err(LoiterError::LockTimeout { attempts });
                }
                trace!(attempts, "counter region lock contended, retrying");
                attempts += 1;
                std::thread::sleep(RETRY_DELAY);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

struct UnlockGuard<'a> {
    file: &'a File,
}

impl Drop for UnlockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = fs2::FileExt::unlock(self.file) {
            trace!(%err, "failed to release counter region lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoiterError;

    #[test]
    fn test_lock_released_after_closure_error() {
        let file = tempfile::tempfile().unwrap();
        let result: Result<()> =
            with_lock(&file, || Err(LoiterError::Config("boom".into())));
        assert!(result.is_err());

        // A second acquisition on an independent handle would block forever
        // if the first one leaked; re-locking the same handle at least
        // verifies the unlock path ran without error.
        with_lock(&file, || Ok(())).unwrap();
    }

    #[test]
    fn test_contended_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");
        let holder = std::fs::File::create(&path).unwrap();
        holder.lock_exclusive().unwrap();

        let other = std::fs::File::open(&path).unwrap();
        match with_lock(&other, || Ok(())) {
            Err(LoiterError::LockTimeout { attempts }) => assert_eq!(attempts, 10),
            other => panic!("expected lock timeout, got {other:?}"),
        }
        fs2::FileExt::unlock(&holder).unwrap();
    }
}
