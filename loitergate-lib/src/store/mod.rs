//! Cross-process counter store backed by a small fixed-layout file.
//!
//! Every worker process attaches to the same region through a stable
//! filesystem path. All access, read or write, happens under one exclusive
//! advisory lock (see [`lock`]), which linearizes mutations from independent
//! processes and removes torn-read risk entirely.

mod layout;
mod lock;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

pub use layout::{CounterField, RegionCounts, REGION_SIZE};
pub use lock::with_lock;

use crate::error::{LoiterError, Result};

/// Handle on the shared counter region.
///
/// Each process opens its own handle via [`CounterStore::open_or_attach`];
/// handles from different processes coordinate purely through the advisory
/// lock on the backing file.
#[derive(Debug)]
pub struct CounterStore {
    file: File,
    path: PathBuf,
}

impl CounterStore {
    /// Create the region, or attach to it if some other process created it
    /// first.
    ///
    /// Creation is attempted exclusively; the winner zero-initializes all
    /// counters under the exclusive lock before releasing it, so no attacher
    /// can observe uninitialized bytes. On attach, the existing region's size
    /// is compared against [`REGION_SIZE`]: any mismatch is a fatal
    /// [`LoiterError::SizeMismatch`] — there is no in-place migration, the
    /// operator must remove the stale region first.
    pub fn open_or_attach<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let (file, created) = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => (file, true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new().read(true).write(true).open(&path)?;
                (file, false)
            }
            Err(err) => return Err(err.into()),
        };

        let store = Self { file, path };
        store.ensure_initialized()?;
        if created {
            debug!(path = %store.path.display(), "created counter region");
        } else {
            debug!(path = %store.path.display(), "attached to existing counter region");
        }
        Ok(store)
    }

    /// Zero-initialize the region if nobody has yet, under the exclusive
    /// lock.
    ///
    /// The creator holds a zero-length file until its first write; a sibling
    /// that attaches in that window initializes the region itself, and the
    /// zero-fill is idempotent because no counter update can interleave
    /// without the lock. Any other length is a stale region from a different
    /// layout.
    fn ensure_initialized(&self) -> Result<()> {
        with_lock(&self.file, || {
            match self.file.metadata()?.len() {
                REGION_SIZE => Ok(()),
                0 => {
                    let zeros = [0u8; REGION_SIZE as usize];
                    write_region(&self.file, &zeros)?;
                    self.file.sync_all()?;
                    Ok(())
                }
                actual => Err(LoiterError::SizeMismatch {
                    path: self.path.clone(),
                    expected: REGION_SIZE,
                    actual,
                }),
            }
        })
    }

    /// Copy all three counters out under the exclusive lock.
    ///
    /// The same lock used for writes is taken here; the region is small
    /// enough that write-locking every read is acceptable.
    pub fn read_counts(&self) -> Result<RegionCounts> {
        with_lock(&self.file, || {
            let buf = read_region(&self.file)?;
            Ok(RegionCounts::decode(&buf))
        })
    }

    /// Apply a signed delta to one counter under the exclusive lock.
    ///
    /// Saturates at zero on underflow and at `u32::MAX` on overflow; a delta
    /// of zero is a no-op that still succeeds. Fails only on lock or I/O
    /// failure.
    pub fn adjust(&self, field: CounterField, delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }

        with_lock(&self.file, || {
            let mut buf = read_region(&self.file)?;
            let offset = field.offset();
            let current = layout::read_u32(&buf, offset);
            let updated = apply_delta(current, delta);
            layout::write_u32(&mut buf, offset, updated);
            write_region(&self.file, &buf)?;
            trace!(?field, delta, current, updated, "adjusted counter");
            Ok(())
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the backing region entirely.
    ///
    /// Must be invoked by exactly one authority, the process owning the whole
    /// server's lifetime; sibling handles still open after this point will
    /// fail on their next operation. Ownership is the caller's check (see
    /// [`crate::engine::ProcessRole`]), not a reference count, because
    /// reference counting across independent processes that may crash is not
    /// reliable.
    pub fn destroy(self) -> Result<()> {
        debug!(path = %self.path.display(), "destroying counter region");
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

fn apply_delta(current: u32, delta: i64) -> u32 {
    let next = i64::from(current) + delta;
    if next < 0 {
        0
    } else if next > i64::from(u32::MAX) {
        u32::MAX
    } else {
        next as u32
    }
}

fn read_region(mut file: &File) -> Result<[u8; REGION_SIZE as usize]> {
    let mut buf = [0u8; REGION_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_region(mut file: &File, buf: &[u8; REGION_SIZE as usize]) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta_saturates_at_zero() {
        assert_eq!(apply_delta(3, -5), 0);
        assert_eq!(apply_delta(0, -1), 0);
        assert_eq!(apply_delta(5, -5), 0);
    }

    #[test]
    fn test_apply_delta_saturates_at_max() {
        assert_eq!(apply_delta(u32::MAX, 1), u32::MAX);
        assert_eq!(apply_delta(u32::MAX - 1, 5), u32::MAX);
    }

    #[test]
    fn test_apply_delta_signed_range() {
        assert_eq!(apply_delta(10, 1), 11);
        assert_eq!(apply_delta(10, -1), 9);
    }
}
