//! The memory-mapped file backing a live mapping.
//!
//! [`MappedRegion`] owns the file mapping for the lifetime of a
//! `Client::start` .. `Client::stop` window. During `start` the block writers
//! fill the whole image through a [`ByteWriter`]; afterwards, value updaters
//! keep writing into their own slots from whichever thread mutates the
//! metric.
//!
//! Concurrent access is sound because every writer owns a disjoint byte
//! range: the layout engine assigns each value slot and string cell exactly
//! once, and a metric's own lock serializes writes to its slot. Readers are
//! in another process entirely and are expected to retry on generation
//! mismatch, so no read-side synchronization exists here by design of the
//! file format.

use std::cell::UnsafeCell;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr;

use memmap2::{MmapMut, MmapOptions};

use crate::error::{Error, Result};

/// A fixed-length, shared, memory-mapped byte region.
pub(crate) struct MappedRegion {
    /// Keeps the mapping alive; all byte access goes through `base`.
    map: UnsafeCell<MmapMut>,
    base: *mut u8,
    len: usize,
    path: PathBuf,
}

// SAFETY: the raw base pointer refers to a MAP_SHARED mapping that lives as
// long as `map`; the region itself hands out no references, only copies bytes
// in `write_at` under the caller's disjointness contract.
unsafe impl Send for MappedRegion {}
// SAFETY: see `Send`; `write_at` callers guarantee disjoint ranges, and
// `flush` only reads the mapping handle.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Creates (or replaces) the file at `path`, sizes it to `len` bytes of
    /// zeroes and maps it shared.
    pub(crate) fn create(path: &Path, len: usize) -> Result<Self> {
        let backing = |operation: &'static str| {
            let path = path.to_path_buf();
            move |source: std::io::Error| Error::Backing {
                operation,
                path,
                source,
            }
        };

        // A previous mapping with the same name is replaced wholesale.
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(backing("replace")(e)),
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(backing("create directory for"))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(backing("create"))?;

        let size_and_map = || {
            file.set_len(len as u64).map_err(backing("resize"))?;

            // SAFETY: the file was just created with this exact length and
            // stays open solely for this mapping; no other mutable mapping
            // exists in this process.
            unsafe {
                MmapOptions::new()
                    .len(len)
                    .map_mut(&file)
                    .map_err(backing("map"))
            }
        };

        let mut map = match size_and_map() {
            Ok(map) => map,
            Err(error) => {
                // Leave nothing half-initialized behind for a reader to find.
                let _ = fs::remove_file(path);
                return Err(error);
            }
        };

        let base = map.as_mut_ptr();

        Ok(Self {
            map: UnsafeCell::new(map),
            base,
            len,
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Copies `bytes` into the region at `offset`.
    ///
    /// # Safety
    ///
    /// `offset + bytes.len()` must not exceed [`len`](Self::len), and no
    /// other thread may concurrently write an overlapping range. The layout
    /// engine's slot assignment plus the per-metric locks uphold this for all
    /// call sites.
    pub(crate) unsafe fn write_at(&self, offset: usize, bytes: &[u8]) {
        debug_assert!(
            offset + bytes.len() <= self.len,
            "write range was checked against the layout before reaching the region",
        );

        // SAFETY: in-bounds per the caller contract; disjointness rules out
        // overlapping concurrent access.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(offset), bytes.len());
        }
    }

    /// Flushes outstanding dirty pages to the file.
    pub(crate) fn flush(&self) -> Result<()> {
        // SAFETY: flush takes the mapping by shared reference and does not
        // touch the mapped bytes.
        let map = unsafe { &*self.map.get() };

        map.flush().map_err(|source| Error::Backing {
            operation: "flush",
            path: self.path.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// [`ByteSink`](crate::bytewriter::ByteSink) access to a shared region, used
/// by the block writers while filling the image.
#[derive(Debug)]
pub(crate) struct RegionSink {
    region: std::sync::Arc<MappedRegion>,
}

impl RegionSink {
    pub(crate) fn new(region: std::sync::Arc<MappedRegion>) -> Self {
        Self { region }
    }
}

impl crate::bytewriter::ByteSink for RegionSink {
    fn sink_len(&self) -> usize {
        self.region.len()
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        // SAFETY: the ByteWriter bounds-checked the range, and during the
        // fill the only other writers are value updaters whose slots were
        // already filled and left behind by this cursor.
        unsafe {
            self.region.write_at(offset, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(MappedRegion: Send, Sync);

    #[test]
    fn create_produces_a_zeroed_file_of_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        let region = MappedRegion::create(&path, 64).unwrap();
        assert_eq!(region.len(), 64);

        region.flush().unwrap();
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk, vec![0_u8; 64]);
    }

    #[test]
    fn writes_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        let region = MappedRegion::create(&path, 16).unwrap();
        // SAFETY: in bounds, single thread.
        unsafe {
            region.write_at(4, b"MMV\0");
        }
        region.flush().unwrap();

        let on_disk = fs::read(&path).unwrap();
        assert_eq!(&on_disk[4..8], b"MMV\0");
        assert_eq!(on_disk[0], 0);
    }

    #[test]
    fn create_replaces_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        fs::write(&path, b"stale contents that are longer than the region").unwrap();

        let region = MappedRegion::create(&path, 8).unwrap();
        region.flush().unwrap();

        assert_eq!(fs::read(&path).unwrap(), vec![0_u8; 8]);
    }

    #[test]
    fn concurrent_disjoint_writes_land() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region");

        let region = Arc::new(MappedRegion::create(&path, 64).unwrap());

        std::thread::scope(|s| {
            for i in 0_usize..8 {
                let region = Arc::clone(&region);
                s.spawn(move || {
                    // SAFETY: each thread owns its own 8-byte range.
                    unsafe {
                        region.write_at(i * 8, &(i as u64).to_le_bytes());
                    }
                });
            }
        });

        region.flush().unwrap();
        let on_disk = fs::read(&path).unwrap();
        for i in 0_usize..8 {
            assert_eq!(on_disk[i * 8], i as u8);
        }
    }
}
