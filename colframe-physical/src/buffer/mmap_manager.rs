//! This module defines [MmapManager], which limits the number of live file mappings.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use lru::LruCache;
use once_cell::sync::Lazy;

use crate::{config::StorageConfig, error::Error};

use super::mapped::{is_resource_exhaustion, MappedRegion};

/// Global instance of the [MmapManager]
static GLOBAL_MANAGER: Lazy<Arc<MmapManager>> =
    Lazy::new(|| MmapManager::new(&StorageConfig::current()));

/// Source of unique region ids
static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(0);

/// Keeps track of all live mappings of file-backed buffers.
///
/// Operating systems limit the number of mappings a process may hold.
/// The manager caps the number of live mappings at [StorageConfig::max_mappings]
/// and, whenever mapping a file fails for lack of resources, unmaps the
/// least recently used region that is not in use right now and tries again,
/// at most [StorageConfig::mmap_retries] times.
///
/// Buffers use [MmapManager::global] unless they were created with an explicit manager.
pub struct MmapManager {
    max_mappings: usize,
    retries: usize,
    /// Serializes the creation of mappings.
    map_lock: Mutex<()>,
    /// Live mappings, ordered by their last access.
    table: Mutex<LruCache<u64, Weak<MappedRegion>>>,
}

impl MmapManager {
    /// Creates a new manager with the limits given in `config`.
    pub fn new(config: &StorageConfig) -> Arc<Self> {
        Arc::new(Self {
            max_mappings: config.max_mappings.max(1),
            retries: config.mmap_retries,
            map_lock: Mutex::new(()),
            table: Mutex::new(LruCache::unbounded()),
        })
    }

    /// Returns the process-wide manager, creating it from the current
    /// [StorageConfig] on first use.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_MANAGER)
    }

    pub(crate) fn next_id() -> u64 {
        NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_table(&self) -> MutexGuard<'_, LruCache<u64, Weak<MappedRegion>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of regions that are currently mapped.
    pub fn live_mappings(&self) -> usize {
        self.lock_table().len()
    }

    /// Returns the maximal number of live mappings.
    pub fn max_mappings(&self) -> usize {
        self.max_mappings
    }

    /// Unmaps every region that is not in use and returns how many were unmapped.
    ///
    /// The regions stay valid and are mapped again when accessed.
    pub fn evict_all(&self) -> usize {
        let mut count = 0;
        while self.evict_lru(None) {
            count += 1;
        }
        log::debug!("Evicted {count} mappings");
        count
    }

    /// Maps `region` unless it is mapped already.
    pub(crate) fn map_region(&self, region: &Arc<MappedRegion>) -> Result<(), Error> {
        let _serial = self.map_lock.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut state = region.lock_write();
            if state.size == 0 || state.is_mapped() {
                return Ok(());
            }

            self.with_retries(region.id(), || region.map_into(&mut state))?;
        }

        self.register(region);
        Ok(())
    }

    /// Calls `map` until it succeeds. If it fails for lack of resources,
    /// a region other than `id` is evicted before the next attempt.
    fn with_retries<F>(&self, id: u64, mut map: F) -> Result<(), Error>
    where
        F: FnMut() -> Result<(), Error>,
    {
        let mut attempt = 0;
        loop {
            match map() {
                Ok(()) => return Ok(()),
                Err(error) if is_resource_exhaustion(&error) && attempt < self.retries => {
                    attempt += 1;
                    log::debug!(
                        "Mapping region {id} failed ({error}), evicting (attempt {attempt}/{})",
                        self.retries
                    );
                    if !self.evict_lru(Some(id)) {
                        log::warn!("Mapping region {id} failed and no mapping can be evicted");
                        return Err(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Marks a mapped region as the most recently used one.
    pub(crate) fn touch(&self, id: u64) {
        self.lock_table().promote(&id);
    }

    /// Adds a freshly mapped region, evicting others if the cap is exceeded.
    fn register(&self, region: &Arc<MappedRegion>) {
        let live = {
            let mut table = self.lock_table();
            table.put(region.id(), Arc::downgrade(region));
            table.len()
        };

        let mut excess = live.saturating_sub(self.max_mappings);
        while excess > 0 && self.evict_lru(Some(region.id())) {
            excess -= 1;
        }
    }

    /// Forgets about a region that was unmapped or dropped.
    pub(crate) fn deregister(&self, id: u64) {
        self.lock_table().pop(&id);
    }

    /// Unmaps the least recently used region other than `except` that is not in use.
    /// Returns `false` if no region could be evicted.
    fn evict_lru(&self, except: Option<u64>) -> bool {
        // Regions are dropped only after the table is unlocked,
        // as dropping a region deregisters it.
        let mut upgraded = Vec::new();

        let evicted = {
            let mut table = self.lock_table();
            let candidates = table
                .iter()
                .rev()
                .map(|(&id, region)| (id, region.clone()))
                .collect::<Vec<_>>();

            let mut evicted = false;
            for (id, region) in candidates {
                if Some(id) == except {
                    continue;
                }

                match region.upgrade() {
                    None => {
                        table.pop(&id);
                    }
                    Some(region) => {
                        let success = region.try_evict();
                        upgraded.push(region);
                        if success {
                            table.pop(&id);
                            evicted = true;
                            break;
                        }
                    }
                }
            }

            evicted
        };

        drop(upgraded);
        evicted
    }
}

impl Debug for MmapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapManager")
            .field("max_mappings", &self.max_mappings)
            .field("retries", &self.retries)
            .field("live_mappings", &self.live_mappings())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::{io, path::PathBuf, sync::Arc};

    use test_log::test;

    use crate::{
        buffer::{buffer_impl::Storage, Buffer, TemporaryFile},
        config::StorageConfig,
        error::Error,
    };

    use super::{is_resource_exhaustion, MappedRegion, MmapManager};

    fn manager(max_mappings: usize, mmap_retries: usize) -> Arc<MmapManager> {
        MmapManager::new(&StorageConfig {
            max_mappings,
            mmap_retries,
            ..Default::default()
        })
    }

    fn region(buffer: &Buffer) -> &Arc<MappedRegion> {
        match &buffer.inner.storage {
            Storage::Mapped(region) => region,
            other => panic!("buffer is not mapped: {other:?}"),
        }
    }

    /// Creates `count` buffers of 8 bytes in a scratch file and maps all of them.
    fn mapped_buffers(
        manager: &Arc<MmapManager>,
        file: &Arc<TemporaryFile>,
        count: u64,
    ) -> Vec<Buffer> {
        let buffers = (0..count)
            .map(|i| Buffer::temporary_in(manager, file, &i.to_le_bytes()).unwrap())
            .collect::<Vec<_>>();
        for (i, buffer) in buffers.iter().enumerate() {
            assert_eq!(buffer.get_element::<u64>(0), i as u64);
        }
        buffers
    }

    fn exhausted() -> Error {
        Error::Mmap {
            error: io::Error::from(io::ErrorKind::OutOfMemory),
            path: PathBuf::from("exhausted.bin"),
            size: 8,
        }
    }

    #[test]
    fn exhaustion_is_recognized() {
        assert!(is_resource_exhaustion(&exhausted()));
        for code in [23, 24] {
            assert!(is_resource_exhaustion(&Error::Io {
                error: io::Error::from_raw_os_error(code),
                path: PathBuf::new(),
            }));
        }
        assert!(!is_resource_exhaustion(&Error::Io {
            error: io::Error::from(io::ErrorKind::NotFound),
            path: PathBuf::new(),
        }));
        assert!(!is_resource_exhaustion(&Error::Value(String::from("no mapping"))));
    }

    #[test]
    fn reading_refreshes_eviction_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemporaryFile::new_in(dir.path()).unwrap();
        let manager = manager(2, 3);

        let buffers = mapped_buffers(&manager, &file, 2);
        assert_eq!(buffers[0].get_element::<u64>(0), 0);

        let third = Buffer::temporary_in(&manager, &file, &2u64.to_le_bytes()).unwrap();
        assert_eq!(third.get_element::<u64>(0), 2);

        assert!(region(&buffers[0]).is_mapped());
        assert!(!region(&buffers[1]).is_mapped());
        assert!(region(&third).is_mapped());
        assert_eq!(manager.live_mappings(), 2);
    }

    #[test]
    fn pinned_mapping_may_exceed_cap() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemporaryFile::new_in(dir.path()).unwrap();
        let manager = manager(1, 3);

        let buffers = mapped_buffers(&manager, &file, 2);
        assert_eq!(manager.live_mappings(), 1);

        let pinned = buffers[0].rdata();
        assert_eq!(buffers[1].get_element::<u64>(0), 1);
        assert_eq!(manager.live_mappings(), 2);
        assert!(region(&buffers[0]).is_mapped());

        drop(pinned);
        assert_eq!(manager.evict_all(), 2);
        assert_eq!(buffers[0].get_element::<u64>(0), 0);
        assert_eq!(manager.live_mappings(), 1);
    }

    #[test]
    fn exhaustion_evicts_and_retries() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemporaryFile::new_in(dir.path()).unwrap();
        let manager = manager(16, 3);
        let buffers = mapped_buffers(&manager, &file, 4);
        assert_eq!(manager.live_mappings(), 4);

        let mut attempts = 0;
        let result = manager.with_retries(u64::MAX, || {
            attempts += 1;
            if attempts < 3 {
                Err(exhausted())
            } else {
                Ok(())
            }
        });
        assert!(result.is_ok());
        assert_eq!(attempts, 3);
        assert_eq!(manager.live_mappings(), 2);
        assert!(!region(&buffers[0]).is_mapped());
        assert!(!region(&buffers[1]).is_mapped());
        assert!(region(&buffers[2]).is_mapped());
    }

    #[test]
    fn exhaustion_fails_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemporaryFile::new_in(dir.path()).unwrap();
        let manager = manager(16, 3);
        let buffers = mapped_buffers(&manager, &file, 5);
        let keep = region(&buffers[4]).id();

        let mut attempts = 0;
        let result = manager.with_retries(keep, || {
            attempts += 1;
            Err(exhausted())
        });
        assert!(matches!(result, Err(Error::Mmap { .. })));
        assert_eq!(attempts, 4);
        assert_eq!(manager.live_mappings(), 2);
        assert!(region(&buffers[4]).is_mapped());
    }

    #[test]
    fn exhaustion_fails_without_evictable_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemporaryFile::new_in(dir.path()).unwrap();
        let manager = manager(16, 3);
        let buffers = mapped_buffers(&manager, &file, 1);
        let _pinned = buffers[0].rdata();

        let mut attempts = 0;
        let result = manager.with_retries(u64::MAX, || {
            attempts += 1;
            Err(exhausted())
        });
        assert!(is_resource_exhaustion(&result.unwrap_err()));
        assert_eq!(attempts, 1);
        assert_eq!(manager.live_mappings(), 1);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let file = TemporaryFile::new_in(dir.path()).unwrap();
        let manager = manager(16, 3);
        let _buffers = mapped_buffers(&manager, &file, 2);

        let mut attempts = 0;
        let result = manager.with_retries(u64::MAX, || {
            attempts += 1;
            Err(Error::Io {
                error: io::Error::from(io::ErrorKind::PermissionDenied),
                path: PathBuf::from("denied.bin"),
            })
        });
        assert!(matches!(result, Err(Error::Io { .. })));
        assert_eq!(attempts, 1);
        assert_eq!(manager.live_mappings(), 2);
    }
}
