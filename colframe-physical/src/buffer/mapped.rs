//! This module defines [MappedRegion], a lazily memory-mapped byte range of a file.

use std::{
    fmt::Debug,
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use memmap2::{Mmap, MmapOptions, MmapRaw};

use crate::error::Error;

use super::{mmap_manager::MmapManager, temporary_file::TemporaryFile};

/// Where the bytes of a [MappedRegion] come from.
#[derive(Debug)]
pub(crate) enum MapSource {
    /// The whole file at `path`.
    File {
        path: PathBuf,
        writable: bool,
        /// Remove the file once the region is dropped.
        temporary: bool,
    },
    /// A range of a scratch file, starting at `offset`.
    Temporary {
        file: Arc<TemporaryFile>,
        offset: u64,
    },
}

/// A live mapping.
pub(crate) enum Mapping {
    /// `MAP_SHARED` read-write mapping, changes go to the file.
    Shared(MmapRaw),
    /// `MAP_PRIVATE` read-only mapping.
    Private(Mmap),
}

impl Mapping {
    fn ptr(&self) -> *mut u8 {
        match self {
            Mapping::Shared(map) => map.as_mut_ptr(),
            Mapping::Private(map) => map.as_ptr().cast_mut(),
        }
    }
}

/// Mutable part of a [MappedRegion].
pub(crate) struct MapState {
    pub(crate) size: usize,
    mapping: Option<Mapping>,
}

impl MapState {
    /// Start of the mapped bytes, null if the region is empty.
    pub(crate) fn ptr(&self) -> *mut u8 {
        match &self.mapping {
            Some(mapping) => mapping.ptr(),
            None => {
                debug_assert_eq!(self.size, 0, "reading from an unmapped region");
                std::ptr::null_mut()
            }
        }
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }
}

impl Debug for MapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapState")
            .field("size", &self.size)
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}

/// Byte range of a file that is mapped into memory on first access.
///
/// The region is registered with a [MmapManager], which may evict
/// (unmap) it at any time it is not being accessed. Readers hold the
/// read lock of the state for as long as they use the mapped memory;
/// an evicted region is mapped again on its next access.
#[derive(Debug)]
pub(crate) struct MappedRegion {
    id: u64,
    source: MapSource,
    state: RwLock<MapState>,
    manager: Arc<MmapManager>,
}

/// Error codes (identical on Linux and macOS) that signal exhaustion of file descriptors.
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// Whether mapping failed because the process ran out of some resource,
/// in which case freeing other mappings may help.
pub(crate) fn is_resource_exhaustion(error: &Error) -> bool {
    match error {
        Error::Mmap { error, .. } | Error::Io { error, .. } => {
            error.kind() == io::ErrorKind::OutOfMemory
                || matches!(error.raw_os_error(), Some(ENFILE) | Some(EMFILE))
        }
        _ => false,
    }
}

impl MappedRegion {
    pub(crate) fn new(source: MapSource, size: usize, manager: Arc<MmapManager>) -> Arc<Self> {
        Arc::new(Self {
            id: MmapManager::next_id(),
            source,
            state: RwLock::new(MapState {
                size,
                mapping: None,
            }),
            manager,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_temporary(&self) -> bool {
        matches!(self.source, MapSource::Temporary { .. })
    }

    pub(crate) fn is_writable(&self) -> bool {
        matches!(self.source, MapSource::File { writable: true, .. })
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        match &self.source {
            MapSource::File { path, .. } => Some(path),
            MapSource::Temporary { .. } => None,
        }
    }

    /// Returns the current size without mapping the region.
    pub(crate) fn size(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).size
    }

    /// Returns whether the region is currently mapped.
    pub(crate) fn is_mapped(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_mapped()
    }

    /// Locks the region for reading, mapping it first if necessary.
    pub(crate) fn read(self: &Arc<Self>) -> Result<RwLockReadGuard<'_, MapState>, Error> {
        loop {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.is_mapped() {
                self.manager.touch(self.id);
                return Ok(state);
            }
            if state.size == 0 {
                return Ok(state);
            }
            drop(state);

            self.manager.map_region(self)?;
        }
    }

    pub(crate) fn lock_write(&self) -> RwLockWriteGuard<'_, MapState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the mapping for `state`, which must not be mapped yet.
    pub(crate) fn map_into(&self, state: &mut MapState) -> Result<(), Error> {
        debug_assert!(state.mapping.is_none());
        let size = state.size;

        let mapping = match &self.source {
            MapSource::File { path, writable, .. } => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(*writable)
                    .open(path)
                    .map_err(|error| Error::Io {
                        error,
                        path: path.clone(),
                    })?;
                let mut options = MmapOptions::new();
                options.len(size);

                let mapped = if *writable {
                    options.map_raw(&file).map(Mapping::Shared)
                } else {
                    // SAFETY: the file is not modified through this process while mapped privately,
                    // and we never hand out references that outlive the read lock.
                    unsafe { options.map_copy_read_only(&file) }.map(Mapping::Private)
                };
                mapped.map_err(|error| Error::Mmap {
                    error,
                    path: path.clone(),
                    size,
                })?
            }
            MapSource::Temporary { file, offset } => file.map(*offset, size)?,
        };

        log::debug!("Mapped region {} ({size} bytes) of {:?}", self.id, self.source);
        state.mapping = Some(mapping);
        Ok(())
    }

    /// Unmaps the region if nobody is reading from it right now.
    /// Returns `false` if the region is in use.
    pub(crate) fn try_evict(&self) -> bool {
        match self.state.try_write() {
            Ok(mut state) => {
                if state.mapping.take().is_some() {
                    log::debug!("Evicted mapping of region {}", self.id);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Changes the size of the backing file, dropping the current mapping.
    /// Unless `keep_data` is set, the whole file is zeroed.
    pub(crate) fn resize(&self, new_size: usize, keep_data: bool) -> Result<(), Error> {
        let MapSource::File {
            path,
            writable: true,
            ..
        } = &self.source
        else {
            unreachable!("only writable file mappings are resizable");
        };

        let mut state = self.lock_write();
        state.mapping = None;
        self.manager.deregister(self.id);

        let io_error = |error| Error::Io {
            error,
            path: path.clone(),
        };
        let file = OpenOptions::new().write(true).open(path).map_err(io_error)?;
        if !keep_data {
            file.set_len(0).map_err(io_error)?;
        }
        file.set_len(new_size as u64).map_err(io_error)?;

        log::debug!("Resized {} from {} to {new_size} bytes", path.display(), state.size);
        state.size = new_size;
        Ok(())
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        self.manager.deregister(self.id);

        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.mapping = None;

        if let MapSource::File {
            path,
            temporary: true,
            ..
        } = &self.source
        {
            if let Err(error) = std::fs::remove_file(path) {
                log::warn!("Could not remove temporary file {}: {error}", path.display());
            }
        }
    }
}
