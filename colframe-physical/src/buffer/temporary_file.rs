//! This module defines [TemporaryFile], a scratch file that buffers can be spilled to.

use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use memmap2::MmapOptions;

use crate::{config::StorageConfig, error::Error};

use super::mapped::Mapping;

/// An anonymous scratch file, removed by the operating system once it is closed.
///
/// Buffers created with [Buffer::temporary][super::Buffer::temporary] append their
/// content to the file and map it back into memory when it is accessed.
/// The file stays open as long as any of these buffers exist.
#[derive(Debug)]
pub struct TemporaryFile {
    /// Directory the file was created in, for error messages.
    dir: PathBuf,
    file: Mutex<File>,
}

impl TemporaryFile {
    /// Creates a scratch file in the directory given by [StorageConfig::temp_dir].
    pub fn new() -> Result<Arc<Self>, Error> {
        let dir = StorageConfig::current()
            .temp_dir
            .unwrap_or_else(std::env::temp_dir);
        Self::new_in(dir)
    }

    /// Creates a scratch file in the given directory.
    pub fn new_in(dir: impl AsRef<Path>) -> Result<Arc<Self>, Error> {
        let dir = dir.as_ref().to_path_buf();
        let file = tempfile::tempfile_in(&dir).map_err(|error| Error::Io {
            error,
            path: dir.clone(),
        })?;
        log::debug!("Created scratch file in {}", dir.display());

        Ok(Arc::new(Self {
            dir,
            file: Mutex::new(file),
        }))
    }

    fn io_error(&self, error: std::io::Error) -> Error {
        Error::Io {
            error,
            path: self.dir.clone(),
        }
    }

    /// Returns the current length of the file in bytes.
    pub fn len(&self) -> Result<u64, Error> {
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.metadata()
            .map(|metadata| metadata.len())
            .map_err(|error| self.io_error(error))
    }

    /// Returns `true` if nothing was written to the file yet.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Appends `bytes` at the end of the file and returns the offset they were written to.
    pub(crate) fn append(&self, bytes: &[u8]) -> Result<u64, Error> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let offset = file
            .seek(SeekFrom::End(0))
            .map_err(|error| self.io_error(error))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|error| self.io_error(error))?;
        Ok(offset)
    }

    /// Maps `size` bytes starting at `offset` read-only into memory.
    pub(crate) fn map(&self, offset: u64, size: usize) -> Result<Mapping, Error> {
        let file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: bytes that were appended to the scratch file are never modified.
        let mapped = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(size)
                .map_copy_read_only(&*file)
        };
        mapped.map(Mapping::Private).map_err(|error| Error::Mmap {
            error,
            path: self.dir.clone(),
            size,
        })
    }
}
