//! This module defines [MemoryRegion], heap memory owned by a buffer.

use std::{
    alloc::{self, Layout},
    ptr,
};

use crate::error::Error;

/// Alignment of every heap allocation, sufficient for all element types.
const ALIGNMENT: usize = 16;

/// A zero-initialized heap allocation.
#[derive(Debug)]
pub(crate) struct MemoryRegion {
    /// Start of the allocation, null iff `size` is zero.
    ptr: *mut u8,
    size: usize,
}

// SAFETY: the region exclusively owns its allocation.
unsafe impl Send for MemoryRegion {}
// SAFETY: shared access only hands out the pointer; writes are guarded by the buffer.
unsafe impl Sync for MemoryRegion {}

impl MemoryRegion {
    fn layout(size: usize) -> Result<Layout, Error> {
        Layout::from_size_align(size, ALIGNMENT).map_err(|_| Error::OutOfMemory { size })
    }

    /// Region without any memory.
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            size: 0,
        }
    }

    /// Allocates `size` zeroed bytes.
    pub(crate) fn new(size: usize) -> Result<Self, Error> {
        if size == 0 {
            return Ok(Self::empty());
        }

        let layout = Self::layout(size)?;
        // SAFETY: the layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory { size });
        }

        Ok(Self { ptr, size })
    }

    pub(crate) fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Changes the size of the allocation, which may move it.
    /// Bytes beyond the old size are zeroed.
    pub(crate) fn resize(&mut self, new_size: usize) -> Result<(), Error> {
        if new_size == self.size {
            return Ok(());
        }
        if new_size == 0 {
            self.free();
            return Ok(());
        }
        if self.ptr.is_null() {
            *self = Self::new(new_size)?;
            return Ok(());
        }

        let old_layout = Self::layout(self.size)?;
        Self::layout(new_size)?;
        // SAFETY: `ptr` was allocated with `old_layout` and the new size is non-zero
        // and forms a valid layout with the same alignment.
        let new_ptr = unsafe { alloc::realloc(self.ptr, old_layout, new_size) };
        if new_ptr.is_null() {
            return Err(Error::OutOfMemory { size: new_size });
        }
        if new_size > self.size {
            // SAFETY: the tail lies within the new allocation.
            unsafe { ptr::write_bytes(new_ptr.add(self.size), 0, new_size - self.size) };
        }

        self.ptr = new_ptr;
        self.size = new_size;
        Ok(())
    }

    fn free(&mut self) {
        if !self.ptr.is_null() {
            let layout = Layout::from_size_align(self.size, ALIGNMENT)
                .expect("layout was valid when allocating");
            // SAFETY: `ptr` was allocated with exactly this layout.
            unsafe { alloc::dealloc(self.ptr, layout) };
        }
        self.ptr = ptr::null_mut();
        self.size = 0;
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        self.free();
    }
}
