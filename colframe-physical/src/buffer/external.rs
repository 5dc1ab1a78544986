//! This module defines [ExternalRegion], memory owned by someone else.

use std::{any::Any, fmt::Debug};

/// A memory region that the buffer does not allocate or free.
///
/// The memory is kept alive by the optional `owner`, which is dropped
/// together with the region.
pub(crate) struct ExternalRegion {
    ptr: *mut u8,
    size: usize,
    _owner: Option<Box<dyn Any + Send + Sync>>,
}

// SAFETY: the owner is `Send + Sync` and keeps the memory alive for the region's lifetime.
unsafe impl Send for ExternalRegion {}
// SAFETY: see above.
unsafe impl Sync for ExternalRegion {}

impl ExternalRegion {
    /// # Safety
    /// `ptr` must point to `size` bytes that stay valid until `owner` is dropped
    /// (or forever, if there is no owner).
    pub(crate) unsafe fn new(
        ptr: *mut u8,
        size: usize,
        owner: Option<Box<dyn Any + Send + Sync>>,
    ) -> Self {
        let ptr = if size == 0 { std::ptr::null_mut() } else { ptr };
        Self {
            ptr,
            size,
            _owner: owner,
        }
    }

    pub(crate) fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

impl Debug for ExternalRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalRegion")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .field("owned", &self._owner.is_some())
            .finish()
    }
}
