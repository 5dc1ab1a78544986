//! This module defines the guards through which buffer content is accessed.

use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
    sync::RwLockReadGuard,
};

use super::mapped::MapState;

/// Read access to the bytes of a buffer.
///
/// For file-backed buffers the guard keeps the mapping alive,
/// so it should not be held longer than necessary.
pub struct BufferRead<'a> {
    ptr: *const u8,
    len: usize,
    _pin: Option<RwLockReadGuard<'a, MapState>>,
}

impl<'a> BufferRead<'a> {
    /// # Safety
    /// `ptr` must point to `len` readable bytes (or be null if `len` is zero)
    /// that stay valid as long as the guard and its pin are alive.
    pub(crate) unsafe fn new(
        ptr: *const u8,
        len: usize,
        pin: Option<RwLockReadGuard<'a, MapState>>,
    ) -> Self {
        Self {
            ptr,
            len,
            _pin: pin,
        }
    }

    /// Restricts the guard to `len` bytes starting at `offset`.
    pub(crate) fn subrange(self, offset: usize, len: usize) -> Self {
        assert!(
            offset + len <= self.len,
            "range {offset}..{} out of bounds for {} bytes",
            offset + len,
            self.len
        );
        let ptr = if len == 0 {
            std::ptr::null()
        } else {
            // SAFETY: the range was checked above.
            unsafe { self.ptr.add(offset) }
        };
        Self {
            ptr,
            len,
            _pin: self._pin,
        }
    }

    /// Start of the bytes, null for empty buffers.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }
}

impl Deref for BufferRead<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            // SAFETY: guaranteed by the constructor.
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }
}

impl Debug for BufferRead<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRead")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Exclusive write access to the bytes of a buffer.
pub struct BufferWrite<'a> {
    read: BufferRead<'a>,
}

impl<'a> BufferWrite<'a> {
    /// # Safety
    /// The bytes behind `read` must be writable and not accessed by anyone else.
    pub(crate) unsafe fn new(read: BufferRead<'a>) -> Self {
        Self { read }
    }

    /// Start of the bytes, null for empty buffers.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.read.ptr.cast_mut()
    }
}

impl Deref for BufferWrite<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.read
    }
}

impl DerefMut for BufferWrite<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        if self.read.len == 0 {
            &mut []
        } else {
            // SAFETY: guaranteed by the constructor.
            unsafe { std::slice::from_raw_parts_mut(self.read.ptr.cast_mut(), self.read.len) }
        }
    }
}

impl Debug for BufferWrite<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferWrite")
            .field("ptr", &self.read.ptr)
            .field("len", &self.read.len)
            .finish()
    }
}
