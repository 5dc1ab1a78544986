//! This module defines [Buffer], a reference-counted region of raw bytes
//! that column data is stored in.
//!
//! A buffer can own heap memory, borrow memory owned by someone else,
//! refer to a sub-range of another buffer, or map (part of) a file.
//!
//! Buffers support two kinds of ownership:
//! * Cloning a [Buffer] creates another ordinary owner. Content is writable
//!   only while there is exactly one ordinary owner, so a clone makes the
//!   content read-only until one of the owners is dropped or makes a private
//!   copy (see [Buffer::ensure_writable]).
//! * [Buffer::acquire_shared] creates a [SharedBuffer] co-owner, as used by
//!   views. Co-owners do not take away write access from the ordinary owner,
//!   but they do prevent the buffer from being resized in place.

pub(crate) mod buffer_impl;
mod external;
mod guard;
pub(crate) mod mapped;
mod memory;
mod mmap_manager;
mod objects;
mod temporary_file;

pub use guard::{BufferRead, BufferWrite};
pub use mmap_manager::MmapManager;
pub use temporary_file::TemporaryFile;

use std::{
    any::Any,
    fs::OpenOptions,
    path::Path,
    sync::{atomic::Ordering, Arc},
};

use crate::{error::Error, management::ByteSized, stype::Object};

use buffer_impl::{BufferImpl, Storage, ViewRegion};
use external::ExternalRegion;
use mapped::{MapSource, MappedRegion};
use memory::MemoryRegion;

mod sealed {
    pub trait Sealed {}
}

/// Plain data types that can be read from and written to a buffer
/// at arbitrary byte positions.
pub trait Pod: Copy + Send + Sync + 'static + sealed::Sealed {}

macro_rules! impl_pod {
    ($($type:ty),*) => {
        $(
            impl sealed::Sealed for $type {}
            impl Pod for $type {}
        )*
    };
}

impl_pod!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64, usize);

/// Kind of storage behind a [Buffer].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    /// Heap memory owned by the buffer
    Memory,
    /// Memory owned by someone else
    External,
    /// Sub-range of another buffer
    View,
    /// Range of an anonymous scratch file
    Temporary,
    /// Memory-mapped file
    Mmap,
}

/// Handle to a region of bytes.
///
/// Cloning the handle does not copy the bytes; see the [module documentation][self]
/// for how cloning affects write access.
#[derive(Debug, Clone)]
pub struct Buffer {
    inner: Arc<BufferImpl>,
}

/// Co-owner of a buffer, which keeps the buffer alive without
/// revoking write access from its ordinary owner.
#[derive(Debug)]
pub struct SharedBuffer {
    inner: Arc<BufferImpl>,
}

impl SharedBuffer {
    fn body(&self) -> &BufferImpl {
        &self.inner
    }

    /// Returns the size of the shared buffer in bytes.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Returns the kind of storage of the shared buffer.
    pub fn kind(&self) -> BufferKind {
        self.inner.kind()
    }

    /// Whether a co-owner may write to the bytes, i.e.
    /// there is at most one ordinary owner and the storage is writable.
    pub(crate) fn allows_writes(&self) -> bool {
        self.inner.writable
            && BufferImpl::exclusive_owners(&self.inner) <= 1
            && self.inner.storage_writable()
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        self.inner.nshared.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::from_impl(BufferImpl::new(
            Storage::Memory(MemoryRegion::empty()),
            true,
            true,
        ))
    }
}

impl Buffer {
    fn from_impl(body: BufferImpl) -> Self {
        Self {
            inner: Arc::new(body),
        }
    }

    /// Allocates a buffer of `size` zeroed bytes.
    pub fn mem(size: usize) -> Result<Self, Error> {
        Ok(Self::from_impl(BufferImpl::new(
            Storage::Memory(MemoryRegion::new(size)?),
            true,
            true,
        )))
    }

    /// Allocates a buffer holding a copy of `values`.
    pub fn from_slice<T: Pod>(values: &[T]) -> Result<Self, Error> {
        let nbytes = std::mem::size_of_val(values);
        let mut buffer = Self::mem(nbytes)?;
        if nbytes > 0 {
            // SAFETY: both regions span `nbytes` bytes and `T` is plain data.
            unsafe {
                std::ptr::copy_nonoverlapping(values.as_ptr().cast::<u8>(), buffer.xptr(), nbytes)
            };
        }
        Ok(buffer)
    }

    /// Allocates a buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Self::from_slice(bytes)
    }

    /// Creates a read-only buffer over the bytes of `owner`, without copying them.
    ///
    /// The owner is kept alive until the last handle to the buffer is dropped.
    pub fn external<O>(owner: O) -> Self
    where
        O: AsRef<[u8]> + Send + Sync + 'static,
    {
        let owner = Box::new(owner);
        let bytes = (*owner).as_ref();
        let (ptr, size) = (bytes.as_ptr().cast_mut(), bytes.len());
        let owner: Box<dyn Any + Send + Sync> = owner;

        // SAFETY: the bytes live on the heap inside `owner`, which is moved into the region.
        let region = unsafe { ExternalRegion::new(ptr, size, Some(owner)) };
        Self::from_impl(BufferImpl::new(Storage::External(region), false, false))
    }

    /// Creates a buffer over `size` bytes at `ptr`, which are not owned by the buffer.
    ///
    /// # Safety
    /// The memory must stay valid until `owner` is dropped, or for the rest of the
    /// program if there is no owner. If `writable` is set, nobody else may access
    /// the memory while the buffer is alive.
    pub unsafe fn external_raw(
        ptr: *mut u8,
        size: usize,
        owner: Option<Box<dyn Any + Send + Sync>>,
        writable: bool,
    ) -> Self {
        let region = ExternalRegion::new(ptr, size, owner);
        Self::from_impl(BufferImpl::new(Storage::External(region), writable, false))
    }

    /// Creates a buffer referring to `size` bytes of `parent`, starting at `offset`.
    ///
    /// The view shares its storage with the parent and is writable
    /// if the parent was writable when the view was created.
    /// A view of whole object slots holds objects as well.
    ///
    /// # Panics
    /// Panics if the range exceeds the parent.
    pub fn view(parent: &Buffer, size: usize, offset: usize) -> Self {
        assert!(
            offset
                .checked_add(size)
                .is_some_and(|end| end <= parent.size()),
            "view of {size} bytes at offset {offset} exceeds buffer of {} bytes",
            parent.size()
        );

        let writable = parent.is_writable();
        // Object slots stay owned by the parent; the view only refers to them.
        let holds_objects = parent.contains_objects()
            && offset % objects::SLOT_SIZE == 0
            && size % objects::SLOT_SIZE == 0;
        let view = ViewRegion {
            parent: parent.acquire_shared(),
            offset,
            size,
        };
        let body = BufferImpl::new(Storage::View(view), writable, false);
        body.contains_objects.store(holds_objects, Ordering::Release);
        Self::from_impl(body)
    }

    /// Maps the file at `path` read-only, using the global [MmapManager].
    pub fn mmap(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::mmap_in(&MmapManager::global(), path)
    }

    /// Maps the file at `path` read-only, registering the mapping with `manager`.
    ///
    /// The file is not mapped before its content is accessed.
    pub fn mmap_in(manager: &Arc<MmapManager>, path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|error| Error::Io {
            error,
            path: path.clone(),
        })?;
        let size = usize::try_from(metadata.len()).map_err(|_| {
            Error::Value(format!(
                "file {} is too large to be mapped ({} bytes)",
                path.display(),
                metadata.len()
            ))
        })?;

        log::debug!("Opening {} for mapping ({size} bytes)", path.display());
        let source = MapSource::File {
            path,
            writable: false,
            temporary: false,
        };
        let region = MappedRegion::new(source, size, Arc::clone(manager));
        Ok(Self::from_impl(BufferImpl::new(
            Storage::Mapped(region),
            false,
            false,
        )))
    }

    /// Creates (or truncates) the file at `path` with `size` zero bytes and maps it
    /// writable, using the global [MmapManager]. Changes are written to the file.
    ///
    /// If `temporary` is set, the file is removed once the buffer is dropped.
    pub fn mmap_create(path: impl AsRef<Path>, size: usize, temporary: bool) -> Result<Self, Error> {
        Self::mmap_create_in(&MmapManager::global(), path, size, temporary)
    }

    /// Like [Buffer::mmap_create], registering the mapping with `manager`.
    pub fn mmap_create_in(
        manager: &Arc<MmapManager>,
        path: impl AsRef<Path>,
        size: usize,
        temporary: bool,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let io_error = |error| Error::Io {
            error,
            path: path.clone(),
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(io_error)?;
        file.set_len(size as u64).map_err(io_error)?;
        drop(file);

        log::debug!("Created {} for mapping ({size} bytes)", path.display());
        let source = MapSource::File {
            path,
            writable: true,
            temporary,
        };
        let region = MappedRegion::new(source, size, Arc::clone(manager));
        Ok(Self::from_impl(BufferImpl::new(
            Storage::Mapped(region),
            true,
            true,
        )))
    }

    /// Appends `bytes` to the scratch `file` and returns a read-only buffer
    /// mapping them back in, using the global [MmapManager].
    pub fn temporary(file: &Arc<TemporaryFile>, bytes: &[u8]) -> Result<Self, Error> {
        Self::temporary_in(&MmapManager::global(), file, bytes)
    }

    /// Like [Buffer::temporary], registering the mapping with `manager`.
    pub fn temporary_in(
        manager: &Arc<MmapManager>,
        file: &Arc<TemporaryFile>,
        bytes: &[u8],
    ) -> Result<Self, Error> {
        let offset = file.append(bytes)?;
        let source = MapSource::Temporary {
            file: Arc::clone(file),
            offset,
        };
        let region = MappedRegion::new(source, bytes.len(), Arc::clone(manager));
        Ok(Self::from_impl(BufferImpl::new(
            Storage::Mapped(region),
            false,
            false,
        )))
    }

    /// Returns the size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Returns the kind of storage behind this buffer.
    pub fn kind(&self) -> BufferKind {
        self.inner.kind()
    }

    /// Returns the number of handles to this buffer, including shared co-owners.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns the number of shared co-owners of this buffer.
    pub fn nshared(&self) -> usize {
        self.inner.nshared.load(Ordering::Acquire)
    }

    /// Returns whether both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` if this handle may modify the content of the buffer.
    pub fn is_writable(&self) -> bool {
        self.inner.writable
            && BufferImpl::exclusive_owners(&self.inner) == 1
            && self.inner.storage_writable()
    }

    /// Returns `true` if the buffer can be resized without copying.
    pub fn is_resizable(&self) -> bool {
        self.inner.resizable && Arc::strong_count(&self.inner) == 1
    }

    /// Returns `true` if the elements of the buffer are [Object] references.
    pub fn contains_objects(&self) -> bool {
        self.inner.contains_objects()
    }

    /// Grants read access to the content.
    ///
    /// File-backed buffers are mapped if necessary, which may fail.
    pub fn try_rdata(&self) -> Result<BufferRead<'_>, Error> {
        self.inner.read()
    }

    /// Grants read access to the content.
    ///
    /// # Panics
    /// Panics if a file-backed buffer cannot be mapped.
    pub fn rdata(&self) -> BufferRead<'_> {
        self.try_rdata()
            .unwrap_or_else(|error| panic!("unable to access buffer: {error}"))
    }

    /// Grants write access to the content.
    ///
    /// # Panics
    /// Panics if the buffer is not writable or cannot be mapped.
    pub fn wdata(&mut self) -> BufferWrite<'_> {
        assert!(self.is_writable(), "buffer is not writable");
        let read = self.rdata();
        // SAFETY: the buffer is writable, so this handle has exclusive access.
        unsafe { BufferWrite::new(read) }
    }

    /// Returns the address of the first byte, null for empty buffers.
    ///
    /// For file-backed buffers the address is only stable while the mapping
    /// is alive, so it should be used for identity comparisons only.
    pub fn rptr(&self) -> *const u8 {
        self.rdata().as_ptr()
    }

    /// Returns the address of the first byte for writing.
    ///
    /// # Panics
    /// Panics if the buffer is not writable.
    pub fn xptr(&mut self) -> *mut u8 {
        self.wdata().as_mut_ptr()
    }

    /// Reads the element at `index`, interpreting the buffer as an array of `T`.
    ///
    /// # Panics
    /// Panics if the element lies outside of the buffer.
    pub fn get_element<T: Pod>(&self, index: usize) -> T {
        let data = self.rdata();
        let width = std::mem::size_of::<T>();
        assert!(
            (index + 1) * width <= data.len(),
            "element {index} out of bounds for buffer of {} bytes",
            data.len()
        );
        // SAFETY: the element lies within the buffer and `T` is plain data.
        unsafe { std::ptr::read_unaligned(data.as_ptr().add(index * width).cast::<T>()) }
    }

    /// Overwrites the element at `index`, interpreting the buffer as an array of `T`.
    ///
    /// # Panics
    /// Panics if the buffer is not writable or the element lies outside of the buffer.
    pub fn set_element<T: Pod>(&mut self, index: usize, value: T) {
        let mut data = self.wdata();
        let width = std::mem::size_of::<T>();
        assert!(
            (index + 1) * width <= data.len(),
            "element {index} out of bounds for buffer of {} bytes",
            data.len()
        );
        // SAFETY: the element lies within the buffer, which we may write to.
        unsafe { std::ptr::write_unaligned(data.as_mut_ptr().add(index * width).cast::<T>(), value) }
    }

    /// Returns the content of the buffer as a vector of `T`,
    /// ignoring trailing bytes that do not form a whole element.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        let data = self.rdata();
        let width = std::mem::size_of::<T>();
        (0..data.len() / width)
            // SAFETY: every element lies within the buffer.
            .map(|index| unsafe { std::ptr::read_unaligned(data.as_ptr().add(index * width).cast::<T>()) })
            .collect()
    }

    /// Creates a shared co-owner of this buffer.
    pub fn acquire_shared(&self) -> SharedBuffer {
        self.inner.nshared.fetch_add(1, Ordering::AcqRel);
        SharedBuffer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns a private heap copy of this buffer.
    pub fn copy(&self) -> Result<Buffer, Error> {
        let data = self.try_rdata()?;
        let mut copy = Self::mem(data.len())?;
        copy.wdata().copy_from_slice(&data);

        if self.contains_objects() {
            // SAFETY: the copied slots still belong to `self`.
            unsafe { objects::duplicate_all(copy.xptr(), copy.size()) };
            copy.inner.contains_objects.store(true, Ordering::Release);
        }

        Ok(copy)
    }

    /// Replaces the buffer by a private heap copy, unless it is owned heap memory already.
    pub fn to_memory(&mut self) -> Result<(), Error> {
        if self.kind() != BufferKind::Memory {
            log::debug!("Copying {:?} buffer of {} bytes into memory", self.kind(), self.size());
            *self = self.copy()?;
        }
        Ok(())
    }

    /// Replaces the buffer by a private copy, unless this handle can write to it already.
    pub fn ensure_writable(&mut self) -> Result<(), Error> {
        if !self.is_writable() {
            *self = self.copy()?;
        }
        Ok(())
    }

    /// Changes the size of the buffer to `new_size` bytes.
    ///
    /// Resizable buffers are resized in place, which may move their data.
    /// Any other buffer is replaced by a fresh heap buffer of the new size.
    /// If `keep_data` is set, the common prefix of the content is preserved;
    /// new bytes are always zero.
    pub fn resize(&mut self, new_size: usize, keep_data: bool) -> Result<(), Error> {
        if self.is_resizable() {
            if let Some(body) = Arc::get_mut(&mut self.inner) {
                return body.resize_in_place(new_size, keep_data);
            }
        }

        log::debug!(
            "Buffer of kind {:?} cannot be resized in place, copying into {new_size} bytes",
            self.kind()
        );
        let mut resized = Self::mem(new_size)?;
        if keep_data {
            let data = self.try_rdata()?;
            let common = data.len().min(new_size);
            resized.wdata()[..common].copy_from_slice(&data[..common]);
            if self.contains_objects() {
                // SAFETY: the copied slots still belong to `self`.
                unsafe { objects::duplicate_all(resized.xptr(), common) };
            }
        }
        if self.contains_objects() {
            resized.inner.contains_objects.store(true, Ordering::Release);
        }

        *self = resized;
        Ok(())
    }

    /// Marks the buffer as an array of [Object] references, all of which start out NA.
    ///
    /// # Panics
    /// Panics if the buffer is not a writable heap buffer holding whole slots.
    pub fn set_contains_objects(&mut self) {
        if self.contains_objects() {
            return;
        }
        assert_eq!(
            self.kind(),
            BufferKind::Memory,
            "objects can only be stored in heap memory"
        );
        assert_eq!(self.size() % objects::SLOT_SIZE, 0, "size is not a multiple of the slot size");

        self.wdata().fill(0);
        self.inner.contains_objects.store(true, Ordering::Release);
    }

    fn assert_object_slot(&self, index: usize) {
        assert!(self.contains_objects(), "buffer does not contain objects");
        assert!(
            index < self.size() / objects::SLOT_SIZE,
            "object {index} out of bounds for buffer of {} bytes",
            self.size()
        );
    }

    /// Returns a new reference to the object at `index`, or `None` if the slot is NA.
    pub fn get_object(&self, index: usize) -> Option<Object> {
        self.assert_object_slot(index);
        let data = self.rdata();
        // SAFETY: the slot exists and holds a valid object pointer or null.
        unsafe { objects::get(data.as_ptr(), index) }
    }

    /// Stores `object` at `index`, releasing the previous object.
    pub fn set_object(&mut self, index: usize, object: Option<Object>) {
        self.assert_object_slot(index);
        let mut data = self.wdata();
        // SAFETY: the slot exists and this handle has exclusive write access.
        unsafe { objects::set(data.as_mut_ptr(), index, object) }
    }

    /// Checks the internal consistency of the buffer.
    pub fn verify_integrity(&self) -> Result<(), Error> {
        BufferImpl::verify_integrity(&self.inner)
    }
}

impl ByteSized for Buffer {
    fn size_bytes(&self) -> u64 {
        std::mem::size_of::<BufferImpl>() as u64 + self.size() as u64
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use quickcheck_macros::quickcheck;
    use test_log::test;

    use crate::{config::StorageConfig, stype::Object};

    use super::{Buffer, BufferKind, MmapManager, TemporaryFile};

    fn private_manager(max_mappings: usize) -> Arc<MmapManager> {
        MmapManager::new(&StorageConfig {
            max_mappings,
            ..Default::default()
        })
    }

    #[test]
    fn empty_buffer_has_no_data() {
        let buffer = Buffer::mem(0).unwrap();
        assert_eq!(buffer.size(), 0);
        assert!(buffer.rptr().is_null());
        assert!(buffer.rdata().is_empty());
        buffer.verify_integrity().unwrap();

        assert!(Buffer::default().rptr().is_null());
    }

    #[test]
    fn clone_revokes_write_access() {
        let mut b = Buffer::from_slice(&[1u32, 2, 3]).unwrap();
        assert!(b.is_writable());
        assert!(b.is_resizable());

        let c = b.clone();
        assert!(!b.is_writable());
        assert!(!c.is_writable());
        assert!(!b.is_resizable());
        assert_eq!(b.refcount(), 2);

        drop(c);
        assert!(b.is_writable());
        b.set_element::<u32>(1, 7);
        assert_eq!(b.to_vec::<u32>(), vec![1, 7, 3]);
    }

    #[test]
    fn ensure_writable_detaches_copy() {
        let a = Buffer::from_slice(&[10i64, 20]).unwrap();
        let mut b = a.clone();
        b.ensure_writable().unwrap();
        assert!(!a.ptr_eq(&b));

        b.set_element::<i64>(0, -1);
        assert_eq!(a.get_element::<i64>(0), 10);
        assert_eq!(b.get_element::<i64>(0), -1);
    }

    #[test]
    fn view_points_into_parent() {
        let bytes = (0..64u8).collect::<Vec<_>>();
        let parent = Buffer::from_bytes(&bytes).unwrap();

        for (size, offset) in [(1, 0), (10, 5), (0, 64), (64, 0), (3, 61)] {
            let view = Buffer::view(&parent, size, offset);
            assert_eq!(view.kind(), BufferKind::View);
            assert_eq!(view.size(), size);
            assert_eq!(&*view.rdata(), &bytes[offset..offset + size]);
            if size > 0 {
                assert_eq!(view.rptr(), parent.rptr().wrapping_add(offset));
            } else {
                assert!(view.rptr().is_null());
            }
            view.verify_integrity().unwrap();
        }

        let view = Buffer::view(&parent, 8, 8);
        drop(parent);
        assert_eq!(view.to_vec::<u8>(), (8..16).collect::<Vec<_>>());
    }

    #[test]
    fn shared_owners_keep_write_access() {
        let mut parent = Buffer::mem(16).unwrap();
        let mut view = Buffer::view(&parent, 8, 4);
        assert_eq!(parent.nshared(), 1);

        assert!(parent.is_writable());
        assert!(view.is_writable());
        assert!(!parent.is_resizable());

        view.set_element::<u8>(0, 42);
        assert_eq!(parent.get_element::<u8>(4), 42);
        parent.set_element::<u8>(5, 43);
        assert_eq!(view.get_element::<u8>(1), 43);

        let other_owner = parent.clone();
        assert!(!view.is_writable());
        assert!(!parent.is_writable());
        drop(other_owner);

        drop(view);
        assert_eq!(parent.nshared(), 0);
        assert!(parent.is_resizable());
    }

    #[test]
    fn resize_keeps_prefix() {
        let mut buffer = Buffer::from_slice(&[1u16, 2, 3, 4]).unwrap();
        buffer.resize(12, true).unwrap();
        assert_eq!(buffer.to_vec::<u16>(), vec![1, 2, 3, 4, 0, 0]);
        buffer.resize(4, true).unwrap();
        assert_eq!(buffer.to_vec::<u16>(), vec![1, 2]);
        buffer.resize(0, true).unwrap();
        assert!(buffer.rptr().is_null());
        buffer.verify_integrity().unwrap();
    }

    #[test]
    fn resize_of_shared_buffer_copies() {
        let mut a = Buffer::from_slice(&[5u8, 6, 7]).unwrap();
        let b = a.clone();
        a.resize(5, true).unwrap();

        assert!(!a.ptr_eq(&b));
        assert_eq!(a.to_vec::<u8>(), vec![5, 6, 7, 0, 0]);
        assert_eq!(b.to_vec::<u8>(), vec![5, 6, 7]);
        assert!(a.is_writable());
    }

    #[test]
    fn external_buffer_is_read_only() {
        let mut buffer = Buffer::external(vec![1u8, 2, 3]);
        assert_eq!(buffer.kind(), BufferKind::External);
        assert!(!buffer.is_writable());
        assert_eq!(buffer.to_vec::<u8>(), vec![1, 2, 3]);

        buffer.to_memory().unwrap();
        assert_eq!(buffer.kind(), BufferKind::Memory);
        assert!(buffer.is_writable());
        assert_eq!(buffer.to_vec::<u8>(), vec![1, 2, 3]);
    }

    #[test]
    fn external_raw_buffer() {
        let owner = Box::new([3u8, 1, 4, 1, 5]);
        let ptr = owner.as_ptr().cast_mut();
        let buffer = unsafe { Buffer::external_raw(ptr, 5, Some(owner), false) };
        assert_eq!(buffer.to_vec::<u8>(), vec![3, 1, 4, 1, 5]);
        buffer.verify_integrity().unwrap();
    }

    #[test]
    fn objects_are_released_once() {
        let object: Object = Arc::new(String::from("host value"));

        let mut buffer = Buffer::mem(3 * std::mem::size_of::<usize>()).unwrap();
        buffer.set_contains_objects();
        assert!(buffer.get_object(0).is_none());

        buffer.set_object(0, Some(object.clone()));
        buffer.set_object(2, Some(object.clone()));
        assert_eq!(Arc::strong_count(&object), 3);

        let copy = buffer.copy().unwrap();
        assert_eq!(Arc::strong_count(&object), 5);
        let read = copy.get_object(2).unwrap();
        assert_eq!(read.downcast_ref::<String>().unwrap(), "host value");
        drop(read);
        drop(copy);
        assert_eq!(Arc::strong_count(&object), 3);

        buffer.set_object(0, None);
        assert_eq!(Arc::strong_count(&object), 2);

        buffer.resize(std::mem::size_of::<usize>(), true).unwrap();
        assert_eq!(Arc::strong_count(&object), 1);

        buffer.resize(2 * std::mem::size_of::<usize>(), true).unwrap();
        buffer.set_object(1, Some(object.clone()));
        drop(buffer);
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn mmap_create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("column.bin");
        let manager = private_manager(16);

        let mut buffer = Buffer::mmap_create_in(&manager, &path, 16, false).unwrap();
        assert_eq!(buffer.kind(), BufferKind::Mmap);
        assert!(buffer.is_writable());
        buffer.set_element::<u32>(2, 0xdead_beef);

        buffer.resize(24, true).unwrap();
        assert_eq!(buffer.size(), 24);
        assert_eq!(buffer.get_element::<u32>(2), 0xdead_beef);
        assert_eq!(buffer.get_element::<u32>(5), 0);
        drop(buffer);

        let reopened = Buffer::mmap_in(&manager, &path).unwrap();
        assert!(!reopened.is_writable());
        assert_eq!(reopened.size(), 24);
        assert_eq!(reopened.get_element::<u32>(2), 0xdead_beef);
    }

    #[test]
    fn mmap_resize_without_data_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reset.bin");
        let manager = private_manager(4);

        let mut buffer = Buffer::mmap_create_in(&manager, &path, 16, false).unwrap();
        buffer.wdata().fill(0xab);
        buffer.resize(8, false).unwrap();
        assert_eq!(buffer.to_vec::<u8>(), vec![0; 8]);

        buffer.wdata().fill(0xcd);
        buffer.resize(12, false).unwrap();
        assert_eq!(buffer.to_vec::<u8>(), vec![0; 12]);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0; 12]);
    }

    #[test]
    fn view_of_objects_holds_objects() {
        let slot = std::mem::size_of::<usize>();
        let object: Object = Arc::new(7_i64);

        let mut parent = Buffer::mem(4 * slot).unwrap();
        parent.set_contains_objects();
        parent.set_object(1, Some(object.clone()));
        parent.set_object(2, Some(object.clone()));

        let mut view = Buffer::view(&parent, 2 * slot, slot);
        assert!(view.contains_objects());
        view.verify_integrity().unwrap();
        assert_eq!(*view.get_object(0).unwrap().downcast_ref::<i64>().unwrap(), 7);
        assert_eq!(Arc::strong_count(&object), 3);

        view.set_object(1, None);
        assert!(parent.get_object(2).is_none());
        assert_eq!(Arc::strong_count(&object), 2);

        let copy = view.copy().unwrap();
        assert!(copy.contains_objects());
        assert_eq!(Arc::strong_count(&object), 3);
        drop(copy);
        drop(view);
        assert_eq!(Arc::strong_count(&object), 2);

        assert!(!Buffer::view(&parent, 3, 1).contains_objects());
        drop(parent);
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn temporary_mmap_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.bin");

        let buffer = Buffer::mmap_create_in(&private_manager(4), &path, 8, true).unwrap();
        assert!(path.exists());
        drop(buffer);
        assert!(!path.exists());
    }

    #[test]
    fn eviction_keeps_mappings_below_cap() {
        let dir = tempfile::tempdir().unwrap();
        let manager = private_manager(2);
        let file = TemporaryFile::new_in(dir.path()).unwrap();

        let buffers = (0..6u64)
            .map(|i| Buffer::temporary_in(&manager, &file, &[i; 4].map(u64::to_le_bytes).concat()).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(manager.live_mappings(), 0);

        for _ in 0..2 {
            for (i, buffer) in buffers.iter().enumerate() {
                assert_eq!(buffer.kind(), BufferKind::Temporary);
                assert_eq!(buffer.to_vec::<u64>(), vec![i as u64; 4]);
                assert!(manager.live_mappings() <= 2);
            }
        }
    }

    #[test]
    fn view_of_mapped_buffer_survives_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, (0..32u8).collect::<Vec<_>>()).unwrap();

        let manager = private_manager(8);
        let parent = Buffer::mmap_in(&manager, &path).unwrap();
        let view = Buffer::view(&parent, 4, 10);
        drop(parent);

        assert_eq!(view.to_vec::<u8>(), vec![10, 11, 12, 13]);
        assert_eq!(manager.live_mappings(), 1);
        assert_eq!(manager.evict_all(), 1);
        assert_eq!(manager.live_mappings(), 0);
        assert_eq!(view.to_vec::<u8>(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn mapping_in_use_is_not_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinned.bin");
        std::fs::write(&path, [1u8; 8]).unwrap();

        let manager = private_manager(8);
        let buffer = Buffer::mmap_in(&manager, &path).unwrap();
        let data = buffer.rdata();
        assert_eq!(manager.evict_all(), 0);
        assert_eq!(&*data, &[1u8; 8]);
    }

    #[quickcheck]
    #[cfg_attr(miri, ignore)]
    fn view_reads_parent_range(bytes: Vec<u8>, offset: usize, size: usize) -> bool {
        let parent = Buffer::from_bytes(&bytes).unwrap();
        let offset = offset % (bytes.len() + 1);
        let size = size % (bytes.len() - offset + 1);

        let view = Buffer::view(&parent, size, offset);
        let equal = *view.rdata() == bytes[offset..offset + size];
        equal
    }
}
