//! This module defines [BufferImpl], the shared body behind every buffer handle.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crate::{ensure_integrity, error::Error};

use super::{
    external::ExternalRegion, guard::BufferRead, mapped::MappedRegion, memory::MemoryRegion,
    objects, BufferKind, SharedBuffer,
};

/// Sub-range of another buffer.
#[derive(Debug)]
pub(crate) struct ViewRegion {
    pub(crate) parent: SharedBuffer,
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

/// Where the bytes of a buffer live.
#[derive(Debug)]
pub(crate) enum Storage {
    Memory(MemoryRegion),
    External(ExternalRegion),
    View(ViewRegion),
    Mapped(Arc<MappedRegion>),
}

/// Body of a [Buffer][super::Buffer].
///
/// The number of handles is the strong count of the surrounding [Arc];
/// `nshared` counts how many of those are [SharedBuffer] co-owners.
#[derive(Debug)]
pub(crate) struct BufferImpl {
    pub(crate) nshared: AtomicUsize,
    pub(crate) writable: bool,
    pub(crate) resizable: bool,
    pub(crate) contains_objects: AtomicBool,
    pub(crate) storage: Storage,
}

impl BufferImpl {
    pub(crate) fn new(storage: Storage, writable: bool, resizable: bool) -> Self {
        debug_assert!(writable || !resizable);
        Self {
            nshared: AtomicUsize::new(0),
            writable,
            resizable,
            contains_objects: AtomicBool::new(false),
            storage,
        }
    }

    /// Number of handles that are not shared co-owners.
    pub(crate) fn exclusive_owners(this: &Arc<Self>) -> usize {
        Arc::strong_count(this).saturating_sub(this.nshared.load(Ordering::Acquire))
    }

    /// Whether the underlying storage may be written to,
    /// independently of the handles to this body.
    pub(crate) fn storage_writable(&self) -> bool {
        match &self.storage {
            Storage::View(view) => view.parent.allows_writes(),
            Storage::Mapped(region) => region.is_writable(),
            Storage::Memory(_) | Storage::External(_) => true,
        }
    }

    pub(crate) fn contains_objects(&self) -> bool {
        self.contains_objects.load(Ordering::Acquire)
    }

    pub(crate) fn kind(&self) -> BufferKind {
        match &self.storage {
            Storage::Memory(_) => BufferKind::Memory,
            Storage::External(_) => BufferKind::External,
            Storage::View(_) => BufferKind::View,
            Storage::Mapped(region) if region.is_temporary() => BufferKind::Temporary,
            Storage::Mapped(_) => BufferKind::Mmap,
        }
    }

    pub(crate) fn size(&self) -> usize {
        match &self.storage {
            Storage::Memory(memory) => memory.size(),
            Storage::External(external) => external.size(),
            Storage::View(view) => view.size,
            Storage::Mapped(region) => region.size(),
        }
    }

    /// Grants read access to the content, mapping it first if necessary.
    pub(crate) fn read(&self) -> Result<BufferRead<'_>, Error> {
        match &self.storage {
            // SAFETY: the regions guarantee that `ptr` covers `size` bytes.
            Storage::Memory(memory) => Ok(unsafe { BufferRead::new(memory.ptr(), memory.size(), None) }),
            Storage::External(external) => {
                Ok(unsafe { BufferRead::new(external.ptr(), external.size(), None) })
            }
            Storage::View(view) => Ok(view.parent.body().read()?.subrange(view.offset, view.size)),
            Storage::Mapped(region) => {
                let state = region.read()?;
                let (ptr, size) = (state.ptr(), state.size);
                // SAFETY: the read lock keeps the mapping alive.
                Ok(unsafe { BufferRead::new(ptr, size, Some(state)) })
            }
        }
    }

    /// Changes the size of a resizable body that nobody else refers to.
    pub(crate) fn resize_in_place(&mut self, new_size: usize, keep_data: bool) -> Result<(), Error> {
        debug_assert!(self.resizable);
        let contains_objects = *self.contains_objects.get_mut();

        match &mut self.storage {
            Storage::Memory(memory) => {
                if contains_objects {
                    let nslots = memory.size() / objects::SLOT_SIZE;
                    let keep = if keep_data {
                        nslots.min(new_size / objects::SLOT_SIZE)
                    } else {
                        0
                    };
                    // SAFETY: the body is not shared, so it owns its slots.
                    unsafe { objects::release_range(memory.ptr(), keep, nslots) };
                }
                memory.resize(new_size)?;
                if !keep_data && !contains_objects && memory.size() > 0 {
                    // SAFETY: the allocation spans `size` bytes.
                    unsafe { std::ptr::write_bytes(memory.ptr(), 0, memory.size()) };
                }
                Ok(())
            }
            Storage::Mapped(region) => region.resize(new_size, keep_data),
            Storage::External(_) | Storage::View(_) => {
                unreachable!("external memory and views are never resizable")
            }
        }
    }

    pub(crate) fn verify_integrity(this: &Arc<Self>) -> Result<(), Error> {
        let size = this.size();
        let nshared = this.nshared.load(Ordering::Acquire);

        ensure_integrity!(
            !this.resizable || this.writable,
            "buffer is resizable but not writable"
        );
        ensure_integrity!(
            nshared < Arc::strong_count(this),
            "buffer has {nshared} shared owners but only {} owners in total",
            Arc::strong_count(this)
        );

        match &this.storage {
            Storage::Memory(memory) => {
                ensure_integrity!(
                    memory.ptr().is_null() == (size == 0),
                    "memory buffer of size {size} has data pointer {:?}",
                    memory.ptr()
                );
            }
            Storage::External(external) => {
                ensure_integrity!(
                    external.ptr().is_null() == (size == 0),
                    "external buffer of size {size} has data pointer {:?}",
                    external.ptr()
                );
                ensure_integrity!(!this.resizable, "external buffer is marked resizable");
            }
            Storage::View(view) => {
                let parent_size = view.parent.size();
                ensure_integrity!(
                    view.offset + view.size <= parent_size,
                    "view of {} bytes at offset {} exceeds its parent of {parent_size} bytes",
                    view.size,
                    view.offset
                );
                ensure_integrity!(!this.resizable, "view buffer is marked resizable");
                Self::verify_integrity(&view.parent.inner)?;
            }
            Storage::Mapped(region) => {
                ensure_integrity!(
                    !this.writable || region.is_writable(),
                    "buffer is writable but its file is mapped read-only"
                );
            }
        }

        if this.contains_objects() {
            let owner_holds_objects = match &this.storage {
                Storage::Memory(_) => true,
                Storage::View(view) => {
                    view.parent.inner.contains_objects() && view.offset % objects::SLOT_SIZE == 0
                }
                Storage::External(_) | Storage::Mapped(_) => false,
            };
            ensure_integrity!(
                owner_holds_objects,
                "object references are stored in a {:?} buffer",
                this.kind()
            );
            ensure_integrity!(
                size % objects::SLOT_SIZE == 0,
                "object buffer of size {size} is not a multiple of the slot size"
            );
        }

        Ok(())
    }
}

impl Drop for BufferImpl {
    fn drop(&mut self) {
        if *self.contains_objects.get_mut() {
            if let Storage::Memory(memory) = &mut self.storage {
                // SAFETY: this is the last reference to the body, which owns its slots.
                unsafe {
                    objects::release_range(memory.ptr(), 0, memory.size() / objects::SLOT_SIZE)
                };
            }
        }
    }
}
