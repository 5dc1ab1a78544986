//! Helpers for buffers whose elements are references to host objects.
//!
//! Every slot holds a raw pointer obtained from [Box::into_raw] on a boxed
//! [Object], or null for NA. The buffer owns one reference per non-null slot.

use std::ptr;

use crate::stype::Object;

/// Size of one slot in bytes.
pub(crate) const SLOT_SIZE: usize = std::mem::size_of::<*mut Object>();

/// Reads the slot at `index`.
///
/// # Safety
/// `data` must point to at least `(index + 1) * SLOT_SIZE` readable bytes.
unsafe fn read_slot(data: *const u8, index: usize) -> *mut Object {
    ptr::read_unaligned(data.add(index * SLOT_SIZE).cast::<*mut Object>())
}

/// # Safety
/// `data` must point to at least `(index + 1) * SLOT_SIZE` writable bytes.
unsafe fn write_slot(data: *mut u8, index: usize, slot: *mut Object) {
    ptr::write_unaligned(data.add(index * SLOT_SIZE).cast::<*mut Object>(), slot)
}

fn into_slot(object: Option<Object>) -> *mut Object {
    match object {
        Some(object) => Box::into_raw(Box::new(object)),
        None => ptr::null_mut(),
    }
}

/// Returns a new reference to the object in slot `index`.
///
/// # Safety
/// `data` must hold at least `index + 1` valid slots.
pub(crate) unsafe fn get(data: *const u8, index: usize) -> Option<Object> {
    let slot = read_slot(data, index);
    slot.as_ref().cloned()
}

/// Replaces the object in slot `index`, releasing the previous one.
///
/// # Safety
/// `data` must hold at least `index + 1` valid slots and be exclusively writable.
pub(crate) unsafe fn set(data: *mut u8, index: usize, object: Option<Object>) {
    let old = read_slot(data, index);
    write_slot(data, index, into_slot(object));
    if !old.is_null() {
        drop(Box::from_raw(old));
    }
}

/// Replaces every slot in `data[..size]` by a new reference to the same object.
/// Used after the bytes of an object buffer were copied.
///
/// # Safety
/// `data` must hold `size / SLOT_SIZE` valid slots, which are owned by another buffer.
pub(crate) unsafe fn duplicate_all(data: *mut u8, size: usize) {
    for index in 0..size / SLOT_SIZE {
        let slot = read_slot(data, index);
        if let Some(object) = slot.as_ref() {
            write_slot(data, index, into_slot(Some(object.clone())));
        }
    }
}

/// Releases the slots `from..to` and sets them to NA.
///
/// # Safety
/// `data` must hold at least `to` valid slots that are owned by the caller.
pub(crate) unsafe fn release_range(data: *mut u8, from: usize, to: usize) {
    for index in from..to {
        let slot = read_slot(data, index);
        if !slot.is_null() {
            write_slot(data, index, ptr::null_mut());
            drop(Box::from_raw(slot));
        }
    }
}
