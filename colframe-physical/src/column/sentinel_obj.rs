//! This module defines [SentinelObj], a column of host objects.

use crate::{
    buffer::Buffer,
    ensure_integrity,
    error::Error,
    stype::{NaStorage, Object, SType},
};

use super::column_impl::ColumnImpl;

/// References to host objects stored in an object buffer; a null slot is NA.
#[derive(Debug, Clone)]
pub(crate) struct SentinelObj {
    data: Buffer,
}

impl SentinelObj {
    pub(crate) fn new(data: Buffer) -> Self {
        debug_assert!(data.contains_objects());
        Self { data }
    }

    pub(crate) fn from_objects(values: &[Option<Object>]) -> Result<Self, Error> {
        let mut data = Buffer::mem(values.len() * SType::Obj.elemsize())?;
        data.set_contains_objects();
        for (row, value) in values.iter().enumerate() {
            if value.is_some() {
                data.set_object(row, value.clone());
            }
        }
        Ok(Self::new(data))
    }
}

impl ColumnImpl for SentinelObj {
    fn name(&self) -> &'static str {
        "sentinel_obj"
    }

    fn is_virtual(&self) -> bool {
        false
    }

    fn na_storage(&self) -> NaStorage {
        NaStorage::Sentinel
    }

    fn num_data_buffers(&self) -> usize {
        1
    }

    fn data_buffer(&self, k: usize) -> &Buffer {
        assert_eq!(k, 0, "object columns have a single data buffer");
        &self.data
    }

    fn data_buffer_mut(&mut self, k: usize) -> &mut Buffer {
        assert_eq!(k, 0, "object columns have a single data buffer");
        &mut self.data
    }

    fn get_obj(&self, row: usize) -> Option<Object> {
        self.data.get_object(row)
    }

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        ensure_integrity!(stype == SType::Obj, "object column cannot have type {stype}");
        ensure_integrity!(
            self.data.contains_objects(),
            "data buffer of an object column is not marked as holding objects"
        );
        ensure_integrity!(
            self.data.size() >= nrows * stype.elemsize(),
            "data buffer has {} bytes, which is too small for {nrows} objects",
            self.data.size()
        );
        self.data.verify_integrity()
    }
}
