//! This module defines [SentinelFw], a column of fixed-width elements stored in one buffer.

use crate::{
    buffer::{Buffer, Pod},
    ensure_integrity,
    error::Error,
    stype::{FwElement, NaStorage, SType},
};

use super::column_impl::ColumnImpl;

/// Fixed-width elements in a single buffer, with NA encoded by the sentinel of the type.
///
/// Booleans are stored as [`i8`].
#[derive(Debug, Clone)]
pub(crate) struct SentinelFw {
    data: Buffer,
}

impl SentinelFw {
    pub(crate) fn new(data: Buffer) -> Self {
        Self { data }
    }

    /// Stores `values`, encoding `None` with the NA sentinel.
    pub(crate) fn from_values<T: FwElement + Pod>(values: &[Option<T>]) -> Result<Self, Error> {
        let raw = values
            .iter()
            .map(|value| value.unwrap_or(T::NA))
            .collect::<Vec<_>>();
        Ok(Self::new(Buffer::from_slice(&raw)?))
    }

    fn get<T: FwElement + Pod>(&self, row: usize) -> Option<T> {
        let value = self.data.get_element::<T>(row);
        (!value.is_na()).then_some(value)
    }
}

impl ColumnImpl for SentinelFw {
    fn name(&self) -> &'static str {
        "sentinel_fw"
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
        assert_eq!(k, 0, "fixed-width columns have a single data buffer");
        &self.data
    }

    fn data_buffer_mut(&mut self, k: usize) -> &mut Buffer {
        assert_eq!(k, 0, "fixed-width columns have a single data buffer");
        &mut self.data
    }

    fn get_i8(&self, row: usize) -> Option<i8> {
        self.get(row)
    }

    fn get_i16(&self, row: usize) -> Option<i16> {
        self.get(row)
    }

    fn get_i32(&self, row: usize) -> Option<i32> {
        self.get(row)
    }

    fn get_i64(&self, row: usize) -> Option<i64> {
        self.get(row)
    }

    fn get_f32(&self, row: usize) -> Option<f32> {
        self.get(row)
    }

    fn get_f64(&self, row: usize) -> Option<f64> {
        self.get(row)
    }

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        ensure_integrity!(
            stype.is_fixed_width() && stype != SType::Obj,
            "fixed-width column cannot have type {stype}"
        );
        let required = nrows * stype.elemsize();
        ensure_integrity!(
            self.data.size() >= required,
            "data buffer has {} bytes, but {nrows} rows of {stype} need {required}",
            self.data.size()
        );

        if stype == SType::Bool {
            let invalid = (0..nrows)
                .map(|row| self.data.get_element::<i8>(row))
                .position(|value| !matches!(value, 0 | 1 | i8::MIN));
            ensure_integrity!(
                invalid.is_none(),
                "boolean column holds value {} in row {}",
                invalid.map_or(0, |row| self.data.get_element::<i8>(row)),
                invalid.unwrap_or_default()
            );
        }

        self.data.verify_integrity()
    }
}
