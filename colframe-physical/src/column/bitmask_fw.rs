//! This module defines [BitmaskFw], a fixed-width column whose validity
//! is kept in a separate bit mask.

use bitvec::{order::Lsb0, slice::BitSlice, vec::BitVec};

use crate::{
    buffer::{Buffer, Pod},
    ensure_integrity,
    error::Error,
    stype::{NaStorage, SType},
};

use super::column_impl::ColumnImpl;

/// Fixed-width elements in one buffer and one validity bit per row in another.
///
/// Bits are stored least significant first; a set bit marks a valid element.
/// The value stored for an invalid element is irrelevant.
#[derive(Debug, Clone)]
pub(crate) struct BitmaskFw {
    data: Buffer,
    validity: Buffer,
}

impl BitmaskFw {
    pub(crate) fn new(data: Buffer, validity: Buffer) -> Self {
        Self { data, validity }
    }

    /// Stores `values`, marking `None` as invalid.
    pub(crate) fn from_values<T: Pod + Default>(values: &[Option<T>]) -> Result<Self, Error> {
        let raw = values
            .iter()
            .map(|value| value.unwrap_or_default())
            .collect::<Vec<_>>();
        let bits = values.iter().map(Option::is_some).collect::<BitVec<u8, Lsb0>>();

        Ok(Self::new(
            Buffer::from_slice(&raw)?,
            Buffer::from_slice(bits.as_raw_slice())?,
        ))
    }

    fn is_valid(&self, row: usize) -> bool {
        let bytes = self.validity.rdata();
        BitSlice::<u8, Lsb0>::from_slice(&bytes)[row]
    }

    fn get<T: Pod>(&self, row: usize) -> Option<T> {
        self.is_valid(row)
            .then(|| self.data.get_element::<T>(row))
    }
}

impl ColumnImpl for BitmaskFw {
    fn name(&self) -> &'static str {
        "bitmask_fw"
    }

    fn is_virtual(&self) -> bool {
        false
    }

    fn na_storage(&self) -> NaStorage {
        NaStorage::Bitmask
    }

    fn num_data_buffers(&self) -> usize {
        2
    }

    fn data_buffer(&self, k: usize) -> &Buffer {
        match k {
            0 => &self.data,
            1 => &self.validity,
            _ => panic!("bit mask columns have two data buffers, requested {k}"),
        }
    }

    fn data_buffer_mut(&mut self, k: usize) -> &mut Buffer {
        match k {
            0 => &mut self.data,
            1 => &mut self.validity,
            _ => panic!("bit mask columns have two data buffers, requested {k}"),
        }
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
            "bit mask column cannot have type {stype}"
        );
        let required = nrows * stype.elemsize();
        ensure_integrity!(
            self.data.size() >= required,
            "data buffer has {} bytes, but {nrows} rows of {stype} need {required}",
            self.data.size()
        );
        ensure_integrity!(
            self.validity.size() >= nrows.div_ceil(8),
            "validity buffer has {} bytes, which is too small for {nrows} rows",
            self.validity.size()
        );

        self.data.verify_integrity()?;
        self.validity.verify_integrity()
    }
}
