//! This module defines the constant columns [ConstNa] and [ConstColumn].

use crate::{
    ensure_integrity,
    error::Error,
    stype::{Object, SType},
};

use super::{column_impl::ColumnImpl, value::Value};

/// Column in which every element is NA.
#[derive(Debug, Clone)]
pub(crate) struct ConstNa;

impl ColumnImpl for ConstNa {
    fn name(&self) -> &'static str {
        "const_na"
    }

    fn get_i8(&self, _row: usize) -> Option<i8> {
        None
    }

    fn get_i16(&self, _row: usize) -> Option<i16> {
        None
    }

    fn get_i32(&self, _row: usize) -> Option<i32> {
        None
    }

    fn get_i64(&self, _row: usize) -> Option<i64> {
        None
    }

    fn get_f32(&self, _row: usize) -> Option<f32> {
        None
    }

    fn get_f64(&self, _row: usize) -> Option<f64> {
        None
    }

    fn get_str(&self, _row: usize) -> Option<String> {
        None
    }

    fn get_obj(&self, _row: usize) -> Option<Object> {
        None
    }

    fn verify(&self, _nrows: usize, _stype: SType) -> Result<(), Error> {
        Ok(())
    }
}

/// Column repeating a single value, which is stored in the canonical
/// representation for the type of the column (see [Value::convert]).
#[derive(Debug, Clone)]
pub(crate) struct ConstColumn {
    value: Value,
}

impl ConstColumn {
    pub(crate) fn new(value: Value) -> Self {
        Self { value }
    }
}

impl ColumnImpl for ConstColumn {
    fn name(&self) -> &'static str {
        "const"
    }

    fn get_i8(&self, _row: usize) -> Option<i8> {
        match self.value {
            Value::Bool(value) => Some(i8::from(value)),
            _ => self.value.to_int(),
        }
    }

    fn get_i16(&self, _row: usize) -> Option<i16> {
        self.value.to_int()
    }

    fn get_i32(&self, _row: usize) -> Option<i32> {
        self.value.to_int()
    }

    fn get_i64(&self, _row: usize) -> Option<i64> {
        self.value.to_int()
    }

    fn get_f32(&self, _row: usize) -> Option<f32> {
        self.value.to_f32()
    }

    fn get_f64(&self, _row: usize) -> Option<f64> {
        self.value.to_f64()
    }

    fn get_str(&self, _row: usize) -> Option<String> {
        self.value.to_text()
    }

    fn get_obj(&self, _row: usize) -> Option<Object> {
        self.value.to_object()
    }

    fn verify(&self, _nrows: usize, stype: SType) -> Result<(), Error> {
        let canonical = self.value.convert(stype);
        ensure_integrity!(
            canonical.is_some(),
            "constant {} cannot be stored in a {stype} column",
            self.value
        );
        Ok(())
    }
}
