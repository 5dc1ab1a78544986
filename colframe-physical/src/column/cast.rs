//! This module defines [CastColumn].

use crate::{
    ensure_integrity,
    error::Error,
    stype::{Object, SType},
};

use super::{column_impl::ColumnImpl, value::Value, Column};

/// Reads the elements of another column and converts them to the type of this column.
///
/// An element is NA if the source element is NA or cannot be converted.
#[derive(Debug, Clone)]
pub(crate) struct CastColumn {
    arg: Column,
    target: SType,
}

impl CastColumn {
    pub(crate) fn new(arg: Column, target: SType) -> Self {
        Self { arg, target }
    }

    fn source(&self, row: usize) -> Option<Value> {
        self.arg.get_value(row)
    }
}

impl ColumnImpl for CastColumn {
    fn name(&self) -> &'static str {
        "cast"
    }

    fn children(&self) -> Vec<&Column> {
        vec![&self.arg]
    }

    fn get_i8(&self, row: usize) -> Option<i8> {
        let value = self.source(row)?;
        if self.target == SType::Bool {
            value.to_bool().map(i8::from)
        } else {
            value.to_int()
        }
    }

    fn get_i16(&self, row: usize) -> Option<i16> {
        self.source(row)?.to_int()
    }

    fn get_i32(&self, row: usize) -> Option<i32> {
        self.source(row)?.to_int()
    }

    fn get_i64(&self, row: usize) -> Option<i64> {
        self.source(row)?.to_int()
    }

    fn get_f32(&self, row: usize) -> Option<f32> {
        self.source(row)?.to_f32()
    }

    fn get_f64(&self, row: usize) -> Option<f64> {
        self.source(row)?.to_f64()
    }

    fn get_str(&self, row: usize) -> Option<String> {
        self.source(row)?.to_text()
    }

    fn get_obj(&self, row: usize) -> Option<Object> {
        self.source(row)?.to_object()
    }

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        ensure_integrity!(
            stype == self.target,
            "cast to {} is stored in a {stype} column",
            self.target
        );
        ensure_integrity!(
            self.arg.nrows() == nrows,
            "cast column has {nrows} rows, but its source has {}",
            self.arg.nrows()
        );
        self.arg.verify_integrity()
    }
}
