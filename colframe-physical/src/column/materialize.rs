//! This module evaluates virtual columns into columns that store their elements.

use crate::{
    buffer::Pod,
    error::Error,
    parallel,
    stype::{FwElement, SType},
};

use super::{
    column_impl::{ColumnImpl, ColumnKind},
    const_column::ConstNa,
    sentinel_fw::SentinelFw,
    sentinel_obj::SentinelObj,
    sentinel_str::SentinelStr,
    Column,
};

fn fixed_width<T>(column: &Column, get: fn(&ColumnKind, usize) -> Option<T>) -> Result<ColumnKind, Error>
where
    T: FwElement + Pod + Send,
{
    let values = parallel::map_range(column.nrows(), |row| get(column.kind(), row));
    Ok(ColumnKind::Fw(SentinelFw::from_values(&values)?))
}

/// Computes every element of `column` and stores them in a new body.
pub(crate) fn evaluate(column: &Column) -> Result<ColumnKind, Error> {
    let nrows = column.nrows();
    column.prepare_parallel();

    match column.stype() {
        SType::Void => Ok(ColumnKind::ConstNa(ConstNa)),
        SType::Bool | SType::Int8 => fixed_width::<i8>(column, ColumnKind::get_i8),
        SType::Int16 => fixed_width::<i16>(column, ColumnKind::get_i16),
        SType::Int32 => fixed_width::<i32>(column, ColumnKind::get_i32),
        SType::Int64 => fixed_width::<i64>(column, ColumnKind::get_i64),
        SType::Float32 => fixed_width::<f32>(column, ColumnKind::get_f32),
        SType::Float64 => fixed_width::<f64>(column, ColumnKind::get_f64),
        stype @ (SType::Str32 | SType::Str64) => {
            let values = parallel::map_range(nrows, |row| column.kind().get_str(row));
            Ok(ColumnKind::Str(SentinelStr::from_strings(&values, stype)?))
        }
        SType::Obj => {
            let values = parallel::map_range(nrows, |row| column.kind().get_obj(row));
            Ok(ColumnKind::Obj(SentinelObj::from_objects(&values)?))
        }
    }
}
