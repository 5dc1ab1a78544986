//! This module defines [Element], the types column elements can be read as.

use crate::stype::{Object, SType};

use super::{column_impl::ColumnImpl, Column};

mod sealed {
    pub trait Sealed {}
}

/// Rust types that elements of a [Column] can be read as,
/// see [Column::get_element].
pub trait Element: Sized + sealed::Sealed {
    /// Returns whether columns of the given type hold elements of this type.
    fn accepts(stype: SType) -> bool;

    #[doc(hidden)]
    fn read(column: &Column, row: usize) -> Option<Self>;
}

macro_rules! impl_element {
    ($type:ty, $getter:ident, $($stype:pat_param)|+) => {
        impl sealed::Sealed for $type {}

        impl Element for $type {
            fn accepts(stype: SType) -> bool {
                matches!(stype, $($stype)|+)
            }

            fn read(column: &Column, row: usize) -> Option<Self> {
                column.kind().$getter(row)
            }
        }
    };
}

impl_element!(i8, get_i8, SType::Int8);
impl_element!(i16, get_i16, SType::Int16);
impl_element!(i32, get_i32, SType::Int32);
impl_element!(i64, get_i64, SType::Int64);
impl_element!(f32, get_f32, SType::Float32);
impl_element!(f64, get_f64, SType::Float64);
impl_element!(String, get_str, SType::Str32 | SType::Str64);
impl_element!(Object, get_obj, SType::Obj);

impl sealed::Sealed for bool {}

impl Element for bool {
    fn accepts(stype: SType) -> bool {
        stype == SType::Bool
    }

    fn read(column: &Column, row: usize) -> Option<Self> {
        column.kind().get_i8(row).map(|value| value != 0)
    }
}
