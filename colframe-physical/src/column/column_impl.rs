//! This module defines the trait [ColumnImpl], which every column body implements,
//! and the closed set [ColumnKind] of all column bodies.

use std::fmt::Debug;

use crate::{
    buffer::Buffer,
    error::Error,
    management::ByteSized,
    stype::{NaStorage, Object, SType},
};

use super::{
    bitmask_fw::BitmaskFw,
    cast::CastColumn,
    const_column::{ConstColumn, ConstNa},
    ifelse::IfElseColumn,
    latent::LatentColumn,
    rbind::RbindColumn,
    sentinel_fw::SentinelFw,
    sentinel_obj::SentinelObj,
    sentinel_str::SentinelStr,
    view::ViewColumn,
    Column,
};

/// Panics for an element type the column does not provide.
/// [Column::get_element] checks the type before calling into a body.
fn unsupported(name: &str, element: &str) -> ! {
    panic!("{name} column does not provide {element} values")
}

/// Behavior shared by all column bodies.
///
/// Element getters return `None` for NA. Only the getters that match
/// the storage type of the column are ever called.
pub(crate) trait ColumnImpl: Debug + Send + Sync {
    /// Short name used when printing column trees.
    fn name(&self) -> &'static str;

    /// Whether the column computes its elements instead of storing them.
    fn is_virtual(&self) -> bool {
        true
    }

    /// How the column represents NA.
    fn na_storage(&self) -> NaStorage {
        NaStorage::Virtual
    }

    /// Number of buffers holding the data of the column.
    fn num_data_buffers(&self) -> usize {
        0
    }

    /// Returns data buffer `k`.
    fn data_buffer(&self, k: usize) -> &Buffer {
        panic!("{} column has no data buffer {k}", self.name())
    }

    /// Returns data buffer `k` for modification.
    fn data_buffer_mut(&mut self, k: usize) -> &mut Buffer {
        panic!("{} column has no data buffer {k}", self.name())
    }

    /// Columns this column computes its elements from.
    fn children(&self) -> Vec<&Column> {
        Vec::new()
    }

    fn get_i8(&self, _row: usize) -> Option<i8> {
        unsupported(self.name(), "int8")
    }

    fn get_i16(&self, _row: usize) -> Option<i16> {
        unsupported(self.name(), "int16")
    }

    fn get_i32(&self, _row: usize) -> Option<i32> {
        unsupported(self.name(), "int32")
    }

    fn get_i64(&self, _row: usize) -> Option<i64> {
        unsupported(self.name(), "int64")
    }

    fn get_f32(&self, _row: usize) -> Option<f32> {
        unsupported(self.name(), "float32")
    }

    fn get_f64(&self, _row: usize) -> Option<f64> {
        unsupported(self.name(), "float64")
    }

    fn get_str(&self, _row: usize) -> Option<String> {
        unsupported(self.name(), "string")
    }

    fn get_obj(&self, _row: usize) -> Option<Object> {
        unsupported(self.name(), "object")
    }

    /// Checks the internal consistency of the body of a column
    /// with the given number of rows and type.
    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error>;

    /// Performs work that must not happen inside a parallel region,
    /// such as materializing latent descendants.
    fn prepare_parallel(&self) {
        for child in self.children() {
            child.prepare_parallel();
        }
    }

    /// Approximate memory used by buffers and children of the column.
    fn size_bytes(&self) -> u64 {
        let buffers = (0..self.num_data_buffers())
            .map(|k| self.data_buffer(k).size_bytes())
            .sum::<u64>();
        let children = self
            .children()
            .iter()
            .map(|child| child.size_bytes())
            .sum::<u64>();
        buffers + children
    }
}

/// Implements all element getters of [ColumnImpl] by forwarding to the
/// column and row returned by `self.locate(row)`; `None` from `locate` means NA.
macro_rules! forward_located_getters {
    () => {
        $crate::column::column_impl::forward_located_getters!(
            get_i8 -> i8,
            get_i16 -> i16,
            get_i32 -> i32,
            get_i64 -> i64,
            get_f32 -> f32,
            get_f64 -> f64,
            get_str -> String,
            get_obj -> $crate::stype::Object
        );
    };
    ($($getter:ident -> $type:ty),*) => {
        $(
            fn $getter(&self, row: usize) -> Option<$type> {
                let (column, row) = self.locate(row)?;
                $crate::column::column_impl::ColumnImpl::$getter(column.kind(), row)
            }
        )*
    };
}

pub(crate) use forward_located_getters;

/// All column bodies.
#[derive(Debug, Clone)]
pub(crate) enum ColumnKind {
    /// Fixed-width elements with sentinel NA
    Fw(SentinelFw),
    /// Fixed-width elements with a validity bit mask
    Bitmask(BitmaskFw),
    /// Strings with flagged offsets
    Str(SentinelStr),
    /// Host objects
    Obj(SentinelObj),
    /// Every element is NA
    ConstNa(ConstNa),
    /// Every element has the same value
    Const(ConstColumn),
    /// Elements of another column converted to a different type
    Cast(CastColumn),
    /// Rows of another column selected by a row index
    View(ViewColumn),
    /// Elements chosen from one of several columns by conditions
    IfElse(IfElseColumn),
    /// Several columns concatenated
    Rbind(RbindColumn),
    /// A virtual column that is materialized on first access
    Latent(LatentColumn),
}

/// Calls a method on whichever body `$self` holds.
macro_rules! forward_to_kind {
    ($self:ident, $func:ident $( ( $( $arg:expr ),* ) )?) => {
        match $self {
            ColumnKind::Fw(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Bitmask(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Str(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Obj(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::ConstNa(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Const(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Cast(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::View(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::IfElse(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Rbind(column) => column.$func($( $( $arg ),* )?),
            ColumnKind::Latent(column) => column.$func($( $( $arg ),* )?),
        }
    };
}

impl ColumnImpl for ColumnKind {
    fn name(&self) -> &'static str {
        forward_to_kind!(self, name)
    }

    fn is_virtual(&self) -> bool {
        forward_to_kind!(self, is_virtual)
    }

    fn na_storage(&self) -> NaStorage {
        forward_to_kind!(self, na_storage)
    }

    fn num_data_buffers(&self) -> usize {
        forward_to_kind!(self, num_data_buffers)
    }

    fn data_buffer(&self, k: usize) -> &Buffer {
        forward_to_kind!(self, data_buffer(k))
    }

    fn data_buffer_mut(&mut self, k: usize) -> &mut Buffer {
        forward_to_kind!(self, data_buffer_mut(k))
    }

    fn children(&self) -> Vec<&Column> {
        forward_to_kind!(self, children)
    }

    fn get_i8(&self, row: usize) -> Option<i8> {
        forward_to_kind!(self, get_i8(row))
    }

    fn get_i16(&self, row: usize) -> Option<i16> {
        forward_to_kind!(self, get_i16(row))
    }

    fn get_i32(&self, row: usize) -> Option<i32> {
        forward_to_kind!(self, get_i32(row))
    }

    fn get_i64(&self, row: usize) -> Option<i64> {
        forward_to_kind!(self, get_i64(row))
    }

    fn get_f32(&self, row: usize) -> Option<f32> {
        forward_to_kind!(self, get_f32(row))
    }

    fn get_f64(&self, row: usize) -> Option<f64> {
        forward_to_kind!(self, get_f64(row))
    }

    fn get_str(&self, row: usize) -> Option<String> {
        forward_to_kind!(self, get_str(row))
    }

    fn get_obj(&self, row: usize) -> Option<Object> {
        forward_to_kind!(self, get_obj(row))
    }

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        forward_to_kind!(self, verify(nrows, stype))
    }

    fn prepare_parallel(&self) {
        forward_to_kind!(self, prepare_parallel)
    }

    fn size_bytes(&self) -> u64 {
        forward_to_kind!(self, size_bytes)
    }
}
