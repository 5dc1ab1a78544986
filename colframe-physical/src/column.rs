//! This module defines [Column], a shared handle to the elements of one column.
//!
//! A column either stores its elements in buffers or computes them on demand
//! from other columns ("virtual" columns). Columns are cheap to clone; clones
//! share their body until one of them is modified, at which point the
//! modified handle receives a private copy of the body (copy on write).
//! The buffers and child columns of a copied body remain shared.

mod bitmask_fw;
mod cast;
pub(crate) mod column_impl;
mod const_column;
mod element;
mod ifelse;
mod latent;
mod materialize;
mod rbind;
mod sentinel_fw;
mod sentinel_obj;
mod sentinel_str;
mod value;
mod view;

pub use element::Element;
pub use value::Value;

use std::{
    fmt::Display,
    sync::{Arc, OnceLock},
};

use ascii_tree::{write_tree, Tree};

use crate::{
    buffer::{Buffer, BufferKind, BufferRead, BufferWrite},
    error::Error,
    management::ByteSized,
    rowindex::RowIndex,
    stype::{NaStorage, Object, SType},
};

use bitmask_fw::BitmaskFw;
use cast::CastColumn;
use column_impl::{ColumnImpl, ColumnKind};
use const_column::{ConstColumn, ConstNa};
use ifelse::IfElseColumn;
use latent::LatentColumn;
use rbind::RbindColumn;
use sentinel_fw::SentinelFw;
use sentinel_obj::SentinelObj;
use sentinel_str::SentinelStr;
use view::ViewColumn;

/// Bookkeeping shared by all kinds of columns, together with the kind-specific body.
#[derive(Debug, Clone)]
struct ColumnBody {
    nrows: usize,
    stype: SType,
    /// Number of NA elements, computed on first request
    na_count: OnceLock<usize>,
    kind: ColumnKind,
}

/// Shared handle to a column.
///
/// Elements are read with [Column::get_element]. For the fixed-width types,
/// a stored element equal to the NA sentinel of its type (see [crate::stype::FwElement])
/// is NA, so passing such a value to a constructor stores NA.
#[derive(Debug, Clone)]
pub struct Column {
    body: Arc<ColumnBody>,
}

macro_rules! typed_constructor {
    ($name:ident, $type:ty, $stype:expr) => {
        #[doc = concat!("Creates a column of [`", stringify!($type), "`] values, where `None` is NA.")]
        pub fn $name(values: &[Option<$type>]) -> Result<Self, Error> {
            Ok(Self::from_kind(
                values.len(),
                $stype,
                ColumnKind::Fw(SentinelFw::from_values(values)?),
            ))
        }
    };
}

impl Column {
    fn from_kind(nrows: usize, stype: SType, kind: ColumnKind) -> Self {
        Self {
            body: Arc::new(ColumnBody {
                nrows,
                stype,
                na_count: OnceLock::new(),
                kind,
            }),
        }
    }

    pub(crate) fn kind(&self) -> &ColumnKind {
        &self.body.kind
    }

    /// Returns the body of this column for modification,
    /// copying it first if it is shared with other handles.
    ///
    /// Cached statistics are dropped unless `keep_stats` is set.
    fn mutable_impl(&mut self, keep_stats: bool) -> &mut ColumnBody {
        if Arc::strong_count(&self.body) > 1 {
            log::trace!(
                "Copying shared {} column body with {} handles",
                self.body.kind.name(),
                Arc::strong_count(&self.body)
            );
        }

        let body = Arc::make_mut(&mut self.body);
        if !keep_stats {
            body.na_count = OnceLock::new();
        }
        body
    }

    /// Creates a column of `nrows` elements of type `stype` in fresh memory.
    ///
    /// Numbers start out as zero, strings as empty strings and objects as NA.
    pub fn new_data_column(stype: SType, nrows: usize) -> Result<Self, Error> {
        let kind = match stype {
            SType::Void => ColumnKind::ConstNa(ConstNa),
            SType::Str32 | SType::Str64 => ColumnKind::Str(SentinelStr::new(
                stype,
                Buffer::mem((nrows + 1) * stype.elemsize())?,
                Buffer::default(),
            )),
            SType::Obj => {
                let mut data = Buffer::mem(nrows * stype.elemsize())?;
                data.set_contains_objects();
                ColumnKind::Obj(SentinelObj::new(data))
            }
            _ => ColumnKind::Fw(SentinelFw::new(Buffer::mem(nrows * stype.elemsize())?)),
        };

        Ok(Self::from_kind(nrows, stype, kind))
    }

    /// Creates a column of `nrows` elements of type `stype` that are all NA.
    pub fn new_na_column(nrows: usize, stype: SType) -> Self {
        Self::from_kind(nrows, stype, ColumnKind::ConstNa(ConstNa))
    }

    /// Creates a column of type `stype` over the first `nrows` elements of `data`.
    ///
    /// Fails if `stype` is not a fixed-width type, if `data` is too small,
    /// or if an object column is requested for a buffer not holding objects.
    pub fn new_mbuf_column(stype: SType, nrows: usize, data: Buffer) -> Result<Self, Error> {
        if !stype.is_fixed_width() {
            return Err(Error::Value(format!(
                "A single buffer cannot hold a column of type {stype}"
            )));
        }
        let required = nrows * stype.elemsize();
        if data.size() < required {
            return Err(Error::Value(format!(
                "Buffer of {} bytes is too small for {nrows} elements of type {stype}",
                data.size()
            )));
        }

        let kind = if stype == SType::Obj {
            if !data.contains_objects() {
                return Err(Error::Value(String::from(
                    "Object columns require a buffer holding objects",
                )));
            }
            ColumnKind::Obj(SentinelObj::new(data))
        } else {
            ColumnKind::Fw(SentinelFw::new(data))
        };

        Ok(Self::from_kind(nrows, stype, kind))
    }

    /// Creates a column of type `stype` using all of `data`.
    pub fn from_buffer(stype: SType, data: Buffer) -> Result<Self, Error> {
        let nrows = match stype.elemsize() {
            0 => 0,
            elemsize => data.size() / elemsize,
        };
        Self::new_mbuf_column(stype, nrows, data)
    }

    /// Creates a string column from an offsets buffer and a character buffer.
    ///
    /// `offsets` holds `nrows + 1` offsets of the width of `stype`, the first of
    /// which is zero. Element `i` is NA if the NA bit of offset `i + 1` is set
    /// (see [crate::stype::StrOffset]).
    ///
    /// Fails with [Error::Integrity] if the buffers are inconsistent.
    pub fn new_string_column(
        stype: SType,
        nrows: usize,
        offsets: Buffer,
        strdata: Buffer,
    ) -> Result<Self, Error> {
        if !stype.is_string() {
            return Err(Error::Value(format!(
                "Type {stype} is not a string type"
            )));
        }

        let column = Self::from_kind(
            nrows,
            stype,
            ColumnKind::Str(SentinelStr::new(stype, offsets, strdata)),
        );
        column.verify_integrity()?;
        Ok(column)
    }

    /// Creates a fixed-width column whose validity is given by a separate bit mask,
    /// least significant bit first.
    pub fn new_bitmask_column(
        stype: SType,
        nrows: usize,
        data: Buffer,
        validity: Buffer,
    ) -> Result<Self, Error> {
        if stype == SType::Obj {
            return Err(Error::NotImplemented(String::from(
                "object columns with a validity mask",
            )));
        }
        if !stype.is_fixed_width() {
            return Err(Error::Value(format!(
                "Type {stype} cannot be stored with a validity mask"
            )));
        }

        let column = Self::from_kind(nrows, stype, ColumnKind::Bitmask(BitmaskFw::new(data, validity)));
        column.verify_integrity()?;
        Ok(column)
    }

    /// Creates a column of `nrows` copies of `value`, stored as type `stype`.
    ///
    /// Fails if the value cannot be represented in `stype`.
    pub fn new_const(value: &Value, stype: SType, nrows: usize) -> Result<Self, Error> {
        let canonical = value.convert(stype).ok_or_else(|| {
            Error::Value(format!("Value {value} cannot be stored in a {stype} column"))
        })?;
        Ok(Self::from_kind(
            nrows,
            stype,
            ColumnKind::Const(ConstColumn::new(canonical)),
        ))
    }

    typed_constructor!(from_i8s, i8, SType::Int8);
    typed_constructor!(from_i16s, i16, SType::Int16);
    typed_constructor!(from_i32s, i32, SType::Int32);
    typed_constructor!(from_i64s, i64, SType::Int64);
    typed_constructor!(from_f32s, f32, SType::Float32);
    typed_constructor!(from_f64s, f64, SType::Float64);

    /// Creates a boolean column, where `None` is NA.
    pub fn from_bools(values: &[Option<bool>]) -> Result<Self, Error> {
        let values = values
            .iter()
            .map(|value| value.map(i8::from))
            .collect::<Vec<_>>();
        Ok(Self::from_kind(
            values.len(),
            SType::Bool,
            ColumnKind::Fw(SentinelFw::from_values(&values)?),
        ))
    }

    /// Creates a string column, where `None` is NA.
    ///
    /// The column uses 64-bit offsets only if the strings do not fit otherwise.
    pub fn from_strs<S: AsRef<str>>(values: &[Option<S>]) -> Result<Self, Error> {
        let stype = SentinelStr::stype_for(values);
        Ok(Self::from_kind(
            values.len(),
            stype,
            ColumnKind::Str(SentinelStr::from_strings(values, stype)?),
        ))
    }

    /// Creates a column of host objects, where `None` is NA.
    pub fn from_objects(values: &[Option<Object>]) -> Result<Self, Error> {
        Ok(Self::from_kind(
            values.len(),
            SType::Obj,
            ColumnKind::Obj(SentinelObj::from_objects(values)?),
        ))
    }

    /// Returns a column with the elements of this column converted to `stype`.
    ///
    /// Elements that cannot be converted are NA in the result.
    pub fn cast(&self, stype: SType) -> Column {
        if stype == self.stype() {
            return self.clone();
        }
        if stype == SType::Void || matches!(self.kind(), ColumnKind::ConstNa(_)) {
            return Self::new_na_column(self.nrows(), stype);
        }

        Self::from_kind(
            self.nrows(),
            stype,
            ColumnKind::Cast(CastColumn::new(self.clone(), stype)),
        )
    }

    /// Creates a column that takes the element of row `i` from `values[k]`,
    /// where `k` is the first of the `conditions` that is true in row `i`,
    /// or from the last of the `values` if no condition is true.
    /// If a condition is NA before a true condition is found, the element is NA.
    ///
    /// Fails unless there is one more value column than there are (boolean)
    /// conditions, and all columns have the same number of rows and the value
    /// columns have a common type.
    pub fn ifelse(conditions: Vec<Column>, values: Vec<Column>) -> Result<Column, Error> {
        if values.len() != conditions.len() + 1 {
            return Err(Error::Value(format!(
                "{} conditions require {} value columns, got {}",
                conditions.len(),
                conditions.len() + 1,
                values.len()
            )));
        }
        if let Some(condition) = conditions.iter().find(|c| c.stype() != SType::Bool) {
            return Err(Error::Value(format!(
                "Conditions must be boolean, got {}",
                condition.stype()
            )));
        }

        let nrows = values[0].nrows();
        let stype = values[0].stype();
        if let Some(column) = conditions
            .iter()
            .chain(&values)
            .find(|column| column.nrows() != nrows)
        {
            return Err(Error::Value(format!(
                "Columns of {nrows} and {} rows cannot be combined",
                column.nrows()
            )));
        }
        if let Some(column) = values.iter().find(|column| column.stype() != stype) {
            return Err(Error::Value(format!(
                "Values of type {stype} and {} cannot be combined",
                column.stype()
            )));
        }

        Ok(Self::from_kind(
            nrows,
            stype,
            ColumnKind::IfElse(IfElseColumn::new(conditions, values)),
        ))
    }

    /// Concatenates columns of the same type.
    pub fn rbind(chunks: Vec<Column>) -> Result<Column, Error> {
        let Some(first) = chunks.first() else {
            return Err(Error::Value(String::from(
                "Cannot concatenate an empty list of columns",
            )));
        };
        let stype = first.stype();
        if let Some(chunk) = chunks.iter().find(|chunk| chunk.stype() != stype) {
            return Err(Error::Value(format!(
                "Columns of type {stype} and {} cannot be concatenated",
                chunk.stype()
            )));
        }
        if chunks.len() == 1 {
            return Ok(first.clone());
        }

        let nrows = chunks.iter().map(Column::nrows).sum();
        Ok(Self::from_kind(
            nrows,
            stype,
            ColumnKind::Rbind(RbindColumn::new(chunks)),
        ))
    }

    /// Returns a column that materializes this column the first time
    /// its elements are read, and keeps the result.
    ///
    /// Columns that are not virtual are returned unchanged.
    pub fn latent(&self) -> Column {
        if !self.is_virtual() {
            return self.clone();
        }
        Self::from_kind(
            self.nrows(),
            self.stype(),
            ColumnKind::Latent(LatentColumn::new(self.clone())),
        )
    }

    /// Replaces this column by the rows selected by `ri`.
    ///
    /// Does nothing if `ri` is the falsy row index. Row indices applied
    /// to a view are composed with the row index of the view.
    pub fn apply_rowindex(&mut self, ri: &RowIndex) -> Result<(), Error> {
        if !ri.is_some() {
            return Ok(());
        }
        debug_assert!(
            !ri.max_valid() || ri.max() < self.nrows(),
            "row index refers to row {} of a column with {} rows",
            ri.max(),
            self.nrows()
        );

        let kind = match self.kind() {
            ColumnKind::ConstNa(_) => ColumnKind::ConstNa(ConstNa),
            ColumnKind::View(view) => ColumnKind::View(ViewColumn::new(
                view.arg().clone(),
                ri.uplift_from(view.rowindex())?,
            )),
            _ => {
                // The current body becomes the source of the view and stays untouched.
                let kind = ColumnKind::View(ViewColumn::new(self.clone(), ri.clone()));
                *self = Self::from_kind(ri.size(), self.stype(), kind);
                return Ok(());
            }
        };

        let body = self.mutable_impl(false);
        body.nrows = ri.size();
        body.kind = kind;
        Ok(())
    }

    /// Computes the elements of a virtual column and stores them in buffers.
    ///
    /// If `to_memory` is set, buffers that are not owned heap memory,
    /// such as memory mapped files, are copied into heap memory.
    pub fn materialize(&mut self, to_memory: bool) -> Result<(), Error> {
        let latent = matches!(self.kind(), ColumnKind::Latent(_));
        if (latent || self.is_virtual()) && self.stype() != SType::Void {
            let kind = match self.kind() {
                ColumnKind::Latent(column) => column.vivified().kind().clone(),
                _ => materialize::evaluate(self)?,
            };
            log::debug!(
                "Materialized {} column of {} rows into {}",
                self.kind().name(),
                self.nrows(),
                kind.name()
            );
            self.mutable_impl(true).kind = kind;
        }

        if to_memory
            && (0..self.num_data_buffers())
                .any(|k| self.get_data_buffer(k).kind() != BufferKind::Memory)
        {
            let body = self.mutable_impl(true);
            for k in 0..body.kind.num_data_buffers() {
                body.kind.data_buffer_mut(k).to_memory()?;
            }
        }

        #[cfg(feature = "check_integrity")]
        self.verify_integrity()?;

        Ok(())
    }

    /// Returns the number of elements.
    pub fn nrows(&self) -> usize {
        self.body.nrows
    }

    /// Returns the storage type of the elements.
    pub fn stype(&self) -> SType {
        self.body.stype
    }

    /// Returns element `row`, or `None` if it is NA.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds, or if elements of this column
    /// are not of type `T` (see [Element::accepts]).
    pub fn get_element<T: Element>(&self, row: usize) -> Option<T> {
        assert!(
            T::accepts(self.stype()),
            "elements of a {} column cannot be read as {}",
            self.stype(),
            std::any::type_name::<T>()
        );
        assert!(
            row < self.nrows(),
            "row {row} out of bounds for column of {} rows",
            self.nrows()
        );
        T::read(self, row)
    }

    /// Returns element `row` of any type, or `None` if it is NA.
    pub fn get_value(&self, row: usize) -> Option<Value> {
        match self.stype() {
            SType::Void => {
                assert!(row < self.nrows(), "row {row} out of bounds");
                None
            }
            SType::Bool => self.get_element::<bool>(row).map(Value::Bool),
            SType::Int8 => self.get_element::<i8>(row).map(|v| Value::Int(v.into())),
            SType::Int16 => self.get_element::<i16>(row).map(|v| Value::Int(v.into())),
            SType::Int32 => self.get_element::<i32>(row).map(|v| Value::Int(v.into())),
            SType::Int64 => self.get_element::<i64>(row).map(Value::Int),
            SType::Float32 => self.get_element::<f32>(row).map(Value::Float32),
            SType::Float64 => self.get_element::<f64>(row).map(Value::Float),
            SType::Str32 | SType::Str64 => self.get_element::<String>(row).map(Value::Str),
            SType::Obj => self.get_element::<Object>(row).map(Value::Obj),
        }
    }

    /// Returns element `row` of an integer column widened to [`i64`].
    ///
    /// # Panics
    /// Panics if the column does not have an integer type.
    pub fn get_integer(&self, row: usize) -> Option<i64> {
        match self.stype() {
            SType::Int8 => self.get_element::<i8>(row).map(i64::from),
            SType::Int16 => self.get_element::<i16>(row).map(i64::from),
            SType::Int32 => self.get_element::<i32>(row).map(i64::from),
            SType::Int64 => self.get_element::<i64>(row),
            stype => panic!("column of type {stype} does not hold integers"),
        }
    }

    /// Returns `true` if element `row` is NA.
    pub fn is_na(&self, row: usize) -> bool {
        self.get_value(row).is_none()
    }

    /// Returns the number of NA elements.
    ///
    /// The result is cached until the column is modified.
    pub fn na_count(&self) -> usize {
        *self
            .body
            .na_count
            .get_or_init(|| (0..self.nrows()).filter(|&row| self.is_na(row)).count())
    }

    /// Returns `true` if the elements are computed rather than stored.
    pub fn is_virtual(&self) -> bool {
        self.kind().is_virtual()
    }

    /// Returns how NA elements are represented.
    pub fn na_storage_method(&self) -> NaStorage {
        self.kind().na_storage()
    }

    /// Returns the number of buffers holding the elements of this column.
    ///
    /// Virtual columns have none.
    pub fn num_data_buffers(&self) -> usize {
        self.kind().num_data_buffers()
    }

    /// Returns data buffer `k`.
    ///
    /// For string columns, buffer 0 holds the offsets and buffer 1 the characters.
    /// For bit mask columns, buffer 1 holds the validity bits.
    ///
    /// # Panics
    /// Panics if the column has no buffer `k`.
    pub fn get_data_buffer(&self, k: usize) -> &Buffer {
        self.kind().data_buffer(k)
    }

    /// Returns the contents of data buffer `k` for reading.
    pub fn get_data_readonly(&self, k: usize) -> Result<BufferRead<'_>, Error> {
        self.get_data_buffer(k).try_rdata()
    }

    /// Returns the contents of data buffer `k` for modification.
    ///
    /// The body of the column and the buffer are copied first unless this
    /// handle is their only owner, and cached statistics are dropped.
    /// Latent columns are materialized first.
    pub fn get_data_editable(&mut self, k: usize) -> Result<BufferWrite<'_>, Error> {
        if matches!(self.kind(), ColumnKind::Latent(_)) {
            self.materialize(false)?;
        }
        assert!(
            k < self.num_data_buffers(),
            "{} column has no data buffer {k}",
            self.kind().name()
        );

        let buffer = self.mutable_impl(false).kind.data_buffer_mut(k);
        buffer.ensure_writable()?;
        Ok(buffer.wdata())
    }

    /// Checks the internal consistency of this column and its descendants,
    /// reporting the first problem found.
    pub fn verify_integrity(&self) -> Result<(), Error> {
        self.kind().verify(self.nrows(), self.stype())?;

        if let Some(&cached) = self.body.na_count.get() {
            let actual = (0..self.nrows()).filter(|&row| self.is_na(row)).count();
            crate::ensure_integrity!(
                cached == actual,
                "cached NA count is {cached}, but the column has {actual} NA elements"
            );
        }

        Ok(())
    }

    /// Materializes latent descendants of this column, which must not
    /// happen once worker threads read the column.
    pub fn prepare_parallel(&self) {
        self.kind().prepare_parallel();
    }

    /// Identifies the body of this column. Handles share a body iff their ids are equal.
    pub fn impl_id(&self) -> usize {
        Arc::as_ptr(&self.body) as usize
    }

    /// Returns the number of handles sharing the body of this column.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.body)
    }

    /// Returns the tree of columns this column is computed from.
    pub fn ascii_tree(&self) -> Tree {
        let label = format!(
            "{} [{} x {}]",
            self.kind().name(),
            self.nrows(),
            self.stype()
        );
        let children = self.kind().children();

        if children.is_empty() {
            Tree::Leaf(vec![label])
        } else {
            Tree::Node(label, children.into_iter().map(Column::ascii_tree).collect())
        }
    }

    /// Returns an object that prints the tree of this column.
    pub fn tree(&self) -> ColumnTree<'_> {
        ColumnTree(self)
    }
}

/// Displays a column as a tree, see [Column::tree].
#[derive(Debug, Clone, Copy)]
pub struct ColumnTree<'a>(&'a Column);

impl Display for ColumnTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_tree(f, &self.0.ascii_tree())
    }
}

impl ByteSized for Column {
    fn size_bytes(&self) -> u64 {
        std::mem::size_of::<ColumnBody>() as u64 + self.kind().size_bytes()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use quickcheck_macros::quickcheck;
    use test_log::test;

    use crate::{
        buffer::Buffer,
        error::Error,
        management::ByteSized,
        rowindex::RowIndex,
        stype::{NaStorage, Object, SType},
    };

    use super::{column_impl::ColumnKind, Column, Element, Value};

    fn values<T: Element>(column: &Column) -> Vec<Option<T>> {
        (0..column.nrows())
            .map(|row| column.get_element(row))
            .collect()
    }

    #[test]
    fn materialize_copies_shared_body() {
        let a = Column::from_i32s(&[Some(1), None, Some(3)])
            .unwrap()
            .cast(SType::Float64);
        let mut b = a.clone();
        assert_eq!(a.refcount(), 2);

        b.materialize(false).unwrap();
        assert!(a.is_virtual());
        assert!(!b.is_virtual());
        assert_ne!(a.impl_id(), b.impl_id());
        assert_eq!(values::<f64>(&a), vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(values::<f64>(&b), vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(b.na_storage_method(), NaStorage::Sentinel);
        b.verify_integrity().unwrap();
    }

    #[test]
    fn rowindex_does_not_affect_copies() {
        let a = Column::from_i64s(&[Some(10), Some(20), Some(30), None]).unwrap();
        let mut b = a.clone();
        b.apply_rowindex(&RowIndex::from_array32(&[3, 0, i32::MIN, 2]).unwrap())
            .unwrap();

        assert_eq!(values::<i64>(&b), vec![None, Some(10), None, Some(30)]);
        assert_eq!(
            values::<i64>(&a),
            vec![Some(10), Some(20), Some(30), None]
        );
        assert_eq!(b.num_data_buffers(), 0);
        b.verify_integrity().unwrap();
    }

    #[test]
    fn views_compose() {
        let a = Column::from_i16s(&[Some(0), Some(1), Some(2), Some(3), Some(4)]).unwrap();
        let mut b = a.clone();
        b.apply_rowindex(&RowIndex::slice(1, 3, 1).unwrap()).unwrap();
        b.apply_rowindex(&RowIndex::slice(0, 2, 2).unwrap()).unwrap();

        assert_eq!(values::<i16>(&b), vec![Some(1), Some(3)]);
        match b.kind() {
            ColumnKind::View(view) => assert_eq!(view.arg().impl_id(), a.impl_id()),
            kind => panic!("expected a view, found {kind:?}"),
        }

        let id = b.impl_id();
        b.apply_rowindex(&RowIndex::none()).unwrap();
        assert_eq!(b.impl_id(), id);
    }

    #[test]
    fn void_column_casts_to_na() {
        let void = Column::new_na_column(5, SType::Void);
        let bools = void.cast(SType::Bool);

        assert_eq!(bools.nrows(), 5);
        assert_eq!(bools.stype(), SType::Bool);
        assert_eq!(values::<bool>(&bools), vec![None; 5]);
        assert_eq!(bools.na_count(), 5);

        let mut materialized = bools.clone();
        materialized.materialize(false).unwrap();
        assert_eq!(values::<bool>(&materialized), vec![None; 5]);
        materialized.verify_integrity().unwrap();
    }

    #[test]
    fn failed_conversions_are_na() {
        let strings = Column::from_strs(&[Some("12"), Some("x"), None, Some("300")]).unwrap();
        let ints = strings.cast(SType::Int8);
        assert_eq!(values::<i8>(&ints), vec![Some(12), None, None, None]);

        let floats = Column::from_f64s(&[Some(1e20), Some(-4.5)]).unwrap();
        assert_eq!(
            values::<i32>(&floats.cast(SType::Int32)),
            vec![None, Some(-4)]
        );

        let bools = Column::from_strs(&[Some("true"), Some("no")])
            .unwrap()
            .cast(SType::Bool);
        assert_eq!(values::<bool>(&bools), vec![Some(true), None]);
    }

    #[test]
    fn ifelse_stops_at_na_condition() {
        let first = Column::from_bools(&[Some(true), Some(false), None, Some(false), Some(false)])
            .unwrap();
        let second = Column::from_bools(&[Some(false), Some(true), Some(true), Some(false), None])
            .unwrap();
        let branches = (1..=3)
            .map(|value| Column::from_i32s(&[Some(value); 5]).unwrap())
            .collect();

        let column = Column::ifelse(vec![first, second], branches).unwrap();
        assert!(column.is_virtual());
        assert_eq!(
            values::<i32>(&column),
            vec![Some(1), Some(2), None, Some(3), None]
        );
        column.verify_integrity().unwrap();
    }

    #[test]
    fn ifelse_rejects_mismatches() {
        let condition = Column::from_bools(&[Some(true)]).unwrap();
        let int = Column::from_i32s(&[Some(1)]).unwrap();
        let float = Column::from_f64s(&[Some(1.0)]).unwrap();

        assert!(matches!(
            Column::ifelse(vec![condition.clone()], vec![int.clone()]),
            Err(Error::Value(_))
        ));
        assert!(matches!(
            Column::ifelse(vec![condition.clone()], vec![int.clone(), float]),
            Err(Error::Value(_))
        ));
        assert!(matches!(
            Column::ifelse(vec![int.clone()], vec![int.clone(), int]),
            Err(Error::Value(_))
        ));
    }

    #[test]
    fn rbind_reads_across_chunks() {
        let column = Column::rbind(vec![
            Column::from_i16s(&[Some(1), Some(2)]).unwrap(),
            Column::from_i16s(&[]).unwrap(),
            Column::from_i16s(&[None, Some(4), Some(5)]).unwrap(),
        ])
        .unwrap();

        let expected = vec![Some(1), Some(2), None, Some(4), Some(5)];
        assert_eq!(column.nrows(), 5);
        assert_eq!(values::<i16>(&column), expected);

        let mut materialized = column.clone();
        materialized.materialize(false).unwrap();
        assert_eq!(values::<i16>(&materialized), expected);

        let mixed = Column::rbind(vec![
            Column::from_i16s(&[Some(1)]).unwrap(),
            Column::from_i32s(&[Some(1)]).unwrap(),
        ]);
        assert!(matches!(mixed, Err(Error::Value(_))));
        assert!(Column::rbind(Vec::new()).is_err());
    }

    #[test]
    fn string_columns() {
        let column = Column::from_strs(&[Some("a"), None, Some(""), Some("über")]).unwrap();
        assert_eq!(column.stype(), SType::Str32);
        assert_eq!(column.num_data_buffers(), 2);
        assert_eq!(column.get_element::<String>(3).as_deref(), Some("über"));
        assert_eq!(column.get_element::<String>(1), None);
        assert_eq!(column.get_element::<String>(2).as_deref(), Some(""));
        assert_eq!(column.na_count(), 1);
        column.verify_integrity().unwrap();

        let mut view = column.clone();
        view.apply_rowindex(&RowIndex::slice(3, 3, -1).unwrap()).unwrap();
        view.materialize(false).unwrap();
        assert_eq!(
            values::<String>(&view),
            vec![Some(String::from("über")), Some(String::new()), None]
        );
        view.verify_integrity().unwrap();
    }

    #[test]
    fn corrupt_strings_are_detected() {
        let offsets = Buffer::from_slice(&[0_u32, 3, 1]).unwrap();
        let strdata = Buffer::from_bytes(b"abc").unwrap();
        let result = Column::new_string_column(SType::Str32, 2, offsets, strdata);
        assert!(matches!(result, Err(Error::Integrity(_))));
    }

    #[test]
    fn object_columns_release_objects() {
        let object: Object = Arc::new(5_i32);
        let column = Column::from_objects(&[Some(object.clone()), None]).unwrap();
        assert_eq!(Arc::strong_count(&object), 2);

        let first = column.get_element::<Object>(0).unwrap();
        assert_eq!(first.downcast_ref::<i32>(), Some(&5));
        assert!(column.get_element::<Object>(1).is_none());
        column.verify_integrity().unwrap();

        drop(first);
        drop(column);
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn bitmask_columns() {
        let data = Buffer::from_slice(&[1.5_f64, 0.0, -2.0]).unwrap();
        let validity = Buffer::from_slice(&[0b101_u8]).unwrap();
        let column = Column::new_bitmask_column(SType::Float64, 3, data, validity).unwrap();

        assert_eq!(values::<f64>(&column), vec![Some(1.5), None, Some(-2.0)]);
        assert_eq!(column.na_storage_method(), NaStorage::Bitmask);
        assert_eq!(column.num_data_buffers(), 2);

        let too_short = Buffer::from_slice(&[1_i32]).unwrap();
        let mask = Buffer::from_slice(&[1_u8]).unwrap();
        assert!(matches!(
            Column::new_bitmask_column(SType::Int32, 2, too_short, mask),
            Err(Error::Integrity(_))
        ));

        let objects = Buffer::mem(8).unwrap();
        let mask = Buffer::from_slice(&[1_u8]).unwrap();
        assert!(matches!(
            Column::new_bitmask_column(SType::Obj, 1, objects, mask),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn constant_columns() {
        let column = Column::new_const(&Value::from("7"), SType::Int64, 3).unwrap();
        assert_eq!(values::<i64>(&column), vec![Some(7); 3]);
        assert!(Column::new_const(&Value::from("x"), SType::Int64, 3).is_err());

        let mut flag = Column::new_const(&Value::from(true), SType::Bool, 2).unwrap();
        flag.materialize(false).unwrap();
        assert_eq!(values::<bool>(&flag), vec![Some(true); 2]);
    }

    #[test]
    fn data_columns() {
        let ints = Column::new_data_column(SType::Int32, 3).unwrap();
        assert_eq!(values::<i32>(&ints), vec![Some(0); 3]);

        let strings = Column::new_data_column(SType::Str64, 2).unwrap();
        assert_eq!(values::<String>(&strings), vec![Some(String::new()); 2]);
        strings.verify_integrity().unwrap();

        let objects = Column::new_data_column(SType::Obj, 2).unwrap();
        assert_eq!(objects.na_count(), 2);
    }

    #[test]
    fn na_count_is_cached() {
        let mut column = Column::from_i32s(&[Some(1), None, None])
            .unwrap()
            .cast(SType::Int64);
        assert_eq!(column.na_count(), 2);

        column.materialize(false).unwrap();
        assert_eq!(column.body.na_count.get(), Some(&2));
        column.verify_integrity().unwrap();

        column.get_data_editable(0).unwrap()[8..16].copy_from_slice(&5_i64.to_ne_bytes());
        assert_eq!(column.body.na_count.get(), None);
        assert_eq!(column.na_count(), 1);
    }

    #[test]
    fn editable_data_is_private() {
        let a = Column::from_i32s(&[Some(1), Some(2)]).unwrap();
        let mut b = a.clone();
        b.get_data_editable(0).unwrap()[0..4].copy_from_slice(&7_i32.to_ne_bytes());

        assert_eq!(values::<i32>(&b), vec![Some(7), Some(2)]);
        assert_eq!(values::<i32>(&a), vec![Some(1), Some(2)]);
        assert!(!a.get_data_buffer(0).ptr_eq(b.get_data_buffer(0)));
        assert_eq!(&a.get_data_readonly(0).unwrap()[0..4], &1_i32.to_ne_bytes());
    }

    #[test]
    fn external_buffers_move_to_memory() {
        let bytes = [3_i64, 4].iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<u8>>();
        let mut column = Column::from_buffer(SType::Int64, Buffer::external(bytes)).unwrap();
        assert_eq!(column.nrows(), 2);

        column.materialize(true).unwrap();
        assert_eq!(
            column.get_data_buffer(0).kind(),
            crate::buffer::BufferKind::Memory
        );
        assert_eq!(values::<i64>(&column), vec![Some(3), Some(4)]);
    }

    #[test]
    fn latent_column_keeps_identity() {
        let source = Column::from_i32s(&[Some(1), None, Some(3)])
            .unwrap()
            .cast(SType::Str32);
        let latent = source.latent();
        let clone = latent.clone();
        let id = latent.impl_id();
        assert!(latent.is_virtual());

        assert_eq!(latent.get_element::<String>(0).as_deref(), Some("1"));
        assert!(!latent.is_virtual());
        assert_eq!(latent.num_data_buffers(), 2);
        assert_eq!(latent.impl_id(), id);
        assert_eq!(clone.impl_id(), id);
        assert_eq!(clone.get_element::<String>(2).as_deref(), Some("3"));
        assert_eq!(latent.get_element::<String>(1), None);
        latent.verify_integrity().unwrap();
    }

    #[test]
    fn latent_column_is_vivified_once() {
        let rows = (0..100).map(Some).collect::<Vec<_>>();
        let latent = Column::from_i64s(&rows)
            .unwrap()
            .cast(SType::Float64)
            .latent();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for row in 0..100 {
                        assert_eq!(latent.get_element::<f64>(row), Some(row as f64));
                    }
                });
            }
        });

        match latent.kind() {
            ColumnKind::Latent(column) => assert!(column.is_vivified()),
            kind => panic!("expected a latent column, found {kind:?}"),
        }
    }

    #[test]
    fn editing_latent_column_materializes_it() {
        let mut latent = Column::from_i32s(&[Some(1), Some(2)])
            .unwrap()
            .cast(SType::Int16)
            .latent();
        latent.get_data_editable(0).unwrap()[0..2].copy_from_slice(&9_i16.to_ne_bytes());

        assert!(matches!(latent.kind(), ColumnKind::Fw(_)));
        assert_eq!(values::<i16>(&latent), vec![Some(9), Some(2)]);
    }

    #[test]
    fn tree_shows_children() {
        let mut column = Column::from_i32s(&[Some(1), Some(2)])
            .unwrap()
            .cast(SType::Float32);
        column.apply_rowindex(&RowIndex::slice(1, 1, 1).unwrap()).unwrap();

        let tree = column.tree().to_string();
        assert!(tree.contains("view [1 x float32]"));
        assert!(tree.contains("cast"));
        assert!(tree.contains("sentinel_fw [2 x int32]"));
        assert!(column.size_bytes() > 0);
    }

    #[test]
    fn cast_to_float32_rejects_out_of_range() {
        let doubles = [Some(1e300), Some(-1e300), Some(f64::INFINITY), Some(1.5), None];
        let column = Column::from_f64s(&doubles).unwrap().cast(SType::Float32);
        assert_eq!(
            values::<f32>(&column),
            vec![None, None, Some(f32::INFINITY), Some(1.5), None]
        );
        assert_eq!(column.na_count(), 3);

        let mut materialized = column.clone();
        materialized.materialize(false).unwrap();
        assert_eq!(values::<f32>(&materialized), values::<f32>(&column));
    }

    #[test]
    fn float32_text_keeps_precision() {
        let column = Column::from_f32s(&[Some(0.1), Some(-2.5e-8), None])
            .unwrap()
            .cast(SType::Str32);
        assert_eq!(
            values::<String>(&column),
            vec![Some(String::from("0.1")), Some(String::from("-0.000000025")), None]
        );
        assert!(matches!(
            Column::from_f32s(&[Some(0.1)]).unwrap().get_value(0),
            Some(Value::Float32(v)) if v == 0.1
        ));
    }

    #[test]
    fn apply_rowindex_leaves_clones_alone() {
        let source = Column::from_i64s(&[Some(1), None, Some(3), None]).unwrap();
        let mut view = source.clone();
        view.apply_rowindex(&RowIndex::slice(0, 3, 1).unwrap()).unwrap();
        assert_eq!(view.na_count(), 1);

        let shared = view.clone();
        view.apply_rowindex(&RowIndex::from_rows(&[Some(1), Some(1)]).unwrap())
            .unwrap();
        assert_eq!(view.body.na_count.get(), None);
        assert_eq!(view.na_count(), 2);
        assert_eq!(values::<i64>(&view), vec![None, None]);
        assert_eq!(values::<i64>(&shared), vec![Some(1), None, Some(3)]);
        assert_eq!(shared.na_count(), 1);
        assert_eq!(values::<i64>(&source), vec![Some(1), None, Some(3), None]);

        let mut unique = Column::new_na_column(5, SType::Int32);
        let id = unique.impl_id();
        assert_eq!(unique.na_count(), 5);
        unique.apply_rowindex(&RowIndex::slice(0, 2, 2).unwrap()).unwrap();
        assert_eq!(unique.impl_id(), id);
        assert_eq!(unique.nrows(), 2);
        assert_eq!(unique.na_count(), 2);
        unique.verify_integrity().unwrap();
    }

    #[quickcheck]
    #[cfg_attr(miri, ignore)]
    fn materialize_preserves_values(elements: Vec<Option<i32>>, picks: Vec<u8>) -> bool {
        let source = Column::from_i32s(&elements).unwrap();
        let rows = picks
            .iter()
            .map(|&pick| (!elements.is_empty()).then(|| usize::from(pick) % elements.len()))
            .collect::<Vec<_>>();

        let mut column = source.cast(SType::Float64);
        column.apply_rowindex(&RowIndex::from_rows(&rows).unwrap()).unwrap();
        let computed = values::<f64>(&column);

        let mut materialized = column.clone();
        materialized.materialize(false).unwrap();

        !materialized.is_virtual()
            && values::<f64>(&materialized) == computed
            && values::<f64>(&column) == computed
            && materialized.verify_integrity().is_ok()
    }
}
