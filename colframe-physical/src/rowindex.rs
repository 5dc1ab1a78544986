//! This module defines [RowIndex], an immutable mapping from the rows of
//! a derived column to the rows of its source.
//!
//! A row index is either an arithmetic progression ("slice") or an explicit
//! list of source rows ("array"), which may contain NA slots that map to no
//! source row at all. Row indices are composed with [RowIndex::uplift_from]
//! and complemented with [RowIndex::negate].

pub(crate) mod array;
pub(crate) mod slice;

use std::sync::Arc;

use bitvec::bitvec;

use crate::{
    column::Column,
    error::Error,
    management::ByteSized,
    parallel,
    stype::SType,
};

use array::ArrayIndex;
use slice::SliceIndex;

/// Width of the integers stored by an array row index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    /// Rows are stored as [`i32`]
    Arr32,
    /// Rows are stored as [`i64`]
    Arr64,
}

#[derive(Debug)]
pub(crate) enum RowIndexImpl {
    Slice(SliceIndex),
    Array(ArrayIndex),
}

impl RowIndexImpl {
    fn size(&self) -> usize {
        match self {
            RowIndexImpl::Slice(slice) => slice.count,
            RowIndexImpl::Array(array) => array.length,
        }
    }

    fn get(&self, index: usize) -> Option<usize> {
        match self {
            RowIndexImpl::Slice(slice) => Some(slice.get(index)),
            RowIndexImpl::Array(array) => array.get(index),
        }
    }

    fn max(&self) -> usize {
        match self {
            RowIndexImpl::Slice(slice) => slice.max(),
            RowIndexImpl::Array(array) => array.max,
        }
    }

    fn max_valid(&self) -> bool {
        match self {
            RowIndexImpl::Slice(slice) => slice.count > 0,
            RowIndexImpl::Array(array) => array.max_valid,
        }
    }

    fn is_ascending(&self) -> bool {
        match self {
            RowIndexImpl::Slice(slice) => slice.is_ascending(),
            RowIndexImpl::Array(array) => array.ascending,
        }
    }
}

/// Shared handle to a row mapping.
///
/// The default row index is "none": it is falsy ([RowIndex::is_some] returns `false`)
/// and behaves like the identity when composed with other row indices.
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    inner: Option<Arc<RowIndexImpl>>,
}

impl RowIndex {
    fn from_impl(body: RowIndexImpl) -> Self {
        Self {
            inner: Some(Arc::new(body)),
        }
    }

    /// Returns the falsy row index.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates the row index `start, start + step, ..., start + (count - 1) * step`.
    ///
    /// Fails if any of these rows would be negative.
    pub fn slice(start: usize, count: usize, step: isize) -> Result<Self, Error> {
        Ok(Self::from_impl(RowIndexImpl::Slice(SliceIndex::new(
            start, count, step,
        )?)))
    }

    /// Creates a row index from explicit 32-bit rows, where [`i32::MIN`] marks NA.
    pub fn from_array32(rows: &[i32]) -> Result<Self, Error> {
        Ok(Self::from_impl(RowIndexImpl::Array(ArrayIndex::from_i32s(
            rows,
        )?)))
    }

    /// Creates a row index from explicit 64-bit rows, where [`i64::MIN`] marks NA.
    pub fn from_array64(rows: &[i64]) -> Result<Self, Error> {
        Ok(Self::from_impl(RowIndexImpl::Array(ArrayIndex::from_i64s(
            rows,
        )?)))
    }

    /// Creates an array row index from the given rows, choosing the narrowest width.
    pub fn from_rows(rows: &[Option<usize>]) -> Result<Self, Error> {
        Ok(Self::from_impl(RowIndexImpl::Array(ArrayIndex::from_rows(
            rows,
        )?)))
    }

    /// Creates a row index from a column.
    ///
    /// For a boolean column, the result lists (in ascending order) the rows
    /// whose value is true; NA counts as false. For an integer column,
    /// the values themselves are the rows, NA values become NA slots.
    ///
    /// Fails if an integer column contains negative values
    /// or if the column has any other type.
    pub fn from_column(column: &Column) -> Result<Self, Error> {
        let nrows = column.nrows();

        let rows = match column.stype() {
            SType::Bool => (0..nrows)
                .filter(|&row| column.get_element::<bool>(row) == Some(true))
                .map(Some)
                .collect::<Vec<_>>(),
            stype if stype.is_integer() => {
                let mut rows = Vec::with_capacity(nrows);
                for row in 0..nrows {
                    match column.get_integer(row) {
                        None => rows.push(None),
                        Some(value) => match usize::try_from(value) {
                            Ok(value) => rows.push(Some(value)),
                            Err(_) => {
                                return Err(Error::Value(format!(
                                    "Row indices cannot be negative, found {value} in row {row}"
                                )))
                            }
                        },
                    }
                }
                rows
            }
            stype => {
                return Err(Error::Value(format!(
                    "Column of type {stype} cannot be used as a row index"
                )))
            }
        };

        Self::from_rows(&rows)
    }

    /// Returns `true` unless this is the falsy row index.
    pub fn is_some(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns the number of rows of the mapping (zero for the falsy row index).
    pub fn size(&self) -> usize {
        self.inner.as_deref().map_or(0, RowIndexImpl::size)
    }

    /// Returns the largest source row.
    pub fn max(&self) -> usize {
        self.inner.as_deref().map_or(0, RowIndexImpl::max)
    }

    /// Returns `true` if at least one row maps to a source row.
    pub fn max_valid(&self) -> bool {
        self.inner.as_deref().is_some_and(RowIndexImpl::max_valid)
    }

    /// Returns `true` if the source rows are known to be non-decreasing.
    pub fn is_ascending(&self) -> bool {
        self.inner.as_deref().map_or(true, RowIndexImpl::is_ascending)
    }

    /// Returns `true` if this is an arithmetic progression.
    pub fn is_slice(&self) -> bool {
        matches!(self.inner.as_deref(), Some(RowIndexImpl::Slice(_)))
    }

    /// Returns `true` if the rows are stored explicitly.
    pub fn is_array(&self) -> bool {
        matches!(self.inner.as_deref(), Some(RowIndexImpl::Array(_)))
    }

    /// Returns the first row of a slice.
    pub fn slice_start(&self) -> Option<usize> {
        match self.inner.as_deref() {
            Some(RowIndexImpl::Slice(slice)) => Some(slice.start),
            _ => None,
        }
    }

    /// Returns the step of a slice.
    pub fn slice_step(&self) -> Option<isize> {
        match self.inner.as_deref() {
            Some(RowIndexImpl::Slice(slice)) => Some(slice.step),
            _ => None,
        }
    }

    /// Returns the width of an array row index.
    pub fn width(&self) -> Option<IndexWidth> {
        match self.inner.as_deref() {
            Some(RowIndexImpl::Array(array)) => Some(array.width),
            _ => None,
        }
    }

    /// Returns the buffer holding the rows of an array row index.
    pub fn index_buffer(&self) -> Option<&crate::buffer::Buffer> {
        match self.inner.as_deref() {
            Some(RowIndexImpl::Array(array)) => Some(&array.data),
            _ => None,
        }
    }

    /// Returns the rows of a 32-bit array row index.
    pub fn indices32(&self) -> Option<Vec<i32>> {
        match self.inner.as_deref() {
            Some(RowIndexImpl::Array(array)) if array.width == IndexWidth::Arr32 => {
                Some(array.data.to_vec())
            }
            _ => None,
        }
    }

    /// Returns the rows of a 64-bit array row index.
    pub fn indices64(&self) -> Option<Vec<i64>> {
        match self.inner.as_deref() {
            Some(RowIndexImpl::Array(array)) if array.width == IndexWidth::Arr64 => {
                Some(array.data.to_vec())
            }
            _ => None,
        }
    }

    /// Returns the source row of row `index`, or `None` if it maps to no row.
    ///
    /// The falsy row index maps every row to itself.
    pub fn get_element(&self, index: usize) -> Option<usize> {
        match self.inner.as_deref() {
            None => Some(index),
            Some(body) => {
                assert!(
                    index < body.size(),
                    "row {index} out of bounds for row index of {} rows",
                    body.size()
                );
                body.get(index)
            }
        }
    }

    /// Iterates over the source rows.
    pub fn iter(&self) -> impl Iterator<Item = Option<usize>> + '_ {
        (0..self.size()).map(|index| self.get_element(index))
    }

    /// Composes two row indices.
    ///
    /// If `self` maps the rows of C to the rows of B, and `upper` maps
    /// the rows of B to the rows of A, the result maps the rows of C to the rows of A:
    /// `result[i] = upper[self[i]]`.
    pub fn uplift_from(&self, upper: &RowIndex) -> Result<RowIndex, Error> {
        let (this, up) = match (self.inner.as_deref(), upper.inner.as_deref()) {
            (Some(this), Some(up)) => (this, up),
            (None, _) => return Ok(upper.clone()),
            (_, None) => return Ok(self.clone()),
        };
        debug_assert!(
            !this.max_valid() || this.max() < up.size(),
            "row index references row {} of {} rows",
            this.max(),
            up.size()
        );

        if let RowIndexImpl::Slice(slice) = this {
            if slice.count == 0 {
                return Self::slice(0, 0, 1);
            }
            match up {
                RowIndexImpl::Slice(outer) => {
                    let step = slice.step * outer.step;
                    return Self::slice(outer.get(slice.start), slice.count, step);
                }
                RowIndexImpl::Array(_) if slice.step == 0 => {
                    return match up.get(slice.start) {
                        Some(row) => Self::slice(row, slice.count, 0),
                        None => Self::from_rows(&vec![None; slice.count]),
                    };
                }
                RowIndexImpl::Array(_) => {}
            }
        }

        let rows = parallel::map_range(this.size(), |index| {
            this.get(index).and_then(|row| up.get(row))
        });
        let mut array = ArrayIndex::from_rows(&rows)?;
        array.ascending = array.ascending && this.is_ascending() && up.is_ascending();

        Ok(Self::from_impl(RowIndexImpl::Array(array)))
    }

    /// Returns the rows of `0..nrows` that this index does not map to, in ascending order.
    ///
    /// Duplicate rows and NA slots are allowed. The complement of the falsy
    /// row index (which selects everything) is empty.
    pub fn negate(&self, nrows: usize) -> Result<RowIndex, Error> {
        let Some(body) = self.inner.as_deref() else {
            return Self::slice(0, 0, 1);
        };
        debug_assert!(
            !body.max_valid() || body.max() < nrows,
            "row index references row {} of {nrows} rows",
            body.max()
        );

        if let RowIndexImpl::Slice(slice) = body {
            if slice.step == 1 || slice.count <= 1 {
                if slice.start == 0 {
                    return Self::slice(slice.count, nrows - slice.count, 1);
                }
                if slice.start + slice.count == nrows {
                    return Self::slice(0, slice.start, 1);
                }
            }
        }

        let rows = if body.is_ascending() {
            let mut rows = Vec::with_capacity(nrows.saturating_sub(body.size()));
            let mut next = 0;
            for row in (0..body.size()).filter_map(|index| body.get(index)) {
                while next < row.min(nrows) {
                    rows.push(Some(next));
                    next += 1;
                }
                next = next.max(row + 1);
            }
            rows.extend((next..nrows).map(Some));
            rows
        } else {
            let mut marked = bitvec![0; nrows];
            for row in (0..body.size()).filter_map(|index| body.get(index)) {
                if row < nrows {
                    marked.set(row, true);
                }
            }
            marked.iter_zeros().map(Some).collect()
        };

        Self::from_rows(&rows)
    }

    /// Checks the internal consistency of the row index.
    pub fn verify_integrity(&self) -> Result<(), Error> {
        match self.inner.as_deref() {
            None => Ok(()),
            Some(RowIndexImpl::Slice(slice)) => {
                SliceIndex::new(slice.start, slice.count, slice.step).map(|_| ())
            }
            Some(RowIndexImpl::Array(array)) => array.verify_integrity(),
        }
    }
}

impl ByteSized for RowIndex {
    fn size_bytes(&self) -> u64 {
        match self.inner.as_deref() {
            None => 0,
            Some(RowIndexImpl::Slice(_)) => std::mem::size_of::<RowIndexImpl>() as u64,
            Some(RowIndexImpl::Array(array)) => {
                std::mem::size_of::<RowIndexImpl>() as u64 + array.data.size_bytes()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use quickcheck_macros::quickcheck;
    use test_log::test;

    use crate::{column::Column, error::Error};

    use super::{IndexWidth, RowIndex};

    fn rows(index: &RowIndex) -> Vec<Option<usize>> {
        index.iter().collect()
    }

    #[test]
    fn slice_composition() {
        let inner = RowIndex::slice(2, 3, 2).unwrap();
        let outer = RowIndex::slice(10, 100, 1).unwrap();

        let composed = inner.uplift_from(&outer).unwrap();
        assert!(composed.is_slice());
        assert_eq!(composed.slice_start(), Some(12));
        assert_eq!(composed.size(), 3);
        assert_eq!(composed.slice_step(), Some(2));
        assert_eq!(rows(&composed), vec![Some(12), Some(14), Some(16)]);
    }

    #[test]
    fn negative_slice_is_rejected() {
        assert!(matches!(RowIndex::slice(2, 4, -1), Err(Error::Value(_))));
        let descending = RowIndex::slice(3, 4, -1).unwrap();
        assert_eq!(descending.max(), 3);
        assert!(!descending.is_ascending());
    }

    #[test]
    fn falsy_index_is_identity() {
        let index = RowIndex::from_array32(&[4, 1, i32::MIN]).unwrap();
        let none = RowIndex::none();
        assert!(!none.is_some());
        assert_eq!(none.get_element(7), Some(7));

        assert_eq!(rows(&none.uplift_from(&index).unwrap()), rows(&index));
        assert_eq!(rows(&index.uplift_from(&none).unwrap()), rows(&index));
        assert_eq!(none.negate(10).unwrap().size(), 0);
    }

    #[test]
    fn array_composition() {
        let inner = RowIndex::from_array32(&[3, i32::MIN, 0, 3]).unwrap();
        let outer = RowIndex::from_array64(&[7, 8, 9, i64::MIN]).unwrap();
        assert_eq!(outer.width(), Some(IndexWidth::Arr64));

        let composed = inner.uplift_from(&outer).unwrap();
        assert!(composed.is_array());
        assert_eq!(composed.width(), Some(IndexWidth::Arr32));
        assert_eq!(composed.indices32(), Some(vec![i32::MIN, i32::MIN, 7, i32::MIN]));
        assert!(!composed.is_ascending());
        composed.verify_integrity().unwrap();
    }

    #[test]
    fn array_over_slice() {
        let inner = RowIndex::from_array64(&[2, 0]).unwrap();
        let outer = RowIndex::slice(5, 10, 3).unwrap();
        let composed = inner.uplift_from(&outer).unwrap();
        assert_eq!(composed.width(), Some(IndexWidth::Arr32));
        assert_eq!(rows(&composed), vec![Some(11), Some(5)]);
    }

    #[test]
    fn wide_rows_stay_wide() {
        let big = i64::from(i32::MAX) + 10;
        let inner = RowIndex::slice(0, 2, 1).unwrap();
        let outer = RowIndex::from_array64(&[big, 1, 2]).unwrap();
        let composed = inner.uplift_from(&outer).unwrap();
        assert_eq!(composed.width(), Some(IndexWidth::Arr64));
        assert_eq!(composed.indices64(), Some(vec![big, 1]));
    }

    #[test]
    fn constant_slice_composition() {
        let outer = RowIndex::from_array32(&[i32::MIN, 1, 2, 5]).unwrap();

        let repeated = RowIndex::slice(3, 4, 0).unwrap().uplift_from(&outer).unwrap();
        assert!(repeated.is_slice());
        assert_eq!(rows(&repeated), vec![Some(5); 4]);

        let missing = RowIndex::slice(0, 3, 0).unwrap().uplift_from(&outer).unwrap();
        assert!(missing.is_array());
        assert_eq!(rows(&missing), vec![None; 3]);
        assert!(!missing.max_valid());
        missing.verify_integrity().unwrap();
    }

    #[test]
    fn ascending_is_preserved() {
        let inner = RowIndex::from_array32(&[0, 2, 2, 5]).unwrap();
        let outer = RowIndex::from_array32(&[1, 1, 4, 8, 9, 10]).unwrap();
        assert!(inner.uplift_from(&outer).unwrap().is_ascending());

        let shuffled = RowIndex::from_array32(&[1, 0]).unwrap();
        assert!(!shuffled.uplift_from(&outer).unwrap().is_ascending());
    }

    #[test]
    fn negate_anchored_slices() {
        let head = RowIndex::slice(0, 10, 1).unwrap().negate(25).unwrap();
        assert!(head.is_slice());
        assert_eq!((head.slice_start(), head.size()), (Some(10), 15));

        let tail = RowIndex::slice(15, 10, 1).unwrap().negate(25).unwrap();
        assert!(tail.is_slice());
        assert_eq!((tail.slice_start(), tail.size()), (Some(0), 15));

        let middle = RowIndex::slice(1, 3, 2).unwrap().negate(8).unwrap();
        assert_eq!(
            rows(&middle),
            vec![Some(0), Some(2), Some(4), Some(6), Some(7)]
        );
    }

    #[test]
    fn negate_with_duplicates() {
        let sorted = RowIndex::from_array32(&[1, 1, 3, i32::MIN]).unwrap();
        assert_eq!(rows(&sorted.negate(5).unwrap()), vec![Some(0), Some(2), Some(4)]);

        let unsorted = RowIndex::from_array32(&[3, 1, 3]).unwrap();
        assert_eq!(rows(&unsorted.negate(5).unwrap()), vec![Some(0), Some(2), Some(4)]);
    }

    #[test]
    fn from_bool_column() {
        let column = Column::from_bools(&[Some(false), Some(true), None, Some(true)]).unwrap();
        let index = RowIndex::from_column(&column).unwrap();
        assert!(index.is_array());
        assert!(index.is_ascending());
        assert_eq!(index.indices32(), Some(vec![1, 3]));
    }

    #[test]
    fn from_int_column() {
        let column = Column::from_i16s(&[Some(4), None, Some(0)]).unwrap();
        let index = RowIndex::from_column(&column).unwrap();
        assert_eq!(rows(&index), vec![Some(4), None, Some(0)]);
        assert_eq!(index.max(), 4);
        index.verify_integrity().unwrap();

        let negative = Column::from_i64s(&[Some(1), Some(-2)]).unwrap();
        assert!(matches!(RowIndex::from_column(&negative), Err(Error::Value(_))));

        let floats = Column::from_f64s(&[Some(1.0)]).unwrap();
        assert!(RowIndex::from_column(&floats).is_err());
    }

    #[quickcheck]
    #[cfg_attr(miri, ignore)]
    fn slices_compose(a1: u8, n: u8, s1: i8, a2: u16, s2: i8, extra: u8) -> bool {
        let n = usize::from(n % 20);
        let s1 = isize::from(s1 % 4);
        let a1 = usize::from(a1) + 60;
        let m = a1 + s1.unsigned_abs() * n + 1 + usize::from(extra);
        let s2 = isize::from(s2 % 4);
        let a2 = usize::from(a2) + 4 * m;

        let inner = RowIndex::slice(a1, n, s1).unwrap();
        let outer = RowIndex::slice(a2, m, s2).unwrap();
        let composed = inner.uplift_from(&outer).unwrap();

        if n == 0 {
            return composed.size() == 0;
        }

        composed.is_slice()
            && composed.size() == n
            && composed.slice_step() == Some(s1 * s2)
            && composed.slice_start() == outer.get_element(a1)
            && (0..n).all(|i| {
                composed.get_element(i) == outer.get_element(inner.get_element(i).unwrap())
            })
    }

    #[quickcheck]
    #[cfg_attr(miri, ignore)]
    fn negate_partitions_rows(values: Vec<u16>, sorted: bool) -> bool {
        let nrows = 300;
        let mut values = values
            .into_iter()
            .map(|v| i32::from(v % 300))
            .collect::<Vec<_>>();
        if sorted {
            values.sort_unstable();
        }

        let index = RowIndex::from_array32(&values).unwrap();
        let complement = index.negate(nrows).unwrap();

        let selected = index.iter().flatten().collect::<HashSet<_>>();
        let rest = complement.iter().flatten().collect::<Vec<_>>();

        complement.is_ascending()
            && rest.iter().all(|row| !selected.contains(row))
            && selected.len() + rest.len() == nrows
            && complement.verify_integrity().is_ok()
    }
}
