//! This module defines [ArrayIndex], an explicit list of rows stored in a buffer.

use crate::{buffer::Buffer, ensure_integrity, error::Error, stype::FwElement};

use super::IndexWidth;

/// Largest length and row number that can be stored with [IndexWidth::Arr32].
const MAX_ARR32: usize = i32::MAX as usize;

/// Rows stored as 32- or 64-bit integers, where the NA sentinel means "no source row".
#[derive(Debug, Clone)]
pub(crate) struct ArrayIndex {
    pub(crate) data: Buffer,
    pub(crate) width: IndexWidth,
    pub(crate) length: usize,
    /// Largest valid row, or zero if there is none.
    pub(crate) max: usize,
    /// Whether any slot holds a row.
    pub(crate) max_valid: bool,
    /// Whether the valid rows are non-decreasing.
    pub(crate) ascending: bool,
}

/// Scan results over the valid rows of an index.
struct Summary {
    max: usize,
    max_valid: bool,
    ascending: bool,
}

fn summarize(rows: impl Iterator<Item = Option<usize>>) -> Summary {
    let mut summary = Summary {
        max: 0,
        max_valid: false,
        ascending: true,
    };
    let mut previous = None;

    for row in rows.flatten() {
        if previous.is_some_and(|previous| row < previous) {
            summary.ascending = false;
        }
        previous = Some(row);
        summary.max = summary.max.max(row);
        summary.max_valid = true;
    }

    summary
}

impl ArrayIndex {
    /// Returns the narrowest width that can hold `length` rows up to `max`.
    pub(crate) fn width_for(length: usize, max: usize) -> IndexWidth {
        if length <= MAX_ARR32 && max <= MAX_ARR32 {
            IndexWidth::Arr32
        } else {
            IndexWidth::Arr64
        }
    }

    /// Builds an index over the given rows, choosing the narrowest width.
    pub(crate) fn from_rows(rows: &[Option<usize>]) -> Result<Self, Error> {
        let summary = summarize(rows.iter().copied());
        let width = Self::width_for(rows.len(), summary.max);

        let data = match width {
            IndexWidth::Arr32 => Buffer::from_slice(
                &rows
                    .iter()
                    .map(|row| row.and_then(|row| i32::try_from(row).ok()).unwrap_or(i32::NA))
                    .collect::<Vec<_>>(),
            )?,
            IndexWidth::Arr64 => Buffer::from_slice(
                &rows
                    .iter()
                    .map(|row| row.and_then(|row| i64::try_from(row).ok()).unwrap_or(i64::NA))
                    .collect::<Vec<_>>(),
            )?,
        };

        Ok(Self {
            data,
            width,
            length: rows.len(),
            max: summary.max,
            max_valid: summary.max_valid,
            ascending: summary.ascending,
        })
    }

    /// Builds an index over 32-bit rows, keeping the width.
    pub(crate) fn from_i32s(values: &[i32]) -> Result<Self, Error> {
        if let Some(position) = values.iter().position(|&v| v < 0 && !v.is_na()) {
            return Err(Error::Value(format!(
                "Row indices cannot be negative, found {} at position {position}",
                values[position]
            )));
        }
        let summary = summarize(values.iter().map(|&v| usize::try_from(v).ok()));

        Ok(Self {
            data: Buffer::from_slice(values)?,
            width: IndexWidth::Arr32,
            length: values.len(),
            max: summary.max,
            max_valid: summary.max_valid,
            ascending: summary.ascending,
        })
    }

    /// Builds an index over 64-bit rows, keeping the width.
    pub(crate) fn from_i64s(values: &[i64]) -> Result<Self, Error> {
        if let Some(position) = values.iter().position(|&v| v < 0 && !v.is_na()) {
            return Err(Error::Value(format!(
                "Row indices cannot be negative, found {} at position {position}",
                values[position]
            )));
        }
        let summary = summarize(values.iter().map(|&v| usize::try_from(v).ok()));

        Ok(Self {
            data: Buffer::from_slice(values)?,
            width: IndexWidth::Arr64,
            length: values.len(),
            max: summary.max,
            max_valid: summary.max_valid,
            ascending: summary.ascending,
        })
    }

    /// Returns the row at `index`, or `None` if the slot is NA.
    pub(crate) fn get(&self, index: usize) -> Option<usize> {
        debug_assert!(index < self.length);
        match self.width {
            IndexWidth::Arr32 => usize::try_from(self.data.get_element::<i32>(index)).ok(),
            IndexWidth::Arr64 => usize::try_from(self.data.get_element::<i64>(index)).ok(),
        }
    }

    pub(crate) fn verify_integrity(&self) -> Result<(), Error> {
        let elemsize = match self.width {
            IndexWidth::Arr32 => 4,
            IndexWidth::Arr64 => 8,
        };
        ensure_integrity!(
            self.data.size() == self.length * elemsize,
            "index buffer has {} bytes, expected {} for {} rows",
            self.data.size(),
            self.length * elemsize,
            self.length
        );
        ensure_integrity!(
            self.width == IndexWidth::Arr64 || self.length <= MAX_ARR32,
            "32-bit index cannot have {} rows",
            self.length
        );

        let negative = match self.width {
            IndexWidth::Arr32 => self
                .data
                .to_vec::<i32>()
                .into_iter()
                .position(|v| v < 0 && !v.is_na()),
            IndexWidth::Arr64 => self
                .data
                .to_vec::<i64>()
                .into_iter()
                .position(|v| v < 0 && !v.is_na()),
        };
        ensure_integrity!(
            negative.is_none(),
            "index holds a negative row at position {}",
            negative.unwrap_or_default()
        );

        let summary = summarize((0..self.length).map(|index| self.get(index)));
        ensure_integrity!(
            summary.max_valid == self.max_valid,
            "index is flagged as having valid rows: {}, but it has: {}",
            self.max_valid,
            summary.max_valid
        );
        ensure_integrity!(
            summary.max == self.max,
            "index records maximum {}, actual maximum is {}",
            self.max,
            summary.max
        );
        ensure_integrity!(
            !self.ascending || summary.ascending,
            "index is flagged ascending but its rows are not sorted"
        );

        self.data.verify_integrity()
    }
}
