//! This module defines [SliceIndex], an arithmetic progression of rows.

use crate::error::Error;

/// Rows `start, start + step, ..., start + (count - 1) * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SliceIndex {
    pub(crate) start: usize,
    pub(crate) count: usize,
    pub(crate) step: isize,
}

impl SliceIndex {
    /// Checks that every row of the progression is a valid row number.
    pub(crate) fn new(start: usize, count: usize, step: isize) -> Result<Self, Error> {
        if count > 0 {
            let last = start as i128 + step as i128 * (count as i128 - 1);
            if last < 0 || last > isize::MAX as i128 || start > isize::MAX as usize {
                return Err(Error::Value(format!(
                    "Slice ({start}, {count}, {step}) references rows outside of 0..{}",
                    isize::MAX
                )));
            }
        }

        Ok(Self { start, count, step })
    }

    /// Returns the `index`-th row of the progression.
    pub(crate) fn get(&self, index: usize) -> usize {
        debug_assert!(index < self.count);
        let distance = self.step.unsigned_abs() * index;
        if self.step >= 0 {
            self.start + distance
        } else {
            self.start - distance
        }
    }

    /// Largest row, or zero for an empty slice.
    pub(crate) fn max(&self) -> usize {
        match self.count {
            0 => 0,
            _ if self.step >= 0 => self.get(self.count - 1),
            _ => self.start,
        }
    }

    pub(crate) fn is_ascending(&self) -> bool {
        self.step >= 0
    }
}
