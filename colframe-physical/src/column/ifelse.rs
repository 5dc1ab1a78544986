//! This module defines [IfElseColumn].

use crate::{ensure_integrity, error::Error, stype::SType};

use super::{
    column_impl::{forward_located_getters, ColumnImpl},
    Column,
};

/// Chooses each element from one of several columns.
///
/// Row `i` takes its value from `values[k]`, where `k` is the first
/// condition that is true in row `i`, or from the last entry of `values`
/// if no condition holds. An NA condition encountered before that decides
/// the row makes the element NA.
#[derive(Debug, Clone)]
pub(crate) struct IfElseColumn {
    conditions: Vec<Column>,
    values: Vec<Column>,
}

impl IfElseColumn {
    /// `values` has exactly one more entry than `conditions`.
    pub(crate) fn new(conditions: Vec<Column>, values: Vec<Column>) -> Self {
        debug_assert_eq!(conditions.len() + 1, values.len());
        Self { conditions, values }
    }

    fn locate(&self, row: usize) -> Option<(&Column, usize)> {
        for (condition, value) in self.conditions.iter().zip(&self.values) {
            if condition.get_element::<bool>(row)? {
                return Some((value, row));
            }
        }
        self.values.last().map(|value| (value, row))
    }
}

impl ColumnImpl for IfElseColumn {
    fn name(&self) -> &'static str {
        "ifelse"
    }

    fn children(&self) -> Vec<&Column> {
        self.conditions.iter().chain(&self.values).collect()
    }

    forward_located_getters!();

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        ensure_integrity!(
            self.conditions.len() + 1 == self.values.len(),
            "{} conditions require {} value columns, found {}",
            self.conditions.len(),
            self.conditions.len() + 1,
            self.values.len()
        );
        for condition in &self.conditions {
            ensure_integrity!(
                condition.stype() == SType::Bool,
                "condition column has type {}",
                condition.stype()
            );
        }
        for column in self.children() {
            ensure_integrity!(
                column.nrows() == nrows,
                "ifelse column has {nrows} rows, but one of its arguments has {}",
                column.nrows()
            );
        }
        for value in &self.values {
            ensure_integrity!(
                value.stype() == stype,
                "ifelse column of type {stype} chooses from a {} column",
                value.stype()
            );
        }

        self.children()
            .into_iter()
            .try_for_each(Column::verify_integrity)
    }
}
