//! This module defines [ViewColumn].

use crate::{
    ensure_integrity,
    error::Error,
    management::ByteSized,
    rowindex::RowIndex,
    stype::SType,
};

use super::{
    column_impl::{forward_located_getters, ColumnImpl},
    Column,
};

/// Rows of another column, selected through a [RowIndex].
#[derive(Debug, Clone)]
pub(crate) struct ViewColumn {
    arg: Column,
    ri: RowIndex,
}

impl ViewColumn {
    pub(crate) fn new(arg: Column, ri: RowIndex) -> Self {
        Self { arg, ri }
    }

    pub(crate) fn arg(&self) -> &Column {
        &self.arg
    }

    pub(crate) fn rowindex(&self) -> &RowIndex {
        &self.ri
    }

    fn locate(&self, row: usize) -> Option<(&Column, usize)> {
        self.ri.get_element(row).map(|source| (&self.arg, source))
    }
}

impl ColumnImpl for ViewColumn {
    fn name(&self) -> &'static str {
        "view"
    }

    fn children(&self) -> Vec<&Column> {
        vec![&self.arg]
    }

    forward_located_getters!();

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        ensure_integrity!(
            self.ri.size() == nrows,
            "view has {nrows} rows, but its row index selects {}",
            self.ri.size()
        );
        ensure_integrity!(
            self.arg.stype() == stype,
            "view of a {} column has type {stype}",
            self.arg.stype()
        );
        if self.ri.max_valid() {
            ensure_integrity!(
                self.ri.max() < self.arg.nrows(),
                "row index refers to row {}, but the source has {} rows",
                self.ri.max(),
                self.arg.nrows()
            );
        }

        self.ri.verify_integrity()?;
        self.arg.verify_integrity()
    }

    fn size_bytes(&self) -> u64 {
        self.ri.size_bytes() + self.arg.size_bytes()
    }
}
