//! This module defines [RbindColumn].

use crate::{
    ensure_integrity,
    error::Error,
    management::{bytesized::size_inner_vec_flat, ByteSized},
    stype::SType,
};

use super::{
    column_impl::{forward_located_getters, ColumnImpl},
    Column,
};

/// Several columns of the same type, one after another.
#[derive(Debug, Clone)]
pub(crate) struct RbindColumn {
    chunks: Vec<Column>,
    /// First row of each chunk
    starts: Vec<usize>,
}

impl RbindColumn {
    pub(crate) fn new(chunks: Vec<Column>) -> Self {
        let starts = chunks
            .iter()
            .scan(0, |next, chunk| {
                let start = *next;
                *next += chunk.nrows();
                Some(start)
            })
            .collect();
        Self { chunks, starts }
    }

    fn locate(&self, row: usize) -> Option<(&Column, usize)> {
        // Empty chunks share their start with the following chunk
        // and are skipped by searching for the last matching start.
        let index = self.starts.partition_point(|&start| start <= row) - 1;
        Some((&self.chunks[index], row - self.starts[index]))
    }
}

impl ColumnImpl for RbindColumn {
    fn name(&self) -> &'static str {
        "rbind"
    }

    fn children(&self) -> Vec<&Column> {
        self.chunks.iter().collect()
    }

    forward_located_getters!();

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        let total = self.chunks.iter().map(Column::nrows).sum::<usize>();
        ensure_integrity!(
            total == nrows,
            "rbind column has {nrows} rows, but its chunks have {total}"
        );
        for (index, chunk) in self.chunks.iter().enumerate() {
            ensure_integrity!(
                chunk.stype() == stype,
                "chunk {index} of an rbind column of type {stype} has type {}",
                chunk.stype()
            );
        }

        self.chunks.iter().try_for_each(Column::verify_integrity)
    }

    fn size_bytes(&self) -> u64 {
        let chunks = self.chunks.iter().map(Column::size_bytes).sum::<u64>();
        chunks + size_inner_vec_flat(&self.starts)
    }
}
