//! This module defines [LatentColumn].

use std::sync::OnceLock;

use crate::{
    buffer::Buffer,
    error::Error,
    management::ByteSized,
    stype::{NaStorage, SType},
};

use super::{
    column_impl::{forward_located_getters, ColumnImpl},
    Column,
};

/// Wraps a virtual column that is materialized the first time one of its
/// elements or buffers is needed. Afterwards, all reads go to the
/// materialized column.
///
/// Concurrent first accesses are serialized; exactly one of them materializes.
#[derive(Debug, Clone)]
pub(crate) struct LatentColumn {
    child: Column,
    vivified: OnceLock<Column>,
}

impl LatentColumn {
    pub(crate) fn new(child: Column) -> Self {
        Self {
            child,
            vivified: OnceLock::new(),
        }
    }

    pub(crate) fn is_vivified(&self) -> bool {
        self.vivified.get().is_some()
    }

    /// Returns the materialized column, materializing it first if needed.
    ///
    /// # Panics
    /// Panics if the column cannot be materialized, e.g., because memory is exhausted.
    pub(crate) fn vivified(&self) -> &Column {
        self.vivified.get_or_init(|| {
            log::trace!(
                "Vivifying latent {} column with {} rows",
                self.child.stype(),
                self.child.nrows()
            );
            let mut column = self.child.clone();
            if let Err(error) = column.materialize(false) {
                panic!("failed to materialize latent column: {error}");
            }
            column
        })
    }

    fn locate(&self, row: usize) -> Option<(&Column, usize)> {
        Some((self.vivified(), row))
    }
}

impl ColumnImpl for LatentColumn {
    fn name(&self) -> &'static str {
        if self.is_vivified() {
            "latent (vivified)"
        } else {
            "latent"
        }
    }

    fn is_virtual(&self) -> bool {
        self.vivified.get().map_or(true, Column::is_virtual)
    }

    fn na_storage(&self) -> NaStorage {
        self.vivified
            .get()
            .map_or(NaStorage::Virtual, Column::na_storage_method)
    }

    fn num_data_buffers(&self) -> usize {
        self.vivified.get().map_or(0, Column::num_data_buffers)
    }

    fn data_buffer(&self, k: usize) -> &Buffer {
        self.vivified().get_data_buffer(k)
    }

    fn data_buffer_mut(&mut self, _k: usize) -> &mut Buffer {
        unreachable!("latent columns are materialized before their buffers are modified")
    }

    fn children(&self) -> Vec<&Column> {
        vec![self.vivified.get().unwrap_or(&self.child)]
    }

    forward_located_getters!();

    fn verify(&self, nrows: usize, stype: SType) -> Result<(), Error> {
        for column in [Some(&self.child), self.vivified.get()].into_iter().flatten() {
            crate::ensure_integrity!(
                column.nrows() == nrows && column.stype() == stype,
                "latent column of {nrows} rows of {stype} wraps {} rows of {}",
                column.nrows(),
                column.stype()
            );
            column.verify_integrity()?;
        }
        Ok(())
    }

    fn prepare_parallel(&self) {
        self.vivified();
    }

    fn size_bytes(&self) -> u64 {
        self.vivified.get().unwrap_or(&self.child).size_bytes()
    }
}
