//! This crate defines the physical storage layer of colframe, i.e.,
//! how column data is owned in memory, how subsets and permutations
//! of rows are expressed without copying, and how derived columns
//! are evaluated lazily.
//! It uses simplified structures and primitive datatypes that may
//! not correspond to the view at a higher (logical) level.

#![deny(missing_debug_implementations)]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    trivial_numeric_casts,
    clippy::cast_possible_wrap
)]

pub mod buffer;
pub mod column;
pub mod config;
pub mod error;
pub mod management;
pub mod parallel;
pub mod rowindex;
pub mod stype;
