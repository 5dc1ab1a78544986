//! This module collects functionality for keeping track of resources
//! used by buffers, row indices and columns.

pub mod bytesized;
pub use bytesized::ByteSized;
