//! Common utilities and types shared across drivetool crates.
//!
//! This module provides the error taxonomy every layer reports through and
//! the small value types that cross crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{Descriptor, FolderId};
