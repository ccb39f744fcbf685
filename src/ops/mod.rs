//! High-level operations.
//!
//! This module contains the implementation of Pier commands.

pub mod clean;
pub mod resolve;

pub use clean::{clean, CleanResult};
pub use resolve::{fetch_artifacts, resolve, validate_structure, ResolveOptions, Session};
