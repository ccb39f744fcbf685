//! Pier - manifest resolution for packages that ship precompiled binaries
//!
//! This crate turns a `Pier.toml` package manifest into a fully resolved,
//! validated package: a target graph in build order, effective platform
//! minimums, checksum-verified binary artifacts, resource placements and
//! product closures.

pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test utilities and mocks for Pier unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a mock HTTP transport and on-disk package fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{Dependency, Manifest, Product, Target};
pub use resolver::{ResolveError, ResolvedPackage, TargetGraph};
pub use util::context::GlobalContext;
