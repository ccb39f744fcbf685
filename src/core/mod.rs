//! Core data structures for Pier.
//!
//! This module contains the manifest model:
//! - Packages, platforms and products
//! - Targets and their dependency edges
//! - Resources and their bundle placement

pub mod dependency;
pub mod manifest;
pub mod platform;
pub mod product;
pub mod resource;
pub mod target;

pub use dependency::{Dependency, DependencySource};
pub use manifest::{Manifest, MANIFEST_NAME};
pub use platform::{OsVersion, Platform, PlatformName};
pub use product::{Linkage, Product, ProductKind};
pub use resource::{HandlingPolicy, Placement, Resource};
pub use target::{Provisioning, Target, TargetDep, TargetKind};
