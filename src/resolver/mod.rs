//! Target graph resolution.
//!
//! Builds the target graph, validates platform constraints and composes
//! products. Everything here is pure over already-loaded manifests; network
//! and filesystem work lives in `sources`.

pub mod errors;
pub mod graph;
pub mod platform;
pub mod product;
pub mod resolved;

pub use errors::ResolveError;
pub use graph::{TargetGraph, TargetNode};
pub use platform::{EffectivePlatforms, RaisedFloor};
pub use product::ComposedProduct;
pub use resolved::{ResolvedPackage, ResolvedTarget};
