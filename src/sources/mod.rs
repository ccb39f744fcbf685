//! Package and artifact sources.
//!
//! Loaders read dependency manifests from disk; the artifact resolver
//! locates local archives and downloads remote ones into a checksum-keyed
//! cache.

pub mod artifact;
pub mod cache;
pub mod fetch;
pub mod path;
pub mod source;

pub use artifact::{Artifact, ArtifactResolver, FetchPolicy};
pub use cache::ArtifactCache;
pub use fetch::{FetchError, Fetcher, HttpFetcher};
pub use path::PathLoader;
pub use source::PackageLoader;
