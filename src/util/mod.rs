//! Shared utilities

pub mod config;
pub mod context;
pub mod fs;
pub mod hash;

pub use config::Config;
pub use context::GlobalContext;
pub use hash::ChecksumAlgorithm;
