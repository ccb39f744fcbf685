//! Resolution error types and diagnostics.
//!
//! Every variant names the target, product, or package that caused it so
//! the message is actionable without re-running with `--verbose`.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Error during package resolution.
///
/// All variants are terminal for a resolution run.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("malformed manifest for `{package}`: {message}")]
    #[diagnostic(
        code(pier::manifest::malformed),
        help("Check Pier.toml against the manifest format")
    )]
    MalformedManifest { package: String, message: String },

    #[error("target `{from}` depends on `{reference}`, which does not exist")]
    #[diagnostic(
        code(pier::graph::dangling),
        help("Declare the target, or add the exporting package to [[dependencies]]")
    )]
    DanglingReference { from: String, reference: String },

    #[error("cycle detected in target graph: {}", .cycle.join(" -> "))]
    #[diagnostic(
        code(pier::graph::cycle),
        help("Break the cycle by removing or restructuring dependencies")
    )]
    CyclicDependency { cycle: Vec<String> },

    #[error("conflicting {platform} requirements for `{target}`: {first} vs {second}")]
    #[diagnostic(
        code(pier::platform::conflict),
        help("Declare each platform at most once")
    )]
    PlatformConflict {
        target: String,
        platform: String,
        first: String,
        second: String,
    },

    #[error("product `{product}` cannot be satisfied: {reason}")]
    #[diagnostic(code(pier::product::unsatisfiable))]
    UnsatisfiableProduct { product: String, reason: String },

    #[error("artifact for `{target}` not found at {}", .path.display())]
    #[diagnostic(code(pier::artifact::not_found))]
    ArtifactNotFound { target: String, path: PathBuf },

    #[error(
        "checksum mismatch for `{target}` ({url}):\n  expected: {expected}\n  actual:   {actual}"
    )]
    #[diagnostic(
        code(pier::artifact::checksum),
        help("The downloaded archive is not the one the manifest pins; do not update the checksum without auditing the new binary")
    )]
    ChecksumMismatch {
        target: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("failed to download artifact for `{target}` from {url} after {attempts} attempt(s): {message}")]
    #[diagnostic(
        code(pier::artifact::network),
        help("Check your network connection and try again")
    )]
    Network {
        target: String,
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("resource `{path}` in `{target}` has unknown rule `{rule}`")]
    #[diagnostic(
        code(pier::resource::unknown_kind),
        help("Use rule = \"copy\" or rule = \"process\"")
    )]
    UnknownResourceKind {
        target: String,
        path: String,
        rule: String,
    },

    #[error("dependency `{package}` is not available at {}", .path.display())]
    #[diagnostic(
        code(pier::dependency::unavailable),
        help("Check out the pinned dependency before resolving")
    )]
    DependencyUnavailable { package: String, path: PathBuf },

    #[error("resolution of `{target}` was cancelled")]
    #[diagnostic(code(pier::cancelled))]
    Cancelled { target: String },

    #[error("I/O error for `{target}`: {message}")]
    #[diagnostic(code(pier::io))]
    Io { target: String, message: String },
}

impl ResolveError {
    /// Create a malformed manifest error.
    pub fn malformed(package: impl Into<String>, message: impl Into<String>) -> Self {
        ResolveError::MalformedManifest {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Wrap an internal failure that happened while working on a target.
    pub fn io(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ResolveError::Io {
            target: target.into(),
            message: format!("{:#}", err),
        }
    }

    /// Whether this error is only a consequence of another failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ResolveError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = ResolveError::CyclicDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "cycle detected in target graph: A -> B -> A");
    }

    #[test]
    fn test_checksum_message_names_target() {
        let err = ResolveError::ChecksumMismatch {
            target: "Core".into(),
            url: "https://example.com/core.zip".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("`Core`"));
        assert!(msg.contains("expected: aa"));
    }

    #[test]
    fn test_cancellation_flag() {
        assert!(ResolveError::Cancelled { target: "x".into() }.is_cancellation());
        assert!(!ResolveError::malformed("p", "m").is_cancellation());
    }
}
