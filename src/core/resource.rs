//! Resource declarations and placement.
//!
//! Resources are files a target ships inside its bundle. A `copy` resource
//! passes through byte-for-byte; a `process` resource goes through an
//! external platform tool first (storyboard compiler, asset catalog
//! compiler, ...). Classification only decides where each resource lands
//! and which side of that boundary it belongs to.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::resolver::errors::ResolveError;

/// How a resource is handled when bundling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlingPolicy {
    /// Bytes pass through unmodified.
    Copy,
    /// Transformed by an external tool before bundling.
    Process,
    /// A rule this resolver does not understand. Kept so the classifier
    /// can report it against the owning target.
    Unknown(String),
}

impl HandlingPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            HandlingPolicy::Copy => "copy",
            HandlingPolicy::Process => "process",
            HandlingPolicy::Unknown(s) => s,
        }
    }
}

impl From<&str> for HandlingPolicy {
    fn from(s: &str) -> Self {
        match s {
            "copy" => HandlingPolicy::Copy,
            "process" => HandlingPolicy::Process,
            other => HandlingPolicy::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for HandlingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HandlingPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HandlingPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(HandlingPolicy::from(s.as_str()))
    }
}

/// A resource declared by a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Path relative to the owning target's root.
    pub path: PathBuf,

    /// Handling rule
    pub rule: HandlingPolicy,
}

impl Resource {
    pub fn new(path: impl Into<PathBuf>, rule: HandlingPolicy) -> Self {
        Resource {
            path: path.into(),
            rule,
        }
    }

    pub fn copy(path: impl Into<PathBuf>) -> Self {
        Self::new(path, HandlingPolicy::Copy)
    }

    pub fn process(path: impl Into<PathBuf>) -> Self {
        Self::new(path, HandlingPolicy::Process)
    }
}

/// Where a resource ends up in the final bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Source path relative to the package root.
    pub source: PathBuf,

    /// Destination relative to the bundle output directory.
    pub destination: PathBuf,

    /// Whether an external processing step must run before bundling.
    pub needs_processing: bool,
}

/// Bundle directory name for a target's resources.
pub fn bundle_name(package: &str, target: &str) -> String {
    format!("{}_{}.bundle", package, target)
}

/// Classify a resource of `target` (rooted at `target_root`, relative to the
/// package root).
pub fn classify(
    package: &str,
    target: &str,
    target_root: &Path,
    resource: &Resource,
) -> Result<Placement, ResolveError> {
    let bundle = PathBuf::from(bundle_name(package, target));
    let source = target_root.join(&resource.path);

    let file_name = resource
        .path
        .file_name()
        .filter(|_| !escapes_root(&resource.path))
        .ok_or_else(|| {
            ResolveError::malformed(
                package,
                format!(
                    "resource `{}` in `{}` must be a relative path inside the target",
                    resource.path.display(),
                    target
                ),
            )
        })?;

    match &resource.rule {
        HandlingPolicy::Copy => Ok(Placement {
            source,
            destination: bundle.join(file_name),
            needs_processing: false,
        }),
        HandlingPolicy::Process => {
            let mut destination = bundle;
            if let Some(lproj) = localization_dir(&resource.path) {
                destination.push(lproj);
            }
            destination.push(processed_name(Path::new(file_name)));
            Ok(Placement {
                source,
                destination,
                needs_processing: true,
            })
        }
        HandlingPolicy::Unknown(rule) => Err(ResolveError::UnknownResourceKind {
            target: target.to_string(),
            path: resource.path.display().to_string(),
            rule: rule.clone(),
        }),
    }
}

/// Name of the compiled form produced by the platform tool.
fn processed_name(file_name: &Path) -> PathBuf {
    let ext = file_name
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    match ext {
        "storyboard" => file_name.with_extension("storyboardc"),
        "xib" => file_name.with_extension("nib"),
        "xcassets" => PathBuf::from("Assets.car"),
        "xcdatamodeld" | "xcdatamodel" => file_name.with_extension("momd"),
        "xcmappingmodel" => file_name.with_extension("cdm"),
        _ => file_name.to_path_buf(),
    }
}

/// The enclosing `<lang>.lproj` directory, if any.
fn localization_dir(path: &Path) -> Option<&std::ffi::OsStr> {
    path.parent()
        .and_then(|p| p.file_name())
        .filter(|name| Path::new(name).extension().is_some_and(|e| e == "lproj"))
}

/// Whether `path` is absolute or climbs out of the directory it is joined to.
pub fn escapes_root(path: &Path) -> bool {
    path.components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
}
