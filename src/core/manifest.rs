//! Pier.toml manifest parsing and schema.
//!
//! The manifest declares a package's platforms, targets, products and
//! external dependencies:
//!
//! ```toml
//! [package]
//! name = "DragonMedicalSpeechKit"
//! default-localization = "en"
//!
//! [[platforms]]
//! name = "ios"
//! version = "14"
//!
//! [[products]]
//! name = "DragonMedicalSpeechKit"
//! targets = ["DragonMedicalSpeechKitBundle", "DragonMedicalSpeechKit"]
//!
//! [[targets]]
//! name = "DragonMedicalSpeechKitBundle"
//! kind = "source"
//! path = "Sources/SDK"
//! resources = [{ path = "DragonMedicalSpeechKitBundle/cdd.bnf", rule = "copy" }]
//!
//! [[targets]]
//! name = "DragonMedicalSpeechKit"
//! kind = "binary"
//! path = "Sources/SDK/DragonMedicalSpeechKit.zip"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::dependency::{Dependency, DependencySource};
use crate::core::platform::{OsVersion, Platform, PlatformName};
use crate::core::product::{Linkage, Product, ProductKind};
use crate::core::resource::{escapes_root, HandlingPolicy, Resource};
use crate::core::target::{default_source_path, Provisioning, Target, TargetDep, TargetKind};
use crate::resolver::errors::ResolveError;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "Pier.toml";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid identifier regex"));

/// Archive extensions accepted for local binary targets.
const LOCAL_BINARY_EXTENSIONS: &[&str] = &["zip", "xcframework", "artifactbundle"];

/// Package metadata from the [package] section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Development region used for unlocalized resources
    #[serde(default)]
    pub default_localization: Option<String>,
}

/// The parsed manifest of one package.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Package metadata
    pub package: PackageMetadata,

    /// Supported platforms, in declaration order
    pub platforms: Vec<Platform>,

    /// Declared products
    pub products: Vec<Product>,

    /// Declared targets, in declaration order
    pub targets: Vec<Target>,

    /// External dependencies
    pub dependencies: Vec<Dependency>,

    /// The directory containing this manifest
    pub manifest_dir: PathBuf,
}

/// Raw manifest as deserialized from TOML.
#[derive(Debug, Deserialize)]
struct RawManifest {
    package: PackageMetadata,

    #[serde(default)]
    platforms: Vec<RawPlatform>,

    #[serde(default)]
    products: Vec<RawProduct>,

    #[serde(default)]
    targets: Vec<RawTarget>,

    #[serde(default)]
    dependencies: Vec<RawDependency>,
}

#[derive(Debug, Deserialize)]
struct RawPlatform {
    name: String,
    #[serde(alias = "min")]
    version: String,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    name: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    linkage: Option<Linkage>,
    #[serde(default)]
    targets: Vec<String>,
}

/// Raw target from TOML (before variant checks).
#[derive(Debug, Deserialize)]
struct RawTarget {
    name: String,

    #[serde(default)]
    kind: Option<String>,

    #[serde(default)]
    path: Option<PathBuf>,

    #[serde(default)]
    url: Option<String>,

    #[serde(default)]
    checksum: Option<String>,

    #[serde(default)]
    resources: Option<Vec<RawResource>>,

    #[serde(default)]
    dependencies: Option<Vec<RawTargetDep>>,

    #[serde(default)]
    platforms: Vec<RawPlatform>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    path: PathBuf,
    rule: String,
}

/// Raw target dependency.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTargetDep {
    Simple(String),
    Detailed {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        product: Option<String>,
        #[serde(default)]
        package: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    name: String,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    products: Vec<String>,
}

impl Manifest {
    /// Create an empty manifest for programmatic construction.
    ///
    /// Call [`Manifest::validate`] once populated.
    pub fn new(name: impl Into<String>, manifest_dir: impl Into<PathBuf>) -> Self {
        Manifest {
            package: PackageMetadata {
                name: name.into(),
                default_localization: None,
            },
            platforms: Vec::new(),
            products: Vec::new(),
            targets: Vec::new(),
            dependencies: Vec::new(),
            manifest_dir: manifest_dir.into(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platforms.push(platform);
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_product(mut self, product: Product) -> Self {
        self.products.push(product);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self, ResolveError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ResolveError::malformed(
                path.display().to_string(),
                format!("failed to read manifest: {}", e),
            )
        })?;

        Self::parse(&content, path)
    }

    /// Parse manifest content. `path` is the manifest file's location.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ResolveError> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| {
            ResolveError::malformed(
                path.display().to_string(),
                format!("failed to parse {}: {}", MANIFEST_NAME, e.message()),
            )
        })?;

        let manifest_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let pkg = raw.package.name.clone();

        let platforms = raw
            .platforms
            .into_iter()
            .map(|p| convert_platform(&pkg, p))
            .collect::<Result<Vec<_>, _>>()?;

        let products = raw
            .products
            .into_iter()
            .map(|p| convert_product(&pkg, p))
            .collect::<Result<Vec<_>, _>>()?;

        let targets = raw
            .targets
            .into_iter()
            .map(|t| convert_target(&pkg, t))
            .collect::<Result<Vec<_>, _>>()?;

        let dependencies = raw
            .dependencies
            .into_iter()
            .map(|d| convert_dependency(&pkg, d))
            .collect::<Result<Vec<_>, _>>()?;

        let manifest = Manifest {
            package: raw.package,
            platforms,
            products,
            targets,
            dependencies,
            manifest_dir,
        };

        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the structural rules every package must satisfy.
    ///
    /// Reference checks (dangling edges, product targets) belong to graph
    /// construction and product composition, not here.
    pub fn validate(&self) -> Result<(), ResolveError> {
        let pkg = self.name();
        check_identifier(pkg, "package", pkg)?;

        if self.targets.is_empty() {
            return Err(ResolveError::malformed(pkg, "package declares no targets"));
        }
        if self.products.is_empty() {
            return Err(ResolveError::malformed(pkg, "package declares no products"));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            check_identifier(pkg, "target", &target.name)?;
            if !seen.insert(target.name.as_str()) {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("target `{}` is declared more than once", target.name),
                ));
            }
            check_target(pkg, target)?;
        }

        let mut seen = HashSet::new();
        for product in &self.products {
            check_identifier(pkg, "product", &product.name)?;
            if !seen.insert(product.name.as_str()) {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("product `{}` is declared more than once", product.name),
                ));
            }
        }

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            check_identifier(pkg, "dependency", dep.name())?;
            if dep.name() == pkg {
                return Err(ResolveError::malformed(
                    pkg,
                    "package cannot depend on itself",
                ));
            }
            if !seen.insert(dep.name()) {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("dependency `{}` is declared more than once", dep.name()),
                ));
            }
        }

        Ok(())
    }

    /// Package name.
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Look up a product by name.
    pub fn product(&self, name: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.name == name)
    }

    /// Look up a dependency by package name.
    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name() == name)
    }
}

/// Check that `name` is a syntactically valid identifier.
pub fn check_identifier(package: &str, what: &str, name: &str) -> Result<(), ResolveError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ResolveError::malformed(
            package,
            format!(
                "invalid {} name `{}`: must match [A-Za-z_][A-Za-z0-9_.-]*",
                what, name
            ),
        ))
    }
}

/// Whether `s` looks like a hex digest of the supported algorithms.
pub fn is_valid_checksum(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn check_target(pkg: &str, target: &Target) -> Result<(), ResolveError> {
    match &target.kind {
        TargetKind::Source { path, .. } => check_contained(pkg, &target.name, path),
        TargetKind::Resource { path, .. } => {
            if path.as_os_str().is_empty() {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("resource target `{}` needs a `path`", target.name),
                ));
            }
            check_contained(pkg, &target.name, path)
        }
        TargetKind::Binary { provisioning } => check_provisioning(pkg, &target.name, provisioning),
    }
}

/// Target and local binary paths stay inside the package root.
fn check_contained(pkg: &str, name: &str, path: &Path) -> Result<(), ResolveError> {
    if escapes_root(path) {
        return Err(ResolveError::malformed(
            pkg,
            format!(
                "path `{}` of target `{}` must be relative to the package root",
                path.display(),
                name
            ),
        ));
    }
    Ok(())
}

fn check_provisioning(pkg: &str, name: &str, provisioning: &Provisioning) -> Result<(), ResolveError> {
    match provisioning {
        Provisioning::Local { path } => {
            check_contained(pkg, name, path)?;
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !LOCAL_BINARY_EXTENSIONS.contains(&ext) {
                return Err(ResolveError::malformed(
                    pkg,
                    format!(
                        "binary target `{}` path `{}` must be a .zip, .xcframework or .artifactbundle",
                        name,
                        path.display()
                    ),
                ));
            }
        }
        Provisioning::Remote { url, checksum } => {
            if !matches!(url.scheme(), "https" | "http") {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("binary target `{}` url must use http(s): {}", name, url),
                ));
            }
            if !url.path().ends_with(".zip") {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("binary target `{}` url must point at a .zip archive: {}", name, url),
                ));
            }
            if !is_valid_checksum(checksum) {
                return Err(ResolveError::malformed(
                    pkg,
                    format!(
                        "binary target `{}` checksum must be 64 lowercase hex characters",
                        name
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn convert_platform(pkg: &str, raw: RawPlatform) -> Result<Platform, ResolveError> {
    let name: PlatformName = raw
        .name
        .parse()
        .map_err(|e: String| ResolveError::malformed(pkg, e))?;
    let version = OsVersion::parse(&raw.version).map_err(|e| ResolveError::malformed(pkg, e))?;
    Ok(Platform::new(name, version))
}

fn convert_product(pkg: &str, raw: RawProduct) -> Result<Product, ResolveError> {
    let kind = match raw.kind.as_deref() {
        None | Some("library") => ProductKind::Library {
            linkage: raw.linkage.unwrap_or_default(),
        },
        Some("executable") => {
            if raw.linkage.is_some() {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("executable product `{}` cannot set `linkage`", raw.name),
                ));
            }
            ProductKind::Executable
        }
        Some(other) => {
            return Err(ResolveError::malformed(
                pkg,
                format!("product `{}` has unknown kind `{}`", raw.name, other),
            ))
        }
    };

    Ok(Product {
        name: raw.name,
        kind,
        targets: raw.targets,
    })
}

fn convert_target(pkg: &str, raw: RawTarget) -> Result<Target, ResolveError> {
    let kind_str = raw.kind.as_deref().unwrap_or("source");

    let reject = |field: &str| -> ResolveError {
        ResolveError::malformed(
            pkg,
            format!(
                "field `{}` is not valid for {} target `{}`",
                field, kind_str, raw.name
            ),
        )
    };

    let platforms = raw
        .platforms
        .into_iter()
        .map(|p| convert_platform(pkg, p))
        .collect::<Result<Vec<_>, _>>()?;

    let kind = match kind_str {
        "source" | "resource" => {
            if raw.url.is_some() {
                return Err(reject("url"));
            }
            if raw.checksum.is_some() {
                return Err(reject("checksum"));
            }

            let resources = raw
                .resources
                .unwrap_or_default()
                .into_iter()
                .map(|r| Resource::new(r.path, HandlingPolicy::from(r.rule.as_str())))
                .collect();

            let deps = raw
                .dependencies
                .unwrap_or_default()
                .into_iter()
                .map(|d| convert_target_dep(pkg, &raw.name, d))
                .collect::<Result<Vec<_>, _>>()?;

            if kind_str == "source" {
                TargetKind::Source {
                    path: raw.path.unwrap_or_else(|| default_source_path(&raw.name)),
                    resources,
                    deps,
                }
            } else {
                TargetKind::Resource {
                    path: raw.path.ok_or_else(|| {
                        ResolveError::malformed(
                            pkg,
                            format!("resource target `{}` needs a `path`", raw.name),
                        )
                    })?,
                    resources,
                    deps,
                }
            }
        }
        "binary" => {
            if raw.resources.is_some() {
                return Err(reject("resources"));
            }
            if raw.dependencies.is_some() {
                return Err(reject("dependencies"));
            }

            let provisioning = match (raw.path, raw.url, raw.checksum) {
                (Some(path), None, None) => Provisioning::Local { path },
                (None, Some(url), Some(checksum)) => Provisioning::Remote {
                    url: Url::parse(&url).map_err(|e| {
                        ResolveError::malformed(
                            pkg,
                            format!("binary target `{}` has invalid url `{}`: {}", raw.name, url, e),
                        )
                    })?,
                    checksum,
                },
                (None, Some(_), None) => {
                    return Err(ResolveError::malformed(
                        pkg,
                        format!("remote binary target `{}` needs a `checksum`", raw.name),
                    ))
                }
                (Some(_), _, Some(_)) => return Err(reject("checksum")),
                (Some(_), Some(_), None) => {
                    return Err(ResolveError::malformed(
                        pkg,
                        format!(
                            "binary target `{}` must set exactly one of `path` or `url`",
                            raw.name
                        ),
                    ))
                }
                (None, None, _) => {
                    return Err(ResolveError::malformed(
                        pkg,
                        format!("binary target `{}` needs a `path` or a `url`", raw.name),
                    ))
                }
            };

            TargetKind::Binary { provisioning }
        }
        other => {
            return Err(ResolveError::malformed(
                pkg,
                format!("target `{}` has unknown kind `{}`", raw.name, other),
            ))
        }
    };

    Ok(Target {
        name: raw.name,
        kind,
        platforms,
    })
}

fn convert_target_dep(pkg: &str, target: &str, raw: RawTargetDep) -> Result<TargetDep, ResolveError> {
    match raw {
        RawTargetDep::Simple(name) => Ok(TargetDep::ByName { name }),
        RawTargetDep::Detailed {
            target: Some(name),
            product: None,
            package: None,
        } => Ok(TargetDep::Target { name }),
        RawTargetDep::Detailed {
            target: None,
            product: Some(product),
            package: Some(package),
        } => Ok(TargetDep::Product { package, product }),
        RawTargetDep::Detailed { .. } => Err(ResolveError::malformed(
            pkg,
            format!(
                "dependency of `{}` must be a name, {{ target = \"..\" }} or {{ product = \"..\", package = \"..\" }}",
                target
            ),
        )),
    }
}

fn convert_dependency(pkg: &str, raw: RawDependency) -> Result<Dependency, ResolveError> {
    let source = match (raw.path, raw.url) {
        (Some(path), None) => {
            if raw.version.is_some() || raw.revision.is_some() {
                return Err(ResolveError::malformed(
                    pkg,
                    format!("path dependency `{}` cannot pin a version or revision", raw.name),
                ));
            }
            DependencySource::Path { path }
        }
        (None, Some(url)) => {
            let url = Url::parse(&url).map_err(|e| {
                ResolveError::malformed(
                    pkg,
                    format!("dependency `{}` has invalid url `{}`: {}", raw.name, url, e),
                )
            })?;
            let version = raw
                .version
                .as_deref()
                .map(Version::parse)
                .transpose()
                .map_err(|e| {
                    ResolveError::malformed(
                        pkg,
                        format!("dependency `{}` has invalid version: {}", raw.name, e),
                    )
                })?;
            if version.is_none() && raw.revision.is_none() {
                return Err(ResolveError::malformed(
                    pkg,
                    format!(
                        "remote dependency `{}` must be pinned with `version` or `revision`",
                        raw.name
                    ),
                ));
            }
            DependencySource::Remote {
                url,
                version,
                revision: raw.revision,
            }
        }
        _ => {
            return Err(ResolveError::malformed(
                pkg,
                format!("dependency `{}` must set exactly one of `path` or `url`", raw.name),
            ))
        }
    };

    Ok(Dependency::new(raw.name, source).with_products(raw.products))
}
