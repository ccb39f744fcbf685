//! Package resolution: the full manifest-to-`ResolvedPackage` pipeline.
//!
//! Structural checks (graph shape, platform constraints) run first and
//! touch neither the network nor the cache. Only once they pass does the
//! concurrent phase resolve artifacts and classify resources, followed by
//! product composition.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::core::resource::{bundle_name, classify, Placement};
use crate::core::Manifest;
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::{TargetGraph, TargetNode};
use crate::resolver::platform::{self, EffectivePlatforms};
use crate::resolver::product::compose;
use crate::resolver::resolved::{ResolvedPackage, ResolvedTarget};
use crate::sources::artifact::{Artifact, ArtifactResolver, FetchPolicy};
use crate::sources::cache::ArtifactCache;
use crate::sources::fetch::Fetcher;
use crate::sources::PackageLoader;
use crate::util::config::Config;

/// Options for a resolution run.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Concurrent workers (None = number of CPUs)
    pub jobs: Option<usize>,

    /// Download behaviour for remote artifacts
    pub policy: FetchPolicy,
}

impl ResolveOptions {
    pub fn from_config(config: &Config) -> Self {
        ResolveOptions {
            jobs: config.build.jobs,
            policy: FetchPolicy::from_config(config),
        }
    }
}

/// Shared services for resolution runs.
///
/// Reusing one session across runs reuses its in-memory artifact cache.
pub struct Session<'a> {
    pub cache: &'a ArtifactCache,
    pub fetcher: &'a dyn Fetcher,
    pub options: ResolveOptions,
}

/// Output of the concurrent phase for one target.
#[derive(Debug, Default)]
struct NodeOutput {
    artifact: Option<Artifact>,
    placements: Vec<Placement>,
}

/// Resolve `manifest` into a `ResolvedPackage`.
pub fn resolve(
    manifest: &Manifest,
    loader: &mut dyn PackageLoader,
    session: &Session<'_>,
) -> Result<ResolvedPackage, ResolveError> {
    let (graph, platforms) = validate_structure(manifest, loader)?;

    let outputs = run_concurrent(&graph, &platforms, session, true)?;

    let artifacts: BTreeMap<String, Artifact> = outputs
        .iter()
        .filter_map(|(name, out)| out.artifact.clone().map(|a| (name.clone(), a)))
        .collect();

    let products = compose(&graph, &artifacts)?;
    debug_assert!(
        products.iter().all(|p| !p.has_pending_binary),
        "every binary in a product closure has a verified artifact"
    );

    let mut outputs = outputs;
    let targets = graph
        .topological_order()
        .map(|node| {
            let out = outputs.remove(node.name()).unwrap_or_default();
            let bundle = (!out.placements.is_empty())
                .then(|| bundle_name(&node.package, node.name()));
            ResolvedTarget {
                name: node.name().to_string(),
                package: node.package.clone(),
                kind: node.target.kind_str(),
                dependencies: graph
                    .dependencies(node.name())
                    .into_iter()
                    .map(String::from)
                    .collect(),
                platforms: platforms.get(node.name()).cloned().unwrap_or_else(|| {
                    EffectivePlatforms {
                        platforms: Vec::new(),
                        raised: Vec::new(),
                    }
                }),
                artifact: out.artifact,
                bundle,
                resources: out.placements,
            }
        })
        .collect();

    let root = graph.root_package();
    tracing::info!(
        "Resolved {} ({} targets, {} products)",
        root.name(),
        graph.len(),
        products.len()
    );

    Ok(ResolvedPackage::new(
        root.name().to_string(),
        root.package.default_localization.clone(),
        targets,
        products,
    ))
}

/// Resolve only the binary artifacts of `manifest`, in topological order.
pub fn fetch_artifacts(
    manifest: &Manifest,
    loader: &mut dyn PackageLoader,
    session: &Session<'_>,
) -> Result<Vec<Artifact>, ResolveError> {
    let (graph, platforms) = validate_structure(manifest, loader)?;
    let mut outputs = run_concurrent(&graph, &platforms, session, false)?;

    Ok(graph
        .topological_order()
        .filter_map(|node| outputs.remove(node.name()).and_then(|o| o.artifact))
        .collect())
}

/// Manifest, graph and platform checks. No I/O beyond loading dependency manifests.
pub fn validate_structure(
    manifest: &Manifest,
    loader: &mut dyn PackageLoader,
) -> Result<(TargetGraph, BTreeMap<String, EffectivePlatforms>), ResolveError> {
    manifest.validate()?;
    let graph = TargetGraph::build(manifest, loader)?;
    let platforms = platform::validate(&graph)?;
    Ok((graph, platforms))
}

/// Resolve artifacts (and optionally classify resources) for every node.
///
/// The first failure sets the shared cancel flag; the error reported is the
/// first real failure in topological order, never a cancellation it caused.
fn run_concurrent(
    graph: &TargetGraph,
    platforms: &BTreeMap<String, EffectivePlatforms>,
    session: &Session<'_>,
    classify_resources: bool,
) -> Result<HashMap<String, NodeOutput>, ResolveError> {
    let resolver = ArtifactResolver::new(
        session.cache,
        session.fetcher,
        session.options.policy.clone(),
    );
    let cancel = AtomicBool::new(false);
    let nodes: Vec<&TargetNode> = graph.topological_order().collect();

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = session.options.jobs {
        builder = builder.num_threads(jobs.max(1));
    }
    let pool = builder
        .build()
        .map_err(|e| ResolveError::io(graph.root_package().name(), e))?;

    let binaries = nodes.iter().filter(|n| n.target.is_binary()).count();
    if binaries > 0 {
        tracing::info!("Resolving {} binary artifact(s)", binaries);
    }

    let results: Vec<Result<NodeOutput, ResolveError>> = pool.install(|| {
        nodes
            .par_iter()
            .map(|node| {
                let result = process_node(
                    graph,
                    node,
                    platforms,
                    &resolver,
                    &cancel,
                    classify_resources,
                );
                if result.is_err() {
                    cancel.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect()
    });

    let mut outputs = HashMap::with_capacity(nodes.len());
    let mut cancelled = None;

    for (node, result) in nodes.iter().zip(results) {
        match result {
            Ok(out) => {
                outputs.insert(node.name().to_string(), out);
            }
            Err(e) if e.is_cancellation() => {
                cancelled.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }

    match cancelled {
        Some(e) => Err(e),
        None => Ok(outputs),
    }
}

fn process_node(
    graph: &TargetGraph,
    node: &TargetNode,
    platforms: &BTreeMap<String, EffectivePlatforms>,
    resolver: &ArtifactResolver<'_>,
    cancel: &AtomicBool,
    classify_resources: bool,
) -> Result<NodeOutput, ResolveError> {
    if cancel.load(Ordering::Relaxed) {
        return Err(ResolveError::Cancelled {
            target: node.name().to_string(),
        });
    }

    let package_root = graph.package_root(node);
    let declared = platforms
        .get(node.name())
        .map(|p| p.platforms.as_slice())
        .unwrap_or_default();

    let artifact = resolver.resolve(package_root, &node.target, declared, cancel)?;

    let placements = if classify_resources {
        place_resources(node, package_root)?
    } else {
        Vec::new()
    };

    Ok(NodeOutput {
        artifact,
        placements,
    })
}

/// Classify a target's resources and check they exist and do not collide.
fn place_resources(node: &TargetNode, package_root: &Path) -> Result<Vec<Placement>, ResolveError> {
    let Some(target_root) = node.target.root() else {
        return Ok(Vec::new());
    };

    let mut placements: Vec<Placement> = Vec::with_capacity(node.target.resources().len());

    for resource in node.target.resources() {
        let placement = classify(&node.package, node.name(), target_root, resource)?;

        let on_disk = package_root.join(&placement.source);
        if !on_disk.exists() {
            return Err(ResolveError::ArtifactNotFound {
                target: node.name().to_string(),
                path: on_disk,
            });
        }

        if let Some(other) = placements
            .iter()
            .find(|p| p.destination == placement.destination)
        {
            return Err(ResolveError::malformed(
                &node.package,
                format!(
                    "resources `{}` and `{}` of `{}` both land at `{}`",
                    other.source.display(),
                    placement.source.display(),
                    node.name(),
                    placement.destination.display()
                ),
            ));
        }

        tracing::debug!(
            "{}: {} -> {}{}",
            node.name(),
            placement.source.display(),
            placement.destination.display(),
            if placement.needs_processing { " (process)" } else { "" }
        );
        placements.push(placement);
    }

    Ok(placements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::MANIFEST_NAME;
    use crate::sources::PathLoader;
    use crate::test_support::{manifests, MockFetcher, PackageFixture, CORE_URL, CORE_ZIP};
    use crate::util::hash::ChecksumAlgorithm;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options() -> ResolveOptions {
        ResolveOptions {
            jobs: Some(4),
            policy: FetchPolicy {
                retries: 2,
                backoff: Duration::from_millis(1),
                refetch_on_mismatch: true,
                offline: false,
            },
        }
    }

    fn load(fixture: &PackageFixture, dir: &Path) -> Manifest {
        let path = fixture.write_to(dir).unwrap();
        Manifest::load(&path).unwrap()
    }

    fn run(manifest: &Manifest, cache: &ArtifactCache, fetcher: &MockFetcher) -> Result<ResolvedPackage, ResolveError> {
        let session = Session {
            cache,
            fetcher,
            options: options(),
        };
        resolve(manifest, &mut PathLoader::new(), &session)
    }

    #[test]
    fn test_kit_scenario() {
        let tmp = TempDir::new().unwrap();
        let manifest = load(&PackageFixture::kit(), tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);
        let fetcher = MockFetcher::new();

        let resolved = run(&manifest, &cache, &fetcher).unwrap();

        let order: Vec<&str> = resolved.order().collect();
        assert_eq!(order.len(), 3);
        assert_eq!(order.last(), Some(&"Lib"));

        let kit = resolved.product("Kit").unwrap();
        let mut closure = kit.closure.clone();
        closure.sort();
        assert_eq!(closure, vec!["Bundle", "Core", "Lib"]);

        let core = resolved.artifact("Core").unwrap();
        assert_eq!(core.checksum, ChecksumAlgorithm::Sha256.digest(CORE_ZIP));

        let placements = resolved.placements("Bundle");
        assert_eq!(placements.len(), 1);
        assert!(!placements[0].needs_processing);
        assert_eq!(
            placements[0].destination,
            PathBuf::from("Kit_Bundle.bundle/a.dat")
        );
        assert_eq!(resolved.target("Bundle").unwrap().bundle.as_deref(), Some("Kit_Bundle.bundle"));
        assert_eq!(resolved.default_localization(), Some("en"));
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn test_kit_remote_wrong_checksum() {
        let tmp = TempDir::new().unwrap();
        let wrong = ChecksumAlgorithm::Sha256.digest(b"something else");
        let manifest = load(&PackageFixture::kit_remote(&wrong), tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);
        let fetcher = MockFetcher::new().with_body(CORE_URL, CORE_ZIP.to_vec());

        let err = run(&manifest, &cache, &fetcher).unwrap_err();
        assert!(matches!(err, ResolveError::ChecksumMismatch { ref target, .. } if target == "Core"));
    }

    #[test]
    fn test_remote_fetched_once_across_runs() {
        let tmp = TempDir::new().unwrap();
        let checksum = ChecksumAlgorithm::Sha256.digest(CORE_ZIP);
        let manifest = load(&PackageFixture::kit_remote(&checksum), tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);
        let fetcher = MockFetcher::new().with_body(CORE_URL, CORE_ZIP.to_vec());

        let first = run(&manifest, &cache, &fetcher).unwrap();
        assert!(!first.artifact("Core").unwrap().from_cache);

        let second = run(&manifest, &cache, &fetcher).unwrap();
        assert!(second.artifact("Core").unwrap().from_cache);
        assert_eq!(fetcher.request_count(CORE_URL), 1);
    }

    #[test]
    fn test_one_byte_mutation_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let checksum = ChecksumAlgorithm::Sha256.digest(CORE_ZIP);
        let manifest = load(&PackageFixture::kit_remote(&checksum), tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);

        let mut mutated = CORE_ZIP.to_vec();
        mutated[0] ^= 0x20;
        let fetcher = MockFetcher::new().with_body(CORE_URL, mutated);

        let err = run(&manifest, &cache, &fetcher).unwrap_err();
        match err {
            ResolveError::ChecksumMismatch { target, expected, .. } => {
                assert_eq!(target, "Core");
                assert_eq!(expected, checksum);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cache.entry_path(&checksum).exists());
    }

    #[test]
    fn test_cycle_stops_before_fetching() {
        let tmp = TempDir::new().unwrap();
        let checksum = ChecksumAlgorithm::Sha256.digest(CORE_ZIP);
        let manifest = load(
            &PackageFixture::new(manifests::cyclic(CORE_URL, &checksum)),
            tmp.path(),
        );
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);
        let fetcher = MockFetcher::new().with_body(CORE_URL, CORE_ZIP.to_vec());

        let err = run(&manifest, &cache, &fetcher).unwrap_err();
        assert!(matches!(err, ResolveError::CyclicDependency { .. }));
        assert!(fetcher.requests().is_empty());
        assert!(!tmp.path().join("cache").exists());
    }

    #[test]
    fn test_unsatisfiable_product() {
        let tmp = TempDir::new().unwrap();
        let manifest = load(
            &PackageFixture::new(manifests::missing_product_target()),
            tmp.path(),
        );
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);

        let err = run(&manifest, &cache, &MockFetcher::new()).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UnsatisfiableProduct { ref product, .. } if product == "Kit"
        ));
    }

    #[test]
    fn test_missing_resource_file() {
        let tmp = TempDir::new().unwrap();
        let fixture = PackageFixture::new(manifests::kit())
            .with_file("Binaries/Core.zip", CORE_ZIP.to_vec());
        let manifest = load(&fixture, tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);

        let err = run(&manifest, &cache, &MockFetcher::new()).unwrap_err();
        assert!(matches!(err, ResolveError::ArtifactNotFound { ref target, .. } if target == "Bundle"));
    }

    #[test]
    fn test_unknown_resource_rule() {
        let tmp = TempDir::new().unwrap();
        let manifest = r#"[package]
name = "Kit"

[[products]]
name = "Kit"
targets = ["Lib"]

[[targets]]
name = "Lib"
resources = [{ path = "x.bin", rule = "embed" }]
"#;
        let manifest = load(
            &PackageFixture::new(manifest).with_file("Sources/Lib/x.bin", b"x".to_vec()),
            tmp.path(),
        );
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);

        let err = run(&manifest, &cache, &MockFetcher::new()).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownResourceKind { ref rule, .. } if rule == "embed"));
    }

    #[test]
    fn test_colliding_destinations() {
        let tmp = TempDir::new().unwrap();
        let manifest = r#"[package]
name = "Kit"

[[products]]
name = "Kit"
targets = ["Lib"]

[[targets]]
name = "Lib"
resources = [
    { path = "a/data.json", rule = "process" },
    { path = "b/data.json", rule = "process" },
]
"#;
        let manifest = load(
            &PackageFixture::new(manifest)
                .with_file("Sources/Lib/a/data.json", b"{}".to_vec())
                .with_file("Sources/Lib/b/data.json", b"{}".to_vec()),
            tmp.path(),
        );
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);

        let err = run(&manifest, &cache, &MockFetcher::new()).unwrap_err();
        assert!(matches!(err, ResolveError::MalformedManifest { ref message, .. } if message.contains("both land")));
    }

    #[test]
    fn test_fetch_artifacts_skips_resources() {
        let tmp = TempDir::new().unwrap();
        // Resource file missing: fetch does not classify, so it still succeeds.
        let fixture = PackageFixture::new(manifests::kit())
            .with_file("Binaries/Core.zip", CORE_ZIP.to_vec());
        let manifest = load(&fixture, tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);
        let fetcher = MockFetcher::new();
        let session = Session {
            cache: &cache,
            fetcher: &fetcher,
            options: options(),
        };

        let artifacts = fetch_artifacts(&manifest, &mut PathLoader::new(), &session).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].target, "Core");
    }

    #[test]
    fn test_dependency_binary_is_resolved() {
        let tmp = TempDir::new().unwrap();
        let codec = r#"[package]
name = "Codec"

[[products]]
name = "Opus"
targets = ["Opus"]

[[targets]]
name = "Opus"
kind = "binary"
path = "opus.zip"
"#;
        PackageFixture::new(codec)
            .with_file("opus.zip", b"opus".to_vec())
            .write_to(&tmp.path().join("codec"))
            .unwrap();

        let app = r#"[package]
name = "App"

[[dependencies]]
name = "Codec"
path = "../codec"
products = ["Opus"]

[[products]]
name = "App"
targets = ["Player"]

[[targets]]
name = "Player"
dependencies = [{ product = "Opus", package = "Codec" }]
"#;
        let app_dir = tmp.path().join("app");
        PackageFixture::new(app).write_to(&app_dir).unwrap();
        let manifest = Manifest::load(&app_dir.join(MANIFEST_NAME)).unwrap();
        let cache = ArtifactCache::new(app_dir.join(".pier/artifacts"), ChecksumAlgorithm::Sha256);

        let resolved = run(&manifest, &cache, &MockFetcher::new()).unwrap();
        let opus = resolved.artifact("Opus").unwrap();
        assert_eq!(
            opus.path,
            tmp.path().join("codec").canonicalize().unwrap().join("opus.zip")
        );
        assert_eq!(resolved.target("Opus").unwrap().package, "Codec");
        assert_eq!(resolved.product("App").unwrap().binaries, vec!["Opus"]);
    }

    #[test]
    fn test_first_failure_cancels_siblings() {
        const BAD_URL: &str = "https://cdn.example.com/Bad.zip";
        const SLOW_URL: &str = "https://cdn.example.com/Slow.zip";

        let tmp = TempDir::new().unwrap();
        let manifest = format!(
            r#"[package]
name = "App"

[[products]]
name = "App"
targets = ["App"]

[[targets]]
name = "App"
dependencies = ["Bad", "Slow"]

[[targets]]
name = "Bad"
kind = "binary"
url = "{BAD_URL}"
checksum = "{bad}"

[[targets]]
name = "Slow"
kind = "binary"
url = "{SLOW_URL}"
checksum = "{slow}"
"#,
            bad = "0".repeat(64),
            slow = ChecksumAlgorithm::Sha256.digest(b"slow"),
        );
        let manifest = load(&PackageFixture::new(manifest), tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);
        // Bad.zip has no body and answers 404; Slow.zip hangs until cancelled.
        let fetcher = MockFetcher::new()
            .with_body(SLOW_URL, b"slow".to_vec())
            .stall(SLOW_URL);

        let err = run(&manifest, &cache, &fetcher).unwrap_err();

        assert!(!err.is_cancellation());
        assert!(matches!(
            err,
            ResolveError::Network { ref target, attempts: 1, .. } if target == "Bad"
        ));
        assert!(!fetcher.completed(SLOW_URL));
        assert!(!cache
            .entry_path(&ChecksumAlgorithm::Sha256.digest(b"slow"))
            .exists());
    }

    #[test]
    fn test_json_output() {
        let tmp = TempDir::new().unwrap();
        let manifest = load(&PackageFixture::kit(), tmp.path());
        let cache = ArtifactCache::new(tmp.path().join("cache"), ChecksumAlgorithm::Sha256);

        let resolved = run(&manifest, &cache, &MockFetcher::new()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&resolved.to_json().unwrap()).unwrap();
        assert_eq!(json["name"], "Kit");
        assert_eq!(json["targets"][2]["name"], "Lib");
        assert_eq!(json["products"][0]["closure"].as_array().unwrap().len(), 3);
    }
}
