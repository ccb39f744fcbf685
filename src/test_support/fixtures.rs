//! Test fixtures for common resolution scenarios.

use std::path::{Path, PathBuf};

use crate::core::manifest::MANIFEST_NAME;

/// Contents of the `Core` binary archive in the Kit fixtures.
pub const CORE_ZIP: &[u8] = b"PK\x03\x04core-archive";

/// URL of the remote `Core` archive.
pub const CORE_URL: &str = "https://cdn.example.com/Core.zip";

/// A package laid out on disk: manifest plus supporting files.
#[derive(Debug, Clone)]
pub struct PackageFixture {
    /// Pier.toml content.
    pub manifest: String,
    /// Files relative to the package root.
    pub files: Vec<(PathBuf, Vec<u8>)>,
}

impl PackageFixture {
    pub fn new(manifest: impl Into<String>) -> Self {
        PackageFixture {
            manifest: manifest.into(),
            files: Vec::new(),
        }
    }

    /// Add a file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    /// Write the package under `dir`, returning the manifest path.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let manifest_path = dir.join(MANIFEST_NAME);
        std::fs::write(&manifest_path, &self.manifest)?;

        for (path, content) in &self.files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }

        Ok(manifest_path)
    }

    /// The Kit package: `Lib` depends on the `Bundle` resource target and
    /// the local `Core` binary; product `Kit` lists only `Lib`.
    pub fn kit() -> Self {
        PackageFixture::new(manifests::kit())
            .with_file("Resources/a.dat", b"data".to_vec())
            .with_file("Binaries/Core.zip", CORE_ZIP.to_vec())
            .with_file("Sources/Lib/Lib.swift", b"public struct Lib {}".to_vec())
    }

    /// The Kit package with `Core` downloaded from [`CORE_URL`].
    pub fn kit_remote(checksum: &str) -> Self {
        PackageFixture::new(manifests::kit_remote(CORE_URL, checksum))
            .with_file("Resources/a.dat", b"data".to_vec())
            .with_file("Sources/Lib/Lib.swift", b"public struct Lib {}".to_vec())
    }
}

/// Manifest templates.
pub mod manifests {
    const KIT_HEADER: &str = r#"[package]
name = "Kit"
default-localization = "en"

[[platforms]]
name = "ios"
version = "14"

[[products]]
name = "Kit"
targets = ["Lib"]

[[targets]]
name = "Bundle"
kind = "resource"
path = "Resources"
resources = [{ path = "a.dat", rule = "copy" }]

[[targets]]
name = "Lib"
dependencies = ["Bundle", "Core"]
"#;

    pub fn kit() -> String {
        format!(
            r#"{KIT_HEADER}
[[targets]]
name = "Core"
kind = "binary"
path = "Binaries/Core.zip"
"#
        )
    }

    pub fn kit_remote(url: &str, checksum: &str) -> String {
        format!(
            r#"{KIT_HEADER}
[[targets]]
name = "Core"
kind = "binary"
url = "{url}"
checksum = "{checksum}"
"#
        )
    }

    /// `A -> B -> A`, with a remote binary that must never be fetched.
    pub fn cyclic(url: &str, checksum: &str) -> String {
        format!(
            r#"[package]
name = "Loop"

[[products]]
name = "Loop"
targets = ["A"]

[[targets]]
name = "A"
dependencies = ["B", "Blob"]

[[targets]]
name = "B"
dependencies = ["A"]

[[targets]]
name = "Blob"
kind = "binary"
url = "{url}"
checksum = "{checksum}"
"#
        )
    }

    /// A product naming a target that does not exist.
    pub fn missing_product_target() -> String {
        r#"[package]
name = "Kit"

[[products]]
name = "Kit"
targets = ["Lib", "Ghost"]

[[targets]]
name = "Lib"
"#
        .to_string()
    }
}
