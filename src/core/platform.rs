//! Platform requirements - which OS versions a package supports.
//!
//! A requirement is a platform name plus a minimum version. Versions are
//! written the way vendors publish them (`"14"`, `"14.0"`, `"10.15.4"`)
//! and compared numerically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A platform a package can declare support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformName {
    #[serde(alias = "iOS")]
    Ios,
    #[serde(alias = "macOS", alias = "osx")]
    Macos,
    #[serde(alias = "tvOS")]
    Tvos,
    #[serde(alias = "watchOS")]
    Watchos,
    #[serde(alias = "visionOS")]
    Visionos,
    #[serde(alias = "macCatalyst")]
    Maccatalyst,
    #[serde(alias = "driverKit")]
    Driverkit,
}

impl PlatformName {
    /// All known platforms.
    pub const ALL: [PlatformName; 7] = [
        PlatformName::Ios,
        PlatformName::Macos,
        PlatformName::Tvos,
        PlatformName::Watchos,
        PlatformName::Visionos,
        PlatformName::Maccatalyst,
        PlatformName::Driverkit,
    ];

    /// Display name as vendors spell it.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformName::Ios => "iOS",
            PlatformName::Macos => "macOS",
            PlatformName::Tvos => "tvOS",
            PlatformName::Watchos => "watchOS",
            PlatformName::Visionos => "visionOS",
            PlatformName::Maccatalyst => "macCatalyst",
            PlatformName::Driverkit => "DriverKit",
        }
    }

    /// Prefix used by `.xcframework` library identifiers for this platform
    /// (e.g. `ios-arm64`, `ios-arm64_x86_64-simulator`, `ios-arm64-maccatalyst`).
    pub fn slice_prefix(&self) -> &'static str {
        match self {
            PlatformName::Ios | PlatformName::Maccatalyst => "ios-",
            PlatformName::Macos => "macos-",
            PlatformName::Tvos => "tvos-",
            PlatformName::Watchos => "watchos-",
            PlatformName::Visionos => "xros-",
            PlatformName::Driverkit => "driverkit-",
        }
    }
}

impl fmt::Display for PlatformName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformName::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .or_else(|| s.eq_ignore_ascii_case("osx").then_some(PlatformName::Macos))
            .ok_or_else(|| format!("unknown platform `{}`", s))
    }
}

/// A minimum OS version.
///
/// Keeps the original spelling for display; ordering uses the numeric value.
#[derive(Debug, Clone)]
pub struct OsVersion {
    version: Version,
    raw: String,
}

impl OsVersion {
    /// Parse a dotted version with one to three numeric components.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        let parts: Vec<&str> = s.split('.').collect();
        if s.is_empty() || parts.len() > 3 {
            return Err(format!("invalid OS version `{}`", s));
        }

        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| format!("invalid OS version `{}`", s))?;
        }

        Ok(OsVersion {
            version: Version::new(nums[0], nums[1], nums[2]),
            raw: s.to_string(),
        })
    }
}

impl PartialEq for OsVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for OsVersion {}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OsVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for OsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OsVersion::parse(s)
    }
}

impl Serialize for OsVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OsVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OsVersion::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A single `(platform, minimum version)` requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub name: PlatformName,
    #[serde(alias = "min")]
    pub version: OsVersion,
}

impl Platform {
    pub fn new(name: PlatformName, version: OsVersion) -> Self {
        Platform { name, version }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
