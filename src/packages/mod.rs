// src/packages/mod.rs

//! Package format support
//!
//! Every supported container format (DEB, RPM, apk, pacman, Homebrew bottle)
//! is read into the same canonical [`Package`] record. Each format implements
//! the [`PackageCodec`] trait, which also covers writing and re-reading the
//! ecosystem's repository index.

pub mod apk;
pub mod arch;
pub mod bottle;
pub mod deb;
pub mod rpm;
pub mod traits;

pub use traits::PackageCodec;

use crate::checksum::Checksum;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Package ecosystems the generator knows how to publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PackageType {
    Deb,
    Rpm,
    Apk,
    Pacman,
    HomebrewBottle,
}

impl PackageType {
    /// All package types, in the order generation results are reported
    pub const ALL: [PackageType; 5] = [
        PackageType::Deb,
        PackageType::Rpm,
        PackageType::Apk,
        PackageType::Pacman,
        PackageType::HomebrewBottle,
    ];

    /// Codec for this package type
    pub fn codec(&self, base_url: Option<&str>) -> Box<dyn PackageCodec> {
        match self {
            PackageType::Deb => Box::new(deb::DebCodec),
            PackageType::Rpm => Box::new(rpm::RpmCodec),
            PackageType::Apk => Box::new(apk::ApkCodec),
            PackageType::Pacman => Box::new(arch::ArchCodec),
            PackageType::HomebrewBottle => Box::new(bottle::BottleCodec::new(base_url)),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageType::Deb => "deb",
            PackageType::Rpm => "rpm",
            PackageType::Apk => "apk",
            PackageType::Pacman => "pacman",
            PackageType::HomebrewBottle => "homebrew",
        };
        write!(f, "{}", name)
    }
}

/// Canonical, ecosystem-agnostic package record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub maintainer: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,

    pub dependencies: Vec<String>,
    pub conflicts: Vec<String>,
    pub groups: Vec<String>,

    /// Where the scanner found the file; `None` for records re-read from an index
    pub source_path: Option<PathBuf>,

    /// Repository-relative path as written into the index
    pub published_path: Option<String>,

    pub size: u64,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub sha512: Option<String>,

    /// Format-specific fields, including every unrecognized control field
    pub extras: BTreeMap<String, String>,
}

impl Package {
    /// Create a package with only name and version set
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Record the digests and size of the package file
    pub fn apply_checksum(&mut self, checksum: &Checksum) {
        self.size = checksum.size;
        self.md5 = Some(checksum.md5.clone());
        self.sha1 = Some(checksum.sha1.clone());
        self.sha256 = Some(checksum.sha256.clone());
        self.sha512 = Some(checksum.sha512.clone());
    }

    /// File name of the package, from the source path or the published path
    pub fn file_name(&self) -> Option<String> {
        if let Some(name) = self
            .source_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
        {
            return Some(name);
        }

        self.published_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }

    /// Identity used for incremental conflict detection
    pub fn identity(&self, package_type: PackageType) -> PackageIdentity {
        match package_type {
            PackageType::Rpm => PackageIdentity {
                name: self.name.clone(),
                version: self.version.clone(),
                release: Some(
                    self.extras
                        .get("Release")
                        .filter(|r| !r.is_empty())
                        .cloned()
                        .unwrap_or_else(|| "1".to_string()),
                ),
                architecture: self.architecture.clone(),
            },
            PackageType::HomebrewBottle => PackageIdentity {
                name: self.name.clone(),
                version: self.version.clone(),
                release: None,
                architecture: None,
            },
            PackageType::Deb | PackageType::Apk | PackageType::Pacman => PackageIdentity {
                name: self.name.clone(),
                version: self.version.clone(),
                release: None,
                architecture: self.architecture.clone(),
            },
        }
    }
}

/// Key that identifies a package within one ecosystem's repository
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
    pub release: Option<String>,
    pub architecture: Option<String>,
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            Some(self.name.as_str()),
            Some(self.version.as_str()),
            self.release.as_deref(),
            self.architecture.as_deref(),
        ];
        let joined: Vec<&str> = parts
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        write!(f, "{}", joined.join("-"))
    }
}
