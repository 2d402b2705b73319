// src/packages/bottle.rs

//! Homebrew bottle support
//!
//! Bottles carry no control file the generator needs; everything comes from
//! the file name: `<name>--<version>.<platform>.bottle.tar.gz`.

use crate::checksum::Checksum;
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::traits::PackageCodec;
use crate::packages::{Package, PackageType};
use crate::repository::index::homebrew;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static PLATFORM_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"--(.*)\.(bottle\.tar\.gz|bottle\.tar)").ok());

/// Name, version and platform recovered from a bottle file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottleName {
    pub name: String,
    pub version: String,
    pub platform: String,
}

impl BottleName {
    /// Split `foo--1.2.3.arm64_sonoma.bottle.tar.gz`
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name
            .strip_suffix(".bottle.tar.gz")
            .or_else(|| file_name.strip_suffix(".bottle.tar"))?;
        let (name, _) = stem.split_once("--")?;
        if name.is_empty() {
            return None;
        }

        let captured = PLATFORM_RE
            .as_ref()
            .and_then(|re| re.captures(file_name))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())?;

        let (version, platform) = match captured.rsplit_once('.') {
            Some((version, platform)) => (version, platform),
            None => ("", captured),
        };

        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
            platform: platform.to_string(),
        })
    }

    /// Bottle name without the version and platform (`foo--1.0.x.bottle.tar.gz` -> `foo`)
    pub fn package_name(file_name: &str) -> &str {
        let stem = file_name
            .strip_suffix(".bottle.tar.gz")
            .or_else(|| file_name.strip_suffix(".bottle.tar"))
            .unwrap_or(file_name);
        stem.split("--").next().unwrap_or(stem)
    }
}

/// Codec for Homebrew bottles and tap formulas
pub struct BottleCodec {
    base_url: Option<String>,
}

impl BottleCodec {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url.map(str::to_string),
        }
    }
}

impl PackageCodec for BottleCodec {
    fn package_type(&self) -> PackageType {
        PackageType::HomebrewBottle
    }

    fn parse_package(&self, path: &Path) -> Result<Package> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = BottleName::parse(&file_name).ok_or_else(|| {
            Error::ParseError(format!(
                "{}: not a bottle name (expected <name>--<version>.<platform>.bottle.tar.gz)",
                path.display()
            ))
        })?;

        let checksum = Checksum::from_path(path)?;
        let mut pkg = Package::new(parsed.name, parsed.version);
        pkg.apply_checksum(&checksum);
        pkg.extras.insert("Platform".to_string(), parsed.platform);
        pkg.source_path = Some(path.to_path_buf());

        debug!("Parsed bottle {} {} for {:?}", pkg.name, pkg.version, pkg.extras.get("Platform"));
        Ok(pkg)
    }

    fn write_index(&self, packages: &[Package]) -> Result<Vec<u8>> {
        let formula = homebrew::write_formula(packages, self.base_url.as_deref())?;
        Ok(formula.into_bytes())
    }

    fn parse_existing_index(
        &self,
        repository_root: &Path,
        _config: &RepositoryConfig,
    ) -> Result<Option<Vec<Package>>> {
        homebrew::read_existing_packages(repository_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bottle_name_parsing() {
        let parsed = BottleName::parse("wget--1.21.4.arm64_sonoma.bottle.tar.gz").unwrap();
        assert_eq!(parsed.name, "wget");
        assert_eq!(parsed.version, "1.21.4");
        assert_eq!(parsed.platform, "arm64_sonoma");

        let parsed = BottleName::parse("jq--1.7.x86_64_linux.bottle.tar").unwrap();
        assert_eq!(parsed.name, "jq");
        assert_eq!(parsed.version, "1.7");
        assert_eq!(parsed.platform, "x86_64_linux");

        assert!(BottleName::parse("wget-1.21.tar.gz").is_none());
        assert_eq!(BottleName::package_name("my-tool--2.0.sonoma.bottle.tar.gz"), "my-tool");
    }

    #[test]
    fn test_parse_bottle_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello--2.12.ventura.bottle.tar.gz");
        std::fs::write(&path, b"bottle bytes").unwrap();

        let pkg = BottleCodec::new(None).parse_package(&path).unwrap();
        assert_eq!(pkg.name, "hello");
        assert_eq!(pkg.version, "2.12");
        assert_eq!(pkg.size, 12);
        assert_eq!(pkg.extras.get("Platform").map(String::as_str), Some("ventura"));
        assert_eq!(pkg.sha256, Some(Checksum::from_bytes(b"bottle bytes").sha256));
    }

    #[test]
    fn test_bad_bottle_name_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random.bottle.tar.gz");
        std::fs::write(&path, b"x").unwrap();

        let result = BottleCodec::new(None).parse_package(&path);
        assert!(matches!(result, Err(Error::ParseError(_))));
    }
}
