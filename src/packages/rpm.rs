// src/packages/rpm.rs

//! RPM package format parser
//!
//! Header tags are read with the `rpm` crate. On top of the usual
//! name/version/arch tags, the distribution release (Fedora 40, EL 9, ...)
//! is guessed from DISTURL, DISTRIBUTION or DISTTAG so packages can be
//! placed under the right `<version>/<arch>/` tree.

use crate::checksum::Checksum;
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::traits::PackageCodec;
use crate::packages::{Package, PackageType};
use crate::repository::index::fedora;
use regex::Regex;
use rpm::IndexTag;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Patterns tried in order against each distro tag; the last is a catch-all
const DISTRO_VERSION_PATTERNS: [&str; 7] = [
    r"fc(\d+)",
    r"\.fc(\d+)",
    r"el(\d+)",
    r"\.el(\d+)",
    r"\.c(\d+)",
    r"fedora(\d+)",
    r"(\d+)",
];

static DISTRO_VERSION_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DISTRO_VERSION_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Codec for .rpm packages and yum/dnf repodata
pub struct RpmCodec;

impl RpmCodec {
    /// Read a string tag, whether stored plain or as an i18n string
    fn string_tag(pkg: &rpm::Package, tag: IndexTag) -> Option<String> {
        let header = &pkg.metadata.header;
        header
            .get_entry_data_as_string(tag)
            .or_else(|_| header.get_entry_data_as_i18n_string(tag))
            .ok()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Build the canonical package record from a parsed RPM
    fn to_package(rpm_pkg: &rpm::Package) -> Result<Package> {
        let metadata = &rpm_pkg.metadata;

        let name = metadata
            .get_name()
            .map_err(|e| Error::ParseError(format!("Failed to get package name: {}", e)))?
            .to_string();
        let version = metadata
            .get_version()
            .map_err(|e| Error::ParseError(format!("Failed to get package version: {}", e)))?
            .to_string();

        let mut pkg = Package::new(name, version);
        pkg.architecture = metadata.get_arch().ok().map(str::to_string);
        pkg.description = metadata.get_summary().ok().map(str::to_string);
        pkg.maintainer = Self::string_tag(rpm_pkg, IndexTag::RPMTAG_PACKAGER);
        pkg.homepage = metadata.get_url().ok().map(str::to_string).filter(|u| !u.is_empty());
        pkg.license = metadata.get_license().ok().map(str::to_string);

        if let Ok(requires) = metadata.get_requires() {
            pkg.dependencies = requires
                .into_iter()
                .map(|req| req.name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }

        if let Ok(release) = metadata.get_release() {
            pkg.extras.insert("Release".to_string(), release.to_string());
        }
        if let Some(group) = Self::string_tag(rpm_pkg, IndexTag::RPMTAG_GROUP) {
            pkg.extras.insert("Group".to_string(), group);
        }
        if let Ok(build_time) = metadata.get_build_time() {
            pkg.extras.insert("BuildTime".to_string(), build_time.to_string());
        }

        let distro_tags = [
            Self::string_tag(rpm_pkg, IndexTag::RPMTAG_DISTURL),
            Self::string_tag(rpm_pkg, IndexTag::RPMTAG_DISTRIBUTION),
            Self::string_tag(rpm_pkg, IndexTag::RPMTAG_DISTTAG),
        ];
        if let Some(distro_version) = distro_version_from_tags(&distro_tags) {
            pkg.extras.insert("DistroVersion".to_string(), distro_version);
        }

        Ok(pkg)
    }
}

/// Extract a distribution version from DISTURL, DISTRIBUTION and DISTTAG
///
/// The first tag that yields any match wins; within a tag the patterns are
/// tried in order, ending with "first run of digits".
pub fn distro_version_from_tags(tags: &[Option<String>]) -> Option<String> {
    tags.iter().flatten().find_map(|tag| extract_distro_version(tag))
}

/// Extract a distribution version from one tag value (`fc40` -> `40`)
pub fn extract_distro_version(value: &str) -> Option<String> {
    DISTRO_VERSION_REGEXES.iter().find_map(|re| {
        re.captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

impl PackageCodec for RpmCodec {
    fn package_type(&self) -> PackageType {
        PackageType::Rpm
    }

    fn parse_package(&self, path: &Path) -> Result<Package> {
        debug!("Parsing RPM package: {}", path.display());

        let checksum = Checksum::from_path(path)?;

        let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
        let mut buf_reader = BufReader::new(file);
        let rpm_pkg = rpm::Package::parse(&mut buf_reader).map_err(|e| {
            Error::ParseError(format!("{}: failed to parse RPM: {}", path.display(), e))
        })?;

        let mut pkg = Self::to_package(&rpm_pkg).map_err(|e| e.for_file(path))?;
        pkg.apply_checksum(&checksum);
        pkg.source_path = Some(path.to_path_buf());

        debug!(
            "Parsed RPM: {} {} ({} dependencies, distro version {:?})",
            pkg.name,
            pkg.version,
            pkg.dependencies.len(),
            pkg.extras.get("DistroVersion")
        );

        Ok(pkg)
    }

    fn write_index(&self, packages: &[Package]) -> Result<Vec<u8>> {
        fedora::write_primary_xml(packages)
    }

    fn parse_existing_index(
        &self,
        repository_root: &Path,
        _config: &RepositoryConfig,
    ) -> Result<Option<Vec<Package>>> {
        fedora::read_existing_packages(repository_root)
    }
}
