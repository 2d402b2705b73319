// src/repository/index/debian.rs

//! APT repository metadata
//!
//! Writes `dists/<codename>/<component>/binary-<arch>/Packages` stanzas and
//! the `dists/<codename>/Release` file, and reads published `Packages`
//! files back for incremental runs.

use crate::checksum::Checksum;
use crate::compression::{decompress, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::deb::{apply_control_field, format_field, parse_paragraphs};
use crate::packages::{Package, PackageType};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// RFC 1123 with numeric zone, as APT expects in `Date:`
const RELEASE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// A metadata file listed in `Release`, relative to `dists/<codename>/`
#[derive(Debug, Clone)]
pub struct ReleaseEntry {
    pub path: String,
    pub checksum: Checksum,
}

/// Directory holding the `binary-<arch>` index for one component
pub fn binary_dir(root: &Path, codename: &str, component: &str, arch: &str) -> PathBuf {
    root.join("dists")
        .join(codename)
        .join(component)
        .join(format!("binary-{}", arch))
}

/// Serialize packages into `Packages` text
///
/// Records are sorted by name then version and each is followed by a blank
/// line. Every package must already have its `published_path`.
pub fn write_packages_file(packages: &[Package]) -> Result<String> {
    let mut sorted: Vec<&Package> = packages.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));

    let mut out = String::new();
    for pkg in sorted {
        let filename = pkg.published_path.as_deref().ok_or_else(|| {
            Error::MetadataError(format!(
                "{} {} has no pool path; it was never laid out",
                pkg.name, pkg.version
            ))
        })?;

        out.push_str(&format_field("Package", &pkg.name));
        out.push_str(&format_field("Version", &pkg.version));
        out.push_str(&format_field(
            "Architecture",
            pkg.architecture.as_deref().unwrap_or("all"),
        ));
        out.push_str(&format_field("Filename", filename));
        out.push_str(&format_field("Size", &pkg.size.to_string()));
        out.push_str(&format_field("MD5sum", pkg.md5.as_deref().unwrap_or_default()));
        out.push_str(&format_field("SHA1", pkg.sha1.as_deref().unwrap_or_default()));
        out.push_str(&format_field("SHA256", pkg.sha256.as_deref().unwrap_or_default()));
        out.push_str(&format_field("SHA512", pkg.sha512.as_deref().unwrap_or_default()));

        let optional = [
            ("Maintainer", pkg.maintainer.as_deref()),
            ("Homepage", pkg.homepage.as_deref()),
            ("License", pkg.license.as_deref()),
            ("Description", pkg.description.as_deref()),
        ];
        for (field, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                out.push_str(&format_field(field, value));
            }
        }
        if !pkg.dependencies.is_empty() {
            out.push_str(&format_field("Depends", &pkg.dependencies.join(", ")));
        }

        for (key, value) in &pkg.extras {
            out.push_str(&format_field(key, value));
        }

        out.push('\n');
    }

    Ok(out)
}

/// Parse `Packages` text back into package records
pub fn parse_packages_file(content: &str) -> Result<Vec<Package>> {
    let mut packages = Vec::new();

    for paragraph in parse_paragraphs(content) {
        let mut pkg = Package::default();
        for (field, value) in paragraph {
            match field.as_str() {
                "Filename" => pkg.published_path = Some(value),
                "Size" => {
                    pkg.size = value.parse().map_err(|_| {
                        Error::ParseError(format!("Invalid Size '{}' in Packages", value))
                    })?;
                }
                "MD5sum" => pkg.md5 = Some(value),
                "SHA1" => pkg.sha1 = Some(value),
                "SHA256" => pkg.sha256 = Some(value),
                "SHA512" => pkg.sha512 = Some(value),
                _ => apply_control_field(&mut pkg, field, value),
            }
        }

        if pkg.name.is_empty() || pkg.version.is_empty() {
            return Err(Error::ParseError(
                "Packages stanza without Package or Version".to_string(),
            ));
        }
        packages.push(pkg);
    }

    Ok(packages)
}

/// Read every published `Packages` index under `root`
///
/// Architectures come from the configured filter, or from the `binary-*`
/// directories on disk. `Architecture: all` records appear under every
/// architecture and are returned once.
pub fn read_existing_packages(
    root: &Path,
    config: &RepositoryConfig,
) -> Result<Option<Vec<Package>>> {
    let mut found_index = false;
    let mut seen = HashSet::new();
    let mut packages = Vec::new();

    for component in &config.components {
        let component_dir = root.join("dists").join(&config.codename).join(component);
        let architectures = if config.architectures.is_empty() {
            discover_architectures(&component_dir)?
        } else {
            config.architectures.clone()
        };

        for arch in architectures {
            let dir = binary_dir(root, &config.codename, component, &arch);
            let Some(content) = read_packages_index(&dir)? else {
                continue;
            };
            found_index = true;

            for pkg in parse_packages_file(&content)? {
                if seen.insert(pkg.identity(PackageType::Deb)) {
                    packages.push(pkg);
                }
            }
        }
    }

    if !found_index {
        return Ok(None);
    }

    debug!("Read {} published Debian packages", packages.len());
    Ok(Some(packages))
}

/// Architectures with a `binary-<arch>` directory under a component
fn discover_architectures(component_dir: &Path) -> Result<Vec<String>> {
    if !component_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut architectures = Vec::new();
    for entry in fs::read_dir(component_dir).map_err(|e| Error::file_op(component_dir, e))? {
        let entry = entry.map_err(|e| Error::file_op(component_dir, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(arch) = name.strip_prefix("binary-") {
            architectures.push(arch.to_string());
        }
    }
    architectures.sort();
    Ok(architectures)
}

/// `Packages`, falling back to `Packages.gz`
fn read_packages_index(dir: &Path) -> Result<Option<String>> {
    let plain = dir.join("Packages");
    if plain.is_file() {
        let content = fs::read_to_string(&plain).map_err(|e| Error::file_op(&plain, e))?;
        return Ok(Some(content));
    }

    let gz = dir.join("Packages.gz");
    if gz.is_file() {
        let data = fs::read(&gz).map_err(|e| Error::file_op(&gz, e))?;
        let decoded = decompress(&data, CompressionFormat::Gzip)?;
        let content = String::from_utf8(decoded)
            .map_err(|e| Error::ParseError(format!("{}: invalid UTF-8: {}", gz.display(), e)))?;
        return Ok(Some(content));
    }

    Ok(None)
}

/// Build the `Release` file for one codename
pub fn write_release(
    config: &RepositoryConfig,
    architectures: &[String],
    entries: &[ReleaseEntry],
    date: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Origin: {}\n", config.origin));
    out.push_str(&format!("Label: {}\n", config.label));
    out.push_str(&format!("Suite: {}\n", config.suite));
    out.push_str(&format!("Codename: {}\n", config.codename));
    out.push_str(&format!("Architectures: {}\n", architectures.join(" ")));
    out.push_str(&format!("Components: {}\n", config.components.join(" ")));
    out.push_str(&format!("Date: {}\n", date.format(RELEASE_DATE_FORMAT)));

    let sections: [(&str, fn(&Checksum) -> &str); 4] = [
        ("MD5Sum", |c| c.md5.as_str()),
        ("SHA1", |c| c.sha1.as_str()),
        ("SHA256", |c| c.sha256.as_str()),
        ("SHA512", |c| c.sha512.as_str()),
    ];
    for (title, digest) in sections {
        out.push_str(title);
        out.push_str(":\n");
        for entry in entries {
            out.push_str(&format!(
                " {} {} {}\n",
                digest(&entry.checksum),
                entry.checksum.size,
                entry.path
            ));
        }
    }

    out
}
