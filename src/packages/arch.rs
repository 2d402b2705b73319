// src/packages/arch.rs

//! Arch Linux package format parser
//!
//! Parses .pkg.tar.zst, .pkg.tar.xz, .pkg.tar.gz and plain .pkg.tar
//! packages, extracting metadata from .PKGINFO

use crate::checksum::Checksum;
use crate::compression::{create_decoder, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::traits::PackageCodec;
use crate::packages::{Package, PackageType};
use crate::repository::index::arch;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;

/// Codec for pacman packages and repository databases
pub struct ArchCodec;

impl ArchCodec {
    /// Detect compression format from file extension
    fn detect_compression(file_name: &str) -> Result<CompressionFormat> {
        if file_name.ends_with(".pkg.tar.zst") {
            Ok(CompressionFormat::Zstd)
        } else if file_name.ends_with(".pkg.tar.xz") {
            Ok(CompressionFormat::Xz)
        } else if file_name.ends_with(".pkg.tar.gz") {
            Ok(CompressionFormat::Gzip)
        } else if file_name.ends_with(".pkg.tar") {
            Ok(CompressionFormat::None)
        } else {
            Err(Error::ParseError(format!(
                "Unsupported Arch package format: {}. Expected .pkg.tar.zst, .pkg.tar.xz, .pkg.tar.gz or .pkg.tar",
                file_name
            )))
        }
    }

    /// Open the package and find `.PKGINFO`
    fn extract_pkginfo(path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let compression = Self::detect_compression(&file_name)?;

        let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
        let decoder = create_decoder(BufReader::new(file), compression)?;
        let mut archive = Archive::new(decoder);

        for entry in archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read package archive: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read entry: {}", e)))?;

            let is_pkginfo = entry
                .path()
                .map(|p| p.to_string_lossy() == ".PKGINFO")
                .unwrap_or(false);

            if is_pkginfo {
                let mut content = String::new();
                entry
                    .read_to_string(&mut content)
                    .map_err(|e| Error::ParseError(format!("Failed to read .PKGINFO: {}", e)))?;
                return Ok(content);
            }
        }

        Err(Error::ParseError(".PKGINFO not found in package".to_string()))
    }

    /// Parse .PKGINFO file content
    pub fn parse_pkginfo(content: &str) -> Result<Package> {
        let mut pkg = Package::default();
        let mut licenses: Vec<String> = Vec::new();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().to_string();

                match key {
                    "pkgname" => pkg.name = value,
                    "pkgver" => pkg.version = value,
                    "pkgdesc" => pkg.description = Some(value),
                    "url" => pkg.homepage = Some(value),
                    "arch" => pkg.architecture = Some(value),
                    "packager" => pkg.maintainer = Some(value),
                    "license" => licenses.push(value),
                    "depend" => pkg.dependencies.push(value),
                    "conflict" => pkg.conflicts.push(value),
                    "group" => pkg.groups.push(value),
                    "builddate" => {
                        pkg.extras.insert("BuildDate".to_string(), value);
                    }
                    "size" => {
                        pkg.extras.insert("InstalledSize".to_string(), value);
                    }
                    _ => {
                        // Repeated keys (optdepend, makedepend, provides) keep every value
                        pkg.extras
                            .entry(key.to_string())
                            .and_modify(|existing| {
                                existing.push('\n');
                                existing.push_str(&value);
                            })
                            .or_insert(value);
                    }
                }
            }
        }

        if !licenses.is_empty() {
            pkg.license = Some(licenses.join(" "));
        }

        if pkg.name.is_empty() || pkg.version.is_empty() {
            return Err(Error::ParseError(
                ".PKGINFO is missing pkgname or pkgver".to_string(),
            ));
        }

        Ok(pkg)
    }
}

impl PackageCodec for ArchCodec {
    fn package_type(&self) -> PackageType {
        PackageType::Pacman
    }

    fn parse_package(&self, path: &Path) -> Result<Package> {
        debug!("Parsing Arch package: {}", path.display());

        let checksum = Checksum::from_path(path)?;
        let pkginfo = Self::extract_pkginfo(path).map_err(|e| e.for_file(path))?;
        let mut pkg = Self::parse_pkginfo(&pkginfo).map_err(|e| e.for_file(path))?;

        pkg.apply_checksum(&checksum);
        pkg.source_path = Some(path.to_path_buf());

        debug!(
            "Parsed Arch package: {} {} ({} dependencies)",
            pkg.name,
            pkg.version,
            pkg.dependencies.len()
        );
        Ok(pkg)
    }

    fn write_index(&self, packages: &[Package]) -> Result<Vec<u8>> {
        arch::write_database(packages)
    }

    fn parse_existing_index(
        &self,
        repository_root: &Path,
        config: &RepositoryConfig,
    ) -> Result<Option<Vec<Package>>> {
        arch::read_existing_packages(repository_root, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKGINFO: &str = r#"# Generated by makepkg 6.0.2
pkgname = test-package
pkgbase = test-package
pkgver = 1.0.0-1
pkgdesc = A test package
url = https://example.com
builddate = 1234567890
packager = Test User <test@example.com>
size = 1024
arch = x86_64
license = MIT
license = Apache-2.0
group = base-devel
conflict = old-package
depend = glibc
depend = gcc-libs
optdepend = python: for scripts
optdepend = perl: for other scripts
"#;

    fn build_package(path: &Path, format: CompressionFormat) {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(PKGINFO.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, ".PKGINFO", PKGINFO.as_bytes())
            .unwrap();
        let tar = builder.into_inner().unwrap();
        let data = crate::compression::compress(&tar, format).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn test_detect_compression() {
        assert_eq!(
            ArchCodec::detect_compression("foo-1.0-1-x86_64.pkg.tar.zst").unwrap(),
            CompressionFormat::Zstd
        );
        assert_eq!(
            ArchCodec::detect_compression("foo-1.0-1-x86_64.pkg.tar.xz").unwrap(),
            CompressionFormat::Xz
        );
        assert_eq!(
            ArchCodec::detect_compression("foo-1.0-1-x86_64.pkg.tar").unwrap(),
            CompressionFormat::None
        );
        assert!(ArchCodec::detect_compression("foo.tar.bz2").is_err());
    }

    #[test]
    fn test_pkginfo_parsing() {
        let pkg = ArchCodec::parse_pkginfo(PKGINFO).unwrap();
        assert_eq!(pkg.name, "test-package");
        assert_eq!(pkg.version, "1.0.0-1");
        assert_eq!(pkg.description.as_deref(), Some("A test package"));
        assert_eq!(pkg.homepage.as_deref(), Some("https://example.com"));
        assert_eq!(pkg.architecture.as_deref(), Some("x86_64"));
        assert_eq!(pkg.maintainer.as_deref(), Some("Test User <test@example.com>"));
        assert_eq!(pkg.license.as_deref(), Some("MIT Apache-2.0"));
        assert_eq!(pkg.dependencies, vec!["glibc", "gcc-libs"]);
        assert_eq!(pkg.conflicts, vec!["old-package"]);
        assert_eq!(pkg.groups, vec!["base-devel"]);
        assert_eq!(pkg.extras.get("BuildDate").map(String::as_str), Some("1234567890"));
        assert_eq!(pkg.extras.get("InstalledSize").map(String::as_str), Some("1024"));
        assert_eq!(
            pkg.extras.get("optdepend").map(String::as_str),
            Some("python: for scripts\nperl: for other scripts")
        );
    }

    #[test]
    fn test_parse_compressed_packages() {
        let dir = tempfile::tempdir().unwrap();
        for (suffix, format) in [
            ("pkg.tar.zst", CompressionFormat::Zstd),
            ("pkg.tar.xz", CompressionFormat::Xz),
            ("pkg.tar.gz", CompressionFormat::Gzip),
        ] {
            let path = dir.path().join(format!("test-package-1.0.0-1-x86_64.{}", suffix));
            build_package(&path, format);

            let pkg = ArchCodec.parse_package(&path).unwrap();
            assert_eq!(pkg.name, "test-package");
            assert_eq!(pkg.identity(PackageType::Pacman).to_string(), "test-package-1.0.0-1-x86_64");
        }
    }
}
