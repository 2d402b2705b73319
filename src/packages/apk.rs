// src/packages/apk.rs

//! Alpine package format parser
//!
//! An .apk is a concatenation of gzip streams (signature, control, data)
//! that together read as one tar archive. The control section carries a
//! `.PKGINFO` file of `key = value` lines.

use crate::checksum::Checksum;
use crate::compression::{create_decoder, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::traits::PackageCodec;
use crate::packages::{Package, PackageType};
use crate::repository::index::alpine;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;

/// Codec for .apk packages and APKINDEX archives
pub struct ApkCodec;

impl ApkCodec {
    /// Read `.PKGINFO` out of an apk file
    fn extract_pkginfo(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
        let decoder = create_decoder(BufReader::new(file), CompressionFormat::Gzip)?;
        let mut archive = Archive::new(decoder);
        // Each section may carry its own end-of-archive blocks
        archive.set_ignore_zeros(true);

        let entries = archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read apk archive: {}", e)))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read apk entry: {}", e)))?;

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

        Err(Error::ParseError(".PKGINFO not found in apk".to_string()))
    }

    /// Parse `.PKGINFO` content (`key = value` lines)
    pub fn parse_pkginfo(content: &str) -> Result<Package> {
        let mut pkg = Package::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().to_string();

            match key {
                "pkgname" => pkg.name = value,
                "pkgver" => pkg.version = value,
                "arch" => pkg.architecture = Some(value),
                "pkgdesc" => pkg.description = Some(value),
                "url" => pkg.homepage = Some(value),
                "license" => pkg.license = Some(value),
                "maintainer" => pkg.maintainer = Some(value),
                "depend" => pkg.dependencies.push(value),
                "size" => {
                    pkg.extras.insert("installed_size".to_string(), value);
                }
                _ => {
                    pkg.extras.insert(key.to_string(), value);
                }
            }
        }

        if pkg.name.is_empty() || pkg.version.is_empty() {
            return Err(Error::ParseError(
                ".PKGINFO is missing pkgname or pkgver".to_string(),
            ));
        }

        Ok(pkg)
    }
}

impl PackageCodec for ApkCodec {
    fn package_type(&self) -> PackageType {
        PackageType::Apk
    }

    fn parse_package(&self, path: &Path) -> Result<Package> {
        debug!("Parsing APK package: {}", path.display());

        let checksum = Checksum::from_path(path)?;
        let pkginfo = Self::extract_pkginfo(path).map_err(|e| e.for_file(path))?;
        let mut pkg = Self::parse_pkginfo(&pkginfo).map_err(|e| e.for_file(path))?;

        pkg.apply_checksum(&checksum);
        pkg.source_path = Some(path.to_path_buf());
        Ok(pkg)
    }

    fn write_index(&self, packages: &[Package]) -> Result<Vec<u8>> {
        let arch = packages
            .first()
            .and_then(|p| p.architecture.as_deref())
            .unwrap_or("noarch");
        alpine::write_apkindex_archive(packages, arch)
    }

    fn parse_existing_index(
        &self,
        repository_root: &Path,
        config: &RepositoryConfig,
    ) -> Result<Option<Vec<Package>>> {
        alpine::read_existing_packages(repository_root, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const PKGINFO: &str = "# Generated by abuild 3.12.0
# using fakeroot version 1.32.1
pkgname = hello
pkgver = 2.12-r1
pkgdesc = The GNU Hello program
url = https://www.gnu.org/software/hello/
builddate = 1700000000
packager = Buildozer <alpine-devel@lists.alpinelinux.org>
size = 49152
arch = x86_64
origin = hello
license = GPL-3.0-or-later
depend = so:libc.musl-x86_64.so.1
depend = busybox
";

    fn gzip_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        let tar = builder.into_inner().unwrap();
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&tar).unwrap();
        gz.finish().unwrap()
    }

    #[test]
    fn test_parse_pkginfo() {
        let pkg = ApkCodec::parse_pkginfo(PKGINFO).unwrap();
        assert_eq!(pkg.name, "hello");
        assert_eq!(pkg.version, "2.12-r1");
        assert_eq!(pkg.architecture.as_deref(), Some("x86_64"));
        assert_eq!(pkg.description.as_deref(), Some("The GNU Hello program"));
        assert_eq!(pkg.license.as_deref(), Some("GPL-3.0-or-later"));
        assert_eq!(pkg.dependencies, vec!["so:libc.musl-x86_64.so.1", "busybox"]);
        assert_eq!(pkg.extras.get("installed_size").map(String::as_str), Some("49152"));
        assert_eq!(pkg.extras.get("origin").map(String::as_str), Some("hello"));
    }

    #[test]
    fn test_pkginfo_requires_name_and_version() {
        assert!(ApkCodec::parse_pkginfo("pkgname = hello\n").is_err());
    }

    #[test]
    fn test_parse_apk_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello-2.12-r1.apk");
        let mut data = gzip_tar(&[(".SIGN.RSA.builder.rsa.pub", b"signature")]);
        data.extend(gzip_tar(&[(".PKGINFO", PKGINFO.as_bytes())]));
        std::fs::write(&path, &data).unwrap();

        let pkg = ApkCodec.parse_package(&path).unwrap();
        assert_eq!(pkg.name, "hello");
        assert_eq!(pkg.size, data.len() as u64);
        assert_eq!(pkg.sha1, Some(Checksum::from_bytes(&data).sha1));
    }
}
