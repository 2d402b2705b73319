// src/scanner.rs

//! Input directory scanning and package type detection
//!
//! Detection looks at the file name first and falls back to the leading
//! magic bytes, so misnamed `.deb` and `.rpm` files are still picked up.

use crate::compression::CompressionFormat;
use crate::error::{Error, Result};
use crate::packages::PackageType;
use crate::repository::CancellationToken;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const DEB_MAGIC: &[u8] = b"!<arch>\ndebian";
const RPM_MAGIC: &[u8] = &[0xed, 0xab, 0xee, 0xdb];
const MAGIC_LEN: usize = 16;

/// A package file found in the input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPackage {
    pub path: PathBuf,
    pub package_type: PackageType,
    pub size: u64,
}

/// Walk `input_dir` and return every recognized package, sorted by path
///
/// Symlinks are not followed. `exclude` (usually the output directory when it
/// sits inside the input) is skipped entirely.
pub fn scan(
    input_dir: &Path,
    exclude: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<Vec<ScannedPackage>> {
    let exclude = exclude.and_then(|p| fs::canonicalize(p).ok());
    let root = fs::canonicalize(input_dir).map_err(|e| Error::file_op(input_dir, e))?;

    let mut found = Vec::new();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| exclude.as_deref() != Some(entry.path()));

    for entry in walker {
        cancel.check()?;

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        match detect_package_type(path) {
            Ok(Some(package_type)) => {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                debug!("Found {} package {}", package_type, path.display());
                found.push(ScannedPackage {
                    path: path.to_path_buf(),
                    package_type,
                    size,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// Identify the package format of a file, or `None` when it is not a package
pub fn detect_package_type(path: &Path) -> Result<Option<PackageType>> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.contains(".bottle.tar") {
        return Ok(Some(PackageType::HomebrewBottle));
    }

    let magic = read_magic(path)?;

    if name.ends_with(".deb") || magic.starts_with(DEB_MAGIC) {
        return Ok(Some(PackageType::Deb));
    }
    if name.ends_with(".rpm") || magic.starts_with(RPM_MAGIC) {
        return Ok(Some(PackageType::Rpm));
    }

    let compression = CompressionFormat::from_magic_bytes(&magic);
    if name.ends_with(".apk") && compression == CompressionFormat::Gzip {
        return Ok(Some(PackageType::Apk));
    }
    if name.contains(".pkg.tar")
        && (compression != CompressionFormat::None || name.ends_with(".pkg.tar"))
    {
        return Ok(Some(PackageType::Pacman));
    }

    Ok(None)
}

fn read_magic(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
    let mut magic = Vec::with_capacity(MAGIC_LEN);
    file.take(MAGIC_LEN as u64)
        .read_to_end(&mut magic)
        .map_err(|e| Error::file_op(path, e))?;
    Ok(magic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_detect_by_name_and_magic() {
        let dir = TempDir::new().unwrap();
        let d = dir.path();

        let cases = [
            ("foo_1.0_amd64.deb", &b"anything"[..], Some(PackageType::Deb)),
            ("renamed.bin", &b"!<arch>\ndebian-binary   "[..], Some(PackageType::Deb)),
            ("bash.rpm", &b"x"[..], Some(PackageType::Rpm)),
            ("noext", &[0xed, 0xab, 0xee, 0xdb, 0x03][..], Some(PackageType::Rpm)),
            ("curl-8.0-r0.apk", &[0x1f, 0x8b, 0x08][..], Some(PackageType::Apk)),
            ("fake.apk", &b"PK\x03\x04"[..], None),
            ("foo-1.0-1-x86_64.pkg.tar.zst", &[0x28, 0xb5, 0x2f, 0xfd][..], Some(PackageType::Pacman)),
            ("foo-1.0-1-any.pkg.tar.xz", &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00][..], Some(PackageType::Pacman)),
            ("foo-1.0-1-any.pkg.tar", &b"ustar"[..], Some(PackageType::Pacman)),
            ("foo-1.0-1-any.pkg.tar.zst", &b"garbage"[..], None),
            ("wget--1.21.arm64_sonoma.bottle.tar.gz", &b""[..], Some(PackageType::HomebrewBottle)),
            ("README.md", &b"# readme"[..], None),
        ];

        for (name, content, expected) in cases {
            let path = write(d, name, content);
            assert_eq!(detect_package_type(&path).unwrap(), expected, "{}", name);
        }
    }

    #[test]
    fn test_scan_sorted_and_excludes_output() {
        let dir = TempDir::new().unwrap();
        let d = dir.path();
        write(d, "b/zeta_1.0_amd64.deb", b"x");
        write(d, "a/alpha_1.0_amd64.deb", b"x");
        write(d, "notes.txt", b"x");
        write(d, "repo/pool/main/a/alpha/alpha_1.0_amd64.deb", b"x");

        let found = scan(d, Some(&d.join("repo")), &CancellationToken::new()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha_1.0_amd64.deb", "zeta_1.0_amd64.deb"]);
        assert!(found.iter().all(|p| p.package_type == PackageType::Deb && p.size == 1));
    }

    #[test]
    fn test_scan_cancelled() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "foo_1.0_amd64.deb", b"x");

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(scan(dir.path(), None, &cancel), Err(Error::Cancelled)));
    }
}
