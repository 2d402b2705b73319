// src/filesystem.rs

//! Output tree file operations
//!
//! Every file the generators produce goes through [`write_file`] or
//! [`reconcile_package_file`], which write to a temporary file in the
//! destination directory and rename it into place, so readers of a published
//! repository never see a partially written index or package.

use crate::checksum::sha256_file;
use crate::error::{Error, Result};
use crate::packages::Package;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Result of reconciling one package file into the output tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    UpToDate,
    /// Neither the input file nor a previously published copy exists
    SourceMissing,
}

/// Create a directory and its parents
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::file_op(path, e))
}

/// Atomically replace `path` with `content`
pub fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let mut temp = temp_file_for(path)?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| Error::file_op(path, e))?;
    temp.persist(path).map_err(|e| Error::file_op(path, e.error))?;

    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Remove a file if it exists
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::file_op(path, e)),
    }
}

/// Atomically copy `source` to `destination`
pub fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    let mut input = File::open(source).map_err(|e| Error::file_op(source, e))?;
    let mut temp = temp_file_for(destination)?;
    let copied = io::copy(&mut input, &mut temp).map_err(|e| Error::file_op(destination, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::file_op(destination, e))?;
    temp.persist(destination)
        .map_err(|e| Error::file_op(destination, e.error))?;
    Ok(copied)
}

/// Place a package file at `destination`, copying only when needed
///
/// The source is the scanned input file, or for packages re-read from an
/// existing index, `repository_root/published_path`. A package with no file
/// anywhere is reported as [`CopyOutcome::SourceMissing`]; its metadata is
/// still published.
pub fn reconcile_package_file(
    package: &Package,
    destination: &Path,
    repository_root: &Path,
) -> Result<CopyOutcome> {
    let Some(source) = resolve_source(package, repository_root) else {
        warn!(
            "No local file for {} {}; keeping its index entry only",
            package.name, package.version
        );
        return Ok(CopyOutcome::SourceMissing);
    };

    if same_file(&source, destination) {
        return Ok(CopyOutcome::UpToDate);
    }

    let dest_meta = match fs::metadata(destination) {
        Ok(meta) => Some(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(Error::file_op(destination, e)),
    };
    let source_size = fs::metadata(&source)
        .map_err(|e| Error::file_op(&source, e))?
        .len();

    let needs_copy = match dest_meta {
        None => true,
        Some(meta) if meta.len() != source_size => true,
        Some(_) => {
            let expected = match package.sha256.as_deref() {
                Some(sha) => sha.to_string(),
                None => sha256_file(&source)?,
            };
            sha256_file(destination)? != expected
        }
    };

    if !needs_copy {
        debug!("{} is up to date", destination.display());
        return Ok(CopyOutcome::UpToDate);
    }

    if let Some(parent) = destination.parent() {
        ensure_dir(parent)?;
    }
    let bytes = copy_file(&source, destination)?;
    debug!(
        "Copied {} -> {} ({} bytes)",
        source.display(),
        destination.display(),
        bytes
    );
    Ok(CopyOutcome::Copied)
}

fn resolve_source(package: &Package, repository_root: &Path) -> Option<PathBuf> {
    if let Some(path) = package.source_path.as_deref().filter(|p| p.is_file()) {
        return Some(path.to_path_buf());
    }
    package
        .published_path
        .as_deref()
        .map(|published| repository_root.join(published))
        .filter(|p| p.is_file())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn temp_file_for(path: &Path) -> Result<NamedTempFile> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;
    NamedTempFile::new_in(parent).map_err(|e| Error::file_op(parent, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use tempfile::TempDir;

    fn package_from(path: &Path) -> Package {
        let mut pkg = Package::new("foo", "1.0");
        pkg.apply_checksum(&Checksum::from_path(path).unwrap());
        pkg.source_path = Some(path.to_path_buf());
        pkg
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dists/stable/Release");

        write_file(&path, b"Origin: test\n").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"Origin: test\n");

        write_file(&path, b"replaced").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"replaced");
    }

    #[test]
    fn test_copy_then_up_to_date() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in/foo.deb");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"package contents").unwrap();

        let pkg = package_from(&source);
        let root = dir.path().join("out");
        let dest = root.join("pool/main/f/foo/foo.deb");

        assert_eq!(reconcile_package_file(&pkg, &dest, &root).unwrap(), CopyOutcome::Copied);
        assert_eq!(fs::read(&dest).unwrap(), b"package contents");
        assert_eq!(reconcile_package_file(&pkg, &dest, &root).unwrap(), CopyOutcome::UpToDate);
    }

    #[test]
    fn test_same_size_different_content_is_recopied() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("foo.apk");
        fs::write(&source, b"aaaa").unwrap();
        let dest = dir.path().join("out/foo.apk");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"bbbb").unwrap();

        let pkg = package_from(&source);
        let outcome = reconcile_package_file(&pkg, &dest, dir.path()).unwrap();
        assert_eq!(outcome, CopyOutcome::Copied);
        assert_eq!(fs::read(&dest).unwrap(), b"aaaa");
    }

    #[test]
    fn test_existing_package_uses_published_copy() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("x86_64")).unwrap();
        fs::write(root.join("x86_64/old-1.0.apk"), b"old").unwrap();

        let mut pkg = Package::new("old", "1.0");
        pkg.published_path = Some("old-1.0.apk".to_string());

        let arch_root = root.join("x86_64");
        let dest = arch_root.join("old-1.0.apk");
        assert_eq!(
            reconcile_package_file(&pkg, &dest, &arch_root).unwrap(),
            CopyOutcome::UpToDate
        );
    }

    #[test]
    fn test_missing_source_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let mut pkg = Package::new("gone", "1.0");
        pkg.published_path = Some("gone-1.0.apk".to_string());

        let outcome =
            reconcile_package_file(&pkg, &dir.path().join("gone-1.0.apk"), dir.path()).unwrap();
        assert_eq!(outcome, CopyOutcome::SourceMissing);
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Release.gpg");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, b"sig").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
