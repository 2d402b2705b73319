// src/packages/traits.rs

//! Common trait for package format codecs

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::packages::{Package, PackageType};
use std::path::Path;

/// Reader and writer for one package ecosystem
///
/// A codec knows how to read a single package file into a [`Package`], how to
/// serialize a set of packages into the ecosystem's primary index, and how to
/// read a previously published repository back for incremental updates.
pub trait PackageCodec: Send + Sync {
    /// Ecosystem this codec handles
    fn package_type(&self) -> PackageType;

    /// Parse a package file, computing its checksums
    fn parse_package(&self, path: &Path) -> Result<Package>;

    /// Serialize packages into the ecosystem's primary index
    ///
    /// Debian: `Packages` text. RPM: uncompressed `primary.xml`. Alpine:
    /// `APKINDEX.tar.gz`. Pacman: zstd database tar. Homebrew: the formula
    /// for one bottle name.
    fn write_index(&self, packages: &[Package]) -> Result<Vec<u8>>;

    /// Read the index already published under `repository_root`
    ///
    /// Returns `Ok(None)` when no index exists. Records come back with
    /// `published_path` set and `source_path` unset.
    fn parse_existing_index(
        &self,
        repository_root: &Path,
        config: &RepositoryConfig,
    ) -> Result<Option<Vec<Package>>>;
}
