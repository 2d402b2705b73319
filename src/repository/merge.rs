// src/repository/merge.rs

//! Incremental merge of an existing index with newly scanned packages

use crate::error::{Error, Result};
use crate::packages::{Package, PackageIdentity, PackageType};
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// Combine previously published packages with incoming ones
///
/// Any incoming package whose identity is already published is a conflict;
/// every such identity is listed in the error. Order is `existing` followed
/// by `incoming`.
pub fn merge(
    existing: Vec<Package>,
    incoming: Vec<Package>,
    package_type: PackageType,
) -> Result<Vec<Package>> {
    let published: HashSet<PackageIdentity> = existing
        .iter()
        .map(|p| p.identity(package_type))
        .collect();

    let conflicts: BTreeSet<String> = incoming
        .iter()
        .map(|p| p.identity(package_type))
        .filter(|id| published.contains(id))
        .map(|id| id.to_string())
        .collect();

    if !conflicts.is_empty() {
        return Err(Error::ConflictError(format!(
            "{} package(s) already published in the {} repository: {}",
            conflicts.len(),
            package_type,
            conflicts.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    info!(
        "Merging {} existing and {} new {} package(s)",
        existing.len(),
        incoming.len(),
        package_type
    );

    let mut merged = existing;
    merged.extend(incoming);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str, arch: &str) -> Package {
        let mut p = Package::new(name, version);
        p.architecture = Some(arch.to_string());
        p
    }

    #[test]
    fn test_merge_with_nothing_new_is_identity() {
        let existing = vec![pkg("a", "1.0", "x86_64"), pkg("b", "2.0", "x86_64")];
        let merged = merge(existing.clone(), Vec::new(), PackageType::Pacman).unwrap();
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_merge_appends_new_packages() {
        let merged = merge(
            vec![pkg("a", "1.0", "x86_64")],
            vec![pkg("a", "1.1", "x86_64"), pkg("a", "1.0", "aarch64")],
            PackageType::Pacman,
        )
        .unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].version, "1.0");
        assert_eq!(merged[1].version, "1.1");
    }

    #[test]
    fn test_conflict_names_every_identity() {
        let existing = vec![pkg("pkgA", "1.0-1", "x86_64"), pkg("pkgB", "2.0-1", "x86_64")];
        let err = merge(existing.clone(), existing, PackageType::Pacman).unwrap_err();

        let message = err.to_string();
        assert!(matches!(err, Error::ConflictError(_)));
        assert!(message.contains("pkgA-1.0-1-x86_64"));
        assert!(message.contains("pkgB-2.0-1-x86_64"));
    }

    #[test]
    fn test_homebrew_identity_ignores_platform() {
        let mut existing = pkg("wget", "1.21", "arm64_sonoma");
        existing.architecture = None;
        let incoming = pkg("wget", "1.21", "x86_64_linux");
        assert!(merge(vec![existing], vec![incoming], PackageType::HomebrewBottle).is_err());
    }
}
