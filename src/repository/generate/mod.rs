// src/repository/generate/mod.rs

//! Repository generators
//!
//! One generator per ecosystem lays out package files and writes the index,
//! signature and client configuration files under the output directory.

pub mod alpine;
pub mod arch;
pub mod debian;
pub mod fedora;
pub mod homebrew;

use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::filesystem::{reconcile_package_file, CopyOutcome};
use crate::packages::{Package, PackageType};
use crate::repository::CancellationToken;
use crate::signing::SigningMode;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Everything a generator reads while it runs
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub config: &'a RepositoryConfig,
    pub signing: SigningMode<'a>,
    pub cancel: &'a CancellationToken,
}

/// What one generator did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub package_type: PackageType,
    pub packages: usize,
    pub copied: usize,
    pub up_to_date: usize,
    pub missing: usize,
    pub signed: bool,
}

impl GenerationSummary {
    pub fn new(package_type: PackageType, signing: &SigningMode<'_>) -> Self {
        Self {
            package_type,
            packages: 0,
            copied: 0,
            up_to_date: 0,
            missing: 0,
            signed: signing.is_signed(),
        }
    }

    fn record(&mut self, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Copied => self.copied += 1,
            CopyOutcome::UpToDate => self.up_to_date += 1,
            CopyOutcome::SourceMissing => self.missing += 1,
        }
    }
}

/// Builds one ecosystem's repository tree
pub trait RepositoryGenerator: Send + Sync {
    fn package_type(&self) -> PackageType;

    /// Check configuration before any file is touched
    fn validate(&self, _config: &RepositoryConfig) -> Result<()> {
        Ok(())
    }

    /// Lay out `packages` (existing and new) and write every index file
    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        packages: Vec<Package>,
    ) -> Result<GenerationSummary>;
}

/// Generator for an ecosystem
pub fn generator_for(package_type: PackageType) -> Box<dyn RepositoryGenerator> {
    match package_type {
        PackageType::Deb => Box::new(debian::DebianGenerator),
        PackageType::Rpm => Box::new(fedora::FedoraGenerator),
        PackageType::Apk => Box::new(alpine::AlpineGenerator),
        PackageType::Pacman => Box::new(arch::ArchGenerator),
        PackageType::HomebrewBottle => Box::new(homebrew::HomebrewGenerator),
    }
}

/// Copy one package into place, honoring cancellation
fn place_package(
    ctx: &GenerationContext<'_>,
    summary: &mut GenerationSummary,
    package: &Package,
    destination: &Path,
    repository_root: &Path,
) -> Result<CopyOutcome> {
    ctx.cancel.check()?;
    let outcome = reconcile_package_file(package, destination, repository_root)?;
    summary.record(outcome);
    Ok(outcome)
}

/// Group packages by architecture, dropping those outside the configured filter
fn group_by_arch(
    packages: Vec<Package>,
    default_arch: &str,
    config: &RepositoryConfig,
) -> BTreeMap<String, Vec<Package>> {
    let mut groups: BTreeMap<String, Vec<Package>> = BTreeMap::new();
    for pkg in packages {
        let arch = pkg
            .architecture
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| default_arch.to_string());
        if !config.architecture_allowed(&arch) {
            debug!(
                "Skipping {} {} for filtered architecture {}",
                pkg.name, pkg.version, arch
            );
            continue;
        }
        groups.entry(arch).or_default().push(pkg);
    }
    groups
}

/// File name a package is published under
fn published_file_name(package: &Package) -> Result<String> {
    package.file_name().ok_or_else(|| {
        Error::MetadataError(format!(
            "{} {} has neither a source file nor a published path",
            package.name, package.version
        ))
    })
}
