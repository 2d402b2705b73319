// src/repository/generate/debian.rs

//! APT repository generator
//!
//! Layout:
//! - `pool/<component>/<letter>/<name>/<file>`
//! - `dists/<codename>/<component>/binary-<arch>/Packages{,.gz}`
//! - `dists/<codename>/{Release,InRelease,Release.gpg}`
//!
//! `Release` is only computed once every `Packages` file is on disk.

use super::{
    place_package, published_file_name, GenerationContext, GenerationSummary, RepositoryGenerator,
};
use crate::checksum::Checksum;
use crate::compression::{compress, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::filesystem::{remove_if_exists, write_file};
use crate::packages::{Package, PackageType};
use crate::repository::index::debian::{binary_dir, write_packages_file, write_release, ReleaseEntry};
use crate::signing::SigningMode;
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info};

const DEFAULT_ARCH: &str = "amd64";
const ARCH_ALL: &str = "all";

pub struct DebianGenerator;

impl RepositoryGenerator for DebianGenerator {
    fn package_type(&self) -> PackageType {
        PackageType::Deb
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        packages: Vec<Package>,
    ) -> Result<GenerationSummary> {
        let config = ctx.config;
        let root = config.output_dir.as_path();
        let mut summary = GenerationSummary::new(PackageType::Deb, &ctx.signing);

        let architectures = release_architectures(config, &packages);
        info!(
            "Generating APT repository '{}' for {}",
            config.codename,
            architectures.join(", ")
        );

        let mut laid_out: Vec<(String, Package)> = Vec::with_capacity(packages.len());
        for mut pkg in packages {
            let arch = package_arch(&pkg).to_string();
            if arch != ARCH_ALL && !architectures.contains(&arch) {
                debug!("Skipping {} {} for architecture {}", pkg.name, pkg.version, arch);
                continue;
            }

            let component = component_for(&pkg, config);
            if pkg.source_path.is_some() || pkg.published_path.is_none() {
                let file = published_file_name(&pkg)?;
                pkg.published_path = Some(pool_path(&component, &pkg.name, &file));
            }
            if let Some(published) = pkg.published_path.as_deref() {
                place_package(ctx, &mut summary, &pkg, &root.join(published), root)?;
            }

            laid_out.push((component, pkg));
        }
        summary.packages = laid_out.len();

        let mut entries = Vec::new();
        for component in &config.components {
            for arch in &architectures {
                let selected: Vec<Package> = laid_out
                    .iter()
                    .filter(|(c, _)| c == component)
                    .map(|(_, p)| p)
                    .filter(|p| {
                        let a = package_arch(p);
                        a == arch.as_str() || a == ARCH_ALL
                    })
                    .cloned()
                    .collect();

                let packages_text = write_packages_file(&selected)?;
                let gz = compress(packages_text.as_bytes(), CompressionFormat::Gzip)?;

                let dir = binary_dir(root, &config.codename, component, arch);
                write_file(&dir.join("Packages"), packages_text.as_bytes())?;
                write_file(&dir.join("Packages.gz"), &gz)?;

                let prefix = format!("{}/binary-{}", component, arch);
                entries.push(ReleaseEntry {
                    path: format!("{}/Packages", prefix),
                    checksum: Checksum::from_bytes(packages_text.as_bytes()),
                });
                entries.push(ReleaseEntry {
                    path: format!("{}/Packages.gz", prefix),
                    checksum: Checksum::from_bytes(&gz),
                });

                debug!("{} {}: {} packages", component, arch, selected.len());
            }
        }

        let release = write_release(config, &architectures, &entries, Utc::now());
        let dists = root.join("dists").join(&config.codename);
        write_file(&dists.join("Release"), release.as_bytes())?;

        match ctx.signing {
            SigningMode::Gpg(signer) => {
                let in_release = signer.sign_cleartext(release.as_bytes())?;
                let detached = signer.sign_detached(release.as_bytes())?;
                write_file(&dists.join("InRelease"), &in_release)?;
                write_file(&dists.join("Release.gpg"), &detached)?;
                info!("Signed Release for {}", config.codename);
            }
            SigningMode::Unsigned | SigningMode::Rsa(_) => {
                write_file(&dists.join("InRelease"), release.as_bytes())?;
                remove_if_exists(&dists.join("Release.gpg"))?;
            }
        }

        info!("APT repository generated ({} packages)", summary.packages);
        Ok(summary)
    }
}

/// Architectures listed in `Release` and given a `binary-<arch>` index
fn release_architectures(config: &RepositoryConfig, packages: &[Package]) -> Vec<String> {
    if !config.architectures.is_empty() {
        return config.architectures.clone();
    }

    let found: BTreeSet<String> = packages
        .iter()
        .map(package_arch)
        .filter(|a| *a != ARCH_ALL)
        .map(str::to_string)
        .collect();
    if found.is_empty() {
        vec![DEFAULT_ARCH.to_string()]
    } else {
        found.into_iter().collect()
    }
}

fn package_arch(pkg: &Package) -> &str {
    pkg.architecture
        .as_deref()
        .filter(|a| !a.is_empty())
        .unwrap_or(ARCH_ALL)
}

/// Component from an existing `pool/<component>/` path, else the first configured one
fn component_for(pkg: &Package, config: &RepositoryConfig) -> String {
    pkg.published_path
        .as_deref()
        .and_then(|p| p.strip_prefix("pool/"))
        .and_then(|p| p.split('/').next())
        .filter(|c| config.components.iter().any(|known| known == *c))
        .map(str::to_string)
        .unwrap_or_else(|| config.components[0].clone())
}

/// `pool/<component>/<letter>/<name>/<file>`
pub fn pool_path(component: &str, name: &str, file: &str) -> String {
    format!("pool/{}/{}/{}/{}", component, pool_letter(name), name, file)
}

/// First letter of the name when it is a-z, else `0`
fn pool_letter(name: &str) -> char {
    match name.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some(c @ 'a'..='z') => c,
        _ => '0',
    }
}
