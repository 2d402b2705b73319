// src/repository/generate/fedora.rs

//! yum/dnf repository generator
//!
//! Packages land in `<version>/<arch>/Packages/`, with repodata next to
//! them. Clients point `baseurl` at `<base_url>/$releasever/$basearch`, so
//! the version directory is the distribution release, not the package
//! version.

use super::{
    place_package, published_file_name, GenerationContext, GenerationSummary, RepositoryGenerator,
};
use crate::config::{DistroVariant, RepositoryConfig};
use crate::error::{Error, Result};
use crate::filesystem::{remove_if_exists, write_file};
use crate::packages::{Package, PackageType};
use crate::repository::index::fedora::{write_primary_xml, write_repomd, PrimaryFile};
use crate::signing::SigningMode;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const DEFAULT_ARCH: &str = "x86_64";
const PACKAGES_DIR: &str = "Packages";

pub struct FedoraGenerator;

impl RepositoryGenerator for FedoraGenerator {
    fn package_type(&self) -> PackageType {
        PackageType::Rpm
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        packages: Vec<Package>,
    ) -> Result<GenerationSummary> {
        let config = ctx.config;
        let mut summary = GenerationSummary::new(PackageType::Rpm, &ctx.signing);

        let mut groups: BTreeMap<(String, String), Vec<Package>> = BTreeMap::new();
        for pkg in packages {
            let arch = pkg
                .architecture
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| DEFAULT_ARCH.to_string());
            if !config.architecture_allowed(&arch) {
                debug!("Skipping {} {} for architecture {}", pkg.name, pkg.version, arch);
                continue;
            }
            let version = version_dir(&pkg, config);
            groups.entry((version, arch)).or_default().push(pkg);
        }

        for ((version, arch), group) in groups {
            summary.packages += group.len();
            self.generate_version_arch(ctx, &mut summary, &version, &arch, group)?;
        }

        if let Some(base_url) = config.base_url.as_deref() {
            let signed = ctx.signing.is_signed();
            if signed && config.gpg_key_url.is_none() {
                warn!("Signed RPM repository without --gpg-key-url; the .repo file has no gpgkey line");
            }
            let repo_file = write_repo_file(config, base_url, signed);
            let path = config.output_dir.join(format!("{}.repo", config.distro));
            write_file(&path, repo_file.as_bytes())?;
            info!("Repository configuration written to {}", path.display());
        }

        info!("RPM repository generated ({} packages)", summary.packages);
        Ok(summary)
    }
}

impl FedoraGenerator {
    fn generate_version_arch(
        &self,
        ctx: &GenerationContext<'_>,
        summary: &mut GenerationSummary,
        version: &str,
        arch: &str,
        mut packages: Vec<Package>,
    ) -> Result<()> {
        info!("Generating {}/{} ({} packages)", version, arch, packages.len());
        let repo_dir = ctx.config.output_dir.join(version).join(arch);

        for pkg in &mut packages {
            if pkg.source_path.is_some() || pkg.published_path.is_none() {
                let file = published_file_name(pkg)?;
                pkg.published_path = Some(format!("{}/{}", PACKAGES_DIR, file));
            }
            if let Some(published) = pkg.published_path.as_deref() {
                place_package(ctx, summary, pkg, &repo_dir.join(published), &repo_dir)?;
            }
        }

        let primary = PrimaryFile::new(&write_primary_xml(&packages)?)?;
        let timestamp = Utc::now().timestamp();
        let repomd = write_repomd(&primary, timestamp)?;

        let repodata = repo_dir.join("repodata");
        let primary_name = primary
            .href()
            .rsplit('/')
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::MetadataError("empty primary location".to_string()))?;
        write_file(&repodata.join(&primary_name), &primary.compressed)?;
        write_file(&repodata.join("repomd.xml"), &repomd)?;
        prune_stale_primary(&repodata, &primary_name)?;

        let signature_path = repodata.join("repomd.xml.asc");
        match ctx.signing {
            SigningMode::Gpg(signer) => {
                write_file(&signature_path, &signer.sign_detached(&repomd)?)?;
            }
            SigningMode::Unsigned | SigningMode::Rsa(_) => {
                remove_if_exists(&signature_path)?;
            }
        }

        Ok(())
    }
}

/// Release directory for a package
///
/// A package re-read from an existing tree stays where it was published.
/// New packages use the configured version, then the version found in the
/// package's distribution tags, then the distribution default.
fn version_dir(pkg: &Package, config: &RepositoryConfig) -> String {
    let tagged = pkg.extras.get("DistroVersion").filter(|v| !v.is_empty());
    if pkg.source_path.is_none() {
        if let Some(version) = tagged {
            return version.clone();
        }
    }
    config
        .version
        .clone()
        .or_else(|| tagged.cloned())
        .unwrap_or_else(|| config.distro.default_version().to_string())
}

/// Remove primary metadata left over from earlier runs
fn prune_stale_primary(repodata: &Path, keep: &str) -> Result<()> {
    for entry in fs::read_dir(repodata).map_err(|e| Error::file_op(repodata, e))? {
        let entry = entry.map_err(|e| Error::file_op(repodata, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with("-primary.xml.gz") && name != keep {
            remove_if_exists(&entry.path())?;
        }
    }
    Ok(())
}

/// `.repo` file for `/etc/yum.repos.d`
fn write_repo_file(config: &RepositoryConfig, base_url: &str, signed: bool) -> String {
    let mut lines = vec![
        format!("[{}]", config.repo_id()),
        format!("name={}", config.label),
        format!("baseurl={}/$releasever/$basearch", base_url.trim_end_matches('/')),
        "enabled=1".to_string(),
        format!("gpgcheck={}", if signed { 1 } else { 0 }),
    ];

    if signed {
        if config.distro == DistroVariant::Fedora {
            lines.push("repo_gpgcheck=1".to_string());
        }
        if let Some(url) = config.gpg_key_url.as_deref() {
            lines.push(format!("gpgkey={}", url));
        }
    }
    if matches!(config.distro, DistroVariant::Centos | DistroVariant::Rhel) {
        lines.push("metadata_expire=86400".to_string());
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::config::ConfigOptions;
    use crate::repository::index::fedora::read_existing_packages;
    use crate::repository::CancellationToken;
    use tempfile::TempDir;

    fn config(dir: &Path, edit: impl FnOnce(&mut ConfigOptions)) -> RepositoryConfig {
        let mut opts = ConfigOptions {
            input_dir: Some(dir.to_path_buf()),
            output_dir: Some(dir.join("out")),
            ..ConfigOptions::default()
        };
        edit(&mut opts);
        opts.resolve().unwrap()
    }

    fn input_package(dir: &Path, name: &str, distro_version: Option<&str>) -> Package {
        let path = dir.join(format!("{}-1.0-1.x86_64.rpm", name));
        fs::write(&path, format!("rpm {}", name)).unwrap();

        let mut pkg = Package::new(name, "1.0");
        pkg.architecture = Some("x86_64".to_string());
        pkg.description = Some(format!("{} summary", name));
        pkg.extras.insert("Release".to_string(), "1".to_string());
        if let Some(v) = distro_version {
            pkg.extras.insert("DistroVersion".to_string(), v.to_string());
        }
        pkg.apply_checksum(&Checksum::from_path(&path).unwrap());
        pkg.source_path = Some(path);
        pkg
    }

    fn generate(config: &RepositoryConfig, packages: Vec<Package>) -> GenerationSummary {
        let cancel = CancellationToken::new();
        let ctx = GenerationContext {
            config,
            signing: SigningMode::Unsigned,
            cancel: &cancel,
        };
        FedoraGenerator.generate(&ctx, packages).unwrap()
    }

    #[test]
    fn test_version_dir_priority() {
        let dir = TempDir::new().unwrap();
        let plain = config(dir.path(), |_| {});
        let pinned = config(dir.path(), |o| o.version = Some("39".to_string()));
        let centos = config(dir.path(), |o| o.distro = Some(DistroVariant::Centos));

        let tagged = input_package(dir.path(), "a", Some("41"));
        let untagged = input_package(dir.path(), "b", None);
        assert_eq!(version_dir(&tagged, &plain), "41");
        assert_eq!(version_dir(&tagged, &pinned), "39");
        assert_eq!(version_dir(&untagged, &plain), "40");
        assert_eq!(version_dir(&untagged, &centos), "9");

        let mut existing = Package::new("c", "1.0");
        existing.published_path = Some("Packages/c-1.0-1.x86_64.rpm".to_string());
        existing.extras.insert("DistroVersion".to_string(), "38".to_string());
        assert_eq!(version_dir(&existing, &pinned), "38");
    }

    #[test]
    fn test_distro_version_picks_directory() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), |_| {});
        let summary = generate(&cfg, vec![input_package(dir.path(), "hello", Some("40"))]);
        assert_eq!(summary.packages, 1);

        let repo = dir.path().join("out/40/x86_64");
        assert!(repo.join("Packages/hello-1.0-1.x86_64.rpm").is_file());
        assert!(repo.join("repodata/repomd.xml").is_file());
        assert!(!repo.join("repodata/repomd.xml.asc").exists());

        let read_back = read_existing_packages(&dir.path().join("out")).unwrap().unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].name, "hello");
        assert_eq!(read_back[0].published_path.as_deref(), Some("Packages/hello-1.0-1.x86_64.rpm"));
    }

    #[test]
    fn test_regeneration_prunes_old_primary() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), |_| {});
        generate(&cfg, vec![input_package(dir.path(), "one", None)]);
        generate(
            &cfg,
            vec![input_package(dir.path(), "one", None), input_package(dir.path(), "two", None)],
        );

        let repodata = dir.path().join("out/40/x86_64/repodata");
        let primaries = fs::read_dir(&repodata)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with("-primary.xml.gz"))
            .count();
        assert_eq!(primaries, 1);
    }

    #[test]
    fn test_repo_file_contents() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), |o| {
            o.origin = Some("Acme Repo".to_string());
            o.base_url = Some("https://repo.example.com/rpm/".to_string());
            o.gpg_key_url = Some("https://repo.example.com/key.asc".to_string());
        });

        let unsigned = write_repo_file(&cfg, "https://repo.example.com/rpm", false);
        assert_eq!(
            unsigned,
            "[acme-repo]\nname=Acme Repo\nbaseurl=https://repo.example.com/rpm/$releasever/$basearch\nenabled=1\ngpgcheck=0\n"
        );

        let signed = write_repo_file(&cfg, "https://repo.example.com/rpm", true);
        assert!(signed.contains("gpgcheck=1\nrepo_gpgcheck=1\ngpgkey=https://repo.example.com/key.asc\n"));

        let rhel = config(dir.path(), |o| {
            o.distro = Some(DistroVariant::Rhel);
            o.base_url = Some("https://repo.example.com".to_string());
        });
        let rhel_file = write_repo_file(&rhel, "https://repo.example.com", true);
        assert!(!rhel_file.contains("repo_gpgcheck"));
        assert!(!rhel_file.contains("gpgkey="));
        assert!(rhel_file.ends_with("metadata_expire=86400\n"));
    }

    #[test]
    fn test_repo_file_written_with_base_url() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), |o| o.base_url = Some("https://r.example.com".to_string()));
        generate(&cfg, vec![input_package(dir.path(), "hello", None)]);
        assert!(dir.path().join("out/fedora.repo").is_file());
    }
}
