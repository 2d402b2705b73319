// src/repository/generate/arch.rs

//! Pacman repository generator
//!
//! Each architecture directory gets `<repo>.db.tar.zst` plus a `<repo>.db`
//! copy, which is the name pacman actually downloads.

use super::{
    group_by_arch, place_package, published_file_name, GenerationContext, GenerationSummary,
    RepositoryGenerator,
};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::filesystem::{remove_if_exists, write_file, CopyOutcome};
use crate::packages::{Package, PackageType};
use crate::repository::index::arch::write_database;
use crate::signing::SigningMode;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_ARCH: &str = "x86_64";

pub struct ArchGenerator;

/// `<repo>.db.tar.zst` and `<repo>.db`
pub fn database_paths(arch_dir: &Path, repo_name: &str) -> [PathBuf; 2] {
    [
        arch_dir.join(format!("{}.db.tar.zst", repo_name)),
        arch_dir.join(format!("{}.db", repo_name)),
    ]
}

fn signature_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".sig");
    PathBuf::from(name)
}

impl RepositoryGenerator for ArchGenerator {
    fn package_type(&self) -> PackageType {
        PackageType::Pacman
    }

    fn validate(&self, config: &RepositoryConfig) -> Result<()> {
        if config.repo_name.is_none() {
            return Err(Error::InvalidConfig(
                "pacman repositories need a database name (--repo-name)".to_string(),
            ));
        }
        Ok(())
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        packages: Vec<Package>,
    ) -> Result<GenerationSummary> {
        let config = ctx.config;
        self.validate(config)?;
        let repo_name = config.repo_name.as_deref().unwrap_or_default();
        let mut summary = GenerationSummary::new(PackageType::Pacman, &ctx.signing);

        for (arch, mut group) in group_by_arch(packages, DEFAULT_ARCH, config) {
            info!("Generating pacman database '{}' for {} ({} packages)", repo_name, arch, group.len());
            let arch_dir = config.output_dir.join(&arch);

            let mut local_files = Vec::new();
            for pkg in &mut group {
                if pkg.source_path.is_some() || pkg.published_path.is_none() {
                    pkg.published_path = Some(published_file_name(pkg)?);
                }
                let Some(published) = pkg.published_path.clone() else {
                    continue;
                };
                let destination = arch_dir.join(&published);
                if place_package(ctx, &mut summary, pkg, &destination, &arch_dir)?
                    != CopyOutcome::SourceMissing
                {
                    local_files.push(destination);
                }
            }
            summary.packages += group.len();

            let database = write_database(&group)?;
            let db_paths = database_paths(&arch_dir, repo_name);
            for path in &db_paths {
                write_file(path, &database)?;
            }

            match ctx.signing {
                SigningMode::Gpg(signer) => {
                    let signature = signer.sign_detached_binary(&database)?;
                    for path in &db_paths {
                        write_file(&signature_path(path), &signature)?;
                    }
                    for file in &local_files {
                        ctx.cancel.check()?;
                        let signature = signer.sign_detached_binary_file(file)?;
                        write_file(&signature_path(file), &signature)?;
                    }
                    debug!("Signed {} package files for {}", local_files.len(), arch);
                }
                SigningMode::Unsigned | SigningMode::Rsa(_) => {
                    for path in db_paths.iter().chain(local_files.iter()) {
                        remove_if_exists(&signature_path(path))?;
                    }
                }
            }
        }

        info!("Pacman repository generated ({} packages)", summary.packages);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::config::ConfigOptions;
    use crate::repository::index::arch::read_existing_packages;
    use crate::repository::CancellationToken;
    use std::fs;
    use tempfile::TempDir;

    fn config(dir: &Path, repo_name: Option<&str>) -> RepositoryConfig {
        ConfigOptions {
            input_dir: Some(dir.to_path_buf()),
            output_dir: Some(dir.join("out")),
            repo_name: repo_name.map(str::to_string),
            ..ConfigOptions::default()
        }
        .resolve()
        .unwrap()
    }

    fn input_package(dir: &Path, name: &str, arch: &str) -> Package {
        let path = dir.join(format!("{}-1.0-1-{}.pkg.tar.zst", name, arch));
        fs::write(&path, format!("pkg {}", name)).unwrap();

        let mut pkg = Package::new(name, "1.0-1");
        pkg.architecture = Some(arch.to_string());
        pkg.description = Some("test".to_string());
        pkg.apply_checksum(&Checksum::from_path(&path).unwrap());
        pkg.source_path = Some(path);
        pkg
    }

    #[test]
    fn test_repo_name_required() {
        let dir = TempDir::new().unwrap();
        let result = ArchGenerator.validate(&config(dir.path(), None));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert!(ArchGenerator.validate(&config(dir.path(), Some("custom"))).is_ok());
    }

    #[test]
    fn test_database_written_twice() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), Some("custom"));
        let cancel = CancellationToken::new();
        let ctx = GenerationContext {
            config: &cfg,
            signing: SigningMode::Unsigned,
            cancel: &cancel,
        };

        let summary = ArchGenerator
            .generate(
                &ctx,
                vec![input_package(dir.path(), "pkgA", "x86_64"), input_package(dir.path(), "pkgB", "any")],
            )
            .unwrap();
        assert_eq!(summary.packages, 2);

        let out = dir.path().join("out");
        let zst = fs::read(out.join("x86_64/custom.db.tar.zst")).unwrap();
        let db = fs::read(out.join("x86_64/custom.db")).unwrap();
        assert_eq!(zst, db);
        assert!(out.join("x86_64/pkgA-1.0-1-x86_64.pkg.tar.zst").is_file());
        assert!(out.join("any/custom.db").is_file());
        assert!(!out.join("x86_64/custom.db.sig").exists());

        let read_back = read_existing_packages(&out, &cfg).unwrap().unwrap();
        let names: Vec<_> = read_back.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"pkgA"));
        assert!(names.contains(&"pkgB"));
    }

    #[test]
    fn test_unsigned_run_removes_stale_signatures() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), Some("custom"));
        let cancel = CancellationToken::new();
        let ctx = GenerationContext {
            config: &cfg,
            signing: SigningMode::Unsigned,
            cancel: &cancel,
        };

        // Leftovers from an earlier signed run
        let arch_dir = dir.path().join("out/x86_64");
        fs::create_dir_all(&arch_dir).unwrap();
        let stale = [
            arch_dir.join("custom.db.sig"),
            arch_dir.join("custom.db.tar.zst.sig"),
            arch_dir.join("pkgA-1.0-1-x86_64.pkg.tar.zst.sig"),
        ];
        for path in &stale {
            fs::write(path, b"old signature").unwrap();
        }

        ArchGenerator
            .generate(&ctx, vec![input_package(dir.path(), "pkgA", "x86_64")])
            .unwrap();

        for path in &stale {
            assert!(!path.exists(), "{} should be gone", path.display());
        }
        assert!(arch_dir.join("pkgA-1.0-1-x86_64.pkg.tar.zst").is_file());
    }

    #[test]
    fn test_signature_path() {
        assert_eq!(
            signature_path(Path::new("/r/x86_64/custom.db")),
            PathBuf::from("/r/x86_64/custom.db.sig")
        );
    }
}
