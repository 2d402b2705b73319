// src/repository/generate/alpine.rs

//! Alpine (apk) repository generator

use super::{group_by_arch, place_package, GenerationContext, GenerationSummary, RepositoryGenerator};
use crate::checksum::Checksum;
use crate::error::Result;
use crate::filesystem::{remove_if_exists, write_file, CopyOutcome};
use crate::packages::{Package, PackageType};
use crate::repository::index::alpine::{write_apkindex_archive, INDEX_FILE};
use crate::signing::SigningMode;
use tracing::{debug, info};

const DEFAULT_ARCH: &str = "x86_64";

pub struct AlpineGenerator;

/// Sidecar holding the RSA signature of `APKINDEX.tar.gz`
pub fn signature_file_name(key_name: &str) -> String {
    format!("{}.SIGN.RSA.{}.pub", INDEX_FILE, key_name)
}

impl RepositoryGenerator for AlpineGenerator {
    fn package_type(&self) -> PackageType {
        PackageType::Apk
    }

    fn generate(
        &self,
        ctx: &GenerationContext<'_>,
        packages: Vec<Package>,
    ) -> Result<GenerationSummary> {
        let config = ctx.config;
        let mut summary = GenerationSummary::new(PackageType::Apk, &ctx.signing);

        for (arch, mut group) in group_by_arch(packages, DEFAULT_ARCH, config) {
            info!("Generating Alpine index for {} ({} packages)", arch, group.len());
            let arch_dir = config.output_dir.join(&arch);

            for pkg in &mut group {
                // apk fetches <name>-<version>.apk regardless of the input file name
                let file = format!("{}-{}.apk", pkg.name, pkg.version);
                let destination = arch_dir.join(&file);
                if pkg.published_path.is_none() {
                    pkg.published_path = Some(file);
                }

                let outcome = place_package(ctx, &mut summary, pkg, &destination, &arch_dir)?;
                if outcome != CopyOutcome::SourceMissing {
                    pkg.apply_checksum(&Checksum::from_path(&destination)?);
                }
                if pkg.architecture.is_none() {
                    pkg.architecture = Some(arch.clone());
                }
            }
            summary.packages += group.len();

            let index = write_apkindex_archive(&group, &arch)?;
            write_file(&arch_dir.join(INDEX_FILE), &index)?;

            let signature_path = arch_dir.join(signature_file_name(&config.rsa_key_name));
            match ctx.signing {
                SigningMode::Rsa(signer) => {
                    write_file(&signature_path, &signer.sign_rsa(&index)?)?;
                    debug!("Signed {} with key {}", INDEX_FILE, config.rsa_key_name);
                }
                SigningMode::Unsigned | SigningMode::Gpg(_) => {
                    remove_if_exists(&signature_path)?;
                }
            }
        }

        info!("Alpine repository generated ({} packages)", summary.packages);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOptions, RepositoryConfig};
    use crate::repository::index::alpine::read_existing_packages;
    use crate::repository::CancellationToken;
    use crate::signing::RsaSigner;
    use pkcs8::{EncodePrivateKey, LineEnding};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(dir: &Path) -> RepositoryConfig {
        ConfigOptions {
            input_dir: Some(dir.to_path_buf()),
            output_dir: Some(dir.join("out")),
            rsa_key_name: Some("builder@example.com".to_string()),
            ..ConfigOptions::default()
        }
        .resolve()
        .unwrap()
    }

    fn input_package(dir: &Path, name: &str, arch: Option<&str>) -> Package {
        let path = dir.join(format!("{}-input.apk", name));
        fs::write(&path, format!("apk {}", name)).unwrap();

        let mut pkg = Package::new(name, "1.0-r0");
        pkg.architecture = arch.map(str::to_string);
        pkg.description = Some(format!("{} tool", name));
        pkg.source_path = Some(path);
        pkg
    }

    #[test]
    fn test_layout_and_recomputed_checksums() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let cancel = CancellationToken::new();
        let ctx = GenerationContext {
            config: &cfg,
            signing: SigningMode::Unsigned,
            cancel: &cancel,
        };

        let packages = vec![
            input_package(dir.path(), "curl", Some("aarch64")),
            input_package(dir.path(), "jq", None),
        ];
        let summary = AlpineGenerator.generate(&ctx, packages).unwrap();
        assert_eq!(summary.packages, 2);
        assert_eq!(summary.copied, 2);

        let out = dir.path().join("out");
        assert!(out.join("aarch64/curl-1.0-r0.apk").is_file());
        assert!(out.join("x86_64/jq-1.0-r0.apk").is_file());
        assert!(out.join("x86_64/APKINDEX.tar.gz").is_file());
        assert!(!out.join("x86_64").join(signature_file_name("builder@example.com")).exists());

        let read_back = read_existing_packages(&out, &cfg).unwrap().unwrap();
        let jq = read_back.iter().find(|p| p.name == "jq").unwrap();
        let expected = Checksum::from_path(&out.join("x86_64/jq-1.0-r0.apk")).unwrap();
        assert_eq!(jq.sha1.as_deref(), Some(expected.sha1.as_str()));
        assert_eq!(jq.size, expected.size);
        assert_eq!(jq.architecture.as_deref(), Some("x86_64"));
    }

    #[test]
    fn test_signed_index_sidecar() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let signer =
            RsaSigner::from_pem(&key.to_pkcs8_pem(LineEnding::LF).unwrap(), None).unwrap();
        let cancel = CancellationToken::new();
        let ctx = GenerationContext {
            config: &cfg,
            signing: SigningMode::Rsa(&signer),
            cancel: &cancel,
        };

        let summary = AlpineGenerator
            .generate(&ctx, vec![input_package(dir.path(), "curl", None)])
            .unwrap();
        assert!(summary.signed);

        let arch_dir = dir.path().join("out/x86_64");
        let signature = fs::read(arch_dir.join(signature_file_name("builder@example.com"))).unwrap();
        assert_eq!(signature.len(), 128);
    }
}
