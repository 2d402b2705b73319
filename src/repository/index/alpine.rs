// src/repository/index/alpine.rs

//! Alpine APKINDEX
//!
//! The index is a gzipped tar holding `DESCRIPTION` and `APKINDEX`. APKINDEX
//! is a list of blocks of single-letter fields (`P:name`, `V:version`, ...)
//! separated by blank lines. The `C:` field is `Q1` followed by the base64
//! of the raw SHA-1 digest of the package file.

use crate::compression::{compress, create_decoder, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::Package;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use tar::Archive;
use tracing::{debug, warn};

pub const INDEX_FILE: &str = "APKINDEX.tar.gz";

/// `Q1` + base64 of the raw digest behind a hex SHA-1
pub fn encode_checksum(sha1_hex: &str) -> Result<String> {
    let raw = hex::decode(sha1_hex)
        .map_err(|e| Error::MetadataError(format!("Invalid SHA1 '{}': {}", sha1_hex, e)))?;
    Ok(format!("Q1{}", BASE64.encode(raw)))
}

/// Hex SHA-1 from an APKINDEX `C:` value
pub fn decode_checksum(value: &str) -> Result<String> {
    let encoded = value
        .strip_prefix("Q1")
        .ok_or_else(|| Error::ParseError(format!("Unsupported checksum '{}'", value)))?;
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| Error::ParseError(format!("Invalid checksum '{}': {}", value, e)))?;
    Ok(hex::encode(raw))
}

/// Serialize packages into APKINDEX text
pub fn write_apkindex(packages: &[Package]) -> Result<String> {
    let mut blocks = Vec::with_capacity(packages.len());

    for pkg in packages {
        let sha1 = pkg.sha1.as_deref().ok_or_else(|| {
            Error::MetadataError(format!("{} {} has no SHA1 checksum", pkg.name, pkg.version))
        })?;

        let mut block = String::new();
        block.push_str(&format!("C:{}\n", encode_checksum(sha1)?));
        block.push_str(&format!("P:{}\n", pkg.name));
        block.push_str(&format!("V:{}\n", pkg.version));
        block.push_str(&format!("A:{}\n", pkg.architecture.as_deref().unwrap_or_default()));
        block.push_str(&format!("S:{}\n", pkg.size));
        if let Some(installed) = pkg.extras.get("installed_size") {
            block.push_str(&format!("I:{}\n", installed));
        }

        let optional = [
            ('T', pkg.description.as_deref()),
            ('U', pkg.homepage.as_deref()),
            ('L', pkg.license.as_deref()),
            ('m', pkg.maintainer.as_deref()),
        ];
        for (letter, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                block.push_str(&format!("{}:{}\n", letter, value));
            }
        }

        if !pkg.dependencies.is_empty() {
            block.push_str(&format!("D:{}\n", pkg.dependencies.join(" ")));
        }
        blocks.push(block);
    }

    Ok(blocks.join("\n"))
}

/// Build `APKINDEX.tar.gz` for one architecture
pub fn write_apkindex_archive(packages: &[Package], arch: &str) -> Result<Vec<u8>> {
    let index = write_apkindex(packages)?;
    let description = format!("Alpine Package Index for {}", arch);

    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [("DESCRIPTION", description.as_bytes()), ("APKINDEX", index.as_bytes())] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, data)
            .map_err(|e| Error::MetadataError(format!("Failed to add {} to index: {}", name, e)))?;
    }
    let tar = builder
        .into_inner()
        .map_err(|e| Error::MetadataError(format!("Failed to finish index tar: {}", e)))?;

    Ok(compress(&tar, CompressionFormat::Gzip)?)
}

/// Parse APKINDEX text back into package records
///
/// `published_path` is set to `<name>-<version>.apk`, relative to the
/// architecture directory.
pub fn parse_apkindex(content: &str) -> Result<Vec<Package>> {
    let mut packages = Vec::new();
    let mut current = Package::default();
    let mut in_block = false;

    for line in content.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if in_block {
                packages.push(finish_block(std::mem::take(&mut current))?);
                in_block = false;
            }
            continue;
        }

        let Some((letter, value)) = line.split_once(':') else {
            continue;
        };
        in_block = true;
        let value = value.to_string();

        match letter {
            "C" => current.sha1 = Some(decode_checksum(&value)?),
            "P" => current.name = value,
            "V" => current.version = value,
            "A" => current.architecture = Some(value).filter(|v| !v.is_empty()),
            "S" => {
                current.size = value
                    .parse()
                    .map_err(|_| Error::ParseError(format!("Invalid size '{}'", value)))?;
            }
            "I" => {
                current.extras.insert("installed_size".to_string(), value);
            }
            "T" => current.description = Some(value),
            "U" => current.homepage = Some(value),
            "L" => current.license = Some(value),
            "m" => current.maintainer = Some(value),
            "D" => current.dependencies = value.split_whitespace().map(str::to_string).collect(),
            other => {
                current.extras.insert(format!("apkindex_{}", other), value);
            }
        }
    }

    Ok(packages)
}

fn finish_block(mut pkg: Package) -> Result<Package> {
    if pkg.name.is_empty() || pkg.version.is_empty() {
        return Err(Error::ParseError("APKINDEX block without P: or V:".to_string()));
    }
    pkg.published_path = Some(format!("{}-{}.apk", pkg.name, pkg.version));
    Ok(pkg)
}

/// Read the `APKINDEX` member out of an `APKINDEX.tar.gz`
fn read_index_archive(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
    let decoder = create_decoder(BufReader::new(file), CompressionFormat::Gzip)?;
    let mut archive = Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?;
        let is_index = entry
            .path()
            .map(|p| p.to_string_lossy() == "APKINDEX")
            .unwrap_or(false);
        if is_index {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))?;
            return Ok(content);
        }
    }

    Err(Error::ParseError(format!("{}: no APKINDEX member", path.display())))
}

/// Read `<arch>/APKINDEX.tar.gz` for every architecture directory under `root`
pub fn read_existing_packages(
    root: &Path,
    config: &RepositoryConfig,
) -> Result<Option<Vec<Package>>> {
    if !root.is_dir() {
        return Ok(None);
    }

    let mut arch_dirs = Vec::new();
    for entry in fs::read_dir(root).map_err(|e| Error::file_op(root, e))? {
        let path = entry.map_err(|e| Error::file_op(root, e))?.path();
        if path.join(INDEX_FILE).is_file() {
            arch_dirs.push(path);
        }
    }
    arch_dirs.sort();

    let mut found = false;
    let mut packages = Vec::new();
    for dir in arch_dirs {
        let arch = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !config.architecture_allowed(&arch) {
            debug!("Skipping APKINDEX for filtered architecture {}", arch);
            continue;
        }

        let index_path = dir.join(INDEX_FILE);
        let content = read_index_archive(&index_path)?;
        found = true;

        for mut pkg in parse_apkindex(&content).map_err(|e| e.for_file(&index_path))? {
            match pkg.architecture.as_deref() {
                Some(a) if a != arch => {
                    warn!("{} {} listed under {} but built for {}", pkg.name, pkg.version, arch, a);
                }
                None => pkg.architecture = Some(arch.clone()),
                _ => {}
            }
            packages.push(pkg);
        }
    }

    if !found {
        return Ok(None);
    }
    Ok(Some(packages))
}
