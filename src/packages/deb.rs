// src/packages/deb.rs

//! Debian package format parser
//!
//! Parses .deb packages, which are AR archives containing a control tarball
//! (control.tar, control.tar.gz, control.tar.xz or control.tar.zst) next to
//! the data tarball. Only the control file is read.

use crate::checksum::Checksum;
use crate::compression::{create_decoder, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::traits::PackageCodec;
use crate::packages::{Package, PackageType};
use crate::repository::index::debian;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::debug;

/// One `Key: value` field of an RFC822-style paragraph
pub type ControlField = (String, String);

/// Codec for .deb packages and APT `Packages` indexes
pub struct DebCodec;

impl DebCodec {
    /// Read the raw `control` file out of a .deb
    pub fn extract_control_file(path: &Path) -> Result<String> {
        let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
        let mut archive = ar::Archive::new(file);

        while let Some(entry) = archive.next_entry() {
            let mut entry = entry.map_err(|e| {
                Error::ParseError(format!("{}: failed to read AR entry: {}", path.display(), e))
            })?;

            // GNU ar terminates member names with '/'
            let identifier = String::from_utf8_lossy(entry.header().identifier()).to_string();
            let name = identifier.trim_end_matches('/').trim_end();
            if !name.starts_with("control.tar") {
                continue;
            }

            let mut compressed = Vec::new();
            entry.read_to_end(&mut compressed).map_err(|e| {
                Error::ParseError(format!("{}: failed to read {}: {}", path.display(), name, e))
            })?;

            let format = CompressionFormat::from_extension(name);
            debug!("Found {} in {} ({})", name, path.display(), format);
            return Self::read_control_from_tar(&compressed, format).map_err(|e| e.for_file(path));
        }

        Err(Error::ParseError(format!(
            "{}: no control.tar member in DEB archive",
            path.display()
        )))
    }

    /// Find `./control` inside a (possibly compressed) control tarball
    fn read_control_from_tar(data: &[u8], format: CompressionFormat) -> Result<String> {
        let decoder = create_decoder(data, format)?;
        let mut archive = Archive::new(decoder);

        for entry in archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read control.tar: {}", e)))?
        {
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read entry: {}", e)))?;

            let entry_path = entry
                .path()
                .map_err(|e| Error::ParseError(format!("Failed to get entry path: {}", e)))?
                .to_string_lossy()
                .to_string();

            if entry_path == "./control" || entry_path == "control" {
                let mut content = String::new();
                entry
                    .read_to_string(&mut content)
                    .map_err(|e| Error::ParseError(format!("Failed to read control file: {}", e)))?;
                return Ok(content);
            }
        }

        Err(Error::ParseError(
            "control.tar does not contain a control file".to_string(),
        ))
    }

    /// Parse control file content into a package
    pub fn parse_control(content: &str) -> Result<Package> {
        let paragraph = parse_paragraphs(content)
            .into_iter()
            .next()
            .ok_or_else(|| Error::ParseError("Empty control file".to_string()))?;

        let mut pkg = Package::default();
        for (field, value) in paragraph {
            apply_control_field(&mut pkg, field, value);
        }

        if pkg.name.is_empty() {
            return Err(Error::ParseError("Control file has no Package field".to_string()));
        }
        if pkg.version.is_empty() {
            return Err(Error::ParseError(format!(
                "Control file for {} has no Version field",
                pkg.name
            )));
        }

        Ok(pkg)
    }
}

/// Split RFC822-style text into paragraphs of fields
///
/// Continuation lines (leading space or tab) are appended to the previous
/// value on a new line with exactly one leading whitespace character removed,
/// so `format_field` reproduces them byte for byte.
pub fn parse_paragraphs(content: &str) -> Vec<Vec<ControlField>> {
    let mut paragraphs = Vec::new();
    let mut fields: Vec<ControlField> = Vec::new();
    let mut current: Option<ControlField> = None;

    for line in content.lines() {
        if line.trim().is_empty() {
            if let Some(field) = current.take() {
                fields.push(field);
            }
            if !fields.is_empty() {
                paragraphs.push(std::mem::take(&mut fields));
            }
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push('\n');
                value.push_str(&line[1..]);
            }
        } else if let Some((field, value)) = line.split_once(':') {
            if let Some(previous) = current.take() {
                fields.push(previous);
            }
            current = Some((field.trim().to_string(), value.trim().to_string()));
        }
    }

    if let Some(field) = current.take() {
        fields.push(field);
    }
    if !fields.is_empty() {
        paragraphs.push(fields);
    }

    paragraphs
}

/// Format one field, re-indenting continuation lines
pub fn format_field(field: &str, value: &str) -> String {
    let mut lines = value.split('\n');
    let mut out = match lines.next() {
        Some(first) if !first.is_empty() => format!("{}: {}\n", field, first),
        _ => format!("{}:\n", field),
    };
    for line in lines {
        out.push(' ');
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Apply a control field to a package; unknown fields land in extras
pub fn apply_control_field(pkg: &mut Package, field: String, value: String) {
    match field.as_str() {
        "Package" => pkg.name = value,
        "Version" => pkg.version = value,
        "Architecture" => pkg.architecture = non_empty(value),
        "Description" => pkg.description = non_empty(value),
        "Maintainer" => pkg.maintainer = non_empty(value),
        "Homepage" => pkg.homepage = non_empty(value),
        "License" => pkg.license = non_empty(value),
        "Depends" => pkg.dependencies = parse_dependency_list(&value),
        _ => {
            pkg.extras.insert(field, value);
        }
    }
}

/// Parse Debian dependency list (comma-separated with optional version constraints)
pub fn parse_dependency_list(deps: &str) -> Vec<String> {
    deps.split(',')
        .map(|dep| dep.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|dep| !dep.is_empty())
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

impl PackageCodec for DebCodec {
    fn package_type(&self) -> PackageType {
        PackageType::Deb
    }

    fn parse_package(&self, path: &Path) -> Result<Package> {
        debug!("Parsing DEB package: {}", path.display());

        let checksum = Checksum::from_path(path)?;
        let control = Self::extract_control_file(path)?;
        let mut pkg = Self::parse_control(&control).map_err(|e| e.for_file(path))?;

        pkg.apply_checksum(&checksum);
        pkg.source_path = Some(path.to_path_buf());
        Ok(pkg)
    }

    fn write_index(&self, packages: &[Package]) -> Result<Vec<u8>> {
        debian::write_packages_file(packages).map(String::into_bytes)
    }

    fn parse_existing_index(
        &self,
        repository_root: &Path,
        config: &RepositoryConfig,
    ) -> Result<Option<Vec<Package>>> {
        debian::read_existing_packages(repository_root, config)
    }
}
