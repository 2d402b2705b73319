// src/repository/index/arch.rs

//! Pacman sync database
//!
//! A database is a tar archive with one `<name>-<version>/desc` file per
//! package, using `%FIELD%` headers followed by one value per line. The
//! published database is zstd-compressed; existing databases may use any
//! compression pacman accepts.

use crate::compression::{compress, decompress_auto, CompressionFormat};
use crate::config::RepositoryConfig;
use crate::error::{Error, Result};
use crate::packages::Package;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType, Header};
use tracing::debug;

/// Database file names tried, in order, when reading an existing repository
const DATABASE_SUFFIXES: [&str; 4] = [".db.tar.zst", ".db.tar.xz", ".db.tar.gz", ".db"];

/// Render one package's `desc` file
pub fn write_desc(pkg: &Package) -> Result<String> {
    let filename = pkg
        .published_path
        .as_deref()
        .and_then(|p| p.rsplit('/').next())
        .map(str::to_string)
        .or_else(|| pkg.file_name())
        .ok_or_else(|| {
            Error::MetadataError(format!("{} {} has no file name", pkg.name, pkg.version))
        })?;

    let size = pkg.size.to_string();
    let extra = |key: &str| pkg.extras.get(key).map(String::as_str).unwrap_or_default();
    let groups: Vec<&str> = pkg.groups.iter().map(String::as_str).collect();
    let conflicts: Vec<&str> = pkg.conflicts.iter().map(String::as_str).collect();
    let depends: Vec<&str> = pkg.dependencies.iter().map(String::as_str).collect();

    let mut out = String::new();
    push_field(&mut out, "FILENAME", &[filename.as_str()]);
    push_field(&mut out, "NAME", &[pkg.name.as_str()]);
    push_field(&mut out, "VERSION", &[pkg.version.as_str()]);
    push_field(&mut out, "DESC", &[pkg.description.as_deref().unwrap_or_default()]);
    push_field(&mut out, "GROUPS", &groups);
    push_field(&mut out, "CSIZE", &[size.as_str()]);
    push_field(&mut out, "ISIZE", &[extra("InstalledSize")]);
    push_field(&mut out, "MD5SUM", &[pkg.md5.as_deref().unwrap_or_default()]);
    push_field(&mut out, "SHA256SUM", &[pkg.sha256.as_deref().unwrap_or_default()]);
    push_field(&mut out, "URL", &[pkg.homepage.as_deref().unwrap_or_default()]);
    push_field(&mut out, "LICENSE", &[pkg.license.as_deref().unwrap_or_default()]);
    push_field(&mut out, "ARCH", &[pkg.architecture.as_deref().unwrap_or_default()]);
    push_field(&mut out, "BUILDDATE", &[extra("BuildDate")]);
    push_field(&mut out, "PACKAGER", &[pkg.maintainer.as_deref().unwrap_or_default()]);
    push_field(&mut out, "CONFLICTS", &conflicts);
    push_field(&mut out, "DEPENDS", &depends);

    Ok(out)
}

/// `%NAME%` followed by one value per line; skipped when every value is empty
fn push_field(out: &mut String, name: &str, values: &[&str]) {
    let values: Vec<&str> = values.iter().copied().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return;
    }
    out.push_str(&format!("%{}%\n", name));
    for value in values {
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
}

fn append_entry(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &str,
    entry_type: EntryType,
    data: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(data.len() as u64);
    header.set_mode(if entry_type == EntryType::Directory { 0o755 } else { 0o644 });
    header.set_cksum();
    builder
        .append_data(&mut header, path, data)
        .map_err(|e| Error::MetadataError(format!("Failed to add {} to database: {}", path, e)))
}

/// Build the zstd-compressed database for one architecture
pub fn write_database(packages: &[Package]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for pkg in packages {
        let dir = format!("{}-{}/", pkg.name, pkg.version);
        let desc = write_desc(pkg)?;
        append_entry(&mut builder, &dir, EntryType::Directory, &[])?;
        append_entry(
            &mut builder,
            &format!("{}desc", dir),
            EntryType::Regular,
            desc.as_bytes(),
        )?;
    }

    let tar = builder
        .into_inner()
        .map_err(|e| Error::MetadataError(format!("Failed to finish database tar: {}", e)))?;
    Ok(compress(&tar, CompressionFormat::Zstd)?)
}

/// Split a `desc` file into its `%FIELD%` blocks
fn parse_desc_fields(content: &str) -> HashMap<String, Vec<String>> {
    let mut fields = HashMap::new();
    let mut current_field: Option<String> = None;
    let mut values: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.len() > 1 && trimmed.starts_with('%') && trimmed.ends_with('%') {
            if let Some(field) = current_field.take() {
                fields.insert(field, std::mem::take(&mut values));
            }
            current_field = Some(trimmed[1..trimmed.len() - 1].to_string());
        } else if !trimmed.is_empty() {
            values.push(trimmed.to_string());
        }
    }

    if let Some(field) = current_field {
        fields.insert(field, values);
    }

    fields
}

/// Parse one `desc` file into a package record
pub fn parse_desc(content: &str) -> Result<Package> {
    let mut fields = parse_desc_fields(content);
    let mut first = |name: &str| fields.get_mut(name).and_then(|v| v.drain(..).next());

    let name = first("NAME").ok_or_else(|| Error::ParseError("Missing %NAME% field".to_string()))?;
    let version =
        first("VERSION").ok_or_else(|| Error::ParseError("Missing %VERSION% field".to_string()))?;

    let mut pkg = Package::new(name, version);
    pkg.published_path = first("FILENAME");
    pkg.description = first("DESC");
    pkg.size = match first("CSIZE") {
        Some(size) => size
            .parse()
            .map_err(|_| Error::ParseError(format!("Invalid %CSIZE% '{}'", size)))?,
        None => 0,
    };
    pkg.md5 = first("MD5SUM");
    pkg.sha256 = first("SHA256SUM");
    pkg.homepage = first("URL");
    pkg.architecture = first("ARCH");
    pkg.maintainer = first("PACKAGER");
    if let Some(isize) = first("ISIZE") {
        pkg.extras.insert("InstalledSize".to_string(), isize);
    }
    if let Some(date) = first("BUILDDATE") {
        pkg.extras.insert("BuildDate".to_string(), date);
    }

    let licenses = fields.remove("LICENSE").unwrap_or_default();
    if !licenses.is_empty() {
        pkg.license = Some(licenses.join(" "));
    }
    pkg.groups = fields.remove("GROUPS").unwrap_or_default();
    pkg.conflicts = fields.remove("CONFLICTS").unwrap_or_default();
    pkg.dependencies = fields.remove("DEPENDS").unwrap_or_default();

    Ok(pkg)
}

/// Parse every `*/desc` entry of a (possibly compressed) database
pub fn parse_database(data: &[u8]) -> Result<Vec<Package>> {
    let tar = decompress_auto(data)?;
    let mut archive = Archive::new(tar.as_slice());
    let mut packages = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| Error::ParseError(format!("Failed to read database: {}", e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ParseError(format!("Failed to read database entry: {}", e)))?;
        let is_desc = entry
            .path()
            .map(|p| p.to_string_lossy().ends_with("/desc"))
            .unwrap_or(false);
        if !is_desc {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| Error::ParseError(format!("Failed to read desc file: {}", e)))?;
        packages.push(parse_desc(&content)?);
    }

    Ok(packages)
}

/// First database file in `dir`, preferring `.db.tar.zst`
fn find_database(dir: &Path, repo_name: Option<&str>) -> Result<Option<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::file_op(dir, e))? {
        let path = entry.map_err(|e| Error::file_op(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for suffix in DATABASE_SUFFIXES {
        let found = files.iter().find(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match repo_name {
                Some(repo) => name == format!("{}{}", repo, suffix),
                None => name.ends_with(suffix),
            }
        });
        if let Some(path) = found {
            return Ok(Some(path.clone()));
        }
    }

    Ok(None)
}

/// Read the database of every architecture directory under `root`
///
/// `published_path` keeps the FILENAME value, relative to the architecture
/// directory.
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
        if path.is_dir() {
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
            continue;
        }

        let Some(db_path) = find_database(&dir, config.repo_name.as_deref())? else {
            continue;
        };
        debug!("Reading existing pacman database {}", db_path.display());

        let data = fs::read(&db_path).map_err(|e| Error::file_op(&db_path, e))?;
        found = true;
        packages.extend(parse_database(&data).map_err(|e| e.for_file(&db_path))?);
    }

    if !found {
        return Ok(None);
    }
    Ok(Some(packages))
}
