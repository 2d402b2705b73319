// src/repository/index/fedora.rs

//! RPM repository metadata (repodata)
//!
//! Generates `primary.xml` and `repomd.xml` in the createrepo layout and
//! parses them back. Only the primary metadata is produced; filelists and
//! other are not.

use crate::checksum::sha256_hex;
use crate::compression::{compress, decompress, CompressionFormat};
use crate::error::{Error, Result};
use crate::packages::Package;
use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;
use tracing::debug;

const COMMON_NS: &str = "http://linux.duke.edu/metadata/common";
const REPO_NS: &str = "http://linux.duke.edu/metadata/repo";
const RPM_NS: &str = "http://linux.duke.edu/metadata/rpm";

/// Compressed primary metadata, named by the SHA-256 of its compressed bytes
#[derive(Debug, Clone)]
pub struct PrimaryFile {
    pub compressed: Vec<u8>,
    pub checksum: String,
    pub open_size: u64,
}

impl PrimaryFile {
    /// Gzip `primary.xml` and hash the result
    pub fn new(primary_xml: &[u8]) -> Result<Self> {
        let compressed = compress(primary_xml, CompressionFormat::Gzip)?;
        let checksum = sha256_hex(&compressed);
        Ok(Self {
            compressed,
            checksum,
            open_size: primary_xml.len() as u64,
        })
    }

    /// Location relative to the `<version>/<arch>/` directory
    pub fn href(&self) -> String {
        format!("repodata/{}-primary.xml.gz", self.checksum)
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn write_event(writer: &mut XmlWriter, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::MetadataError(format!("Failed to write XML: {}", e)))
}

fn text_element(writer: &mut XmlWriter, name: &str, value: &str) -> Result<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(value)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

/// Generate uncompressed `primary.xml` for the given packages
pub fn write_primary_xml(packages: &[Package]) -> Result<Vec<u8>> {
    write_primary_xml_at(packages, Utc::now().timestamp())
}

/// Generate `primary.xml` with `now` as the file time
pub fn write_primary_xml_at(packages: &[Package], now: i64) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let count = packages.len().to_string();

    write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_event(
        &mut writer,
        Event::Start(BytesStart::new("metadata").with_attributes([
            ("xmlns", COMMON_NS),
            ("xmlns:rpm", RPM_NS),
            ("packages", count.as_str()),
        ])),
    )?;

    for pkg in packages {
        write_package(&mut writer, pkg, now)?;
    }

    write_event(&mut writer, Event::End(BytesEnd::new("metadata")))?;

    let mut xml = writer.into_inner();
    xml.push(b'\n');
    Ok(xml)
}

fn write_package(writer: &mut XmlWriter, pkg: &Package, now: i64) -> Result<()> {
    let href = pkg.published_path.as_deref().ok_or_else(|| {
        Error::MetadataError(format!("{} {} has no location in the repository", pkg.name, pkg.version))
    })?;
    let release = pkg
        .extras
        .get("Release")
        .filter(|r| !r.is_empty())
        .map(String::as_str)
        .unwrap_or("1");
    let build_time = pkg
        .extras
        .get("BuildTime")
        .cloned()
        .unwrap_or_else(|| now.to_string());
    let file_time = now.to_string();
    let size = pkg.size.to_string();
    let description = pkg.description.as_deref().unwrap_or_default();

    write_event(
        writer,
        Event::Start(BytesStart::new("package").with_attributes([("type", "rpm")])),
    )?;
    text_element(writer, "name", &pkg.name)?;
    text_element(writer, "arch", pkg.architecture.as_deref().unwrap_or("noarch"))?;
    write_event(
        writer,
        Event::Empty(BytesStart::new("version").with_attributes([
            ("epoch", "0"),
            ("ver", pkg.version.as_str()),
            ("rel", release),
        ])),
    )?;
    write_event(
        writer,
        Event::Start(
            BytesStart::new("checksum").with_attributes([("type", "sha256"), ("pkgid", "YES")]),
        ),
    )?;
    write_event(
        writer,
        Event::Text(BytesText::new(pkg.sha256.as_deref().unwrap_or_default())),
    )?;
    write_event(writer, Event::End(BytesEnd::new("checksum")))?;

    text_element(writer, "summary", description)?;
    text_element(writer, "description", description)?;
    if let Some(packager) = pkg.maintainer.as_deref() {
        text_element(writer, "packager", packager)?;
    }
    if let Some(url) = pkg.homepage.as_deref() {
        text_element(writer, "url", url)?;
    }

    write_event(
        writer,
        Event::Empty(BytesStart::new("time").with_attributes([
            ("file", file_time.as_str()),
            ("build", build_time.as_str()),
        ])),
    )?;
    write_event(
        writer,
        Event::Empty(BytesStart::new("size").with_attributes([
            ("package", size.as_str()),
            ("installed", size.as_str()),
            ("archive", size.as_str()),
        ])),
    )?;
    write_event(
        writer,
        Event::Empty(BytesStart::new("location").with_attributes([("href", href)])),
    )?;

    write_event(writer, Event::Start(BytesStart::new("format")))?;
    if let Some(license) = pkg.license.as_deref() {
        text_element(writer, "rpm:license", license)?;
    }
    if let Some(group) = pkg.extras.get("Group") {
        text_element(writer, "rpm:group", group)?;
    }
    if !pkg.dependencies.is_empty() {
        write_event(writer, Event::Start(BytesStart::new("rpm:requires")))?;
        for dep in &pkg.dependencies {
            write_event(
                writer,
                Event::Empty(BytesStart::new("rpm:entry").with_attributes([("name", dep.as_str())])),
            )?;
        }
        write_event(writer, Event::End(BytesEnd::new("rpm:requires")))?;
    }
    write_event(writer, Event::End(BytesEnd::new("format")))?;

    write_event(writer, Event::End(BytesEnd::new("package")))
}

/// Generate `repomd.xml` describing one primary file
///
/// `open-checksum` is the SHA-256 of the checksum string itself, not of the
/// uncompressed XML.
pub fn write_repomd(primary: &PrimaryFile, timestamp: i64) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let open_checksum = sha256_hex(primary.checksum.as_bytes());
    let href = primary.href();
    let timestamp = timestamp.to_string();

    write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_event(
        &mut writer,
        Event::Start(
            BytesStart::new("repomd").with_attributes([("xmlns", REPO_NS), ("xmlns:rpm", RPM_NS)]),
        ),
    )?;
    text_element(&mut writer, "revision", &timestamp)?;

    write_event(
        &mut writer,
        Event::Start(BytesStart::new("data").with_attributes([("type", "primary")])),
    )?;
    for (name, value) in [("checksum", &primary.checksum), ("open-checksum", &open_checksum)] {
        write_event(
            &mut writer,
            Event::Start(BytesStart::new(name).with_attributes([("type", "sha256")])),
        )?;
        write_event(&mut writer, Event::Text(BytesText::new(value)))?;
        write_event(&mut writer, Event::End(BytesEnd::new(name)))?;
    }
    write_event(
        &mut writer,
        Event::Empty(BytesStart::new("location").with_attributes([("href", href.as_str())])),
    )?;
    text_element(&mut writer, "timestamp", &timestamp)?;
    text_element(&mut writer, "size", &primary.compressed.len().to_string())?;
    text_element(&mut writer, "open-size", &primary.open_size.to_string())?;
    write_event(&mut writer, Event::End(BytesEnd::new("data")))?;

    write_event(&mut writer, Event::End(BytesEnd::new("repomd")))?;

    let mut xml = writer.into_inner();
    xml.push(b'\n');
    Ok(xml)
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Find the primary metadata href in `repomd.xml`
pub fn parse_repomd_primary_location(xml_content: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_primary = false;
    let mut location = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"data" => {
                in_primary = attribute(&e, b"type").as_deref() == Some("primary");
            }
            Ok(Event::Start(e) | Event::Empty(e))
                if in_primary && e.local_name().as_ref() == b"location" =>
            {
                location = attribute(&e, b"href");
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"data" => {
                in_primary = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!("Failed to parse repomd.xml: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(location)
}

/// Collects one `<package>` element while parsing primary.xml
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    arch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    checksum: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    packager: Option<String>,
    url: Option<String>,
    build_time: Option<String>,
    size: Option<String>,
    location: Option<String>,
    license: Option<String>,
    group: Option<String>,
    requires: Vec<String>,
}

impl PackageBuilder {
    fn build(self) -> Result<Package> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let version = self
            .ver
            .ok_or_else(|| Error::ParseError(format!("Missing version for {}", name)))?;
        let size = match self.size {
            Some(size) => size
                .parse()
                .map_err(|e| Error::ParseError(format!("Invalid size for {}: {}", name, e)))?,
            None => 0,
        };

        let mut pkg = Package::new(name, version);
        pkg.architecture = self.arch;
        pkg.sha256 = self.checksum;
        pkg.description = self.description.or(self.summary);
        pkg.maintainer = self.packager;
        pkg.homepage = self.url;
        pkg.license = self.license;
        pkg.dependencies = self.requires;
        pkg.size = size;
        pkg.published_path = self.location;

        if let Some(rel) = self.rel {
            pkg.extras.insert("Release".to_string(), rel);
        }
        if let Some(group) = self.group {
            pkg.extras.insert("Group".to_string(), group);
        }
        if let Some(build_time) = self.build_time {
            pkg.extras.insert("BuildTime".to_string(), build_time);
        }

        Ok(pkg)
    }
}

/// Parse `primary.xml` into package records
pub fn parse_primary_xml(xml_content: &str) -> Result<Vec<Package>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<PackageBuilder> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if tag == "package" {
                    current = Some(PackageBuilder::default());
                } else if let Some(pkg) = current.as_mut() {
                    apply_attributes(pkg, &tag, &e);
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) => {
                if let Some(pkg) = current.as_mut() {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    apply_attributes(pkg, &tag, &e);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(pkg) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::ParseError(format!("Bad text in primary.xml: {}", e)))?
                        .to_string();
                    match current_tag.as_str() {
                        "name" => pkg.name = Some(text),
                        "arch" => pkg.arch = Some(text),
                        "checksum" => pkg.checksum = Some(text),
                        "summary" => pkg.summary = Some(text),
                        "description" => pkg.description = Some(text),
                        "packager" => pkg.packager = Some(text),
                        "url" => pkg.url = Some(text),
                        "license" => pkg.license = Some(text),
                        "group" => pkg.group = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"package" {
                    if let Some(builder) = current.take() {
                        packages.push(builder.build()?);
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!("Failed to parse primary.xml: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

fn apply_attributes(pkg: &mut PackageBuilder, tag: &str, e: &BytesStart<'_>) {
    match tag {
        "version" => {
            pkg.ver = attribute(e, b"ver");
            pkg.rel = attribute(e, b"rel");
        }
        "time" => pkg.build_time = attribute(e, b"build"),
        "size" => pkg.size = attribute(e, b"package"),
        "location" => pkg.location = attribute(e, b"href"),
        "entry" => {
            if let Some(name) = attribute(e, b"name") {
                pkg.requires.push(name);
            }
        }
        _ => {}
    }
}

/// Read every `<version>/<arch>/repodata` tree under `root`
///
/// Each record gets the version directory as its `DistroVersion`, so it is
/// republished in the same place.
pub fn read_existing_packages(root: &Path) -> Result<Option<Vec<Package>>> {
    let mut found = false;
    let mut packages = Vec::new();

    for version_dir in sorted_subdirs(root)? {
        let version = dir_name(&version_dir);
        for arch_dir in sorted_subdirs(&version_dir)? {
            let repomd_path = arch_dir.join("repodata").join("repomd.xml");
            if !repomd_path.is_file() {
                continue;
            }

            let repomd = fs::read_to_string(&repomd_path)
                .map_err(|e| Error::file_op(&repomd_path, e))?;
            let href = parse_repomd_primary_location(&repomd)
                .map_err(|e| e.for_file(&repomd_path))?
                .ok_or_else(|| {
                    Error::ParseError(format!(
                        "{}: no primary data location",
                        repomd_path.display()
                    ))
                })?;

            let primary_path = arch_dir.join(&href);
            let data = fs::read(&primary_path).map_err(|e| Error::file_op(&primary_path, e))?;
            let xml = decompress(&data, CompressionFormat::from_extension(&href))?;
            let xml = String::from_utf8(xml).map_err(|e| {
                Error::ParseError(format!("{}: invalid UTF-8: {}", primary_path.display(), e))
            })?;

            found = true;
            for mut pkg in parse_primary_xml(&xml).map_err(|e| e.for_file(&primary_path))? {
                pkg.extras.insert("DistroVersion".to_string(), version.clone());
                packages.push(pkg);
            }
        }
    }

    if !found {
        return Ok(None);
    }

    debug!("Read {} published RPM packages", packages.len());
    Ok(Some(packages))
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::file_op(dir, e))? {
        let path = entry.map_err(|e| Error::file_op(dir, e))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;

    fn rpm(name: &str, version: &str, release: &str) -> Package {
        let mut pkg = Package::new(name, version);
        pkg.architecture = Some("x86_64".to_string());
        pkg.description = Some("A <small> & useful tool".to_string());
        pkg.maintainer = Some("Fedora Project".to_string());
        pkg.homepage = Some("https://example.org".to_string());
        pkg.license = Some("MIT".to_string());
        pkg.dependencies = vec!["glibc".to_string(), "libfoo.so.1()(64bit)".to_string()];
        pkg.apply_checksum(&Checksum::from_bytes(name.as_bytes()));
        pkg.extras.insert("Release".to_string(), release.to_string());
        pkg.extras.insert("Group".to_string(), "Applications/System".to_string());
        pkg.extras.insert("BuildTime".to_string(), "1700000000".to_string());
        pkg.published_path = Some(format!("Packages/{}-{}-{}.x86_64.rpm", name, version, release));
        pkg
    }

    #[test]
    fn test_primary_xml_structure() {
        let xml = write_primary_xml_at(&[rpm("hello", "2.12", "1.fc40")], 1234).unwrap();
        let xml = String::from_utf8(xml).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(
            "<metadata xmlns=\"http://linux.duke.edu/metadata/common\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"1\">"
        ));
        assert!(xml.contains("<version epoch=\"0\" ver=\"2.12\" rel=\"1.fc40\"/>"));
        assert!(xml.contains("<checksum type=\"sha256\" pkgid=\"YES\">"));
        assert!(xml.contains("<summary>A &lt;small&gt; &amp; useful tool</summary>"));
        assert!(xml.contains("<time file=\"1234\" build=\"1700000000\"/>"));
        assert!(xml.contains("<location href=\"Packages/hello-2.12-1.fc40.x86_64.rpm\"/>"));
        assert!(xml.contains("<rpm:entry name=\"glibc\"/>"));
    }

    #[test]
    fn test_primary_requires_location() {
        let mut pkg = rpm("hello", "2.12", "1");
        pkg.published_path = None;
        assert!(matches!(
            write_primary_xml(&[pkg]),
            Err(Error::MetadataError(_))
        ));
    }

    #[test]
    fn test_primary_round_trip() {
        let packages = vec![rpm("hello", "2.12", "1.fc40"), rpm("world", "1.0", "3")];
        let xml = write_primary_xml(&packages).unwrap();
        let parsed = parse_primary_xml(std::str::from_utf8(&xml).unwrap()).unwrap();

        assert_eq!(parsed.len(), 2);
        for (parsed, original) in parsed.iter().zip(&packages) {
            assert_eq!(parsed.name, original.name);
            assert_eq!(parsed.version, original.version);
            assert_eq!(parsed.architecture, original.architecture);
            assert_eq!(parsed.size, original.size);
            assert_eq!(parsed.sha256, original.sha256);
            assert_eq!(parsed.description, original.description);
            assert_eq!(parsed.license, original.license);
            assert_eq!(parsed.dependencies, original.dependencies);
            assert_eq!(parsed.published_path, original.published_path);
            assert_eq!(parsed.extras, original.extras);
        }
    }

    #[test]
    fn test_repomd_open_checksum() {
        let primary = PrimaryFile::new(b"<metadata/>").unwrap();
        let repomd = String::from_utf8(write_repomd(&primary, 42).unwrap()).unwrap();

        assert!(repomd.contains(&format!(
            "<checksum type=\"sha256\">{}</checksum>",
            primary.checksum
        )));
        assert!(repomd.contains(&format!(
            "<open-checksum type=\"sha256\">{}</open-checksum>",
            sha256_hex(primary.checksum.as_bytes())
        )));
        assert!(repomd.contains("<open-size>11</open-size>"));
        assert!(repomd.contains("<revision>42</revision>"));

        let href = parse_repomd_primary_location(&repomd).unwrap();
        assert_eq!(href, Some(primary.href()));
    }

    #[test]
    fn test_read_existing_tags_version_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_existing_packages(dir.path()).unwrap().is_none());

        let arch_dir = dir.path().join("40").join("x86_64");
        fs::create_dir_all(arch_dir.join("repodata")).unwrap();
        let xml = write_primary_xml(&[rpm("hello", "2.12", "1.fc40")]).unwrap();
        let primary = PrimaryFile::new(&xml).unwrap();
        fs::write(arch_dir.join(primary.href()), &primary.compressed).unwrap();
        fs::write(
            arch_dir.join("repodata").join("repomd.xml"),
            write_repomd(&primary, 0).unwrap(),
        )
        .unwrap();

        let existing = read_existing_packages(dir.path()).unwrap().unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].extras.get("DistroVersion").map(String::as_str), Some("40"));
        assert_eq!(
            existing[0].published_path.as_deref(),
            Some("Packages/hello-2.12-1.fc40.x86_64.rpm")
        );
    }
}
