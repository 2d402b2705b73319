// src/repository/index/homebrew.rs

//! Homebrew tap formulas
//!
//! Each bottle name gets a `Formula/<name>.rb` pointing at the bottles under
//! `bottles/`. Existing formulas are read back with line regexes; only what
//! this module writes is understood.

use crate::error::{Error, Result};
use crate::packages::bottle::BottleName;
use crate::packages::Package;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

const DEFAULT_HOMEPAGE: &str = "https://example.com";
const DEFAULT_VERSION: &str = "1.0.0";

struct FormulaPatterns {
    version: Regex,
    desc: Regex,
    homepage: Regex,
    url: Regex,
    sha256: Regex,
}

static PATTERNS: LazyLock<Option<FormulaPatterns>> = LazyLock::new(|| {
    Some(FormulaPatterns {
        version: Regex::new(r#"^version\s+"([^"]+)""#).ok()?,
        desc: Regex::new(r#"^desc\s+"([^"]+)""#).ok()?,
        homepage: Regex::new(r#"^homepage\s+"([^"]+)""#).ok()?,
        url: Regex::new(r#"^url\s+"([^"]+)""#).ok()?,
        sha256: Regex::new(r#"^sha256\s+"([^"]+)""#).ok()?,
    })
});

/// Ruby class name for a formula (`my-tool_x` -> `MyToolX`)
pub fn class_name(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Bottle URL, absolute when a base URL is known
pub fn bottle_url(file_name: &str, base_url: Option<&str>) -> String {
    match base_url {
        Some(base) => format!("{}/bottles/{}", base.trim_end_matches('/'), file_name),
        None => format!("bottles/{}", file_name),
    }
}

fn ruby_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn bottle_file_name(pkg: &Package) -> Result<String> {
    pkg.file_name().ok_or_else(|| {
        Error::MetadataError(format!("bottle {} {} has no file name", pkg.name, pkg.version))
    })
}

fn push_bottle(out: &mut String, indent: &str, pkg: &Package, base_url: Option<&str>) -> Result<()> {
    let file_name = bottle_file_name(pkg)?;
    out.push_str(&format!("{}url \"{}\"\n", indent, bottle_url(&file_name, base_url)));
    out.push_str(&format!(
        "{}sha256 \"{}\"\n",
        indent,
        pkg.sha256.as_deref().unwrap_or_default()
    ));
    Ok(())
}

fn is_linux(pkg: &Package) -> bool {
    pkg.extras
        .get("Platform")
        .map(|p| p.contains("linux"))
        .unwrap_or(false)
}

fn built_for(pkg: &Package, arch: &str) -> bool {
    pkg.file_name().map(|n| n.contains(arch)).unwrap_or(false)
}

/// Render the formula for every bottle of one name
pub fn write_formula(bottles: &[Package], base_url: Option<&str>) -> Result<String> {
    let first = bottles
        .first()
        .ok_or_else(|| Error::MetadataError("cannot write a formula without bottles".to_string()))?;
    let name = &first.name;

    let desc = first
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| format!("{} package", name));
    let homepage = first
        .homepage
        .as_deref()
        .filter(|h| !h.is_empty())
        .unwrap_or(DEFAULT_HOMEPAGE);
    let version = if first.version.is_empty() {
        DEFAULT_VERSION
    } else {
        first.version.as_str()
    };

    let mut out = String::new();
    out.push_str(&format!("class {} < Formula\n", class_name(name)));
    out.push_str(&format!("  desc \"{}\"\n", ruby_string(&desc)));
    out.push_str(&format!("  homepage \"{}\"\n", ruby_string(homepage)));
    out.push_str(&format!("  version \"{}\"\n", ruby_string(version)));

    let (linux, macos): (Vec<&Package>, Vec<&Package>) = bottles.iter().partition(|b| is_linux(b));

    if !macos.is_empty() {
        out.push_str("\n  on_macos do\n");
        let arm = macos.iter().copied().find(|b| built_for(b, "arm64"));
        let intel = macos.iter().copied().find(|b| built_for(b, "x86_64"));

        match (arm, intel) {
            (Some(arm), Some(intel)) => {
                out.push_str("    if Hardware::CPU.arm?\n");
                push_bottle(&mut out, "      ", arm, base_url)?;
                out.push_str("    end\n");
                out.push_str("    if Hardware::CPU.intel?\n");
                push_bottle(&mut out, "      ", intel, base_url)?;
                out.push_str("    end\n");
            }
            _ => push_bottle(&mut out, "    ", macos[0], base_url)?,
        }
        out.push_str("  end\n");
    }

    if let Some(bottle) = linux.first() {
        out.push_str("\n  on_linux do\n");
        push_bottle(&mut out, "    ", bottle, base_url)?;
        out.push_str("  end\n");
    }

    out.push_str("end\n");
    Ok(out)
}

/// Parse a formula; every `url` followed by a `sha256` is one bottle
pub fn parse_formula(content: &str) -> Result<Vec<Package>> {
    let patterns = PATTERNS
        .as_ref()
        .ok_or_else(|| Error::ParseError("formula patterns failed to compile".to_string()))?;
    let capture = |re: &Regex, line: &str| {
        re.captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let mut packages = Vec::new();
    let mut version = String::new();
    let mut desc = None;
    let mut homepage = None;
    let mut url: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(v) = capture(&patterns.version, line) {
            version = v;
        } else if let Some(d) = capture(&patterns.desc, line) {
            desc = Some(d);
        } else if let Some(h) = capture(&patterns.homepage, line) {
            homepage = Some(h);
        } else if let Some(u) = capture(&patterns.url, line) {
            url = Some(u);
        } else if let Some(sha256) = capture(&patterns.sha256, line) {
            let Some(url) = url.take() else {
                continue;
            };
            let file_name = url.rsplit('/').next().unwrap_or(url.as_str()).to_string();

            let mut pkg = Package::new(BottleName::package_name(&file_name), version.clone());
            pkg.description = desc.clone();
            pkg.homepage = homepage.clone();
            pkg.sha256 = Some(sha256);
            if let Some(parsed) = BottleName::parse(&file_name) {
                pkg.extras.insert("Platform".to_string(), parsed.platform);
            }
            pkg.published_path = Some(format!("bottles/{}", file_name));
            packages.push(pkg);
        }
    }

    Ok(packages)
}

/// Read every `Formula/*.rb` under `root`
pub fn read_existing_packages(root: &Path) -> Result<Option<Vec<Package>>> {
    let formula_dir = root.join("Formula");
    if !formula_dir.is_dir() {
        return Ok(None);
    }

    let mut formulas = Vec::new();
    for entry in fs::read_dir(&formula_dir).map_err(|e| Error::file_op(&formula_dir, e))? {
        let path = entry.map_err(|e| Error::file_op(&formula_dir, e))?.path();
        if path.extension().map(|e| e == "rb").unwrap_or(false) {
            formulas.push(path);
        }
    }
    if formulas.is_empty() {
        return Ok(None);
    }
    formulas.sort();

    let mut packages = Vec::new();
    for path in formulas {
        let content = fs::read_to_string(&path).map_err(|e| Error::file_op(&path, e))?;
        match parse_formula(&content) {
            Ok(parsed) => packages.extend(parsed),
            Err(e) => warn!("Skipping unreadable formula {}: {}", path.display(), e),
        }
    }

    debug!("Read {} published bottles", packages.len());
    Ok(Some(packages))
}
