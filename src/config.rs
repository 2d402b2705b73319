// src/config.rs

//! Generation configuration
//!
//! Raw options (from the command line or a caller) are collected in
//! [`ConfigOptions`], where everything is optional. [`ConfigOptions::resolve`]
//! applies every default once and validates the result, producing the
//! immutable [`RepositoryConfig`] the generators read.

use crate::error::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_ORIGIN: &str = "Repogen Repository";
pub const DEFAULT_CODENAME: &str = "stable";
pub const DEFAULT_COMPONENT: &str = "main";
pub const DEFAULT_RSA_KEY_NAME: &str = "repogen";

/// RPM distribution family, used for version defaults and `.repo` options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistroVariant {
    #[default]
    Fedora,
    Centos,
    Rhel,
}

impl DistroVariant {
    /// Release version used when neither the caller nor the package names one
    pub fn default_version(&self) -> &'static str {
        match self {
            DistroVariant::Fedora => "40",
            DistroVariant::Centos | DistroVariant::Rhel => "9",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistroVariant::Fedora => "fedora",
            DistroVariant::Centos => "centos",
            DistroVariant::Rhel => "rhel",
        }
    }
}

impl FromStr for DistroVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fedora" => Ok(DistroVariant::Fedora),
            "centos" => Ok(DistroVariant::Centos),
            "rhel" => Ok(DistroVariant::Rhel),
            other => Err(Error::InvalidConfig(format!(
                "Unknown distro '{}': expected fedora, centos or rhel",
                other
            ))),
        }
    }
}

impl fmt::Display for DistroVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unresolved options; `None` and empty lists fall back to defaults
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub origin: Option<String>,
    pub label: Option<String>,
    pub codename: Option<String>,
    pub suite: Option<String>,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub repo_name: Option<String>,
    pub distro: Option<DistroVariant>,
    pub version: Option<String>,
    pub base_url: Option<String>,
    pub gpg_key_url: Option<String>,
    pub gpg_key: Option<PathBuf>,
    pub gpg_passphrase: Option<String>,
    pub rsa_key: Option<PathBuf>,
    pub rsa_passphrase: Option<String>,
    pub rsa_key_name: Option<String>,
    pub incremental: bool,
}

/// Fully resolved, read-only configuration for one generation run
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,

    // APT naming
    pub origin: String,
    pub label: String,
    pub codename: String,
    pub suite: String,
    pub components: Vec<String>,

    /// Architecture filter; empty means every architecture found
    pub architectures: Vec<String>,

    /// Pacman database name
    pub repo_name: Option<String>,

    pub distro: DistroVariant,
    /// Explicit RPM release version directory
    pub version: Option<String>,

    pub base_url: Option<String>,
    pub gpg_key_url: Option<String>,

    pub gpg_key: Option<PathBuf>,
    pub gpg_passphrase: Option<String>,
    pub rsa_key: Option<PathBuf>,
    pub rsa_passphrase: Option<String>,
    pub rsa_key_name: String,

    pub incremental: bool,
}

impl ConfigOptions {
    /// Apply defaults and validate
    pub fn resolve(self) -> Result<RepositoryConfig> {
        let input_dir = self
            .input_dir
            .ok_or_else(|| Error::InvalidConfig("input directory is required".to_string()))?;
        let output_dir = self
            .output_dir
            .ok_or_else(|| Error::InvalidConfig("output directory is required".to_string()))?;

        if !input_dir.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "input directory {} does not exist",
                input_dir.display()
            )));
        }
        if input_dir == output_dir {
            return Err(Error::InvalidConfig(
                "input and output directories must differ".to_string(),
            ));
        }

        let origin = non_empty(self.origin).unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let label = non_empty(self.label).unwrap_or_else(|| origin.clone());
        let codename = non_empty(self.codename).unwrap_or_else(|| DEFAULT_CODENAME.to_string());
        let suite = non_empty(self.suite).unwrap_or_else(|| codename.clone());

        let mut components = clean_list(self.components);
        if components.is_empty() {
            components.push(DEFAULT_COMPONENT.to_string());
        }
        let architectures = clean_list(self.architectures);

        for name in components.iter().chain(architectures.iter()).chain([&codename]) {
            validate_path_segment(name)?;
        }

        let repo_name = non_empty(self.repo_name);
        if let Some(name) = &repo_name {
            validate_path_segment(name)?;
        }

        if self.gpg_passphrase.is_some() && self.gpg_key.is_none() {
            return Err(Error::InvalidConfig(
                "a GPG passphrase was given without a GPG key".to_string(),
            ));
        }
        if self.rsa_passphrase.is_some() && self.rsa_key.is_none() {
            return Err(Error::InvalidConfig(
                "an RSA passphrase was given without an RSA key".to_string(),
            ));
        }

        let rsa_key_name =
            non_empty(self.rsa_key_name).unwrap_or_else(|| DEFAULT_RSA_KEY_NAME.to_string());
        validate_path_segment(&rsa_key_name)?;

        Ok(RepositoryConfig {
            input_dir,
            output_dir,
            origin,
            label,
            codename,
            suite,
            components,
            architectures,
            repo_name,
            distro: self.distro.unwrap_or_default(),
            version: non_empty(self.version),
            base_url: non_empty(self.base_url).map(|u| u.trim_end_matches('/').to_string()),
            gpg_key_url: non_empty(self.gpg_key_url),
            gpg_key: self.gpg_key,
            gpg_passphrase: self.gpg_passphrase,
            rsa_key: self.rsa_key,
            rsa_passphrase: self.rsa_passphrase,
            rsa_key_name,
            incremental: self.incremental,
        })
    }
}

impl RepositoryConfig {
    /// Whether packages of `arch` should be published
    pub fn architecture_allowed(&self, arch: &str) -> bool {
        self.architectures.is_empty() || self.architectures.iter().any(|a| a == arch)
    }

    /// Origin reduced to a repository id (`My Repo` -> `my-repo`)
    pub fn repo_id(&self) -> String {
        sanitize_id(&self.origin)
    }
}

/// Lowercase alphanumerics; spaces, `_` and `.` become `-`; everything else is dropped
pub fn sanitize_id(s: &str) -> String {
    s.chars()
        .filter_map(|ch| match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            ' ' | '_' | '.' => Some('-'),
            _ => None,
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn validate_path_segment(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.chars().any(char::is_whitespace)
    {
        return Err(Error::InvalidConfig(format!(
            "'{}' cannot be used as a directory or file name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(input: &std::path::Path) -> ConfigOptions {
        ConfigOptions {
            input_dir: Some(input.to_path_buf()),
            output_dir: Some(input.join("out")),
            ..ConfigOptions::default()
        }
    }

    #[test]
    fn test_defaults_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = options(dir.path()).resolve().unwrap();

        assert_eq!(config.origin, "Repogen Repository");
        assert_eq!(config.label, "Repogen Repository");
        assert_eq!(config.codename, "stable");
        assert_eq!(config.suite, "stable");
        assert_eq!(config.components, vec!["main"]);
        assert!(config.architectures.is_empty());
        assert_eq!(config.distro, DistroVariant::Fedora);
        assert_eq!(config.rsa_key_name, "repogen");
        assert!(config.architecture_allowed("riscv64"));
    }

    #[test]
    fn test_suite_and_label_follow_their_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.origin = Some("Acme Corp".to_string());
        opts.codename = Some("bookworm".to_string());
        opts.architectures = vec!["amd64".to_string(), " arm64 ".to_string(), "amd64".to_string()];

        let config = opts.resolve().unwrap();
        assert_eq!(config.label, "Acme Corp");
        assert_eq!(config.suite, "bookworm");
        assert_eq!(config.architectures, vec!["amd64", "arm64"]);
        assert!(!config.architecture_allowed("i386"));
        assert_eq!(config.repo_id(), "acme-corp");
    }

    #[test]
    fn test_missing_input_dir_rejected() {
        let opts = ConfigOptions {
            input_dir: Some(PathBuf::from("/nonexistent/input")),
            output_dir: Some(PathBuf::from("/tmp/out")),
            ..ConfigOptions::default()
        };
        assert!(matches!(opts.resolve(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.components = vec!["main/extra".to_string()];
        assert!(opts.resolve().is_err());

        let mut opts = options(dir.path());
        opts.repo_name = Some("my repo".to_string());
        assert!(opts.resolve().is_err());
    }

    #[test]
    fn test_passphrase_without_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.gpg_passphrase = Some("secret".to_string());
        assert!(matches!(opts.resolve(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_distro_variant_parsing() {
        assert_eq!("CentOS".parse::<DistroVariant>().unwrap(), DistroVariant::Centos);
        assert_eq!(DistroVariant::Rhel.default_version(), "9");
        assert_eq!(DistroVariant::Fedora.default_version(), "40");
        assert!("debian".parse::<DistroVariant>().is_err());
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("My Repo_v2.0!"), "my-repo-v2-0");
    }
}
