// src/signing/mod.rs

//! Repository signing
//!
//! Keys are loaded once, before any generation starts, into [`SigningKeys`].
//! Each ecosystem is then handed a [`SigningMode`]: Debian, RPM and pacman
//! sign with OpenPGP, Alpine with RSA, and Homebrew is never signed.

pub mod gpg;
pub mod rsa;

pub use self::gpg::GpgSigner;
pub use self::rsa::RsaSigner;

use crate::config::RepositoryConfig;
use crate::error::Result;
use crate::packages::PackageType;

/// How one ecosystem's metadata is signed
#[derive(Debug, Clone, Copy)]
pub enum SigningMode<'a> {
    Unsigned,
    Gpg(&'a GpgSigner),
    Rsa(&'a RsaSigner),
}

impl SigningMode<'_> {
    pub fn is_signed(&self) -> bool {
        !matches!(self, SigningMode::Unsigned)
    }
}

/// Signers loaded from the configured key files
#[derive(Debug, Default)]
pub struct SigningKeys {
    pub gpg: Option<GpgSigner>,
    pub rsa: Option<RsaSigner>,
}

impl SigningKeys {
    /// No keys; every ecosystem is published unsigned
    pub fn none() -> Self {
        Self::default()
    }

    /// Load every key named in the configuration; any failure is fatal
    pub fn load(config: &RepositoryConfig) -> Result<Self> {
        let gpg = config
            .gpg_key
            .as_deref()
            .map(|path| GpgSigner::load(path, config.gpg_passphrase.as_deref()))
            .transpose()?;
        let rsa = config
            .rsa_key
            .as_deref()
            .map(|path| RsaSigner::load(path, config.rsa_passphrase.as_deref()))
            .transpose()?;

        Ok(Self { gpg, rsa })
    }

    /// Signing mode for one ecosystem
    pub fn mode_for(&self, package_type: PackageType) -> SigningMode<'_> {
        let mode = match package_type {
            PackageType::Deb | PackageType::Rpm | PackageType::Pacman => {
                self.gpg.as_ref().map(SigningMode::Gpg)
            }
            PackageType::Apk => self.rsa.as_ref().map(SigningMode::Rsa),
            PackageType::HomebrewBottle => None,
        };
        mode.unwrap_or(SigningMode::Unsigned)
    }
}
