// src/lib.rs

//! Repogen: native package repository generator
//!
//! Turns a directory of packages (.deb, .rpm, .apk, pacman packages and
//! Homebrew bottles) into the metadata trees APT, yum/dnf, apk, pacman and
//! Homebrew expect, optionally signed.

pub mod checksum;
pub mod compression;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod packages;
pub mod repository;
pub mod scanner;
pub mod signing;

pub use config::{ConfigOptions, DistroVariant, RepositoryConfig};
pub use error::{Error, Result};
pub use packages::{Package, PackageIdentity, PackageType};
pub use repository::{generate_repositories, CancellationToken, GenerationReport};
pub use signing::{SigningKeys, SigningMode};
