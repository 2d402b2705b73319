// src/checksum.rs

//! Single-pass multi-hash checksums
//!
//! Every package file is read once and fed to MD5, SHA-1, SHA-256 and
//! SHA-512 at the same time. The different index formats each pick the
//! digests they need:
//!
//! | Index | Digests |
//! |-------|---------|
//! | APT Packages / Release | MD5, SHA-1, SHA-256, SHA-512 |
//! | RPM primary.xml | SHA-256 |
//! | APKINDEX | SHA-1 (raw bytes, base64) |
//! | pacman desc | MD5, SHA-256 |

use crate::error::{Error, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hex digests and byte count of one file or buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Checksum {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub size: u64,
}

impl Checksum {
    /// Compute all digests of a file
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
        Self::from_reader(file).map_err(|e| Error::file_op(path, e))
    }

    /// Compute all digests of everything the reader yields
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut md5 = Md5::new();
        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        let mut sha512 = Sha512::new();
        let mut size = 0u64;

        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = &buffer[..read];
            md5.update(chunk);
            sha1.update(chunk);
            sha256.update(chunk);
            sha512.update(chunk);
            size += read as u64;
        }

        Ok(Self {
            md5: hex::encode(md5.finalize()),
            sha1: hex::encode(sha1.finalize()),
            sha256: hex::encode(sha256.finalize()),
            sha512: hex::encode(sha512.finalize()),
            size,
        })
    }

    /// Compute all digests of an in-memory buffer
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut md5 = Md5::new();
        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        let mut sha512 = Sha512::new();
        md5.update(data);
        sha1.update(data);
        sha256.update(data);
        sha512.update(data);

        Self {
            md5: hex::encode(md5.finalize()),
            sha1: hex::encode(sha1.finalize()),
            sha256: hex::encode(sha256.finalize()),
            sha512: hex::encode(sha512.finalize()),
            size: data.len() as u64,
        }
    }
}

/// SHA-256 of a buffer as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 of a file as lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::file_op(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| Error::file_op(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}
