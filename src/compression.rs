// src/compression.rs

//! Compression helpers shared by the package readers and index writers
//!
//! Package containers nest gzip, xz and zstd streams (Debian control
//! archives, pacman packages, apk files), and the generated indexes are
//! gzip (Packages.gz, primary.xml.gz, APKINDEX.tar.gz) or zstd (pacman
//! databases).

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to compress {format} data: {source}")]
    Compression {
        format: &'static str,
        source: io::Error,
    },
}

/// Compression formats found in package containers and indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from a file name suffix
    pub fn from_extension(path: &str) -> Self {
        if path.ends_with(".gz") || path.ends_with(".tgz") {
            Self::Gzip
        } else if path.ends_with(".xz") {
            Self::Xz
        } else if path.ends_with(".zst") || path.ends_with(".zstd") {
            Self::Zstd
        } else {
            Self::None
        }
    }

    /// Detect compression format from leading magic bytes
    ///
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00`
    /// - Zstd: `28 b5 2f fd`
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x1f, 0x8b]) {
            Self::Gzip
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Self::Xz
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Self::Zstd
        } else {
            Self::None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Create a decompressing reader for the given format
///
/// Gzip input is read as a multi-member stream, since apk files are several
/// gzip streams concatenated back to back.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(Box::new(MultiGzDecoder::new(reader))),
        CompressionFormat::Xz => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(reader).map_err(|e| CompressionError::DecoderCreation {
                format: "zstd",
                source: e,
            })?;
            Ok(Box::new(decoder))
        }
    }
}

/// Decompress a byte slice using the specified format
pub fn decompress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = create_decoder(data, format)?;
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| CompressionError::Decompression {
            format: format.name(),
            source: e,
        })?;
    Ok(output)
}

/// Decompress a byte slice, detecting the format from its magic bytes
pub fn decompress_auto(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    decompress(data, CompressionFormat::from_magic_bytes(data))
}

/// Compress a byte slice into the given format
pub fn compress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let wrap = |source: io::Error| CompressionError::Compression {
        format: format.name(),
        source,
    };

    match format {
        CompressionFormat::None => Ok(data.to_vec()),
        CompressionFormat::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).map_err(wrap)?;
            encoder.finish().map_err(wrap)
        }
        CompressionFormat::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data).map_err(wrap)?;
            encoder.finish().map_err(wrap)
        }
        CompressionFormat::Zstd => zstd::encode_all(data, 0).map_err(wrap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CompressionFormat::from_extension("control.tar.gz"), CompressionFormat::Gzip);
        assert_eq!(CompressionFormat::from_extension("control.tar.xz"), CompressionFormat::Xz);
        assert_eq!(CompressionFormat::from_extension("foo.pkg.tar.zst"), CompressionFormat::Zstd);
        assert_eq!(CompressionFormat::from_extension("control.tar"), CompressionFormat::None);
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x1f, 0x8b, 0x08, 0x00]),
            CompressionFormat::Gzip
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]),
            CompressionFormat::Xz
        );
        assert_eq!(
            CompressionFormat::from_magic_bytes(&[0x28, 0xb5, 0x2f, 0xfd]),
            CompressionFormat::Zstd
        );
        assert_eq!(CompressionFormat::from_magic_bytes(&[0x1f]), CompressionFormat::None);
    }

    #[test]
    fn test_compress_then_decompress_auto() {
        let data = b"Package: foo\nVersion: 1.0\n";
        for format in [CompressionFormat::Gzip, CompressionFormat::Xz, CompressionFormat::Zstd] {
            let packed = compress(data, format).unwrap();
            assert_eq!(CompressionFormat::from_magic_bytes(&packed), format);
            assert_eq!(decompress_auto(&packed).unwrap(), data);
        }
    }

    #[test]
    fn test_concatenated_gzip_members() {
        let mut joined = compress(b"first ", CompressionFormat::Gzip).unwrap();
        joined.extend(compress(b"second", CompressionFormat::Gzip).unwrap());
        assert_eq!(decompress(&joined, CompressionFormat::Gzip).unwrap(), b"first second");
    }
}
