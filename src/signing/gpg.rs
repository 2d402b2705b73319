// src/signing/gpg.rs

//! OpenPGP signing for Debian, RPM and pacman metadata
//!
//! Uses sequoia-openpgp (pure Rust). The key file may be an armored or binary
//! secret keyring; the first certificate in it is used.

use crate::error::{Error, Result};
use openpgp::armor;
use openpgp::cert::{Cert, CertParser};
use openpgp::crypto::{KeyPair, Password};
use openpgp::packet::key::{SecretParts, UnspecifiedRole};
use openpgp::packet::Key;
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, Message, Signer};
use openpgp::serialize::SerializeInto;
use openpgp::types::HashAlgorithm;
use sequoia_openpgp as openpgp;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Shape of the signature produced by [`GpgSigner::sign`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Cleartext,
    ArmoredDetached,
    BinaryDetached,
}

/// Loaded OpenPGP certificate and its unlocked signing key
pub struct GpgSigner {
    cert: Cert,
    signing_key: Key<SecretParts, UnspecifiedRole>,
}

impl std::fmt::Debug for GpgSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpgSigner")
            .field("fingerprint", &self.cert.fingerprint().to_string())
            .field("signing_key", &self.signing_key.fingerprint().to_string())
            .finish()
    }
}

impl GpgSigner {
    /// Load a secret key file, decrypting the signing key with `passphrase` when needed
    pub fn load(path: &Path, passphrase: Option<&str>) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            Error::SigningError(format!("Failed to read GPG key {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&data, passphrase)
            .map_err(|e| Error::SigningError(format!("{}: {}", path.display(), e)))
    }

    /// Parse key material already in memory
    pub fn from_bytes(data: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let cert = CertParser::from_bytes(data)
            .map_err(|e| Error::SigningError(format!("Failed to parse GPG key: {}", e)))?
            .next()
            .ok_or_else(|| Error::SigningError("No certificate found in GPG key".to_string()))?
            .map_err(|e| Error::SigningError(format!("Failed to parse GPG key: {}", e)))?;

        let policy = StandardPolicy::new();
        let key = cert
            .keys()
            .secret()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_signing()
            .next()
            .map(|ka| ka.key().clone())
            .ok_or_else(|| {
                Error::SigningError(format!(
                    "Certificate {} has no usable secret signing key",
                    cert.fingerprint()
                ))
            })?;

        let signing_key = if key.secret().is_encrypted() {
            let passphrase = passphrase.ok_or_else(|| {
                Error::SigningError(format!(
                    "Signing key {} is encrypted and no passphrase was given",
                    key.fingerprint()
                ))
            })?;
            key.decrypt_secret(&Password::from(passphrase)).map_err(|e| {
                Error::SigningError(format!("Failed to decrypt GPG key: {}", e))
            })?
        } else {
            key
        };

        info!(
            "Loaded GPG signing key {} (certificate {})",
            signing_key.fingerprint(),
            cert.fingerprint()
        );

        Ok(Self { cert, signing_key })
    }

    /// Fingerprint of the certificate
    pub fn fingerprint(&self) -> String {
        self.cert.fingerprint().to_string()
    }

    /// Cleartext-signed message (`InRelease`)
    pub fn sign_cleartext(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign(data, Output::Cleartext)
    }

    /// Armored detached signature (`Release.gpg`, `repomd.xml.asc`)
    pub fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign(data, Output::ArmoredDetached)
    }

    /// Binary detached signature (pacman `.sig`)
    pub fn sign_detached_binary(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign(data, Output::BinaryDetached)
    }

    /// Binary detached signature over a file, streamed from disk
    pub fn sign_detached_binary_file(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path).map_err(|e| Error::file_op(path, e))?;
        self.sign_reader(file, Output::BinaryDetached)
            .map_err(|e| match e {
                Error::Io(source) => Error::file_op(path, source),
                other => other,
            })
    }

    /// ASCII-armored public certificate
    pub fn public_key(&self) -> Result<Vec<u8>> {
        self.cert
            .armored()
            .to_vec()
            .map_err(|e| Error::SigningError(format!("Failed to export public key: {}", e)))
    }

    fn keypair(&self) -> Result<KeyPair> {
        self.signing_key
            .clone()
            .into_keypair()
            .map_err(|e| Error::SigningError(format!("Signing key unusable: {}", e)))
    }

    fn sign(&self, data: &[u8], output: Output) -> Result<Vec<u8>> {
        self.sign_reader(data, output)
    }

    fn sign_reader<R: Read>(&self, mut reader: R, output: Output) -> Result<Vec<u8>> {
        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let message = match output {
                Output::ArmoredDetached => Armorer::new(message)
                    .kind(armor::Kind::Signature)
                    .build()
                    .map_err(signing_error)?,
                Output::Cleartext | Output::BinaryDetached => message,
            };

            let signer = Signer::new(message, self.keypair()?)
                .hash_algo(HashAlgorithm::SHA512)
                .map_err(signing_error)?;
            let signer = match output {
                Output::Cleartext => signer.cleartext(),
                Output::ArmoredDetached | Output::BinaryDetached => signer.detached(),
            };
            let mut signer = signer.build().map_err(signing_error)?;

            io::copy(&mut reader, &mut signer)?;
            signer.flush()?;
            signer.finalize().map_err(signing_error)?;
        }

        debug!("Produced {:?} signature ({} bytes)", output, sink.len());
        Ok(sink)
    }
}

fn signing_error(e: anyhow::Error) -> Error {
    Error::SigningError(format!("OpenPGP signing failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpgp::cert::CertBuilder;
    use openpgp::{Packet, PacketPile};

    fn generate_key(passphrase: Option<&str>) -> (Cert, Vec<u8>) {
        let mut builder = CertBuilder::new()
            .add_userid("Repo Signing <repo@example.com>")
            .add_signing_subkey();
        if let Some(p) = passphrase {
            builder = builder.set_password(Some(Password::from(p)));
        }
        let (cert, _) = builder.generate().unwrap();
        let tsk = cert.as_tsk().armored().to_vec().unwrap();
        (cert, tsk)
    }

    fn verifies(cert: &Cert, signature: &[u8], data: &[u8]) -> bool {
        let policy = StandardPolicy::new();
        let pile = PacketPile::from_bytes(signature).unwrap();
        pile.descendants().any(|packet| match packet {
            Packet::Signature(sig) => cert
                .keys()
                .with_policy(&policy, None)
                .for_signing()
                .any(|ka| sig.clone().verify_message(ka.key(), data).is_ok()),
            _ => false,
        })
    }

    #[test]
    fn test_armored_detached_signature_verifies() {
        let (cert, tsk) = generate_key(None);
        let signer = GpgSigner::from_bytes(&tsk, None).unwrap();

        let sig = signer.sign_detached(b"Origin: test\n").unwrap();
        let text = String::from_utf8(sig.clone()).unwrap();
        assert!(text.starts_with("-----BEGIN PGP SIGNATURE-----"));
        assert!(verifies(&cert, &sig, b"Origin: test\n"));
        assert!(!verifies(&cert, &sig, b"Origin: tampered\n"));
    }

    #[test]
    fn test_cleartext_signature_layout() {
        let (_, tsk) = generate_key(None);
        let signer = GpgSigner::from_bytes(&tsk, None).unwrap();

        let signed = signer.sign_cleartext(b"Origin: test\nSuite: stable\n").unwrap();
        let text = String::from_utf8(signed).unwrap();
        assert!(text.starts_with("-----BEGIN PGP SIGNED MESSAGE-----"));
        assert!(text.contains("Hash: SHA512"));
        assert!(text.contains("Suite: stable"));
        assert!(text.contains("-----BEGIN PGP SIGNATURE-----"));
    }

    #[test]
    fn test_binary_file_signature() {
        let (cert, tsk) = generate_key(None);
        let signer = GpgSigner::from_bytes(&tsk, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.pkg.tar.zst");
        fs::write(&path, b"package bytes").unwrap();

        let sig = signer.sign_detached_binary_file(&path).unwrap();
        assert!(!sig.starts_with(b"-----"));
        assert!(verifies(&cert, &sig, b"package bytes"));

        let in_memory = signer.sign_detached_binary(b"package bytes").unwrap();
        assert!(verifies(&cert, &in_memory, b"package bytes"));
    }

    #[test]
    fn test_encrypted_key_needs_passphrase() {
        let (_, tsk) = generate_key(Some("hunter2"));

        assert!(matches!(
            GpgSigner::from_bytes(&tsk, None),
            Err(Error::SigningError(_))
        ));
        assert!(GpgSigner::from_bytes(&tsk, Some("wrong")).is_err());

        let signer = GpgSigner::from_bytes(&tsk, Some("hunter2")).unwrap();
        assert!(!signer.sign_detached(b"data").unwrap().is_empty());
    }

    #[test]
    fn test_public_key_export() {
        let (cert, tsk) = generate_key(None);
        let signer = GpgSigner::from_bytes(&tsk, None).unwrap();

        let public = String::from_utf8(signer.public_key().unwrap()).unwrap();
        assert!(public.contains("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
        assert!(!public.contains("PRIVATE KEY"));
        assert_eq!(signer.fingerprint(), cert.fingerprint().to_string());
    }

    #[test]
    fn test_public_only_key_rejected() {
        let (cert, _) = generate_key(None);
        let public = cert.armored().to_vec().unwrap();
        assert!(matches!(
            GpgSigner::from_bytes(&public, None),
            Err(Error::SigningError(_))
        ));
    }

    #[test]
    fn test_missing_key_file() {
        let result = GpgSigner::load(Path::new("/nonexistent/key.asc"), None);
        assert!(matches!(result, Err(Error::SigningError(_))));
    }
}
