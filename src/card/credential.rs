//! Operator credential
//!
//! The certificate and RSA private key the emulated card exposes, loaded
//! once from a PKCS#12 bundle and read-only afterwards. OpenSSL only
//! parses the bundle; the key material is converted to `rsa` crate
//! components so signing never touches the file again.

use std::fs;
use std::path::Path;

use log::info;
use openssl::pkcs12::Pkcs12;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey};
use thiserror::Error;

/// Errors raised while loading the operator credential
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read PKCS#12 file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse PKCS#12 bundle: {0}")]
    Parse(#[from] openssl::error::ErrorStack),

    #[error("PKCS#12 bundle does not contain a certificate")]
    MissingCertificate,

    #[error("PKCS#12 bundle does not contain a private key")]
    MissingKey,

    #[error("private key is not an RSA key with both prime factors")]
    NotRsa,

    #[error("RSA key components were rejected: {0}")]
    InvalidKey(#[from] rsa::Error),
}

/// The certificate and private key the card presents
///
/// Owned by the card handler for the life of the process and never
/// mutated after load.
pub struct Credential {
    certificate: Vec<u8>,
    key: RsaPrivateKey,
}

impl Credential {
    /// Wrap an already-parsed certificate and key
    pub fn new(certificate: Vec<u8>, key: RsaPrivateKey) -> Self {
        Self { certificate, key }
    }

    /// Load a credential from a PKCS#12 (.pfx) bundle
    pub fn from_pkcs12(path: &Path, password: &str) -> Result<Self, CredentialError> {
        let bundle = fs::read(path)?;
        let parsed = Pkcs12::from_der(&bundle)?.parse2(password)?;

        let cert = parsed.cert.ok_or(CredentialError::MissingCertificate)?;
        let pkey = parsed.pkey.ok_or(CredentialError::MissingKey)?;
        let rsa_key = pkey.rsa().map_err(|_| CredentialError::NotRsa)?;

        let n = BigUint::from_bytes_be(&rsa_key.n().to_vec());
        let e = BigUint::from_bytes_be(&rsa_key.e().to_vec());
        let d = BigUint::from_bytes_be(&rsa_key.d().to_vec());
        let (p, q) = match (rsa_key.p(), rsa_key.q()) {
            (Some(p), Some(q)) => (
                BigUint::from_bytes_be(&p.to_vec()),
                BigUint::from_bytes_be(&q.to_vec()),
            ),
            _ => return Err(CredentialError::NotRsa),
        };

        let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])?;
        let certificate = cert.to_der()?;

        info!(
            "loaded credential: {}-byte certificate, {}-bit RSA key",
            certificate.len(),
            key.size() * 8
        );
        Ok(Self::new(certificate, key))
    }

    /// DER-encoded X.509 certificate
    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// RSA private key
    pub fn key(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// Modulus length in bytes; raw signatures are exactly this long
    pub fn modulus_len(&self) -> usize {
        self.key.size()
    }
}
