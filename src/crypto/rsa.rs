//! Raw RSA signing using the rsa crate
//!
//! The PIV GENERAL AUTHENTICATE flow hands the card an already-padded
//! block, so the only operation needed here is plain modular
//! exponentiation with the private exponent.

use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use thiserror::Error;

/// RSA signing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("input is {got} bytes but the modulus is {expected} bytes")]
    InputLength { got: usize, expected: usize },
}

/// Raw RSA signature primitive
pub trait RsaRawSign {
    /// Compute `input^d mod n`
    ///
    /// The input must already carry any padding the verifier expects and
    /// must be exactly as long as the modulus; the signature comes back
    /// at the same length.
    fn raw_sign(&self, key: &RsaPrivateKey, input: &[u8]) -> Result<Vec<u8>, SignError>;
}

/// Modular exponentiation with the private exponent; adds no padding
#[derive(Debug, Clone, Copy, Default)]
pub struct ModPowSigner;

impl RsaRawSign for ModPowSigner {
    fn raw_sign(&self, key: &RsaPrivateKey, input: &[u8]) -> Result<Vec<u8>, SignError> {
        let modulus_len = key.size();
        if input.len() != modulus_len {
            return Err(SignError::InputLength {
                got: input.len(),
                expected: modulus_len,
            });
        }

        let m = BigUint::from_bytes_be(input);
        let signature = m.modpow(key.d(), key.n());

        // Left-pad to the modulus length
        let mut sig_bytes = signature.to_bytes_be();
        while sig_bytes.len() < modulus_len {
            sig_bytes.insert(0, 0);
        }

        Ok(sig_bytes)
    }
}
