//! Cryptographic primitives for the card handler
//!
//! Each primitive family sits behind a small trait so a consumer can swap
//! implementations; `CryptoConfig` enumerates the recognized options and
//! defaults to the platform-library implementations.

pub mod rng;
pub mod rsa;

pub use self::rng::{OsSecureRng, SecureRng};
pub use self::rsa::{ModPowSigner, RsaRawSign, SignError};

/// Recognized random number generators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RngImpl {
    /// OS entropy via `rand`'s `OsRng`
    #[default]
    OsRandom,
}

/// Recognized raw-RSA signing implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RsaSignImpl {
    /// Modular exponentiation with the private exponent, no padding
    #[default]
    ModPow,
}

/// Crypto selection for a card instance
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoConfig {
    pub rng: RngImpl,
    pub rsa: RsaSignImpl,
}

impl CryptoConfig {
    /// Instantiate the configured RNG
    pub fn build_rng(&self) -> Box<dyn SecureRng> {
        match self.rng {
            RngImpl::OsRandom => Box::new(OsSecureRng),
        }
    }

    /// Instantiate the configured signer
    pub fn build_signer(&self) -> Box<dyn RsaRawSign> {
        match self.rsa {
            RsaSignImpl::ModPow => Box::new(ModPowSigner),
        }
    }
}
