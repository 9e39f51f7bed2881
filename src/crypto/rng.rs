//! Random number generation
//!
//! The card handler draws card identifiers (GUID, CardID) through this
//! trait so the entropy source is injected rather than process-global.

use rand::rngs::OsRng;
use rand::RngCore;

/// A source of cryptographically secure random bytes
pub trait SecureRng {
    /// Fill `dest` with random bytes
    fn fill_bytes(&mut self, dest: &mut [u8]);
}

/// OS entropy via `rand`'s `OsRng`
///
/// May block briefly while the OS gathers entropy, never for I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecureRng;

impl SecureRng for OsSecureRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_bytes() {
        let mut rng = OsSecureRng;
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        rng.fill_bytes(&mut first);
        rng.fill_bytes(&mut second);
        assert_ne!(first, second);
    }
}
