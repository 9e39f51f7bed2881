//! Emulated-card fixtures
//!
//! The fixed ATR the card presents on reset and the operator credential
//! (certificate plus RSA private key) it exposes.

pub mod atr;
pub mod credential;

pub use atr::PIV_ATR;
pub use credential::{Credential, CredentialError};
