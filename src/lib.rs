//! pivert - a software emulation of a NIST SP 800-73 PIV smart card
//!
//! The emulator answers APDUs issued by a host smart-card stack through a
//! virtual reader, presenting an operator-supplied certificate and RSA
//! private key (from a PKCS#12 bundle) for smart-card logon and
//! challenge-response signing.
//!
//! Module map:
//! - [`tlv`] - BER-TLV reader and writer with DER length rules
//! - [`apdu`] - ISO 7816-4 command/response APDU codec
//! - [`piv`] - the card handler and the CHUID/CCC data objects
//! - [`card`] - the fixed ATR and the operator credential
//! - [`crypto`] - pluggable RNG and raw-RSA primitives
//! - [`reader`] - the framed virtual reader transport
//! - [`install`] - one-shot reader registration

pub mod apdu;
pub mod card;
pub mod crypto;
pub mod install;
pub mod piv;
pub mod reader;
pub mod tlv;
