//! PIV (Personal Identity Verification) card emulation
//!
//! Implements the card side of NIST SP 800-73-4 for the subset a host
//! needs for smart-card logon: application selection, PIN verification,
//! data-object retrieval, and RSA challenge signing with command and
//! response chaining.

pub mod card;
pub mod data_objects;

pub use card::PIVCard;
pub use data_objects::{PIVDataObject, CCC, CHUID};

/// TLV tags used by the PIV command set
pub mod tags {
    // SELECT application property template
    pub const APPLICATION_PROPERTY_TEMPLATE: u32 = 0x61;
    pub const APPLICATION_IDENTIFIER: u32 = 0x4F;
    pub const TAG_ALLOCATION_AUTHORITY: u32 = 0x79;
    pub const APPLICATION_LABEL: u32 = 0x50;
    pub const SUPPORTED_ALGORITHMS: u32 = 0xAC;
    pub const ALGORITHM_IDENTIFIER: u32 = 0x80;
    pub const OBJECT_IDENTIFIER: u32 = 0x06;

    // GET DATA
    pub const TAG_LIST: u32 = 0x5C;
    pub const DATA_CONTAINER: u32 = 0x53;
    pub const CERTIFICATE: u32 = 0x70;
    pub const CERT_INFO: u32 = 0x71;
    pub const ERROR_DETECTION_CODE: u32 = 0xFE;

    // Discovery object
    pub const DISCOVERY_OBJECT: u32 = 0x7E;
    pub const PIN_USAGE_POLICY: u32 = 0x5F2F;

    // GENERAL AUTHENTICATE dynamic authentication template
    pub const DYNAMIC_AUTH_TEMPLATE: u32 = 0x7C;
    pub const AUTH_CHALLENGE: u32 = 0x81;
    pub const AUTH_RESPONSE: u32 = 0x82;
}
