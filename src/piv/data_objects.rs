//! PIV data objects
//!
//! The Cardholder Unique Identifier (CHUID) and Card Capability Container
//! (CCC) with their fixed encodings from NIST SP 800-73-4, Appendix A.
//! Both objects start empty, are filled with an operator- or
//! randomly-chosen identifier, and encode into the `53` data container.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::SecureRng;
use crate::tlv::{StringEncoding, TLVError, TLVReader, TLVWriter};

/// Outer tag wrapping every stored data object
pub const DATA_CONTAINER_TAG: u32 = 0x53;

/// FASC-N for a non-federal issuer
/// (S9999F9999F999999F0F1F0000000000300001E in BCD with parity)
pub const FASC_N: [u8; 25] = [
    0xD4, 0xE7, 0x39, 0xDA, 0x73, 0x9C, 0xED, 0x39, 0xCE, 0x73, 0x9D, 0x83, 0x68, 0x58, 0x21,
    0x08, 0x42, 0x10, 0x84, 0x21, 0xC8, 0x42, 0x10, 0xC3, 0xEB,
];

/// Fixed CHUID expiration date
pub const EXPIRATION_DATE: &str = "20300101";

/// GSC-IS registered application identifier prefixing the CCC card
/// identifier (RID + manufacturer 0xFF + card type javaCard)
pub const GSC_RID: [u8; 7] = [0xA0, 0x00, 0x00, 0x01, 0x16, 0xFF, 0x02];

// CHUID member tags
const TAG_FASC_N: u32 = 0x30;
const TAG_GUID: u32 = 0x34;
const TAG_EXPIRATION: u32 = 0x35;
const TAG_ISSUER_SIGNATURE: u32 = 0x3E;
const TAG_LRC: u32 = 0xFE;

// CCC member tags, in container order
const TAG_CARD_IDENTIFIER: u32 = 0xF0;
const TAG_CONTAINER_VERSION: u32 = 0xF1;
const TAG_GRAMMAR_VERSION: u32 = 0xF2;
const TAG_APPS_URL: u32 = 0xF3;
const TAG_PKCS15_VERSION: u32 = 0xF4;
const TAG_DATA_MODEL: u32 = 0xF5;
const CCC_EMPTY_TAGS: [u32; 7] = [0xF6, 0xF7, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE];

/// Common surface of the stored PIV data objects
pub trait PIVDataObject {
    /// True until the mutable identifier has been set
    fn is_empty(&self) -> bool;

    /// Tag the object is stored under
    fn data_tag(&self) -> u32;

    /// Tag assigned to this object by the PIV data model
    fn defined_data_tag(&self) -> u32;

    /// Relocate the object to an alternate tag
    ///
    /// Alternate tags must lie in 0x005F0000-0x005FFFFF outside the
    /// defined PIV and Yubico vendor ranges, or equal the defined tag.
    fn set_data_tag(&mut self, tag: u32) -> Result<(), TLVError>;

    /// Serialize the object into its `53` container
    fn encode(&self) -> Result<Vec<u8>, TLVError>;

    /// Replace the object's contents from an encoded container
    ///
    /// Every fixed field is verified exactly; on any deviation the object
    /// is left empty and `false` is returned.
    fn try_decode(&mut self, data: &[u8]) -> bool;
}

/// Validate an alternate storage tag
fn validate_data_tag(tag: u32, defined_tag: u32) -> Result<(), TLVError> {
    if tag == defined_tag {
        return Ok(());
    }
    if !(0x005F_0000..=0x005F_FFFF).contains(&tag) {
        return Err(TLVError::InvalidDataTag);
    }
    // Defined PIV objects and the Yubico vendor range are not assignable
    if (0x005F_C101..=0x005F_C123).contains(&tag) {
        return Err(TLVError::InvalidDataTag);
    }
    if (0x005F_FF00..=0x005F_FF15).contains(&tag) {
        return Err(TLVError::InvalidDataTag);
    }
    Ok(())
}

/// Cardholder Unique Identifier
///
/// Carries the fixed FASC-N and expiration date plus a 16-byte GUID; the
/// issuer signature and LRC are always empty. The GUID is zeroized on
/// drop.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CHUID {
    data_tag: u32,
    guid: Option<[u8; Self::GUID_LEN]>,
}

impl CHUID {
    /// Tag assigned to the CHUID by the PIV data model
    pub const DEFINED_DATA_TAG: u32 = 0x005F_C102;

    /// GUID size in bytes
    pub const GUID_LEN: usize = 16;

    /// Create an empty CHUID stored under its defined tag
    pub fn new() -> Self {
        Self {
            data_tag: Self::DEFINED_DATA_TAG,
            guid: None,
        }
    }

    /// Current GUID, if one has been set
    pub fn guid(&self) -> Option<&[u8]> {
        self.guid.as_ref().map(|g| g.as_slice())
    }

    /// Set the GUID; must be exactly 16 bytes
    pub fn set_guid(&mut self, guid: &[u8]) -> Result<(), TLVError> {
        if guid.len() != Self::GUID_LEN {
            return Err(TLVError::UnexpectedEncoding);
        }
        let mut value = [0u8; Self::GUID_LEN];
        value.copy_from_slice(guid);
        self.guid = Some(value);
        Ok(())
    }

    /// Fill the GUID from the given RNG
    pub fn set_random_guid(&mut self, rng: &mut dyn SecureRng) {
        let mut value = [0u8; Self::GUID_LEN];
        rng.fill_bytes(&mut value);
        self.guid = Some(value);
    }

    fn decode_guid(data: &[u8]) -> Result<[u8; Self::GUID_LEN], TLVError> {
        let mut outer = TLVReader::new(data);
        let mut chuid = outer.read_nested(DATA_CONTAINER_TAG)?;

        let fascn = chuid.read_value(TAG_FASC_N)?;
        if fascn != FASC_N {
            return Err(TLVError::UnexpectedEncoding);
        }

        let guid = chuid.read_value(TAG_GUID)?;
        if guid.len() != Self::GUID_LEN {
            return Err(TLVError::UnexpectedEncoding);
        }

        let expiration = chuid.read_string(TAG_EXPIRATION, StringEncoding::Ascii)?;
        if expiration != EXPIRATION_DATE {
            return Err(TLVError::UnexpectedEncoding);
        }

        if !chuid.read_value(TAG_ISSUER_SIGNATURE)?.is_empty() {
            return Err(TLVError::UnexpectedEncoding);
        }
        if !chuid.read_value(TAG_LRC)?.is_empty() {
            return Err(TLVError::UnexpectedEncoding);
        }
        if chuid.has_data() || outer.has_data() {
            return Err(TLVError::UnexpectedEncoding);
        }

        let mut value = [0u8; Self::GUID_LEN];
        value.copy_from_slice(guid);
        Ok(value)
    }
}

impl Default for CHUID {
    fn default() -> Self {
        Self::new()
    }
}

impl PIVDataObject for CHUID {
    fn is_empty(&self) -> bool {
        self.guid.is_none()
    }

    fn data_tag(&self) -> u32 {
        self.data_tag
    }

    fn defined_data_tag(&self) -> u32 {
        Self::DEFINED_DATA_TAG
    }

    fn set_data_tag(&mut self, tag: u32) -> Result<(), TLVError> {
        validate_data_tag(tag, Self::DEFINED_DATA_TAG)?;
        self.data_tag = tag;
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, TLVError> {
        let guid = match &self.guid {
            Some(guid) => guid,
            None => return Ok(vec![0x53, 0x00]),
        };

        let mut writer = TLVWriter::new();
        let mut chuid = writer.nested(DATA_CONTAINER_TAG)?;
        chuid.write_value(TAG_FASC_N, &FASC_N)?;
        chuid.write_value(TAG_GUID, guid)?;
        chuid.write_string(TAG_EXPIRATION, EXPIRATION_DATE, StringEncoding::Ascii)?;
        chuid.write_value(TAG_ISSUER_SIGNATURE, &[])?;
        chuid.write_value(TAG_LRC, &[])?;
        chuid.close()?;
        writer.encode()
    }

    fn try_decode(&mut self, data: &[u8]) -> bool {
        match Self::decode_guid(data) {
            Ok(guid) => {
                self.guid = Some(guid);
                true
            }
            Err(_) => {
                self.guid = None;
                false
            }
        }
    }
}

/// Card Capability Container
///
/// A fixed capability grammar around a 14-byte card identifier. The
/// identifier is zeroized on drop.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CCC {
    data_tag: u32,
    card_id: Option<[u8; Self::CARD_ID_LEN]>,
}

impl CCC {
    /// Tag assigned to the CCC by the PIV data model
    pub const DEFINED_DATA_TAG: u32 = 0x005F_C107;

    /// Card identifier size in bytes
    pub const CARD_ID_LEN: usize = 14;

    /// Create an empty CCC stored under its defined tag
    pub fn new() -> Self {
        Self {
            data_tag: Self::DEFINED_DATA_TAG,
            card_id: None,
        }
    }

    /// Current card identifier, if one has been set
    pub fn card_id(&self) -> Option<&[u8]> {
        self.card_id.as_ref().map(|id| id.as_slice())
    }

    /// Set the card identifier; must be exactly 14 bytes
    pub fn set_card_id(&mut self, card_id: &[u8]) -> Result<(), TLVError> {
        if card_id.len() != Self::CARD_ID_LEN {
            return Err(TLVError::UnexpectedEncoding);
        }
        let mut value = [0u8; Self::CARD_ID_LEN];
        value.copy_from_slice(card_id);
        self.card_id = Some(value);
        Ok(())
    }

    /// Fill the card identifier from the given RNG
    pub fn set_random_card_id(&mut self, rng: &mut dyn SecureRng) {
        let mut value = [0u8; Self::CARD_ID_LEN];
        rng.fill_bytes(&mut value);
        self.card_id = Some(value);
    }

    fn decode_card_id(data: &[u8]) -> Result<[u8; Self::CARD_ID_LEN], TLVError> {
        let mut outer = TLVReader::new(data);
        let mut ccc = outer.read_nested(DATA_CONTAINER_TAG)?;

        let identifier = ccc.read_value(TAG_CARD_IDENTIFIER)?;
        if identifier.len() != GSC_RID.len() + Self::CARD_ID_LEN
            || identifier[..GSC_RID.len()] != GSC_RID
        {
            return Err(TLVError::UnexpectedEncoding);
        }

        if ccc.read_byte(TAG_CONTAINER_VERSION)? != 0x21 {
            return Err(TLVError::UnexpectedEncoding);
        }
        if ccc.read_byte(TAG_GRAMMAR_VERSION)? != 0x21 {
            return Err(TLVError::UnexpectedEncoding);
        }
        if !ccc.read_value(TAG_APPS_URL)?.is_empty() {
            return Err(TLVError::UnexpectedEncoding);
        }
        if ccc.read_byte(TAG_PKCS15_VERSION)? != 0x00 {
            return Err(TLVError::UnexpectedEncoding);
        }
        if ccc.read_byte(TAG_DATA_MODEL)? != 0x10 {
            return Err(TLVError::UnexpectedEncoding);
        }
        for tag in CCC_EMPTY_TAGS {
            if !ccc.read_value(tag)?.is_empty() {
                return Err(TLVError::UnexpectedEncoding);
            }
        }
        if ccc.has_data() || outer.has_data() {
            return Err(TLVError::UnexpectedEncoding);
        }

        let mut value = [0u8; Self::CARD_ID_LEN];
        value.copy_from_slice(&identifier[GSC_RID.len()..]);
        Ok(value)
    }
}

impl Default for CCC {
    fn default() -> Self {
        Self::new()
    }
}

impl PIVDataObject for CCC {
    fn is_empty(&self) -> bool {
        self.card_id.is_none()
    }

    fn data_tag(&self) -> u32 {
        self.data_tag
    }

    fn defined_data_tag(&self) -> u32 {
        Self::DEFINED_DATA_TAG
    }

    fn set_data_tag(&mut self, tag: u32) -> Result<(), TLVError> {
        validate_data_tag(tag, Self::DEFINED_DATA_TAG)?;
        self.data_tag = tag;
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, TLVError> {
        let card_id = match &self.card_id {
            Some(card_id) => card_id,
            None => return Ok(vec![0x53, 0x00]),
        };

        let mut identifier = [0u8; GSC_RID.len() + Self::CARD_ID_LEN];
        identifier[..GSC_RID.len()].copy_from_slice(&GSC_RID);
        identifier[GSC_RID.len()..].copy_from_slice(card_id);

        let mut writer = TLVWriter::new();
        let mut ccc = writer.nested(DATA_CONTAINER_TAG)?;
        ccc.write_value(TAG_CARD_IDENTIFIER, &identifier)?;
        ccc.write_byte(TAG_CONTAINER_VERSION, 0x21)?;
        ccc.write_byte(TAG_GRAMMAR_VERSION, 0x21)?;
        ccc.write_value(TAG_APPS_URL, &[])?;
        ccc.write_byte(TAG_PKCS15_VERSION, 0x00)?;
        ccc.write_byte(TAG_DATA_MODEL, 0x10)?;
        for tag in CCC_EMPTY_TAGS {
            ccc.write_value(tag, &[])?;
        }
        ccc.close()?;
        let encoded = writer.encode();
        identifier.zeroize();
        encoded
    }

    fn try_decode(&mut self, data: &[u8]) -> bool {
        match Self::decode_card_id(data) {
            Ok(card_id) => {
                self.card_id = Some(card_id);
                true
            }
            Err(_) => {
                self.card_id = None;
                false
            }
        }
    }
}
