//! APDU (Application Protocol Data Unit) handling
//!
//! Parses incoming ISO 7816-4 command APDUs in both short and extended
//! form and serializes outgoing ones. Response APDUs live in the
//! `response` submodule, status words in `status`.
//!
//! # Example
//! ```ignore
//! use pivert::apdu::{parse_apdu, APDUEncoding};
//!
//! let raw = &[0x00, 0xA4, 0x04, 0x00, 0x06, 0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, 0xA4);
//! let bytes = apdu.encode(APDUEncoding::Automatic).unwrap();
//! assert_eq!(bytes.as_slice(), raw);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Sentinel expected-response length meaning "as much as the chosen
/// encoding allows": 256 under short form, 65 536 under extended
pub const LE_MAX: u32 = u32::MAX;

/// Errors that can occur while parsing or serializing APDUs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Invalid APDU length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,

    #[error("Nc or Ne does not fit the requested encoding")]
    NoValidEncoding,
}

/// Encoding selector for serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum APDUEncoding {
    /// Short when Nc and Ne both fit, extended otherwise
    Automatic,
    /// One-byte Lc and Le (Nc ≤ 255, Ne ≤ 256)
    Short,
    /// Three-byte Lc and two/three-byte Le (Nc, Ne ≤ 65 536)
    Extended,
}

/// A parsed command APDU
///
/// `le` is the expected response length Ne: `None` when the command
/// expects no response data, `Some(LE_MAX)` for "maximum".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: None,
        }
    }

    /// Check if this is a chained APDU (CLA bit 0x10 set)
    pub fn is_chained(&self) -> bool {
        (self.cla & 0x10) != 0
    }

    /// True when both Nc and Ne fit the short encoding
    pub fn is_short(&self) -> bool {
        self.data.len() <= 255 && resolve_le(self.le, 256).map_or(true, |ne| ne <= 256)
    }

    /// Serialize the command under the requested encoding
    pub fn encode(&self, encoding: APDUEncoding) -> Result<Vec<u8>, APDUError> {
        match encoding {
            APDUEncoding::Short => self.encode_short(),
            APDUEncoding::Extended => self.encode_extended(),
            APDUEncoding::Automatic => {
                if self.is_short() {
                    self.encode_short()
                } else {
                    self.encode_extended()
                }
            }
        }
    }

    fn encode_short(&self) -> Result<Vec<u8>, APDUError> {
        let nc = self.data.len();
        if nc > 255 {
            return Err(APDUError::NoValidEncoding);
        }
        let le = resolve_le(self.le, 256);
        if let Some(ne) = le {
            if ne == 0 || ne > 256 {
                return Err(APDUError::NoValidEncoding);
            }
        }

        let mut out = Vec::with_capacity(4 + 1 + nc + 1);
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if nc > 0 {
            out.push(nc as u8);
            out.extend_from_slice(&self.data);
        }
        if let Some(ne) = le {
            // 256 is encoded as 0x00
            out.push(if ne == 256 { 0 } else { ne as u8 });
        }
        Ok(out)
    }

    fn encode_extended(&self) -> Result<Vec<u8>, APDUError> {
        let nc = self.data.len();
        if nc > 65536 {
            return Err(APDUError::NoValidEncoding);
        }
        let le = resolve_le(self.le, 65536);
        if let Some(ne) = le {
            if ne == 0 || ne > 65536 {
                return Err(APDUError::NoValidEncoding);
            }
        }

        let mut out = Vec::with_capacity(4 + 3 + nc + 3);
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2]);
        if nc > 0 {
            // 65 536 is encoded as 0x00 0x00
            let word = if nc == 65536 { 0 } else { nc as u16 };
            out.push(0x00);
            out.extend_from_slice(&word.to_be_bytes());
            out.extend_from_slice(&self.data);
        }
        if let Some(ne) = le {
            if nc == 0 {
                out.push(0x00);
            }
            let word = if ne == 65536 { 0 } else { ne as u16 };
            out.extend_from_slice(&word.to_be_bytes());
        }
        Ok(out)
    }
}

/// Resolve the `LE_MAX` sentinel against an encoding's ceiling
fn resolve_le(le: Option<u32>, max: u32) -> Option<u32> {
    le.map(|ne| if ne == LE_MAX { max } else { ne })
}

/// Parse raw bytes into an APDU
///
/// Supports both short and extended formats:
/// - Short: CLA INS P1 P2 \[Lc Data\] \[Le\]
/// - Extended: CLA INS P1 P2 00 Lc1 Lc2 Data \[Le1 Le2\]
///
/// A short Le of 0x00 decodes as 256; an extended Lc or Le word of
/// 0x0000 decodes as 65 536.
pub fn parse_apdu(data: &[u8]) -> Result<APDU, APDUError> {
    if data.len() < 4 {
        return Err(APDUError::TooShort(data.len()));
    }

    let cla = data[0];
    let ins = data[1];
    let p1 = data[2];
    let p2 = data[3];

    // Case 1: CLA INS P1 P2 (no data, no Le)
    if data.len() == 4 {
        return Ok(APDU::new(cla, ins, p1, p2));
    }

    let body = &data[4..];

    // A leading 0x00 with at least two length bytes marks the extended
    // form; a lone trailing byte is always a short Le.
    if body[0] == 0x00 && body.len() > 2 {
        parse_extended_apdu(cla, ins, p1, p2, &body[1..])
    } else {
        parse_short_apdu(cla, ins, p1, p2, body)
    }
}

/// Parse short format body (Lc/Le up to one byte each)
fn parse_short_apdu(cla: u8, ins: u8, p1: u8, p2: u8, body: &[u8]) -> Result<APDU, APDUError> {
    let first = body[0];

    // Case 2: only Le - 0x00 means 256
    if body.len() == 1 {
        let le = if first == 0 { 256 } else { u32::from(first) };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: Some(le),
        });
    }

    let lc = first as usize;

    // Case 3: Lc + Data (no Le)
    if body.len() == 1 + lc {
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: body[1..1 + lc].to_vec(),
            le: None,
        });
    }

    // Case 4: Lc + Data + Le
    if body.len() == 1 + lc + 1 {
        let le_byte = body[1 + lc];
        let le = if le_byte == 0 { 256 } else { u32::from(le_byte) };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: body[1..1 + lc].to_vec(),
            le: Some(le),
        });
    }

    Err(APDUError::InvalidLength)
}

/// Parse extended format body, starting after the 0x00 marker
fn parse_extended_apdu(cla: u8, ins: u8, p1: u8, p2: u8, ext: &[u8]) -> Result<APDU, APDUError> {
    if ext.len() < 2 {
        return Err(APDUError::InvalidExtendedFormat);
    }

    let first_word = (usize::from(ext[0]) << 8) | usize::from(ext[1]);

    // Case 2E: only extended Le - 0x0000 means 65 536
    if ext.len() == 2 {
        let le = if first_word == 0 {
            65536
        } else {
            first_word as u32
        };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: Some(le),
        });
    }

    // first_word is Lc; 0x0000 with data present means 65 536
    let lc = if first_word == 0 { 65536 } else { first_word };

    if ext.len() < 2 + lc {
        return Err(APDUError::InvalidLength);
    }

    let cmd_data = ext[2..2 + lc].to_vec();

    // Case 3E: extended Lc + Data (no Le)
    if ext.len() == 2 + lc {
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: cmd_data,
            le: None,
        });
    }

    // Case 4E: extended Lc + Data + extended Le
    if ext.len() == 2 + lc + 2 {
        let le_word = (u32::from(ext[2 + lc]) << 8) | u32::from(ext[2 + lc + 1]);
        let le = if le_word == 0 { 65536 } else { le_word };
        return Ok(APDU {
            cla,
            ins,
            p1,
            p2,
            data: cmd_data,
            le: Some(le),
        });
    }

    Err(APDUError::InvalidExtendedFormat)
}

/// Instruction bytes understood by the PIV card handler
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const VERIFY: u8 = 0x20;
    pub const GENERAL_AUTHENTICATE: u8 = 0x87;
    pub const GET_RESPONSE: u8 = 0xC0;
    pub const GET_DATA: u8 = 0xCB;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case1_no_data_no_le() {
        let apdu = parse_apdu(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert_eq!(apdu.cla, 0x00);
        assert_eq!(apdu.ins, 0xA4);
        assert_eq!(apdu.p1, 0x04);
        assert_eq!(apdu.p2, 0x00);
        assert!(apdu.data.is_empty());
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case2_le_only() {
        let apdu = parse_apdu(&[0x00, 0xCB, 0x3F, 0xFF, 0x00]).unwrap();
        assert!(apdu.data.is_empty());
        assert_eq!(apdu.le, Some(256)); // 0x00 means 256

        let apdu = parse_apdu(&[0x00, 0xCB, 0x3F, 0xFF, 0x10]).unwrap();
        assert_eq!(apdu.le, Some(16));
    }

    #[test]
    fn test_case3_lc_data() {
        let apdu =
            parse_apdu(&[0x00, 0x20, 0x00, 0x80, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36])
                .unwrap();
        assert_eq!(apdu.ins, 0x20);
        assert_eq!(apdu.data, vec![0x31, 0x32, 0x33, 0x34, 0x35, 0x36]);
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_case4_lc_data_le() {
        let apdu = parse_apdu(&[
            0x00, 0xA4, 0x04, 0x00, 0x06, 0xD2, 0x76, 0x00, 0x01, 0x24, 0x01, 0x00,
        ])
        .unwrap();
        assert_eq!(apdu.data, vec![0xD2, 0x76, 0x00, 0x01, 0x24, 0x01]);
        assert_eq!(apdu.le, Some(256));
    }

    #[test]
    fn test_extended_le_only() {
        let apdu = parse_apdu(&[0x00, 0xCB, 0x3F, 0xFF, 0x00, 0x00, 0x00]).unwrap();
        assert!(apdu.data.is_empty());
        assert_eq!(apdu.le, Some(65536));

        let apdu = parse_apdu(&[0x00, 0xCB, 0x3F, 0xFF, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(apdu.le, Some(256));
    }

    #[test]
    fn test_extended_lc_data() {
        let mut raw = vec![0x00, 0x87, 0x07, 0x9A, 0x00, 0x01, 0x04];
        raw.extend_from_slice(&[0xAA; 260]);
        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.data.len(), 260);
        assert!(apdu.le.is_none());
    }

    #[test]
    fn test_extended_lc_data_le() {
        let mut raw = vec![0x00, 0x87, 0x07, 0x9A, 0x00, 0x01, 0x04];
        raw.extend_from_slice(&[0xAA; 260]);
        raw.extend_from_slice(&[0x02, 0x00]);
        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.data.len(), 260);
        assert_eq!(apdu.le, Some(512));
    }

    #[test]
    fn test_extended_nc_65536() {
        let mut raw = vec![0x10, 0x87, 0x00, 0x00, 0x00, 0x00, 0x00];
        raw.extend_from_slice(&vec![0x55; 65536]);
        let apdu = parse_apdu(&raw).unwrap();
        assert_eq!(apdu.data.len(), 65536);
    }

    #[test]
    fn test_chained_command() {
        let apdu = parse_apdu(&[0x10, 0x87, 0x07, 0x9A, 0x04, 0x01, 0x02, 0x03, 0x04]).unwrap();
        assert!(apdu.is_chained());
        assert_eq!(apdu.cla, 0x10);
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            parse_apdu(&[0x00, 0xA4, 0x04]),
            Err(APDUError::TooShort(3))
        ));
    }

    #[test]
    fn test_inconsistent_length() {
        assert_eq!(
            parse_apdu(&[0x00, 0x20, 0x00, 0x80, 0x06, 0x31, 0x32]),
            Err(APDUError::InvalidLength)
        );
    }

    #[test]
    fn test_encode_short_forms() {
        let apdu = APDU::new(0x00, 0xA4, 0x04, 0x00);
        assert_eq!(
            apdu.encode(APDUEncoding::Short).unwrap(),
            vec![0x00, 0xA4, 0x04, 0x00]
        );

        let mut apdu = APDU::with_data(0x00, 0x20, 0x00, 0x80, vec![0x31, 0x32]);
        assert_eq!(
            apdu.encode(APDUEncoding::Short).unwrap(),
            vec![0x00, 0x20, 0x00, 0x80, 0x02, 0x31, 0x32]
        );

        apdu.le = Some(256);
        assert_eq!(
            apdu.encode(APDUEncoding::Short).unwrap(),
            vec![0x00, 0x20, 0x00, 0x80, 0x02, 0x31, 0x32, 0x00]
        );
    }

    #[test]
    fn test_encode_extended_forms() {
        let mut apdu = APDU::new(0x00, 0xCB, 0x3F, 0xFF);
        apdu.le = Some(65536);
        assert_eq!(
            apdu.encode(APDUEncoding::Extended).unwrap(),
            vec![0x00, 0xCB, 0x3F, 0xFF, 0x00, 0x00, 0x00]
        );

        let mut apdu = APDU::with_data(0x00, 0x87, 0x07, 0x9A, vec![0xAA; 300]);
        apdu.le = Some(512);
        let encoded = apdu.encode(APDUEncoding::Extended).unwrap();
        assert_eq!(&encoded[4..7], &[0x00, 0x01, 0x2C]);
        assert_eq!(&encoded[307..], &[0x02, 0x00]);
    }

    #[test]
    fn test_encode_automatic_selects_form() {
        let short = APDU::with_data(0x00, 0xA4, 0x04, 0x00, vec![0xAA; 255]);
        assert_eq!(short.encode(APDUEncoding::Automatic).unwrap().len(), 4 + 1 + 255);

        let extended = APDU::with_data(0x00, 0x87, 0x07, 0x9A, vec![0xAA; 256]);
        assert_eq!(
            extended.encode(APDUEncoding::Automatic).unwrap().len(),
            4 + 3 + 256
        );
    }

    #[test]
    fn test_encode_no_valid_encoding() {
        let apdu = APDU::with_data(0x00, 0x87, 0x07, 0x9A, vec![0xAA; 256]);
        assert_eq!(apdu.encode(APDUEncoding::Short), Err(APDUError::NoValidEncoding));

        let apdu = APDU::with_data(0x00, 0x87, 0x07, 0x9A, vec![0xAA; 65537]);
        assert_eq!(
            apdu.encode(APDUEncoding::Extended),
            Err(APDUError::NoValidEncoding)
        );
        assert_eq!(
            apdu.encode(APDUEncoding::Automatic),
            Err(APDUError::NoValidEncoding)
        );

        let mut apdu = APDU::new(0x00, 0xCB, 0x3F, 0xFF);
        apdu.le = Some(65537);
        assert_eq!(
            apdu.encode(APDUEncoding::Automatic),
            Err(APDUError::NoValidEncoding)
        );
    }

    #[test]
    fn test_le_max_resolves_per_encoding() {
        let mut apdu = APDU::new(0x00, 0xCB, 0x3F, 0xFF);
        apdu.le = Some(LE_MAX);
        assert_eq!(
            apdu.encode(APDUEncoding::Short).unwrap(),
            vec![0x00, 0xCB, 0x3F, 0xFF, 0x00]
        );
        assert_eq!(
            apdu.encode(APDUEncoding::Extended).unwrap(),
            vec![0x00, 0xCB, 0x3F, 0xFF, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_round_trip_grid() {
        // serialize-then-parse over the boundary values of Nc and Ne
        let nc_values = [0usize, 1, 255, 256, 65535, 65536];
        let ne_values = [None, Some(1u32), Some(256), Some(65536), Some(LE_MAX)];

        for &nc in &nc_values {
            for &ne in &ne_values {
                let apdu = APDU {
                    cla: 0x10,
                    ins: 0x87,
                    p1: 0x07,
                    p2: 0x9A,
                    data: vec![0x5A; nc],
                    le: ne,
                };
                let encoded = apdu.encode(APDUEncoding::Automatic).unwrap();
                let parsed = parse_apdu(&encoded).unwrap();

                assert_eq!(parsed.cla, apdu.cla);
                assert_eq!(parsed.ins, apdu.ins);
                assert_eq!(parsed.p1, apdu.p1);
                assert_eq!(parsed.p2, apdu.p2);
                assert_eq!(parsed.data, apdu.data);

                // the sentinel resolves to the ceiling of the chosen form
                let expected_le = match ne {
                    Some(LE_MAX) => {
                        if nc <= 255 {
                            Some(256)
                        } else {
                            Some(65536)
                        }
                    }
                    other => other,
                };
                assert_eq!(parsed.le, expected_le, "nc={} ne={:?}", nc, ne);
            }
        }
    }
}
