//! PIV card handler
//!
//! The APDU dispatcher for the emulated card. Holds the operator
//! credential, the CHUID and CCC, and the per-session chaining buffers,
//! and reduces every failure to a status word: nothing in here ever
//! propagates an error to the transport.

use log::{debug, info, warn};

use crate::apdu::{ins, parse_apdu, Response, APDU, SW};
use crate::card::atr::PIV_ATR;
use crate::card::Credential;
use crate::crypto::{CryptoConfig, RsaRawSign};
use crate::piv::data_objects::{PIVDataObject, CCC, CHUID};
use crate::piv::tags;
use crate::tlv::{hexify, StringEncoding, TLVError, TLVReader, TLVWriter};

/// PIV Application Identifier (NIST SP 800-73-4 part 1, section 2.2)
pub const PIV_AID: &[u8] = &[0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00];

/// PIV AID with the version suffix, as reported by the discovery object
pub const PIV_AID_WITH_VERSION: &[u8] = &[
    0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00,
];

/// Application portion + version portion of the PIV AID
const APP_VERSION_ID: &[u8] = &[0x00, 0x00, 0x10, 0x00, 0x01, 0x00];

/// Label reported in the application property template
const APPLET_LABEL: &str = "PIVert PIV Applet";

/// Largest response body returned in one APDU before chaining kicks in
const RESPONSE_CHUNK: usize = 255;

/// Algorithm identifiers advertised on SELECT, matching what logon hosts
/// probe for
const ALGORITHM_IDENTIFIERS: [u8; 8] = [0x03, 0x08, 0x0A, 0x0C, 0x06, 0x07, 0x11, 0x14];

/// Data object identifiers the card serves
mod object_id {
    pub const DISCOVERY: u32 = 0x7E;
    pub const CHUID: u32 = 0x005F_C102;
    pub const CCC: u32 = 0x005F_C107;
    pub const CERT_PIV_AUTH: u32 = 0x005F_C105;
    pub const CERT_CARD_AUTH: u32 = 0x005F_C101;
    pub const CERT_SIGNATURE: u32 = 0x005F_C10A;
}

/// A response body being drained through GET RESPONSE
struct PendingResponse {
    body: Vec<u8>,
    offset: usize,
}

/// The emulated PIV card
///
/// One instance serves one reader session; the transport delivers APDUs
/// serially and every call runs to completion before the next starts.
pub struct PIVCard {
    credential: Credential,
    chuid: CHUID,
    ccc: CCC,
    signer: Box<dyn RsaRawSign>,
    pending_request: Option<Vec<u8>>,
    pending_response: Option<PendingResponse>,
}

impl PIVCard {
    /// Create a card around the operator credential
    ///
    /// The CHUID GUID and CCC CardID are drawn from the configured RNG at
    /// construction and stay fixed for the card's lifetime.
    pub fn new(credential: Credential, crypto: CryptoConfig) -> Self {
        let mut rng = crypto.build_rng();

        let mut chuid = CHUID::new();
        chuid.set_random_guid(rng.as_mut());
        let mut ccc = CCC::new();
        ccc.set_random_card_id(rng.as_mut());

        Self {
            credential,
            chuid,
            ccc,
            signer: crypto.build_signer(),
            pending_request: None,
            pending_response: None,
        }
    }

    /// The fixed Answer-To-Reset
    pub fn atr(&self) -> &'static [u8] {
        PIV_ATR
    }

    /// Reset the card, clearing any chaining state, and return the ATR
    pub fn reset(&mut self, warm: bool) -> &'static [u8] {
        debug!("card reset (warm={})", warm);
        self.pending_request = None;
        self.pending_response = None;
        PIV_ATR
    }

    /// Process one command APDU and return the full response bytes
    ///
    /// The last two bytes of the return value are always a valid SW1SW2;
    /// ill-formed input yields `6D 00` rather than an error.
    pub fn process_apdu(&mut self, raw_apdu: &[u8]) -> Vec<u8> {
        let cmd = match parse_apdu(raw_apdu) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("unparseable APDU ({}): {}", e, hexify(raw_apdu));
                return Response::error(SW::INS_NOT_SUPPORTED).to_bytes();
            }
        };

        // Only the base class, with or without the chaining bit
        if cmd.cla & !0x10 != 0 {
            warn!("unsupported CLA {:02X}", cmd.cla);
            return Response::error(SW::INS_NOT_SUPPORTED).to_bytes();
        }

        // Anything other than GET RESPONSE abandons an in-flight drain
        if cmd.ins != ins::GET_RESPONSE && self.pending_response.is_some() {
            debug!("pending response abandoned by INS {:02X}", cmd.ins);
            self.pending_response = None;
        }

        debug!(
            "PIV APDU: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Nc={}",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.data.len()
        );

        let response = match (cmd.ins, cmd.p1, cmd.p2) {
            (ins::SELECT, 0x04, _) => self.handle_select(&cmd),
            (ins::VERIFY, 0x00, 0x80) => self.handle_verify(&cmd),
            (ins::GENERAL_AUTHENTICATE, _, _) => self.handle_general_authenticate(&cmd),
            (ins::GET_RESPONSE, 0x00, 0x00) => self.handle_get_response(),
            (ins::GET_DATA, 0x3F, 0xFF) => self.handle_get_data(&cmd),
            _ => {
                warn!(
                    "unsupported instruction INS={:02X} P1={:02X} P2={:02X}",
                    cmd.ins, cmd.p1, cmd.p2
                );
                Response::error(SW::INS_NOT_SUPPORTED)
            }
        };
        response.to_bytes()
    }

    // =========================================================================
    // Command handlers
    // =========================================================================

    /// SELECT APPLICATION (INS A4)
    fn handle_select(&mut self, cmd: &APDU) -> Response {
        if cmd.data.as_slice() != PIV_AID {
            info!("SELECT for unknown AID: {}", hexify(&cmd.data));
            return Response::error(SW::FILE_NOT_FOUND);
        }

        match self.application_template() {
            Ok(body) => {
                info!("PIV application selected");
                self.respond(body)
            }
            Err(e) => {
                warn!("failed to build application template: {}", e);
                Response::error(SW::FILE_NOT_FOUND)
            }
        }
    }

    /// Application property template returned on SELECT
    fn application_template(&self) -> Result<Vec<u8>, TLVError> {
        let mut writer = TLVWriter::new();
        let mut template = writer.nested(tags::APPLICATION_PROPERTY_TEMPLATE)?;
        template.write_value(tags::APPLICATION_IDENTIFIER, APP_VERSION_ID)?;
        {
            let mut authority = template.nested(tags::TAG_ALLOCATION_AUTHORITY)?;
            authority.write_value(tags::APPLICATION_IDENTIFIER, PIV_AID)?;
            authority.close()?;
        }
        template.write_string(tags::APPLICATION_LABEL, APPLET_LABEL, StringEncoding::Ascii)?;
        {
            let mut algorithms = template.nested(tags::SUPPORTED_ALGORITHMS)?;
            for algorithm in ALGORITHM_IDENTIFIERS {
                algorithms.write_byte(tags::ALGORITHM_IDENTIFIER, algorithm)?;
            }
            algorithms.write_value(tags::OBJECT_IDENTIFIER, &[])?;
            algorithms.close()?;
        }
        template.close()?;
        writer.encode()
    }

    /// VERIFY (INS 20) - any PIN is accepted
    fn handle_verify(&mut self, _cmd: &APDU) -> Response {
        debug!("VERIFY accepted (PIN is not checked)");
        Response::ok()
    }

    /// GENERAL AUTHENTICATE (INS 87)
    ///
    /// Chained fragments accumulate in `pending_request`; the final
    /// fragment completes the payload, which is signed with the raw RSA
    /// primitive and returned through response chaining.
    fn handle_general_authenticate(&mut self, cmd: &APDU) -> Response {
        if cmd.is_chained() {
            self.pending_request
                .get_or_insert_with(Vec::new)
                .extend_from_slice(&cmd.data);
            debug!("buffered {} chained bytes", cmd.data.len());
            return Response::ok();
        }

        let mut payload = self.pending_request.take().unwrap_or_default();
        payload.extend_from_slice(&cmd.data);

        let challenge = match Self::challenge_from_template(&payload) {
            Ok(challenge) => challenge,
            Err(e) => {
                warn!("malformed authentication template: {}", e);
                return Response::error(SW::FILE_NOT_FOUND);
            }
        };

        let signature = match self.signer.raw_sign(self.credential.key(), challenge) {
            Ok(signature) => signature,
            Err(e) => {
                warn!("challenge signing refused: {}", e);
                return Response::error(SW::INS_NOT_SUPPORTED);
            }
        };
        debug!(
            "signed {}-byte challenge, {}-byte signature",
            challenge.len(),
            signature.len()
        );

        match Self::signature_template(&signature) {
            Ok(body) => self.respond(body),
            Err(e) => {
                warn!("failed to build authentication response: {}", e);
                Response::error(SW::FILE_NOT_FOUND)
            }
        }
    }

    /// Extract the challenge from an assembled dynamic authentication
    /// template: `7C L { 82 00, 81 L challenge }`
    fn challenge_from_template(payload: &[u8]) -> Result<&[u8], TLVError> {
        let mut outer = TLVReader::new(payload);
        let mut template = outer.read_nested(tags::DYNAMIC_AUTH_TEMPLATE)?;

        let response_slot = template.read_value(tags::AUTH_RESPONSE)?;
        if !response_slot.is_empty() {
            return Err(TLVError::UnexpectedEncoding);
        }
        template.read_value(tags::AUTH_CHALLENGE)
    }

    /// Wrap a signature as `7C L { 82 L signature }`
    fn signature_template(signature: &[u8]) -> Result<Vec<u8>, TLVError> {
        let mut writer = TLVWriter::new();
        let mut template = writer.nested(tags::DYNAMIC_AUTH_TEMPLATE)?;
        template.write_value(tags::AUTH_RESPONSE, signature)?;
        template.close()?;
        writer.encode()
    }

    /// GET RESPONSE (INS C0)
    fn handle_get_response(&mut self) -> Response {
        self.drain_pending()
    }

    /// GET DATA (INS CB)
    fn handle_get_data(&mut self, cmd: &APDU) -> Response {
        let object = match Self::requested_object(&cmd.data) {
            Ok(object) => object,
            Err(e) => {
                warn!("malformed GET DATA request: {}", e);
                return Response::error(SW::FILE_NOT_FOUND);
            }
        };

        let body = match object {
            object_id::DISCOVERY => self.discovery_object(),
            object_id::CHUID => self.chuid.encode(),
            object_id::CCC => self.ccc.encode(),
            object_id::CERT_PIV_AUTH | object_id::CERT_CARD_AUTH | object_id::CERT_SIGNATURE => {
                self.certificate_object()
            }
            other => {
                info!("GET DATA for unknown object 0x{:06X}", other);
                return Response::error(SW::FILE_NOT_FOUND);
            }
        };

        match body {
            Ok(body) => {
                debug!("GET DATA 0x{:06X}: {} bytes", object, body.len());
                self.respond(body)
            }
            Err(e) => {
                warn!("failed to encode data object 0x{:06X}: {}", object, e);
                Response::error(SW::FILE_NOT_FOUND)
            }
        }
    }

    /// Decode the requested object identifier from the `5C` tag list
    fn requested_object(data: &[u8]) -> Result<u32, TLVError> {
        let mut reader = TLVReader::new(data);
        let tag_bytes = reader.read_value(tags::TAG_LIST)?;
        if tag_bytes.is_empty() || tag_bytes.len() > 4 {
            return Err(TLVError::UnexpectedEncoding);
        }
        Ok(tag_bytes
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    /// Discovery object: `7E { 4F aid, 5F2F policy }`
    fn discovery_object(&self) -> Result<Vec<u8>, TLVError> {
        let mut writer = TLVWriter::new();
        let mut discovery = writer.nested(tags::DISCOVERY_OBJECT)?;
        discovery.write_value(tags::APPLICATION_IDENTIFIER, PIV_AID_WITH_VERSION)?;
        // PIN policy: PIV PIN satisfies the application, no global PIN
        discovery.write_value(tags::PIN_USAGE_POLICY, &[0x40, 0x00])?;
        discovery.close()?;
        writer.encode()
    }

    /// Certificate object: `53 { 70 cert, 71 00, FE }`
    ///
    /// All three certificate slots serve the one operator certificate.
    fn certificate_object(&self) -> Result<Vec<u8>, TLVError> {
        let mut writer = TLVWriter::new();
        let mut container = writer.nested(tags::DATA_CONTAINER)?;
        container.write_value(tags::CERTIFICATE, self.credential.certificate())?;
        // CertInfo 0x00: uncompressed
        container.write_byte(tags::CERT_INFO, 0x00)?;
        container.write_value(tags::ERROR_DETECTION_CODE, &[])?;
        container.close()?;
        writer.encode()
    }

    // =========================================================================
    // Response chaining
    // =========================================================================

    /// Return `body` directly when it fits one APDU, otherwise park it
    /// and emit the first window
    fn respond(&mut self, body: Vec<u8>) -> Response {
        if body.len() <= RESPONSE_CHUNK {
            return Response::success(body);
        }
        self.pending_response = Some(PendingResponse { body, offset: 0 });
        self.drain_pending()
    }

    /// Emit the next window of the pending response
    fn drain_pending(&mut self) -> Response {
        let pending = match self.pending_response.as_mut() {
            Some(pending) => pending,
            // nothing pending: zero bytes available
            None => return Response::new(Vec::new(), SW::bytes_remaining(0)),
        };

        let remaining = pending.body.len() - pending.offset;
        let take = remaining.min(RESPONSE_CHUNK);
        let chunk = pending.body[pending.offset..pending.offset + take].to_vec();
        pending.offset += take;

        let left = pending.body.len() - pending.offset;
        if left == 0 {
            self.pending_response = None;
            Response::success(chunk)
        } else {
            Response::more_data(chunk, left.min(0xFF) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::RsaPrivateKey;

    fn test_card_with(cert: Vec<u8>, bits: usize) -> PIVCard {
        let key = RsaPrivateKey::new(&mut OsRng, bits).unwrap();
        PIVCard::new(Credential::new(cert, key), CryptoConfig::default())
    }

    fn test_card() -> PIVCard {
        test_card_with(vec![0x30, 0x82, 0x01, 0x00, 0xAA, 0xBB], 512)
    }

    fn select_apdu() -> Vec<u8> {
        let mut raw = vec![0x00, 0xA4, 0x04, 0x00, 0x09];
        raw.extend_from_slice(PIV_AID);
        raw.push(0x00);
        raw
    }

    #[test]
    fn test_atr_is_fixed() {
        let mut card = test_card();
        assert_eq!(card.atr().len(), 23);
        assert_eq!(card.reset(true), card.atr());
        assert_eq!(card.reset(false), PIV_ATR);
    }

    #[test]
    fn test_select_piv_application() {
        let mut card = test_card();
        let response = card.process_apdu(&select_apdu());

        assert_eq!(&response[response.len() - 2..], &[0x90, 0x00]);
        assert_eq!(response[0], 0x61);

        // the applet label is embedded as 50 11 "PIVert PIV Applet"
        let mut expected_label = vec![0x50, 0x11];
        expected_label.extend_from_slice(APPLET_LABEL.as_bytes());
        assert!(response
            .windows(expected_label.len())
            .any(|w| w == expected_label.as_slice()));
    }

    #[test]
    fn test_select_unknown_aid() {
        let mut card = test_card();
        let response =
            card.process_apdu(&[0x00, 0xA4, 0x04, 0x00, 0x05, 0xA0, 0x00, 0x00, 0x03, 0x09]);
        assert_eq!(response, vec![0x6A, 0x82]);
    }

    #[test]
    fn test_verify_accepts_any_pin() {
        let mut card = test_card();
        let response = card.process_apdu(&[
            0x00, 0x20, 0x00, 0x80, 0x08, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0xFF, 0xFF,
        ]);
        assert_eq!(response, vec![0x90, 0x00]);
    }

    #[test]
    fn test_unknown_instruction() {
        let mut card = test_card();
        let response = card.process_apdu(&[0x00, 0x47, 0x00, 0x9A]);
        assert_eq!(response, vec![0x6D, 0x00]);
    }

    #[test]
    fn test_unknown_cla() {
        let mut card = test_card();
        let response = card.process_apdu(&[0x80, 0x20, 0x00, 0x80]);
        assert_eq!(response, vec![0x6D, 0x00]);
    }

    #[test]
    fn test_ill_formed_apdu_never_panics() {
        let mut card = test_card();
        assert_eq!(card.process_apdu(&[]), vec![0x6D, 0x00]);
        assert_eq!(card.process_apdu(&[0x00]), vec![0x6D, 0x00]);
        assert_eq!(
            card.process_apdu(&[0x00, 0xCB, 0x3F, 0xFF, 0x20, 0x01]),
            vec![0x6D, 0x00]
        );
    }

    #[test]
    fn test_get_data_discovery() {
        let mut card = test_card();
        let response = card.process_apdu(&[0x00, 0xCB, 0x3F, 0xFF, 0x03, 0x5C, 0x01, 0x7E, 0x00]);
        let expected = hex::decode("7E124F0BA0000003080000100001005F2F0240009000").unwrap();
        assert_eq!(response, expected);
    }

    #[test]
    fn test_get_data_chuid_round_trips() {
        let mut card = test_card();
        let response = card.process_apdu(&[
            0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xC1, 0x02, 0x00,
        ]);
        assert_eq!(&response[response.len() - 2..], &[0x90, 0x00]);

        let mut decoded = CHUID::new();
        assert!(decoded.try_decode(&response[..response.len() - 2]));
        assert_eq!(decoded.guid(), card.chuid.guid());
    }

    #[test]
    fn test_get_data_ccc_round_trips() {
        let mut card = test_card();
        let response = card.process_apdu(&[
            0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xC1, 0x07, 0x00,
        ]);
        assert_eq!(&response[response.len() - 2..], &[0x90, 0x00]);

        let mut decoded = CCC::new();
        assert!(decoded.try_decode(&response[..response.len() - 2]));
        assert_eq!(decoded.card_id(), card.ccc.card_id());
    }

    #[test]
    fn test_get_data_unknown_object() {
        let mut card = test_card();
        let response = card.process_apdu(&[
            0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xFF, 0xFE, 0x00,
        ]);
        assert_eq!(response, vec![0x6A, 0x82]);
    }

    #[test]
    fn test_get_data_certificate_chains() {
        // a certificate bigger than one window forces response chaining
        let cert = vec![0xC5; 600];
        let mut card = test_card_with(cert.clone(), 512);

        let mut response = card.process_apdu(&[
            0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xC1, 0x05, 0x00,
        ]);
        let mut body = Vec::new();
        let mut apdu_count = 1;
        loop {
            let sw1 = response[response.len() - 2];
            let sw2 = response[response.len() - 1];
            body.extend_from_slice(&response[..response.len() - 2]);
            if sw1 == 0x90 && sw2 == 0x00 {
                break;
            }
            assert_eq!(sw1, 0x61);
            response = card.process_apdu(&[0x00, 0xC0, 0x00, 0x00, 0x00]);
            apdu_count += 1;
        }

        // every window but the last carries exactly 255 bytes
        assert_eq!(apdu_count, (body.len() + RESPONSE_CHUNK - 1) / RESPONSE_CHUNK);

        // the container holds the operator certificate
        let mut outer = TLVReader::new(&body);
        let mut container = outer.read_nested(tags::DATA_CONTAINER).unwrap();
        assert_eq!(container.read_value(tags::CERTIFICATE).unwrap(), cert);
        assert_eq!(container.read_byte(tags::CERT_INFO).unwrap(), 0x00);
        assert!(container
            .read_value(tags::ERROR_DETECTION_CODE)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_get_response_without_pending() {
        let mut card = test_card();
        let response = card.process_apdu(&[0x00, 0xC0, 0x00, 0x00, 0x00]);
        assert_eq!(response, vec![0x61, 0x00]);
    }

    #[test]
    fn test_interleaved_apdu_abandons_pending_response() {
        let cert = vec![0xC5; 600];
        let mut card = test_card_with(cert, 512);

        let response = card.process_apdu(&[
            0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xC1, 0x05, 0x00,
        ]);
        assert_eq!(response[response.len() - 2], 0x61);

        // a VERIFY in the middle of the drain is served normally...
        let response = card.process_apdu(&[0x00, 0x20, 0x00, 0x80, 0x02, 0x31, 0x32]);
        assert_eq!(response, vec![0x90, 0x00]);

        // ...and the drain is gone
        let response = card.process_apdu(&[0x00, 0xC0, 0x00, 0x00, 0x00]);
        assert_eq!(response, vec![0x61, 0x00]);
    }

    #[test]
    fn test_general_authenticate_rejects_bad_template() {
        let mut card = test_card();
        // data is not a 7C template
        let response = card.process_apdu(&[0x00, 0x87, 0x07, 0x9A, 0x03, 0x5C, 0x01, 0x7E]);
        assert_eq!(response, vec![0x6A, 0x82]);
    }

    #[test]
    fn test_general_authenticate_rejects_short_challenge() {
        let mut card = test_card();
        // well-formed template, but the challenge is shorter than the modulus
        let mut data = vec![0x7C, 0x08, 0x82, 0x00, 0x81, 0x04];
        data.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        let mut raw = vec![0x00, 0x87, 0x07, 0x9A, data.len() as u8];
        raw.extend_from_slice(&data);
        let response = card.process_apdu(&raw);
        assert_eq!(response, vec![0x6D, 0x00]);
    }
}
