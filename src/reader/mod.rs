//! Virtual reader transport
//!
//! Bridges the card handler to a host smart-card stack over two byte
//! streams: a data channel carrying reset/get-ATR/APDU commands and a
//! write-only event channel announcing card insertion and removal. All
//! framing integers are 32-bit little-endian.
//!
//! Protocol, host to emulator on the data channel:
//! - command `0` (reset): reply is length + ATR, or length 0 with no card
//! - command `1` (get-ATR): reply identical to reset
//! - command `2` (APDU): followed by length + APDU bytes; reply is
//!   length + response bytes
//!
//! Emulator to host on the event channel: a bare command word, `1` for
//! card inserted and `0` for card removed.

use std::io::{self, Read, Write};
use std::net::TcpListener;

use log::{debug, info, warn};

use crate::piv::PIVCard;
use crate::tlv::hexify;

/// Data channel commands (host to emulator)
pub const CMD_RESET: u32 = 0x0000_0000;
pub const CMD_GET_ATR: u32 = 0x0000_0001;
pub const CMD_APDU: u32 = 0x0000_0002;

/// Event channel notifications (emulator to host)
pub const EVENT_CARD_REMOVED: u32 = 0;
pub const EVENT_CARD_INSERTED: u32 = 1;

/// Default TCP endpoints for the two channels
pub const DEFAULT_DATA_ADDR: &str = "127.0.0.1:35963";
pub const DEFAULT_EVENT_ADDR: &str = "127.0.0.1:35964";

/// Upper bound on a framed payload; anything larger is a framing error
const MAX_FRAME: usize = 0x1_0000 + 16;

/// A virtual reader holding one emulated card
pub struct VirtualReader {
    card: PIVCard,
}

impl VirtualReader {
    pub fn new(card: PIVCard) -> Self {
        Self { card }
    }

    /// Announce card insertion on the event channel
    pub fn announce_insertion<W: Write>(&self, events: &mut W) -> io::Result<()> {
        events.write_all(&EVENT_CARD_INSERTED.to_le_bytes())?;
        events.flush()
    }

    /// Announce card removal on the event channel
    pub fn announce_removal<W: Write>(&self, events: &mut W) -> io::Result<()> {
        events.write_all(&EVENT_CARD_REMOVED.to_le_bytes())?;
        events.flush()
    }

    /// Serve data channel commands until the host disconnects
    pub fn serve<S: Read + Write>(&mut self, mut channel: S) -> io::Result<()> {
        loop {
            let command = match read_u32(&mut channel) {
                Ok(command) => command,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("host disconnected from data channel");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            match command {
                CMD_RESET => {
                    let atr = self.card.reset(true).to_vec();
                    write_frame(&mut channel, &atr)?;
                }
                CMD_GET_ATR => {
                    write_frame(&mut channel, self.card.atr())?;
                }
                CMD_APDU => {
                    let apdu = read_frame(&mut channel)?;
                    debug!("APDU: {}", hexify(&apdu));
                    let response = self.card.process_apdu(&apdu);
                    debug!("response: {}", hexify(&response));
                    write_frame(&mut channel, &response)?;
                }
                other => {
                    warn!("unknown reader command {:#010X}", other);
                    write_frame(&mut channel, &[])?;
                }
            }
        }
    }
}

fn read_u32<R: Read>(stream: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    stream.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_frame<R: Read>(stream: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(stream)? as usize;
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the protocol maximum", len),
        ));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}

fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> io::Result<()> {
    stream.write_all(&(payload.len() as u32).to_le_bytes())?;
    stream.write_all(payload)?;
    stream.flush()
}

/// Accept host connections on TCP endpoints and serve one session at a
/// time
///
/// The host is expected to connect the event channel first; the reader
/// announces insertion, serves the data channel until it closes, then
/// announces removal and waits for the next session.
pub fn serve_tcp(mut reader: VirtualReader, data_addr: &str, event_addr: &str) -> io::Result<()> {
    let data_listener = TcpListener::bind(data_addr)?;
    let event_listener = TcpListener::bind(event_addr)?;
    info!(
        "virtual reader listening on {} (data) / {} (events)",
        data_addr, event_addr
    );

    loop {
        let (mut events, event_peer) = event_listener.accept()?;
        info!("event channel connected from {}", event_peer);
        if let Err(e) = reader.announce_insertion(&mut events) {
            warn!("failed to announce card insertion: {}", e);
            continue;
        }

        let (data, data_peer) = data_listener.accept()?;
        info!("data channel connected from {}", data_peer);
        if let Err(e) = reader.serve(data) {
            warn!("data channel error: {}", e);
        }
        let _ = reader.announce_removal(&mut events);
    }
}
