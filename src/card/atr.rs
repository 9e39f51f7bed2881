//! ATR (Answer To Reset) for the emulated PIV card
//!
//! The ATR is fixed: hosts fingerprint cards by it, so the emulator
//! always presents the same 23 bytes.

/// ATR advertised by the emulated card
pub const PIV_ATR: &[u8] = &[
    0x3B, // TS: direct convention
    0x9F, // T0: TA1, TD1 present, 15 historical bytes
    0x95, // TA1: Fi/Di
    0x81, // TD1: TD2 present, T=1
    0x31, // TD2: TA3, TB3 present
    0xFE, // TA3: IFSC
    0x9F, // TB3
    0x00, 0x66, 0x46, 0x53, 0x05, 0x10, 0x00, 0x11, 0x71, // historical bytes
    0xDF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // historical bytes (padding)
    0x02, // TCK
];

/// Upper bound on ATR length from ISO 7816-3
pub const MAX_ATR_SIZE: usize = 33;
