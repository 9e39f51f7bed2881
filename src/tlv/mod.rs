//! TLV (Tag-Length-Value) encoding and decoding
//!
//! This module implements the ISO 7816 BER-TLV format with DER length
//! rules, as used throughout the PIV data model. The writer assembles a
//! nested tree in memory and serializes it in one pass; the reader streams
//! elements out of a borrowed buffer without copying.
//!
//! # Example
//! ```ignore
//! use pivert::tlv::{TLVReader, TLVWriter};
//!
//! let mut writer = TLVWriter::new();
//! let mut template = writer.nested(0x7C)?;
//! template.write_value(0x82, &[])?;
//! template.close()?;
//! let bytes = writer.encode()?;
//!
//! let mut reader = TLVReader::new(&bytes);
//! let mut template = reader.read_nested(0x7C)?;
//! assert!(template.read_value(0x82)?.is_empty());
//! ```

mod reader;
mod writer;

pub use reader::TLVReader;
pub use writer::{TLVScope, TLVWriter};

use thiserror::Error;

/// Largest supported tag (two encoded bytes)
pub const MAX_TAG: u32 = 0xFFFF;

/// Largest supported value length (three-byte DER long form)
pub const MAX_LENGTH: usize = 0x00FF_FFFF;

/// Longest tag-length prefix: a 2-byte tag followed by `83 LL LL LL`
pub const MAX_PREFIX_LEN: usize = 6;

/// Errors raised by the TLV codec and the PIV data objects built on it
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TLVError {
    #[error("tag is zero, wider than two bytes, or does not fit the requested width")]
    UnsupportedTag,

    #[error("length encoding is indefinite or wider than three bytes")]
    UnsupportedLength,

    #[error("element does not match the expected tag or fixed length")]
    UnexpectedEncoding,

    #[error("unexpected end of data")]
    UnexpectedEnd,

    #[error("nested scopes are unbalanced")]
    InvalidSchema,

    #[error("data object tag is outside the assignable range")]
    InvalidDataTag,
}

/// Byte order for the fixed-width integer helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Text encodings accepted by the string helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Ascii,
    Utf8,
}

/// Convert a byte slice to a spaced hex string for log output
pub fn hexify(value: &[u8]) -> String {
    value
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number of bytes the tag occupies on the wire (1 or 2)
pub(crate) fn tag_width(tag: u32) -> Result<usize, TLVError> {
    if tag == 0 || tag > MAX_TAG {
        Err(TLVError::UnsupportedTag)
    } else if tag <= 0xFF {
        Ok(1)
    } else {
        Ok(2)
    }
}

/// Decode a DER length starting at `offset`
///
/// Returns the length and the number of bytes it occupied. The indefinite
/// form (0x80) and forms wider than three bytes (0x84 and up) are rejected.
pub(crate) fn decode_length(buf: &[u8], offset: usize) -> Result<(usize, usize), TLVError> {
    let first = *buf.get(offset).ok_or(TLVError::UnexpectedEnd)?;

    if first < 0x80 {
        return Ok((first as usize, 1));
    }
    if first == 0x80 || first >= 0x84 {
        return Err(TLVError::UnsupportedLength);
    }

    let num_bytes = (first & 0x7F) as usize;
    if offset + 1 + num_bytes > buf.len() {
        return Err(TLVError::UnexpectedEnd);
    }

    let mut length: usize = 0;
    for i in 0..num_bytes {
        length = (length << 8) | (buf[offset + 1 + i] as usize);
    }
    Ok((length, 1 + num_bytes))
}

/// Append a tag-length prefix to `out`
pub(crate) fn push_header(out: &mut Vec<u8>, tag: u32, length: usize) -> Result<(), TLVError> {
    let width = tag_width(tag)?;
    if length > MAX_LENGTH {
        return Err(TLVError::UnsupportedLength);
    }

    if width == 2 {
        out.push((tag >> 8) as u8);
    }
    out.push((tag & 0xFF) as u8);

    if length < 0x80 {
        out.push(length as u8);
    } else if length <= 0xFF {
        out.push(0x81);
        out.push(length as u8);
    } else if length <= 0xFFFF {
        out.push(0x82);
        out.push((length >> 8) as u8);
        out.push((length & 0xFF) as u8);
    } else {
        out.push(0x83);
        out.push((length >> 16) as u8);
        out.push(((length >> 8) & 0xFF) as u8);
        out.push((length & 0xFF) as u8);
    }
    Ok(())
}
