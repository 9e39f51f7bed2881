//! Nested TLV writer
//!
//! Builds a TLV tree scope by scope and serializes it with DER lengths.
//! A nested scope can be opened explicitly (`open_nested`/`close_nested`)
//! or through the `nested` guard, which closes the scope on every exit
//! path. All buffered bytes are zeroed on `clear` and on drop, since the
//! writer regularly carries key-adjacent material.

use std::ops::{Deref, DerefMut};

use zeroize::Zeroize;

use super::{push_header, tag_width, Endianness, StringEncoding, TLVError, MAX_LENGTH};

/// An open nested scope awaiting its children
#[derive(Debug)]
struct Scope {
    tag: u32,
    buf: Vec<u8>,
}

/// Writer assembling a nested TLV tree in memory
///
/// Leaf writes go to the innermost open scope; closing a scope computes
/// its tag-length prefix and attaches it to the enclosing scope. The tree
/// can only be serialized once every opened scope has been closed.
#[derive(Debug, Default)]
pub struct TLVWriter {
    root: Vec<u8>,
    stack: Vec<Scope>,
}

impl TLVWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    fn current_buf(&mut self) -> &mut Vec<u8> {
        match self.stack.last_mut() {
            Some(scope) => &mut scope.buf,
            None => &mut self.root,
        }
    }

    /// Append a leaf TLV under the currently open scope
    pub fn write_value(&mut self, tag: u32, value: &[u8]) -> Result<(), TLVError> {
        tag_width(tag)?;
        if value.len() > MAX_LENGTH {
            return Err(TLVError::UnsupportedLength);
        }
        let buf = self.current_buf();
        push_header(buf, tag, value.len())?;
        buf.extend_from_slice(value);
        Ok(())
    }

    /// Append a one-byte leaf
    pub fn write_byte(&mut self, tag: u32, value: u8) -> Result<(), TLVError> {
        self.write_value(tag, &[value])
    }

    /// Append a two-byte integer leaf
    pub fn write_int16(&mut self, tag: u32, value: i16, endian: Endianness) -> Result<(), TLVError> {
        let bytes = match endian {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        self.write_value(tag, &bytes)
    }

    /// Append a four-byte integer leaf
    pub fn write_int32(&mut self, tag: u32, value: i32, endian: Endianness) -> Result<(), TLVError> {
        let bytes = match endian {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        self.write_value(tag, &bytes)
    }

    /// Append a string leaf in the given encoding
    pub fn write_string(
        &mut self,
        tag: u32,
        text: &str,
        encoding: StringEncoding,
    ) -> Result<(), TLVError> {
        if encoding == StringEncoding::Ascii && !text.is_ascii() {
            return Err(TLVError::UnexpectedEncoding);
        }
        self.write_value(tag, text.as_bytes())
    }

    /// Append a pre-encoded TLV verbatim, bypassing tag and length
    /// re-encoding
    pub fn write_encoded(&mut self, raw_tlv: &[u8]) {
        self.current_buf().extend_from_slice(raw_tlv);
    }

    /// Open a nested scope with the given tag
    pub fn open_nested(&mut self, tag: u32) -> Result<(), TLVError> {
        tag_width(tag)?;
        self.stack.push(Scope {
            tag,
            buf: Vec::new(),
        });
        Ok(())
    }

    /// Close the innermost open scope and attach it to its parent
    pub fn close_nested(&mut self) -> Result<(), TLVError> {
        let mut scope = self.stack.pop().ok_or(TLVError::InvalidSchema)?;
        if scope.buf.len() > MAX_LENGTH {
            scope.buf.zeroize();
            return Err(TLVError::UnsupportedLength);
        }
        let result = {
            let buf = self.current_buf();
            push_header(buf, scope.tag, scope.buf.len()).map(|_| {
                buf.extend_from_slice(&scope.buf);
            })
        };
        scope.buf.zeroize();
        result
    }

    /// Open a nested scope and return a guard that closes it on drop
    ///
    /// The guard dereferences to the writer, so children can be written
    /// through it; call `close` to surface any close error.
    pub fn nested(&mut self, tag: u32) -> Result<TLVScope<'_>, TLVError> {
        self.open_nested(tag)?;
        Ok(TLVScope {
            writer: self,
            closed: false,
        })
    }

    /// Total serialized length; valid only once every scope is closed
    pub fn encoded_length(&self) -> Result<usize, TLVError> {
        if !self.stack.is_empty() {
            return Err(TLVError::InvalidSchema);
        }
        Ok(self.root.len())
    }

    /// Serialize the whole tree into a new buffer
    pub fn encode(&self) -> Result<Vec<u8>, TLVError> {
        if !self.stack.is_empty() {
            return Err(TLVError::InvalidSchema);
        }
        Ok(self.root.clone())
    }

    /// Serialize into a caller buffer; returns the number of bytes
    /// written, or `None` when the buffer is too small or a scope is
    /// still open
    pub fn try_encode(&self, dest: &mut [u8]) -> Option<usize> {
        if !self.stack.is_empty() || dest.len() < self.root.len() {
            return None;
        }
        dest[..self.root.len()].copy_from_slice(&self.root);
        Some(self.root.len())
    }

    /// Zero every buffered byte and reset the writer
    pub fn clear(&mut self) {
        self.root.zeroize();
        self.root.clear();
        for scope in &mut self.stack {
            scope.buf.zeroize();
        }
        self.stack.clear();
    }
}

impl Drop for TLVWriter {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Guard for a nested scope; closes the scope when dropped
pub struct TLVScope<'w> {
    writer: &'w mut TLVWriter,
    closed: bool,
}

impl TLVScope<'_> {
    /// Close the scope now, surfacing any encoding error
    pub fn close(mut self) -> Result<(), TLVError> {
        self.closed = true;
        self.writer.close_nested()
    }
}

impl Deref for TLVScope<'_> {
    type Target = TLVWriter;

    fn deref(&self) -> &TLVWriter {
        self.writer
    }
}

impl DerefMut for TLVScope<'_> {
    fn deref_mut(&mut self) -> &mut TLVWriter {
        self.writer
    }
}

impl Drop for TLVScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.writer.close_nested();
        }
    }
}
