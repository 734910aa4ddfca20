//! Low-level byte stream parser for signatures and descriptor blobs.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used for everything in this crate that decodes untrusted bytes: ECMA-335 signature
//! blobs, optional-field streams attached to EETypes, and dispatch maps read back from a
//! type image.
//!
//! # Architecture
//!
//! The parser maintains a position within a byte slice and validates the availability of data
//! before every read:
//!
//! - **Position tracking** - Maintains current offset for sequential parsing operations
//! - **Bounds checking** - All operations validate data availability before reading
//! - **Variable-length integers** - ECMA-335 compressed integers and 7-bit encoded integers
//! - **Handle decoding** - `TypeDefOrRefOrSpec` coded indices become [`crate::metadata::handle::Handle`]s
//!
//! # Usage Examples
//!
//! ```rust
//! use eetype::Parser;
//!
//! let data = [0x01, 0x02, 0x80, 0x01];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u16>()?, 0x0201);
//! assert_eq!(parser.read_7bit_encoded_int()?, 128);
//! assert!(!parser.has_more_data());
//! # Ok::<(), eetype::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::handle::{Handle, HandleType},
    Result,
};

/// A generic binary data parser.
///
/// `Parser` provides a cursor-based interface for reading little-endian binary data and the
/// variable-length encodings used by metadata signatures and optional fields. It never panics
/// on truncated input; every read is bounds checked.
///
/// # Examples
///
/// ```rust
/// use eetype::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut parser = Parser::new(&data);
///
/// let first = parser.read_le::<u32>()?;
/// assert_eq!(first, 0x04030201);
///
/// parser.seek(6)?;
/// assert_eq!(parser.read_le::<u16>()?, 0x0807);
/// # Ok::<(), eetype::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if there is more data to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the position to a specific offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if already at the end of the data.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Move the position forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(next) if next <= self.data.len() => {
                self.position = next;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Get the current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Access the full underlying buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Peek at the current byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(out_of_bounds_error!()),
        }
    }

    /// Read a type `T` from the current position in little-endian format and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read `length` raw bytes and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(length)?;
        Ok(&self.data[start..self.position])
    }

    /// Read a compressed unsigned integer as defined in ECMA-335 II.23.2.
    ///
    /// - Values 0-127: 1 byte (0xxxxxxx)
    /// - Values 128-16383: 2 bytes (10xxxxxx xxxxxxxx)
    /// - Values 16384-536870911: 4 bytes (110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx)
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] for an invalid leading byte.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use eetype::Parser;
    ///
    /// let mut parser = Parser::new(&[0x7F, 0x80, 0x80]);
    /// assert_eq!(parser.read_compressed_uint()?, 127);
    /// assert_eq!(parser.read_compressed_uint()?, 128);
    /// # Ok::<(), eetype::Error>(())
    /// ```
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a compressed signed integer as defined in ECMA-335 II.23.2.
    ///
    /// # Errors
    /// Same as [`Parser::read_compressed_uint`].
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let unsigned = self.read_compressed_uint()?;

        #[allow(clippy::cast_possible_wrap)]
        let magnitude = (unsigned >> 1) as i32;
        if (unsigned & 1) == 0 {
            Ok(magnitude)
        } else {
            Ok(-(magnitude + 1))
        }
    }

    /// Read a `TypeDefOrRefOrSpec` coded index (ECMA-335 II.23.2.8) as a [`Handle`].
    ///
    /// | Tag | Handle kind |
    /// |-----|-------------|
    /// | 0x0 | [`HandleType::TypeDefinition`] |
    /// | 0x1 | [`HandleType::TypeReference`] |
    /// | 0x2 | [`HandleType::TypeSpecification`] |
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag 0x3.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use eetype::Parser;
    /// use eetype::metadata::handle::HandleType;
    ///
    /// // TypeReference, row 1 => (1 << 2) | 0x1
    /// let mut parser = Parser::new(&[0x05]);
    /// let handle = parser.read_compressed_handle()?;
    /// assert_eq!(handle.handle_type()?, HandleType::TypeReference);
    /// assert_eq!(handle.row(), 1);
    /// # Ok::<(), eetype::Error>(())
    /// ```
    pub fn read_compressed_handle(&mut self) -> Result<Handle> {
        let coded = self.read_compressed_uint()?;

        let kind = match coded & 0x3 {
            0x0 => HandleType::TypeDefinition,
            0x1 => HandleType::TypeReference,
            0x2 => HandleType::TypeSpecification,
            _ => return Err(malformed_error!("Invalid coded type handle - {}", coded)),
        };

        Ok(Handle::new(kind, coded >> 2))
    }

    /// Read a 7-bit encoded integer.
    ///
    /// The most significant bit of each byte is a continuation flag; the value is the
    /// concatenation of the low seven bits of each byte, least significant group first.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input or
    /// [`crate::Error::Malformed`] if the value does not fit in a `u32`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use eetype::Parser;
    ///
    /// let mut parser = Parser::new(&[0x7F, 0x80, 0x01]);
    /// assert_eq!(parser.read_7bit_encoded_int()?, 127);
    /// assert_eq!(parser.read_7bit_encoded_int()?, 128);
    /// # Ok::<(), eetype::Error>(())
    /// ```
    pub fn read_7bit_encoded_int(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0;

        loop {
            let byte = self.read_le::<u8>()?;

            // The fifth byte may only carry the top four bits of a u32.
            if shift == 28 && byte > 0x0F {
                return Err(malformed_error!(
                    "7-bit encoded integer overflow - final byte {:#x}",
                    byte
                ));
            }

            value |= u32::from(byte & 0x7F) << shift;
            shift += 7;

            if (byte & 0x80) == 0 {
                break;
            }
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::io::write_7bit_encoded_int;

    #[test]
    fn test_navigation() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.len(), 4);
        assert!(!parser.is_empty());
        parser.advance().unwrap();
        parser.advance_by(2).unwrap();
        assert_eq!(parser.pos(), 3);
        assert_eq!(parser.remaining(), 1);
        assert_eq!(parser.peek_byte().unwrap(), 0x04);
        assert!(parser.advance_by(2).is_err());
        assert_eq!(parser.pos(), 3);

        parser.seek(4).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.peek_byte().is_err());
        assert!(parser.seek(5).is_err());
    }

    #[test]
    fn test_read_bytes() {
        let data = [0xAA, 0xBB, 0xCC];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_bytes(2).unwrap(), &[0xAA, 0xBB]);
        assert!(parser.read_bytes(2).is_err());
        assert_eq!(parser.read_bytes(1).unwrap(), &[0xCC]);
    }

    #[test]
    fn test_compressed_uint() {
        let test_cases = vec![
            (vec![0x03], 0x03),
            (vec![0x7F], 0x7F),
            (vec![0x80, 0x80], 0x80),
            (vec![0xAE, 0x57], 0x2E57),
            (vec![0xBF, 0xFF], 0x3FFF),
            (vec![0xC0, 0x00, 0x40, 0x00], 0x4000),
            (vec![0xDF, 0xFF, 0xFF, 0xFF], 0x1FFF_FFFF),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_compressed_uint().unwrap(), expected);
        }

        let mut parser = Parser::new(&[0xFF]);
        assert!(parser.read_compressed_uint().is_err());
    }

    #[test]
    fn test_compressed_int() {
        let test_cases = vec![(vec![0x06], 3), (vec![0x7B], -62), (vec![0x09], -5)];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_compressed_int().unwrap(), expected);
        }
    }

    #[test]
    fn test_compressed_handle() {
        let test_cases = vec![
            (vec![0x49], HandleType::TypeReference, 0x12),
            (vec![0x48], HandleType::TypeDefinition, 0x12),
            (vec![0x42], HandleType::TypeSpecification, 0x10),
        ];

        for (input, kind, row) in test_cases {
            let mut parser = Parser::new(&input);
            let handle = parser.read_compressed_handle().unwrap();
            assert_eq!(handle.handle_type().unwrap(), kind);
            assert_eq!(handle.row(), row);
        }

        let mut parser = Parser::new(&[0x07]);
        assert!(parser.read_compressed_handle().is_err());
    }

    #[test]
    fn test_7bit_encoded_int() {
        for value in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x0FFF_FFFF, u32::MAX] {
            let mut encoded = Vec::new();
            write_7bit_encoded_int(&mut encoded, value);
            let mut parser = Parser::new(&encoded);
            assert_eq!(parser.read_7bit_encoded_int().unwrap(), value);
            assert!(!parser.has_more_data());
        }
    }

    #[test]
    fn test_7bit_encoded_int_errors() {
        // Truncated continuation
        let mut parser = Parser::new(&[0x80]);
        assert!(matches!(
            parser.read_7bit_encoded_int(),
            Err(crate::Error::OutOfBounds)
        ));

        // Sixth byte would be needed
        let mut parser = Parser::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(matches!(
            parser.read_7bit_encoded_int(),
            Err(crate::Error::Malformed { .. })
        ));
    }
}
