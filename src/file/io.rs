//! Low-level byte order and safe reading/writing utilities.
//!
//! This module provides bounds-checked, little-endian reading and writing of primitive values
//! from and to byte buffers, plus the two variable-length integer encodings used throughout the
//! crate: the 7-bit (LEB128 style) encoding of optional-field values and the ECMA-335
//! compressed unsigned integer used by signature blobs.
//!
//! # Key Components
//!
//! - [`crate::file::io::CilIO`] - Trait describing how a primitive converts to and from bytes
//! - [`crate::file::io::read_le_at`] - Bounds-checked reads
//! - [`crate::file::io::write_le_at`] - Bounds-checked in-place writes
//! - [`crate::file::io::write_7bit_encoded_int`] - Variable-length encoding for optional fields
//! - [`crate::file::io::write_compressed_uint`] - ECMA-335 II.23.2 compressed integers
//!
//! # Thread Safety
//!
//! All functions are pure conversions over caller-owned buffers.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary conversion.
///
/// Implemented for all fixed-width integer types through a macro; the associated
/// `Bytes` array is what `from_le_bytes` / `to_le_bytes` operate on.
pub trait CilIO: Sized {
    /// Associated byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a value of type `T` at `offset` in little-endian byte order and advances `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed the buffer.
///
/// # Examples
///
/// ```rust,ignore
/// use eetype::file::io::read_le_at;
///
/// let data = [0x01, 0x00, 0x02, 0x00];
/// let mut offset = 0;
/// assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 1);
/// assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 2);
/// assert_eq!(offset, 4);
/// # Ok::<(), eetype::Error>(())
/// ```
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Writes `value` at `offset` in little-endian byte order and advances `offset`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the write would exceed the buffer.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}

/// Appends `value` using the 7-bit variable-length encoding.
///
/// Each byte carries seven value bits, least significant group first; the high bit marks
/// that another byte follows. A `u32` takes between one and five bytes. This is the inverse
/// of [`crate::file::parser::Parser::read_7bit_encoded_int`].
pub fn write_7bit_encoded_int(out: &mut Vec<u8>, value: u32) {
    let mut remaining = value;
    while remaining >= 0x80 {
        out.push((remaining as u8 & 0x7F) | 0x80);
        remaining >>= 7;
    }
    out.push(remaining as u8);
}

/// Number of bytes [`write_7bit_encoded_int`] produces for `value`
#[must_use]
pub fn sizeof_7bit_encoded_int(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Appends `value` as an ECMA-335 II.23.2 compressed unsigned integer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` exceeds `0x1FFF_FFFF`, the largest
/// representable compressed integer.
pub fn write_compressed_uint(out: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..=0x7F => out.push(value as u8),
        0x80..=0x3FFF => {
            out.push(((value >> 8) as u8) | 0x80);
            out.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            out.push(((value >> 24) as u8) | 0xC0);
            out.push((value >> 16) as u8);
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value too large for a compressed integer - {}",
                value
            ))
        }
    }
    Ok(())
}
