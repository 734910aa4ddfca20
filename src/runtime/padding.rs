//! Value-type field padding encoding.
//!
//! A boxed value type needs to know how many bytes of its instance are trailing padding and the
//! alignment its fields require, so that unboxing copies the right amount of data. Both facts
//! are packed into the single `ValueTypeFieldPadding` optional field:
//!
//! ```text
//!  31                         8 7        3 2     0
//! +----------------------------+----------+-------+
//! |   padding >> 3             | log2(a)+1| pad&7 |
//! +----------------------------+----------+-------+
//! ```
//!
//! An alignment class of zero means "pointer aligned", which makes the overwhelmingly common
//! case (no padding, pointer alignment) encode to zero so the field can be omitted.

use crate::Result;

/// Low padding bits kept in place
pub const VALUE_TYPE_PADDING_LOW_MASK: u32 = 0x7;
/// High padding bits after shifting
pub const VALUE_TYPE_PADDING_HIGH_MASK: u32 = 0xFFFF_FF00;
/// Largest encodable padding
pub const VALUE_TYPE_PADDING_MAX: u32 = 0x07FF_FFFF;
/// Shift applied to the high padding bits
pub const VALUE_TYPE_PADDING_HIGH_SHIFT: u32 = 8;
/// Mask of the alignment class
pub const VALUE_TYPE_PADDING_ALIGNMENT_MASK: u32 = 0xF8;
/// Shift of the alignment class
pub const VALUE_TYPE_PADDING_ALIGNMENT_SHIFT: u32 = 3;

/// Decoded `ValueTypeFieldPadding` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueTypePadding {
    /// Trailing padding bytes of the unboxed instance
    pub padding: u32,
    /// Required field alignment in bytes
    pub alignment: u32,
}

impl ValueTypePadding {
    /// Pack padding and alignment into one optional-field value.
    ///
    /// Returns 0 exactly when `padding == 0` and `alignment == pointer_size`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if `alignment` is not a power of two that
    /// fits the five-bit class, or `padding` exceeds [`VALUE_TYPE_PADDING_MAX`].
    pub fn encode(padding: u32, alignment: u32, pointer_size: u32) -> Result<u32> {
        if padding == 0 && alignment == pointer_size {
            return Ok(0);
        }

        if !alignment.is_power_of_two() {
            return Err(invariant_error!(
                "Value type alignment {} is not a power of two",
                alignment
            ));
        }
        if padding > VALUE_TYPE_PADDING_MAX {
            return Err(invariant_error!(
                "Value type padding {} exceeds {}",
                padding,
                VALUE_TYPE_PADDING_MAX
            ));
        }

        // Classes are shifted by one so that zero can mean "pointer aligned".
        let alignment_class = alignment.trailing_zeros() + 1;
        let alignment_bits = alignment_class << VALUE_TYPE_PADDING_ALIGNMENT_SHIFT;
        if alignment_bits & !VALUE_TYPE_PADDING_ALIGNMENT_MASK != 0 {
            return Err(invariant_error!("Value type alignment {} is too large", alignment));
        }

        let low_bits = padding & VALUE_TYPE_PADDING_LOW_MASK;
        let high_bits = ((padding & !VALUE_TYPE_PADDING_LOW_MASK) >> VALUE_TYPE_PADDING_ALIGNMENT_SHIFT)
            << VALUE_TYPE_PADDING_HIGH_SHIFT;

        Ok(low_bits | high_bits | alignment_bits)
    }

    /// Unpack an optional-field value produced by [`ValueTypePadding::encode`]
    #[must_use]
    pub fn decode(value: u32, pointer_size: u32) -> Self {
        let padding = (value & VALUE_TYPE_PADDING_LOW_MASK)
            | ((value & VALUE_TYPE_PADDING_HIGH_MASK)
                >> (VALUE_TYPE_PADDING_HIGH_SHIFT - VALUE_TYPE_PADDING_ALIGNMENT_SHIFT));

        let alignment_class =
            (value & VALUE_TYPE_PADDING_ALIGNMENT_MASK) >> VALUE_TYPE_PADDING_ALIGNMENT_SHIFT;
        let alignment = if alignment_class == 0 {
            pointer_size
        } else {
            1 << (alignment_class - 1)
        };

        ValueTypePadding { padding, alignment }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_case_is_zero() {
        assert_eq!(ValueTypePadding::encode(0, 8, 8).unwrap(), 0);
        assert_eq!(ValueTypePadding::encode(0, 4, 4).unwrap(), 0);
        assert_ne!(ValueTypePadding::encode(0, 4, 8).unwrap(), 0);

        let decoded = ValueTypePadding::decode(0, 8);
        assert_eq!(decoded, ValueTypePadding { padding: 0, alignment: 8 });
    }

    #[test]
    fn roundtrip_grid() {
        for pointer_size in [4, 8] {
            for padding in [0, 1, 7, 255] {
                for alignment in [pointer_size, 8, 16] {
                    let encoded = ValueTypePadding::encode(padding, alignment, pointer_size).unwrap();
                    let decoded = ValueTypePadding::decode(encoded, pointer_size);
                    assert_eq!(
                        decoded,
                        ValueTypePadding { padding, alignment },
                        "padding {padding} alignment {alignment} pointer {pointer_size}"
                    );
                }
            }
        }
    }

    #[test]
    fn roundtrip_high_alignments_and_paddings() {
        let paddings = [
            0,
            1,
            8,
            9,
            0xFF,
            0x100,
            0x1234,
            0x00FF_FFFF,
            VALUE_TYPE_PADDING_MAX - 1,
            VALUE_TYPE_PADDING_MAX,
        ];
        for shift in 0..=7 {
            let alignment = 1u32 << shift;
            for padding in paddings {
                let encoded = ValueTypePadding::encode(padding, alignment, 8).unwrap();
                assert_eq!(
                    ValueTypePadding::decode(encoded, 8),
                    ValueTypePadding { padding, alignment }
                );
            }
        }
    }

    #[test]
    fn known_encoding() {
        // padding 9 = 0b1001: low bits 1, high bits (8 >> 3) << 8 = 0x100, alignment 16 -> class 5
        assert_eq!(ValueTypePadding::encode(9, 16, 8).unwrap(), 0x100 | (5 << 3) | 1);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert!(ValueTypePadding::encode(1, 12, 8).is_err());
        assert!(ValueTypePadding::encode(VALUE_TYPE_PADDING_MAX + 1, 8, 8).is_err());
        assert!(ValueTypePadding::encode(1, 1 << 31, 8).is_err());
    }
}
