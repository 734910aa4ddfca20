//! Size and alignment arithmetic.

use crate::Result;

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the value unchanged. `alignment` does not have to be a power of
/// two, but every alignment the layout code produces is.
///
/// # Examples
///
/// ```rust,ignore
/// use eetype::utils::align_up;
///
/// assert_eq!(align_up(13, 8), 16);
/// assert_eq!(align_up(16, 8), 16);
/// ```
#[must_use]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Converts a `usize` count to `u32`, failing instead of truncating.
///
/// # Errors
///
/// Returns an error if `value` exceeds `u32::MAX`.
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Value {value} exceeds u32::MAX"))
}

/// Converts a `usize` count to `u16`, the width of EEType slot and interface counts.
///
/// # Errors
///
/// Returns an error if `value` exceeds `u16::MAX`.
pub fn to_u16(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| malformed_error!("Value {value} exceeds u16::MAX"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(13, 4), 16);
        assert_eq!(align_up(24, 8), 24);
        assert_eq!(align_up(7, 1), 7);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn test_to_u32_valid() {
        assert_eq!(to_u32(0).unwrap(), 0);
        assert_eq!(to_u32(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_to_u32_overflow() {
        assert!(to_u32(u32::MAX as usize + 1).is_err());
    }

    #[test]
    fn test_to_u16() {
        assert_eq!(to_u16(65535).unwrap(), 65535);
        assert!(to_u16(65536).is_err());
    }
}
