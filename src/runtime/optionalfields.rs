//! Optional EEType fields.
//!
//! Attributes that only a handful of types need are kept out of the fixed EEType header and
//! stored in a small tag/value byte stream instead. The EEType points at the stream through its
//! `OptionalFieldsPtr` field, which itself only exists when at least one optional field is set.
//!
//! # Format
//!
//! ```text
//! entry := tag-byte value
//! tag-byte := (tag & 0x7F) | (0x80 if this is the last entry)
//! value := u32 in 7-bit variable-length encoding (1 to 5 bytes)
//! ```
//!
//! Entries are emitted in ascending [`OptionalFieldTag`] order. Lookups are a linear scan, which
//! is cheaper than an index for the handful of tags that exist.
//!
//! # Example
//!
//! ```rust
//! use eetype::runtime::optionalfields::{OptionalFieldTag, OptionalFieldsBuilder};
//!
//! let mut builder = OptionalFieldsBuilder::new();
//! builder.set_field(OptionalFieldTag::RareFlags, 0x20);
//! builder.set_field(OptionalFieldTag::DispatchMap, 300);
//!
//! let fields = builder.freeze().unwrap();
//! assert_eq!(fields.get_field(OptionalFieldTag::DispatchMap, 0)?, 300);
//! assert_eq!(fields.get_field(OptionalFieldTag::ValueTypeFieldPadding, 7)?, 7);
//! # Ok::<(), eetype::Error>(())
//! ```

use strum::{Display, EnumCount, EnumIter, FromRepr, IntoEnumIterator};

use crate::{
    file::{
        io::{sizeof_7bit_encoded_int, write_7bit_encoded_int},
        parser::Parser,
    },
    Result,
};

/// Marks the final entry of an optional-fields stream
pub const OPTIONAL_FIELD_LAST_ENTRY: u8 = 0x80;
/// Mask of the tag inside a tag byte
pub const OPTIONAL_FIELD_TAG_MASK: u8 = 0x7F;

/// Optional EEType fields, in canonical encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
pub enum OptionalFieldTag {
    /// The [`crate::runtime::flags::RareFlags`] word
    RareFlags = 0,
    /// Index of the type's dispatch map in the image dispatch-map table
    DispatchMap = 1,
    /// Encoded [`crate::runtime::padding::ValueTypePadding`]
    ValueTypeFieldPadding = 2,
    /// Offset of `Nullable<T>.value`, minus one
    NullableValueOffset = 3,
    /// Slot of `ICastable.IsInstanceOfInterface`
    ICastableIsInstSlot = 4,
    /// Slot of `ICastable.GetImplType`
    ICastableGetImplTypeSlot = 5,
}

/// Collects optional fields while a descriptor is being built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionalFieldsBuilder {
    values: [Option<u32>; OptionalFieldTag::COUNT],
}

impl OptionalFieldsBuilder {
    /// Create a builder with no fields set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `tag` to `value`, replacing any previous value
    pub fn set_field(&mut self, tag: OptionalFieldTag, value: u32) {
        self.values[tag as usize] = Some(value);
    }

    /// Current value of `tag`, if set
    #[must_use]
    pub fn get_field(&self, tag: OptionalFieldTag) -> Option<u32> {
        self.values[tag as usize]
    }

    /// Current value of `tag`, or `default` if unset
    #[must_use]
    pub fn get_field_or(&self, tag: OptionalFieldTag, default: u32) -> u32 {
        self.get_field(tag).unwrap_or(default)
    }

    /// Remove `tag`
    pub fn clear_field(&mut self, tag: OptionalFieldTag) {
        self.values[tag as usize] = None;
    }

    /// Returns true if any field is set
    #[must_use]
    pub fn is_at_least_one_field_used(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }

    /// Iterate over the set fields in encoding order
    pub fn iter(&self) -> impl Iterator<Item = (OptionalFieldTag, u32)> + '_ {
        OptionalFieldTag::iter().filter_map(|tag| self.get_field(tag).map(|value| (tag, value)))
    }

    /// Number of bytes [`OptionalFieldsBuilder::encode`] produces
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        self.iter()
            .map(|(_, value)| 1 + sizeof_7bit_encoded_int(value))
            .sum()
    }

    /// Encode the set fields. An empty builder encodes to an empty stream.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        let last = self.iter().last().map(|(tag, _)| tag);

        for (tag, value) in self.iter() {
            let mut tag_byte = tag as u8;
            if Some(tag) == last {
                tag_byte |= OPTIONAL_FIELD_LAST_ENTRY;
            }
            out.push(tag_byte);
            write_7bit_encoded_int(&mut out, value);
        }

        out
    }

    /// Freeze into an immutable blob, or `None` if no field is set
    #[must_use]
    pub fn freeze(&self) -> Option<OptionalFields> {
        if self.is_at_least_one_field_used() {
            Some(OptionalFields { data: self.encode() })
        } else {
            None
        }
    }

    /// Decode a complete stream back into a builder.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or duplicate entries, and
    /// [`crate::Error::OutOfBounds`] for a truncated stream.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut builder = OptionalFieldsBuilder::new();
        let mut parser = Parser::new(data);

        while parser.has_more_data() {
            let (tag, value, last) = read_entry(&mut parser)?;
            if builder.get_field(tag).is_some() {
                return Err(malformed_error!("Duplicate optional field - {}", tag));
            }
            builder.set_field(tag, value);
            if last {
                break;
            }
        }

        Ok(builder)
    }
}

/// An encoded, immutable optional-fields blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionalFields {
    data: Vec<u8>,
}

impl OptionalFields {
    /// Wrap raw encoded bytes
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        OptionalFields { data }
    }

    /// The encoded bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Look up `tag`, see [`get_optional_field`]
    ///
    /// # Errors
    /// See [`get_optional_field`].
    pub fn get_field(&self, tag: OptionalFieldTag, default: u32) -> Result<u32> {
        get_optional_field(&self.data, tag, default)
    }
}

fn read_entry(parser: &mut Parser<'_>) -> Result<(OptionalFieldTag, u32, bool)> {
    let tag_byte = parser.read_le::<u8>()?;
    let Some(tag) = OptionalFieldTag::from_repr(tag_byte & OPTIONAL_FIELD_TAG_MASK) else {
        return Err(malformed_error!(
            "Unknown optional field tag - {:#04x}",
            tag_byte
        ));
    };
    let value = parser.read_7bit_encoded_int()?;

    Ok((tag, value, tag_byte & OPTIONAL_FIELD_LAST_ENTRY != 0))
}

/// Scan `data` for `tag`.
///
/// Entries are read in order until `tag` is found, the last-entry marker is seen, or the stream
/// ends; the latter two yield `default`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for an unknown tag and [`crate::Error::OutOfBounds`] for
/// a value cut short, if such an entry is reached before `tag`.
pub fn get_optional_field(data: &[u8], tag: OptionalFieldTag, default: u32) -> Result<u32> {
    let mut parser = Parser::new(data);

    while parser.has_more_data() {
        let (entry_tag, value, last) = read_entry(&mut parser)?;
        if entry_tag == tag {
            return Ok(value);
        }
        if last {
            break;
        }
    }

    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_freezes_to_nothing() {
        let builder = OptionalFieldsBuilder::new();
        assert!(!builder.is_at_least_one_field_used());
        assert!(builder.encode().is_empty());
        assert!(builder.freeze().is_none());
        assert_eq!(
            get_optional_field(&[], OptionalFieldTag::RareFlags, 42).unwrap(),
            42
        );
    }

    #[test]
    fn encoding_is_canonical_and_marks_last() {
        let mut builder = OptionalFieldsBuilder::new();
        builder.set_field(OptionalFieldTag::NullableValueOffset, 3);
        builder.set_field(OptionalFieldTag::RareFlags, 0x84);

        assert_eq!(builder.encode(), vec![0x00, 0x84, 0x01, 0x83, 0x03]);
        assert_eq!(builder.encoded_size(), 5);
    }

    #[test]
    fn set_get_clear() {
        let mut builder = OptionalFieldsBuilder::new();
        builder.set_field(OptionalFieldTag::DispatchMap, 1);
        builder.set_field(OptionalFieldTag::DispatchMap, 2);
        assert_eq!(builder.get_field(OptionalFieldTag::DispatchMap), Some(2));
        assert_eq!(builder.get_field_or(OptionalFieldTag::RareFlags, 9), 9);

        builder.clear_field(OptionalFieldTag::DispatchMap);
        assert!(!builder.is_at_least_one_field_used());
    }

    #[test]
    fn roundtrip_every_subset() {
        let values = [0x20, 7, u32::MAX, 0, 0x3FFF, 0x80];

        // Every subset of the six tags, exercising first/last markers in all positions
        for mask in 0u32..(1 << OptionalFieldTag::COUNT) {
            let mut builder = OptionalFieldsBuilder::new();
            for tag in OptionalFieldTag::iter() {
                if mask & (1 << tag as u32) != 0 {
                    builder.set_field(tag, values[tag as usize]);
                }
            }

            let encoded = builder.encode();
            for tag in OptionalFieldTag::iter() {
                let expected = builder.get_field_or(tag, 0xDEAD);
                assert_eq!(
                    get_optional_field(&encoded, tag, 0xDEAD).unwrap(),
                    expected,
                    "mask {mask:#b} tag {tag}"
                );
            }
            assert_eq!(OptionalFieldsBuilder::decode(&encoded).unwrap(), builder);
        }
    }

    #[test]
    fn scan_stops_at_last_entry() {
        // RareFlags is marked last; trailing garbage must never be read
        let data = [0x80, 0x05, 0xFF, 0xFF];
        assert_eq!(
            get_optional_field(&data, OptionalFieldTag::DispatchMap, 1).unwrap(),
            1
        );
    }

    #[test]
    fn malformed_streams() {
        // Unknown tag
        assert!(matches!(
            get_optional_field(&[0x7F, 0x00], OptionalFieldTag::DispatchMap, 0),
            Err(crate::Error::Malformed { .. })
        ));
        // Truncated value
        assert!(matches!(
            get_optional_field(&[0x01, 0x80], OptionalFieldTag::RareFlags, 0),
            Err(crate::Error::OutOfBounds)
        ));
        // Duplicate tag
        assert!(OptionalFieldsBuilder::decode(&[0x01, 0x01, 0x81, 0x02]).is_err());
    }

    #[test]
    fn frozen_blob_lookup() {
        let mut builder = OptionalFieldsBuilder::new();
        builder.set_field(OptionalFieldTag::ICastableGetImplTypeSlot, 12);
        let frozen = builder.freeze().unwrap();
        assert_eq!(frozen.as_bytes(), &[0x85, 0x0C]);
        assert_eq!(
            frozen
                .get_field(OptionalFieldTag::ICastableGetImplTypeSlot, 0)
                .unwrap(),
            12
        );
        assert_eq!(OptionalFields::from_bytes(vec![0x85, 0x0C]), frozen);
    }
}
