//! EEType flag words.
//!
//! The fixed header of every EEType carries a 16-bit [`EETypeFlags`] word. Attributes too rare to
//! earn a bit there live in the 32-bit [`RareFlags`] word, which is stored as the `RareFlags`
//! entry of the optional-fields blob.
//!
//! # Header flag layout
//!
//! | Bits | Meaning |
//! |------|---------|
//! | 0-1  | [`EETypeKind`] |
//! | 2    | related type is reached through an indirection cell |
//! | 3    | value type |
//! | 4    | has finalizer |
//! | 5    | contains GC pointers |
//! | 6    | allocated at runtime |
//! | 7    | has generic variance |
//! | 8    | has optional fields |
//! | 9    | interface |
//! | 10   | generic instantiation |
//! | 11-15| embedded `CorElementType` |

use bitflags::bitflags;
use strum::Display;

/// Bitmask for the kind bits of [`EETypeFlags`]
pub const EETYPE_KIND_MASK: u16 = 0x0003;
/// Bitmask for the embedded element type of [`EETypeFlags`]
pub const EETYPE_ELEMENT_TYPE_MASK: u16 = 0xF800;
/// Shift of the embedded element type of [`EETypeFlags`]
pub const EETYPE_ELEMENT_TYPE_SHIFT: u16 = 11;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags stored in the fixed EEType header
    pub struct EETypeFlags: u16 {
        /// Mask covering the two [`EETypeKind`] bits
        const KIND_MASK = EETYPE_KIND_MASK;
        /// The related type pointer points at an indirection cell
        const RELATED_TYPE_VIA_IAT = 0x0004;
        /// The type is a value type
        const VALUE_TYPE = 0x0008;
        /// Instances must be finalized; the finalizer slot is present
        const HAS_FINALIZER = 0x0010;
        /// Instances contain GC references; a GC descriptor precedes the EEType
        const HAS_POINTERS = 0x0020;
        /// The EEType was created by the runtime type loader
        const RUNTIME_ALLOCATED = 0x0040;
        /// At least one generic parameter is co- or contravariant
        const GENERIC_VARIANCE = 0x0080;
        /// The optional-fields pointer is present
        const OPTIONAL_FIELDS = 0x0100;
        /// The type is an interface
        const IS_INTERFACE = 0x0200;
        /// The type is a generic instantiation; definition and composition pointers are present
        const IS_GENERIC = 0x0400;
        /// Mask covering the embedded element type
        const ELEMENT_TYPE_MASK = EETYPE_ELEMENT_TYPE_MASK;
    }
}

/// Structural category encoded in the low two bits of [`EETypeFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u16)]
pub enum EETypeKind {
    /// Ordinary type with its own layout
    Canonical = 0x0000,
    /// Copy of another EEType; the related type is the canonical one
    Cloned = 0x0001,
    /// Array, pointer or by-ref; the related type is the element
    Parameterized = 0x0002,
    /// Open generic type definition
    GenericTypeDefinition = 0x0003,
}

impl EETypeFlags {
    /// Build a flag word of the given kind with no other bits set
    #[must_use]
    pub fn of_kind(kind: EETypeKind) -> Self {
        Self::from_bits_retain(kind as u16)
    }

    /// The structural kind
    #[must_use]
    pub fn kind(self) -> EETypeKind {
        match self.bits() & EETYPE_KIND_MASK {
            0 => EETypeKind::Canonical,
            1 => EETypeKind::Cloned,
            2 => EETypeKind::Parameterized,
            _ => EETypeKind::GenericTypeDefinition,
        }
    }

    /// Replace the kind bits
    #[must_use]
    pub fn with_kind(self, kind: EETypeKind) -> Self {
        Self::from_bits_retain((self.bits() & !EETYPE_KIND_MASK) | kind as u16)
    }

    /// The embedded `CorElementType` (0 if none)
    #[must_use]
    pub fn element_type(self) -> u8 {
        ((self.bits() & EETYPE_ELEMENT_TYPE_MASK) >> EETYPE_ELEMENT_TYPE_SHIFT) as u8
    }

    /// Replace the embedded `CorElementType`; only the low five bits of `element_type` are kept
    #[must_use]
    pub fn with_element_type(self, element_type: u8) -> Self {
        let encoded = (u16::from(element_type) << EETYPE_ELEMENT_TYPE_SHIFT) & EETYPE_ELEMENT_TYPE_MASK;
        Self::from_bits_retain((self.bits() & !EETYPE_ELEMENT_TYPE_MASK) | encoded)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags stored in the `RareFlags` optional field
    pub struct RareFlags: u32 {
        /// Instances need 8-byte alignment (ARM32 only)
        const REQUIRES_ALIGN8 = 0x0000_0001;
        /// The type implements ICastable; the ICastable slot fields are meaningful
        const ICASTABLE = 0x0000_0002;
        /// The type is an instantiation of `System.Nullable<T>`; the nullable type field is present
        const IS_NULLABLE = 0x0000_0004;
        /// The nullable type pointer points at an indirection cell
        const NULLABLE_TYPE_VIA_IAT = 0x0000_0008;
        /// The type was built at runtime; the dynamic template type field is present
        const IS_DYNAMIC_TYPE = 0x0000_0010;
        /// The type has a static constructor
        const HAS_CCTOR = 0x0000_0020;
        /// The sealed virtual slots field is present
        const HAS_SEALED_VTABLE_ENTRIES = 0x0000_0040;
        /// The dynamically allocated dispatch map field is present
        const HAS_DYNAMICALLY_ALLOCATED_DISPATCH_MAP = 0x0000_0080;
        /// The type is a homogeneous float aggregate
        const IS_HFA = 0x0000_0100;
        /// The dynamic GC statics field is present
        const IS_DYNAMIC_TYPE_WITH_GC_STATICS = 0x0000_0400;
        /// The dynamic non-GC statics field is present
        const IS_DYNAMIC_TYPE_WITH_NON_GC_STATICS = 0x0000_0800;
        /// The dynamic thread-static offset field is present
        const IS_DYNAMIC_TYPE_WITH_THREAD_STATICS = 0x0000_1000;
        /// The dynamic module field is present
        const HAS_DYNAMIC_MODULE = 0x0000_2000;
        /// The type is abstract
        const IS_ABSTRACT_CLASS = 0x0000_4000;
        /// The type is a by-ref-like value type
        const IS_BYREF_LIKE = 0x0000_8000;
    }
}

/// `CorElementType` values embedded into [`EETypeFlags`]
#[allow(non_snake_case)]
pub mod COR_ELEMENT_TYPE {
    /// `System.Boolean`
    pub const BOOLEAN: u8 = 0x02;
    /// `System.Char`
    pub const CHAR: u8 = 0x03;
    /// `System.SByte`
    pub const I1: u8 = 0x04;
    /// `System.Byte`
    pub const U1: u8 = 0x05;
    /// `System.Int16`
    pub const I2: u8 = 0x06;
    /// `System.UInt16`
    pub const U2: u8 = 0x07;
    /// `System.Int32`
    pub const I4: u8 = 0x08;
    /// `System.UInt32`
    pub const U4: u8 = 0x09;
    /// `System.Int64`
    pub const I8: u8 = 0x0A;
    /// `System.UInt64`
    pub const U8: u8 = 0x0B;
    /// `System.Single`
    pub const R4: u8 = 0x0C;
    /// `System.Double`
    pub const R8: u8 = 0x0D;
    /// `System.Array` and every array type
    pub const ARRAY: u8 = 0x14;
    /// `System.IntPtr`
    pub const I: u8 = 0x18;
    /// `System.UIntPtr`
    pub const U: u8 = 0x19;
}
