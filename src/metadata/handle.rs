use std::fmt;

use strum::{Display, EnumCount, EnumIter, FromRepr};

use crate::Result;

/// The structural kind of a metadata record a [`Handle`] points at.
///
/// Handles are dispatched on this kind by the metadata resolution unit; every kind that can
/// denote a type-system entity has a resolution rule, and the remaining kinds (strings, blobs,
/// custom attributes, ...) are only ever read directly from the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumCount, FromRepr,
)]
#[repr(u8)]
pub enum HandleType {
    /// A type defined in this module
    TypeDefinition = 0x01,
    /// A reference to a type by name, possibly in another module
    TypeReference = 0x02,
    /// A type described by a signature blob (instantiations, arrays, pointers, ...)
    TypeSpecification = 0x03,
    /// A method defined in this module
    Method = 0x04,
    /// A field defined in this module
    Field = 0x05,
    /// A member referenced by parent, name and signature
    MemberReference = 0x06,
    /// A method definition paired with an explicit enclosing type
    QualifiedMethod = 0x07,
    /// A field definition paired with an explicit enclosing type
    QualifiedField = 0x08,
    /// The module (assembly) this metadata describes
    ScopeDefinition = 0x09,
    /// A referenced assembly
    ScopeReference = 0x0A,
    /// A namespace declared in this module
    NamespaceDefinition = 0x0B,
    /// A namespace inside a referenced assembly
    NamespaceReference = 0x0C,
    /// A generic method instantiated over type arguments
    MethodInstantiation = 0x0D,
    /// A generic parameter of a type or method
    GenericParameter = 0x0E,
    /// A custom attribute attached to a record
    CustomAttribute = 0x0F,
    /// An entry in the string heap
    String = 0x10,
    /// An entry in the blob heap
    Blob = 0x11,
}

/// A handle to a record in a [`crate::metadata::store::MetadataStore`].
///
/// Handles are 32-bit values where:
/// - The high byte (bits 24-31) holds the [`HandleType`]
/// - The low 24 bits (bits 0-23) hold the 1-based row of the record
///
/// Row 0 is the null handle of its kind.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

impl Handle {
    /// The null handle
    pub const NULL: Handle = Handle(0);

    /// Creates a handle of `kind` pointing at `row`
    #[must_use]
    pub fn new(kind: HandleType, row: u32) -> Self {
        Handle((u32::from(kind as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw handle value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the raw kind byte
    #[must_use]
    pub fn kind_byte(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Decodes the kind of record this handle points at
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the kind byte is not a known [`HandleType`].
    pub fn handle_type(&self) -> Result<HandleType> {
        HandleType::from_repr(self.kind_byte())
            .ok_or_else(|| malformed_error!("Unknown handle kind - {:#04x}", self.kind_byte()))
    }

    /// Returns true if this handle has kind `kind`
    #[must_use]
    pub fn is(&self, kind: HandleType) -> bool {
        self.kind_byte() == kind as u8
    }

    /// Returns the 1-based row index (0 for a null handle)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this handle does not point at a record
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }
}

impl From<u32> for Handle {
    fn from(value: u32) -> Self {
        Handle(value)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match HandleType::from_repr(self.kind_byte()) {
            Some(kind) => write!(f, "Handle({kind}, row: {})", self.row()),
            None => write!(f, "Handle(0x{:08x})", self.0),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
