//! Lazily accumulated flag caches of types and methods.
//!
//! Every flag group has a "computed" bit. The first caller to need a group computes it and ORs
//! the result, together with the computed bit, into the shared word. Racing callers compute the
//! same bits and the OR is idempotent, so no lock is needed.

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use strum::{Display, FromRepr};

use crate::Result;

/// Mask of the category value inside [`TypeFlags`]
pub const TYPE_CATEGORY_MASK: u32 = 0x0000_003F;

/// Structural category of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u32)]
pub enum TypeCategory {
    /// `System.Void`
    Void = 0x01,
    /// `System.Boolean`
    Boolean = 0x02,
    /// `System.Char`
    Char = 0x03,
    /// `System.SByte`
    SByte = 0x04,
    /// `System.Byte`
    Byte = 0x05,
    /// `System.Int16`
    Int16 = 0x06,
    /// `System.UInt16`
    UInt16 = 0x07,
    /// `System.Int32`
    Int32 = 0x08,
    /// `System.UInt32`
    UInt32 = 0x09,
    /// `System.Int64`
    Int64 = 0x0A,
    /// `System.UInt64`
    UInt64 = 0x0B,
    /// `System.IntPtr`
    IntPtr = 0x0C,
    /// `System.UIntPtr`
    UIntPtr = 0x0D,
    /// `System.Single`
    Single = 0x0E,
    /// `System.Double`
    Double = 0x0F,
    /// Any other value type
    ValueType = 0x10,
    /// An enum
    Enum = 0x11,
    /// `System.Nullable<T>`
    Nullable = 0x12,
    /// A reference type
    Class = 0x14,
    /// An interface
    Interface = 0x15,
    /// A multi-dimensional array
    Array = 0x16,
    /// A single-dimension, zero-based array
    SzArray = 0x17,
    /// A managed reference
    ByRef = 0x18,
    /// An unmanaged pointer
    Pointer = 0x19,
    /// A function pointer
    FunctionPointer = 0x1A,
    /// A generic parameter of a type or method definition
    GenericParameter = 0x1B,
    /// `!n` in a signature
    SignatureTypeVariable = 0x1C,
    /// `!!n` in a signature
    SignatureMethodVariable = 0x1D,
}

impl TypeCategory {
    /// Returns true for the primitive categories, `Void` to `Double`
    #[must_use]
    pub fn is_primitive(self) -> bool {
        (self as u32) <= TypeCategory::Double as u32
    }

    /// Returns true for the categories whose instances are values rather than references
    #[must_use]
    pub fn is_value_type(self) -> bool {
        (self as u32) <= TypeCategory::Nullable as u32
    }

    /// Size and alignment of a primitive, `None` for other categories.
    ///
    /// `IntPtr` and `UIntPtr` take the pointer size.
    #[must_use]
    pub fn primitive_size(self, pointer_size: u32) -> Option<u32> {
        match self {
            TypeCategory::Void => Some(0),
            TypeCategory::Boolean | TypeCategory::SByte | TypeCategory::Byte => Some(1),
            TypeCategory::Char | TypeCategory::Int16 | TypeCategory::UInt16 => Some(2),
            TypeCategory::Int32 | TypeCategory::UInt32 | TypeCategory::Single => Some(4),
            TypeCategory::Int64 | TypeCategory::UInt64 | TypeCategory::Double => Some(8),
            TypeCategory::IntPtr | TypeCategory::UIntPtr => Some(pointer_size),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Cached facts about a type
    pub struct TypeFlags: u32 {
        /// The category bits hold a valid [`TypeCategory`]
        const CATEGORY_COMPUTED = 0x0000_0100;

        /// At least one generic parameter of the definition is co- or contravariant
        const HAS_GENERIC_VARIANCE = 0x0000_0200;
        /// `HAS_GENERIC_VARIANCE` is valid
        const HAS_GENERIC_VARIANCE_COMPUTED = 0x0000_0400;

        /// A `Finalize` override exists below `System.Object`
        const HAS_FINALIZER = 0x0000_0800;
        /// `HAS_FINALIZER` is valid
        const HAS_FINALIZER_COMPUTED = 0x0000_1000;

        /// The type declares a static constructor
        const HAS_STATIC_CONSTRUCTOR = 0x0000_2000;
        /// `HAS_STATIC_CONSTRUCTOR` is valid
        const HAS_STATIC_CONSTRUCTOR_COMPUTED = 0x0000_4000;

        /// Marked with `IsByRefLikeAttribute`
        const IS_BYREF_LIKE = 0x0000_8000;
        /// Marked with `IntrinsicAttribute`
        const IS_INTRINSIC = 0x0001_0000;
        /// The custom-attribute derived flags are valid
        const ATTRIBUTE_CACHE_COMPUTED = 0x0002_0000;

        const _ = TYPE_CATEGORY_MASK;
    }
}

impl TypeFlags {
    /// A flag word holding `category`, marked computed
    #[must_use]
    pub fn from_category(category: TypeCategory) -> Self {
        TypeFlags::from_bits_retain(category as u32) | TypeFlags::CATEGORY_COMPUTED
    }

    /// The category, if it has been computed
    #[must_use]
    pub fn category(self) -> Option<TypeCategory> {
        if self.contains(TypeFlags::CATEGORY_COMPUTED) {
            TypeCategory::from_repr(self.bits() & TYPE_CATEGORY_MASK)
        } else {
            None
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Cached facts about a method
    pub struct MethodFlags: u32 {
        /// Method is virtual
        const VIRTUAL = 0x0001;
        /// Method introduces a new vtable slot
        const NEW_SLOT = 0x0002;
        /// Method has no implementation
        const ABSTRACT = 0x0004;
        /// Method cannot be overridden
        const FINAL = 0x0008;
        /// Method has no `this`
        const STATIC = 0x0010;
        /// Name is special (constructors, accessors)
        const SPECIAL_NAME = 0x0020;
        /// Method must not be inlined
        const NO_INLINING = 0x0040;
        /// Method should be inlined
        const AGGRESSIVE_INLINING = 0x0080;
        /// Body is supplied by the runtime
        const RUNTIME_IMPLEMENTED = 0x0100;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x0200;
        /// Body runs under the instance lock
        const SYNCHRONIZED = 0x0400;
        /// The metadata derived flags are valid
        const BASIC_METADATA_CACHE = 0x1000;

        /// Marked with `IntrinsicAttribute`
        const INTRINSIC = 0x0001_0000;
        /// Marked with `UnmanagedCallersOnlyAttribute`
        const UNMANAGED_CALLERS_ONLY = 0x0002_0000;
        /// Marked with `RuntimeExportAttribute`
        const RUNTIME_EXPORT = 0x0004_0000;
        /// The custom-attribute derived flags are valid
        const ATTRIBUTE_METADATA_CACHE = 0x0010_0000;
    }
}

/// An OR-accumulated flag word
#[derive(Debug, Default)]
pub(crate) struct FlagCache(AtomicU32);

impl FlagCache {
    pub(crate) fn new(initial: u32) -> Self {
        FlagCache(AtomicU32::new(initial))
    }

    /// The current word
    pub(crate) fn load(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the word once `computed` is set, running `compute` first if it is not.
    ///
    /// `compute` returns the bits of the group; `computed` is ORed in with them.
    pub(crate) fn get_or_compute<F>(&self, computed: u32, compute: F) -> Result<u32>
    where
        F: FnOnce() -> Result<u32>,
    {
        let current = self.load();
        if current & computed == computed {
            return Ok(current);
        }

        let bits = compute()? | computed;
        Ok(self.0.fetch_or(bits, Ordering::AcqRel) | bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trip() {
        let flags = TypeFlags::from_category(TypeCategory::SzArray);
        assert_eq!(flags.category(), Some(TypeCategory::SzArray));
        assert_eq!(TypeFlags::from_bits_retain(0x17).category(), None);
    }

    #[test]
    fn category_predicates() {
        assert!(TypeCategory::Int32.is_primitive());
        assert!(TypeCategory::Int32.is_value_type());
        assert!(TypeCategory::Nullable.is_value_type());
        assert!(!TypeCategory::Enum.is_primitive());
        assert!(!TypeCategory::Class.is_value_type());
        assert_eq!(TypeCategory::IntPtr.primitive_size(4), Some(4));
        assert_eq!(TypeCategory::Double.primitive_size(4), Some(8));
        assert_eq!(TypeCategory::Class.primitive_size(8), None);
    }

    #[test]
    fn groups_accumulate() {
        let cache = FlagCache::default();
        let word = cache
            .get_or_compute(TypeFlags::HAS_FINALIZER_COMPUTED.bits(), || {
                Ok(TypeFlags::HAS_FINALIZER.bits())
            })
            .unwrap();
        assert_ne!(word & TypeFlags::HAS_FINALIZER.bits(), 0);

        // A computed group is never recomputed
        let word = cache
            .get_or_compute(TypeFlags::HAS_FINALIZER_COMPUTED.bits(), || {
                panic!("recomputed")
            })
            .unwrap();
        assert_ne!(word & TypeFlags::HAS_FINALIZER.bits(), 0);

        let word = cache
            .get_or_compute(TypeFlags::CATEGORY_COMPUTED.bits(), || {
                Ok(TypeCategory::Class as u32)
            })
            .unwrap();
        assert_eq!(
            TypeFlags::from_bits_retain(word).category(),
            Some(TypeCategory::Class)
        );
        assert_ne!(word & TypeFlags::HAS_FINALIZER_COMPUTED.bits(), 0);
    }

    #[test]
    fn failed_computation_leaves_group_unset() {
        let cache = FlagCache::default();
        let result = cache.get_or_compute(MethodFlags::BASIC_METADATA_CACHE.bits(), || {
            Err(crate::Error::UnitUnavailable)
        });
        assert!(result.is_err());
        assert_eq!(cache.load(), 0);
    }
}
