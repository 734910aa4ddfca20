//! Attribute flag words of metadata records.
//!
//! These are the ECMA-335 flag values carried by type, method, field, generic parameter and
//! assembly reference records. The type system derives its cached flags from them.

use bitflags::bitflags;

/// Bitmask for type visibility extraction
pub const TYPE_VISIBILITY_MASK: u32 = 0x0000_0007;
/// Bitmask for type layout extraction
pub const TYPE_LAYOUT_MASK: u32 = 0x0000_0018;
/// Bitmask for method access extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;
/// Bitmask for field access extraction
pub const FIELD_ACCESS_MASK: u32 = 0x0007;
/// Bitmask for generic parameter variance extraction
pub const GENERIC_VARIANCE_MASK: u16 = 0x0003;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags of a type definition (II.23.1.15)
    pub struct TypeAttributes: u32 {
        /// Type is visible outside its assembly
        const PUBLIC = 0x0000_0001;
        /// Nested type with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested type with private visibility
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested type with family visibility
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested type with assembly visibility
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields carry explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Type is imported
        const IMPORT = 0x0000_1000;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Static constructor may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0000_0800;
    }
}

/// Field placement strategy of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutKind {
    /// The runtime chooses the order
    #[default]
    Auto,
    /// Declaration order
    Sequential,
    /// Explicit offsets
    Explicit,
}

impl TypeAttributes {
    /// Field placement strategy
    #[must_use]
    pub fn layout(self) -> LayoutKind {
        match self.bits() & TYPE_LAYOUT_MASK {
            0x08 => LayoutKind::Sequential,
            0x10 => LayoutKind::Explicit,
            _ => LayoutKind::Auto,
        }
    }

    /// True for the nested visibilities
    #[must_use]
    pub fn is_nested(self) -> bool {
        self.bits() & TYPE_VISIBILITY_MASK > 1
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags of a method definition (II.23.1.10)
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method can only be overriden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime provides special behavior depending on the name
        const RT_SPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Implementation flags of a method definition (II.23.1.11)
    pub struct MethodImplAttributes: u16 {
        /// Implementation is provided by the runtime
        const RUNTIME = 0x0003;
        /// Method cannot be inlined
        const NO_INLINING = 0x0008;
        /// Method is single-threaded through its body
        const SYNCHRONIZED = 0x0020;
        /// Signature is exported exactly as declared
        const PRESERVE_SIG = 0x0080;
        /// Method should be inlined if possible
        const AGGRESSIVE_INLINING = 0x0100;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

impl MethodImplAttributes {
    /// True if the code type bits say the runtime implements the method
    #[must_use]
    pub fn is_runtime(self) -> bool {
        self.bits() & 0x0003 == 0x0003
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags of a field definition (II.23.1.5)
    pub struct FieldAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone in the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized
        const INIT_ONLY = 0x0020;
        /// Value is a compile time constant
        const LITERAL = 0x0040;
        /// Field has an RVA
        const HAS_FIELD_RVA = 0x0100;
        /// Name is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0400;
        /// Field has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags of a generic parameter (II.23.1.7)
    pub struct GenericParameterAttributes: u16 {
        /// The parameter is covariant
        const COVARIANT = 0x0001;
        /// The parameter is contravariant
        const CONTRAVARIANT = 0x0002;
        /// Argument must be a reference type
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// Argument must be a non-nullable value type
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// Argument must have a public default constructor
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Flags of an assembly reference (II.23.1.2)
    pub struct AssemblyFlags: u32 {
        /// The public key field holds the full key, not its token
        const PUBLIC_KEY = 0x0001;
        /// The assembly may be retargeted at runtime
        const RETARGETABLE = 0x0100;
        /// Windows Runtime content
        const WINDOWS_RUNTIME = 0x0200;
    }
}

/// Variance of a generic parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variance {
    /// Invariant
    #[default]
    None,
    /// `out T`
    Covariant,
    /// `in T`
    Contravariant,
}

impl GenericParameterAttributes {
    /// Declared variance
    #[must_use]
    pub fn variance(self) -> Variance {
        match self.bits() & GENERIC_VARIANCE_MASK {
            0x1 => Variance::Covariant,
            0x2 => Variance::Contravariant,
            _ => Variance::None,
        }
    }
}
