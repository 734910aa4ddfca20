use crate::metadata::handle::Handle;

/// Element type codes of ECMA-335 signature blobs (II.23.1.16)
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef, TypeRef or TypeSpec handle
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef, TypeRef or TypeSpec handle
    pub const CLASS: u8 = 0x12;
    // Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter in a generic method definition, represented as number
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef handle
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef handle
    pub const CMOD_OPT: u8 = 0x20;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

/// Leading bytes of the signature kinds that carry one
#[allow(non_snake_case, missing_docs)]
pub mod SIGNATURE_HEADER {
    pub const FIELD: u8 = 0x06;
    pub const METHOD_SPEC: u8 = 0x0A;
}

/// Calling convention bits of a method signature header
#[allow(non_snake_case, missing_docs)]
pub mod CALLING_CONVENTION {
    pub const DEFAULT: u8 = 0x00;
    pub const VARARG: u8 = 0x05;
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
}

/// Represents a parsed type in various signatures
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    #[default]
    /// Not defined
    Unknown,
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// A pointer to a type
    Ptr(SignaturePointer),
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// Value type - TypeDefinition, TypeReference or TypeSpecification handle
    ValueType(Handle),
    /// Class - TypeDefinition, TypeReference or TypeSpecification handle
    Class(Handle),
    /// Generic type parameter, by position
    GenericParamType(u32),
    /// Multi-dimensional array
    Array(SignatureArray),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Type is referenced during runtime
    TypedByRef,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// System.Object
    Object,
    /// Single dimension array
    SzArray(SignatureSzArray),
    /// Generic method parameter, by position
    GenericParamMethod(u32),
    /// A pinned type
    Pinned(Box<TypeSignature>),
}

/// A custom modifier (`modreq` / `modopt`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomModifier {
    /// `modreq` if true, `modopt` otherwise
    pub is_required: bool,
    /// The modifier type
    pub modifier_type: Handle,
}

/// Size and lower bound of one array dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArrayDimensions {
    /// Number of elements, if specified
    pub size: Option<u32>,
    /// Lower bound, if specified
    pub lower_bound: Option<u32>,
}

/// A multi-dimensional array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureArray {
    /// The type in the array
    pub base: Box<TypeSignature>,
    /// The number of dimensions
    pub rank: u32,
    /// The dimensions (can be less than 'rank', are in order from 0..count)
    pub dimensions: Vec<ArrayDimensions>,
}

/// A single-dimension, zero-based array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureSzArray {
    /// Custom modifiers
    pub modifiers: Vec<CustomModifier>,
    /// The type in the array
    pub base: Box<TypeSignature>,
}

/// A pointer to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignaturePointer {
    /// Custom modifiers
    pub modifiers: Vec<CustomModifier>,
    /// The type pointed to
    pub base: Box<TypeSignature>,
}

/// Parameter with optional custom modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureParameter {
    /// Custom modifiers of the parameter
    pub modifiers: Vec<CustomModifier>,
    /// Parameter is passed by reference
    pub by_ref: bool,
    /// The type of the parameter
    pub base: TypeSignature,
}

/// Represents a method signature (II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// Used to encode the keyword instance in the calling convention, see §II.15.3
    pub has_this: bool,
    /// Used to encode the keyword explicit in the calling convention, see §II.15.3
    pub explicit_this: bool,
    /// Used to encode the keyword vararg in the calling convention, see §II.15.3
    pub vararg: bool,
    /// Number of generic parameters of the method
    pub param_count_generic: u32,
    /// The return type of this `Method`
    pub return_type: SignatureParameter,
    /// The parameters of this `Method`
    pub params: Vec<SignatureParameter>,
    /// The vararg parameters
    pub varargs: Vec<SignatureParameter>,
}

/// Field signature (II.23.2.4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureField {
    /// The custom modifiers for this field
    pub modifiers: Vec<CustomModifier>,
    /// The signature of this type
    pub base: TypeSignature,
}

/// Type specification signature (II.23.2.14)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureTypeSpec {
    /// Signature of this type
    pub base: TypeSignature,
}

/// Represents a method specification (II.23.2.15)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethodSpec {
    /// Types of the generic arguments
    pub generic_args: Vec<TypeSignature>,
}

impl TypeSignature {
    /// Shorthand for a class signature
    #[must_use]
    pub fn class(handle: Handle) -> Self {
        TypeSignature::Class(handle)
    }

    /// Shorthand for a value type signature
    #[must_use]
    pub fn value_type(handle: Handle) -> Self {
        TypeSignature::ValueType(handle)
    }

    /// Shorthand for a single-dimension array of `element`
    #[must_use]
    pub fn sz_array(element: TypeSignature) -> Self {
        TypeSignature::SzArray(SignatureSzArray {
            modifiers: Vec::new(),
            base: Box::new(element),
        })
    }

    /// Shorthand for a pointer to `pointee`
    #[must_use]
    pub fn pointer(pointee: TypeSignature) -> Self {
        TypeSignature::Ptr(SignaturePointer {
            modifiers: Vec::new(),
            base: Box::new(pointee),
        })
    }

    /// Shorthand for a generic instantiation
    #[must_use]
    pub fn generic_inst(definition: TypeSignature, arguments: Vec<TypeSignature>) -> Self {
        TypeSignature::GenericInst(Box::new(definition), arguments)
    }
}

impl SignatureParameter {
    /// A plain parameter of type `base`
    #[must_use]
    pub fn of(base: TypeSignature) -> Self {
        SignatureParameter {
            modifiers: Vec::new(),
            by_ref: false,
            base,
        }
    }
}

impl SignatureMethod {
    /// A non-generic signature
    #[must_use]
    pub fn new(has_this: bool, return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this,
            return_type: SignatureParameter::of(return_type),
            params: params.into_iter().map(SignatureParameter::of).collect(),
            ..SignatureMethod::default()
        }
    }

    /// Make this a generic method signature with `arity` parameters
    #[must_use]
    pub fn with_generic_arity(mut self, arity: u32) -> Self {
        self.param_count_generic = arity;
        self
    }
}
