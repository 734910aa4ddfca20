//! Read-only metadata records and the store that serves them.
//!
//! A [`MetadataStore`] is the persisted view of one module: a set of immutable records indexed by
//! [`Handle`], plus the string and blob heaps they point into. The resolution unit never mutates
//! a store; it only reads records and materializes type-system entities from them.
//!
//! Children are reached through the records themselves. A [`TypeDefinition`] lists its fields,
//! methods, nested types, generic parameters, interfaces and custom attributes, a
//! [`MethodDefinition`] lists its generic parameters and custom attributes.
//!
//! # Namespaces
//!
//! Namespaces are chains of single-segment records. A [`NamespaceDefinition`] chain ends at the
//! root namespace of the module (the record with a null parent). A [`NamespaceReference`] chain
//! ends at the [`ScopeReference`] (or [`ScopeDefinition`]) that owns it, which is how a type
//! reference names the assembly it lives in.

use crate::{
    metadata::{
        attributes::{
            AssemblyFlags, FieldAttributes, GenericParameterAttributes, MethodAttributes,
            MethodImplAttributes, TypeAttributes,
        },
        handle::Handle,
    },
    Result,
};

/// Version of an assembly, `major.minor.build.revision`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component
    pub major: u16,
    /// Minor version component
    pub minor: u16,
    /// Build version component
    pub build: u16,
    /// Revision version component
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a new assembly version with the specified components
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }
}

/// The module this store describes
#[derive(Debug, Clone)]
pub struct ScopeDefinition {
    /// Simple assembly name (String)
    pub name: Handle,
    /// Assembly version
    pub version: AssemblyVersion,
    /// Culture name (String), null when neutral
    pub culture: Handle,
    /// Public key (Blob), null when not strong named
    pub public_key: Handle,
    /// Assembly flags
    pub flags: AssemblyFlags,
    /// The root namespace definition
    pub root_namespace: Handle,
}

/// A referenced assembly
#[derive(Debug, Clone)]
pub struct ScopeReference {
    /// Simple assembly name (String)
    pub name: Handle,
    /// Requested version
    pub version: AssemblyVersion,
    /// Culture name (String), null when neutral
    pub culture: Handle,
    /// Public key or token (Blob), null when not strong named
    pub public_key_or_token: Handle,
    /// Assembly flags; [`AssemblyFlags::PUBLIC_KEY`] tells key from token
    pub flags: AssemblyFlags,
}

/// One segment of a namespace declared in this module
#[derive(Debug, Clone)]
pub struct NamespaceDefinition {
    /// Enclosing namespace definition, null for the root namespace
    pub parent: Handle,
    /// Segment name (String), null for the root namespace
    pub name: Handle,
}

/// One segment of a namespace in a referenced scope
#[derive(Debug, Clone)]
pub struct NamespaceReference {
    /// Enclosing namespace reference, or the scope reference or scope definition owning the chain
    pub parent: Handle,
    /// Segment name (String), null for the root namespace
    pub name: Handle,
}

/// A type defined in this module
#[derive(Debug, Clone, Default)]
pub struct TypeDefinition {
    /// Type attributes
    pub flags: TypeAttributes,
    /// Simple name (String)
    pub name: Handle,
    /// Namespace definition; ignored for nested types
    pub namespace: Handle,
    /// Enclosing type definition, null for top-level types
    pub enclosing_type: Handle,
    /// Base type (TypeDefinition, TypeReference or TypeSpecification), null for none
    pub base_type: Handle,
    /// Explicitly implemented interfaces
    pub interfaces: Vec<Handle>,
    /// Field definitions, in declaration order
    pub fields: Vec<Handle>,
    /// Method definitions, in declaration order
    pub methods: Vec<Handle>,
    /// Nested type definitions
    pub nested_types: Vec<Handle>,
    /// Generic parameters, in position order
    pub generic_parameters: Vec<Handle>,
    /// Custom attributes applied to the type
    pub custom_attributes: Vec<Handle>,
    /// Packing size from the class layout, 0 when unspecified
    pub packing_size: u16,
    /// Explicit instance size from the class layout, 0 when unspecified
    pub class_size: u32,
}

/// A method defined in this module
#[derive(Debug, Clone, Default)]
pub struct MethodDefinition {
    /// Method attributes
    pub flags: MethodAttributes,
    /// Implementation attributes
    pub impl_flags: MethodImplAttributes,
    /// Name (String)
    pub name: Handle,
    /// Method signature (Blob)
    pub signature: Handle,
    /// Declaring type definition
    pub owner: Handle,
    /// Generic parameters, in position order
    pub generic_parameters: Vec<Handle>,
    /// Custom attributes applied to the method
    pub custom_attributes: Vec<Handle>,
}

/// A field defined in this module
#[derive(Debug, Clone, Default)]
pub struct FieldDefinition {
    /// Field attributes
    pub flags: FieldAttributes,
    /// Name (String)
    pub name: Handle,
    /// Field signature (Blob)
    pub signature: Handle,
    /// Declaring type definition
    pub owner: Handle,
    /// Explicit offset, for types with explicit layout
    pub offset: Option<u32>,
    /// Custom attributes applied to the field
    pub custom_attributes: Vec<Handle>,
}

/// Whether a generic parameter belongs to a type or a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GenericParameterKind {
    /// `!n`, declared on a type
    #[default]
    Type,
    /// `!!n`, declared on a method
    Method,
}

/// A generic parameter of a type or method
#[derive(Debug, Clone, Default)]
pub struct GenericParameter {
    /// Variance and constraint flags
    pub flags: GenericParameterAttributes,
    /// Position in the owner's parameter list
    pub number: u16,
    /// Owner kind
    pub kind: GenericParameterKind,
    /// Name (String)
    pub name: Handle,
    /// Owning type or method definition
    pub owner: Handle,
    /// Constraint types
    pub constraints: Vec<Handle>,
}

/// A type named by scope, namespace and name
#[derive(Debug, Clone)]
pub struct TypeReference {
    /// A NamespaceReference for top-level types, or the enclosing TypeReference for nested types
    pub parent: Handle,
    /// Simple name (String)
    pub name: Handle,
}

/// A type described by a signature blob
#[derive(Debug, Clone)]
pub struct TypeSpecification {
    /// Type signature (Blob)
    pub signature: Handle,
}

/// A field or method referenced by parent, name and signature
#[derive(Debug, Clone)]
pub struct MemberReference {
    /// The type to search (TypeDefinition, TypeReference or TypeSpecification)
    pub parent: Handle,
    /// Member name (String)
    pub name: Handle,
    /// Field or method signature (Blob); the header byte tells them apart
    pub signature: Handle,
}

/// A method definition paired with an explicit enclosing type
#[derive(Debug, Clone)]
pub struct QualifiedMethod {
    /// Enclosing type (usually a TypeSpecification naming an instantiation)
    pub enclosing_type: Handle,
    /// The method definition
    pub method: Handle,
}

/// A field definition paired with an explicit enclosing type
#[derive(Debug, Clone)]
pub struct QualifiedField {
    /// Enclosing type (usually a TypeSpecification naming an instantiation)
    pub enclosing_type: Handle,
    /// The field definition
    pub field: Handle,
}

/// A generic method instantiated over type arguments
#[derive(Debug, Clone)]
pub struct MethodInstantiation {
    /// The generic method (Method, MemberReference or QualifiedMethod)
    pub method: Handle,
    /// Method instantiation signature (Blob)
    pub instantiation: Handle,
}

/// A custom attribute attached to a record
#[derive(Debug, Clone)]
pub struct CustomAttribute {
    /// The attribute type (TypeDefinition or TypeReference)
    pub attribute_type: Handle,
    /// Serialized constructor arguments (Blob), null when there are none
    pub value: Handle,
}

/// Read-only, handle-indexed access to the metadata of one module.
///
/// Every getter fails with [`crate::Error::Malformed`] when the handle is of the wrong kind, and
/// with [`crate::Error::OutOfBounds`] when its row does not exist.
pub trait MetadataStore: Send + Sync {
    /// The scope definition of this module
    fn scope(&self) -> Handle;

    /// Enumerate every type definition, in row order
    fn type_definitions(&self) -> Box<dyn Iterator<Item = Handle> + '_>;

    /// Look up a string heap entry
    fn string(&self, handle: Handle) -> Result<&str>;
    /// Look up a blob heap entry
    fn blob(&self, handle: Handle) -> Result<&[u8]>;

    /// Look up a scope definition
    fn scope_definition(&self, handle: Handle) -> Result<&ScopeDefinition>;
    /// Look up a scope reference
    fn scope_reference(&self, handle: Handle) -> Result<&ScopeReference>;
    /// Look up a namespace definition
    fn namespace_definition(&self, handle: Handle) -> Result<&NamespaceDefinition>;
    /// Look up a namespace reference
    fn namespace_reference(&self, handle: Handle) -> Result<&NamespaceReference>;
    /// Look up a type definition
    fn type_definition(&self, handle: Handle) -> Result<&TypeDefinition>;
    /// Look up a type reference
    fn type_reference(&self, handle: Handle) -> Result<&TypeReference>;
    /// Look up a type specification
    fn type_specification(&self, handle: Handle) -> Result<&TypeSpecification>;
    /// Look up a method definition
    fn method(&self, handle: Handle) -> Result<&MethodDefinition>;
    /// Look up a field definition
    fn field(&self, handle: Handle) -> Result<&FieldDefinition>;
    /// Look up a generic parameter
    fn generic_parameter(&self, handle: Handle) -> Result<&GenericParameter>;
    /// Look up a member reference
    fn member_reference(&self, handle: Handle) -> Result<&MemberReference>;
    /// Look up a qualified method
    fn qualified_method(&self, handle: Handle) -> Result<&QualifiedMethod>;
    /// Look up a qualified field
    fn qualified_field(&self, handle: Handle) -> Result<&QualifiedField>;
    /// Look up a method instantiation
    fn method_instantiation(&self, handle: Handle) -> Result<&MethodInstantiation>;
    /// Look up a custom attribute
    fn custom_attribute(&self, handle: Handle) -> Result<&CustomAttribute>;
}
