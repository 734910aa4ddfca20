//! In-memory metadata store and its builder.
//!
//! [`MemoryStore`] keeps every record kind in its own row vector and serves them through
//! [`MetadataStore`]. It is produced by [`MetadataBuilder`], a fluent, handle-returning API for
//! synthesizing module metadata: types, members, references and signatures. Signatures are
//! encoded into the blob heap with the same encoders the signature parser inverts, so a store
//! built here is indistinguishable from one read from disk.
//!
//! # Examples
//!
//! ```rust
//! use eetype::metadata::{
//!     attributes::{FieldAttributes, TypeAttributes},
//!     handle::Handle,
//!     memory::MetadataBuilder,
//!     signatures::TypeSignature,
//!     store::MetadataStore,
//! };
//!
//! let mut builder = MetadataBuilder::new("Sample");
//! let point = builder.define_type("Geometry", "Point", TypeAttributes::PUBLIC, Handle::NULL);
//! builder.add_field(point, "X", FieldAttributes::PUBLIC, &TypeSignature::I4)?;
//!
//! let store = builder.build();
//! let record = store.type_definition(point)?;
//! assert_eq!(store.string(record.name)?, "Point");
//! assert_eq!(record.fields.len(), 1);
//! # Ok::<(), eetype::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    metadata::{
        attributes::{
            AssemblyFlags, FieldAttributes, GenericParameterAttributes, MethodAttributes,
            MethodImplAttributes, TypeAttributes,
        },
        handle::{Handle, HandleType},
        signatures::{
            encode_field_signature, encode_method_signature, encode_method_spec_signature,
            encode_typespec_signature, SignatureField, SignatureMethod, SignatureMethodSpec,
            SignatureTypeSpec, TypeSignature,
        },
        store::{
            AssemblyVersion, CustomAttribute, FieldDefinition, GenericParameter,
            GenericParameterKind, MemberReference, MetadataStore, MethodDefinition,
            MethodInstantiation, NamespaceDefinition, NamespaceReference, QualifiedField,
            QualifiedMethod, ScopeDefinition, ScopeReference, TypeDefinition, TypeReference,
            TypeSpecification,
        },
    },
    Result,
};

fn row<T>(table: &[T], handle: Handle, kind: HandleType) -> Result<&T> {
    if !handle.is(kind) {
        return Err(malformed_error!("Expected a {} handle - {:?}", kind, handle));
    }

    match handle.row() {
        0 => Err(out_of_bounds_error!()),
        row => table.get(row as usize - 1).ok_or(out_of_bounds_error!()),
    }
}

fn row_mut<T>(table: &mut [T], handle: Handle, kind: HandleType) -> Result<&mut T> {
    if !handle.is(kind) {
        return Err(malformed_error!("Expected a {} handle - {:?}", kind, handle));
    }

    match handle.row() {
        0 => Err(out_of_bounds_error!()),
        row => table.get_mut(row as usize - 1).ok_or(out_of_bounds_error!()),
    }
}

fn push<T>(table: &mut Vec<T>, kind: HandleType, record: T) -> Handle {
    table.push(record);
    Handle::new(kind, table.len() as u32)
}

/// A module's metadata held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    scope: Handle,
    strings: Vec<String>,
    blobs: Vec<Vec<u8>>,
    scope_definitions: Vec<ScopeDefinition>,
    scope_references: Vec<ScopeReference>,
    namespace_definitions: Vec<NamespaceDefinition>,
    namespace_references: Vec<NamespaceReference>,
    type_definitions: Vec<TypeDefinition>,
    type_references: Vec<TypeReference>,
    type_specifications: Vec<TypeSpecification>,
    methods: Vec<MethodDefinition>,
    fields: Vec<FieldDefinition>,
    generic_parameters: Vec<GenericParameter>,
    member_references: Vec<MemberReference>,
    qualified_methods: Vec<QualifiedMethod>,
    qualified_fields: Vec<QualifiedField>,
    method_instantiations: Vec<MethodInstantiation>,
    custom_attributes: Vec<CustomAttribute>,
}

impl MetadataStore for MemoryStore {
    fn scope(&self) -> Handle {
        self.scope
    }

    fn type_definitions(&self) -> Box<dyn Iterator<Item = Handle> + '_> {
        Box::new(
            (1..=self.type_definitions.len() as u32)
                .map(|row| Handle::new(HandleType::TypeDefinition, row)),
        )
    }

    fn string(&self, handle: Handle) -> Result<&str> {
        if handle.is_null() {
            return Ok("");
        }
        row(&self.strings, handle, HandleType::String).map(String::as_str)
    }

    fn blob(&self, handle: Handle) -> Result<&[u8]> {
        if handle.is_null() {
            return Ok(&[]);
        }
        row(&self.blobs, handle, HandleType::Blob).map(Vec::as_slice)
    }

    fn scope_definition(&self, handle: Handle) -> Result<&ScopeDefinition> {
        row(&self.scope_definitions, handle, HandleType::ScopeDefinition)
    }

    fn scope_reference(&self, handle: Handle) -> Result<&ScopeReference> {
        row(&self.scope_references, handle, HandleType::ScopeReference)
    }

    fn namespace_definition(&self, handle: Handle) -> Result<&NamespaceDefinition> {
        row(
            &self.namespace_definitions,
            handle,
            HandleType::NamespaceDefinition,
        )
    }

    fn namespace_reference(&self, handle: Handle) -> Result<&NamespaceReference> {
        row(
            &self.namespace_references,
            handle,
            HandleType::NamespaceReference,
        )
    }

    fn type_definition(&self, handle: Handle) -> Result<&TypeDefinition> {
        row(&self.type_definitions, handle, HandleType::TypeDefinition)
    }

    fn type_reference(&self, handle: Handle) -> Result<&TypeReference> {
        row(&self.type_references, handle, HandleType::TypeReference)
    }

    fn type_specification(&self, handle: Handle) -> Result<&TypeSpecification> {
        row(
            &self.type_specifications,
            handle,
            HandleType::TypeSpecification,
        )
    }

    fn method(&self, handle: Handle) -> Result<&MethodDefinition> {
        row(&self.methods, handle, HandleType::Method)
    }

    fn field(&self, handle: Handle) -> Result<&FieldDefinition> {
        row(&self.fields, handle, HandleType::Field)
    }

    fn generic_parameter(&self, handle: Handle) -> Result<&GenericParameter> {
        row(&self.generic_parameters, handle, HandleType::GenericParameter)
    }

    fn member_reference(&self, handle: Handle) -> Result<&MemberReference> {
        row(&self.member_references, handle, HandleType::MemberReference)
    }

    fn qualified_method(&self, handle: Handle) -> Result<&QualifiedMethod> {
        row(&self.qualified_methods, handle, HandleType::QualifiedMethod)
    }

    fn qualified_field(&self, handle: Handle) -> Result<&QualifiedField> {
        row(&self.qualified_fields, handle, HandleType::QualifiedField)
    }

    fn method_instantiation(&self, handle: Handle) -> Result<&MethodInstantiation> {
        row(
            &self.method_instantiations,
            handle,
            HandleType::MethodInstantiation,
        )
    }

    fn custom_attribute(&self, handle: Handle) -> Result<&CustomAttribute> {
        row(&self.custom_attributes, handle, HandleType::CustomAttribute)
    }
}

/// Builder for [`MemoryStore`] instances.
///
/// Every `define_*`/`add_*` call appends one record and returns its handle. Strings are
/// interned, namespaces are created segment by segment on first use.
#[derive(Debug)]
pub struct MetadataBuilder {
    store: MemoryStore,
    string_index: HashMap<String, Handle>,
    namespace_index: HashMap<String, Handle>,
    namespace_reference_index: HashMap<(Handle, String), Handle>,
}

impl MetadataBuilder {
    /// Creates a builder for an assembly named `assembly_name`, version 1.0.0.0
    #[must_use]
    pub fn new(assembly_name: &str) -> Self {
        let mut builder = MetadataBuilder {
            store: MemoryStore::default(),
            string_index: HashMap::new(),
            namespace_index: HashMap::new(),
            namespace_reference_index: HashMap::new(),
        };

        let root = push(
            &mut builder.store.namespace_definitions,
            HandleType::NamespaceDefinition,
            NamespaceDefinition {
                parent: Handle::NULL,
                name: Handle::NULL,
            },
        );
        builder.namespace_index.insert(String::new(), root);

        let name = builder.string(assembly_name);
        builder.store.scope = push(
            &mut builder.store.scope_definitions,
            HandleType::ScopeDefinition,
            ScopeDefinition {
                name,
                version: AssemblyVersion::new(1, 0, 0, 0),
                culture: Handle::NULL,
                public_key: Handle::NULL,
                flags: AssemblyFlags::empty(),
                root_namespace: root,
            },
        );

        builder
    }

    /// Sets the version of the assembly being built
    #[must_use]
    pub fn with_version(mut self, version: AssemblyVersion) -> Self {
        if let Some(scope) = self.store.scope_definitions.first_mut() {
            scope.version = version;
        }
        self
    }

    /// The scope definition of the module being built
    #[must_use]
    pub fn scope(&self) -> Handle {
        self.store.scope
    }

    /// Interns `value` in the string heap
    pub fn string(&mut self, value: &str) -> Handle {
        if let Some(handle) = self.string_index.get(value) {
            return *handle;
        }

        let handle = push(
            &mut self.store.strings,
            HandleType::String,
            value.to_string(),
        );
        self.string_index.insert(value.to_string(), handle);
        handle
    }

    /// Appends `data` to the blob heap
    pub fn blob(&mut self, data: Vec<u8>) -> Handle {
        push(&mut self.store.blobs, HandleType::Blob, data)
    }

    /// The namespace definition for the dotted `name`, created segment by segment if needed
    pub fn namespace(&mut self, name: &str) -> Handle {
        if let Some(handle) = self.namespace_index.get(name) {
            return *handle;
        }

        let (parent, segment) = match name.rsplit_once('.') {
            Some((parent, segment)) => (self.namespace(parent), segment),
            None => (self.namespace(""), name),
        };

        let segment = self.string(segment);
        let handle = push(
            &mut self.store.namespace_definitions,
            HandleType::NamespaceDefinition,
            NamespaceDefinition {
                parent,
                name: segment,
            },
        );
        self.namespace_index.insert(name.to_string(), handle);
        handle
    }

    /// Defines a top-level type
    ///
    /// ## Arguments
    /// * `namespace` - Dotted namespace, empty for the global namespace
    /// * `name` - Simple name
    /// * `flags` - Type attributes
    /// * `base_type` - Base type handle, or [`Handle::NULL`]
    pub fn define_type(
        &mut self,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        base_type: Handle,
    ) -> Handle {
        let namespace = self.namespace(namespace);
        let name = self.string(name);
        push(
            &mut self.store.type_definitions,
            HandleType::TypeDefinition,
            TypeDefinition {
                flags,
                name,
                namespace,
                base_type,
                ..TypeDefinition::default()
            },
        )
    }

    /// Defines a type nested in `enclosing`
    ///
    /// # Errors
    /// Returns an error if `enclosing` is not a type definition of this builder.
    pub fn define_nested_type(
        &mut self,
        enclosing: Handle,
        name: &str,
        flags: TypeAttributes,
        base_type: Handle,
    ) -> Result<Handle> {
        row(
            &self.store.type_definitions,
            enclosing,
            HandleType::TypeDefinition,
        )?;

        let name = self.string(name);
        let nested = push(
            &mut self.store.type_definitions,
            HandleType::TypeDefinition,
            TypeDefinition {
                flags,
                name,
                enclosing_type: enclosing,
                base_type,
                ..TypeDefinition::default()
            },
        );

        self.type_definition_mut(enclosing)?.nested_types.push(nested);
        Ok(nested)
    }

    fn type_definition_mut(&mut self, handle: Handle) -> Result<&mut TypeDefinition> {
        row_mut(
            &mut self.store.type_definitions,
            handle,
            HandleType::TypeDefinition,
        )
    }

    /// Replaces the base type of `ty`
    ///
    /// # Errors
    /// Returns an error if `ty` is not a type definition of this builder.
    pub fn set_base_type(&mut self, ty: Handle, base_type: Handle) -> Result<()> {
        self.type_definition_mut(ty)?.base_type = base_type;
        Ok(())
    }

    /// Adds `interface` to the explicitly implemented interfaces of `ty`
    ///
    /// # Errors
    /// Returns an error if `ty` is not a type definition of this builder.
    pub fn add_interface(&mut self, ty: Handle, interface: Handle) -> Result<()> {
        self.type_definition_mut(ty)?.interfaces.push(interface);
        Ok(())
    }

    /// Sets the packing and explicit size of `ty`
    ///
    /// # Errors
    /// Returns an error if `ty` is not a type definition of this builder.
    pub fn set_class_layout(&mut self, ty: Handle, packing_size: u16, class_size: u32) -> Result<()> {
        let record = self.type_definition_mut(ty)?;
        record.packing_size = packing_size;
        record.class_size = class_size;
        Ok(())
    }

    /// Adds a field of type `signature` to `ty`
    ///
    /// # Errors
    /// Returns an error if `ty` is not a type definition, or the signature cannot be encoded.
    pub fn add_field(
        &mut self,
        ty: Handle,
        name: &str,
        flags: FieldAttributes,
        signature: &TypeSignature,
    ) -> Result<Handle> {
        self.add_field_record(ty, name, flags, signature, None)
    }

    /// Adds a field at an explicit `offset` to `ty`
    ///
    /// # Errors
    /// Returns an error if `ty` is not a type definition, or the signature cannot be encoded.
    pub fn add_field_at(
        &mut self,
        ty: Handle,
        name: &str,
        flags: FieldAttributes,
        signature: &TypeSignature,
        offset: u32,
    ) -> Result<Handle> {
        self.add_field_record(ty, name, flags, signature, Some(offset))
    }

    fn add_field_record(
        &mut self,
        ty: Handle,
        name: &str,
        flags: FieldAttributes,
        signature: &TypeSignature,
        offset: Option<u32>,
    ) -> Result<Handle> {
        row(&self.store.type_definitions, ty, HandleType::TypeDefinition)?;

        let blob = encode_field_signature(&SignatureField {
            modifiers: Vec::new(),
            base: signature.clone(),
        })?;
        let signature = self.blob(blob);
        let name = self.string(name);

        let field = push(
            &mut self.store.fields,
            HandleType::Field,
            FieldDefinition {
                flags,
                name,
                signature,
                owner: ty,
                offset,
                custom_attributes: Vec::new(),
            },
        );
        self.type_definition_mut(ty)?.fields.push(field);
        Ok(field)
    }

    /// Adds a method to `ty`
    ///
    /// # Errors
    /// Returns an error if `ty` is not a type definition, or the signature cannot be encoded.
    pub fn add_method(
        &mut self,
        ty: Handle,
        name: &str,
        flags: MethodAttributes,
        signature: &SignatureMethod,
    ) -> Result<Handle> {
        row(&self.store.type_definitions, ty, HandleType::TypeDefinition)?;

        let blob = encode_method_signature(signature)?;
        let signature = self.blob(blob);
        let name = self.string(name);

        let method = push(
            &mut self.store.methods,
            HandleType::Method,
            MethodDefinition {
                flags,
                impl_flags: MethodImplAttributes::empty(),
                name,
                signature,
                owner: ty,
                generic_parameters: Vec::new(),
                custom_attributes: Vec::new(),
            },
        );
        self.type_definition_mut(ty)?.methods.push(method);
        Ok(method)
    }

    /// Replaces the implementation flags of `method`
    ///
    /// # Errors
    /// Returns an error if `method` is not a method definition of this builder.
    pub fn set_method_impl_flags(
        &mut self,
        method: Handle,
        impl_flags: MethodImplAttributes,
    ) -> Result<()> {
        row_mut(&mut self.store.methods, method, HandleType::Method)?.impl_flags = impl_flags;
        Ok(())
    }

    /// Adds the next generic parameter to a type or method definition
    ///
    /// # Errors
    /// Returns an error if `owner` is neither a type nor a method definition of this builder.
    pub fn add_generic_parameter(
        &mut self,
        owner: Handle,
        name: &str,
        flags: GenericParameterAttributes,
    ) -> Result<Handle> {
        let (kind, number) = if owner.is(HandleType::Method) {
            let method = row(&self.store.methods, owner, HandleType::Method)?;
            (GenericParameterKind::Method, method.generic_parameters.len())
        } else {
            let ty = row(&self.store.type_definitions, owner, HandleType::TypeDefinition)?;
            (GenericParameterKind::Type, ty.generic_parameters.len())
        };

        let number = u16::try_from(number)
            .map_err(|_| malformed_error!("Too many generic parameters on {}", owner))?;
        let name = self.string(name);
        let parameter = push(
            &mut self.store.generic_parameters,
            HandleType::GenericParameter,
            GenericParameter {
                flags,
                number,
                kind,
                name,
                owner,
                constraints: Vec::new(),
            },
        );

        match kind {
            GenericParameterKind::Method => {
                row_mut(&mut self.store.methods, owner, HandleType::Method)?
                    .generic_parameters
                    .push(parameter);
            }
            GenericParameterKind::Type => {
                self.type_definition_mut(owner)?
                    .generic_parameters
                    .push(parameter);
            }
        }
        Ok(parameter)
    }

    /// Adds a constraint type to a generic parameter
    ///
    /// # Errors
    /// Returns an error if `parameter` is not a generic parameter of this builder.
    pub fn add_generic_constraint(&mut self, parameter: Handle, constraint: Handle) -> Result<()> {
        row_mut(
            &mut self.store.generic_parameters,
            parameter,
            HandleType::GenericParameter,
        )?
        .constraints
        .push(constraint);
        Ok(())
    }

    /// Attaches a custom attribute of type `attribute_type` to a type, method or field definition
    ///
    /// # Errors
    /// Returns an error if `target` is not a type, method or field definition of this builder.
    pub fn add_custom_attribute(&mut self, target: Handle, attribute_type: Handle) -> Result<Handle> {
        let attribute = Handle::new(
            HandleType::CustomAttribute,
            self.store.custom_attributes.len() as u32 + 1,
        );

        let list = match target.handle_type()? {
            HandleType::TypeDefinition => &mut self.type_definition_mut(target)?.custom_attributes,
            HandleType::Method => {
                &mut row_mut(&mut self.store.methods, target, HandleType::Method)?
                    .custom_attributes
            }
            HandleType::Field => {
                &mut row_mut(&mut self.store.fields, target, HandleType::Field)?.custom_attributes
            }
            other => {
                return Err(malformed_error!(
                    "Custom attributes cannot be attached to {} records",
                    other
                ))
            }
        };
        list.push(attribute);

        self.store.custom_attributes.push(CustomAttribute {
            attribute_type,
            value: Handle::NULL,
        });
        Ok(attribute)
    }

    /// Adds a reference to the assembly `name`
    pub fn scope_reference(&mut self, name: &str, version: AssemblyVersion) -> Handle {
        let name = self.string(name);
        push(
            &mut self.store.scope_references,
            HandleType::ScopeReference,
            ScopeReference {
                name,
                version,
                culture: Handle::NULL,
                public_key_or_token: Handle::NULL,
                flags: AssemblyFlags::empty(),
            },
        )
    }

    /// The namespace reference for the dotted `namespace` inside `scope`
    ///
    /// `scope` is a scope reference, or this module's scope definition.
    pub fn namespace_reference(&mut self, scope: Handle, namespace: &str) -> Handle {
        if let Some(handle) = self
            .namespace_reference_index
            .get(&(scope, namespace.to_string()))
        {
            return *handle;
        }

        let (parent, segment) = if namespace.is_empty() {
            (scope, Handle::NULL)
        } else {
            let (parent, segment) = namespace.rsplit_once('.').unwrap_or(("", namespace));
            (
                self.namespace_reference(scope, parent),
                self.string(segment),
            )
        };

        let handle = push(
            &mut self.store.namespace_references,
            HandleType::NamespaceReference,
            NamespaceReference {
                parent,
                name: segment,
            },
        );
        self.namespace_reference_index
            .insert((scope, namespace.to_string()), handle);
        handle
    }

    /// Adds a reference to the top-level type `namespace.name` in `scope`
    pub fn type_reference(&mut self, scope: Handle, namespace: &str, name: &str) -> Handle {
        let parent = self.namespace_reference(scope, namespace);
        let name = self.string(name);
        push(
            &mut self.store.type_references,
            HandleType::TypeReference,
            TypeReference { parent, name },
        )
    }

    /// Adds a reference to the type `name` nested in the referenced type `enclosing`
    pub fn nested_type_reference(&mut self, enclosing: Handle, name: &str) -> Handle {
        let name = self.string(name);
        push(
            &mut self.store.type_references,
            HandleType::TypeReference,
            TypeReference {
                parent: enclosing,
                name,
            },
        )
    }

    /// Adds a type specification for `signature`
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn type_specification(&mut self, signature: &TypeSignature) -> Result<Handle> {
        let blob = encode_typespec_signature(&SignatureTypeSpec {
            base: signature.clone(),
        })?;
        let signature = self.blob(blob);
        Ok(push(
            &mut self.store.type_specifications,
            HandleType::TypeSpecification,
            TypeSpecification { signature },
        ))
    }

    /// Adds a method reference to `name` with `signature` on `parent`
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn method_reference(
        &mut self,
        parent: Handle,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Handle> {
        let blob = encode_method_signature(signature)?;
        Ok(self.member_reference(parent, name, blob))
    }

    /// Adds a field reference to `name` of type `signature` on `parent`
    ///
    /// # Errors
    /// Returns an error if the signature cannot be encoded.
    pub fn field_reference(
        &mut self,
        parent: Handle,
        name: &str,
        signature: &TypeSignature,
    ) -> Result<Handle> {
        let blob = encode_field_signature(&SignatureField {
            modifiers: Vec::new(),
            base: signature.clone(),
        })?;
        Ok(self.member_reference(parent, name, blob))
    }

    fn member_reference(&mut self, parent: Handle, name: &str, signature: Vec<u8>) -> Handle {
        let signature = self.blob(signature);
        let name = self.string(name);
        push(
            &mut self.store.member_references,
            HandleType::MemberReference,
            MemberReference {
                parent,
                name,
                signature,
            },
        )
    }

    /// Pairs a method definition with an explicit enclosing type
    pub fn qualified_method(&mut self, enclosing_type: Handle, method: Handle) -> Handle {
        push(
            &mut self.store.qualified_methods,
            HandleType::QualifiedMethod,
            QualifiedMethod {
                enclosing_type,
                method,
            },
        )
    }

    /// Pairs a field definition with an explicit enclosing type
    pub fn qualified_field(&mut self, enclosing_type: Handle, field: Handle) -> Handle {
        push(
            &mut self.store.qualified_fields,
            HandleType::QualifiedField,
            QualifiedField {
                enclosing_type,
                field,
            },
        )
    }

    /// Instantiates the generic `method` over `arguments`
    ///
    /// # Errors
    /// Returns an error if an argument cannot be encoded.
    pub fn method_instantiation(
        &mut self,
        method: Handle,
        arguments: Vec<TypeSignature>,
    ) -> Result<Handle> {
        let blob = encode_method_spec_signature(&SignatureMethodSpec {
            generic_args: arguments,
        })?;
        let instantiation = self.blob(blob);
        Ok(push(
            &mut self.store.method_instantiations,
            HandleType::MethodInstantiation,
            MethodInstantiation {
                method,
                instantiation,
            },
        ))
    }

    /// Finish building and return the store
    #[must_use]
    pub fn build(self) -> MemoryStore {
        self.store
    }
}
