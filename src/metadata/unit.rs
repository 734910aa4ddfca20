//! The metadata resolution unit.
//!
//! A [`MetadataUnit`] turns the handles of one module into type-system entities. Every resolved
//! entity is cached under `(handle, owner)`: the owner only matters for method and field
//! definitions seen through an instantiated type, where the same definition handle denotes a
//! different entity per instantiation. Resolution is idempotent; concurrent callers racing on
//! the same key all observe the entity that was published first.
//!
//! # Resolution rules
//!
//! - Type, method, field and generic parameter definitions wrap the handle directly.
//! - Type references to nested types resolve their enclosing reference and look the nested type
//!   up by name. Top-level references walk their namespace chain to the scope, bind that
//!   assembly through the context and look the type up by namespace and name.
//! - Member references resolve their parent and match fields by name, methods by name and
//!   signature along the base chain. Constructors are not inherited.
//! - Type specifications and method instantiations are parsed and built through the context's
//!   factories; only the outer handle is cached.
//!
//! Errors are never cached. A failed resolution is recomputed on the next request.

use std::{
    cell::Cell,
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, trace};

use crate::{
    metadata::{
        binder::AssemblyName,
        handle::{Handle, HandleType},
        signatures::{SignatureMethod, SignatureParameter, SignatureParser, TypeSignature},
        store::MetadataStore,
        typesystem::{
            lazy_init, CanonKind, FieldDesc, FieldKind, FieldRc, MethodDesc, MethodKind, MethodRc,
            MethodSignature, MethodSignatureFlags, TypeDesc, TypeKind, TypeRc, TypeSystemContext,
            WellKnownType,
        },
    },
    Error, Result,
};

/// Field signature header byte
const FIELD_SIGNATURE: u8 = 0x06;

thread_local! {
    static RESOLUTION_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Bounds the nesting of resolutions on the current thread
struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> Result<Self> {
        RESOLUTION_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(Error::RecursionLimit(limit));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        RESOLUTION_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

pub(crate) fn upgrade_unit(unit: &Weak<MetadataUnit>) -> Result<Arc<MetadataUnit>> {
    unit.upgrade().ok_or(Error::UnitUnavailable)
}

/// What a handle resolves to
#[derive(Debug, Clone)]
pub enum Entity {
    /// A type
    Type(TypeRc),
    /// A method
    Method(MethodRc),
    /// A field
    Field(FieldRc),
    /// A module, for scope handles
    Module(Arc<MetadataUnit>),
}

impl Entity {
    /// # Errors
    /// Returns [`Error::Malformed`] if the entity is not a type.
    pub fn into_type(self) -> Result<TypeRc> {
        match self {
            Entity::Type(ty) => Ok(ty),
            other => Err(malformed_error!("Expected a type, found {}", other)),
        }
    }

    /// # Errors
    /// Returns [`Error::Malformed`] if the entity is not a method.
    pub fn into_method(self) -> Result<MethodRc> {
        match self {
            Entity::Method(method) => Ok(method),
            other => Err(malformed_error!("Expected a method, found {}", other)),
        }
    }

    /// # Errors
    /// Returns [`Error::Malformed`] if the entity is not a field.
    pub fn into_field(self) -> Result<FieldRc> {
        match self {
            Entity::Field(field) => Ok(field),
            other => Err(malformed_error!("Expected a field, found {}", other)),
        }
    }

    /// # Errors
    /// Returns [`Error::Malformed`] if the entity is not a module.
    pub fn into_module(self) -> Result<Arc<MetadataUnit>> {
        match self {
            Entity::Module(unit) => Ok(unit),
            other => Err(malformed_error!("Expected a module, found {}", other)),
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Type(ty) => write!(f, "type {ty}"),
            Entity::Method(method) => write!(f, "method {method}"),
            Entity::Field(field) => write!(f, "field {field}"),
            Entity::Module(unit) => write!(f, "module {}", unit.name()),
        }
    }
}

/// Resolution unit of one module
pub struct MetadataUnit {
    this: Weak<MetadataUnit>,
    context: Weak<TypeSystemContext>,
    store: Arc<dyn MetadataStore>,
    name: String,
    is_system: bool,
    cache: DashMap<(Handle, Option<TypeRc>), Entity>,
    type_index: OnceLock<HashMap<(String, String), Handle>>,
}

impl fmt::Debug for MetadataUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataUnit")
            .field("name", &self.name)
            .field("is_system", &self.is_system)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl MetadataUnit {
    pub(crate) fn new(
        store: Arc<dyn MetadataStore>,
        name: String,
        is_system: bool,
        context: Weak<TypeSystemContext>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| MetadataUnit {
            this: this.clone(),
            context,
            store,
            name,
            is_system,
            cache: DashMap::new(),
            type_index: OnceLock::new(),
        })
    }

    /// Simple name of the module's assembly
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the configured system module
    #[must_use]
    pub fn is_system_module(&self) -> bool {
        self.is_system
    }

    /// The metadata this unit resolves against
    #[must_use]
    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    /// Shared handle to the metadata store
    #[must_use]
    pub fn store_arc(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// # Errors
    /// Returns [`Error::UnitUnavailable`] once the context has been dropped.
    pub fn context(&self) -> Result<Arc<TypeSystemContext>> {
        self.context.upgrade().ok_or(Error::UnitUnavailable)
    }

    /// Resolve `handle`, interpreting method and field definitions as members of `owner`.
    ///
    /// An uninstantiated `owner` is ignored; an instantiated one must instantiate the
    /// definition's declaring type.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for handles that do not denote entities, and any error of
    /// the resolution itself.
    pub fn resolve(&self, handle: Handle, owner: Option<&TypeRc>) -> Result<Entity> {
        let kind = handle.handle_type()?;
        if handle.is_null() {
            return Err(malformed_error!("Cannot resolve the null {:?} handle", kind));
        }

        match kind {
            HandleType::ScopeDefinition => return Ok(Entity::Module(self.this()?)),
            HandleType::ScopeReference => {
                let name = AssemblyName::from_scope_reference(self.store(), handle)?;
                return Ok(Entity::Module(self.context()?.resolve_assembly(&name)?));
            }
            _ => {}
        }

        let owner = match kind {
            HandleType::Method | HandleType::Field => {
                owner.filter(|owner| owner.is_instantiated()).cloned()
            }
            _ => None,
        };
        let key = (handle, owner);
        if let Some(existing) = self.cache.get(&key) {
            return Ok(existing.value().clone());
        }

        let _guard = DepthGuard::enter(self.context()?.config().max_nesting_depth)?;
        trace!(module = %self.name, %handle, "resolving handle");
        let entity = self.resolve_uncached(kind, handle, key.1.as_ref())?;

        match self.cache.entry(key) {
            Entry::Occupied(entry) => {
                debug!(module = %self.name, %handle, "lost resolution race, discarding duplicate");
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => Ok(entry.insert(entity).value().clone()),
        }
    }

    /// # Errors
    /// See [`MetadataUnit::resolve`]; fails with [`Error::Malformed`] if the handle does not
    /// denote a type.
    pub fn resolve_type(&self, handle: Handle) -> Result<TypeRc> {
        self.resolve(handle, None)?.into_type()
    }

    /// # Errors
    /// See [`MetadataUnit::resolve`]; fails with [`Error::Malformed`] if the handle does not
    /// denote a method.
    pub fn resolve_method(&self, handle: Handle, owner: Option<&TypeRc>) -> Result<MethodRc> {
        self.resolve(handle, owner)?.into_method()
    }

    /// # Errors
    /// See [`MetadataUnit::resolve`]; fails with [`Error::Malformed`] if the handle does not
    /// denote a field.
    pub fn resolve_field(&self, handle: Handle, owner: Option<&TypeRc>) -> Result<FieldRc> {
        self.resolve(handle, owner)?.into_field()
    }

    fn this(&self) -> Result<Arc<MetadataUnit>> {
        self.this.upgrade().ok_or(Error::UnitUnavailable)
    }

    fn resolve_uncached(
        &self,
        kind: HandleType,
        handle: Handle,
        owner: Option<&TypeRc>,
    ) -> Result<Entity> {
        match kind {
            HandleType::TypeDefinition => Ok(Entity::Type(TypeRc::new(TypeDesc::new(
                TypeKind::Metadata {
                    unit: self.this.clone(),
                    handle,
                },
                self.context.clone(),
            )))),
            HandleType::GenericParameter => Ok(Entity::Type(TypeRc::new(TypeDesc::new(
                TypeKind::GenericParameter {
                    unit: self.this.clone(),
                    handle,
                },
                self.context.clone(),
            )))),
            HandleType::Method => self.resolve_method_definition(handle, owner),
            HandleType::Field => self.resolve_field_definition(handle, owner),
            HandleType::TypeReference => self.resolve_type_reference(handle).map(Entity::Type),
            HandleType::TypeSpecification => {
                let record = self.store.type_specification(handle)?;
                let blob = self.store.blob(record.signature)?;
                let signature = self.parser(blob)?.parse_type_spec_signature()?;
                self.type_from_signature(&signature.base).map(Entity::Type)
            }
            HandleType::MemberReference => self.resolve_member_reference(handle),
            HandleType::QualifiedMethod => {
                let record = self.store.qualified_method(handle)?;
                let enclosing = self.resolve_type(record.enclosing_type)?;
                self.resolve_method(record.method, Some(&enclosing))
                    .map(Entity::Method)
            }
            HandleType::QualifiedField => {
                let record = self.store.qualified_field(handle)?;
                let enclosing = self.resolve_type(record.enclosing_type)?;
                self.resolve_field(record.field, Some(&enclosing))
                    .map(Entity::Field)
            }
            HandleType::MethodInstantiation => {
                let record = self.store.method_instantiation(handle)?;
                let generic = self.resolve(record.method, None)?.into_method()?;
                let blob = self.store.blob(record.instantiation)?;
                let arguments = self
                    .parser(blob)?
                    .parse_method_spec_signature()?
                    .generic_args
                    .iter()
                    .map(|argument| self.type_from_signature(argument))
                    .collect::<Result<Vec<_>>>()?;
                self.context()?
                    .instantiated_method(&generic, arguments)
                    .map(Entity::Method)
            }
            other => Err(malformed_error!(
                "Handle {} of kind {:?} does not denote an entity",
                handle,
                other
            )),
        }
    }

    /// The declaring type of a method or field definition, or `owner` if it instantiates it
    fn member_owner(&self, declaring: Handle, owner: Option<&TypeRc>) -> Result<TypeRc> {
        let declaring = self.resolve_type(declaring)?;
        match owner {
            None => Ok(declaring),
            Some(owner) if owner.type_definition() == declaring => Ok(owner.clone()),
            Some(owner) => Err(malformed_error!(
                "Type {} is not an instantiation of {}",
                owner,
                declaring
            )),
        }
    }

    fn resolve_method_definition(&self, handle: Handle, owner: Option<&TypeRc>) -> Result<Entity> {
        let record = self.store.method(handle)?;
        let declaring = self.member_owner(record.owner, owner)?;

        let desc = match owner {
            None => MethodDesc::new(
                MethodKind::Metadata {
                    unit: self.this.clone(),
                    handle,
                },
                declaring,
            ),
            Some(_) => MethodDesc::new(
                MethodKind::OnInstantiatedType {
                    typical: self.resolve_method(handle, None)?,
                },
                declaring,
            ),
        };
        Ok(Entity::Method(MethodRc::new(desc)))
    }

    fn resolve_field_definition(&self, handle: Handle, owner: Option<&TypeRc>) -> Result<Entity> {
        let record = self.store.field(handle)?;
        let declaring = self.member_owner(record.owner, owner)?;

        let desc = match owner {
            None => FieldDesc::new(
                FieldKind::Metadata {
                    unit: self.this.clone(),
                    handle,
                },
                declaring,
            ),
            Some(_) => FieldDesc::new(
                FieldKind::OnInstantiatedType {
                    typical: self.resolve_field(handle, None)?,
                },
                declaring,
            ),
        };
        Ok(Entity::Field(FieldRc::new(desc)))
    }

    fn resolve_type_reference(&self, handle: Handle) -> Result<TypeRc> {
        let record = self.store.type_reference(handle)?;
        let name = self.store.string(record.name)?;

        if record.parent.is(HandleType::TypeReference) {
            let enclosing = self.resolve_type(record.parent)?;
            return enclosing
                .get_nested_type(name)?
                .ok_or_else(|| Error::MissingMember {
                    owner: enclosing.display_name(),
                    member: name.to_string(),
                });
        }

        let (namespace, scope) = self.namespace_path(record.parent)?;
        let target = self.resolve(scope, None)?.into_module()?;
        if let Some(found) = target.type_by_name(&namespace, name)? {
            return Ok(found);
        }

        if target.is_system_module() && namespace == "System" {
            let context = self.context()?;
            match name {
                "__Canon" => return Ok(context.canon_type(CanonKind::Normal)),
                "__UniversalCanon" => return Ok(context.canon_type(CanonKind::Universal)),
                _ => {}
            }
        }

        Err(Error::TypeLoad {
            type_name: if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{namespace}.{name}")
            },
            module: target.name().to_string(),
        })
    }

    /// Dotted namespace of a namespace definition or reference chain, and the handle that ends
    /// the chain
    fn namespace_path(&self, mut current: Handle) -> Result<(String, Handle)> {
        let limit = self.context()?.config().max_nesting_depth;
        let mut segments = Vec::new();

        loop {
            if segments.len() > limit {
                return Err(Error::RecursionLimit(limit));
            }
            let (parent, name) = if current.is(HandleType::NamespaceReference) {
                let record = self.store.namespace_reference(current)?;
                (record.parent, record.name)
            } else if current.is(HandleType::NamespaceDefinition) {
                let record = self.store.namespace_definition(current)?;
                (record.parent, record.name)
            } else {
                break;
            };

            if !name.is_null() {
                segments.push(self.store.string(name)?);
            }
            current = parent;
        }

        segments.reverse();
        Ok((segments.join("."), current))
    }

    /// Dotted name of a namespace definition; empty for the global namespace
    ///
    /// # Errors
    /// Returns an error if a namespace record cannot be read.
    pub fn namespace_name(&self, namespace: Handle) -> Result<String> {
        if namespace.is_null() {
            return Ok(String::new());
        }
        Ok(self.namespace_path(namespace)?.0)
    }

    /// The top-level type `namespace.name` defined in this module
    ///
    /// # Errors
    /// Returns an error if the type definitions cannot be indexed.
    pub fn type_by_name(&self, namespace: &str, name: &str) -> Result<Option<TypeRc>> {
        let index = lazy_init(&self.type_index, || {
            let mut index = HashMap::new();
            for handle in self.store.type_definitions() {
                let record = self.store.type_definition(handle)?;
                if !record.enclosing_type.is_null() {
                    continue;
                }
                let key = (
                    self.namespace_name(record.namespace)?,
                    self.store.string(record.name)?.to_string(),
                );
                index.entry(key).or_insert(handle);
            }
            debug!(module = %self.name, types = index.len(), "indexed type definitions");
            Ok(index)
        })?;

        match index.get(&(namespace.to_string(), name.to_string())) {
            Some(handle) => self.resolve_type(*handle).map(Some),
            None => Ok(None),
        }
    }

    /// Every type definition of the module, nested types included
    ///
    /// # Errors
    /// Returns an error if a type definition cannot be resolved.
    pub fn types(&self) -> Result<Vec<TypeRc>> {
        self.store
            .type_definitions()
            .map(|handle| self.resolve_type(handle))
            .collect()
    }

    fn resolve_member_reference(&self, handle: Handle) -> Result<Entity> {
        let record = self.store.member_reference(handle)?;
        let parent = self.resolve_type(record.parent)?;
        let name = self.store.string(record.name)?;
        let blob = self.store.blob(record.signature)?;
        let missing = || Error::MissingMember {
            owner: parent.display_name(),
            member: name.to_string(),
        };

        if blob.first() == Some(&FIELD_SIGNATURE) {
            return parent.get_field(name)?.map(Entity::Field).ok_or_else(missing);
        }

        let signature = self.method_signature(&self.parser(blob)?.parse_method_signature()?)?;
        let limit = self.context()?.config().max_nesting_depth;

        let mut current = Some(parent.clone());
        let mut depth = 0;
        while let Some(ty) = current {
            if depth > limit {
                return Err(Error::RecursionLimit(limit));
            }
            for method in ty.methods()? {
                if method.name()? != name {
                    continue;
                }
                if depth > 0 && (method.is_constructor()? || method.is_static_constructor()?) {
                    continue;
                }
                if *method.typical_method().signature()? == signature {
                    return Ok(Entity::Method(method));
                }
            }
            current = ty.base_type()?;
            depth += 1;
        }
        Err(missing())
    }

    /// Returns true if any of `attributes` is of type `namespace.name`; the attribute types are
    /// compared by name without being resolved
    ///
    /// # Errors
    /// Returns an error if an attribute record cannot be read.
    pub fn has_custom_attribute(
        &self,
        attributes: &[Handle],
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        for attribute in attributes {
            let attribute_type = self.store.custom_attribute(*attribute)?.attribute_type;
            let (attribute_namespace, attribute_name) =
                if attribute_type.is(HandleType::TypeDefinition) {
                    let record = self.store.type_definition(attribute_type)?;
                    (
                        self.namespace_name(record.namespace)?,
                        self.store.string(record.name)?,
                    )
                } else if attribute_type.is(HandleType::TypeReference) {
                    let record = self.store.type_reference(attribute_type)?;
                    if record.parent.is(HandleType::TypeReference) {
                        continue;
                    }
                    (
                        self.namespace_path(record.parent)?.0,
                        self.store.string(record.name)?,
                    )
                } else {
                    continue;
                };

            if attribute_name == name && attribute_namespace == namespace {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn parser<'a>(&self, blob: &'a [u8]) -> Result<SignatureParser<'a>> {
        Ok(SignatureParser::with_max_depth(
            blob,
            self.context()?.config().max_nesting_depth,
        ))
    }

    pub(crate) fn method_definition_signature(&self, handle: Handle) -> Result<MethodSignature> {
        let record = self.store.method(handle)?;
        let blob = self.store.blob(record.signature)?;
        self.method_signature(&self.parser(blob)?.parse_method_signature()?)
    }

    pub(crate) fn field_definition_type(&self, handle: Handle) -> Result<TypeRc> {
        let record = self.store.field(handle)?;
        let blob = self.store.blob(record.signature)?;
        let signature = self.parser(blob)?.parse_field_signature()?;
        self.type_from_signature(&signature.base)
    }

    /// Build the type a parsed signature describes
    ///
    /// # Errors
    /// Returns an error if a referenced type cannot be resolved or the construction is invalid.
    pub fn type_from_signature(&self, signature: &TypeSignature) -> Result<TypeRc> {
        let context = self.context()?;
        let well_known = |which| context.well_known_type(which);

        match signature {
            TypeSignature::Void => well_known(WellKnownType::Void),
            TypeSignature::Boolean => well_known(WellKnownType::Boolean),
            TypeSignature::Char => well_known(WellKnownType::Char),
            TypeSignature::I1 => well_known(WellKnownType::SByte),
            TypeSignature::U1 => well_known(WellKnownType::Byte),
            TypeSignature::I2 => well_known(WellKnownType::Int16),
            TypeSignature::U2 => well_known(WellKnownType::UInt16),
            TypeSignature::I4 => well_known(WellKnownType::Int32),
            TypeSignature::U4 => well_known(WellKnownType::UInt32),
            TypeSignature::I8 => well_known(WellKnownType::Int64),
            TypeSignature::U8 => well_known(WellKnownType::UInt64),
            TypeSignature::R4 => well_known(WellKnownType::Single),
            TypeSignature::R8 => well_known(WellKnownType::Double),
            TypeSignature::I => well_known(WellKnownType::IntPtr),
            TypeSignature::U => well_known(WellKnownType::UIntPtr),
            TypeSignature::String => well_known(WellKnownType::String),
            TypeSignature::Object => well_known(WellKnownType::Object),
            TypeSignature::TypedByRef => well_known(WellKnownType::TypedReference),
            TypeSignature::ValueType(handle) | TypeSignature::Class(handle) => {
                self.resolve_type(*handle)
            }
            TypeSignature::Ptr(pointer) => {
                context.pointer_type(&self.type_from_signature(&pointer.base)?)
            }
            TypeSignature::ByRef(inner) => context.byref_type(&self.type_from_signature(inner)?),
            TypeSignature::Pinned(inner) => self.type_from_signature(inner),
            TypeSignature::SzArray(array) => {
                context.array_type(&self.type_from_signature(&array.base)?, None)
            }
            TypeSignature::Array(array) => {
                context.array_type(&self.type_from_signature(&array.base)?, Some(array.rank))
            }
            TypeSignature::GenericInst(definition, arguments) => {
                let definition = self.type_from_signature(definition)?;
                let arguments = arguments
                    .iter()
                    .map(|argument| self.type_from_signature(argument))
                    .collect::<Result<Vec<_>>>()?;
                context.instantiated_type(&definition, arguments)
            }
            TypeSignature::GenericParamType(index) => Ok(context.signature_variable(*index, false)),
            TypeSignature::GenericParamMethod(index) => {
                Ok(context.signature_variable(*index, true))
            }
            TypeSignature::FnPtr(method) => {
                Ok(context.function_pointer_type(self.method_signature(method)?))
            }
            TypeSignature::Unknown => Err(malformed_error!("Signature of unknown type")),
        }
    }

    fn parameter_type(&self, parameter: &SignatureParameter) -> Result<TypeRc> {
        let base = self.type_from_signature(&parameter.base)?;
        if parameter.by_ref {
            self.context()?.byref_type(&base)
        } else {
            Ok(base)
        }
    }

    /// Build a resolved signature from a parsed one; vararg tail parameters are not part of it
    ///
    /// # Errors
    /// Returns an error if a parameter type cannot be resolved.
    pub fn method_signature(&self, signature: &SignatureMethod) -> Result<MethodSignature> {
        let mut flags = MethodSignatureFlags::empty();
        if signature.has_this {
            flags |= MethodSignatureFlags::HAS_THIS;
        }
        if signature.explicit_this {
            flags |= MethodSignatureFlags::EXPLICIT_THIS;
        }
        if signature.vararg {
            flags |= MethodSignatureFlags::VARARG;
        }

        let return_type = self.parameter_type(&signature.return_type)?;
        let parameters = signature
            .params
            .iter()
            .map(|parameter| self.parameter_type(parameter))
            .collect::<Result<Vec<_>>>()?;

        Ok(MethodSignature::new(
            flags,
            signature.param_count_generic,
            return_type,
            parameters,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::attributes::{
            FieldAttributes, GenericParameterAttributes, MethodAttributes, TypeAttributes,
        },
        test::{corelib_type, instance_method, static_method, CorelibBuilder},
    };

    #[test]
    fn member_references_search_the_base_chain() {
        let mut builder = CorelibBuilder::new()
            .with_disposable_class("Demo", "Resource")
            .with_derived_class("Demo", "FileResource", "Demo", "Resource")
            .with_class("Demo", "Node", &[("name", "String")]);
        let derived = builder.handle("Demo.FileResource");
        let node = builder.handle("Demo.Node");

        let to_string = builder
            .metadata()
            .method_reference(derived, "ToString", &instance_method(TypeSignature::String))
            .unwrap();
        let name = builder
            .metadata()
            .field_reference(node, "name", &TypeSignature::String)
            .unwrap();
        let missing = builder
            .metadata()
            .method_reference(derived, "Close", &instance_method(TypeSignature::Void))
            .unwrap();
        let (context, unit) = builder.build();

        let method = unit.resolve_method(to_string, None).unwrap();
        assert_eq!(method.owner(), &corelib_type(&context, "Demo", "Resource"));
        assert_eq!(method.name().unwrap(), "ToString");

        let field = unit.resolve_field(name, None).unwrap();
        assert_eq!(field.owner(), &corelib_type(&context, "Demo", "Node"));

        assert!(matches!(
            unit.resolve(missing, None),
            Err(Error::MissingMember { .. })
        ));
    }

    #[test]
    fn type_specifications_build_constructed_types() {
        let mut builder = CorelibBuilder::new();
        let strings = builder
            .metadata()
            .type_specification(&TypeSignature::sz_array(TypeSignature::String))
            .unwrap();
        let (context, unit) = builder.build();

        let resolved = unit.resolve_type(strings).unwrap();
        let string = context.well_known_type(WellKnownType::String).unwrap();
        assert_eq!(resolved, context.array_type(&string, None).unwrap());
    }

    #[test]
    fn scope_definition_is_the_unit_itself() {
        let mut builder = CorelibBuilder::new();
        let scope = builder.metadata().scope();
        let (_context, unit) = builder.build();

        let module = unit.resolve(scope, None).unwrap().into_module().unwrap();
        assert!(Arc::ptr_eq(&module, &unit));
        assert!(module.is_system_module());
    }

    #[test]
    fn entities_convert_only_to_their_kind() {
        let (context, unit) = CorelibBuilder::new().build();
        let object = corelib_type(&context, "System", "Object");

        let entity = Entity::Type(object.clone());
        assert!(matches!(entity.clone().into_field(), Err(Error::Malformed { .. })));
        assert_eq!(entity.into_type().unwrap(), object);
        assert!(Entity::Module(unit).into_method().is_err());
    }

    #[test]
    fn types_lists_nested_definitions() {
        let mut builder = CorelibBuilder::new().with_class("Demo", "Outer", &[]);
        let outer = builder.handle("Demo.Outer");
        let object = builder.handle("System.Object");
        builder
            .metadata()
            .define_nested_type(outer, "Inner", TypeAttributes::NESTED_PUBLIC, object)
            .unwrap();
        let (_context, unit) = builder.build();

        let names: Vec<String> = unit
            .types()
            .unwrap()
            .iter()
            .map(|ty| ty.display_name())
            .collect();
        assert!(names.iter().any(|name| name == "Demo.Outer+Inner"));
        assert!(unit.type_by_name("Demo", "Inner").unwrap().is_none());
    }

    #[test]
    fn constructors_are_not_inherited_through_member_references() {
        let mut builder = CorelibBuilder::new()
            .with_class("Demo", "Base", &[])
            .with_derived_class("Demo", "Derived", "Demo", "Base");
        let base = builder.handle("Demo.Base");
        let derived = builder.handle("Demo.Derived");
        let constructor = MethodAttributes::PUBLIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RT_SPECIAL_NAME;
        let signature = instance_method(TypeSignature::Void);
        builder
            .metadata()
            .add_method(base, ".ctor", constructor, &signature)
            .unwrap();

        let base_ctor = builder
            .metadata()
            .method_reference(base, ".ctor", &signature)
            .unwrap();
        let derived_ctor = builder
            .metadata()
            .method_reference(derived, ".ctor", &signature)
            .unwrap();
        let (context, unit) = builder.build();

        let resolved = unit.resolve_method(base_ctor, None).unwrap();
        assert!(resolved.is_constructor().unwrap());
        assert_eq!(resolved.owner(), &corelib_type(&context, "Demo", "Base"));

        match unit.resolve(derived_ctor, None) {
            Err(Error::MissingMember { owner, member }) => {
                assert_eq!(owner, "Demo.Derived");
                assert_eq!(member, ".ctor");
            }
            other => panic!("expected a missing member, got {other:?}"),
        }
    }

    #[test]
    fn qualified_members_live_on_the_instantiated_type() {
        let mut builder = CorelibBuilder::new();
        let object = builder.handle("System.Object");
        let metadata = builder.metadata();
        let generic_box = metadata.define_type("Demo", "Box`1", TypeAttributes::PUBLIC, object);
        metadata
            .add_generic_parameter(generic_box, "T", GenericParameterAttributes::empty())
            .unwrap();
        let item = metadata
            .add_field(
                generic_box,
                "item",
                FieldAttributes::PUBLIC,
                &TypeSignature::GenericParamType(0),
            )
            .unwrap();
        let get = metadata
            .add_method(
                generic_box,
                "Get",
                MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
                &instance_method(TypeSignature::GenericParamType(0)),
            )
            .unwrap();
        let int_box = metadata
            .type_specification(&TypeSignature::generic_inst(
                TypeSignature::Class(generic_box),
                vec![TypeSignature::I4],
            ))
            .unwrap();
        let qualified_item = metadata.qualified_field(int_box, item);
        let qualified_get = metadata.qualified_method(int_box, get);
        let (context, unit) = builder.build();

        let instantiated = unit.resolve_type(int_box).unwrap();
        assert_eq!(instantiated.display_name(), "Demo.Box`1<System.Int32>");

        let field = unit.resolve_field(qualified_item, None).unwrap();
        assert_eq!(field.owner(), &instantiated);
        assert_eq!(
            field.field_type().unwrap(),
            &context.well_known_type(WellKnownType::Int32).unwrap()
        );
        assert_eq!(unit.resolve_field(qualified_item, None).unwrap(), field);

        let method = unit.resolve_method(qualified_get, None).unwrap();
        assert_eq!(method.owner(), &instantiated);
        assert_eq!(method.name().unwrap(), "Get");
        assert_eq!(
            method.typical_method().owner(),
            &corelib_type(&context, "Demo", "Box`1")
        );
        assert_eq!(unit.resolve_method(qualified_get, None).unwrap(), method);
    }

    #[test]
    fn method_instantiations_carry_their_arguments() {
        let mut builder = CorelibBuilder::new().with_class("Demo", "Factory", &[]);
        let factory = builder.handle("Demo.Factory");
        let metadata = builder.metadata();
        let make = metadata
            .add_method(
                factory,
                "Make",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                &SignatureMethod {
                    param_count_generic: 1,
                    ..static_method()
                },
            )
            .unwrap();
        metadata
            .add_generic_parameter(make, "U", GenericParameterAttributes::empty())
            .unwrap();
        let make_string = metadata
            .method_instantiation(make, vec![TypeSignature::String])
            .unwrap();
        let (context, unit) = builder.build();

        let method = unit.resolve_method(make_string, None).unwrap();
        assert!(method.is_instantiated());
        assert_eq!(method.name().unwrap(), "Make");
        assert_eq!(
            method.instantiation().unwrap(),
            [context.well_known_type(WellKnownType::String).unwrap()]
        );
        assert_eq!(method.typical_method().instantiation().unwrap().len(), 1);
        assert_eq!(unit.resolve_method(make_string, None).unwrap(), method);
    }

    #[test]
    fn canon_references_resolve_to_the_canon_types() {
        let mut builder = CorelibBuilder::new();
        let metadata = builder.metadata();
        let scope = metadata.scope();
        let canon = metadata.type_reference(scope, "System", "__Canon");
        let universal = metadata.type_reference(scope, "System", "__UniversalCanon");
        let unknown = metadata.type_reference(scope, "System", "__Missing");
        let (context, unit) = builder.build();

        assert_eq!(
            unit.resolve_type(canon).unwrap(),
            context.canon_type(CanonKind::Normal)
        );
        assert_eq!(
            unit.resolve_type(universal).unwrap(),
            context.canon_type(CanonKind::Universal)
        );
        assert!(matches!(
            unit.resolve_type(unknown),
            Err(Error::TypeLoad { .. })
        ));
    }
}
