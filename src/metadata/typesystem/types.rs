use std::{
    fmt::Write,
    sync::{Arc, OnceLock, Weak},
};

use strum::IntoEnumIterator;

use crate::{
    metadata::{
        attributes::{MethodAttributes, TypeAttributes, Variance},
        handle::Handle,
        typesystem::{
            downgrade_types,
            flags::{FlagCache, TypeCategory, TypeFlags},
            lazy_init,
            layout::{InstanceLayout, StaticLayout},
            upgrade_types,
            virtuals::VirtualSlots,
            FieldRc, MethodRc, MethodSignature, TypeRc, TypeSystemContext, WeakType,
            WellKnownType,
        },
        unit::{upgrade_unit, MetadataUnit},
    },
    runtime::hashing::{
        array_type_hash, byref_type_hash, generic_instance_hash, method_signature_hash,
        name_hash, nested_type_hash, pointer_type_hash, type_hash,
    },
    Error, Result,
};

/// Namespace of the attributes the expensive type flags are derived from
const COMPILER_SERVICES: &str = "System.Runtime.CompilerServices";

/// The two placeholder types of shared generic code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonKind {
    /// `System.__Canon`, standing in for any reference type
    Normal,
    /// `System.__UniversalCanon`, standing in for any type
    Universal,
}

impl CanonKind {
    /// Simple name of the placeholder type
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CanonKind::Normal => "__Canon",
            CanonKind::Universal => "__UniversalCanon",
        }
    }
}

/// What a [`TypeDesc`] is
#[derive(Debug)]
pub enum TypeKind {
    /// A type definition in the metadata of `unit`
    Metadata {
        /// Owning unit
        unit: Weak<MetadataUnit>,
        /// TypeDefinition handle
        handle: Handle,
    },
    /// A generic definition instantiated over type arguments
    Instantiated {
        /// The generic type definition
        definition: TypeRc,
        /// Type arguments, one per generic parameter
        arguments: Vec<TypeRc>,
    },
    /// An array type
    Array {
        /// Element type
        element: TypeRc,
        /// Rank of a multi-dimensional array, `None` for a single-dimension zero-based array
        rank: Option<u32>,
    },
    /// An unmanaged pointer
    Pointer(TypeRc),
    /// A managed reference
    ByRef(TypeRc),
    /// A function pointer
    FunctionPointer(MethodSignature),
    /// A generic parameter of a type or method definition
    GenericParameter {
        /// Owning unit
        unit: Weak<MetadataUnit>,
        /// GenericParameter handle
        handle: Handle,
    },
    /// `!index` or, with `method`, `!!index` as it appears in a signature
    SignatureVariable {
        /// Position in the instantiation
        index: u32,
        /// Refers to the method instantiation rather than the type instantiation
        method: bool,
    },
    /// A placeholder type of shared generic code
    Canon(CanonKind),
}

/// A type of the type system.
///
/// Always handled through a [`TypeRc`]. Identity, names and shape come from the [`TypeKind`];
/// everything else is computed lazily and cached.
pub struct TypeDesc {
    kind: TypeKind,
    context: Weak<TypeSystemContext>,
    pub(crate) flags: FlagCache,
    name: OnceLock<String>,
    namespace: OnceLock<String>,
    full_name: OnceLock<String>,
    hash_code: OnceLock<u32>,
    base: OnceLock<Option<WeakType>>,
    explicit_interfaces: OnceLock<Vec<WeakType>>,
    pub(crate) runtime_interface_list: OnceLock<Vec<WeakType>>,
    generic_parameters: OnceLock<Vec<WeakType>>,
    pub(crate) instance_layout_cache: OnceLock<Arc<InstanceLayout>>,
    pub(crate) static_layout_cache: OnceLock<Arc<StaticLayout>>,
    pub(crate) virtual_slot_cache: OnceLock<Arc<VirtualSlots>>,
}

impl TypeDesc {
    pub(crate) fn new(kind: TypeKind, context: Weak<TypeSystemContext>) -> Self {
        let initial = match kind {
            TypeKind::Canon(_) => TypeFlags::from_category(TypeCategory::Class).bits(),
            _ => 0,
        };

        TypeDesc {
            kind,
            context,
            flags: FlagCache::new(initial),
            name: OnceLock::new(),
            namespace: OnceLock::new(),
            full_name: OnceLock::new(),
            hash_code: OnceLock::new(),
            base: OnceLock::new(),
            explicit_interfaces: OnceLock::new(),
            runtime_interface_list: OnceLock::new(),
            generic_parameters: OnceLock::new(),
            instance_layout_cache: OnceLock::new(),
            static_layout_cache: OnceLock::new(),
            virtual_slot_cache: OnceLock::new(),
        }
    }

    /// What this type is
    #[must_use]
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Metadata handle of a definition-backed type or generic parameter
    #[must_use]
    pub fn handle(&self) -> Option<Handle> {
        match &self.kind {
            TypeKind::Metadata { handle, .. } | TypeKind::GenericParameter { handle, .. } => {
                Some(*handle)
            }
            _ => None,
        }
    }

    /// The context that interned this type
    ///
    /// # Errors
    /// Returns [`Error::UnitUnavailable`] once the context has been dropped.
    pub fn context(&self) -> Result<Arc<TypeSystemContext>> {
        self.context.upgrade().ok_or(Error::UnitUnavailable)
    }

    /// Unit and TypeDefinition handle of the typical definition, for definition-backed and
    /// instantiated types
    pub(crate) fn definition(&self) -> Result<Option<(Arc<MetadataUnit>, Handle)>> {
        match &self.kind {
            TypeKind::Metadata { unit, handle } => Ok(Some((upgrade_unit(unit)?, *handle))),
            TypeKind::Instantiated { definition, .. } => definition.definition(),
            _ => Ok(None),
        }
    }

    /// Simple name.
    ///
    /// Instantiated types report the name of their definition, constructed types their full
    /// name.
    ///
    /// # Errors
    /// Returns an error if the name cannot be read from the metadata.
    pub fn name(&self) -> Result<&str> {
        match &self.kind {
            TypeKind::Instantiated { definition, .. } => definition.name(),
            TypeKind::Metadata { unit, handle } => lazy_init(&self.name, || {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().type_definition(*handle)?;
                Ok(unit.store().string(record.name)?.to_string())
            })
            .map(String::as_str),
            TypeKind::GenericParameter { unit, handle } => lazy_init(&self.name, || {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().generic_parameter(*handle)?;
                Ok(unit.store().string(record.name)?.to_string())
            })
            .map(String::as_str),
            _ => self.full_name(),
        }
    }

    /// Namespace, empty for nested and constructed types
    ///
    /// # Errors
    /// Returns an error if the namespace cannot be read from the metadata.
    pub fn namespace(&self) -> Result<&str> {
        match &self.kind {
            TypeKind::Instantiated { definition, .. } => definition.namespace(),
            TypeKind::Metadata { unit, handle } => lazy_init(&self.namespace, || {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().type_definition(*handle)?;
                if record.enclosing_type.is_null() {
                    unit.namespace_name(record.namespace)
                } else {
                    Ok(String::new())
                }
            })
            .map(String::as_str),
            TypeKind::Canon(_) => Ok("System"),
            _ => Ok(""),
        }
    }

    /// Fully qualified name: `Namespace.Outer+Inner`, ``List`1<System.Int32>``, `System.Int32[,]`
    ///
    /// # Errors
    /// Returns an error if a component name cannot be read from the metadata.
    pub fn full_name(&self) -> Result<&str> {
        lazy_init(&self.full_name, || self.compute_full_name()).map(String::as_str)
    }

    fn compute_full_name(&self) -> Result<String> {
        let mut result = String::new();
        match &self.kind {
            TypeKind::Metadata { unit, handle } => {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().type_definition(*handle)?;
                if record.enclosing_type.is_null() {
                    let namespace = self.namespace()?;
                    if !namespace.is_empty() {
                        result.push_str(namespace);
                        result.push('.');
                    }
                } else {
                    let enclosing = unit.resolve_type(record.enclosing_type)?;
                    result.push_str(enclosing.full_name()?);
                    result.push('+');
                }
                result.push_str(self.name()?);
            }
            TypeKind::Instantiated {
                definition,
                arguments,
            } => {
                result.push_str(definition.full_name()?);
                result.push('<');
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        result.push(',');
                    }
                    result.push_str(argument.full_name()?);
                }
                result.push('>');
            }
            TypeKind::Array { element, rank } => {
                result.push_str(element.full_name()?);
                match rank {
                    None => result.push_str("[]"),
                    Some(1) => result.push_str("[*]"),
                    Some(rank) => {
                        result.push('[');
                        for _ in 1..*rank {
                            result.push(',');
                        }
                        result.push(']');
                    }
                }
            }
            TypeKind::Pointer(element) => {
                result.push_str(element.full_name()?);
                result.push('*');
            }
            TypeKind::ByRef(element) => {
                result.push_str(element.full_name()?);
                result.push('&');
            }
            TypeKind::FunctionPointer(signature) => {
                let _ = write!(result, "method {}", signature.display_name());
            }
            TypeKind::GenericParameter { .. } => result.push_str(self.name()?),
            TypeKind::SignatureVariable { index, method } => {
                let _ = write!(result, "{}{}", if *method { "!!" } else { "!" }, index);
            }
            TypeKind::Canon(kind) => {
                result.push_str("System.");
                result.push_str(kind.name());
            }
        }
        Ok(result)
    }

    /// Full name for diagnostics; never fails
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.full_name() {
            Ok(name) => name.to_string(),
            Err(_) => format!("<unavailable {:?}>", self.handle()),
        }
    }

    /// Returns true if this is the system-module type `System.<name>`
    pub(crate) fn is_system_type(&self, name: &str) -> Result<bool> {
        let TypeKind::Metadata { unit, handle } = &self.kind else {
            return Ok(false);
        };

        let unit = upgrade_unit(unit)?;
        if !unit.is_system_module() {
            return Ok(false);
        }
        let record = unit.store().type_definition(*handle)?;
        Ok(record.enclosing_type.is_null() && self.namespace()? == "System" && self.name()? == name)
    }

    /// Returns true if this is the well-known type `which`
    ///
    /// # Errors
    /// Returns an error if the name cannot be read from the metadata.
    pub fn is_well_known(&self, which: WellKnownType) -> Result<bool> {
        self.is_system_type(which.name())
    }

    /// Element type of arrays, pointee of pointers and by-refs
    #[must_use]
    pub fn element_type(&self) -> Option<&TypeRc> {
        match &self.kind {
            TypeKind::Array { element, .. } | TypeKind::Pointer(element) | TypeKind::ByRef(element) => {
                Some(element)
            }
            _ => None,
        }
    }

    /// Rank of an array type; 1 for single-dimension zero-based arrays
    #[must_use]
    pub fn rank(&self) -> Option<u32> {
        match &self.kind {
            TypeKind::Array { rank, .. } => Some(rank.unwrap_or(1)),
            _ => None,
        }
    }

    /// Returns true for array types of any rank
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    /// Returns true for single-dimension zero-based arrays
    #[must_use]
    pub fn is_sz_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { rank: None, .. })
    }

    /// Returns true for multi-dimensional arrays
    #[must_use]
    pub fn is_md_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { rank: Some(_), .. })
    }

    /// Returns true for unmanaged pointers
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    /// Returns true for managed references
    #[must_use]
    pub fn is_byref(&self) -> bool {
        matches!(self.kind, TypeKind::ByRef(_))
    }

    /// Returns true for function pointers
    #[must_use]
    pub fn is_function_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::FunctionPointer(_))
    }

    /// Returns true for arrays, pointers and by-refs
    #[must_use]
    pub fn is_parameterized(&self) -> bool {
        self.element_type().is_some()
    }

    /// Returns true for generic parameters of definitions
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(self.kind, TypeKind::GenericParameter { .. })
    }

    /// Returns true for `!n` and `!!n`
    #[must_use]
    pub fn is_signature_variable(&self) -> bool {
        matches!(self.kind, TypeKind::SignatureVariable { .. })
    }

    /// Returns true for the shared-code placeholder types
    #[must_use]
    pub fn is_canon(&self) -> bool {
        matches!(self.kind, TypeKind::Canon(_))
    }

    /// Returns true for instantiated generic types
    #[must_use]
    pub fn is_instantiated(&self) -> bool {
        matches!(self.kind, TypeKind::Instantiated { .. })
    }

    /// Returns true if a generic parameter or signature variable occurs anywhere in the type
    #[must_use]
    pub fn contains_generic_variables(&self) -> bool {
        match &self.kind {
            TypeKind::GenericParameter { .. } | TypeKind::SignatureVariable { .. } => true,
            TypeKind::Instantiated { arguments, .. } => arguments
                .iter()
                .any(|argument| argument.contains_generic_variables()),
            TypeKind::Array { element, .. }
            | TypeKind::Pointer(element)
            | TypeKind::ByRef(element) => element.contains_generic_variables(),
            TypeKind::FunctionPointer(signature) => {
                signature.return_type.contains_generic_variables()
                    || signature
                        .parameters
                        .iter()
                        .any(|parameter| parameter.contains_generic_variables())
            }
            TypeKind::Metadata { .. } | TypeKind::Canon(_) => false,
        }
    }

    /// Metadata attributes of the typical definition, empty for constructed types
    ///
    /// # Errors
    /// Returns an error if the definition record cannot be read.
    pub fn attributes(&self) -> Result<TypeAttributes> {
        match self.definition()? {
            Some((unit, handle)) => Ok(unit.store().type_definition(handle)?.flags),
            None => Ok(TypeAttributes::empty()),
        }
    }

    /// Packing size and explicit instance size from the class layout; zero when unspecified
    ///
    /// # Errors
    /// Returns an error if the definition record cannot be read.
    pub fn class_layout(&self) -> Result<(u16, u32)> {
        match self.definition()? {
            Some((unit, handle)) => {
                let record = unit.store().type_definition(handle)?;
                Ok((record.packing_size, record.class_size))
            }
            None => Ok((0, 0)),
        }
    }

    /// Number of generic parameters of a definition, or arguments of an instantiation
    ///
    /// # Errors
    /// Returns an error if the definition record cannot be read.
    pub fn generic_parameter_count(&self) -> Result<usize> {
        match &self.kind {
            TypeKind::Metadata { unit, handle } => Ok(upgrade_unit(unit)?
                .store()
                .type_definition(*handle)?
                .generic_parameters
                .len()),
            TypeKind::Instantiated { arguments, .. } => Ok(arguments.len()),
            _ => Ok(0),
        }
    }

    /// Returns true for a generic type definition (the typical, uninstantiated form)
    ///
    /// # Errors
    /// Returns an error if the definition record cannot be read.
    pub fn is_generic_definition(&self) -> Result<bool> {
        Ok(matches!(self.kind, TypeKind::Metadata { .. }) && self.generic_parameter_count()? > 0)
    }

    /// Returns true for generic definitions and their instantiations
    ///
    /// # Errors
    /// Returns an error if the definition record cannot be read.
    pub fn has_instantiation(&self) -> Result<bool> {
        Ok(self.is_instantiated() || self.is_generic_definition()?)
    }

    /// Declared variance of each generic parameter of the typical definition
    ///
    /// # Errors
    /// Returns an error if a generic parameter record cannot be read.
    pub fn generic_parameter_variance(&self) -> Result<Vec<Variance>> {
        let Some((unit, handle)) = self.definition()? else {
            return Ok(Vec::new());
        };

        let record = unit.store().type_definition(handle)?;
        record
            .generic_parameters
            .iter()
            .map(|parameter| Ok(unit.store().generic_parameter(*parameter)?.flags.variance()))
            .collect()
    }

    /// Owning unit: that of the definition, of the element type, or the system module for the
    /// placeholder types. Function pointers and signature variables belong to no unit.
    ///
    /// # Errors
    /// Returns [`Error::UnitUnavailable`] if the owning unit is gone, or the system module
    /// error for placeholder types.
    pub fn module(&self) -> Result<Option<Arc<MetadataUnit>>> {
        match &self.kind {
            TypeKind::Metadata { unit, .. } | TypeKind::GenericParameter { unit, .. } => {
                Ok(Some(upgrade_unit(unit)?))
            }
            TypeKind::Instantiated { definition, .. } => definition.module(),
            TypeKind::Array { element, .. }
            | TypeKind::Pointer(element)
            | TypeKind::ByRef(element) => element.module(),
            TypeKind::Canon(_) => Ok(Some(self.context()?.system_module()?)),
            TypeKind::FunctionPointer(_) | TypeKind::SignatureVariable { .. } => Ok(None),
        }
    }

    fn has_custom_attribute(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.definition()? {
            Some((unit, handle)) => {
                let record = unit.store().type_definition(handle)?;
                unit.has_custom_attribute(&record.custom_attributes, namespace, name)
            }
            None => Ok(false),
        }
    }

    fn attribute_flags(&self) -> Result<TypeFlags> {
        let word = self
            .flags
            .get_or_compute(TypeFlags::ATTRIBUTE_CACHE_COMPUTED.bits(), || {
                let mut flags = TypeFlags::empty();
                if self.has_custom_attribute(COMPILER_SERVICES, "IsByRefLikeAttribute")? {
                    flags |= TypeFlags::IS_BYREF_LIKE;
                }
                if self.has_custom_attribute(COMPILER_SERVICES, "IntrinsicAttribute")? {
                    flags |= TypeFlags::IS_INTRINSIC;
                }
                Ok(flags.bits())
            })?;
        Ok(TypeFlags::from_bits_retain(word))
    }

    /// Marked with `IsByRefLikeAttribute`
    ///
    /// # Errors
    /// Returns an error if the custom attributes cannot be read.
    pub fn is_byref_like(&self) -> Result<bool> {
        Ok(self.attribute_flags()?.contains(TypeFlags::IS_BYREF_LIKE))
    }

    /// Marked with `IntrinsicAttribute`
    ///
    /// # Errors
    /// Returns an error if the custom attributes cannot be read.
    pub fn is_intrinsic(&self) -> Result<bool> {
        Ok(self.attribute_flags()?.contains(TypeFlags::IS_INTRINSIC))
    }

    /// At least one generic parameter of the definition is co- or contravariant
    ///
    /// # Errors
    /// Returns an error if a generic parameter record cannot be read.
    pub fn has_generic_variance(&self) -> Result<bool> {
        let word = self
            .flags
            .get_or_compute(TypeFlags::HAS_GENERIC_VARIANCE_COMPUTED.bits(), || {
                let variant = self
                    .generic_parameter_variance()?
                    .into_iter()
                    .any(|variance| variance != Variance::None);
                Ok(if variant {
                    TypeFlags::HAS_GENERIC_VARIANCE.bits()
                } else {
                    0
                })
            })?;
        Ok(TypeFlags::from_bits_retain(word).contains(TypeFlags::HAS_GENERIC_VARIANCE))
    }

    /// The typical definition declares a static constructor
    ///
    /// # Errors
    /// Returns an error if a method record cannot be read.
    pub fn has_static_constructor(&self) -> Result<bool> {
        let word = self
            .flags
            .get_or_compute(TypeFlags::HAS_STATIC_CONSTRUCTOR_COMPUTED.bits(), || {
                let Some((unit, handle)) = self.definition()? else {
                    return Ok(0);
                };

                let store = unit.store();
                for method in &store.type_definition(handle)?.methods {
                    let record = store.method(*method)?;
                    if record.flags.contains(MethodAttributes::STATIC)
                        && store.string(record.name)? == ".cctor"
                    {
                        return Ok(TypeFlags::HAS_STATIC_CONSTRUCTOR.bits());
                    }
                }
                Ok(0)
            })?;
        Ok(TypeFlags::from_bits_retain(word).contains(TypeFlags::HAS_STATIC_CONSTRUCTOR))
    }

    pub(crate) fn pointer_size(&self) -> Result<u32> {
        Ok(self.context()?.pointer_size())
    }
}

impl TypeRc {
    /// Structural category
    ///
    /// # Errors
    /// Returns an error if the definition or its base type cannot be resolved.
    pub fn category(&self) -> Result<TypeCategory> {
        let word = self
            .flags
            .get_or_compute(TypeFlags::CATEGORY_COMPUTED.bits(), || {
                Ok(self.compute_category()? as u32)
            })?;
        TypeFlags::from_bits_retain(word)
            .category()
            .ok_or_else(|| invariant_error!("Type {} has an invalid category", self))
    }

    fn compute_category(&self) -> Result<TypeCategory> {
        Ok(match self.kind() {
            TypeKind::Metadata { unit, handle } => {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().type_definition(*handle)?;
                if record.flags.contains(TypeAttributes::INTERFACE) {
                    return Ok(TypeCategory::Interface);
                }

                if unit.is_system_module()
                    && record.enclosing_type.is_null()
                    && self.namespace()? == "System"
                {
                    let name = self.name()?;
                    if let Some(primitive) = WellKnownType::iter()
                        .find(|known| known.name() == name)
                        .and_then(WellKnownType::primitive_category)
                    {
                        return Ok(primitive);
                    }
                }

                match self.base_type()? {
                    Some(base) if base.is_well_known(WellKnownType::ValueType)? => {
                        if self.is_well_known(WellKnownType::Enum)? {
                            TypeCategory::Class
                        } else if self.is_well_known(WellKnownType::Nullable)? {
                            TypeCategory::Nullable
                        } else {
                            TypeCategory::ValueType
                        }
                    }
                    Some(base) if base.is_well_known(WellKnownType::Enum)? => TypeCategory::Enum,
                    _ => TypeCategory::Class,
                }
            }
            TypeKind::Instantiated { definition, .. } => definition.category()?,
            TypeKind::Array { rank: None, .. } => TypeCategory::SzArray,
            TypeKind::Array { .. } => TypeCategory::Array,
            TypeKind::Pointer(_) => TypeCategory::Pointer,
            TypeKind::ByRef(_) => TypeCategory::ByRef,
            TypeKind::FunctionPointer(_) => TypeCategory::FunctionPointer,
            TypeKind::GenericParameter { .. } => TypeCategory::GenericParameter,
            TypeKind::SignatureVariable { method: false, .. } => {
                TypeCategory::SignatureTypeVariable
            }
            TypeKind::SignatureVariable { method: true, .. } => {
                TypeCategory::SignatureMethodVariable
            }
            TypeKind::Canon(_) => TypeCategory::Class,
        })
    }

    /// Returns true if instances are values: primitives, enums, structs and nullables
    ///
    /// # Errors
    /// See [`TypeRc::category`].
    pub fn is_value_type(&self) -> Result<bool> {
        Ok(self.category()?.is_value_type())
    }

    /// Returns true for the primitive types, `System.Void` included
    ///
    /// # Errors
    /// See [`TypeRc::category`].
    pub fn is_primitive(&self) -> Result<bool> {
        Ok(self.category()?.is_primitive())
    }

    /// Returns true for enums
    ///
    /// # Errors
    /// See [`TypeRc::category`].
    pub fn is_enum(&self) -> Result<bool> {
        Ok(self.category()? == TypeCategory::Enum)
    }

    /// Returns true for `System.Nullable<T>` and its instantiations
    ///
    /// # Errors
    /// See [`TypeRc::category`].
    pub fn is_nullable(&self) -> Result<bool> {
        Ok(self.category()? == TypeCategory::Nullable)
    }

    /// Returns true for interfaces
    ///
    /// # Errors
    /// See [`TypeRc::category`].
    pub fn is_interface(&self) -> Result<bool> {
        Ok(self.category()? == TypeCategory::Interface)
    }

    /// Returns true if a storage location of this type holds a GC reference
    ///
    /// # Errors
    /// See [`TypeRc::category`].
    pub fn is_gc_pointer(&self) -> Result<bool> {
        Ok(matches!(
            self.category()?,
            TypeCategory::Class
                | TypeCategory::Interface
                | TypeCategory::Array
                | TypeCategory::SzArray
        ))
    }

    /// The generic definition of an instantiated type, or the type itself
    #[must_use]
    pub fn type_definition(&self) -> TypeRc {
        match self.kind() {
            TypeKind::Instantiated { definition, .. } => definition.clone(),
            _ => self.clone(),
        }
    }

    /// Type arguments of an instantiation, or the generic parameters of a definition
    ///
    /// # Errors
    /// Returns an error if a generic parameter cannot be resolved.
    pub fn instantiation(&self) -> Result<Vec<TypeRc>> {
        match self.kind() {
            TypeKind::Instantiated { arguments, .. } => Ok(arguments.clone()),
            TypeKind::Metadata { unit, handle } => {
                if let Some(cached) = self.generic_parameters.get() {
                    return upgrade_types(cached);
                }

                let unit = upgrade_unit(unit)?;
                let parameters = unit
                    .store()
                    .type_definition(*handle)?
                    .generic_parameters
                    .iter()
                    .map(|parameter| unit.resolve_type(*parameter))
                    .collect::<Result<Vec<_>>>()?;
                let _ = self.generic_parameters.set(downgrade_types(&parameters));
                Ok(parameters)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Base type: the declared one, `System.Array` for arrays, `System.Object` for the
    /// placeholder types, `None` otherwise
    ///
    /// # Errors
    /// Returns an error if the base type cannot be resolved.
    pub fn base_type(&self) -> Result<Option<TypeRc>> {
        if let Some(cached) = self.base.get() {
            return cached.as_ref().map(WeakType::upgrade).transpose();
        }

        let base = match self.kind() {
            TypeKind::Metadata { unit, handle } => {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().type_definition(*handle)?;
                if record.base_type.is_null() {
                    None
                } else {
                    Some(unit.resolve_type(record.base_type)?)
                }
            }
            TypeKind::Instantiated {
                definition,
                arguments,
            } => match definition.base_type()? {
                Some(base) => Some(base.instantiate_signature(arguments, &[])?),
                None => None,
            },
            TypeKind::Array { .. } => {
                Some(self.context()?.well_known_type(WellKnownType::Array)?)
            }
            TypeKind::Canon(_) => Some(self.context()?.well_known_type(WellKnownType::Object)?),
            _ => None,
        };

        let _ = self.base.set(base.as_ref().map(TypeRc::downgrade));
        Ok(base)
    }

    /// Interfaces the type declares directly
    ///
    /// # Errors
    /// Returns an error if an interface cannot be resolved.
    pub fn explicit_interfaces(&self) -> Result<Vec<TypeRc>> {
        if let Some(cached) = self.explicit_interfaces.get() {
            return upgrade_types(cached);
        }

        let interfaces = match self.kind() {
            TypeKind::Metadata { unit, handle } => {
                let unit = upgrade_unit(unit)?;
                unit.store()
                    .type_definition(*handle)?
                    .interfaces
                    .iter()
                    .map(|interface| unit.resolve_type(*interface))
                    .collect::<Result<Vec<_>>>()?
            }
            TypeKind::Instantiated {
                definition,
                arguments,
            } => definition
                .explicit_interfaces()?
                .iter()
                .map(|interface| interface.instantiate_signature(arguments, &[]))
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };

        let _ = self
            .explicit_interfaces
            .set(downgrade_types(&interfaces));
        Ok(interfaces)
    }

    /// Enclosing type of a nested type
    ///
    /// # Errors
    /// Returns an error if the enclosing type cannot be resolved.
    pub fn containing_type(&self) -> Result<Option<TypeRc>> {
        let TypeKind::Metadata { unit, handle } = self.kind() else {
            return Ok(None);
        };

        let unit = upgrade_unit(unit)?;
        let record = unit.store().type_definition(*handle)?;
        if record.enclosing_type.is_null() {
            Ok(None)
        } else {
            unit.resolve_type(record.enclosing_type).map(Some)
        }
    }

    /// Types nested in the typical definition
    ///
    /// # Errors
    /// Returns an error if a nested type cannot be resolved.
    pub fn nested_types(&self) -> Result<Vec<TypeRc>> {
        let Some((unit, handle)) = self.definition()? else {
            return Ok(Vec::new());
        };

        unit.store()
            .type_definition(handle)?
            .nested_types
            .iter()
            .map(|nested| unit.resolve_type(*nested))
            .collect()
    }

    /// Nested type of the typical definition called `name`
    ///
    /// # Errors
    /// Returns an error if a nested type record cannot be read.
    pub fn get_nested_type(&self, name: &str) -> Result<Option<TypeRc>> {
        let Some((unit, handle)) = self.definition()? else {
            return Ok(None);
        };

        let store = unit.store();
        for nested in &store.type_definition(handle)?.nested_types {
            if store.string(store.type_definition(*nested)?.name)? == name {
                return unit.resolve_type(*nested).map(Some);
            }
        }
        Ok(None)
    }

    /// Methods in declaration order; on an instantiated type, the methods of the definition
    /// instantiated over its arguments
    ///
    /// # Errors
    /// Returns an error if a method cannot be resolved.
    pub fn methods(&self) -> Result<Vec<MethodRc>> {
        let Some((unit, handle)) = self.definition()? else {
            return Ok(Vec::new());
        };

        let owner = self.is_instantiated().then_some(self);
        unit.store()
            .type_definition(handle)?
            .methods
            .iter()
            .map(|method| unit.resolve_method(*method, owner))
            .collect()
    }

    /// Fields in declaration order, statics included
    ///
    /// # Errors
    /// Returns an error if a field cannot be resolved.
    pub fn fields(&self) -> Result<Vec<FieldRc>> {
        let Some((unit, handle)) = self.definition()? else {
            return Ok(Vec::new());
        };

        let owner = self.is_instantiated().then_some(self);
        unit.store()
            .type_definition(handle)?
            .fields
            .iter()
            .map(|field| unit.resolve_field(*field, owner))
            .collect()
    }

    /// Method called `name` whose uninstantiated signature equals `signature`.
    ///
    /// Signatures are compared in the form they are written in metadata, over signature
    /// variables; `None` matches the first method of that name.
    ///
    /// # Errors
    /// Returns an error if a method or its signature cannot be resolved.
    pub fn get_method(
        &self,
        name: &str,
        signature: Option<&MethodSignature>,
    ) -> Result<Option<MethodRc>> {
        for method in self.methods()? {
            if method.name()? != name {
                continue;
            }
            match signature {
                None => return Ok(Some(method)),
                Some(signature) => {
                    if method.typical_method().signature()? == signature {
                        return Ok(Some(method));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Field called `name`
    ///
    /// # Errors
    /// Returns an error if a field cannot be resolved.
    pub fn get_field(&self, name: &str) -> Result<Option<FieldRc>> {
        for field in self.fields()? {
            if field.name()? == name {
                return Ok(Some(field));
            }
        }
        Ok(None)
    }

    /// The static constructor, if the type declares one
    ///
    /// # Errors
    /// Returns an error if a method cannot be resolved.
    pub fn static_constructor(&self) -> Result<Option<MethodRc>> {
        if !self.has_static_constructor()? {
            return Ok(None);
        }
        for method in self.methods()? {
            if method.is_static()? && method.name()? == ".cctor" {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }

    /// Underlying primitive type of an enum; any other type is its own underlying type
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for an enum without an instance field.
    pub fn enum_underlying_type(&self) -> Result<TypeRc> {
        if !self.is_enum()? {
            return Ok(self.clone());
        }

        for field in self.fields()? {
            if !field.is_static()? {
                return Ok(field.field_type()?.clone());
            }
        }
        Err(malformed_error!("Enum {} has no instance field", self))
    }

    /// Replace the signature variables in this type.
    ///
    /// `!n` becomes `type_arguments[n]` and `!!n` becomes `method_arguments[n]`; an empty
    /// argument list leaves its variables in place. Types without variables are returned
    /// unchanged.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a variable outside a non-empty argument list.
    pub fn instantiate_signature(
        &self,
        type_arguments: &[TypeRc],
        method_arguments: &[TypeRc],
    ) -> Result<TypeRc> {
        match self.kind() {
            TypeKind::SignatureVariable { index, method } => {
                let arguments = if *method {
                    method_arguments
                } else {
                    type_arguments
                };
                if arguments.is_empty() {
                    return Ok(self.clone());
                }
                arguments.get(*index as usize).cloned().ok_or_else(|| {
                    malformed_error!(
                        "Signature variable {} is outside an instantiation of {} arguments",
                        self,
                        arguments.len()
                    )
                })
            }
            TypeKind::Instantiated {
                definition,
                arguments,
            } => {
                let instantiated = arguments
                    .iter()
                    .map(|argument| argument.instantiate_signature(type_arguments, method_arguments))
                    .collect::<Result<Vec<_>>>()?;
                if instantiated == *arguments {
                    Ok(self.clone())
                } else {
                    self.context()?.instantiated_type(definition, instantiated)
                }
            }
            TypeKind::Array { element, rank } => {
                let instantiated = element.instantiate_signature(type_arguments, method_arguments)?;
                if instantiated == *element {
                    Ok(self.clone())
                } else {
                    self.context()?.array_type(&instantiated, *rank)
                }
            }
            TypeKind::Pointer(element) => {
                let instantiated = element.instantiate_signature(type_arguments, method_arguments)?;
                if instantiated == *element {
                    Ok(self.clone())
                } else {
                    self.context()?.pointer_type(&instantiated)
                }
            }
            TypeKind::ByRef(element) => {
                let instantiated = element.instantiate_signature(type_arguments, method_arguments)?;
                if instantiated == *element {
                    Ok(self.clone())
                } else {
                    self.context()?.byref_type(&instantiated)
                }
            }
            TypeKind::FunctionPointer(signature) => {
                let instantiated = signature.instantiate(type_arguments, method_arguments)?;
                if instantiated == *signature {
                    Ok(self.clone())
                } else {
                    Ok(self.context()?.function_pointer_type(instantiated))
                }
            }
            _ => Ok(self.clone()),
        }
    }

    /// `T[]`, or `T[,…]` when `rank` is given
    ///
    /// # Errors
    /// See [`TypeSystemContext::array_type`].
    pub fn make_array_type(&self, rank: Option<u32>) -> Result<TypeRc> {
        self.context()?.array_type(self, rank)
    }

    /// `T*`
    ///
    /// # Errors
    /// See [`TypeSystemContext::pointer_type`].
    pub fn make_pointer_type(&self) -> Result<TypeRc> {
        self.context()?.pointer_type(self)
    }

    /// `T&`
    ///
    /// # Errors
    /// See [`TypeSystemContext::byref_type`].
    pub fn make_byref_type(&self) -> Result<TypeRc> {
        self.context()?.byref_type(self)
    }

    /// Instantiate this generic definition over `arguments`
    ///
    /// # Errors
    /// See [`TypeSystemContext::instantiated_type`].
    pub fn make_instantiated_type(&self, arguments: Vec<TypeRc>) -> Result<TypeRc> {
        self.context()?.instantiated_type(self, arguments)
    }

    /// Name-based hash code, stable across processes
    ///
    /// # Errors
    /// Returns an error if a component name cannot be read.
    pub fn hash_code(&self) -> Result<u32> {
        lazy_init(&self.hash_code, || {
            Ok(match self.kind() {
                TypeKind::Metadata { .. } => match self.containing_type()? {
                    Some(enclosing) => nested_type_hash(enclosing.hash_code()?, self.name()?),
                    None => type_hash(self.namespace()?, self.name()?),
                },
                TypeKind::Instantiated {
                    definition,
                    arguments,
                } => {
                    let arguments = arguments
                        .iter()
                        .map(TypeRc::hash_code)
                        .collect::<Result<Vec<_>>>()?;
                    generic_instance_hash(definition.hash_code()?, &arguments)
                }
                TypeKind::Array { element, rank } => {
                    array_type_hash(element.hash_code()?, rank.unwrap_or(1))
                }
                TypeKind::Pointer(element) => pointer_type_hash(element.hash_code()?),
                TypeKind::ByRef(element) => byref_type_hash(element.hash_code()?),
                TypeKind::FunctionPointer(signature) => {
                    let parameters = signature
                        .parameters
                        .iter()
                        .map(TypeRc::hash_code)
                        .collect::<Result<Vec<_>>>()?;
                    method_signature_hash(signature.return_type.hash_code()?, &parameters)
                }
                TypeKind::GenericParameter { .. } | TypeKind::SignatureVariable { .. } => {
                    name_hash(self.full_name()?)
                }
                TypeKind::Canon(kind) => type_hash("System", kind.name()),
            })
        })
        .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::attributes::TypeAttributes,
        runtime::hashing::type_hash,
        test::{context_with_corelib, corelib_type, CorelibBuilder},
    };

    #[test]
    fn constructed_type_names() {
        let (context, _) = context_with_corelib();
        let int32 = context.well_known_type(WellKnownType::Int32).unwrap();
        let nullable = context.well_known_type(WellKnownType::Nullable).unwrap();

        let name = |ty: TypeRc| ty.full_name().unwrap().to_string();
        assert_eq!(name(int32.make_array_type(None).unwrap()), "System.Int32[]");
        assert_eq!(name(int32.make_array_type(Some(1)).unwrap()), "System.Int32[*]");
        assert_eq!(name(int32.make_array_type(Some(3)).unwrap()), "System.Int32[,,]");
        assert_eq!(name(int32.make_pointer_type().unwrap()), "System.Int32*");
        assert_eq!(name(int32.make_byref_type().unwrap()), "System.Int32&");
        assert_eq!(
            name(nullable.make_instantiated_type(vec![int32.clone()]).unwrap()),
            "System.Nullable`1<System.Int32>"
        );
        assert_eq!(name(context.signature_variable(1, true)), "!!1");
        assert_eq!(name(context.canon_type(CanonKind::Normal)), "System.__Canon");
    }

    #[test]
    fn nested_types_carry_their_enclosing_name() {
        let mut builder = CorelibBuilder::new().with_class("Demo", "Outer", &[]);
        let outer = builder.handle("Demo.Outer");
        let object = builder.handle("System.Object");
        builder
            .metadata()
            .define_nested_type(outer, "Inner", TypeAttributes::NESTED_PUBLIC, object)
            .unwrap();
        let (context, _) = builder.build();

        let outer = corelib_type(&context, "Demo", "Outer");
        let inner = outer.get_nested_type("Inner").unwrap().unwrap();
        assert_eq!(inner.full_name().unwrap(), "Demo.Outer+Inner");
        assert_eq!(inner.namespace().unwrap(), "");
        assert_eq!(inner.containing_type().unwrap(), Some(outer.clone()));
        assert_eq!(outer.nested_types().unwrap(), vec![inner.clone()]);
        assert_ne!(inner.hash_code().unwrap(), outer.hash_code().unwrap());
    }

    #[test]
    fn categories() {
        let (context, _) = CorelibBuilder::new()
            .with_enum("Demo", "Color", "Byte")
            .with_struct("Demo", "Pair", &[("a", "Int32")])
            .build();
        let known = |which| context.well_known_type(which).unwrap();

        assert_eq!(known(WellKnownType::Int32).category().unwrap(), TypeCategory::Int32);
        assert_eq!(known(WellKnownType::Object).category().unwrap(), TypeCategory::Class);
        assert_eq!(known(WellKnownType::ValueType).category().unwrap(), TypeCategory::Class);
        assert_eq!(known(WellKnownType::Enum).category().unwrap(), TypeCategory::Class);
        assert_eq!(
            corelib_type(&context, "Demo", "Color").category().unwrap(),
            TypeCategory::Enum
        );
        assert_eq!(
            corelib_type(&context, "Demo", "Pair").category().unwrap(),
            TypeCategory::ValueType
        );
        assert_eq!(
            corelib_type(&context, "System", "IDisposable").category().unwrap(),
            TypeCategory::Interface
        );

        let string = known(WellKnownType::String);
        assert_eq!(
            string.make_array_type(None).unwrap().category().unwrap(),
            TypeCategory::SzArray
        );
        assert_eq!(
            string.make_array_type(Some(2)).unwrap().category().unwrap(),
            TypeCategory::Array
        );
        assert!(string.is_gc_pointer().unwrap());
        assert!(!known(WellKnownType::Int32).is_gc_pointer().unwrap());

        let nullable = known(WellKnownType::Nullable)
            .make_instantiated_type(vec![known(WellKnownType::Int32)])
            .unwrap();
        assert!(nullable.is_nullable().unwrap());
        assert!(nullable.is_value_type().unwrap());
    }

    #[test]
    fn enum_underlying_type() {
        let (context, _) = CorelibBuilder::new()
            .with_enum("Demo", "Color", "Byte")
            .build();
        let color = corelib_type(&context, "Demo", "Color");
        let byte = context.well_known_type(WellKnownType::Byte).unwrap();

        assert_eq!(color.enum_underlying_type().unwrap(), byte);
        assert_eq!(byte.enum_underlying_type().unwrap(), byte);
    }

    #[test]
    fn base_types() {
        let (context, _) = context_with_corelib();
        let known = |which| context.well_known_type(which).unwrap();
        let int32 = known(WellKnownType::Int32);

        assert_eq!(known(WellKnownType::Object).base_type().unwrap(), None);
        assert_eq!(
            int32.make_array_type(None).unwrap().base_type().unwrap(),
            Some(known(WellKnownType::Array))
        );
        assert_eq!(int32.make_pointer_type().unwrap().base_type().unwrap(), None);
        assert_eq!(
            context.canon_type(CanonKind::Normal).base_type().unwrap(),
            Some(known(WellKnownType::Object))
        );
        assert_eq!(
            known(WellKnownType::Nullable)
                .make_instantiated_type(vec![int32])
                .unwrap()
                .base_type()
                .unwrap(),
            Some(known(WellKnownType::ValueType))
        );
    }

    #[test]
    fn generic_definitions_and_variance() {
        let (context, _) = context_with_corelib();
        let nullable = context.well_known_type(WellKnownType::Nullable).unwrap();
        let enumerable = corelib_type(&context, "System", "IEnumerable`1");

        assert!(nullable.is_generic_definition().unwrap());
        assert_eq!(nullable.generic_parameter_count().unwrap(), 1);
        let parameters = nullable.instantiation().unwrap();
        assert_eq!(parameters.len(), 1);
        assert!(parameters[0].is_generic_parameter());
        assert_eq!(parameters[0].name().unwrap(), "T");

        assert!(!nullable.has_generic_variance().unwrap());
        assert!(enumerable.has_generic_variance().unwrap());
        assert_eq!(
            enumerable.generic_parameter_variance().unwrap(),
            vec![Variance::Covariant]
        );

        let int32 = context.well_known_type(WellKnownType::Int32).unwrap();
        let instance = nullable.make_instantiated_type(vec![int32.clone()]).unwrap();
        assert!(!instance.is_generic_definition().unwrap());
        assert!(instance.has_instantiation().unwrap());
        assert_eq!(instance.type_definition(), nullable);
        assert_eq!(instance.instantiation().unwrap(), vec![int32]);
    }

    #[test]
    fn instantiate_signature_replaces_variables() {
        let (context, _) = context_with_corelib();
        let string = context.well_known_type(WellKnownType::String).unwrap();
        let int32 = context.well_known_type(WellKnownType::Int32).unwrap();

        let open = context
            .signature_variable(0, false)
            .make_array_type(None)
            .unwrap();
        assert!(open.contains_generic_variables());

        let closed = open.instantiate_signature(&[string.clone()], &[]).unwrap();
        assert_eq!(closed, string.make_array_type(None).unwrap());
        assert!(!closed.contains_generic_variables());

        let method_variable = context.signature_variable(0, true);
        assert_eq!(
            method_variable.instantiate_signature(&[string.clone()], &[]).unwrap(),
            method_variable
        );
        assert_eq!(
            method_variable.instantiate_signature(&[], &[int32]).unwrap(),
            context.well_known_type(WellKnownType::Int32).unwrap()
        );

        assert!(context
            .signature_variable(2, false)
            .instantiate_signature(&[string], &[])
            .is_err());
    }

    #[test]
    fn owning_modules() {
        let (context, unit) = context_with_corelib();
        let int32 = context.well_known_type(WellKnownType::Int32).unwrap();

        let module = int32.make_array_type(None).unwrap().module().unwrap().unwrap();
        assert!(Arc::ptr_eq(&module, &unit));
        assert!(context.signature_variable(0, false).module().unwrap().is_none());
    }

    #[test]
    fn hash_codes_follow_names() {
        let (context, _) = context_with_corelib();
        let string = context.well_known_type(WellKnownType::String).unwrap();

        assert_eq!(string.hash_code().unwrap(), type_hash("System", "String"));
        assert_ne!(
            string.make_array_type(None).unwrap().hash_code().unwrap(),
            string.make_pointer_type().unwrap().hash_code().unwrap()
        );
        assert_ne!(
            string.make_array_type(Some(2)).unwrap().hash_code().unwrap(),
            string.make_array_type(None).unwrap().hash_code().unwrap()
        );
    }
}
