//! The type-system context.
//!
//! A [`TypeSystemContext`] owns the metadata units of every loaded module and interns every
//! constructed type and instantiated method, so that structurally equal constructions are the
//! same entity. It is created once per target configuration and shared behind an `Arc`.

use std::{
    fmt,
    hash::Hash,
    sync::{Arc, Weak},
};

use dashmap::{mapref::entry::Entry, DashMap};
use strum::{Display, EnumIter};
use tracing::debug;

use crate::{
    config::TypeSystemConfig,
    metadata::{
        binder::{AssemblyBinder, AssemblyName},
        store::{AssemblyVersion, MetadataStore},
        typesystem::{
            CanonKind, MethodDesc, MethodKind, MethodRc, MethodSignature, TypeCategory, TypeDesc,
            TypeKind, TypeRc,
        },
        unit::MetadataUnit,
    },
    Error, Result,
};

/// Arrays of more dimensions are rejected
const MAX_ARRAY_RANK: u32 = 32;

/// Types the engine needs by name; all live in namespace `System` of the system module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum WellKnownType {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    SByte,
    /// `System.Byte`
    Byte,
    /// `System.Int16`
    Int16,
    /// `System.UInt16`
    UInt16,
    /// `System.Int32`
    Int32,
    /// `System.UInt32`
    UInt32,
    /// `System.Int64`
    Int64,
    /// `System.UInt64`
    UInt64,
    /// `System.IntPtr`
    IntPtr,
    /// `System.UIntPtr`
    UIntPtr,
    /// `System.Single`
    Single,
    /// `System.Double`
    Double,
    /// `System.Object`
    Object,
    /// `System.ValueType`
    ValueType,
    /// `System.Enum`
    Enum,
    /// ``System.Nullable`1``
    Nullable,
    /// `System.String`
    String,
    /// `System.Array`
    Array,
    /// `System.TypedReference`
    TypedReference,
}

impl WellKnownType {
    /// Metadata name inside namespace `System`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            WellKnownType::Void => "Void",
            WellKnownType::Boolean => "Boolean",
            WellKnownType::Char => "Char",
            WellKnownType::SByte => "SByte",
            WellKnownType::Byte => "Byte",
            WellKnownType::Int16 => "Int16",
            WellKnownType::UInt16 => "UInt16",
            WellKnownType::Int32 => "Int32",
            WellKnownType::UInt32 => "UInt32",
            WellKnownType::Int64 => "Int64",
            WellKnownType::UInt64 => "UInt64",
            WellKnownType::IntPtr => "IntPtr",
            WellKnownType::UIntPtr => "UIntPtr",
            WellKnownType::Single => "Single",
            WellKnownType::Double => "Double",
            WellKnownType::Object => "Object",
            WellKnownType::ValueType => "ValueType",
            WellKnownType::Enum => "Enum",
            WellKnownType::Nullable => "Nullable`1",
            WellKnownType::String => "String",
            WellKnownType::Array => "Array",
            WellKnownType::TypedReference => "TypedReference",
        }
    }

    /// Category of the primitive types, `None` for the rest
    #[must_use]
    pub fn primitive_category(self) -> Option<TypeCategory> {
        Some(match self {
            WellKnownType::Void => TypeCategory::Void,
            WellKnownType::Boolean => TypeCategory::Boolean,
            WellKnownType::Char => TypeCategory::Char,
            WellKnownType::SByte => TypeCategory::SByte,
            WellKnownType::Byte => TypeCategory::Byte,
            WellKnownType::Int16 => TypeCategory::Int16,
            WellKnownType::UInt16 => TypeCategory::UInt16,
            WellKnownType::Int32 => TypeCategory::Int32,
            WellKnownType::UInt32 => TypeCategory::UInt32,
            WellKnownType::Int64 => TypeCategory::Int64,
            WellKnownType::UInt64 => TypeCategory::UInt64,
            WellKnownType::IntPtr => TypeCategory::IntPtr,
            WellKnownType::UIntPtr => TypeCategory::UIntPtr,
            WellKnownType::Single => TypeCategory::Single,
            WellKnownType::Double => TypeCategory::Double,
            _ => return None,
        })
    }
}

/// Owner of the metadata units and of every constructed type
pub struct TypeSystemContext {
    config: TypeSystemConfig,
    binder: Arc<dyn AssemblyBinder>,
    this: Weak<TypeSystemContext>,
    units: DashMap<String, Arc<MetadataUnit>>,
    well_known: DashMap<WellKnownType, TypeRc>,
    canon: TypeRc,
    universal_canon: TypeRc,
    arrays: DashMap<(TypeRc, Option<u32>), TypeRc>,
    pointers: DashMap<TypeRc, TypeRc>,
    byrefs: DashMap<TypeRc, TypeRc>,
    instantiations: DashMap<(TypeRc, Vec<TypeRc>), TypeRc>,
    function_pointers: DashMap<MethodSignature, TypeRc>,
    signature_variables: DashMap<(u32, bool), TypeRc>,
    instantiated_methods: DashMap<(MethodRc, Vec<TypeRc>), MethodRc>,
}

impl fmt::Debug for TypeSystemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSystemContext")
            .field("config", &self.config)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}

/// Get-or-create in an interning table. `create` runs outside the shard lock; the first
/// published value wins.
fn intern<K, V, F>(map: &DashMap<K, V>, key: K, create: F) -> V
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce() -> V,
{
    if let Some(existing) = map.get(&key) {
        return existing.value().clone();
    }

    let created = create();
    match map.entry(key) {
        Entry::Occupied(entry) => {
            debug!("lost interning race, discarding duplicate");
            entry.get().clone()
        }
        Entry::Vacant(entry) => entry.insert(created).value().clone(),
    }
}

impl TypeSystemContext {
    /// Creates a context for `config`, binding referenced assemblies through `binder`
    #[must_use]
    pub fn new(config: TypeSystemConfig, binder: Arc<dyn AssemblyBinder>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<TypeSystemContext>| TypeSystemContext {
            config,
            binder,
            this: this.clone(),
            units: DashMap::new(),
            well_known: DashMap::new(),
            canon: TypeRc::new(TypeDesc::new(
                TypeKind::Canon(CanonKind::Normal),
                this.clone(),
            )),
            universal_canon: TypeRc::new(TypeDesc::new(
                TypeKind::Canon(CanonKind::Universal),
                this.clone(),
            )),
            arrays: DashMap::new(),
            pointers: DashMap::new(),
            byrefs: DashMap::new(),
            instantiations: DashMap::new(),
            function_pointers: DashMap::new(),
            signature_variables: DashMap::new(),
            instantiated_methods: DashMap::new(),
        })
    }

    /// The configuration the context was created with
    #[must_use]
    pub fn config(&self) -> &TypeSystemConfig {
        &self.config
    }

    /// Target pointer size in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.config.pointer_size()
    }

    /// Creates the metadata unit of `store`, or returns the existing unit of that assembly name
    ///
    /// # Errors
    /// Returns an error if the store's scope definition cannot be read.
    pub fn add_module(&self, store: Arc<dyn MetadataStore>) -> Result<Arc<MetadataUnit>> {
        let name = AssemblyName::from_scope_definition(store.as_ref())?.name;
        if let Some(existing) = self.units.get(&name) {
            return Ok(existing.value().clone());
        }

        let is_system = name == self.config.system_module;
        let unit = MetadataUnit::new(store, name.clone(), is_system, self.this.clone());
        match self.units.entry(name) {
            Entry::Occupied(entry) => {
                debug!(module = %entry.key(), "module already added, keeping the first unit");
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                debug!(module = %entry.key(), is_system, "created metadata unit");
                Ok(entry.insert(unit).value().clone())
            }
        }
    }

    /// The unit of the assembly `name`, binding it on first use
    ///
    /// # Errors
    /// Returns the binder's error if the assembly cannot be bound.
    pub fn resolve_assembly(&self, name: &AssemblyName) -> Result<Arc<MetadataUnit>> {
        if let Some(existing) = self.units.get(&name.name) {
            return Ok(existing.value().clone());
        }

        debug!(assembly = %name, "binding assembly");
        let bound = self.binder.bind(name)?;
        self.add_module(bound.store)
    }

    /// The unit of the already loaded module `name`
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Arc<MetadataUnit>> {
        self.units.get(name).map(|unit| unit.value().clone())
    }

    /// Every loaded unit, in no particular order
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<MetadataUnit>> {
        self.units.iter().map(|unit| unit.value().clone()).collect()
    }

    /// The unit of the configured system module, binding it on first use
    ///
    /// # Errors
    /// Returns the binder's error if the system module cannot be bound.
    pub fn system_module(&self) -> Result<Arc<MetadataUnit>> {
        if let Some(unit) = self.module(&self.config.system_module) {
            return Ok(unit);
        }
        self.resolve_assembly(&AssemblyName::new(
            self.config.system_module.clone(),
            AssemblyVersion::default(),
        ))
    }

    /// The well-known type `which` from the system module
    ///
    /// # Errors
    /// Returns [`Error::TypeLoad`] if the system module does not define it.
    pub fn well_known_type(&self, which: WellKnownType) -> Result<TypeRc> {
        if let Some(existing) = self.well_known.get(&which) {
            return Ok(existing.value().clone());
        }

        let system = self.system_module()?;
        let ty = system
            .type_by_name("System", which.name())?
            .ok_or_else(|| Error::TypeLoad {
                type_name: format!("System.{}", which.name()),
                module: system.name().to_string(),
            })?;
        Ok(intern(&self.well_known, which, || ty))
    }

    /// `System.__Canon` or `System.__UniversalCanon`
    #[must_use]
    pub fn canon_type(&self, kind: CanonKind) -> TypeRc {
        match kind {
            CanonKind::Normal => self.canon.clone(),
            CanonKind::Universal => self.universal_canon.clone(),
        }
    }

    /// The array of `element`; `None` for a single-dimension zero-based array, `Some(rank)`
    /// for a multi-dimensional one
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a rank of 0 or above 32, or a by-ref element.
    pub fn array_type(&self, element: &TypeRc, rank: Option<u32>) -> Result<TypeRc> {
        if let Some(rank) = rank {
            if rank == 0 || rank > MAX_ARRAY_RANK {
                return Err(malformed_error!("Array rank {} is out of range", rank));
            }
        }
        if element.is_byref() {
            return Err(malformed_error!("Array of by-ref type {}", element));
        }

        Ok(intern(&self.arrays, (element.clone(), rank), || {
            TypeRc::new(TypeDesc::new(
                TypeKind::Array {
                    element: element.clone(),
                    rank,
                },
                self.this.clone(),
            ))
        }))
    }

    /// The unmanaged pointer to `element`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a pointer to a by-ref.
    pub fn pointer_type(&self, element: &TypeRc) -> Result<TypeRc> {
        if element.is_byref() {
            return Err(malformed_error!("Pointer to by-ref type {}", element));
        }

        Ok(intern(&self.pointers, element.clone(), || {
            TypeRc::new(TypeDesc::new(
                TypeKind::Pointer(element.clone()),
                self.this.clone(),
            ))
        }))
    }

    /// The managed reference to `element`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for a by-ref to a by-ref.
    pub fn byref_type(&self, element: &TypeRc) -> Result<TypeRc> {
        if element.is_byref() {
            return Err(malformed_error!("By-ref to by-ref type {}", element));
        }

        Ok(intern(&self.byrefs, element.clone(), || {
            TypeRc::new(TypeDesc::new(TypeKind::ByRef(element.clone()), self.this.clone()))
        }))
    }

    /// The generic definition `definition` instantiated over `arguments`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `definition` is not a generic type definition, or the
    /// argument count does not match its arity.
    pub fn instantiated_type(&self, definition: &TypeRc, arguments: Vec<TypeRc>) -> Result<TypeRc> {
        if !definition.is_generic_definition()? {
            return Err(malformed_error!(
                "Type {} is not a generic type definition",
                definition
            ));
        }
        let arity = definition.generic_parameter_count()?;
        if arity != arguments.len() {
            return Err(malformed_error!(
                "Type {} takes {} type arguments, {} given",
                definition,
                arity,
                arguments.len()
            ));
        }

        Ok(intern(
            &self.instantiations,
            (definition.clone(), arguments.clone()),
            || {
                TypeRc::new(TypeDesc::new(
                    TypeKind::Instantiated {
                        definition: definition.clone(),
                        arguments,
                    },
                    self.this.clone(),
                ))
            },
        ))
    }

    /// The function pointer type of `signature`
    #[must_use]
    pub fn function_pointer_type(&self, signature: MethodSignature) -> TypeRc {
        intern(&self.function_pointers, signature.clone(), || {
            TypeRc::new(TypeDesc::new(
                TypeKind::FunctionPointer(signature),
                self.this.clone(),
            ))
        })
    }

    /// `!index`, or `!!index` when `method` is set
    #[must_use]
    pub fn signature_variable(&self, index: u32, method: bool) -> TypeRc {
        intern(&self.signature_variables, (index, method), || {
            TypeRc::new(TypeDesc::new(
                TypeKind::SignatureVariable { index, method },
                self.this.clone(),
            ))
        })
    }

    /// The generic method `method` instantiated over `arguments`
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if `method` is not an uninstantiated generic method, or the
    /// argument count does not match its arity.
    pub fn instantiated_method(
        &self,
        method: &MethodRc,
        arguments: Vec<TypeRc>,
    ) -> Result<MethodRc> {
        if !method.is_generic_method_definition()? {
            return Err(malformed_error!(
                "Method {} is not a generic method definition",
                method
            ));
        }
        let arity = method.generic_parameter_count()?;
        if arity != arguments.len() {
            return Err(malformed_error!(
                "Method {} takes {} type arguments, {} given",
                method,
                arity,
                arguments.len()
            ));
        }

        Ok(intern(
            &self.instantiated_methods,
            (method.clone(), arguments.clone()),
            || {
                MethodRc::new(MethodDesc::new(
                    MethodKind::Instantiated {
                        generic: method.clone(),
                        arguments,
                    },
                    method.owner().clone(),
                ))
            },
        ))
    }
}
