use std::sync::{Arc, OnceLock, Weak};

use crate::{
    metadata::{
        attributes::{MethodAttributes, MethodImplAttributes},
        handle::Handle,
        typesystem::{
            flags::{FlagCache, MethodFlags},
            lazy_init, MethodRc, MethodSignature, TypeRc,
        },
        unit::{upgrade_unit, MetadataUnit},
    },
    Result,
};

/// What a [`MethodDesc`] is
#[derive(Debug)]
pub enum MethodKind {
    /// A method definition in the metadata of `unit`
    Metadata {
        /// Owning unit
        unit: Weak<MetadataUnit>,
        /// Method handle
        handle: Handle,
    },
    /// A method definition seen through an instantiation of its owning type
    OnInstantiatedType {
        /// The method on the generic type definition
        typical: MethodRc,
    },
    /// A generic method instantiated over method type arguments
    Instantiated {
        /// The generic method definition, possibly on an instantiated type
        generic: MethodRc,
        /// Method type arguments
        arguments: Vec<TypeRc>,
    },
}

/// A method of the type system.
///
/// Always handled through a [`MethodRc`]. Every kind leads back to one method definition, which
/// supplies the name and the attribute flags; the signature is instantiated per kind.
pub struct MethodDesc {
    kind: MethodKind,
    owner: TypeRc,
    flags: FlagCache,
    name: OnceLock<String>,
    signature: OnceLock<MethodSignature>,
    generic_parameters: OnceLock<Vec<TypeRc>>,
}

impl MethodDesc {
    pub(crate) fn new(kind: MethodKind, owner: TypeRc) -> Self {
        MethodDesc {
            kind,
            owner,
            flags: FlagCache::default(),
            name: OnceLock::new(),
            signature: OnceLock::new(),
            generic_parameters: OnceLock::new(),
        }
    }

    /// What this method is
    #[must_use]
    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    /// The type the method is a member of
    #[must_use]
    pub fn owner(&self) -> &TypeRc {
        &self.owner
    }

    /// Unit and handle of the underlying method definition
    pub(crate) fn definition(&self) -> Result<(Arc<MetadataUnit>, Handle)> {
        match &self.kind {
            MethodKind::Metadata { unit, handle } => Ok((upgrade_unit(unit)?, *handle)),
            MethodKind::OnInstantiatedType { typical } => typical.definition(),
            MethodKind::Instantiated { generic, .. } => generic.definition(),
        }
    }

    /// Handle of the underlying method definition
    ///
    /// # Errors
    /// Returns [`crate::Error::UnitUnavailable`] if the owning unit is gone.
    pub fn handle(&self) -> Result<Handle> {
        Ok(self.definition()?.1)
    }

    /// Method name
    ///
    /// # Errors
    /// Returns an error if the name cannot be read from the metadata.
    pub fn name(&self) -> Result<&str> {
        match &self.kind {
            MethodKind::Metadata { unit, handle } => lazy_init(&self.name, || {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().method(*handle)?;
                Ok(unit.store().string(record.name)?.to_string())
            })
            .map(String::as_str),
            MethodKind::OnInstantiatedType { typical } => typical.name(),
            MethodKind::Instantiated { generic, .. } => generic.name(),
        }
    }

    /// The signature, with the owner's and the method's instantiation substituted
    ///
    /// # Errors
    /// Returns an error if the signature blob cannot be parsed or resolved.
    pub fn signature(&self) -> Result<&MethodSignature> {
        lazy_init(&self.signature, || match &self.kind {
            MethodKind::Metadata { unit, handle } => {
                upgrade_unit(unit)?.method_definition_signature(*handle)
            }
            MethodKind::OnInstantiatedType { typical } => typical
                .signature()?
                .instantiate(&self.owner.instantiation()?, &[]),
            MethodKind::Instantiated { generic, arguments } => {
                generic.signature()?.instantiate(&[], arguments)
            }
        })
    }

    /// Number of generic parameters of the method definition
    ///
    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn generic_parameter_count(&self) -> Result<usize> {
        let (unit, handle) = self.definition()?;
        Ok(unit.store().method(handle)?.generic_parameters.len())
    }

    /// Returns true for instantiated generic methods
    #[must_use]
    pub fn is_instantiated(&self) -> bool {
        matches!(self.kind, MethodKind::Instantiated { .. })
    }

    /// Returns true for an uninstantiated generic method
    ///
    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_generic_method_definition(&self) -> Result<bool> {
        Ok(!self.is_instantiated() && self.generic_parameter_count()? > 0)
    }

    /// Method type arguments of an instantiated method, or the generic parameters of a
    /// definition
    ///
    /// # Errors
    /// Returns an error if a generic parameter cannot be resolved.
    pub fn instantiation(&self) -> Result<Vec<TypeRc>> {
        match &self.kind {
            MethodKind::Instantiated { arguments, .. } => Ok(arguments.clone()),
            MethodKind::OnInstantiatedType { typical } => typical.instantiation(),
            MethodKind::Metadata { unit, handle } => lazy_init(&self.generic_parameters, || {
                let unit = upgrade_unit(unit)?;
                unit.store()
                    .method(*handle)?
                    .generic_parameters
                    .iter()
                    .map(|parameter| unit.resolve_type(*parameter))
                    .collect()
            })
            .cloned(),
        }
    }

    fn basic_flags(&self) -> Result<MethodFlags> {
        let word = self
            .flags
            .get_or_compute(MethodFlags::BASIC_METADATA_CACHE.bits(), || {
                let (unit, handle) = self.definition()?;
                let record = unit.store().method(handle)?;

                let mut flags = MethodFlags::empty();
                for (attribute, flag) in [
                    (MethodAttributes::VIRTUAL, MethodFlags::VIRTUAL),
                    (MethodAttributes::NEW_SLOT, MethodFlags::NEW_SLOT),
                    (MethodAttributes::ABSTRACT, MethodFlags::ABSTRACT),
                    (MethodAttributes::FINAL, MethodFlags::FINAL),
                    (MethodAttributes::STATIC, MethodFlags::STATIC),
                    (MethodAttributes::SPECIAL_NAME, MethodFlags::SPECIAL_NAME),
                ] {
                    if record.flags.contains(attribute) {
                        flags |= flag;
                    }
                }
                for (attribute, flag) in [
                    (MethodImplAttributes::NO_INLINING, MethodFlags::NO_INLINING),
                    (
                        MethodImplAttributes::AGGRESSIVE_INLINING,
                        MethodFlags::AGGRESSIVE_INLINING,
                    ),
                    (MethodImplAttributes::INTERNAL_CALL, MethodFlags::INTERNAL_CALL),
                    (MethodImplAttributes::SYNCHRONIZED, MethodFlags::SYNCHRONIZED),
                ] {
                    if record.impl_flags.contains(attribute) {
                        flags |= flag;
                    }
                }
                if record.impl_flags.is_runtime() {
                    flags |= MethodFlags::RUNTIME_IMPLEMENTED;
                }
                Ok(flags.bits())
            })?;
        Ok(MethodFlags::from_bits_retain(word))
    }

    fn attribute_flags(&self) -> Result<MethodFlags> {
        let word = self
            .flags
            .get_or_compute(MethodFlags::ATTRIBUTE_METADATA_CACHE.bits(), || {
                let (unit, handle) = self.definition()?;
                let attributes = &unit.store().method(handle)?.custom_attributes;

                let mut flags = MethodFlags::empty();
                if unit.has_custom_attribute(
                    attributes,
                    "System.Runtime.CompilerServices",
                    "IntrinsicAttribute",
                )? {
                    flags |= MethodFlags::INTRINSIC;
                }
                if unit.has_custom_attribute(
                    attributes,
                    "System.Runtime.InteropServices",
                    "UnmanagedCallersOnlyAttribute",
                )? {
                    flags |= MethodFlags::UNMANAGED_CALLERS_ONLY;
                }
                if unit.has_custom_attribute(attributes, "System.Runtime", "RuntimeExportAttribute")?
                {
                    flags |= MethodFlags::RUNTIME_EXPORT;
                }
                Ok(flags.bits())
            })?;
        Ok(MethodFlags::from_bits_retain(word))
    }

    /// Metadata derived flags, with the custom-attribute flags included
    ///
    /// # Errors
    /// Returns an error if the method record or its custom attributes cannot be read.
    pub fn flags(&self) -> Result<MethodFlags> {
        Ok(self.basic_flags()? | self.attribute_flags()?)
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_virtual(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::VIRTUAL))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_new_slot(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::NEW_SLOT))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_abstract(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::ABSTRACT))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_final(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::FINAL))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_static(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::STATIC))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_special_name(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::SPECIAL_NAME))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_no_inlining(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::NO_INLINING))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_aggressive_inlining(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::AGGRESSIVE_INLINING))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_runtime_implemented(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::RUNTIME_IMPLEMENTED))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_internal_call(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::INTERNAL_CALL))
    }

    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_synchronized(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::SYNCHRONIZED))
    }

    /// # Errors
    /// Returns an error if the custom attributes cannot be read.
    pub fn is_intrinsic(&self) -> Result<bool> {
        Ok(self.attribute_flags()?.contains(MethodFlags::INTRINSIC))
    }

    /// # Errors
    /// Returns an error if the custom attributes cannot be read.
    pub fn is_unmanaged_callers_only(&self) -> Result<bool> {
        Ok(self
            .attribute_flags()?
            .contains(MethodFlags::UNMANAGED_CALLERS_ONLY))
    }

    /// # Errors
    /// Returns an error if the custom attributes cannot be read.
    pub fn is_runtime_export(&self) -> Result<bool> {
        Ok(self.attribute_flags()?.contains(MethodFlags::RUNTIME_EXPORT))
    }

    /// An instance constructor: `.ctor`, special name, not static
    ///
    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_constructor(&self) -> Result<bool> {
        let flags = self.basic_flags()?;
        Ok(flags.contains(MethodFlags::SPECIAL_NAME)
            && !flags.contains(MethodFlags::STATIC)
            && self.name()? == ".ctor")
    }

    /// A type initializer: `.cctor`, static
    ///
    /// # Errors
    /// Returns an error if the method record cannot be read.
    pub fn is_static_constructor(&self) -> Result<bool> {
        Ok(self.basic_flags()?.contains(MethodFlags::STATIC) && self.name()? == ".cctor")
    }

    /// `Owner.Name` for diagnostics; never fails
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.name() {
            Ok(name) => format!("{}.{}", self.owner, name),
            Err(_) => format!("{}.<unavailable>", self.owner),
        }
    }
}

impl MethodRc {
    /// The method definition on the generic type definition
    #[must_use]
    pub fn typical_method(&self) -> MethodRc {
        match self.kind() {
            MethodKind::Metadata { .. } => self.clone(),
            MethodKind::OnInstantiatedType { typical } => typical.clone(),
            MethodKind::Instantiated { generic, .. } => generic.typical_method(),
        }
    }

    /// The method with its own instantiation removed; its owner keeps its instantiation
    #[must_use]
    pub fn method_definition(&self) -> MethodRc {
        match self.kind() {
            MethodKind::Instantiated { generic, .. } => generic.clone(),
            _ => self.clone(),
        }
    }

    /// Instantiate this generic method over `arguments`
    ///
    /// # Errors
    /// See [`crate::metadata::typesystem::TypeSystemContext::instantiated_method`].
    pub fn make_instantiated_method(&self, arguments: Vec<TypeRc>) -> Result<MethodRc> {
        self.owner().context()?.instantiated_method(self, arguments)
    }
}
