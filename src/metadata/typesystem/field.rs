use std::sync::{Arc, OnceLock, Weak};

use crate::{
    metadata::{
        attributes::FieldAttributes,
        handle::Handle,
        typesystem::{lazy_init, FieldRc, TypeRc},
        unit::{upgrade_unit, MetadataUnit},
    },
    Result,
};

/// What a [`FieldDesc`] is
#[derive(Debug)]
pub enum FieldKind {
    /// A field definition in the metadata of `unit`
    Metadata {
        /// Owning unit
        unit: Weak<MetadataUnit>,
        /// Field handle
        handle: Handle,
    },
    /// A field definition seen through an instantiation of its owning type
    OnInstantiatedType {
        /// The field on the generic type definition
        typical: FieldRc,
    },
}

/// A field of the type system, always handled through a [`FieldRc`]
pub struct FieldDesc {
    kind: FieldKind,
    owner: TypeRc,
    name: OnceLock<String>,
    field_type: OnceLock<TypeRc>,
}

impl FieldDesc {
    pub(crate) fn new(kind: FieldKind, owner: TypeRc) -> Self {
        FieldDesc {
            kind,
            owner,
            name: OnceLock::new(),
            field_type: OnceLock::new(),
        }
    }

    /// What this field is
    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The type the field is a member of
    #[must_use]
    pub fn owner(&self) -> &TypeRc {
        &self.owner
    }

    pub(crate) fn definition(&self) -> Result<(Arc<MetadataUnit>, Handle)> {
        match &self.kind {
            FieldKind::Metadata { unit, handle } => Ok((upgrade_unit(unit)?, *handle)),
            FieldKind::OnInstantiatedType { typical } => typical.definition(),
        }
    }

    /// Handle of the underlying field definition
    ///
    /// # Errors
    /// Returns [`crate::Error::UnitUnavailable`] if the owning unit is gone.
    pub fn handle(&self) -> Result<Handle> {
        Ok(self.definition()?.1)
    }

    /// Field name
    ///
    /// # Errors
    /// Returns an error if the name cannot be read from the metadata.
    pub fn name(&self) -> Result<&str> {
        match &self.kind {
            FieldKind::Metadata { unit, handle } => lazy_init(&self.name, || {
                let unit = upgrade_unit(unit)?;
                let record = unit.store().field(*handle)?;
                Ok(unit.store().string(record.name)?.to_string())
            })
            .map(String::as_str),
            FieldKind::OnInstantiatedType { typical } => typical.name(),
        }
    }

    /// Type of the field, instantiated over the owner's type arguments
    ///
    /// # Errors
    /// Returns an error if the field signature cannot be parsed or resolved.
    pub fn field_type(&self) -> Result<&TypeRc> {
        lazy_init(&self.field_type, || match &self.kind {
            FieldKind::Metadata { unit, handle } => upgrade_unit(unit)?.field_definition_type(*handle),
            FieldKind::OnInstantiatedType { typical } => typical
                .field_type()?
                .instantiate_signature(&self.owner.instantiation()?, &[]),
        })
    }

    /// Metadata attributes of the field definition
    ///
    /// # Errors
    /// Returns an error if the field record cannot be read.
    pub fn attributes(&self) -> Result<FieldAttributes> {
        let (unit, handle) = self.definition()?;
        Ok(unit.store().field(handle)?.flags)
    }

    /// # Errors
    /// Returns an error if the field record cannot be read.
    pub fn is_static(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(FieldAttributes::STATIC))
    }

    /// A compile-time constant; occupies no storage
    ///
    /// # Errors
    /// Returns an error if the field record cannot be read.
    pub fn is_literal(&self) -> Result<bool> {
        Ok(self.attributes()?.contains(FieldAttributes::LITERAL))
    }

    /// Offset declared by an explicit layout
    ///
    /// # Errors
    /// Returns an error if the field record cannot be read.
    pub fn explicit_offset(&self) -> Result<Option<u32>> {
        let (unit, handle) = self.definition()?;
        Ok(unit.store().field(handle)?.offset)
    }

    /// `Owner.Name` for diagnostics; never fails
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.name() {
            Ok(name) => format!("{}::{}", self.owner, name),
            Err(_) => format!("{}::<unavailable>", self.owner),
        }
    }
}

impl FieldRc {
    /// The field definition on the generic type definition
    #[must_use]
    pub fn typical_field(&self) -> FieldRc {
        match self.kind() {
            FieldKind::Metadata { .. } => self.clone(),
            FieldKind::OnInstantiatedType { typical } => typical.clone(),
        }
    }

    /// Byte offset of the field.
    ///
    /// Instance fields of classes are measured from the EEType pointer, instance fields of
    /// value types from their first byte, statics from the start of the owner's static block.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for literal fields, or any layout error of the owner.
    pub fn offset(&self) -> Result<u32> {
        let handle = self.handle()?;
        let offset = if self.is_static()? {
            self.owner().static_layout()?.field_offset(handle)
        } else {
            self.owner().instance_layout()?.field_offset(handle)
        };
        offset.ok_or_else(|| malformed_error!("Field {} occupies no storage", self))
    }
}
