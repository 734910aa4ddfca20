//! Descriptor computation.
//!
//! [`DescriptorBuilder`] derives every field of an EEType from a [`TypeRc`]: header flags, base
//! and component sizes, optional fields, the GC layout and the entities the record points at.
//! The result is a [`TypeShape`], which still names its relatives as type-system entities; the
//! [`crate::runtime::emitter::TypeImageBuilder`] turns shapes into records once every relative
//! has an address.

use tracing::trace;

use crate::{
    config::{TargetArchitecture, TypeSystemConfig},
    metadata::{
        attributes::{TypeAttributes, Variance},
        typesystem::{MethodRc, TypeCategory, TypeRc, TypeSystemContext, WellKnownType},
    },
    runtime::{
        dispatchmap::DispatchMap,
        eetype::GenericVariance,
        flags::{EETypeFlags, EETypeKind, RareFlags, COR_ELEMENT_TYPE},
        gcdesc::GcLayout,
        optionalfields::{OptionalFieldTag, OptionalFieldsBuilder},
        padding::ValueTypePadding,
    },
    utils::{align_up, to_u16},
    Error, Result,
};

/// Name of the field of `Nullable<T>` that holds the value
const NULLABLE_VALUE_FIELD: &str = "value";
/// Methods of the ICastable interface, in the order of their optional fields
const ICASTABLE_METHODS: [(&str, OptionalFieldTag); 2] = [
    ("IsInstanceOfInterface", OptionalFieldTag::ICastableIsInstSlot),
    ("GetImplType", OptionalFieldTag::ICastableGetImplTypeSlot),
];
/// Largest homogeneous float aggregate, in elements
const MAX_HFA_ELEMENTS: u32 = 4;

/// Everything an EEType needs, with references still expressed as entities
#[derive(Debug, Clone)]
pub struct TypeShape {
    /// The described type
    pub ty: TypeRc,
    /// See [`DescriptorBuilder::component_size`]
    pub component_size: u16,
    /// Header flags, without the indirection bits
    pub flags: EETypeFlags,
    /// See [`DescriptorBuilder::compute_base_size`]
    pub base_size: u32,
    /// Name based hash
    pub hash_code: u32,
    /// Base type of a canonical type, element of a parameterized one
    pub related_type: Option<TypeRc>,
    /// Implementation of each vtable slot; `None` for abstract slots
    pub vtable: Vec<Option<MethodRc>>,
    /// Interface map
    pub interfaces: Vec<TypeRc>,
    /// `Finalize` override
    pub finalizer: Option<MethodRc>,
    /// Generic definition of an instantiated type
    pub generic_definition: Option<TypeRc>,
    /// Type arguments of an instantiated type
    pub generic_arguments: Vec<TypeRc>,
    /// Variance of each generic parameter of the definition
    pub generic_variance: Vec<GenericVariance>,
    /// `T` of `Nullable<T>`
    pub nullable_type: Option<TypeRc>,
    /// Optional fields, the dispatch map index excluded
    pub optional_fields: OptionalFieldsBuilder,
    /// Interface dispatch entries
    pub dispatch_map: DispatchMap,
    /// Shape of the instance GC descriptor; `None` for pointer-free types
    pub gc_layout: Option<GcLayout>,
}

impl TypeShape {
    /// Every entity the record refers to, in no particular order
    #[must_use]
    pub fn referenced_types(&self) -> Vec<TypeRc> {
        let mut referenced = Vec::new();
        referenced.extend(self.related_type.iter().cloned());
        referenced.extend(self.interfaces.iter().cloned());
        referenced.extend(self.generic_definition.iter().cloned());
        referenced.extend(self.generic_arguments.iter().cloned());
        referenced.extend(self.nullable_type.iter().cloned());
        referenced
    }

    /// Header flags once the optional fields are known
    #[must_use]
    pub fn header_flags(&self, has_optional_fields: bool) -> EETypeFlags {
        if has_optional_fields {
            self.flags | EETypeFlags::OPTIONAL_FIELDS
        } else {
            self.flags
        }
    }
}

/// Computes EEType fields for one target
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    config: TypeSystemConfig,
}

impl DescriptorBuilder {
    /// Builder for the target of `config`
    #[must_use]
    pub fn new(config: TypeSystemConfig) -> Self {
        DescriptorBuilder { config }
    }

    /// Builder for the target the context lays types out for
    #[must_use]
    pub fn for_context(context: &TypeSystemContext) -> Self {
        Self::new(context.config().clone())
    }

    fn pointer_size(&self) -> u32 {
        self.config.pointer_size()
    }

    /// Fails for types that never get an EEType of their own
    fn check_describable(ty: &TypeRc) -> Result<()> {
        let describable = match ty.category()? {
            TypeCategory::FunctionPointer
            | TypeCategory::GenericParameter
            | TypeCategory::SignatureTypeVariable
            | TypeCategory::SignatureMethodVariable => false,
            _ => !ty.is_canon() && !ty.contains_generic_variables(),
        };
        if describable {
            Ok(())
        } else {
            Err(malformed_error!("Type {} has no EEType", ty))
        }
    }

    /// Array element size, 2 for `System.String`, generic arity for generic definitions
    ///
    /// # Errors
    /// Returns an error if the element layout cannot be computed, or if the value does not fit
    /// in 16 bits.
    pub fn component_size(&self, ty: &TypeRc) -> Result<u16> {
        if let Some(element) = ty.element_type().filter(|_| ty.is_array()) {
            return to_u16(self.element_size(element)? as usize);
        }
        if ty.is_well_known(WellKnownType::String)? {
            return Ok(2);
        }
        if ty.is_generic_definition()? {
            return to_u16(ty.generic_parameter_count()?);
        }
        Ok(0)
    }

    fn element_size(&self, element: &TypeRc) -> Result<u32> {
        let pointer_size = self.pointer_size();
        match element.category()? {
            category if category.is_primitive() => {
                Ok(category.primitive_size(pointer_size).unwrap_or(pointer_size))
            }
            TypeCategory::Enum | TypeCategory::ValueType | TypeCategory::Nullable => {
                Ok(element.instance_layout()?.byte_count)
            }
            _ => Ok(pointer_size),
        }
    }

    /// Allocation size of an instance, or the shape marker of a parameterized type
    ///
    /// # Errors
    /// Returns an error if the instance layout cannot be computed.
    pub fn compute_base_size(&self, ty: &TypeRc) -> Result<u32> {
        let pointer_size = self.pointer_size();
        match ty.category()? {
            TypeCategory::Pointer => return Ok(0),
            TypeCategory::ByRef => return Ok(1),
            TypeCategory::SzArray => return Ok(3 * pointer_size),
            TypeCategory::Array => {
                let rank = ty.rank().unwrap_or(1);
                return Ok(3 * pointer_size + 2 * 4 * rank);
            }
            _ => {}
        }

        if ty.is_generic_definition()? {
            return Ok(0);
        }
        if ty.is_well_known(WellKnownType::String)? {
            // Sync block, EEType, length and the terminating character
            return Ok(2 * pointer_size + 4 + 2);
        }

        let layout = ty.instance_layout()?;
        if ty.is_value_type()? {
            // Sync block and EEType ahead of the unboxed value
            return Ok(align_up(2 * pointer_size + layout.byte_count, pointer_size));
        }

        // Class field offsets already start after the EEType pointer
        let size = align_up(pointer_size + layout.byte_count, pointer_size);
        Ok(size.max(self.config.target.minimum_object_size()))
    }

    /// Shape of the instance GC descriptor, `None` if instances hold no references
    ///
    /// # Errors
    /// Returns an error if a layout cannot be computed.
    pub fn gc_layout(&self, ty: &TypeRc) -> Result<Option<GcLayout>> {
        if let Some(element) = ty.element_type().filter(|_| ty.is_array()) {
            if element.is_gc_pointer()? {
                return Ok(Some(GcLayout::ReferenceArray {
                    base_size: self.compute_base_size(ty)?,
                }));
            }
            if matches!(
                element.category()?,
                TypeCategory::ValueType | TypeCategory::Nullable
            ) {
                let layout = element.instance_layout()?;
                if layout.contains_gc_pointers() {
                    return Ok(Some(GcLayout::StructArray {
                        element_map: layout.gc_map.clone(),
                        rank: ty.is_md_array().then(|| ty.rank().unwrap_or(1)),
                    }));
                }
            }
            return Ok(None);
        }

        match ty.category()? {
            TypeCategory::Class | TypeCategory::ValueType | TypeCategory::Nullable => {}
            _ => return Ok(None),
        }
        if ty.is_generic_definition()? || ty.is_well_known(WellKnownType::String)? {
            return Ok(None);
        }

        let layout = ty.instance_layout()?;
        if !layout.contains_gc_pointers() {
            return Ok(None);
        }

        trace!(type_name = %ty, series = layout.gc_map.num_series(), "computed GC layout");
        Ok(Some(GcLayout::Object {
            map: layout.gc_map.clone(),
            base_size: self.compute_base_size(ty)?,
            is_value_type: ty.is_value_type()?,
        }))
    }

    /// Header flags, with the optional-fields bit set if `optional_fields` holds any field
    ///
    /// # Errors
    /// Returns an error if a type fact cannot be computed.
    pub fn compute_flags(
        &self,
        ty: &TypeRc,
        optional_fields: &OptionalFieldsBuilder,
    ) -> Result<EETypeFlags> {
        let category = ty.category()?;
        let kind = if ty.is_parameterized() {
            EETypeKind::Parameterized
        } else if ty.is_generic_definition()? {
            EETypeKind::GenericTypeDefinition
        } else {
            EETypeKind::Canonical
        };

        let mut flags = EETypeFlags::of_kind(kind);
        if category.is_value_type() {
            flags |= EETypeFlags::VALUE_TYPE;
        }
        if category == TypeCategory::Interface {
            flags |= EETypeFlags::IS_INTERFACE;
        }
        if kind != EETypeKind::GenericTypeDefinition {
            if ty.has_finalizer()? {
                flags |= EETypeFlags::HAS_FINALIZER;
            }
            if self.gc_layout(ty)?.is_some() {
                flags |= EETypeFlags::HAS_POINTERS;
            }
        }
        if ty.is_instantiated() {
            flags |= EETypeFlags::IS_GENERIC;
            if ty.type_definition().has_generic_variance()? {
                flags |= EETypeFlags::GENERIC_VARIANCE;
            }
        }
        if optional_fields.is_at_least_one_field_used() {
            flags |= EETypeFlags::OPTIONAL_FIELDS;
        }

        Ok(flags.with_element_type(Self::element_type_code(ty)?))
    }

    /// `CorElementType` embedded into the flags: the primitive, the underlying primitive of an
    /// enum, or the array marker on `System.Array`
    fn element_type_code(ty: &TypeRc) -> Result<u8> {
        let category = match ty.category()? {
            TypeCategory::Enum => ty.enum_underlying_type()?.category()?,
            category => category,
        };
        Ok(match category {
            TypeCategory::Boolean => COR_ELEMENT_TYPE::BOOLEAN,
            TypeCategory::Char => COR_ELEMENT_TYPE::CHAR,
            TypeCategory::SByte => COR_ELEMENT_TYPE::I1,
            TypeCategory::Byte => COR_ELEMENT_TYPE::U1,
            TypeCategory::Int16 => COR_ELEMENT_TYPE::I2,
            TypeCategory::UInt16 => COR_ELEMENT_TYPE::U2,
            TypeCategory::Int32 => COR_ELEMENT_TYPE::I4,
            TypeCategory::UInt32 => COR_ELEMENT_TYPE::U4,
            TypeCategory::Int64 => COR_ELEMENT_TYPE::I8,
            TypeCategory::UInt64 => COR_ELEMENT_TYPE::U8,
            TypeCategory::IntPtr => COR_ELEMENT_TYPE::I,
            TypeCategory::UIntPtr => COR_ELEMENT_TYPE::U,
            TypeCategory::Single => COR_ELEMENT_TYPE::R4,
            TypeCategory::Double => COR_ELEMENT_TYPE::R8,
            _ if ty.is_well_known(WellKnownType::Array)? => COR_ELEMENT_TYPE::ARRAY,
            _ => 0,
        })
    }

    /// Rare flags derived from the type; the indirection bits are left to the emitter
    ///
    /// # Errors
    /// Returns an error if a type fact cannot be computed.
    pub fn compute_rare_flags(&self, ty: &TypeRc) -> Result<RareFlags> {
        let mut flags = RareFlags::empty();
        if ty.is_parameterized() || ty.is_generic_definition()? {
            if self.requires_align8(ty)? {
                flags |= RareFlags::REQUIRES_ALIGN8;
            }
            return Ok(flags);
        }

        let category = ty.category()?;
        if category == TypeCategory::Nullable && ty.is_instantiated() {
            flags |= RareFlags::IS_NULLABLE;
        }
        if ty.has_static_constructor()? {
            flags |= RareFlags::HAS_CCTOR;
        }
        if self.requires_align8(ty)? {
            flags |= RareFlags::REQUIRES_ALIGN8;
        }
        if self.is_hfa(ty)? {
            flags |= RareFlags::IS_HFA;
        }
        if self.icastable_interface(ty)?.is_some() {
            flags |= RareFlags::ICASTABLE;
        }
        if category != TypeCategory::Interface
            && ty.attributes()?.contains(TypeAttributes::ABSTRACT)
        {
            flags |= RareFlags::IS_ABSTRACT_CLASS;
        }
        if category.is_value_type() && ty.is_byref_like()? {
            flags |= RareFlags::IS_BYREF_LIKE;
        }
        Ok(flags)
    }

    /// ARM32 needs 8-byte alignment for instances, or array elements, aligned above 4 bytes
    fn requires_align8(&self, ty: &TypeRc) -> Result<bool> {
        if self.config.target.architecture != TargetArchitecture::Arm {
            return Ok(false);
        }

        if let Some(element) = ty.element_type().filter(|_| ty.is_array()) {
            return Ok(element.is_value_type()? && element.instance_layout()?.alignment > 4);
        }
        match ty.category()? {
            TypeCategory::Class
            | TypeCategory::ValueType
            | TypeCategory::Enum
            | TypeCategory::Nullable => Ok(ty.instance_layout()?.alignment > 4),
            category if category.is_primitive() && category != TypeCategory::Void => {
                Ok(ty.instance_layout()?.alignment > 4)
            }
            _ => Ok(false),
        }
    }

    /// A struct of one to four fields of a single floating point type, nested structs flattened
    fn is_hfa(&self, ty: &TypeRc) -> Result<bool> {
        if !self.config.target.is_arm() || ty.category()? != TypeCategory::ValueType {
            return Ok(false);
        }
        Ok(Self::hfa_elements(ty, 0, self.config.max_nesting_depth)?
            .is_some_and(|(_, count)| (1..=MAX_HFA_ELEMENTS).contains(&count)))
    }

    fn hfa_elements(ty: &TypeRc, depth: usize, limit: usize) -> Result<Option<(TypeCategory, u32)>> {
        if depth > limit {
            return Err(Error::RecursionLimit(limit));
        }

        let mut element: Option<TypeCategory> = None;
        let mut count = 0;
        for field in ty.fields()? {
            if field.is_static()? {
                continue;
            }
            let field_type = field.field_type()?;
            let (category, fields) = match field_type.category()? {
                category @ (TypeCategory::Single | TypeCategory::Double) => (category, 1),
                TypeCategory::ValueType => {
                    match Self::hfa_elements(field_type, depth + 1, limit)? {
                        Some(nested) => nested,
                        None => return Ok(None),
                    }
                }
                _ => return Ok(None),
            };
            if element.is_some_and(|existing| existing != category) {
                return Ok(None);
            }
            element = Some(category);
            count += fields;
        }
        Ok(element.map(|category| (category, count)))
    }

    /// The ICastable interface among the runtime interfaces of a non-interface type
    fn icastable_interface(&self, ty: &TypeRc) -> Result<Option<TypeRc>> {
        let Some((namespace, name)) = &self.config.icastable_interface else {
            return Ok(None);
        };
        if ty.is_interface()? {
            return Ok(None);
        }

        for interface in ty.runtime_interfaces()? {
            let definition = interface.type_definition();
            if definition.namespace()? == namespace.as_str() && definition.name()? == name.as_str() {
                return Ok(Some(interface));
            }
        }
        Ok(None)
    }

    /// Optional fields of the type; `dispatch_map_index` is the position of its dispatch map in
    /// the image table, if it has one
    ///
    /// # Errors
    /// Returns [`Error::MissingMember`] if an ICastable method has no implementation, and any
    /// error from computing the type's layout or flags.
    pub fn compute_optional_fields(
        &self,
        ty: &TypeRc,
        dispatch_map_index: Option<u32>,
    ) -> Result<OptionalFieldsBuilder> {
        let mut fields = OptionalFieldsBuilder::new();

        let rare_flags = self.compute_rare_flags(ty)?;
        if !rare_flags.is_empty() {
            fields.set_field(OptionalFieldTag::RareFlags, rare_flags.bits());
        }

        if rare_flags.contains(RareFlags::IS_NULLABLE) {
            let offset = self.nullable_value_offset(ty)?;
            if offset != 0 {
                fields.set_field(OptionalFieldTag::NullableValueOffset, offset);
            }
        }

        if rare_flags.contains(RareFlags::ICASTABLE) {
            self.add_icastable_slots(ty, &mut fields)?;
        }

        if !ty.is_parameterized() && !ty.is_generic_definition()? && ty.is_value_type()? {
            let layout = ty.instance_layout()?;
            let padding = ValueTypePadding::encode(
                layout.byte_count - layout.byte_count_unaligned,
                layout.alignment,
                self.pointer_size(),
            )?;
            if padding != 0 {
                fields.set_field(OptionalFieldTag::ValueTypeFieldPadding, padding);
            }
        }

        if let Some(index) = dispatch_map_index {
            fields.set_field(OptionalFieldTag::DispatchMap, index);
        }

        Ok(fields)
    }

    /// Offset of `Nullable<T>.value`, stored minus one because the flag precedes it
    fn nullable_value_offset(&self, ty: &TypeRc) -> Result<u32> {
        let field = ty
            .get_field(NULLABLE_VALUE_FIELD)?
            .ok_or_else(|| Error::MissingMember {
                owner: ty.display_name(),
                member: NULLABLE_VALUE_FIELD.to_string(),
            })?;
        let offset = field.offset()?;
        offset
            .checked_sub(1)
            .ok_or_else(|| malformed_error!("Value field of {} at offset 0", ty))
    }

    /// Slots of the ICastable implementations the type declares itself; inherited ones are
    /// found through the base type at runtime
    fn add_icastable_slots(&self, ty: &TypeRc, fields: &mut OptionalFieldsBuilder) -> Result<()> {
        let Some(interface) = self.icastable_interface(ty)? else {
            return Ok(());
        };

        for (name, tag) in ICASTABLE_METHODS {
            let method = interface
                .get_method(name, None)?
                .ok_or_else(|| Error::MissingMember {
                    owner: interface.display_name(),
                    member: name.to_string(),
                })?;
            let implementation =
                ty.find_interface_implementation(&method)?
                    .ok_or_else(|| Error::MissingMember {
                        owner: ty.display_name(),
                        member: name.to_string(),
                    })?;
            if *implementation.owner() != *ty {
                continue;
            }

            let slot = ty.vtable_slot_of(&implementation)?.ok_or_else(|| {
                invariant_error!("ICastable method {} has no vtable slot", implementation)
            })?;
            fields.set_field(tag, u32::from(to_u16(slot)?));
        }
        Ok(())
    }

    /// Compute everything the EEType of `ty` holds
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for types that have no EEType (generic parameters, open
    /// instantiations, function pointers, canonical placeholders), and any error of the
    /// individual computations.
    pub fn shape(&self, ty: &TypeRc) -> Result<TypeShape> {
        Self::check_describable(ty)?;

        let is_definition = ty.is_generic_definition()?;
        let optional_fields = self.compute_optional_fields(ty, None)?;
        let dispatch_map = if is_definition || (ty.is_parameterized() && !ty.is_array()) {
            DispatchMap::new()
        } else {
            ty.dispatch_map()?
        };

        let related_type = match ty.element_type() {
            Some(element) => Some(element.clone()),
            None => ty.base_type()?,
        };
        let (vtable, interfaces) = if is_definition || ty.is_pointer() || ty.is_byref() {
            (Vec::new(), Vec::new())
        } else {
            (ty.vtable_implementations()?, ty.runtime_interfaces()?)
        };

        let (generic_definition, generic_arguments, generic_variance) = if ty.is_instantiated() {
            let definition = ty.type_definition();
            let variance = definition
                .generic_parameter_variance()?
                .into_iter()
                .map(|variance| match variance {
                    Variance::None => GenericVariance::None,
                    Variance::Covariant => GenericVariance::Covariant,
                    Variance::Contravariant => GenericVariance::Contravariant,
                })
                .collect();
            (Some(definition), ty.instantiation()?, variance)
        } else {
            (None, Vec::new(), Vec::new())
        };

        let nullable_type = if ty.is_instantiated() && ty.is_nullable()? {
            generic_arguments.first().cloned()
        } else {
            None
        };

        let shape = TypeShape {
            ty: ty.clone(),
            component_size: self.component_size(ty)?,
            // The dispatch map index is assigned by the emitter; the bit is recomputed then
            flags: self.compute_flags(ty, &OptionalFieldsBuilder::new())?,
            base_size: self.compute_base_size(ty)?,
            hash_code: ty.hash_code()?,
            related_type,
            vtable,
            interfaces,
            finalizer: if is_definition { None } else { ty.finalizer()? },
            generic_definition,
            generic_arguments,
            generic_variance,
            nullable_type,
            optional_fields,
            dispatch_map,
            gc_layout: if is_definition { None } else { self.gc_layout(ty)? },
        };
        trace!(
            type_name = %ty,
            base_size = shape.base_size,
            vtable = shape.vtable.len(),
            interfaces = shape.interfaces.len(),
            "shaped type"
        );
        Ok(shape)
    }
}
