//! EEType records: the writer model and the image reader.
//!
//! [`EEType`] is the fully resolved, in-memory form of a descriptor, with every trailing section
//! held as an `Option`. [`EEType::write_to`] serializes it into a [`TypeImage`] at the offsets
//! [`EETypeLayout`] dictates and refuses to write a record whose populated sections disagree with
//! its flags. [`EETypeView`] reads a record back from an image by replaying the same layout.
//!
//! References to other EETypes are [`EETypeRef`]s. A `Direct` reference is the target address;
//! an `Indirect` one is the address of an indirection cell holding the target, used when the
//! target lives in another module. Where the format has a flag for the distinction (related type,
//! nullable type) the flag is used; interface map entries and generic composition arguments
//! instead tag the pointer's low bit.

use strum::{Display, FromRepr};

use crate::{
    runtime::{
        dispatchmap::DispatchMap,
        flags::{EETypeFlags, EETypeKind, RareFlags},
        gcdesc::GcDescriptor,
        image::{Address, TypeImage},
        layout::{
            offset_hash_code, offset_num_interfaces, offset_num_vtable_slots, EETypeField,
            EETypeLayout, OFFSET_BASE_SIZE, OFFSET_COMPONENT_SIZE, OFFSET_FLAGS,
            OFFSET_RELATED_TYPE,
        },
        optionalfields::{get_optional_field, OptionalFieldTag},
        padding::ValueTypePadding,
    },
    utils::to_u16,
    Error, Result,
};

/// Low pointer bit marking an indirection cell in tagged pointer tables
pub const INDIRECTION_TAG: u64 = 0x1;

/// Optional-field value meaning "no ICastable slot on this type"
const NO_ICASTABLE_SLOT: u32 = 0xFFFF;

/// A reference from one EEType to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EETypeRef {
    /// Address of the target EEType
    Direct(Address),
    /// Address of an indirection cell holding the target EEType address
    Indirect(Address),
}

impl EETypeRef {
    /// Returns true for [`EETypeRef::Indirect`]
    #[must_use]
    pub fn is_indirect(self) -> bool {
        matches!(self, EETypeRef::Indirect(_))
    }

    /// The stored address: the target, or the indirection cell
    #[must_use]
    pub fn raw(self) -> Address {
        match self {
            EETypeRef::Direct(address) | EETypeRef::Indirect(address) => address,
        }
    }

    /// Follow the reference to the target EEType
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if an indirection cell lies outside `image`.
    pub fn resolve(self, image: &TypeImage) -> Result<Address> {
        match self {
            EETypeRef::Direct(address) => Ok(address),
            EETypeRef::Indirect(cell) => image.read_pointer(cell),
        }
    }

    /// Encode with the low-bit indirection tag
    #[must_use]
    pub fn to_tagged(self) -> Address {
        match self {
            EETypeRef::Direct(address) => address,
            EETypeRef::Indirect(cell) => Address(cell.0 | INDIRECTION_TAG),
        }
    }

    /// Decode a low-bit tagged pointer
    #[must_use]
    pub fn from_tagged(tagged: Address) -> Self {
        if tagged.0 & INDIRECTION_TAG != 0 {
            EETypeRef::Indirect(Address(tagged.0 & !INDIRECTION_TAG))
        } else {
            EETypeRef::Direct(tagged)
        }
    }
}

/// Variance of a generic parameter, as stored in a generic composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromRepr)]
#[repr(u8)]
pub enum GenericVariance {
    /// Invariant
    #[default]
    None = 0,
    /// `out T`
    Covariant = 1,
    /// `in T`
    Contravariant = 2,
}

/// Generic arguments of an instantiated type, with the variance of each parameter.
///
/// Encoded as a `u32` arity padded to a pointer, `arity` tagged argument pointers and `arity`
/// variance bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GenericComposition {
    /// Type arguments
    pub arguments: Vec<EETypeRef>,
    /// Variance of each parameter of the definition
    pub variance: Vec<GenericVariance>,
}

impl GenericComposition {
    /// Returns true if any parameter is co- or contravariant
    #[must_use]
    pub fn has_variance(&self) -> bool {
        self.variance
            .iter()
            .any(|variance| *variance != GenericVariance::None)
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_size(&self, pointer_size: u32) -> u32 {
        let arity = self.arguments.len() as u32;
        pointer_size + arity * pointer_size + arity
    }

    /// Serialize into the image format.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if there is not one variance per argument.
    pub fn encode(&self, pointer_size: u32) -> Result<Vec<u8>> {
        if self.arguments.len() != self.variance.len() {
            return Err(invariant_error!(
                "Generic composition with {} arguments but {} variances",
                self.arguments.len(),
                self.variance.len()
            ));
        }

        let mut out = Vec::with_capacity(self.encoded_size(pointer_size) as usize);
        push_pointer(&mut out, Address(self.arguments.len() as u64), pointer_size);
        for argument in &self.arguments {
            push_pointer(&mut out, argument.to_tagged(), pointer_size);
        }
        out.extend(self.variance.iter().map(|variance| *variance as u8));
        Ok(out)
    }

    /// Read a composition from `image`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a truncated composition and
    /// [`crate::Error::Malformed`] for an unknown variance.
    pub fn read(image: &TypeImage, address: Address) -> Result<Self> {
        let pointer_size = image.pointer_size();
        let arity = image.read_u32(address)?;
        let mut cursor = address.offset(pointer_size);

        let mut arguments = Vec::new();
        for _ in 0..arity {
            arguments.push(EETypeRef::from_tagged(image.read_pointer(cursor)?));
            cursor = cursor.offset(pointer_size);
        }

        let mut variance = Vec::with_capacity(arguments.len());
        for _ in 0..arity {
            let byte = image.read_u8(cursor)?;
            variance.push(
                GenericVariance::from_repr(byte)
                    .ok_or_else(|| malformed_error!("Unknown generic variance - {}", byte))?,
            );
            cursor = cursor.offset(1);
        }

        Ok(GenericComposition {
            arguments,
            variance,
        })
    }
}

/// Serialize a sealed virtual slot table: a `u32` count padded to a pointer, then the slots
#[must_use]
pub fn encode_sealed_slots(slots: &[Address], pointer_size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity((slots.len() + 1) * pointer_size as usize);
    push_pointer(&mut out, Address(slots.len() as u64), pointer_size);
    for slot in slots {
        push_pointer(&mut out, *slot, pointer_size);
    }
    out
}

fn push_pointer(out: &mut Vec<u8>, value: Address, pointer_size: u32) {
    if pointer_size == 8 {
        out.extend_from_slice(&value.0.to_le_bytes());
    } else {
        out.extend_from_slice(&(value.0 as u32).to_le_bytes());
    }
}

/// A fully resolved EEType, ready to be written into an image
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EEType {
    /// Array element size, string character size, or generic arity of a definition
    pub component_size: u16,
    /// Header flags; the related-type indirection bit is derived from `related_type`
    pub flags: EETypeFlags,
    /// Allocation size, or the shape discriminator of a parameterized type
    pub base_size: u32,
    /// Base type, canonical type or element type, depending on the kind
    pub related_type: Option<EETypeRef>,
    /// Name based hash code
    pub hash_code: u32,
    /// Vtable slot targets; null for abstract slots
    pub vtable: Vec<Address>,
    /// Interface map
    pub interfaces: Vec<EETypeRef>,
    /// Rare flags, as stored in the optional-fields blob
    pub rare_flags: RareFlags,
    /// Finalizer entrypoint
    pub finalizer: Option<Address>,
    /// Optional-fields blob
    pub optional_fields: Option<Address>,
    /// `T` of `Nullable<T>`
    pub nullable_type: Option<EETypeRef>,
    /// Sealed virtual slot table
    pub sealed_virtual_slots: Option<Address>,
    /// Dispatch map allocated by a runtime type loader
    pub dynamic_dispatch_map: Option<Address>,
    /// Generic type definition
    pub generic_definition: Option<EETypeRef>,
    /// Generic composition blob
    pub generic_composition: Option<Address>,
    /// Module of a runtime-built type
    pub dynamic_module: Option<Address>,
    /// Template of a runtime-built type
    pub dynamic_template_type: Option<Address>,
    /// GC statics of a runtime-built type
    pub dynamic_gc_statics: Option<Address>,
    /// Non-GC statics of a runtime-built type
    pub dynamic_non_gc_statics: Option<Address>,
    /// Thread-static offset of a runtime-built type
    pub dynamic_thread_static_offset: Option<u32>,
}

/// Value of one trailing field
enum Cell {
    Pointer(Address),
    Value(u32),
}

impl EEType {
    /// Header flags as written: `flags` with the related-type indirection bit synchronized
    #[must_use]
    pub fn header_flags(&self) -> EETypeFlags {
        let mut flags = self.flags;
        flags.set(
            EETypeFlags::RELATED_TYPE_VIA_IAT,
            self.related_type.is_some_and(EETypeRef::is_indirect),
        );
        flags
    }

    /// Layout of this record
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] for too many slots or interfaces, an
    /// unsupported pointer size, or conflicting rare flags.
    pub fn layout(&self, pointer_size: u32) -> Result<EETypeLayout> {
        let num_vtable_slots = u16::try_from(self.vtable.len())
            .map_err(|_| invariant_error!("Too many vtable slots - {}", self.vtable.len()))?;
        let num_interfaces = u16::try_from(self.interfaces.len())
            .map_err(|_| invariant_error!("Too many interfaces - {}", self.interfaces.len()))?;

        EETypeLayout::new(
            self.header_flags(),
            self.rare_flags,
            num_vtable_slots,
            num_interfaces,
            pointer_size,
        )
    }

    /// Size of the record in bytes
    ///
    /// # Errors
    /// See [`EEType::layout`].
    pub fn size(&self, pointer_size: u32) -> Result<u32> {
        Ok(self.layout(pointer_size)?.size())
    }

    fn trailing_cells(&self) -> [(EETypeField, Option<Cell>); 12] {
        let pointer = |value: Option<Address>| value.map(Cell::Pointer);
        [
            (EETypeField::Finalizer, pointer(self.finalizer)),
            (EETypeField::OptionalFieldsPtr, pointer(self.optional_fields)),
            (
                EETypeField::NullableType,
                pointer(self.nullable_type.map(EETypeRef::raw)),
            ),
            (
                EETypeField::SealedVirtualSlots,
                pointer(self.sealed_virtual_slots),
            ),
            (
                EETypeField::DynamicDispatchMap,
                pointer(self.dynamic_dispatch_map),
            ),
            (
                EETypeField::GenericDefinition,
                pointer(self.generic_definition.map(EETypeRef::to_tagged)),
            ),
            (
                EETypeField::GenericComposition,
                pointer(self.generic_composition),
            ),
            (EETypeField::DynamicModule, pointer(self.dynamic_module)),
            (
                EETypeField::DynamicTemplateType,
                pointer(self.dynamic_template_type),
            ),
            (EETypeField::DynamicGcStatics, pointer(self.dynamic_gc_statics)),
            (
                EETypeField::DynamicNonGcStatics,
                pointer(self.dynamic_non_gc_statics),
            ),
            (
                EETypeField::DynamicThreadStaticOffset,
                self.dynamic_thread_static_offset.map(Cell::Value),
            ),
        ]
    }

    /// Serialize the record at `address`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if a trailing section is populated but its
    /// flag is clear (or the reverse), or if the nullable indirection flag disagrees with
    /// `nullable_type`; [`crate::Error::OutOfBounds`] if the record does not fit the image.
    pub fn write_to(&self, image: &mut TypeImage, address: Address) -> Result<()> {
        let pointer_size = image.pointer_size();
        let layout = self.layout(pointer_size)?;

        let nullable_via_iat = self.nullable_type.is_some_and(EETypeRef::is_indirect);
        if nullable_via_iat != self.rare_flags.contains(RareFlags::NULLABLE_TYPE_VIA_IAT) {
            return Err(invariant_error!(
                "Nullable type indirection does not match the rare flags"
            ));
        }

        image.write_u16(address.offset(OFFSET_COMPONENT_SIZE), self.component_size)?;
        image.write_u16(address.offset(OFFSET_FLAGS), layout.flags().bits())?;
        image.write_u32(address.offset(OFFSET_BASE_SIZE), self.base_size)?;
        image.write_pointer(
            address.offset(OFFSET_RELATED_TYPE),
            self.related_type.map_or(Address::NULL, EETypeRef::raw),
        )?;
        image.write_u16(
            address.offset(offset_num_vtable_slots(pointer_size)),
            layout.num_vtable_slots(),
        )?;
        image.write_u16(
            address.offset(offset_num_interfaces(pointer_size)),
            layout.num_interfaces(),
        )?;
        image.write_u32(address.offset(offset_hash_code(pointer_size)), self.hash_code)?;

        for (index, slot) in self.vtable.iter().enumerate() {
            let offset = layout.vtable_slot_offset(to_u16(index)?);
            image.write_pointer(address.offset(offset), *slot)?;
        }
        for (index, interface) in self.interfaces.iter().enumerate() {
            let offset = layout.interface_offset(to_u16(index)?)?;
            image.write_pointer(address.offset(offset), interface.to_tagged())?;
        }

        for (field, cell) in self.trailing_cells() {
            match (layout.is_present(field), cell) {
                (true, Some(Cell::Pointer(value))) => {
                    image.write_pointer(address.offset(layout.field_offset(field)?), value)?;
                }
                (true, Some(Cell::Value(value))) => {
                    image.write_u32(address.offset(layout.field_offset(field)?), value)?;
                }
                (false, None) => {}
                (present, _) => {
                    return Err(invariant_error!(
                        "EEType field {} is {} by the flags but {} on the record",
                        field,
                        if present { "required" } else { "excluded" },
                        if present { "missing" } else { "populated" }
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Read-only view of an EEType inside a [`TypeImage`]
#[derive(Debug, Clone, Copy)]
pub struct EETypeView<'a> {
    image: &'a TypeImage,
    address: Address,
    component_size: u16,
    base_size: u32,
    hash_code: u32,
    layout: EETypeLayout,
}

impl<'a> EETypeView<'a> {
    /// Decode the header at `address` and replay the layout rules.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the record leaves the image, and format errors
    /// for a corrupt optional-fields blob.
    pub fn new(image: &'a TypeImage, address: Address) -> Result<Self> {
        let pointer_size = image.pointer_size();
        let component_size = image.read_u16(address.offset(OFFSET_COMPONENT_SIZE))?;
        let flags = EETypeFlags::from_bits_retain(image.read_u16(address.offset(OFFSET_FLAGS))?);
        let base_size = image.read_u32(address.offset(OFFSET_BASE_SIZE))?;
        let num_vtable_slots = image.read_u16(address.offset(offset_num_vtable_slots(pointer_size)))?;
        let num_interfaces = image.read_u16(address.offset(offset_num_interfaces(pointer_size)))?;
        let hash_code = image.read_u32(address.offset(offset_hash_code(pointer_size)))?;

        // Rare flags only move fields after the optional-fields pointer, so a layout without
        // them is enough to find the blob that holds them.
        let header_only = EETypeLayout::new(
            flags,
            RareFlags::empty(),
            num_vtable_slots,
            num_interfaces,
            pointer_size,
        )?;
        let rare_flags = if flags.contains(EETypeFlags::OPTIONAL_FIELDS) {
            let blob = image.read_pointer(
                address.offset(header_only.field_offset(EETypeField::OptionalFieldsPtr)?),
            )?;
            RareFlags::from_bits_retain(get_optional_field(
                image.bytes_from(blob)?,
                OptionalFieldTag::RareFlags,
                0,
            )?)
        } else {
            RareFlags::empty()
        };

        let layout = EETypeLayout::new(
            flags,
            rare_flags,
            num_vtable_slots,
            num_interfaces,
            pointer_size,
        )?;

        Ok(EETypeView {
            image,
            address,
            component_size,
            base_size,
            hash_code,
            layout,
        })
    }

    /// Address of the record
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The image the record lives in
    #[must_use]
    pub fn image(&self) -> &'a TypeImage {
        self.image
    }

    /// Layout replayed from the header and rare flags
    #[must_use]
    pub fn layout(&self) -> &EETypeLayout {
        &self.layout
    }

    /// Component size
    #[must_use]
    pub fn component_size(&self) -> u16 {
        self.component_size
    }

    /// Header flags
    #[must_use]
    pub fn flags(&self) -> EETypeFlags {
        self.layout.flags()
    }

    /// Rare flags
    #[must_use]
    pub fn rare_flags(&self) -> RareFlags {
        self.layout.rare_flags()
    }

    /// Structural kind
    #[must_use]
    pub fn kind(&self) -> EETypeKind {
        self.flags().kind()
    }

    /// Base size or parameterized shape
    #[must_use]
    pub fn base_size(&self) -> u32 {
        self.base_size
    }

    /// Hash code
    #[must_use]
    pub fn hash_code(&self) -> u32 {
        self.hash_code
    }

    /// Number of vtable slots
    #[must_use]
    pub fn num_vtable_slots(&self) -> u16 {
        self.layout.num_vtable_slots()
    }

    /// Number of interfaces
    #[must_use]
    pub fn num_interfaces(&self) -> u16 {
        self.layout.num_interfaces()
    }

    /// Embedded `CorElementType`
    #[must_use]
    pub fn element_type(&self) -> u8 {
        self.flags().element_type()
    }

    /// Returns true for value types
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.flags().contains(EETypeFlags::VALUE_TYPE)
    }

    /// Returns true for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags().contains(EETypeFlags::IS_INTERFACE)
    }

    /// Returns true for generic instantiations
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.flags().contains(EETypeFlags::IS_GENERIC)
    }

    /// Returns true if instances hold GC references
    #[must_use]
    pub fn contains_gc_pointers(&self) -> bool {
        self.flags().contains(EETypeFlags::HAS_POINTERS)
    }

    /// Returns true for `Nullable<T>` instantiations
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.rare_flags().contains(RareFlags::IS_NULLABLE)
    }

    fn pointer_size(&self) -> u32 {
        self.image.pointer_size()
    }

    /// Base size of a single-dimension zero-based array
    fn sz_array_base_size(&self) -> u32 {
        3 * self.pointer_size()
    }

    /// Returns true for arrays of any rank
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind() == EETypeKind::Parameterized && self.base_size >= self.sz_array_base_size()
    }

    /// Returns true for single-dimension zero-based arrays
    #[must_use]
    pub fn is_sz_array(&self) -> bool {
        self.kind() == EETypeKind::Parameterized && self.base_size == self.sz_array_base_size()
    }

    /// Returns true for unmanaged pointer types
    #[must_use]
    pub fn is_pointer_type(&self) -> bool {
        self.kind() == EETypeKind::Parameterized && self.base_size == 0
    }

    /// Returns true for by-ref types
    #[must_use]
    pub fn is_byref_type(&self) -> bool {
        self.kind() == EETypeKind::Parameterized && self.base_size == 1
    }

    /// Array rank; an SzArray and a rank-1 multi-dimensional array both report 1
    #[must_use]
    pub fn array_rank(&self) -> Option<u32> {
        if !self.is_array() {
            return None;
        }
        if self.is_sz_array() {
            return Some(1);
        }
        Some((self.base_size - self.sz_array_base_size()) / (2 * 4))
    }

    /// The related type, with indirection followed
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the record or its cell leaves the image.
    pub fn related_type(&self) -> Result<Option<Address>> {
        let raw = self
            .image
            .read_pointer(self.address.offset(OFFSET_RELATED_TYPE))?;
        if raw.is_null() {
            return Ok(None);
        }
        if self.flags().contains(EETypeFlags::RELATED_TYPE_VIA_IAT) {
            return self.image.read_pointer(raw).map(Some);
        }
        Ok(Some(raw))
    }

    /// Base type of a canonical or cloned type
    ///
    /// # Errors
    /// See [`EETypeView::related_type`].
    pub fn base_type(&self) -> Result<Option<Address>> {
        match self.kind() {
            EETypeKind::Canonical => self.related_type(),
            EETypeKind::Cloned => match self.related_type()? {
                Some(canonical) => EETypeView::new(self.image, canonical)?.base_type(),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Element type of an array, pointer or by-ref
    ///
    /// # Errors
    /// See [`EETypeView::related_type`].
    pub fn related_parameter_type(&self) -> Result<Option<Address>> {
        if self.kind() == EETypeKind::Parameterized {
            self.related_type()
        } else {
            Ok(None)
        }
    }

    /// Target of vtable slot `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the vtable.
    pub fn vtable_slot(&self, index: u16) -> Result<Address> {
        if index >= self.num_vtable_slots() {
            return Err(out_of_bounds_error!());
        }
        self.image
            .read_pointer(self.address.offset(self.layout.vtable_slot_offset(index)))
    }

    /// Interface map entry `index`, with indirection followed
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is past the interface map.
    pub fn interface(&self, index: u16) -> Result<Address> {
        let tagged = self
            .image
            .read_pointer(self.address.offset(self.layout.interface_offset(index)?))?;
        EETypeRef::from_tagged(tagged).resolve(self.image)
    }

    /// Every interface map entry, with indirection followed
    ///
    /// # Errors
    /// See [`EETypeView::interface`].
    pub fn interfaces(&self) -> Result<Vec<Address>> {
        (0..self.num_interfaces())
            .map(|index| self.interface(index))
            .collect()
    }

    fn pointer_field(&self, field: EETypeField) -> Result<Option<Address>> {
        if !self.layout.is_present(field) {
            return Ok(None);
        }
        self.image
            .read_pointer(self.address.offset(self.layout.field_offset(field)?))
            .map(Some)
    }

    /// Finalizer entrypoint
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the field leaves the image.
    pub fn finalizer(&self) -> Result<Option<Address>> {
        self.pointer_field(EETypeField::Finalizer)
    }

    /// Raw optional-fields blob, running to the end of the image
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the pointer leaves the image.
    pub fn optional_fields(&self) -> Result<Option<&'a [u8]>> {
        match self.pointer_field(EETypeField::OptionalFieldsPtr)? {
            Some(blob) => self.image.bytes_from(blob).map(Some),
            None => Ok(None),
        }
    }

    /// Value of optional field `tag`, or `default`
    ///
    /// # Errors
    /// Returns format errors for a corrupt blob.
    pub fn optional_field(&self, tag: OptionalFieldTag, default: u32) -> Result<u32> {
        match self.optional_fields()? {
            Some(data) => get_optional_field(data, tag, default),
            None => Ok(default),
        }
    }

    /// `T` of `Nullable<T>`, with indirection followed
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the field or its cell leaves the image.
    pub fn nullable_type(&self) -> Result<Option<Address>> {
        match self.pointer_field(EETypeField::NullableType)? {
            Some(raw) if self.rare_flags().contains(RareFlags::NULLABLE_TYPE_VIA_IAT) => {
                self.image.read_pointer(raw).map(Some)
            }
            other => Ok(other),
        }
    }

    /// Offset of `Nullable<T>.value`, or 0 for other types
    ///
    /// # Errors
    /// Returns format errors for a corrupt blob.
    pub fn nullable_value_offset(&self) -> Result<u32> {
        if !self.is_nullable() {
            return Ok(0);
        }
        Ok(self.optional_field(OptionalFieldTag::NullableValueOffset, 0)? + 1)
    }

    /// Padding and alignment of a value type
    ///
    /// # Errors
    /// Returns format errors for a corrupt blob.
    pub fn value_type_padding(&self) -> Result<ValueTypePadding> {
        let value = self.optional_field(OptionalFieldTag::ValueTypeFieldPadding, 0)?;
        Ok(ValueTypePadding::decode(value, self.pointer_size()))
    }

    /// Entry `index` of the sealed virtual slot table
    ///
    /// # Errors
    /// Returns [`crate::Error::FieldNotPresent`] if the type has no sealed slots and
    /// [`crate::Error::OutOfBounds`] if `index` is past the table.
    pub fn sealed_virtual_slot(&self, index: u16) -> Result<Address> {
        let table = self
            .pointer_field(EETypeField::SealedVirtualSlots)?
            .ok_or(Error::FieldNotPresent(EETypeField::SealedVirtualSlots))?;
        let count = self.image.read_u32(table)?;
        if u32::from(index) >= count {
            return Err(out_of_bounds_error!());
        }
        let pointer_size = self.pointer_size();
        self.image
            .read_pointer(table.offset(pointer_size + u32::from(index) * pointer_size))
    }

    /// Generic type definition, with indirection followed
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the field or its cell leaves the image.
    pub fn generic_definition(&self) -> Result<Option<Address>> {
        match self.pointer_field(EETypeField::GenericDefinition)? {
            Some(tagged) => EETypeRef::from_tagged(tagged).resolve(self.image).map(Some),
            None => Ok(None),
        }
    }

    /// Generic arguments and variance
    ///
    /// # Errors
    /// Returns errors from [`GenericComposition::read`].
    pub fn generic_composition(&self) -> Result<Option<GenericComposition>> {
        match self.pointer_field(EETypeField::GenericComposition)? {
            Some(address) => GenericComposition::read(self.image, address).map(Some),
            None => Ok(None),
        }
    }

    /// Generic arguments, with indirection followed
    ///
    /// # Errors
    /// Returns errors from [`GenericComposition::read`].
    pub fn generic_arguments(&self) -> Result<Vec<Address>> {
        match self.generic_composition()? {
            Some(composition) => composition
                .arguments
                .iter()
                .map(|argument| argument.resolve(self.image))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Instance GC descriptor stored below the record
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] for a damaged
    /// descriptor.
    pub fn gc_descriptor(&self) -> Result<Option<GcDescriptor>> {
        if !self.contains_gc_pointers() {
            return Ok(None);
        }
        GcDescriptor::read(self.image.bytes_below(self.address)?, self.pointer_size()).map(Some)
    }

    /// The type's dispatch map, from the image table or the runtime-allocated pointer
    ///
    /// # Errors
    /// Returns errors from [`DispatchMap::parse`] and image reads.
    pub fn dispatch_map(&self) -> Result<Option<DispatchMap>> {
        if let Some(map) = self.pointer_field(EETypeField::DynamicDispatchMap)? {
            return DispatchMap::parse(self.image.bytes_from(map)?).map(Some);
        }

        let index = self.optional_field(OptionalFieldTag::DispatchMap, u32::MAX)?;
        if index == u32::MAX {
            return Ok(None);
        }
        let map = self.image.dispatch_map(index)?;
        DispatchMap::parse(self.image.bytes_from(map)?).map(Some)
    }

    /// Code address for an implementation slot: a vtable slot, or a sealed slot above it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for a slot past both tables.
    pub fn implementation_slot(&self, slot: u16) -> Result<Address> {
        let num_vtable_slots = self.num_vtable_slots();
        if slot < num_vtable_slots {
            self.vtable_slot(slot)
        } else {
            self.sealed_virtual_slot(slot - num_vtable_slots)
        }
    }

    /// Resolve interface method `slot` of `interface` to an implementation.
    ///
    /// Walks this type and its bases, consulting each dispatch map for the interface's position
    /// in that type's interface map.
    ///
    /// # Errors
    /// Returns image read and format errors.
    pub fn resolve_interface_slot(&self, interface: Address, slot: u16) -> Result<Option<Address>> {
        let mut depth = 0;
        let mut current = Some(*self);
        while let Some(view) = current {
            if let Some(map) = view.dispatch_map()? {
                for index in 0..view.num_interfaces() {
                    if view.interface(index)? != interface {
                        continue;
                    }
                    if let Some(implementation) = map.find(index, slot) {
                        return view.implementation_slot(implementation).map(Some);
                    }
                }
            }

            current = view.base_view(&mut depth)?;
        }

        Ok(None)
    }

    /// View of the base type, counting one more step of a base-chain walk
    fn base_view(&self, depth: &mut usize) -> Result<Option<EETypeView<'a>>> {
        let Some(base) = self.base_type()? else {
            return Ok(None);
        };

        *depth += 1;
        let limit = self.image.max_nesting_depth();
        if *depth > limit {
            return Err(Error::RecursionLimit(limit));
        }
        EETypeView::new(self.image, base).map(Some)
    }

    fn icastable_method(&self, tag: OptionalFieldTag) -> Result<Address> {
        let mut depth = 0;
        let mut current = Some(*self);
        while let Some(view) = current {
            let slot = view.optional_field(tag, NO_ICASTABLE_SLOT)?;
            if slot != NO_ICASTABLE_SLOT {
                return view.implementation_slot(to_u16(slot as usize)?);
            }

            current = view.base_view(&mut depth)?;
        }

        Err(Error::ICastableNotImplemented {
            type_name: self.display_name(),
        })
    }

    /// Implementation of `ICastable.IsInstanceOfInterface`, searching base types
    ///
    /// # Errors
    /// Returns [`crate::Error::ICastableNotImplemented`] if no type in the chain provides it.
    pub fn icastable_is_instance_method(&self) -> Result<Address> {
        self.icastable_method(OptionalFieldTag::ICastableIsInstSlot)
    }

    /// Implementation of `ICastable.GetImplType`, searching base types
    ///
    /// # Errors
    /// Returns [`crate::Error::ICastableNotImplemented`] if no type in the chain provides it.
    pub fn icastable_get_impl_type_method(&self) -> Result<Address> {
        self.icastable_method(OptionalFieldTag::ICastableGetImplTypeSlot)
    }

    /// Registered name of the type, or its address
    #[must_use]
    pub fn display_name(&self) -> String {
        self.image
            .type_name(self.address)
            .map_or_else(|| self.address.to_string(), str::to_string)
    }
}
