//! Flag-driven layout of an EEType.
//!
//! An EEType has no offset table. The position of every trailing section is derived by replaying
//! a fixed, ordered list of rules: each rule names a field, a presence predicate over the header
//! flags and rare flags, and the number of bytes the field occupies when present. The reader
//! ([`crate::runtime::eetype::EETypeView`]) and the writer ([`crate::runtime::eetype::EEType::write_to`])
//! both go through [`EETypeLayout`], so they cannot disagree about where a field lives.
//!
//! # Record layout (pointer size `P`)
//!
//! ```text
//! +0       u16  component size
//! +2       u16  flags
//! +4       u32  base size
//! +8       P    related type
//! +8+P     u16  number of vtable slots
//! +10+P    u16  number of interfaces
//! +12+P    u32  hash code
//! +16+P    P*n  vtable slots
//!          ...  rule-driven trailing fields (see LAYOUT_RULES)
//! ```

use strum::{Display, EnumCount, EnumIter};

use crate::{
    runtime::flags::{EETypeFlags, RareFlags},
    utils::to_u32,
    Error, Result,
};

/// Offset of the component size in the header
pub const OFFSET_COMPONENT_SIZE: u32 = 0;
/// Offset of the flags in the header
pub const OFFSET_FLAGS: u32 = 2;
/// Offset of the base size in the header
pub const OFFSET_BASE_SIZE: u32 = 4;
/// Offset of the related type pointer in the header
pub const OFFSET_RELATED_TYPE: u32 = 8;

/// Offset of the vtable slot count for pointer size `pointer_size`
#[must_use]
pub const fn offset_num_vtable_slots(pointer_size: u32) -> u32 {
    8 + pointer_size
}

/// Offset of the interface count for pointer size `pointer_size`
#[must_use]
pub const fn offset_num_interfaces(pointer_size: u32) -> u32 {
    10 + pointer_size
}

/// Offset of the hash code for pointer size `pointer_size`
#[must_use]
pub const fn offset_hash_code(pointer_size: u32) -> u32 {
    12 + pointer_size
}

/// Size of the fixed header, which is also the offset of the first vtable slot
#[must_use]
pub const fn header_size(pointer_size: u32) -> u32 {
    16 + pointer_size
}

/// Trailing EEType fields, in layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum EETypeField {
    /// One pointer per implemented interface
    InterfaceMap,
    /// Finalizer code pointer
    Finalizer,
    /// Pointer to the optional-fields blob
    OptionalFieldsPtr,
    /// Pointer to the `T` of `Nullable<T>`
    NullableType,
    /// Pointer to the sealed virtual slot table
    SealedVirtualSlots,
    /// Pointer to a dispatch map allocated by the runtime type loader
    DynamicDispatchMap,
    /// Pointer to the generic type definition
    GenericDefinition,
    /// Pointer to the generic arguments and variance
    GenericComposition,
    /// Pointer to the module of a runtime-built type
    DynamicModule,
    /// Pointer to the template a runtime-built type was created from
    DynamicTemplateType,
    /// Pointer to the GC statics of a runtime-built type
    DynamicGcStatics,
    /// Pointer to the non-GC statics of a runtime-built type
    DynamicNonGcStatics,
    /// 32-bit thread-static offset of a runtime-built type
    DynamicThreadStaticOffset,
}

/// One step of the layout fold
struct LayoutRule {
    field: EETypeField,
    present: fn(&EETypeLayout) -> bool,
    size: fn(&EETypeLayout) -> u32,
}

fn always(_: &EETypeLayout) -> bool {
    true
}

fn pointer(layout: &EETypeLayout) -> u32 {
    layout.pointer_size
}

/// The single source of truth for trailing-field placement.
const LAYOUT_RULES: [LayoutRule; EETypeField::COUNT] = [
    LayoutRule {
        field: EETypeField::InterfaceMap,
        present: always,
        size: |l| u32::from(l.num_interfaces) * l.pointer_size,
    },
    LayoutRule {
        field: EETypeField::Finalizer,
        present: |l| l.flags.contains(EETypeFlags::HAS_FINALIZER),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::OptionalFieldsPtr,
        present: |l| l.flags.contains(EETypeFlags::OPTIONAL_FIELDS),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::NullableType,
        present: |l| l.rare_flags.contains(RareFlags::IS_NULLABLE),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::SealedVirtualSlots,
        present: |l| l.rare_flags.contains(RareFlags::HAS_SEALED_VTABLE_ENTRIES),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::DynamicDispatchMap,
        present: |l| {
            l.rare_flags
                .contains(RareFlags::HAS_DYNAMICALLY_ALLOCATED_DISPATCH_MAP)
        },
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::GenericDefinition,
        present: |l| l.flags.contains(EETypeFlags::IS_GENERIC),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::GenericComposition,
        present: |l| l.flags.contains(EETypeFlags::IS_GENERIC),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::DynamicModule,
        present: |l| l.rare_flags.contains(RareFlags::HAS_DYNAMIC_MODULE),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::DynamicTemplateType,
        present: |l| l.rare_flags.contains(RareFlags::IS_DYNAMIC_TYPE),
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::DynamicGcStatics,
        present: |l| {
            l.rare_flags
                .contains(RareFlags::IS_DYNAMIC_TYPE_WITH_GC_STATICS)
        },
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::DynamicNonGcStatics,
        present: |l| {
            l.rare_flags
                .contains(RareFlags::IS_DYNAMIC_TYPE_WITH_NON_GC_STATICS)
        },
        size: pointer,
    },
    LayoutRule {
        field: EETypeField::DynamicThreadStaticOffset,
        present: |l| {
            l.rare_flags
                .contains(RareFlags::IS_DYNAMIC_TYPE_WITH_THREAD_STATICS)
        },
        size: |_| 4,
    },
];

/// Everything that determines where the fields of an EEType live.
///
/// Two descriptors with equal `EETypeLayout`s place every field at the same offset, whatever
/// their hash codes, base sizes or vtable contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EETypeLayout {
    flags: EETypeFlags,
    rare_flags: RareFlags,
    num_vtable_slots: u16,
    num_interfaces: u16,
    pointer_size: u32,
}

impl EETypeLayout {
    /// Create a layout description.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvariantViolation`] if the rare flags ask for both a nullable
    /// type and sealed virtual slots; the two are mutually exclusive.
    pub fn new(
        flags: EETypeFlags,
        rare_flags: RareFlags,
        num_vtable_slots: u16,
        num_interfaces: u16,
        pointer_size: u32,
    ) -> Result<Self> {
        if rare_flags.contains(RareFlags::IS_NULLABLE | RareFlags::HAS_SEALED_VTABLE_ENTRIES) {
            return Err(invariant_error!(
                "An EEType cannot carry both a nullable type and sealed virtual slots"
            ));
        }
        if pointer_size != 4 && pointer_size != 8 {
            return Err(invariant_error!("Unsupported pointer size {}", pointer_size));
        }

        Ok(EETypeLayout {
            flags,
            rare_flags,
            num_vtable_slots,
            num_interfaces,
            pointer_size,
        })
    }

    /// Header flags this layout was computed from
    #[must_use]
    pub fn flags(&self) -> EETypeFlags {
        self.flags
    }

    /// Rare flags this layout was computed from
    #[must_use]
    pub fn rare_flags(&self) -> RareFlags {
        self.rare_flags
    }

    /// Number of vtable slots
    #[must_use]
    pub fn num_vtable_slots(&self) -> u16 {
        self.num_vtable_slots
    }

    /// Number of interface map entries
    #[must_use]
    pub fn num_interfaces(&self) -> u16 {
        self.num_interfaces
    }

    /// Pointer size in bytes
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Offset of vtable slot `index`
    #[must_use]
    pub fn vtable_slot_offset(&self, index: u16) -> u32 {
        header_size(self.pointer_size) + u32::from(index) * self.pointer_size
    }

    /// Offset of the first byte after the vtable
    fn trailing_start(&self) -> u32 {
        self.vtable_slot_offset(self.num_vtable_slots)
    }

    /// Returns true if `field` is present under this layout
    #[must_use]
    pub fn is_present(&self, field: EETypeField) -> bool {
        LAYOUT_RULES
            .iter()
            .find(|rule| rule.field == field)
            .is_some_and(|rule| (rule.present)(self))
    }

    /// Offset of `field` from the start of the EEType.
    ///
    /// Replays the rule list from the end of the vtable, adding the size of every present
    /// field that precedes `field`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FieldNotPresent`] if the flags say `field` is absent.
    pub fn field_offset(&self, field: EETypeField) -> Result<u32> {
        let mut offset = self.trailing_start();
        for rule in &LAYOUT_RULES {
            let present = (rule.present)(self);
            if rule.field == field {
                return if present {
                    Ok(offset)
                } else {
                    Err(Error::FieldNotPresent(field))
                };
            }
            if present {
                offset += (rule.size)(self);
            }
        }

        Err(Error::FieldNotPresent(field))
    }

    /// Offset of interface map entry `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `index` is not below the interface count.
    pub fn interface_offset(&self, index: u16) -> Result<u32> {
        if index >= self.num_interfaces {
            return Err(out_of_bounds_error!());
        }
        Ok(self.field_offset(EETypeField::InterfaceMap)? + u32::from(index) * self.pointer_size)
    }

    /// Total size of the EEType: the offset one past its last present field
    #[must_use]
    pub fn size(&self) -> u32 {
        LAYOUT_RULES
            .iter()
            .filter(|rule| (rule.present)(self))
            .fold(self.trailing_start(), |offset, rule| {
                offset + (rule.size)(self)
            })
    }

    /// Size of an EEType with the given shape, in the form the compiler asks for it.
    ///
    /// Only covers the fields a statically compiled type can carry.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the size does not fit in 32 bits.
    pub fn sizeof_eetype(
        pointer_size: u32,
        num_virtuals: u16,
        num_interfaces: u16,
        has_finalizer: bool,
        requires_optional_fields: bool,
        requires_nullable_type: bool,
        has_sealed_virtuals: bool,
        is_generic: bool,
    ) -> Result<u32> {
        let optional = [
            has_finalizer,
            requires_optional_fields,
            requires_nullable_type,
            has_sealed_virtuals,
            is_generic,
            is_generic,
        ];
        let extra = to_u32(optional.iter().filter(|present| **present).count())?;

        Ok(header_size(pointer_size)
            + (u32::from(num_virtuals) + u32::from(num_interfaces) + extra) * pointer_size)
    }
}
