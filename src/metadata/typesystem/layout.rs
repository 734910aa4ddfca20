//! Field layout of types.
//!
//! Instance layouts place the instance fields of a type after those of its base type and derive
//! the [`GcPointerMap`] the instance GC descriptor is encoded from. Class offsets count from the
//! EEType pointer, so `System.Object` ends at one pointer and the first class field lands right
//! after it; value-type offsets count from the first byte of the value.
//!
//! Static layouts split the statics of a type into a GC block (references and boxed value
//! types, one pointer cell each) and a non-GC block (primitives, enums and unmanaged pointers).

use std::{cmp::Reverse, sync::Arc};

use tracing::{trace, warn};

use crate::{
    metadata::{
        attributes::LayoutKind,
        handle::Handle,
        typesystem::{lazy_init, TypeCategory, TypeRc},
    },
    runtime::gcdesc::GcPointerMap,
    utils::align_up,
    Error, Result,
};

/// Size, alignment and pointer map of one storage location
struct FieldStorage {
    size: u32,
    alignment: u32,
    gc_map: GcPointerMap,
}

impl FieldStorage {
    fn scalar(size: u32) -> Self {
        FieldStorage {
            size,
            alignment: size.max(1),
            gc_map: GcPointerMap::default(),
        }
    }

    fn reference(pointer_size: u32) -> Self {
        FieldStorage {
            size: pointer_size,
            alignment: pointer_size,
            gc_map: GcPointerMap::from_cells(&[true]),
        }
    }
}

/// Placement of the instance fields of a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    field_offsets: Vec<(Handle, u32)>,
    /// End of the last field, before alignment
    pub byte_count_unaligned: u32,
    /// Instance size, aligned to [`InstanceLayout::alignment`]
    pub byte_count: u32,
    /// Largest field alignment; capped at the pointer size for classes
    pub alignment: u32,
    /// Reference cells of the instance
    pub gc_map: GcPointerMap,
}

impl InstanceLayout {
    /// Offset of the instance field whose typical definition is `field`
    #[must_use]
    pub fn field_offset(&self, field: Handle) -> Option<u32> {
        self.field_offsets
            .iter()
            .find(|(handle, _)| *handle == field)
            .map(|(_, offset)| *offset)
    }

    /// Field definitions and offsets in placement order, base-type fields excluded
    #[must_use]
    pub fn field_offsets(&self) -> &[(Handle, u32)] {
        &self.field_offsets
    }

    /// Returns true if an instance holds any GC reference
    #[must_use]
    pub fn contains_gc_pointers(&self) -> bool {
        self.gc_map.contains_pointers()
    }
}

/// Placement of the static fields of a type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticLayout {
    field_offsets: Vec<(Handle, u32, bool)>,
    /// Size of the GC statics block
    pub gc_byte_count: u32,
    /// Size of the non-GC statics block
    pub non_gc_byte_count: u32,
    /// Reference cells of the GC statics block
    pub gc_map: GcPointerMap,
}

impl StaticLayout {
    /// Offset of the static field `field` inside its block
    #[must_use]
    pub fn field_offset(&self, field: Handle) -> Option<u32> {
        self.field_offsets
            .iter()
            .find(|(handle, _, _)| *handle == field)
            .map(|(_, offset, _)| *offset)
    }

    /// Returns true if `field` lives in the GC statics block
    #[must_use]
    pub fn is_gc_static(&self, field: Handle) -> bool {
        self.field_offsets
            .iter()
            .any(|(handle, _, gc)| *handle == field && *gc)
    }

    /// Returns true if the type has any static storage
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gc_byte_count == 0 && self.non_gc_byte_count == 0
    }
}

impl TypeRc {
    /// Layout of the instance fields
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for types without instance fields of their own (arrays,
    /// pointers, open generic types) and for misaligned references in explicit layouts, and
    /// [`Error::RecursionLimit`] for value types that contain themselves.
    pub fn instance_layout(&self) -> Result<Arc<InstanceLayout>> {
        self.instance_layout_at(0)
    }

    fn instance_layout_at(&self, depth: usize) -> Result<Arc<InstanceLayout>> {
        if let Some(layout) = self.instance_layout_cache.get() {
            return Ok(layout.clone());
        }

        let limit = self.context()?.config().max_nesting_depth;
        if depth > limit {
            return Err(Error::RecursionLimit(limit));
        }

        let layout = Arc::new(self.compute_instance_layout(depth)?);
        Ok(self.instance_layout_cache.get_or_init(|| layout).clone())
    }

    /// Storage a field of this type occupies inside another layout
    fn field_storage(&self, depth: usize) -> Result<FieldStorage> {
        let pointer_size = self.pointer_size()?;
        match self.category()? {
            TypeCategory::Void => Err(malformed_error!("Field of type System.Void")),
            category if category.is_primitive() => Ok(FieldStorage::scalar(
                category.primitive_size(pointer_size).unwrap_or(pointer_size),
            )),
            TypeCategory::Enum => self.enum_underlying_type()?.field_storage(depth + 1),
            TypeCategory::ValueType | TypeCategory::Nullable => {
                let layout = self.instance_layout_at(depth + 1)?;
                Ok(FieldStorage {
                    size: layout.byte_count,
                    alignment: layout.alignment,
                    gc_map: layout.gc_map.clone(),
                })
            }
            TypeCategory::Class
            | TypeCategory::Interface
            | TypeCategory::Array
            | TypeCategory::SzArray
            | TypeCategory::ByRef => Ok(FieldStorage::reference(pointer_size)),
            TypeCategory::Pointer | TypeCategory::FunctionPointer => {
                Ok(FieldStorage::scalar(pointer_size))
            }
            _ => Err(malformed_error!("Type {} has no storage size", self)),
        }
    }

    fn compute_instance_layout(&self, depth: usize) -> Result<InstanceLayout> {
        let pointer_size = self.pointer_size()?;
        let category = self.category()?;

        if self.contains_generic_variables() {
            return Err(malformed_error!("Open type {} has no instance layout", self));
        }

        // Corelib primitives wrap a field of their own type
        if category.is_primitive() {
            let size = category.primitive_size(pointer_size).unwrap_or(0).max(1);
            return Ok(InstanceLayout {
                field_offsets: Vec::new(),
                byte_count_unaligned: size,
                byte_count: size,
                alignment: size,
                gc_map: GcPointerMap::new(size.div_ceil(pointer_size) as usize),
            });
        }

        match category {
            TypeCategory::Interface => {
                return Ok(InstanceLayout {
                    field_offsets: Vec::new(),
                    byte_count_unaligned: 0,
                    byte_count: 0,
                    alignment: 1,
                    gc_map: GcPointerMap::default(),
                })
            }
            TypeCategory::Class
            | TypeCategory::ValueType
            | TypeCategory::Enum
            | TypeCategory::Nullable => {}
            _ => return Err(malformed_error!("Type {} has no instance fields", self)),
        }

        let is_value_type = category.is_value_type();
        let (start, mut alignment, mut gc_map) = if is_value_type {
            (0, 1, GcPointerMap::default())
        } else {
            match self.base_type()? {
                Some(base) => {
                    let base_layout = base.instance_layout_at(depth + 1)?;
                    (
                        base_layout.byte_count_unaligned,
                        base_layout.alignment,
                        base_layout.gc_map.clone(),
                    )
                }
                None => (pointer_size, pointer_size, GcPointerMap::new(1)),
            }
        };

        let mut fields = Vec::new();
        for field in self.fields()? {
            if field.is_static()? {
                continue;
            }
            let storage = field.field_type()?.field_storage(depth)?;
            fields.push((field.handle()?, field.explicit_offset()?, storage));
        }

        let (packing_size, class_size) = self.class_layout()?;
        let layout_kind = self.attributes()?.layout();

        let mut field_offsets = Vec::with_capacity(fields.len());
        let mut end = start;
        let mut place = |handle: Handle,
                         offset: u32,
                         storage: &FieldStorage,
                         gc_map: &mut GcPointerMap|
         -> Result<()> {
            if storage.gc_map.contains_pointers() {
                if offset % pointer_size != 0 {
                    return Err(malformed_error!(
                        "GC reference field of {} at misaligned offset {}",
                        self,
                        offset
                    ));
                }
                gc_map.merge_at(&storage.gc_map, (offset / pointer_size) as usize);
            }
            trace!(
                owner = %self,
                field = %handle,
                offset,
                size = storage.size,
                "placed field"
            );
            field_offsets.push((handle, offset));
            Ok(())
        };

        match layout_kind {
            LayoutKind::Auto | LayoutKind::Sequential => {
                let packing = if packing_size == 0 {
                    8
                } else {
                    u32::from(packing_size)
                };
                if layout_kind == LayoutKind::Auto {
                    fields.sort_by_key(|(_, _, storage)| Reverse(storage.alignment));
                }

                for (handle, _, storage) in &fields {
                    let field_alignment = if layout_kind == LayoutKind::Sequential {
                        storage.alignment.min(packing)
                    } else {
                        storage.alignment
                    };
                    alignment = alignment.max(field_alignment);

                    let offset = align_up(end, field_alignment);
                    place(*handle, offset, storage, &mut gc_map)?;
                    end = offset + storage.size;
                }
            }
            LayoutKind::Explicit => {
                let mut placed: Vec<(u32, u32, bool)> = Vec::with_capacity(fields.len());
                for (handle, explicit, storage) in &fields {
                    let Some(explicit) = explicit else {
                        return Err(malformed_error!(
                            "Field {} of explicit layout type {} has no offset",
                            handle,
                            self
                        ));
                    };
                    alignment = alignment.max(storage.alignment);

                    let offset = start + explicit;
                    let field_end = offset + storage.size;
                    let has_references = storage.gc_map.contains_pointers();
                    if placed.iter().any(|(other_start, other_end, other_references)| {
                        offset < *other_end
                            && *other_start < field_end
                            && (has_references || *other_references)
                    }) {
                        warn!(owner = %self, field = %handle, offset, "explicit field overlaps a GC reference");
                    }
                    placed.push((offset, field_end, has_references));

                    place(*handle, offset, storage, &mut gc_map)?;
                    end = end.max(field_end);
                }
            }
        }

        let mut byte_count_unaligned = end;
        if layout_kind != LayoutKind::Auto && class_size > 0 {
            byte_count_unaligned = byte_count_unaligned.max(start + class_size);
        }
        if is_value_type && byte_count_unaligned == 0 {
            byte_count_unaligned = 1;
        }
        if !is_value_type {
            alignment = alignment.min(pointer_size);
        }

        let byte_count = align_up(byte_count_unaligned, alignment);
        gc_map.grow_to(byte_count.div_ceil(pointer_size) as usize);

        Ok(InstanceLayout {
            field_offsets,
            byte_count_unaligned,
            byte_count,
            alignment,
            gc_map,
        })
    }

    /// Layout of the static fields; literals occupy no storage
    ///
    /// # Errors
    /// Returns an error if a static field type cannot be resolved or has no storage size.
    pub fn static_layout(&self) -> Result<Arc<StaticLayout>> {
        lazy_init(&self.static_layout_cache, || {
            let pointer_size = self.pointer_size()?;
            let mut layout = StaticLayout::default();

            for field in self.fields()? {
                if !field.is_static()? || field.is_literal()? {
                    continue;
                }

                let field_type = field.field_type()?;
                let category = field_type.category()?;
                let boxed = matches!(category, TypeCategory::ValueType | TypeCategory::Nullable);
                if field_type.is_gc_pointer()? || boxed {
                    let offset = layout.gc_byte_count;
                    layout.gc_map.set((offset / pointer_size) as usize);
                    layout.gc_byte_count += pointer_size;
                    layout.field_offsets.push((field.handle()?, offset, true));
                } else {
                    let storage = field_type.field_storage(0)?;
                    let offset = align_up(layout.non_gc_byte_count, storage.alignment);
                    layout.non_gc_byte_count = offset + storage.size;
                    layout.field_offsets.push((field.handle()?, offset, false));
                }
            }
            Ok(Arc::new(layout))
        })
        .cloned()
    }
}
