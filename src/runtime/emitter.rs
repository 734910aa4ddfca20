//! Emission of a closure of types into a [`TypeImage`].
//!
//! Emission runs in two phases. The first shapes every type reachable from the roots (base and
//! element types, interfaces, generic definitions and arguments, nullable arguments) and reserves
//! its storage: the GC descriptor, immediately followed by the EEType, plus the optional-fields
//! blob, the dispatch map and the generic composition. The second phase writes each record once
//! every type it refers to has an address.
//!
//! A reference from a type to a type of a different module goes through an indirection cell,
//! the way references into other images are bound at runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use eetype::prelude::*;
//!
//! # fn example(context: &TypeSystemContext) -> eetype::Result<()> {
//! let string = context.well_known_type(WellKnownType::String)?;
//! let emitted = TypeImageBuilder::new(context, 0x1000_0000).add_root(&string).emit()?;
//!
//! let view = EETypeView::new(emitted.image(), emitted.address_of(&string).unwrap())?;
//! assert_eq!(view.component_size(), 2);
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::{
    metadata::{
        typesystem::{MethodRc, TypeRc, TypeSystemContext},
        unit::MetadataUnit,
    },
    runtime::{
        builder::{DescriptorBuilder, TypeShape},
        eetype::{EEType, EETypeRef, GenericComposition},
        flags::RareFlags,
        image::{Address, TypeImage},
        optionalfields::OptionalFieldTag,
    },
    utils::to_u32,
    Result,
};

/// Storage reserved for one type during the first phase
struct Reservation {
    address: Address,
    record: EEType,
    gc_descriptor: Option<Vec<u8>>,
    composition: Option<Address>,
}

/// A finished image, with the addresses of everything emitted into it
#[derive(Debug)]
pub struct EmittedImage {
    image: TypeImage,
    types: HashMap<TypeRc, Address>,
    entrypoints: HashMap<MethodRc, Address>,
}

impl EmittedImage {
    /// The image
    #[must_use]
    pub fn image(&self) -> &TypeImage {
        &self.image
    }

    /// Consume and return the image
    #[must_use]
    pub fn into_image(self) -> TypeImage {
        self.image
    }

    /// Address of the EEType of `ty`, if it was emitted
    #[must_use]
    pub fn address_of(&self, ty: &TypeRc) -> Option<Address> {
        self.types.get(ty).copied()
    }

    /// Synthetic code address of `method`, if a record refers to it
    #[must_use]
    pub fn entrypoint(&self, method: &MethodRc) -> Option<Address> {
        self.entrypoints.get(method).copied()
    }

    /// Number of emitted EETypes
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

/// Emits EETypes for a set of root types and everything they refer to
pub struct TypeImageBuilder {
    descriptors: DescriptorBuilder,
    image: TypeImage,
    roots: Vec<TypeRc>,
    shapes: Vec<TypeShape>,
    index: HashMap<TypeRc, usize>,
    entrypoints: HashMap<MethodRc, Address>,
    indirection_cells: HashMap<Address, Address>,
}

impl TypeImageBuilder {
    /// Builder for an image at `base`, laid out for the target of `context`
    #[must_use]
    pub fn new(context: &TypeSystemContext, base: u64) -> Self {
        TypeImageBuilder {
            descriptors: DescriptorBuilder::for_context(context),
            image: TypeImage::new(base, context.pointer_size())
                .with_max_nesting_depth(context.config().max_nesting_depth),
            roots: Vec::new(),
            shapes: Vec::new(),
            index: HashMap::new(),
            entrypoints: HashMap::new(),
            indirection_cells: HashMap::new(),
        }
    }

    /// Request an EEType for `ty`
    #[must_use]
    pub fn add_root(mut self, ty: &TypeRc) -> Self {
        self.roots.push(ty.clone());
        self
    }

    /// Request EETypes for every type in `types`
    #[must_use]
    pub fn add_roots<'a>(mut self, types: impl IntoIterator<Item = &'a TypeRc>) -> Self {
        self.roots.extend(types.into_iter().cloned());
        self
    }

    /// Shape the closure of the roots, one breadth-first level at a time
    fn collect(&mut self) -> Result<()> {
        let mut frontier = std::mem::take(&mut self.roots);
        while !frontier.is_empty() {
            frontier.retain(|ty| !self.index.contains_key(ty));
            frontier.dedup();

            let descriptors = &self.descriptors;
            let shapes = frontier
                .par_iter()
                .map(|ty| descriptors.shape(ty))
                .collect::<Result<Vec<_>>>()?;

            let mut next = Vec::new();
            for shape in shapes {
                if self.index.contains_key(&shape.ty) {
                    continue;
                }
                for referenced in shape.referenced_types() {
                    if !self.index.contains_key(&referenced) && !next.contains(&referenced) {
                        next.push(referenced);
                    }
                }
                self.index.insert(shape.ty.clone(), self.shapes.len());
                self.shapes.push(shape);
            }
            frontier = next;
        }
        Ok(())
    }

    /// Reference from `from` to `to`; indirect when the two live in different modules
    fn is_cross_module(from: &TypeRc, to: &TypeRc) -> Result<bool> {
        let same = |a: &Option<Arc<MetadataUnit>>, b: &Option<Arc<MetadataUnit>>| match (a, b) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => true,
        };
        Ok(!same(&from.module()?, &to.module()?))
    }

    fn entrypoint(&mut self, method: &MethodRc) -> Result<Address> {
        if let Some(address) = self.entrypoints.get(method) {
            return Ok(*address);
        }
        let symbol = format!("{}#{}", method.display_name(), method.handle()?);
        let address = self.image.code_symbol(&symbol);
        self.entrypoints.insert(method.clone(), address);
        Ok(address)
    }

    /// Allocate everything a type needs except the records it points at
    fn reserve(&mut self, shape: &TypeShape) -> Result<Reservation> {
        let pointer_size = self.image.pointer_size();

        let mut optional_fields = shape.optional_fields.clone();
        if !shape.dispatch_map.is_empty() {
            let encoded = shape.dispatch_map.encode()?;
            let map = self.image.alloc_bytes(&encoded, 4)?;
            let index = self.image.add_dispatch_map(map);
            optional_fields.set_field(OptionalFieldTag::DispatchMap, index);
        }

        let mut rare_flags =
            RareFlags::from_bits_retain(optional_fields.get_field_or(OptionalFieldTag::RareFlags, 0));
        if let Some(nullable) = &shape.nullable_type {
            if Self::is_cross_module(&shape.ty, nullable)? {
                rare_flags |= RareFlags::NULLABLE_TYPE_VIA_IAT;
            }
        }
        if !rare_flags.is_empty() {
            optional_fields.set_field(OptionalFieldTag::RareFlags, rare_flags.bits());
        }

        let optional_blob = match optional_fields.freeze() {
            Some(blob) => Some(self.image.alloc_bytes(blob.as_bytes(), 1)?),
            None => None,
        };

        let composition = if shape.generic_definition.is_some() {
            let size = GenericComposition {
                arguments: vec![EETypeRef::Direct(Address::NULL); shape.generic_arguments.len()],
                variance: shape.generic_variance.clone(),
            }
            .encoded_size(pointer_size);
            Some(self.image.alloc(size, pointer_size))
        } else {
            None
        };

        let placeholder = EETypeRef::Direct(Address::NULL);
        let record = EEType {
            component_size: shape.component_size,
            flags: shape.header_flags(optional_blob.is_some()),
            base_size: shape.base_size,
            related_type: shape.related_type.as_ref().map(|_| placeholder),
            hash_code: shape.hash_code,
            vtable: vec![Address::NULL; shape.vtable.len()],
            interfaces: vec![placeholder; shape.interfaces.len()],
            rare_flags,
            finalizer: shape.finalizer.as_ref().map(|_| Address::NULL),
            optional_fields: optional_blob,
            nullable_type: shape.nullable_type.as_ref().map(|_| placeholder),
            generic_definition: shape.generic_definition.as_ref().map(|_| placeholder),
            generic_composition: composition,
            ..EEType::default()
        };

        let gc_descriptor = match &shape.gc_layout {
            Some(layout) => Some(layout.encode(pointer_size)?),
            None => None,
        };
        let descriptor_size = to_u32(gc_descriptor.as_ref().map_or(0, Vec::len))?;
        let start = self
            .image
            .alloc(descriptor_size + record.size(pointer_size)?, pointer_size);

        Ok(Reservation {
            address: start.offset(descriptor_size),
            record,
            gc_descriptor,
            composition,
        })
    }

    fn type_ref(
        &mut self,
        from: &TypeRc,
        to: &TypeRc,
        addresses: &HashMap<TypeRc, Address>,
    ) -> Result<EETypeRef> {
        let target = addresses
            .get(to)
            .copied()
            .ok_or_else(|| invariant_error!("Type {} was referenced but not reserved", to))?;
        if !Self::is_cross_module(from, to)? {
            return Ok(EETypeRef::Direct(target));
        }

        if let Some(cell) = self.indirection_cells.get(&target) {
            return Ok(EETypeRef::Indirect(*cell));
        }
        let cell = self.image.alloc_indirection_cell(target)?;
        self.indirection_cells.insert(target, cell);
        Ok(EETypeRef::Indirect(cell))
    }

    /// Fill in the references of a reserved record and write it
    fn write(
        &mut self,
        shape: &TypeShape,
        reservation: Reservation,
        addresses: &HashMap<TypeRc, Address>,
    ) -> Result<()> {
        let pointer_size = self.image.pointer_size();
        let ty = &shape.ty;
        let mut record = reservation.record;

        if let Some(related) = &shape.related_type {
            record.related_type = Some(self.type_ref(ty, related, addresses)?);
        }
        for (slot, implementation) in shape.vtable.iter().enumerate() {
            if let Some(method) = implementation {
                record.vtable[slot] = self.entrypoint(method)?;
            }
        }
        for (index, interface) in shape.interfaces.iter().enumerate() {
            record.interfaces[index] = self.type_ref(ty, interface, addresses)?;
        }
        if let Some(finalizer) = &shape.finalizer {
            record.finalizer = Some(self.entrypoint(finalizer)?);
        }
        if let Some(nullable) = &shape.nullable_type {
            record.nullable_type = Some(self.type_ref(ty, nullable, addresses)?);
        }
        if let Some(definition) = &shape.generic_definition {
            record.generic_definition = Some(self.type_ref(ty, definition, addresses)?);
        }
        if let Some(composition) = reservation.composition {
            let arguments = shape
                .generic_arguments
                .iter()
                .map(|argument| self.type_ref(ty, argument, addresses))
                .collect::<Result<Vec<_>>>()?;
            let encoded = GenericComposition {
                arguments,
                variance: shape.generic_variance.clone(),
            }
            .encode(pointer_size)?;
            self.image.write_bytes(composition, &encoded)?;
        }

        if let Some(descriptor) = &reservation.gc_descriptor {
            let start = Address(reservation.address.value() - descriptor.len() as u64);
            self.image.write_bytes(start, descriptor)?;
        }
        record.write_to(&mut self.image, reservation.address)?;
        self.image.define_type(&ty.display_name(), reservation.address);

        trace!(
            type_name = %ty,
            address = %reservation.address,
            flags = ?record.header_flags(),
            "wrote EEType"
        );
        Ok(())
    }

    /// Shape, reserve and write every requested type
    ///
    /// # Errors
    /// Returns any error of shaping a type (see [`DescriptorBuilder::shape`]) and
    /// [`crate::Error::InvariantViolation`] if a record disagrees with its reserved layout.
    pub fn emit(mut self) -> Result<EmittedImage> {
        self.collect()?;

        let shapes = std::mem::take(&mut self.shapes);
        let mut reservations = Vec::with_capacity(shapes.len());
        let mut addresses = HashMap::with_capacity(shapes.len());
        for shape in &shapes {
            let reservation = self.reserve(shape)?;
            addresses.insert(shape.ty.clone(), reservation.address);
            reservations.push(reservation);
        }

        for (shape, reservation) in shapes.iter().zip(reservations) {
            self.write(shape, reservation, &addresses)?;
        }

        debug!(
            types = addresses.len(),
            bytes = self.image.len(),
            indirections = self.indirection_cells.len(),
            "emitted type image"
        );
        Ok(EmittedImage {
            image: self.image,
            types: addresses,
            entrypoints: self.entrypoints,
        })
    }
}
