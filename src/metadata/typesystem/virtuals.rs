//! Virtual slots, runtime interfaces and interface dispatch.
//!
//! The vtable of a type is the vtable of its base type followed by the slots the type introduces.
//! A virtual method introduces a slot when it is `NewSlot` or when nothing in the base chain has a
//! slot with the same name and instantiated signature; otherwise it overrides that slot. Every
//! slot records the method that introduced it and the most-derived implementation, which is
//! `None` while the slot is abstract.
//!
//! Slots are cached per type as weak references into the unit caches that own the methods.

use std::sync::Arc;

use crate::{
    metadata::typesystem::{
        downgrade_types, flags::TypeFlags, upgrade_types, MethodRc, TypeCategory, TypeRc,
        WeakMethod, WellKnownType,
    },
    runtime::dispatchmap::DispatchMap,
    utils::to_u16,
    Error, Result,
};

/// The vtable of a type
#[derive(Clone, Default)]
pub(crate) struct VirtualSlots {
    declarations: Vec<WeakMethod>,
    implementations: Vec<Option<WeakMethod>>,
}

impl VirtualSlots {
    /// Index of the slot whose declaration has the name and signature of `method`
    fn find_slot(&self, method: &MethodRc) -> Result<Option<usize>> {
        let name = method.name()?;
        let signature = method.signature()?;

        for (index, declaration) in self.declarations.iter().enumerate().rev() {
            let declaration = declaration.upgrade()?;
            if declaration.name()? == name && declaration.signature()? == signature {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

impl TypeRc {
    pub(crate) fn virtual_slots(&self) -> Result<Arc<VirtualSlots>> {
        self.virtual_slots_at(0)
    }

    fn virtual_slots_at(&self, depth: usize) -> Result<Arc<VirtualSlots>> {
        if let Some(slots) = self.virtual_slot_cache.get() {
            return Ok(slots.clone());
        }

        let limit = self.context()?.config().max_nesting_depth;
        if depth > limit {
            return Err(Error::RecursionLimit(limit));
        }

        let slots = Arc::new(self.compute_virtual_slots(depth)?);
        Ok(self.virtual_slot_cache.get_or_init(|| slots).clone())
    }

    fn compute_virtual_slots(&self, depth: usize) -> Result<VirtualSlots> {
        if self.is_interface()? {
            return Ok(VirtualSlots::default());
        }

        let mut slots = match self.base_type()? {
            Some(base) => base.virtual_slots_at(depth + 1)?.as_ref().clone(),
            None => VirtualSlots::default(),
        };

        for method in self.methods()? {
            if !method.is_virtual()? || method.is_static()? {
                continue;
            }

            let existing = if method.is_new_slot()? {
                None
            } else {
                slots.find_slot(&method)?
            };
            let implementation = if method.is_abstract()? {
                None
            } else {
                Some(method.downgrade())
            };

            match existing {
                Some(index) => slots.implementations[index] = implementation,
                None => {
                    slots.declarations.push(method.downgrade());
                    slots.implementations.push(implementation);
                }
            }
        }
        Ok(slots)
    }

    /// The method that introduced each vtable slot, base type slots first
    ///
    /// # Errors
    /// Returns an error if a method of the type chain cannot be resolved.
    pub fn vtable_slots(&self) -> Result<Vec<MethodRc>> {
        self.virtual_slots()?
            .declarations
            .iter()
            .map(WeakMethod::upgrade)
            .collect()
    }

    /// The most-derived implementation of each vtable slot, `None` for abstract slots
    ///
    /// # Errors
    /// Returns an error if a method of the type chain cannot be resolved.
    pub fn vtable_implementations(&self) -> Result<Vec<Option<MethodRc>>> {
        self.virtual_slots()?
            .implementations
            .iter()
            .map(|implementation| implementation.as_ref().map(WeakMethod::upgrade).transpose())
            .collect()
    }

    /// Slot `method` implements or introduces in this type's vtable
    ///
    /// # Errors
    /// Returns an error if a method of the type chain cannot be resolved.
    pub fn vtable_slot_of(&self, method: &MethodRc) -> Result<Option<usize>> {
        let slots = self.virtual_slots()?;
        for (index, implementation) in slots.implementations.iter().enumerate() {
            if let Some(implementation) = implementation {
                if implementation.upgrade()? == *method {
                    return Ok(Some(index));
                }
            }
        }
        for (index, declaration) in slots.declarations.iter().enumerate() {
            if declaration.upgrade()? == *method {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Methods of an interface in slot order: its virtual instance methods, as declared
    ///
    /// # Errors
    /// Returns an error if a method cannot be resolved.
    pub fn interface_methods(&self) -> Result<Vec<MethodRc>> {
        let mut methods = Vec::new();
        for method in self.methods()? {
            if method.is_virtual()? && !method.is_static()? {
                methods.push(method);
            }
        }
        Ok(methods)
    }

    /// Every interface the type implements, directly or through its base types and other
    /// interfaces, in interface map order
    ///
    /// # Errors
    /// Returns an error if an interface cannot be resolved.
    pub fn runtime_interfaces(&self) -> Result<Vec<TypeRc>> {
        self.runtime_interfaces_at(0)
    }

    fn runtime_interfaces_at(&self, depth: usize) -> Result<Vec<TypeRc>> {
        if let Some(cached) = self.runtime_interface_list.get() {
            return upgrade_types(cached);
        }

        let limit = self.context()?.config().max_nesting_depth;
        if depth > limit {
            return Err(Error::RecursionLimit(limit));
        }

        let mut interfaces = match self.base_type()? {
            Some(base) => base.runtime_interfaces_at(depth + 1)?,
            None => Vec::new(),
        };
        for interface in self.explicit_interfaces()? {
            for inherited in interface.runtime_interfaces_at(depth + 1)? {
                if !interfaces.contains(&inherited) {
                    interfaces.push(inherited);
                }
            }
            if !interfaces.contains(&interface) {
                interfaces.push(interface);
            }
        }

        let _ = self
            .runtime_interface_list
            .set(downgrade_types(&interfaces));
        Ok(interfaces)
    }

    /// The virtual method on this type chain that implements `interface_method`, by name and
    /// signature, most-derived first
    ///
    /// # Errors
    /// Returns [`Error::RecursionLimit`] on a cyclic base chain, or any resolution error.
    pub fn find_interface_implementation(
        &self,
        interface_method: &MethodRc,
    ) -> Result<Option<MethodRc>> {
        let name = interface_method.name()?;
        let signature = interface_method.signature()?;
        let limit = self.context()?.config().max_nesting_depth;

        let mut current = Some(self.clone());
        let mut depth = 0;
        while let Some(ty) = current {
            if depth > limit {
                return Err(Error::RecursionLimit(limit));
            }
            for method in ty.methods()? {
                if method.is_virtual()?
                    && !method.is_static()?
                    && method.name()? == name
                    && method.signature()? == signature
                {
                    return Ok(Some(method));
                }
            }
            current = ty.base_type()?;
            depth += 1;
        }
        Ok(None)
    }

    /// Interface dispatch entries: for each runtime interface and each of its methods, the
    /// vtable slot of the implementation
    ///
    /// # Errors
    /// Returns an error if a method cannot be resolved, or a count exceeds 16 bits.
    pub fn dispatch_map(&self) -> Result<DispatchMap> {
        let mut map = DispatchMap::new();
        if self.is_interface()? {
            return Ok(map);
        }

        for (interface_index, interface) in self.runtime_interfaces()?.iter().enumerate() {
            for (interface_slot, interface_method) in
                interface.interface_methods()?.iter().enumerate()
            {
                let Some(implementation) = self.find_interface_implementation(interface_method)?
                else {
                    continue;
                };
                if let Some(slot) = self.vtable_slot_of(&implementation)? {
                    map.push(
                        to_u16(interface_index)?,
                        to_u16(interface_slot)?,
                        to_u16(slot)?,
                    );
                }
            }
        }
        Ok(map)
    }

    /// The most-derived override of `System.Object.Finalize`, if it is not Object's own
    ///
    /// # Errors
    /// Returns an error if the vtable cannot be built.
    pub fn finalizer(&self) -> Result<Option<MethodRc>> {
        if self.category()? != TypeCategory::Class || self.is_canon() {
            return Ok(None);
        }

        let object = self.context()?.well_known_type(WellKnownType::Object)?;
        let Some(finalize) = object.get_method("Finalize", None)? else {
            return Ok(None);
        };
        let Some(slot) = object.vtable_slot_of(&finalize)? else {
            return Ok(None);
        };

        match self.vtable_implementations()?.get(slot) {
            Some(Some(implementation)) if *implementation.owner() != object => {
                Ok(Some(implementation.clone()))
            }
            _ => Ok(None),
        }
    }

    /// A `Finalize` override exists below `System.Object`
    ///
    /// # Errors
    /// See [`TypeRc::finalizer`].
    pub fn has_finalizer(&self) -> Result<bool> {
        let word = self
            .flags
            .get_or_compute(TypeFlags::HAS_FINALIZER_COMPUTED.bits(), || {
                Ok(if self.finalizer()?.is_some() {
                    TypeFlags::HAS_FINALIZER.bits()
                } else {
                    0
                })
            })?;
        Ok(TypeFlags::from_bits_retain(word).contains(TypeFlags::HAS_FINALIZER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{context_with_corelib, corelib_type, CorelibBuilder};

    fn names(methods: &[MethodRc]) -> Vec<String> {
        methods
            .iter()
            .map(|method| method.name().unwrap().to_string())
            .collect()
    }

    #[test]
    fn object_slots() {
        let (context, _) = context_with_corelib();
        let object = corelib_type(&context, "System", "Object");

        assert_eq!(names(&object.vtable_slots().unwrap()), ["Finalize", "ToString"]);
        assert!(object
            .vtable_implementations()
            .unwrap()
            .iter()
            .all(Option::is_some));
        assert!(object.finalizer().unwrap().is_none());
        assert!(!object.has_finalizer().unwrap());
    }

    #[test]
    fn overrides_reuse_inherited_slots() {
        let (context, _) = CorelibBuilder::new()
            .with_disposable_class("Demo", "Resource")
            .build();
        let resource = corelib_type(&context, "Demo", "Resource");

        let slots = resource.vtable_slots().unwrap();
        assert_eq!(names(&slots), ["Finalize", "ToString", "Dispose"]);

        let to_string = resource.get_method("ToString", None).unwrap().unwrap();
        let dispose = resource.get_method("Dispose", None).unwrap().unwrap();
        assert_eq!(resource.vtable_slot_of(&to_string).unwrap(), Some(1));
        assert_eq!(resource.vtable_slot_of(&dispose).unwrap(), Some(2));

        let implementations = resource.vtable_implementations().unwrap();
        assert_eq!(implementations[1].as_ref(), Some(&to_string));
        assert_eq!(slots[1].owner(), &corelib_type(&context, "System", "Object"));
    }

    #[test]
    fn abstract_slots_have_no_implementation() {
        let (context, _) = CorelibBuilder::new()
            .with_abstract_class("Demo", "Shape")
            .build();
        let shape = corelib_type(&context, "Demo", "Shape");

        assert_eq!(shape.vtable_slots().unwrap().len(), 3);
        assert!(shape.vtable_implementations().unwrap()[2].is_none());
        let area = shape.get_method("Area", None).unwrap().unwrap();
        assert_eq!(shape.vtable_slot_of(&area).unwrap(), Some(2));
    }

    #[test]
    fn interfaces_have_no_vtable() {
        let (context, _) = context_with_corelib();
        let disposable = corelib_type(&context, "System", "IDisposable");

        assert!(disposable.vtable_slots().unwrap().is_empty());
        assert!(disposable.dispatch_map().unwrap().is_empty());
        assert_eq!(names(&disposable.interface_methods().unwrap()), ["Dispose"]);
    }

    #[test]
    fn derived_types_inherit_interfaces_and_dispatch() {
        let (context, _) = CorelibBuilder::new()
            .with_disposable_class("Demo", "Resource")
            .with_derived_class("Demo", "FileResource", "Demo", "Resource")
            .build();
        let disposable = corelib_type(&context, "System", "IDisposable");
        let derived = corelib_type(&context, "Demo", "FileResource");

        assert_eq!(derived.runtime_interfaces().unwrap(), [disposable.clone()]);
        assert_eq!(derived.vtable_slots().unwrap().len(), 3);

        let dispose = disposable.get_method("Dispose", None).unwrap().unwrap();
        let implementation = derived
            .find_interface_implementation(&dispose)
            .unwrap()
            .unwrap();
        assert_eq!(implementation.owner(), &corelib_type(&context, "Demo", "Resource"));

        let map = derived.dispatch_map().unwrap();
        assert_eq!(map.find(0, 0), Some(2));
    }

    #[test]
    fn dispatch_covers_every_runtime_interface() {
        let (context, _) = CorelibBuilder::new()
            .with_icastable_class("Demo", "Proxy")
            .build();
        let proxy = corelib_type(&context, "Demo", "Proxy");

        let interfaces = proxy.runtime_interfaces().unwrap();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].name().unwrap(), "ICastable");

        let map = proxy.dispatch_map().unwrap();
        assert_eq!(map.find(0, 0), Some(2));
        assert_eq!(map.find(0, 1), Some(3));
        assert_eq!(map.find(1, 0), Some(4));
    }

    #[test]
    fn finalizer_overrides_are_found() {
        let (context, _) = CorelibBuilder::new()
            .with_finalizable_class("Demo", "Handle")
            .with_derived_class("Demo", "SafeHandle", "Demo", "Handle")
            .build();
        let handle = corelib_type(&context, "Demo", "Handle");
        let safe = corelib_type(&context, "Demo", "SafeHandle");

        let finalizer = handle.finalizer().unwrap().unwrap();
        assert_eq!(finalizer.owner(), &handle);
        assert!(safe.has_finalizer().unwrap());
        assert_eq!(safe.finalizer().unwrap(), Some(finalizer));
        assert_eq!(handle.vtable_slots().unwrap().len(), 2);
    }
}
