//! The type-system entity model.
//!
//! Types, methods and fields are shared, immutable entities created by the metadata resolution
//! unit and by the [`TypeSystemContext`]. Every constructed type (arrays, pointers, by-refs,
//! instantiations, function pointers, signature variables) is interned by the context, and every
//! definition-backed entity is cached by the unit that owns its metadata. Pointer identity is
//! therefore entity identity: [`TypeRc`], [`MethodRc`] and [`FieldRc`] compare and hash by
//! address.
//!
//! # Key Components
//!
//! - [`TypeDesc`] / [`TypeRc`]: a type of any [`TypeKind`]
//! - [`MethodDesc`] / [`MethodRc`]: a method definition, a method on an instantiated type, or an
//!   instantiated generic method
//! - [`FieldDesc`] / [`FieldRc`]: a field definition, or a field on an instantiated type
//! - [`MethodSignature`]: a resolved method signature
//! - [`TypeSystemContext`]: owner of the units and of every interned type
//!
//! # Ownership
//!
//! The context owns all entities, directly or through its units. Entities point at their
//! structural components (element type, definition and arguments, owning type) with strong
//! references, and at lazily discovered relatives (base type, interfaces, vtable methods) with
//! weak ones. This keeps the entity graph acyclic for reference counting; an entity whose
//! context has been dropped reports [`crate::Error::UnitUnavailable`].
//!
//! # Laziness
//!
//! Everything derived from metadata is computed on first use. Values live in `OnceLock`s and
//! are computed outside of them, so two racing threads may both compute a value and the loser's
//! copy is discarded. Boolean facts live in OR-accumulated flag words, see [`TypeFlags`] and
//! [`MethodFlags`].

mod context;
mod field;
mod flags;
mod layout;
mod method;
mod signature;
mod types;
mod virtuals;

use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::{Arc, Weak},
};

pub use context::{TypeSystemContext, WellKnownType};
pub use field::{FieldDesc, FieldKind};
pub use flags::{MethodFlags, TypeCategory, TypeFlags, TYPE_CATEGORY_MASK};
pub use layout::{InstanceLayout, StaticLayout};
pub use method::{MethodDesc, MethodKind};
pub use signature::{MethodSignature, MethodSignatureFlags};
pub use types::{CanonKind, TypeDesc, TypeKind};

use crate::{Error, Result};

macro_rules! entity_handle {
    ($(#[$meta:meta])* $name:ident, $desc:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Arc<$desc>);

        impl $name {
            pub(crate) fn new(desc: $desc) -> Self {
                $name(Arc::new(desc))
            }

            /// Returns true if both handles denote the same entity
            #[must_use]
            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Deref for $name {
            type Target = $desc;

            fn deref(&self) -> &$desc {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                std::ptr::hash(Arc::as_ptr(&self.0), state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.display_name())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.display_name())
            }
        }
    };
}

/// Adds a non-owning counterpart to an entity handle, for caches that must not keep the entity
/// alive
macro_rules! weak_entity_handle {
    ($name:ident, $weak:ident, $desc:ty) => {
        impl $name {
            pub(crate) fn downgrade(&self) -> $weak {
                $weak(Arc::downgrade(&self.0))
            }
        }

        /// A non-owning reference, upgraded on access
        #[derive(Clone)]
        pub(crate) struct $weak(Weak<$desc>);

        impl $weak {
            pub(crate) fn upgrade(&self) -> Result<$name> {
                self.0.upgrade().map($name).ok_or(Error::UnitUnavailable)
            }
        }
    };
}

entity_handle!(
    /// Shared reference to a [`TypeDesc`]; two `TypeRc`s are equal iff they are the same type
    TypeRc,
    TypeDesc
);
weak_entity_handle!(TypeRc, WeakType, TypeDesc);

entity_handle!(
    /// Shared reference to a [`MethodDesc`]; equality is identity
    MethodRc,
    MethodDesc
);
weak_entity_handle!(MethodRc, WeakMethod, MethodDesc);

entity_handle!(
    /// Shared reference to a [`FieldDesc`]; equality is identity
    FieldRc,
    FieldDesc
);

/// The value of `cell`, computing it first if needed.
///
/// `compute` runs outside the cell; if another thread publishes first, the computed value is
/// dropped and the published one returned.
pub(crate) fn lazy_init<T, F>(cell: &std::sync::OnceLock<T>, compute: F) -> Result<&T>
where
    F: FnOnce() -> Result<T>,
{
    if let Some(value) = cell.get() {
        return Ok(value);
    }

    let value = compute()?;
    Ok(cell.get_or_init(|| value))
}

/// Upgrade a list of weak references
pub(crate) fn upgrade_types(list: &[WeakType]) -> Result<Vec<TypeRc>> {
    list.iter().map(WeakType::upgrade).collect()
}

/// Downgrade a list of types
pub(crate) fn downgrade_types(list: &[TypeRc]) -> Vec<WeakType> {
    list.iter().map(TypeRc::downgrade).collect()
}
