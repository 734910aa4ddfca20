//! # eetype Prelude
//!
//! The types most programs need to load metadata, build a type system and emit or read
//! EETypes. Import with `use eetype::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all eetype operations
pub use crate::Error;

/// The result type used throughout eetype
pub use crate::Result;

/// Target and type-system configuration
pub use crate::{TargetArchitecture, TargetDetails, TypeSystemConfig};

// ================================================================================================
// Metadata
// ================================================================================================

/// Record handles and stores
pub use crate::metadata::{
    handle::{Handle, HandleType},
    memory::{MemoryStore, MetadataBuilder},
    store::MetadataStore,
};

/// Assembly binding
pub use crate::metadata::binder::{AssemblyBinder, AssemblyName, StaticBinder};

/// Handle resolution
pub use crate::metadata::unit::{Entity, MetadataUnit};

/// Signatures
pub use crate::metadata::signatures::TypeSignature;

// ================================================================================================
// Type System
// ================================================================================================

/// Entities and the context that owns them
pub use crate::metadata::typesystem::{
    FieldRc, InstanceLayout, MethodRc, TypeCategory, TypeRc, TypeSystemContext, WellKnownType,
};

// ================================================================================================
// Runtime Descriptors
// ================================================================================================

/// Building and emitting EETypes
pub use crate::runtime::{
    builder::{DescriptorBuilder, TypeShape},
    emitter::{EmittedImage, TypeImageBuilder},
};

/// Records and their reader
pub use crate::runtime::{
    eetype::{EEType, EETypeRef, EETypeView},
    flags::{EETypeFlags, EETypeKind, RareFlags},
    image::{Address, TypeImage},
};

/// Section codecs
pub use crate::runtime::{
    dispatchmap::DispatchMap,
    gcdesc::{GcDescriptor, GcLayout, GcPointerMap},
    optionalfields::{OptionalFieldTag, OptionalFields, OptionalFieldsBuilder},
};
