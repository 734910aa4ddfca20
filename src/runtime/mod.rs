//! Runtime type descriptors.
//!
//! Everything needed to turn type-system entities into EETypes, the runtime's descriptor
//! records, and to read them back out of an image.
//!
//! # Key Components
//!
//! - [`builder::DescriptorBuilder`] - Computes the shape of a type's EEType
//! - [`emitter::TypeImageBuilder`] - Emits a closure of types into a [`image::TypeImage`]
//! - [`eetype::EEType`] / [`eetype::EETypeView`] - The record writer and reader
//! - [`layout::EETypeLayout`] - Flag-driven offsets of the trailing sections
//! - [`optionalfields`] - The compressed optional-fields blob
//! - [`gcdesc`] - GC descriptors placed below each EEType
//! - [`dispatchmap`] - Interface dispatch maps
//! - [`hashing`] - Name based type hash codes
//! - [`padding`] - Value-type padding encoding

pub mod builder;
pub mod dispatchmap;
pub mod eetype;
pub mod emitter;
pub mod flags;
pub mod gcdesc;
pub mod hashing;
pub mod image;
pub mod layout;
pub mod optionalfields;
pub mod padding;
