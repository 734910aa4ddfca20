// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![warn(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # eetype
//!
//! Runtime type descriptors for a managed runtime, built from ECMA-335 metadata.
//!
//! `eetype` resolves module metadata lazily into a shared type-system entity model and lowers
//! those entities into EETypes: the compact records a runtime uses to describe every type it
//! can allocate, cast to or dispatch on. Records are emitted into a flat [`runtime::image::TypeImage`]
//! together with their GC descriptors, optional fields and interface dispatch maps, and can be
//! read back with [`runtime::eetype::EETypeView`].
//!
//! ## Features
//!
//! - **Lazy resolution** - Metadata handles resolve to cached, shareable entities on first use
//! - **Thread safety** - Units and the context can be shared across threads; racing resolutions
//!   converge on one entity
//! - **Target aware** - Layouts, GC descriptors and rare flags follow the configured pointer size
//!   and architecture
//! - **Round-trippable records** - Every field an emitter writes has a reader that follows the
//!   same flag-driven layout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eetype::prelude::*;
//!
//! # fn example(context: &TypeSystemContext) -> eetype::Result<()> {
//! let object = context.well_known_type(WellKnownType::Object)?;
//! let strings = context.array_type(&context.well_known_type(WellKnownType::String)?, None)?;
//!
//! let emitted = TypeImageBuilder::new(context, 0x1000_0000)
//!     .add_root(&object)
//!     .add_root(&strings)
//!     .emit()?;
//!
//! if let Some(address) = emitted.address_of(&strings) {
//!     let view = EETypeView::new(emitted.image(), address)?;
//!     println!("{} has base size {}", strings, view.base_size());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Stores, binding, per-module resolution and the type-system entities
//! - [`runtime`] - EEType shaping, emission and reading, and the codecs of its sections
//! - [`TypeSystemConfig`] - Target details and the knobs of the type system
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with [`Error`]. Format errors carry the source
//! location that raised them.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `debug` for module and image level milestones, `trace`
//! for per-type work. Install any subscriber to see them.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;
pub(crate) mod utils;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use eetype::prelude::*;
///
/// let config = TypeSystemConfig::default();
/// assert_eq!(config.target.pointer_size(), 8);
/// ```
pub mod prelude;

/// Target and type-system configuration
pub mod config;

/// Metadata stores, resolution and the type-system entity model
///
/// # Key Types
///
/// - [`metadata::store::MetadataStore`] - Read-only view of one module's records
/// - [`metadata::unit::MetadataUnit`] - Resolves handles of one module to entities
/// - [`metadata::typesystem::TypeSystemContext`] - Owner of units and interned types
/// - [`metadata::typesystem::TypeRc`] - A shared type entity
pub mod metadata;

/// EEType construction, emission and reading
///
/// # Key Types
///
/// - [`runtime::builder::DescriptorBuilder`] - Computes what a type's EEType contains
/// - [`runtime::emitter::TypeImageBuilder`] - Lays out and writes a closure of types
/// - [`runtime::eetype::EETypeView`] - Reads an EEType out of an image
pub mod runtime;

/// `eetype` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `eetype` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use eetype::{runtime::optionalfields::OptionalFieldsBuilder, Error};
///
/// match OptionalFieldsBuilder::decode(&[0x03]) {
///     Ok(fields) => println!("{} fields", fields.iter().count()),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Target and type-system configuration
pub use config::{PointerSize, TargetArchitecture, TargetDetails, TypeSystemConfig};

/// Provides access to the byte cursor the blob decoders are built on.
///
/// # Example
///
/// ```rust,no_run
/// use eetype::Parser;
/// let data = [0x81, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_compressed_uint()?, 0x100);
/// # Ok::<(), eetype::Error>(())
/// ```
pub use file::parser::Parser;
