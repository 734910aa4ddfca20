//! Metadata storage, resolution and the type-system entity model.
//!
//! Metadata is consumed through the [`store::MetadataStore`] trait: a read-only, handle-addressed
//! view of one module's records. [`memory::MetadataBuilder`] produces in-memory stores, which is
//! how test fixtures and tools assemble modules without a file format.
//!
//! # Key Components
//!
//! - [`handle`] - Typed record handles, `(kind, row)` packed into 32 bits
//! - [`store`] - Record types and the [`store::MetadataStore`] trait
//! - [`memory`] - An in-memory store and its builder
//! - [`signatures`] - Signature blob parsing and encoding
//! - [`binder`] - Assembly names and the [`binder::AssemblyBinder`] that locates referenced
//!   assemblies
//! - [`unit`] - [`unit::MetadataUnit`], which resolves handles of one module to entities
//! - [`typesystem`] - Types, methods, fields and the [`typesystem::TypeSystemContext`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eetype::{
//!     metadata::{binder::StaticBinder, typesystem::TypeSystemContext},
//!     TypeSystemConfig,
//! };
//!
//! # fn corelib() -> Arc<dyn eetype::metadata::store::MetadataStore> { unimplemented!() }
//! let context = TypeSystemContext::new(TypeSystemConfig::default(), Arc::new(StaticBinder::new()));
//! let unit = context.add_module(corelib())?;
//!
//! if let Some(string) = unit.type_by_name("System", "String")? {
//!     println!("{} has {} fields", string, string.fields()?.len());
//! }
//! # Ok::<(), eetype::Error>(())
//! ```

/// Type, method, field and parameter attribute flags
pub mod attributes;
/// Assembly names and binding
pub mod binder;
/// Typed handles into a metadata store
pub mod handle;
/// In-memory metadata stores
pub mod memory;
/// Method and type signature parsing
pub mod signatures;
/// Metadata records and the read-only store interface
pub mod store;
/// The type-system entity model
pub mod typesystem;
/// Handle resolution for one module
pub mod unit;
