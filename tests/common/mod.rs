//! Modules shared by the integration tests, assembled with the public metadata builder.

#![allow(dead_code)]

use std::sync::Arc;

use eetype::{
    metadata::{
        attributes::{FieldAttributes, MethodAttributes, TypeAttributes},
        binder::StaticBinder,
        handle::Handle,
        memory::{MemoryStore, MetadataBuilder},
        signatures::{SignatureMethod, SignatureParameter, TypeSignature},
        store::{AssemblyVersion, MetadataStore},
        typesystem::{TypeRc, TypeSystemContext},
        unit::MetadataUnit,
    },
    TypeSystemConfig,
};

pub const CORELIB: &str = "System.Private.CoreLib";
pub const LIBRARY: &str = "Demo.Library";
pub const APP: &str = "Demo.App";

const PRIMITIVES: [&str; 15] = [
    "Void", "Boolean", "Char", "SByte", "Byte", "Int16", "UInt16", "Int32", "UInt32", "Int64",
    "UInt64", "IntPtr", "UIntPtr", "Single", "Double",
];

pub fn version() -> AssemblyVersion {
    AssemblyVersion::new(8, 0, 0, 0)
}

fn virtual_method(return_type: TypeSignature) -> SignatureMethod {
    SignatureMethod {
        has_this: true,
        return_type: SignatureParameter {
            base: return_type,
            ..SignatureParameter::default()
        },
        ..SignatureMethod::default()
    }
}

/// A minimal system module: the object hierarchy, primitives, `String` and `Array`
pub fn corelib() -> MemoryStore {
    let mut builder = MetadataBuilder::new(CORELIB).with_version(version());
    let public = TypeAttributes::PUBLIC;
    let virtual_new_slot = MethodAttributes::PUBLIC
        | MethodAttributes::VIRTUAL
        | MethodAttributes::NEW_SLOT
        | MethodAttributes::HIDE_BY_SIG;

    let object = builder.define_type("System", "Object", public, Handle::NULL);
    builder
        .add_method(
            object,
            "Finalize",
            virtual_new_slot - MethodAttributes::PUBLIC | MethodAttributes::FAMILY,
            &virtual_method(TypeSignature::Void),
        )
        .unwrap();
    builder
        .add_method(
            object,
            "ToString",
            virtual_new_slot,
            &virtual_method(TypeSignature::String),
        )
        .unwrap();

    let value_type = builder.define_type(
        "System",
        "ValueType",
        public | TypeAttributes::ABSTRACT,
        object,
    );
    builder.define_type("System", "Enum", public | TypeAttributes::ABSTRACT, value_type);
    for primitive in PRIMITIVES {
        builder.define_type(
            "System",
            primitive,
            public | TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT,
            value_type,
        );
    }

    let string = builder.define_type("System", "String", public | TypeAttributes::SEALED, object);
    builder
        .add_field(string, "_stringLength", FieldAttributes::PRIVATE, &TypeSignature::I4)
        .unwrap();
    builder
        .add_field(string, "_firstChar", FieldAttributes::PRIVATE, &TypeSignature::Char)
        .unwrap();
    builder.define_type("System", "Array", public | TypeAttributes::ABSTRACT, object);

    builder.build()
}

/// `Demo.Library`: `Demo.Outer` with a nested `Inner` class and a pointer-free `Demo.Point`
pub fn library() -> MemoryStore {
    let mut builder = MetadataBuilder::new(LIBRARY).with_version(version());
    let corelib = builder.scope_reference(CORELIB, version());
    let object = builder.type_reference(corelib, "System", "Object");
    let value_type = builder.type_reference(corelib, "System", "ValueType");

    let outer = builder.define_type("Demo", "Outer", TypeAttributes::PUBLIC, object);
    let inner = builder
        .define_nested_type(outer, "Inner", TypeAttributes::NESTED_PUBLIC, object)
        .unwrap();
    builder
        .add_field(inner, "label", FieldAttributes::PUBLIC, &TypeSignature::String)
        .unwrap();

    let point = builder.define_type(
        "Demo",
        "Point",
        TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::SEQUENTIAL_LAYOUT,
        value_type,
    );
    builder
        .add_field(point, "x", FieldAttributes::PUBLIC, &TypeSignature::I4)
        .unwrap();
    builder
        .add_field(point, "y", FieldAttributes::PUBLIC, &TypeSignature::I4)
        .unwrap();

    builder.build()
}

/// `Demo.App`: `Demo.Holder` derives from `Demo.Outer/Inner` and holds a `Demo.Point`.
///
/// Returns the store and the handle of its reference to the nested type.
pub fn app() -> (MemoryStore, Handle) {
    let mut builder = MetadataBuilder::new(APP).with_version(version());
    let library = builder.scope_reference(LIBRARY, version());
    let outer = builder.type_reference(library, "Demo", "Outer");
    let inner = builder.nested_type_reference(outer, "Inner");
    let point = builder.type_reference(library, "Demo", "Point");

    let holder = builder.define_type("Demo", "Holder", TypeAttributes::PUBLIC, inner);
    builder
        .add_field(
            holder,
            "origin",
            FieldAttributes::PUBLIC,
            &TypeSignature::ValueType(point),
        )
        .unwrap();

    (builder.build(), inner)
}

/// A context whose binder knows all three modules; only `Demo.App` is loaded up front
pub fn context_with(config: TypeSystemConfig) -> (Arc<TypeSystemContext>, Arc<MetadataUnit>, Handle) {
    let (app, inner) = app();
    let (context, unit) = context_for(config, app);
    (context, unit, inner)
}

/// A context whose binder knows the corelib and `Demo.Library`, with `store` loaded up front
pub fn context_for(
    config: TypeSystemConfig,
    store: MemoryStore,
) -> (Arc<TypeSystemContext>, Arc<MetadataUnit>) {
    let binder = StaticBinder::new();
    binder.register(Arc::new(corelib())).unwrap();
    binder.register(Arc::new(library())).unwrap();

    let context = TypeSystemContext::new(config, Arc::new(binder));
    let unit = context.add_module(Arc::new(store) as Arc<dyn MetadataStore>).unwrap();
    (context, unit)
}

pub fn context() -> (Arc<TypeSystemContext>, Arc<MetadataUnit>, Handle) {
    context_with(TypeSystemConfig::default())
}

/// Top-level type `namespace.name` of the loaded module `module`
pub fn find_type(context: &TypeSystemContext, module: &str, namespace: &str, name: &str) -> TypeRc {
    context
        .resolve_assembly(&eetype::metadata::binder::AssemblyName::new(module, version()))
        .unwrap()
        .type_by_name(namespace, name)
        .unwrap()
        .unwrap()
}
