//! Lazy resolution across modules, entity identity and concurrent access.

mod common;

use std::{
    sync::{Arc, Barrier},
    thread,
};

use eetype::{
    metadata::{
        binder::StaticBinder,
        handle::Handle,
        memory::MetadataBuilder,
        typesystem::{TypeCategory, TypeSystemContext, WellKnownType},
    },
    Error, TypeSystemConfig,
};

use common::{APP, CORELIB, LIBRARY};

#[test]
fn nested_reference_resolves_across_modules() {
    let (context, app, inner_ref) = common::context();
    assert!(context.module(LIBRARY).is_none());

    let inner = app.resolve_type(inner_ref).unwrap();
    assert_eq!(inner.display_name(), "Demo.Outer+Inner");
    assert!(context.module(LIBRARY).is_some());

    let outer = common::find_type(&context, LIBRARY, "Demo", "Outer");
    assert_eq!(outer.get_nested_type("Inner").unwrap(), Some(inner.clone()));
    assert_eq!(inner.containing_type().unwrap(), Some(outer));

    let library = inner.module().unwrap().unwrap();
    assert_eq!(library.name(), LIBRARY);
    assert_eq!(app.name(), APP);
}

#[test]
fn resolution_is_cached_per_handle() {
    let (_context, app, inner_ref) = common::context();

    let first = app.resolve_type(inner_ref).unwrap();
    let second = app.resolve_type(inner_ref).unwrap();
    assert_eq!(first, second);
}

#[test]
fn inherited_layout_spans_modules() {
    let (context, app, inner_ref) = common::context();
    let inner = app.resolve_type(inner_ref).unwrap();
    let holder = app.type_by_name("Demo", "Holder").unwrap().unwrap();

    assert_eq!(holder.base_type().unwrap(), Some(inner.clone()));
    assert_eq!(holder.category().unwrap(), TypeCategory::Class);

    let label = inner.get_field("label").unwrap().unwrap();
    assert_eq!(label.offset().unwrap(), 8);
    let origin = holder.get_field("origin").unwrap().unwrap();
    assert_eq!(origin.offset().unwrap(), 16);
    assert_eq!(
        origin.field_type().unwrap(),
        &common::find_type(&context, LIBRARY, "Demo", "Point")
    );

    let layout = holder.instance_layout().unwrap();
    assert_eq!(layout.byte_count, 24);
    assert!(layout.gc_map.contains_pointers());
}

#[test]
fn constructed_types_are_interned() {
    let (context, _app, _) = common::context();
    let string = context.well_known_type(WellKnownType::String).unwrap();

    let first = context.array_type(&string, None).unwrap();
    let second = string.make_array_type(None).unwrap();
    assert_eq!(first, second);
    assert_ne!(first, context.array_type(&string, Some(1)).unwrap());

    let system = context.system_module().unwrap();
    assert_eq!(system.name(), CORELIB);
    assert!(system.is_system_module());
}

#[test]
fn unknown_assembly_fails_to_bind() {
    let (app, inner_ref) = common::app();
    let context = TypeSystemContext::new(TypeSystemConfig::default(), Arc::new(StaticBinder::new()));
    let unit = context.add_module(Arc::new(app)).unwrap();

    let result = unit.resolve_type(inner_ref);
    assert!(matches!(result, Err(Error::AssemblyBind { .. })));
}

#[test]
fn nested_type_is_not_found_at_top_level() {
    let mut builder = MetadataBuilder::new(APP).with_version(common::version());
    let library = builder.scope_reference(LIBRARY, common::version());
    let misplaced = builder.type_reference(library, "Demo", "Inner");
    let (_context, app) = common::context_for(TypeSystemConfig::default(), builder.build());

    match app.resolve_type(misplaced) {
        Err(Error::TypeLoad { type_name, module }) => {
            assert_eq!(type_name, "Demo.Inner");
            assert_eq!(module, LIBRARY);
        }
        other => panic!("expected a type load failure, got {other:?}"),
    }
}

#[test]
fn null_handle_is_not_a_type() {
    let (_context, app, _) = common::context();
    assert!(app.resolve_type(Handle::NULL).is_err());
}

#[test]
fn concurrent_resolution_converges() {
    const THREADS: usize = 8;

    let (context, app, inner_ref) = common::context();
    let barrier = Barrier::new(THREADS);

    let resolved = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let inner = app.resolve_type(inner_ref).unwrap();
                    let holder = app.type_by_name("Demo", "Holder").unwrap().unwrap();
                    let layout = holder.instance_layout().unwrap();
                    let strings = context
                        .array_type(&context.well_known_type(WellKnownType::String).unwrap(), None)
                        .unwrap();
                    let hash = holder.hash_code().unwrap();
                    (inner, holder, layout.byte_count, strings, hash)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect::<Vec<_>>()
    });

    let (inner, holder, size, strings, hash) = resolved[0].clone();
    for (other_inner, other_holder, other_size, other_strings, other_hash) in &resolved[1..] {
        assert_eq!(other_inner, &inner);
        assert_eq!(other_holder, &holder);
        assert_eq!(*other_size, size);
        assert_eq!(other_strings, &strings);
        assert_eq!(*other_hash, hash);
    }
}
