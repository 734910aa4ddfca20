//! EEType shaping and emission over modules loaded through a binder.

mod common;

use eetype::{
    metadata::typesystem::WellKnownType,
    runtime::{
        builder::DescriptorBuilder,
        eetype::EETypeView,
        emitter::TypeImageBuilder,
        flags::{EETypeFlags, EETypeKind},
        gcdesc::{GcDescriptor, GcLayout},
    },
    TargetDetails, TypeSystemConfig,
};

use common::LIBRARY;

const IMAGE_BASE: u64 = 0x0040_0000;

#[test]
fn class_with_one_reference_field() {
    let (context, app, inner_ref) = common::context();
    let inner = app.resolve_type(inner_ref).unwrap();
    let builder = DescriptorBuilder::for_context(&context);

    let shape = builder.shape(&inner).unwrap();
    assert_eq!(shape.base_size, 24);
    assert_eq!(shape.component_size, 0);
    assert!(shape.flags.contains(EETypeFlags::HAS_POINTERS));

    let layout = shape.gc_layout.unwrap();
    assert_eq!(layout.num_series(), 1);
    assert_eq!(layout.descriptor_size(8), 24);
}

#[test]
fn pointer_free_struct_array_has_no_descriptor() {
    let (context, _app, _) = common::context();
    let point = common::find_type(&context, LIBRARY, "Demo", "Point");
    let points = context.array_type(&point, None).unwrap();
    let builder = DescriptorBuilder::for_context(&context);

    let shape = builder.shape(&points).unwrap();
    assert_eq!(shape.component_size, 8);
    assert_eq!(shape.base_size, 24);
    assert!(shape.gc_layout.is_none());
    assert!(!shape.flags.contains(EETypeFlags::HAS_POINTERS));
}

#[test]
fn reference_arrays_use_a_fixed_descriptor() {
    let (context, _app, _) = common::context();
    let string = context.well_known_type(WellKnownType::String).unwrap();
    let strings = context.array_type(&string, None).unwrap();

    let layout = DescriptorBuilder::for_context(&context)
        .gc_layout(&strings)
        .unwrap()
        .unwrap();
    assert!(matches!(layout, GcLayout::ReferenceArray { .. }));
    assert_eq!(layout.descriptor_size(8), 24);
}

#[test]
fn thirty_two_bit_target() {
    let (context, app, inner_ref) =
        common::context_with(TypeSystemConfig::for_target(TargetDetails::x86()));
    let inner = app.resolve_type(inner_ref).unwrap();
    let builder = DescriptorBuilder::for_context(&context);

    assert_eq!(builder.compute_base_size(&inner).unwrap(), 12);
    let string = context.well_known_type(WellKnownType::String).unwrap();
    assert_eq!(builder.compute_base_size(&string).unwrap(), 14);
    assert_eq!(
        builder.gc_layout(&inner).unwrap().unwrap().descriptor_size(4),
        12
    );
}

#[test]
fn emitted_image_reads_back() {
    let (context, app, inner_ref) = common::context();
    let inner = app.resolve_type(inner_ref).unwrap();
    let holder = app.type_by_name("Demo", "Holder").unwrap().unwrap();
    let object = context.well_known_type(WellKnownType::Object).unwrap();
    let point = common::find_type(&context, LIBRARY, "Demo", "Point");
    let points = context.array_type(&point, None).unwrap();

    let emitted = TypeImageBuilder::new(&context, IMAGE_BASE)
        .add_roots([&holder, &points])
        .emit()
        .unwrap();
    assert_eq!(emitted.type_count(), 6);
    let image = emitted.image();

    let holder_view = EETypeView::new(image, emitted.address_of(&holder).unwrap()).unwrap();
    assert_eq!(holder_view.kind(), EETypeKind::Canonical);
    assert_eq!(holder_view.base_size(), 32);
    assert_eq!(holder_view.hash_code(), holder.hash_code().unwrap());
    assert!(holder_view.flags().contains(EETypeFlags::RELATED_TYPE_VIA_IAT));
    assert_eq!(holder_view.base_type().unwrap(), emitted.address_of(&inner));

    let Some(GcDescriptor::Object(series)) = holder_view.gc_descriptor().unwrap() else {
        panic!("Demo.Holder holds a reference");
    };
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].offset, 8);

    let inner_view = EETypeView::new(image, emitted.address_of(&inner).unwrap()).unwrap();
    assert_eq!(inner_view.base_type().unwrap(), emitted.address_of(&object));
    assert_eq!(inner_view.num_vtable_slots(), 2);

    let points_view = EETypeView::new(image, emitted.address_of(&points).unwrap()).unwrap();
    assert!(points_view.is_sz_array());
    assert_eq!(points_view.component_size(), 8);
    assert!(points_view.gc_descriptor().unwrap().is_none());
    assert_eq!(
        points_view.related_parameter_type().unwrap(),
        emitted.address_of(&point)
    );

    let point_view = EETypeView::new(image, emitted.address_of(&point).unwrap()).unwrap();
    assert!(point_view.is_value_type());
    assert_eq!(point_view.base_size(), 24);
    assert_eq!(image.type_name(emitted.address_of(&point).unwrap()), Some("Demo.Point"));
}
