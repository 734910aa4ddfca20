//! Benchmarks for the EEType section codecs.
//!
//! Covers the encoders and decoders that run once per emitted type:
//! - Optional-fields blobs
//! - GC descriptors for objects and value-type arrays
//! - Interface dispatch maps
//! - Method signatures

extern crate eetype;

use criterion::{criterion_group, criterion_main, Criterion};
use eetype::{
    metadata::signatures::parse_method_signature,
    runtime::{
        dispatchmap::DispatchMap,
        gcdesc::{GcDescriptor, GcLayout, GcPointerMap},
        optionalfields::{get_optional_field, OptionalFieldTag, OptionalFieldsBuilder},
    },
};
use std::hint::black_box;

/// Blob with rare flags, a dispatch map index and a nullable offset
fn optional_fields_blob() -> Vec<u8> {
    let mut builder = OptionalFieldsBuilder::new();
    builder.set_field(OptionalFieldTag::RareFlags, 0x0000_0410);
    builder.set_field(OptionalFieldTag::DispatchMap, 1234);
    builder.set_field(OptionalFieldTag::NullableValueOffset, 7);
    builder.encode()
}

/// Benchmark encoding a three-field optional-fields blob.
fn bench_optional_fields_encode(c: &mut Criterion) {
    let mut builder = OptionalFieldsBuilder::new();
    builder.set_field(OptionalFieldTag::RareFlags, 0x0000_0410);
    builder.set_field(OptionalFieldTag::DispatchMap, 1234);
    builder.set_field(OptionalFieldTag::NullableValueOffset, 7);

    c.bench_function("optional_fields_encode", |b| {
        b.iter(|| black_box(black_box(&builder).encode()));
    });
}

/// Benchmark looking up the last field of a blob, the worst case for the linear scan.
fn bench_optional_fields_lookup(c: &mut Criterion) {
    let blob = optional_fields_blob();

    c.bench_function("optional_fields_lookup", |b| {
        b.iter(|| {
            let value =
                get_optional_field(black_box(&blob), OptionalFieldTag::NullableValueOffset, 0)
                    .unwrap();
            black_box(value)
        });
    });
}

/// Benchmark encoding an object descriptor with alternating reference cells.
fn bench_gc_descriptor_object(c: &mut Criterion) {
    let cells: Vec<bool> = (0..64).map(|cell| cell % 3 == 1).collect();
    let layout = GcLayout::Object {
        map: GcPointerMap::from_cells(&cells),
        base_size: 64 * 8 + 8,
        is_value_type: false,
    };

    c.bench_function("gc_descriptor_object_encode", |b| {
        b.iter(|| black_box(black_box(&layout).encode(8).unwrap()));
    });

    let encoded = layout.encode(8).unwrap();
    c.bench_function("gc_descriptor_object_read", |b| {
        b.iter(|| black_box(GcDescriptor::read(black_box(&encoded), 8).unwrap()));
    });
}

/// Benchmark encoding a value-type array descriptor.
fn bench_gc_descriptor_struct_array(c: &mut Criterion) {
    let layout = GcLayout::StructArray {
        element_map: GcPointerMap::from_cells(&[true, false, true, true]),
        rank: None,
    };

    c.bench_function("gc_descriptor_struct_array_encode", |b| {
        b.iter(|| black_box(black_box(&layout).encode(8).unwrap()));
    });
}

/// Benchmark encoding and parsing a dispatch map for four interfaces.
fn bench_dispatch_map(c: &mut Criterion) {
    let mut map = DispatchMap::new();
    for interface in 0..4u16 {
        for slot in 0..8u16 {
            map.push(interface, slot, 4 + interface * 8 + slot);
        }
    }

    c.bench_function("dispatch_map_encode", |b| {
        b.iter(|| black_box(black_box(&map).encode().unwrap()));
    });

    let encoded = map.encode().unwrap();
    c.bench_function("dispatch_map_parse", |b| {
        b.iter(|| black_box(DispatchMap::parse(black_box(&encoded)).unwrap()));
    });
}

/// Benchmark parsing an instance method signature.
/// Signature: int Instance.Method(int a, string b, bool c)
fn bench_method_signature(c: &mut Criterion) {
    // HASTHIS, 3 params, I4 return, I4, STRING, BOOLEAN params
    let signature = [0x20, 0x03, 0x08, 0x08, 0x0E, 0x02];

    c.bench_function("sig_method_instance", |b| {
        b.iter(|| black_box(parse_method_signature(black_box(&signature)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_optional_fields_encode,
    bench_optional_fields_lookup,
    bench_gc_descriptor_object,
    bench_gc_descriptor_struct_array,
    bench_dispatch_map,
    bench_method_signature,
);
criterion_main!(benches);
