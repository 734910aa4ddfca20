#![no_main]

use eetype::metadata::signatures::{
    parse_field_signature, parse_method_signature, parse_method_spec_signature,
    parse_type_spec_signature,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = parse_method_signature(data);
    let _ = parse_field_signature(data);
    let _ = parse_type_spec_signature(data);
    let _ = parse_method_spec_signature(data);
});
