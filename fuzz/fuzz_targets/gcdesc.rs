#![no_main]

use eetype::runtime::{dispatchmap::DispatchMap, gcdesc::GcDescriptor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = GcDescriptor::read(data, 4);
    let _ = GcDescriptor::read(data, 8);
    let _ = DispatchMap::parse(data);
});
