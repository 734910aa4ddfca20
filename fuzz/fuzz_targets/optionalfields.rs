#![no_main]

use eetype::runtime::optionalfields::{OptionalFieldsBuilder, OptionalFieldTag, get_optional_field};
use libfuzzer_sys::fuzz_target;
use strum::IntoEnumIterator;

fuzz_target!(|data: &[u8]| {
    for tag in OptionalFieldTag::iter() {
        let _ = get_optional_field(data, tag, 0);
    }

    if let Ok(decoded) = OptionalFieldsBuilder::decode(data) {
        let reencoded = decoded.encode();
        let again = OptionalFieldsBuilder::decode(&reencoded).unwrap();
        assert_eq!(decoded, again);
    }
});
