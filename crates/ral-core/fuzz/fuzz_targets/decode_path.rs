#![no_main]

use libfuzzer_sys::fuzz_target;
use ral_core::{decode_path, encode_path, load_json, AddressMap, Session};

const MAP: &str = r#"{"RALIndex": [
    {"parent": null, "children": [1, 3], "name": "soc", "offset": "0", "size": "100000"},
    {"parent": 0, "children": [2], "name": "uart", "offset": "1000", "size": "100",
     "dims": [4], "stride": "1000"},
    {"parent": 1, "children": [], "name": "fifo", "offset": "10", "size": "4",
     "dims": [3, 16], "stride": "4",
     "fields": [{"name": "data", "lsb": 0, "msb": 7, "reset": "0"}]},
    {"parent": 0, "children": [], "name": "id", "offset": "0", "size": "4",
     "fields": [{"name": "rev", "lsb": 0, "msb": 31, "reset": "1"}]}
], "RootNodeIds": [0]}"#;

fn fixed_point(map: &AddressMap, text: &str) {
    let Some(decoded) = decode_path(map, text) else {
        return;
    };
    let session = Session::new(map);
    let Ok(encoded) = encode_path(map, &session, decoded.id, Some(&decoded.stack)) else {
        panic!("decoded stack must re-encode");
    };
    assert_eq!(decode_path(map, &encoded), Some(decoded));
}

fuzz_target!(|data: &[u8]| {
    let Ok(map) = load_json(MAP) else {
        return;
    };
    if let Ok(text) = std::str::from_utf8(data) {
        fixed_point(&map, text);
    }
});
