#![no_main]

use harbour_ports::descriptor::{is_safe_relative_path, top_level_key};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if !is_safe_relative_path(&raw) {
        return;
    }
    assert!(!raw.starts_with('/') && !raw.starts_with('\\'));
    assert!(raw.split(['/', '\\']).all(|segment| segment != ".."));
    assert!(!raw.contains('\0'));
    assert!(!raw
        .split(['/', '\\'])
        .all(|segment| segment.is_empty() || segment == "."));

    let key = top_level_key(&raw);
    assert!(key.split(['/', '\\']).all(|segment| segment != ".."));
});
