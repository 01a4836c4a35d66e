#![no_main]

use harbour_ports::descriptor::{is_safe_relative_path, LATEST_SCHEMA_VERSION};
use harbour_ports::load_port_descriptor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(loaded) = load_port_descriptor(data.to_vec(), Some("fuzz"), false) else {
        return;
    };
    let descriptor = loaded.descriptor;
    assert_eq!(descriptor.schema_version, LATEST_SCHEMA_VERSION);
    assert!(descriptor.declared_items().all(is_safe_relative_path));

    let value = serde_json::to_value(&descriptor).expect("descriptor serializes");
    let reloaded = load_port_descriptor(value, Some("fuzz"), false).expect("reload");
    assert!(!reloaded.changed);
    assert_eq!(reloaded.descriptor, descriptor);
});
