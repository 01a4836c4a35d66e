use serde_json::{Map, Value};

use crate::PortError;

use super::schema::{BLANK_RUNTIME, LATEST_SCHEMA_VERSION};

const LEGACY_VERSION_KEY: &str = "schema_version";
const VERSION_KEY: &str = "version";

/// Reads the declared schema version, coercing string values and moving the
/// legacy key onto `version`. Returns the version and whether the object changed.
pub(super) fn read_schema_version(
    object: &mut Map<String, Value>,
    source_name: &str,
) -> Result<(u32, bool), PortError> {
    let mut changed = false;
    if let Some(legacy) = object.remove(LEGACY_VERSION_KEY) {
        changed = true;
        object.entry(VERSION_KEY).or_insert(legacy);
    }

    let Some(raw) = object.get(VERSION_KEY) else {
        tracing::debug!(
            source = source_name,
            "descriptor has no version; reading it as the current schema"
        );
        object.insert(VERSION_KEY.to_string(), Value::from(LATEST_SCHEMA_VERSION));
        return Ok((LATEST_SCHEMA_VERSION, true));
    };

    let found = match raw {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => {
            changed = true;
            text.trim().parse::<u64>().ok()
        }
        _ => None,
    }
    .ok_or_else(|| PortError::malformed(source_name, format!("invalid version value {raw}")))?;

    if found < 1 {
        return Err(PortError::malformed(
            source_name,
            format!("version {found} is below the first schema version"),
        ));
    }
    if found > u64::from(LATEST_SCHEMA_VERSION) {
        return Err(PortError::UnsupportedSchema {
            source_name: source_name.to_string(),
            found,
            latest: LATEST_SCHEMA_VERSION,
        });
    }
    let version = u32::try_from(found).unwrap_or(LATEST_SCHEMA_VERSION);
    if changed {
        object.insert(VERSION_KEY.to_string(), Value::from(version));
    }
    Ok((version, changed))
}

/// Walks the descriptor forward one schema step at a time until it reaches the latest.
pub(super) fn migrate_to_latest(
    object: &mut Map<String, Value>,
    mut version: u32,
    source_name: &str,
) -> Result<bool, PortError> {
    let changed = version < LATEST_SCHEMA_VERSION;
    while version < LATEST_SCHEMA_VERSION {
        match version {
            1 => migrate_v1_to_v2(object, source_name)?,
            2 => migrate_v2_to_v3(object),
            3 => migrate_v3_to_v4(object),
            other => {
                return Err(PortError::malformed(
                    source_name,
                    format!("no migration path from version {other}"),
                ))
            }
        }
        version += 1;
        object.insert(VERSION_KEY.to_string(), Value::from(version));
        tracing::debug!(source = source_name, version, "migrated port descriptor");
    }
    Ok(changed)
}

fn migrate_v1_to_v2(object: &mut Map<String, Value>, source_name: &str) -> Result<(), PortError> {
    let has_name = object
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !has_name {
        let derived = object
            .get("source")
            .and_then(Value::as_str)
            .and_then(derive_name_from_source_url)
            .ok_or_else(|| {
                PortError::malformed(
                    source_name,
                    "version 1 descriptor has neither a name nor a source URL to derive one from",
                )
            })?;
        object.insert("name".to_string(), Value::String(derived));
    }
    for key in ["items", "items_opt"] {
        let entry = object.entry(key).or_insert(Value::Null);
        if entry.is_null() {
            *entry = Value::Array(Vec::new());
        }
    }
    let attr = object.entry("attr").or_insert(Value::Null);
    if !attr.is_object() {
        *attr = Value::Object(Map::new());
    }
    Ok(())
}

fn migrate_v2_to_v3(object: &mut Map<String, Value>) {
    let attr = object
        .entry("attr")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(attr) = attr.as_object_mut() {
        attr.entry("runtime").or_insert(Value::Null);
    }
}

fn migrate_v3_to_v4(object: &mut Map<String, Value>) {
    let Some(attr) = object.get_mut("attr").and_then(Value::as_object_mut) else {
        return;
    };
    let runtime = attr.entry("runtime").or_insert(Value::Null);
    match runtime {
        Value::Null => *runtime = Value::Array(Vec::new()),
        Value::String(name) => {
            let name = name.trim();
            *runtime = if name.is_empty() || name == BLANK_RUNTIME {
                Value::Array(Vec::new())
            } else {
                Value::Array(vec![Value::String(name.to_string())])
            };
        }
        _ => {}
    }
}

/// Last non-empty path segment of a URL, ignoring query and fragment.
pub(super) fn derive_name_from_source_url(source: &str) -> Option<String> {
    let without_fragment = source.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path)?,
        None => without_query,
    };
    path.split('/')
        .rev()
        .map(str::trim)
        .find(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{derive_name_from_source_url, migrate_to_latest, read_schema_version};
    use crate::PortError;

    fn object(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn unit_derive_name_from_source_url_takes_last_segment() {
        assert_eq!(
            derive_name_from_source_url("http://example.com/test_port").as_deref(),
            Some("test_port")
        );
        assert_eq!(
            derive_name_from_source_url("https://host/ports/2048.zip?raw=1#top").as_deref(),
            Some("2048.zip")
        );
        assert_eq!(
            derive_name_from_source_url("https://host/ports/cave/").as_deref(),
            Some("cave")
        );
        assert_eq!(derive_name_from_source_url("https://example.com"), None);
        assert_eq!(derive_name_from_source_url(""), None);
    }

    #[test]
    fn unit_read_schema_version_coerces_strings_and_legacy_key() {
        let mut raw = object(json!({"schema_version": "3"}));
        let (version, changed) = read_schema_version(&mut raw, "test").expect("version");
        assert_eq!(version, 3);
        assert!(changed);
        assert_eq!(raw.get("version"), Some(&json!(3)));
        assert!(!raw.contains_key("schema_version"));
    }

    #[test]
    fn regression_read_schema_version_never_clamps() {
        let mut too_new = object(json!({"version": 999}));
        let error = read_schema_version(&mut too_new, "test").expect_err("too new");
        assert!(matches!(
            error,
            PortError::UnsupportedSchema { found: 999, latest: 4, .. }
        ));

        let mut too_old = object(json!({"version": 0}));
        let error = read_schema_version(&mut too_old, "test").expect_err("too old");
        assert!(matches!(error, PortError::MalformedDescriptor { .. }));

        let mut garbage = object(json!({"version": "four"}));
        assert!(read_schema_version(&mut garbage, "test").is_err());
    }

    #[test]
    fn functional_migrate_to_latest_walks_every_step_from_v1() {
        let mut raw = object(json!({
            "version": 1,
            "source": "http://example.com/test_port",
            "attr": {"title": "", "runtime": null}
        }));
        let changed = migrate_to_latest(&mut raw, 1, "test").expect("migrate");
        assert!(changed);
        assert_eq!(raw.get("version"), Some(&json!(4)));
        assert_eq!(raw.get("name"), Some(&json!("test_port")));
        assert_eq!(raw.get("items"), Some(&json!([])));
        assert_eq!(raw["attr"]["runtime"], json!([]));
    }

    #[test]
    fn regression_migrate_v1_without_name_or_source_is_malformed() {
        let mut raw = object(json!({"version": 1, "attr": {}}));
        let error = migrate_to_latest(&mut raw, 1, "test").expect_err("no name");
        assert!(matches!(error, PortError::MalformedDescriptor { .. }));
    }

    #[test]
    fn unit_migrate_v2_adds_runtime_then_v3_makes_it_a_list() {
        let mut raw = object(json!({"version": 2, "name": "p", "attr": {}}));
        migrate_to_latest(&mut raw, 2, "test").expect("migrate");
        assert_eq!(raw["attr"]["runtime"], json!([]));

        let mut raw = object(json!({"version": 3, "name": "p", "attr": {"runtime": "mono"}}));
        migrate_to_latest(&mut raw, 3, "test").expect("migrate");
        assert_eq!(raw["attr"]["runtime"], json!(["mono"]));
    }

    #[test]
    fn unit_migrate_latest_is_noop() {
        let mut raw = object(json!({"version": 4, "name": "p"}));
        let changed = migrate_to_latest(&mut raw, 4, "test").expect("migrate");
        assert!(!changed);
    }
}
