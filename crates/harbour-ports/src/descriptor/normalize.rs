use serde_json::{Map, Value};

use crate::PortError;

use super::schema::{NameList, BLANK_RUNTIME, KNOWN_GENRES, UNKNOWN_PORTER};
use super::validation::is_safe_relative_path;

/// Brings every loosely typed field to its canonical shape. Idempotent.
/// Returns true when anything was rewritten.
pub(super) fn normalize_descriptor(
    object: &mut Map<String, Value>,
    source_name: &str,
) -> Result<bool, PortError> {
    let mut changed = false;

    match object.get("name") {
        Some(Value::String(_)) => {}
        Some(Value::Null) | None => {
            object.insert("name".to_string(), Value::String(String::new()));
            changed = true;
        }
        Some(other) => {
            return Err(PortError::malformed(
                source_name,
                format!("name must be a string, found {other}"),
            ))
        }
    }

    for key in ["items", "items_opt"] {
        changed |= normalize_item_list(object, key, source_name);
    }

    let attr = object
        .entry("attr")
        .or_insert_with(|| Value::Object(Map::new()));
    if attr.is_null() {
        *attr = Value::Object(Map::new());
        changed = true;
    }
    let Some(attr) = attr.as_object_mut() else {
        return Err(PortError::malformed(source_name, "attr must be an object"));
    };
    changed |= normalize_porter(attr);
    changed |= normalize_runtime(attr);
    changed |= normalize_reqs(attr);
    changed |= normalize_genres(attr);

    changed |= normalize_optional_root_fields(object);
    Ok(changed)
}

fn normalize_item_list(object: &mut Map<String, Value>, key: &str, source_name: &str) -> bool {
    if !object.contains_key(key) {
        object.insert(key.to_string(), Value::Array(Vec::new()));
        return false;
    }
    let entry = object.entry(key).or_insert(Value::Null);
    let (items, mut changed) = match entry {
        Value::Array(values) => (values.clone(), false),
        Value::String(single) => (vec![Value::String(single.clone())], true),
        _ => (Vec::new(), true),
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(path) if is_safe_relative_path(path) => kept.push(item),
            Some(path) => {
                tracing::warn!(
                    source = source_name,
                    list = key,
                    item = path,
                    "dropping unsafe item path from port descriptor"
                );
                changed = true;
            }
            None => changed = true,
        }
    }
    *entry = Value::Array(kept);
    changed
}

fn string_array(names: Vec<String>) -> Value {
    Value::Array(names.into_iter().map(Value::String).collect())
}

fn normalize_porter(attr: &mut Map<String, Value>) -> bool {
    let Some(raw) = attr.get("porter") else {
        return false;
    };
    if matches!(NameList::from_value(raw), Some(NameList::Many(_))) {
        return false;
    }
    let porters = NameList::from_value(raw)
        .unwrap_or(NameList::Unknown)
        .into_vec(&[UNKNOWN_PORTER]);
    attr.insert("porter".to_string(), string_array(porters));
    true
}

fn normalize_runtime(attr: &mut Map<String, Value>) -> bool {
    let Some(raw) = attr.get("runtime") else {
        return false;
    };
    let runtimes = match NameList::from_value(raw) {
        Some(NameList::Many(_)) => return false,
        Some(NameList::One(name)) if name.trim().is_empty() || name.trim() == BLANK_RUNTIME => {
            Vec::new()
        }
        Some(NameList::One(name)) => vec![name.trim().to_string()],
        Some(NameList::Unknown) | None => Vec::new(),
    };
    attr.insert("runtime".to_string(), string_array(runtimes));
    true
}

fn normalize_reqs(attr: &mut Map<String, Value>) -> bool {
    let Some(raw) = attr.get("reqs") else {
        return false;
    };
    let reqs = match raw {
        Value::Array(values) if values.iter().all(Value::is_string) => return false,
        Value::Array(values) => values
            .iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect(),
        Value::Object(flags) => {
            let mut enabled = flags
                .iter()
                .filter(|(_, enabled)| enabled.as_bool() == Some(true))
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            enabled.sort();
            enabled
        }
        Value::String(name) if !name.trim().is_empty() => vec![name.trim().to_string()],
        _ => Vec::new(),
    };
    attr.insert("reqs".to_string(), string_array(reqs));
    true
}

fn normalize_genres(attr: &mut Map<String, Value>) -> bool {
    let Some(raw) = attr.get("genres") else {
        return false;
    };
    let declared = match NameList::from_value(raw) {
        Some(NameList::Many(names)) => names,
        Some(NameList::One(name)) => vec![name],
        Some(NameList::Unknown) | None => Vec::new(),
    };
    let mut genres: Vec<String> = Vec::with_capacity(declared.len());
    for genre in declared {
        let genre = genre.trim().to_lowercase();
        if !KNOWN_GENRES.contains(&genre.as_str()) {
            tracing::debug!(genre = %genre, "dropping unknown genre");
            continue;
        }
        if !genres.contains(&genre) {
            genres.push(genre);
        }
    }
    let normalized = string_array(genres);
    if raw == &normalized {
        return false;
    }
    attr.insert("genres".to_string(), normalized);
    true
}

fn normalize_optional_root_fields(object: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    match object.get("files") {
        Some(Value::Array(values)) if values.iter().all(Value::is_string) => {}
        Some(Value::Array(values)) => {
            let files = values
                .iter()
                .filter_map(|value| value.as_str().map(str::to_string))
                .collect();
            object.insert("files".to_string(), string_array(files));
            changed = true;
        }
        Some(Value::Object(mapping)) => {
            let files = mapping.keys().cloned().collect();
            object.insert("files".to_string(), string_array(files));
            changed = true;
        }
        Some(_) => {
            object.remove("files");
            changed = true;
        }
        None => {}
    }

    if object.get("status").is_some_and(|status| !status.is_object()) {
        object.remove("status");
        changed = true;
    }
    if object.get("source").is_some_and(|source| !source.is_string()) {
        object.remove("source");
        changed = true;
    }
    changed
}
