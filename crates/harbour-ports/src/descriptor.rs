//! Port descriptor loading: raw JSON acquisition, forward schema migration,
//! and field normalization into the canonical [`PortDescriptor`] shape.

use std::path::{Path, PathBuf};

use harbour_core::write_text_atomic;
use serde_json::{Map, Value};

use crate::PortError;

mod migration;
mod normalize;
mod schema;
mod validation;

use migration::{migrate_to_latest, read_schema_version};
use normalize::normalize_descriptor;
pub use schema::{
    InstallStatus, NameList, PortAttr, PortDescriptor, BLANK_RUNTIME, INSTALL_STATUS_INSTALLED,
    KNOWN_GENRES, LATEST_SCHEMA_VERSION, UNKNOWN_PORTER,
};
pub use validation::{is_safe_relative_path, top_level_key};

pub const DESCRIPTOR_FILE_NAME: &str = "port.json";

#[derive(Debug, Clone, PartialEq)]
/// Where a descriptor comes from: an already parsed object, a JSON file, or raw bytes.
pub enum DescriptorSource {
    Value(Value),
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<Value> for DescriptorSource {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&Path> for DescriptorSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for DescriptorSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for DescriptorSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A loaded descriptor plus whether migration or normalization rewrote it.
pub struct LoadedDescriptor {
    pub descriptor: PortDescriptor,
    /// True when the on-disk form should be rewritten with `descriptor`.
    pub changed: bool,
}

/// Minimal valid descriptor used when a port ships without one.
pub fn default_port_descriptor(name: &str) -> PortDescriptor {
    PortDescriptor {
        schema_version: LATEST_SCHEMA_VERSION,
        name: name.to_string(),
        items: Vec::new(),
        items_opt: Vec::new(),
        attr: PortAttr::default(),
        status: None,
        files: None,
        source: None,
        extra: Map::new(),
    }
}

/// Loads, migrates and normalizes one descriptor.
///
/// Unparseable input is rejected unless `allow_default` is set, in which case a
/// default descriptor is synthesized. A version newer than
/// [`LATEST_SCHEMA_VERSION`] is always rejected.
pub fn load_port_descriptor(
    source: impl Into<DescriptorSource>,
    source_name: Option<&str>,
    allow_default: bool,
) -> Result<LoadedDescriptor, PortError> {
    let source = source.into();
    let source_name = match (&source, source_name) {
        (_, Some(name)) => name.to_string(),
        (DescriptorSource::Path(path), None) => path.display().to_string(),
        (_, None) => "<inline>".to_string(),
    };

    let raw = match acquire_raw_object(source, &source_name) {
        Ok(object) => object,
        Err(error) if allow_default => {
            tracing::debug!(
                source = %source_name,
                error = %error,
                "synthesizing default port descriptor"
            );
            return Ok(LoadedDescriptor {
                descriptor: default_port_descriptor(""),
                changed: true,
            });
        }
        Err(error) => return Err(error),
    };
    load_port_descriptor_object(raw, &source_name)
}

fn acquire_raw_object(
    source: DescriptorSource,
    source_name: &str,
) -> Result<Map<String, Value>, PortError> {
    let value = match source {
        DescriptorSource::Value(value) => value,
        DescriptorSource::Path(path) => {
            let bytes =
                std::fs::read(&path).map_err(|error| PortError::filesystem(&path, error))?;
            parse_descriptor_bytes(&bytes, source_name)?
        }
        DescriptorSource::Bytes(bytes) => parse_descriptor_bytes(&bytes, source_name)?,
    };
    match value {
        Value::Object(object) => Ok(object),
        other => Err(PortError::malformed(
            source_name,
            format!("expected a JSON object, found {}", json_kind(&other)),
        )),
    }
}

fn parse_descriptor_bytes(bytes: &[u8], source_name: &str) -> Result<Value, PortError> {
    serde_json::from_slice::<Value>(bytes)
        .map_err(|error| PortError::malformed(source_name, format!("invalid JSON: {error}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn load_port_descriptor_object(
    mut object: Map<String, Value>,
    source_name: &str,
) -> Result<LoadedDescriptor, PortError> {
    let (version, mut changed) = read_schema_version(&mut object, source_name)?;
    changed |= migrate_to_latest(&mut object, version, source_name)?;
    changed |= normalize_descriptor(&mut object, source_name)?;

    let descriptor = serde_json::from_value::<PortDescriptor>(Value::Object(object))
        .map_err(|error| PortError::malformed(source_name, error.to_string()))?;
    Ok(LoadedDescriptor {
        descriptor,
        changed,
    })
}

/// Serializes a descriptor to pretty JSON and writes it atomically.
pub fn write_port_descriptor(path: &Path, descriptor: &PortDescriptor) -> Result<(), PortError> {
    let mut payload = serde_json::to_string_pretty(descriptor)
        .map_err(|error| PortError::malformed(descriptor.name.as_str(), error.to_string()))?;
    payload.push('\n');
    write_text_atomic(path, &payload).map_err(|error| PortError::persist(path, error))
}
