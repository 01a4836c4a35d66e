use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const LATEST_SCHEMA_VERSION: u32 = 4;
pub const UNKNOWN_PORTER: &str = "Unknown";
pub const BLANK_RUNTIME: &str = "blank";

pub const KNOWN_GENRES: &[&str] = &[
    "action",
    "adventure",
    "arcade",
    "casino/card",
    "fps",
    "platformer",
    "puzzle",
    "racing",
    "rhythm",
    "rpg",
    "simulation",
    "sports",
    "strategy",
    "visual novel",
    "other",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One declared port, always in the latest schema shape.
pub struct PortDescriptor {
    #[serde(rename = "version")]
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub items_opt: Vec<String>,
    #[serde(default)]
    pub attr: PortAttr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PortDescriptor {
    /// Required and optional items, in declaration order.
    pub fn declared_items(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .chain(self.items_opt.iter())
            .map(String::as_str)
    }

    pub fn is_installed(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.status.as_deref())
            .is_some_and(|status| status == INSTALL_STATUS_INSTALLED)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAttr {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default = "default_porter")]
    pub porter: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub desc: String,
    #[serde(default)]
    pub desc_md: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inst: String,
    #[serde(default)]
    pub inst_md: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rtr: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exp: bool,
    #[serde(default)]
    pub runtime: Vec<String>,
    #[serde(default)]
    pub reqs: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub arch: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub min_glibc: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PortAttr {
    fn default() -> Self {
        Self {
            title: String::new(),
            porter: default_porter(),
            desc: String::new(),
            desc_md: None,
            inst: String::new(),
            inst_md: None,
            genres: Vec::new(),
            image: Map::new(),
            rtr: false,
            exp: false,
            runtime: Vec::new(),
            reqs: Vec::new(),
            arch: Vec::new(),
            min_glibc: String::new(),
            extra: Map::new(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn default_porter() -> Vec<String> {
    vec![UNKNOWN_PORTER.to_string()]
}

pub const INSTALL_STATUS_INSTALLED: &str = "installed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Install provenance recorded once a port has been placed on disk.
pub struct InstallStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_unix: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Closed decoding of the loosely typed name-list fields (`porter`, `runtime`, `genres`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameList {
    Unknown,
    One(String),
    Many(Vec<String>),
}

impl NameList {
    /// Decodes a raw JSON value; `None` means the value has no list reading at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Unknown),
            Value::String(name) => Some(Self::One(name.clone())),
            Value::Array(values) => values
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::Many),
            _ => None,
        }
    }

    pub fn into_vec(self, unknown: &[&str]) -> Vec<String> {
        match self {
            Self::Unknown => unknown.iter().map(|item| item.to_string()).collect(),
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}
