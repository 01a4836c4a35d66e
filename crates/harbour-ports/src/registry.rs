//! Two-phase registry reconciliation.
//!
//! Phase 1 ([`declare_ports`]) reads every descriptor and never writes.
//! Phase 2 ([`reconcile_ports`]) walks the real ports directory, stamps
//! ownership signatures and persists queued descriptor rewrites; it is the
//! only writer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use harbour_core::current_unix_timestamp;

use crate::descriptor::PortDescriptor;
use crate::{PortError, PortsContext};

mod declare;
mod reconcile;

pub use declare::{declare_ports, DeclaredPorts, SkippedDescriptor};
pub use reconcile::{reconcile_ports, ReconcileFailure, ReconcileReport};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ports claiming one top-level item. Promoted to `Many` on the first distinct claimant.
pub enum ItemOwners {
    One(String),
    Many(Vec<String>),
}

impl ItemOwners {
    pub fn new(owner: &str) -> Self {
        Self::One(owner.to_string())
    }

    /// Adds `owner` unless already present. Returns true when added.
    pub fn insert_unique(&mut self, owner: &str) -> bool {
        match self {
            Self::One(existing) if existing == owner => false,
            Self::One(existing) => {
                *self = Self::Many(vec![std::mem::take(existing), owner.to_string()]);
                true
            }
            Self::Many(owners) if owners.iter().any(|existing| existing == owner) => false,
            Self::Many(owners) => {
                owners.push(owner.to_string());
                true
            }
        }
    }

    /// First claimant; it wins when a signature has to be stamped.
    pub fn primary(&self) -> &str {
        match self {
            Self::One(owner) => owner,
            Self::Many(owners) => owners.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.names().any(|existing| existing == owner)
    }

    pub fn others_than<'a>(&'a self, owner: &'a str) -> Vec<&'a str> {
        self.names().filter(|existing| *existing != owner).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::One(owner) => std::slice::from_ref(owner),
            Self::Many(owners) => owners,
        };
        slice.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Immutable view of the registry after both phases. Readers share it without locking.
pub struct RegistrySnapshot {
    pub ports: BTreeMap<String, PortDescriptor>,
    pub descriptor_paths: BTreeMap<String, PathBuf>,
    pub items: BTreeMap<String, ItemOwners>,
    pub skipped: Vec<SkippedDescriptor>,
    pub report: ReconcileReport,
    pub built_unix: u64,
}

impl RegistrySnapshot {
    pub fn empty() -> Self {
        Self {
            ports: BTreeMap::new(),
            descriptor_paths: BTreeMap::new(),
            items: BTreeMap::new(),
            skipped: Vec::new(),
            report: ReconcileReport::default(),
            built_unix: 0,
        }
    }

    pub fn port(&self, name: &str) -> Option<&PortDescriptor> {
        self.ports.get(name)
    }

    pub fn owners(&self, item: &str) -> Option<&ItemOwners> {
        self.items.get(item)
    }
}

/// Runs phase 1 then phase 2 and freezes the result.
pub fn build_registry_snapshot(context: &PortsContext) -> Result<RegistrySnapshot, PortError> {
    let declared = declare_ports(context)?;
    let report = reconcile_ports(context, &declared)?;
    Ok(RegistrySnapshot {
        ports: declared.all_ports,
        descriptor_paths: declared.descriptor_paths,
        items: declared.all_items,
        skipped: declared.skipped,
        report,
        built_unix: current_unix_timestamp(),
    })
}

pub(crate) fn read_sorted_directory_paths(path: &Path) -> Result<Vec<PathBuf>, PortError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|error| PortError::filesystem(path, error))? {
        let entry = entry.map_err(|error| PortError::filesystem(path, error))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

pub(crate) fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
