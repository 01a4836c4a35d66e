use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::descriptor::{load_port_descriptor, top_level_key, PortDescriptor};
use crate::{PortError, PortsContext};

use super::{is_hidden_name, read_sorted_directory_paths, ItemOwners};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDescriptor {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Output of phase 1.
pub struct DeclaredPorts {
    pub all_ports: BTreeMap<String, PortDescriptor>,
    pub descriptor_paths: BTreeMap<String, PathBuf>,
    /// Top-level item key (`name.sh` or `dir/`) to the ports claiming it.
    pub all_items: BTreeMap<String, ItemOwners>,
    pub skipped: Vec<SkippedDescriptor>,
    /// Ports whose descriptor was migrated or normalized and should be rewritten.
    pub pending_rewrites: Vec<String>,
}

impl DeclaredPorts {
    pub fn is_empty(&self) -> bool {
        self.all_ports.is_empty() && self.descriptor_paths.is_empty() && self.all_items.is_empty()
    }

    fn skip(&mut self, path: &Path, error: impl Into<String>) {
        let error = error.into();
        tracing::warn!(path = %path.display(), error = %error, "skipping port descriptor");
        self.skipped.push(SkippedDescriptor {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// Phase 1: aggregates every descriptor under the ports root. Never writes.
///
/// One bad descriptor is recorded in `skipped` and the scan continues.
#[tracing::instrument(
    name = "harbour.registry.declare",
    skip(context),
    fields(ports_dir = %context.ports_dir.display())
)]
pub fn declare_ports(context: &PortsContext) -> Result<DeclaredPorts, PortError> {
    let mut declared = DeclaredPorts::default();
    if !context.ports_dir.is_dir() {
        tracing::debug!("ports directory missing; nothing declared");
        return Ok(declared);
    }

    for descriptor_path in descriptor_candidates(context)? {
        let loaded = match load_port_descriptor(descriptor_path.as_path(), None, false) {
            Ok(loaded) => loaded,
            Err(error) => {
                declared.skip(&descriptor_path, error.to_string());
                continue;
            }
        };
        let mut descriptor = loaded.descriptor;
        let mut changed = loaded.changed;
        if descriptor.name.is_empty() {
            declared.skip(&descriptor_path, "descriptor has no port name");
            continue;
        }
        if let Some(existing) = declared.descriptor_paths.get(&descriptor.name) {
            let detail = format!(
                "port '{}' already declared by {}",
                descriptor.name,
                existing.display()
            );
            declared.skip(&descriptor_path, detail);
            continue;
        }

        for porter in &mut descriptor.attr.porter {
            let canonical = context.canonical_porter(porter).to_string();
            if canonical != *porter {
                tracing::debug!(port = %descriptor.name, from = %porter, to = %canonical, "porter fixup");
                *porter = canonical;
                changed = true;
            }
        }

        for item in descriptor.declared_items() {
            let key = top_level_key(item);
            match declared.all_items.get_mut(&key) {
                Some(owners) => {
                    if owners.insert_unique(&descriptor.name) {
                        tracing::debug!(item = %key, port = %descriptor.name, "item shared by several ports");
                    }
                }
                None => {
                    declared
                        .all_items
                        .insert(key, ItemOwners::new(&descriptor.name));
                }
            }
        }

        if changed {
            declared.pending_rewrites.push(descriptor.name.clone());
        }
        declared
            .descriptor_paths
            .insert(descriptor.name.clone(), descriptor_path);
        declared
            .all_ports
            .insert(descriptor.name.clone(), descriptor);
    }

    tracing::info!(
        ports = declared.all_ports.len(),
        items = declared.all_items.len(),
        skipped = declared.skipped.len(),
        "ports declared"
    );
    Ok(declared)
}

/// `<dir>/port.json` first, then `<dir>/*.port.json`, directories in sorted order.
fn descriptor_candidates(context: &PortsContext) -> Result<Vec<PathBuf>, PortError> {
    let suffix = context.descriptor_suffix();
    let mut candidates = Vec::new();
    for port_dir in read_sorted_directory_paths(&context.ports_dir)? {
        let hidden = port_dir
            .file_name()
            .and_then(|name| name.to_str())
            .is_none_or(is_hidden_name);
        if hidden || !port_dir.is_dir() {
            continue;
        }
        let primary = port_dir.join(&context.descriptor_file_name);
        if primary.is_file() {
            candidates.push(primary);
        }
        let secondary = match read_sorted_directory_paths(&port_dir) {
            Ok(paths) => paths,
            Err(error) => {
                tracing::warn!(path = %port_dir.display(), error = %error, "cannot list port directory");
                continue;
            }
        };
        candidates.extend(secondary.into_iter().filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(&suffix) && name.len() > suffix.len())
        }));
    }
    Ok(candidates)
}
