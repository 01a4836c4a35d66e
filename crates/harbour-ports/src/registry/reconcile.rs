use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::descriptor::write_port_descriptor;
use crate::signature::{
    inspect_signature, write_signature, OwnershipSignature, SignatureState, SignatureWrite,
};
use crate::{PortError, PortsContext};

use super::{is_hidden_name, read_sorted_directory_paths, DeclaredPorts};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Output of phase 2. Transient; rebuilt on every pass.
pub struct ReconcileReport {
    /// Entries claimed by no loaded port and carrying no signature.
    pub unknown_files: Vec<String>,
    /// Signature `original_name` to the name the file has now. A rename is
    /// reported by the pass that detects it only; that pass rewrites the
    /// signature's `current_name`, so later passes see no rename.
    pub file_renames: BTreeMap<String, String>,
    pub stamped: Vec<String>,
    /// Signed files whose owner is not a loaded port, with that owner.
    pub orphaned_files: BTreeMap<String, String>,
    pub failures: Vec<ReconcileFailure>,
    pub rewritten_descriptors: Vec<PathBuf>,
}

impl ReconcileReport {
    fn fail(&mut self, path: PathBuf, error: &PortError) {
        tracing::warn!(path = %path.display(), error = %error, "reconcile entry failed");
        self.failures.push(ReconcileFailure {
            path,
            error: error.to_string(),
        });
    }
}

/// Phase 2: aligns the files on disk with the ownership declared in phase 1.
///
/// Per-entry IO failures land in `failures`; only an unreadable ports root aborts.
/// Detected renames are written back into the script's signature, so each one
/// shows up in `file_renames` exactly once.
#[tracing::instrument(
    name = "harbour.registry.reconcile",
    skip(context, declared),
    fields(ports_dir = %context.ports_dir.display(), ports = declared.all_ports.len())
)]
pub fn reconcile_ports(
    context: &PortsContext,
    declared: &DeclaredPorts,
) -> Result<ReconcileReport, PortError> {
    let mut report = ReconcileReport::default();
    persist_pending_rewrites(declared, &mut report);

    if !context.ports_dir.is_dir() {
        return Ok(report);
    }

    for path in read_sorted_directory_paths(&context.ports_dir)? {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            tracing::debug!(path = %path.display(), "skipping non UTF-8 entry");
            continue;
        };
        let name = name.to_string();
        if is_hidden_name(&name) || context.is_excluded(&name) {
            continue;
        }

        if path.is_dir() {
            let key = format!("{name}/");
            if !declared.all_items.contains_key(&key) {
                report.unknown_files.push(key);
            }
            continue;
        }

        let state = match inspect_signature(&path) {
            Ok(state) => state,
            Err(error) => {
                report.fail(path, &error);
                continue;
            }
        };
        match state {
            SignatureState::Unmanaged => {
                tracing::debug!(file = %name, "file opted out of management");
            }
            SignatureState::Unsupported => {
                if !declared.all_items.contains_key(&name) {
                    report.unknown_files.push(name);
                }
            }
            SignatureState::Unsigned => {
                let Some(owners) = declared.all_items.get(&name) else {
                    report.unknown_files.push(name);
                    continue;
                };
                let signature = OwnershipSignature::fresh(&name, owners.primary());
                match write_signature(&path, &signature) {
                    Ok(SignatureWrite::Written) => {
                        tracing::info!(file = %name, port = %signature.owner, "stamped ownership signature");
                        report.stamped.push(name);
                    }
                    Ok(_) => {}
                    Err(error) => report.fail(path, &error),
                }
            }
            SignatureState::Signed(signature) => {
                if !declared.all_ports.contains_key(&signature.owner) {
                    report
                        .orphaned_files
                        .insert(name.clone(), signature.owner.clone());
                }
                if signature.current_name != name {
                    tracing::info!(
                        from = %signature.current_name,
                        to = %name,
                        original = %signature.original_name,
                        "detected external rename"
                    );
                    report
                        .file_renames
                        .insert(signature.original_name.clone(), name.clone());
                    let updated = OwnershipSignature {
                        current_name: name.clone(),
                        ..signature
                    };
                    if let Err(error) = write_signature(&path, &updated) {
                        report.fail(path, &error);
                    }
                }
            }
        }
    }

    tracing::info!(
        unknown = report.unknown_files.len(),
        renames = report.file_renames.len(),
        stamped = report.stamped.len(),
        failures = report.failures.len(),
        "ports reconciled"
    );
    Ok(report)
}

fn persist_pending_rewrites(declared: &DeclaredPorts, report: &mut ReconcileReport) {
    for name in &declared.pending_rewrites {
        let (Some(descriptor), Some(path)) = (
            declared.all_ports.get(name),
            declared.descriptor_paths.get(name),
        ) else {
            continue;
        };
        match write_port_descriptor(path, descriptor) {
            Ok(()) => {
                tracing::info!(port = %name, path = %path.display(), "rewrote migrated descriptor");
                report.rewritten_descriptors.push(path.clone());
            }
            Err(error) => report.fail(path.clone(), &error),
        }
    }
}
