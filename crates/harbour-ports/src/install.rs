//! Installer and uninstaller collaborators: turn a validated [`InstallPlan`]
//! into files under the ports root, and remove a port without touching
//! items another port still claims.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use harbour_core::current_unix_timestamp;
use serde_json::Map;
use zip::ZipArchive;

use crate::archive::{ArchiveEntry, InstallPlan};
use crate::descriptor::{
    is_safe_relative_path, top_level_key, write_port_descriptor, InstallStatus, PortDescriptor,
    INSTALL_STATUS_INSTALLED,
};
use crate::registry::RegistrySnapshot;
use crate::signature::{write_signature, OwnershipSignature, SignatureWrite};
use crate::{ArchiveViolation, PortError, PortsContext};

const SCRIPT_MODE: u32 = 0o755;

/// Platform callbacks run after the engine has finished touching the ports tree.
pub trait PortHook: Send + Sync {
    fn after_install(
        &self,
        context: &PortsContext,
        descriptor: &PortDescriptor,
    ) -> anyhow::Result<()>;

    fn after_uninstall(
        &self,
        context: &PortsContext,
        descriptor: &PortDescriptor,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopPortHook;

impl PortHook for NoopPortHook {
    fn after_install(&self, _: &PortsContext, _: &PortDescriptor) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_uninstall(&self, _: &PortsContext, _: &PortDescriptor) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallReport {
    pub name: String,
    pub descriptor_path: PathBuf,
    pub files: Vec<String>,
    pub directories: usize,
    pub stamped: Vec<String>,
    pub relocated_descriptor: bool,
    pub descriptor: PortDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallStatus {
    Removed,
    NotFound,
}

impl UninstallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    pub name: String,
    pub status: UninstallStatus,
    pub removed: Vec<String>,
    /// Items left in place because another port still claims them.
    pub kept_shared: Vec<String>,
}

fn escaping_entry(archive_path: &Path, name: &str) -> PortError {
    PortError::invalid_archive(archive_path, ArchiveViolation::PathEscape(name.to_string()))
}

/// Extracts a validated plan into the ports root and records the result in its descriptor.
#[tracing::instrument(
    name = "harbour.install",
    skip(context, plan, hook),
    fields(port = %plan.descriptor.name, archive = %archive_path.display())
)]
pub fn install_port(
    context: &PortsContext,
    plan: &InstallPlan,
    archive_path: &Path,
    hook: &dyn PortHook,
) -> Result<InstallReport, PortError> {
    let ports_dir = context.ports_dir.as_path();
    for entry in &plan.entries {
        let destination = plan.destination_name(entry);
        if !is_safe_relative_path(destination) {
            return Err(escaping_entry(archive_path, destination));
        }
    }
    if !is_safe_relative_path(&plan.port_info_file) {
        return Err(escaping_entry(archive_path, &plan.port_info_file));
    }

    let file = File::open(archive_path).map_err(|error| PortError::filesystem(archive_path, error))?;
    let mut archive = ZipArchive::new(file).map_err(|error| {
        PortError::invalid_archive(archive_path, ArchiveViolation::Unreadable(error.to_string()))
    })?;
    std::fs::create_dir_all(ports_dir).map_err(|error| PortError::filesystem(ports_dir, error))?;

    let mut created = Vec::new();
    let (mut files, directories) =
        match extract_plan(&mut archive, archive_path, plan, ports_dir, &mut created) {
            Ok(extracted) => extracted,
            Err(error) => {
                rollback_created_paths(&created);
                return Err(error);
            }
        };

    let name = plan.descriptor.name.clone();
    let mut stamped = Vec::new();
    for script in &plan.scripts {
        let path = ports_dir.join(script);
        match write_signature(&path, &OwnershipSignature::fresh(script, &name)) {
            Ok(SignatureWrite::Written) => stamped.push(script.clone()),
            Ok(SignatureWrite::Unchanged | SignatureWrite::Unmanaged) => {}
            Err(error) => {
                tracing::warn!(script = %script, error = %error, "script left unsigned");
            }
        }
    }

    let descriptor_path = ports_dir.join(&plan.port_info_file);
    if !descriptor_path.exists() {
        created.push(descriptor_path.clone());
    }
    files.insert(plan.port_info_file.clone());
    let mut descriptor = plan.descriptor.clone();
    descriptor.files = Some(files.iter().cloned().collect());
    descriptor.status = Some(InstallStatus {
        source: archive_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string),
        status: Some(INSTALL_STATUS_INSTALLED.to_string()),
        installed_unix: Some(current_unix_timestamp()),
        extra: Map::new(),
    });
    if let Err(error) = write_port_descriptor(&descriptor_path, &descriptor) {
        rollback_created_paths(&created);
        return Err(error);
    }

    hook.after_install(context, &descriptor)
        .map_err(|error| PortError::hook(name.as_str(), error))?;

    tracing::info!(
        port = %name,
        files = files.len(),
        stamped = stamped.len(),
        "port installed"
    );
    Ok(InstallReport {
        name,
        descriptor_path,
        files: files.into_iter().collect(),
        directories,
        stamped,
        relocated_descriptor: plan.relocated_from.is_some(),
        descriptor,
    })
}

/// Writes every entry of `plan`. Paths that did not exist before are pushed
/// onto `created`, outermost first.
fn extract_plan<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    plan: &InstallPlan,
    ports_dir: &Path,
    created: &mut Vec<PathBuf>,
) -> Result<(BTreeSet<String>, usize), PortError> {
    let mut files = BTreeSet::new();
    let mut directories = 0_usize;
    for entry in &plan.entries {
        let destination_name = plan.destination_name(entry);
        let destination = ports_dir.join(destination_name.trim_end_matches('/'));
        record_missing_paths(ports_dir, &destination, created);
        if entry.is_dir {
            std::fs::create_dir_all(&destination)
                .map_err(|error| PortError::filesystem(&destination, error))?;
            directories += 1;
            continue;
        }
        extract_entry(archive, archive_path, entry, &destination)?;
        apply_entry_mode(entry, &destination, plan.scripts.contains(&entry.name))?;
        files.insert(destination_name.to_string());
    }
    Ok((files, directories))
}

fn record_missing_paths(ports_dir: &Path, destination: &Path, created: &mut Vec<PathBuf>) {
    let mut missing = destination
        .ancestors()
        .take_while(|path| *path != ports_dir && path.starts_with(ports_dir))
        .filter(|path| !path.exists())
        .map(Path::to_path_buf)
        .collect::<Vec<_>>();
    missing.reverse();
    for path in missing {
        if !created.contains(&path) {
            created.push(path);
        }
    }
}

/// Best-effort removal of everything a failed install created, innermost first.
fn rollback_created_paths(created: &[PathBuf]) {
    for path in created.iter().rev() {
        let outcome = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else if path.exists() {
            std::fs::remove_file(path)
        } else {
            continue;
        };
        if let Err(error) = outcome {
            tracing::warn!(path = %path.display(), error = %error, "failed to roll back install path");
        }
    }
}

fn extract_entry<R: std::io::Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    entry: &ArchiveEntry,
    destination: &Path,
) -> Result<(), PortError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|error| PortError::filesystem(parent, error))?;
    }
    let mut source = archive.by_index(entry.index).map_err(|error| {
        PortError::invalid_archive(archive_path, ArchiveViolation::Unreadable(error.to_string()))
    })?;
    let mut target =
        File::create(destination).map_err(|error| PortError::filesystem(destination, error))?;
    std::io::copy(&mut source, &mut target)
        .map_err(|error| PortError::filesystem(destination, error))?;
    Ok(())
}

#[cfg(unix)]
fn apply_entry_mode(entry: &ArchiveEntry, destination: &Path, is_script: bool) -> Result<(), PortError> {
    use std::os::unix::fs::PermissionsExt;

    let mut mode = entry.unix_mode.map(|mode| mode & 0o7777).unwrap_or(0o644);
    if is_script {
        mode |= SCRIPT_MODE;
    }
    std::fs::set_permissions(destination, std::fs::Permissions::from_mode(mode))
        .map_err(|error| PortError::filesystem(destination, error))
}

#[cfg(not(unix))]
fn apply_entry_mode(_: &ArchiveEntry, _: &Path, _: bool) -> Result<(), PortError> {
    Ok(())
}

/// Removes an installed port. Items another port still claims are left alone.
#[tracing::instrument(name = "harbour.uninstall", skip(context, snapshot, hook))]
pub fn uninstall_port(
    context: &PortsContext,
    snapshot: &RegistrySnapshot,
    name: &str,
    hook: &dyn PortHook,
) -> Result<UninstallReport, PortError> {
    let Some(descriptor) = snapshot.port(name) else {
        return Ok(UninstallReport {
            name: name.to_string(),
            status: UninstallStatus::NotFound,
            removed: Vec::new(),
            kept_shared: Vec::new(),
        });
    };

    let recorded = descriptor
        .files
        .iter()
        .flatten()
        .map(String::as_str)
        .chain(descriptor.declared_items())
        .filter(|item| is_safe_relative_path(item))
        .collect::<BTreeSet<_>>();

    let mut removed = Vec::new();
    let mut kept_shared = Vec::new();
    for item in recorded {
        let key = top_level_key(item);
        let shared = snapshot
            .owners(&key)
            .is_some_and(|owners| !owners.others_than(name).is_empty());
        if shared {
            tracing::debug!(item = %item, "keeping item claimed by another port");
            kept_shared.push(item.to_string());
            continue;
        }
        let path = context.ports_dir.join(item.trim_end_matches('/'));
        if names_ports_root(item) || path == context.ports_dir {
            tracing::warn!(item = %item, "refusing to remove the ports root");
            continue;
        }
        let outcome = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else if path.exists() {
            std::fs::remove_file(&path)
        } else {
            continue;
        };
        outcome.map_err(|error| PortError::filesystem(&path, error))?;
        removed.push(item.to_string());
    }

    if let Some(descriptor_path) = snapshot.descriptor_paths.get(name) {
        if descriptor_path.is_file() {
            std::fs::remove_file(descriptor_path)
                .map_err(|error| PortError::filesystem(descriptor_path, error))?;
        }
    }

    hook.after_uninstall(context, descriptor)
        .map_err(|error| PortError::hook(name, error))?;
    tracing::info!(port = %name, removed = removed.len(), kept = kept_shared.len(), "port uninstalled");
    Ok(UninstallReport {
        name: name.to_string(),
        status: UninstallStatus::Removed,
        removed,
        kept_shared,
    })
}

fn names_ports_root(item: &str) -> bool {
    item.split(['/', '\\'])
        .all(|segment| segment.is_empty() || segment == ".")
}
