//! Structural validation of untrusted port archives.
//!
//! Nothing is extracted here. Every entry name is checked before any content
//! is read, so a single hostile entry rejects the whole archive.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use zip::ZipArchive;

use crate::descriptor::{
    default_port_descriptor, is_safe_relative_path, load_port_descriptor, PortDescriptor,
    DESCRIPTOR_FILE_NAME,
};
use crate::{ArchiveViolation, PortError};

pub const MAX_DESCRIPTOR_BYTES: u64 = 1024 * 1024;
pub const GAMEINFO_FILE_NAME: &str = "gameinfo.xml";
const SCRIPT_EXTENSION: &str = "sh";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Side information surfaced to the caller while validating.
pub struct ArchiveCapture {
    pub port_dir: Option<String>,
    pub port_info_file: Option<String>,
    /// Set when the descriptor sits at the archive root and must move into `port_dir`.
    pub relocated_from: Option<String>,
    pub gameinfo_xml: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub index: usize,
    /// Normalized name: `/` separators, no leading `./`.
    pub name: String,
    pub is_dir: bool,
    pub unix_mode: Option<u32>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
/// Validated archive layout, independent of which descriptor layout the archive used.
pub struct InstallPlan {
    pub descriptor: PortDescriptor,
    /// Top-level port directory with a trailing `/`.
    pub port_dir: String,
    pub port_info_file: String,
    /// Archive entry the descriptor was read from, if any.
    pub descriptor_entry: Option<String>,
    pub relocated_from: Option<String>,
    pub entries: Vec<ArchiveEntry>,
    /// Top-level launcher scripts.
    pub scripts: Vec<String>,
}

impl InstallPlan {
    /// Destination of an entry relative to the ports root, after relocation.
    pub fn destination_name<'a>(&'a self, entry: &'a ArchiveEntry) -> &'a str {
        match self.descriptor_entry.as_deref() {
            Some(descriptor) if descriptor == entry.name => self.port_info_file.as_str(),
            _ => entry.name.as_str(),
        }
    }
}

fn normalize_entry_name(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let mut name = unified.as_str();
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name.to_string()
}

fn is_script_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

fn unreadable(archive_path: &Path, error: impl std::fmt::Display) -> PortError {
    PortError::invalid_archive(archive_path, ArchiveViolation::Unreadable(error.to_string()))
}

/// Validates `archive_path` as an installable port named `expected_name`.
pub fn validate_port_archive(
    expected_name: &str,
    archive_path: &Path,
    capture: Option<&mut ArchiveCapture>,
) -> Result<InstallPlan, PortError> {
    validate_port_archive_with_descriptor_name(
        expected_name,
        archive_path,
        DESCRIPTOR_FILE_NAME,
        capture,
    )
}

/// Like [`validate_port_archive`], for a ports tree whose descriptors are named
/// `descriptor_file_name`. Archives shipping `port.json` instead are still
/// accepted; their descriptor is installed under the configured name.
#[tracing::instrument(
    name = "harbour.archive.validate",
    skip(capture),
    fields(archive = %archive_path.display())
)]
pub fn validate_port_archive_with_descriptor_name(
    expected_name: &str,
    archive_path: &Path,
    descriptor_file_name: &str,
    capture: Option<&mut ArchiveCapture>,
) -> Result<InstallPlan, PortError> {
    if !is_plain_file_name(descriptor_file_name) {
        return Err(PortError::invalid_archive(
            archive_path,
            ArchiveViolation::PathEscape(descriptor_file_name.to_string()),
        ));
    }
    let file = File::open(archive_path).map_err(|error| PortError::filesystem(archive_path, error))?;
    let mut archive = ZipArchive::new(file).map_err(|error| unreadable(archive_path, error))?;

    let entries = enumerate_entries(&mut archive, archive_path)?;

    let mut directories = BTreeSet::new();
    let mut scripts = Vec::new();
    for entry in &entries {
        match entry.name.split_once('/') {
            Some((head, _)) => {
                directories.insert(format!("{head}/"));
            }
            None if entry.is_dir => {
                directories.insert(format!("{}/", entry.name));
            }
            None if is_script_name(&entry.name) => scripts.push(entry.name.clone()),
            None => {}
        }
    }
    let Some(first_dir) = directories.iter().next().cloned() else {
        return Err(PortError::invalid_archive(
            archive_path,
            ArchiveViolation::MissingDirectory,
        ));
    };
    if scripts.is_empty() {
        return Err(PortError::invalid_archive(
            archive_path,
            ArchiveViolation::MissingScript,
        ));
    }
    scripts.sort();

    let mut located = locate_descriptor(&entries, descriptor_file_name);
    if matches!(located, (None, None)) && descriptor_file_name != DESCRIPTOR_FILE_NAME {
        located = locate_descriptor(&entries, DESCRIPTOR_FILE_NAME);
    }

    let (port_dir, descriptor_entry, relocated_from) = match located {
        (Some(entry), _) => {
            let port_dir = entry
                .name
                .split_once('/')
                .map(|(head, _)| format!("{head}/"))
                .unwrap_or_else(|| first_dir.clone());
            (port_dir, Some(entry), None)
        }
        (None, Some(entry)) => (first_dir, Some(entry), Some(entry.name.clone())),
        (None, None) => (first_dir, None, None),
    };
    let port_info_file = format!("{port_dir}{descriptor_file_name}");

    let mut descriptor = match descriptor_entry {
        Some(entry) => {
            let bytes = read_descriptor_bytes(&mut archive, archive_path, entry)?;
            let loaded = load_port_descriptor(bytes, Some(entry.name.as_str()), false).map_err(
                |error| match error {
                    PortError::MalformedDescriptor { detail, .. } => PortError::invalid_archive(
                        archive_path,
                        ArchiveViolation::MalformedDescriptor(detail),
                    ),
                    other => other,
                },
            )?;
            loaded.descriptor
        }
        None => {
            tracing::debug!(port = expected_name, "archive ships no descriptor; using default");
            default_port_descriptor(expected_name)
        }
    };
    descriptor.name = expected_name.to_string();
    if descriptor.items.is_empty() && descriptor.items_opt.is_empty() {
        descriptor.items = scripts.iter().cloned().chain(directories.iter().cloned()).collect();
    }

    let gameinfo_name = format!("{port_dir}{GAMEINFO_FILE_NAME}");
    let gameinfo_xml = entries
        .iter()
        .any(|entry| !entry.is_dir && entry.name == gameinfo_name)
        .then_some(gameinfo_name);

    if let Some(capture) = capture {
        capture.port_dir = Some(port_dir.clone());
        capture.port_info_file = Some(port_info_file.clone());
        capture.relocated_from = relocated_from.clone();
        capture.gameinfo_xml = gameinfo_xml;
    }

    tracing::debug!(
        port = expected_name,
        port_dir = %port_dir,
        entries = entries.len(),
        scripts = scripts.len(),
        relocated = relocated_from.is_some(),
        "port archive validated"
    );
    Ok(InstallPlan {
        descriptor,
        port_dir,
        port_info_file,
        descriptor_entry: descriptor_entry.map(|entry| entry.name.clone()),
        relocated_from,
        entries,
        scripts,
    })
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// First `<dir>/<file_name>` by entry name, and the root-level `<file_name>`.
fn locate_descriptor<'a>(
    entries: &'a [ArchiveEntry],
    file_name: &str,
) -> (Option<&'a ArchiveEntry>, Option<&'a ArchiveEntry>) {
    let nested = entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .filter(|entry| {
            entry
                .name
                .split_once('/')
                .is_some_and(|(_, rest)| rest == file_name)
        })
        .min_by(|left, right| left.name.cmp(&right.name));
    let root = entries
        .iter()
        .find(|entry| !entry.is_dir && entry.name == file_name);
    (nested, root)
}

fn enumerate_entries<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
) -> Result<Vec<ArchiveEntry>, PortError> {
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .map_err(|error| unreadable(archive_path, error))?;
        let raw_name = file.name().to_string();
        let name = normalize_entry_name(&raw_name);
        // `./` entries describe the archive root itself.
        if name.is_empty() || name == "." {
            continue;
        }
        if !is_safe_relative_path(&raw_name) {
            tracing::warn!(
                archive = %archive_path.display(),
                entry = %raw_name,
                "rejecting archive with escaping entry"
            );
            return Err(PortError::invalid_archive(
                archive_path,
                ArchiveViolation::PathEscape(raw_name),
            ));
        }
        entries.push(ArchiveEntry {
            index,
            is_dir: file.is_dir() || name.ends_with('/'),
            unix_mode: file.unix_mode(),
            size: file.size(),
            name,
        });
    }
    Ok(entries)
}

fn read_descriptor_bytes<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    entry: &ArchiveEntry,
) -> Result<Vec<u8>, PortError> {
    if entry.size > MAX_DESCRIPTOR_BYTES {
        return Err(PortError::invalid_archive(
            archive_path,
            ArchiveViolation::MalformedDescriptor(format!(
                "{} is {} bytes; limit is {MAX_DESCRIPTOR_BYTES}",
                entry.name, entry.size
            )),
        ));
    }
    let file = archive
        .by_index(entry.index)
        .map_err(|error| unreadable(archive_path, error))?;
    let mut bytes = Vec::new();
    file.take(MAX_DESCRIPTOR_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|error| unreadable(archive_path, error))?;
    if bytes.len() as u64 > MAX_DESCRIPTOR_BYTES {
        return Err(PortError::invalid_archive(
            archive_path,
            ArchiveViolation::MalformedDescriptor(format!(
                "{} exceeds {MAX_DESCRIPTOR_BYTES} bytes",
                entry.name
            )),
        ));
    }
    Ok(bytes)
}
