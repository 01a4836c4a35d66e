use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Names the archive rule a rejected port archive violated.
pub enum ArchiveViolation {
    #[error("entry '{0}' escapes the port directory")]
    PathEscape(String),
    #[error("archive contains no directory")]
    MissingDirectory,
    #[error("archive contains no top-level script")]
    MissingScript,
    #[error("port descriptor is malformed: {0}")]
    MalformedDescriptor(String),
    #[error("archive could not be read: {0}")]
    Unreadable(String),
}

#[derive(Debug, Error)]
/// Enumerates supported `PortError` values.
pub enum PortError {
    #[error("invalid port archive {archive}: {violation}")]
    InvalidArchive {
        archive: PathBuf,
        violation: ArchiveViolation,
    },
    #[error(
        "port descriptor {source_name} uses schema version {found} but only {latest} is supported; harbour needs an update"
    )]
    UnsupportedSchema {
        source_name: String,
        found: u64,
        latest: u32,
    },
    #[error("malformed port descriptor {source_name}: {detail}")]
    MalformedDescriptor { source_name: String, detail: String },
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist {path}: {detail}")]
    Persist { path: PathBuf, detail: String },
    #[error("cannot sign {path}: {detail}")]
    Signature { path: PathBuf, detail: String },
    #[error("platform hook failed for port {port}: {detail}")]
    Hook { port: String, detail: String },
}

impl PortError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_archive(archive: impl Into<PathBuf>, violation: ArchiveViolation) -> Self {
        Self::InvalidArchive {
            archive: archive.into(),
            violation,
        }
    }

    pub(crate) fn malformed(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn hook(port: impl Into<String>, error: anyhow::Error) -> Self {
        Self::Hook {
            port: port.into(),
            detail: format!("{error:#}"),
        }
    }

    pub(crate) fn persist(path: impl Into<PathBuf>, error: anyhow::Error) -> Self {
        Self::Persist {
            path: path.into(),
            detail: format!("{error:#}"),
        }
    }
}
