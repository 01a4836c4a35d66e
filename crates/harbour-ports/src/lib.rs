//! Port package engine: descriptor loading and migration, archive
//! validation, embedded ownership signatures, two-phase registry
//! reconciliation, and the installer collaborators built on top of them.

pub mod archive;
pub mod config;
pub mod descriptor;
mod error;
pub mod install;
pub mod registry;
pub mod service;
pub mod signature;

pub use archive::{
    validate_port_archive, validate_port_archive_with_descriptor_name, ArchiveCapture,
    ArchiveEntry, InstallPlan,
};
pub use config::{load_harbour_config, HarbourConfig, PortsContext};
pub use descriptor::{
    default_port_descriptor, load_port_descriptor, write_port_descriptor, DescriptorSource,
    LoadedDescriptor, NameList, PortDescriptor,
};
pub use error::{ArchiveViolation, PortError};
pub use install::{
    install_port, uninstall_port, InstallReport, NoopPortHook, PortHook, UninstallReport,
    UninstallStatus,
};
pub use registry::{
    build_registry_snapshot, declare_ports, reconcile_ports, DeclaredPorts, ItemOwners,
    ReconcileReport, RegistrySnapshot,
};
pub use service::Harbour;
pub use signature::{
    clear_signature, inspect_signature, read_signature, write_signature, OwnershipSignature,
    SignatureState, SignatureWrite,
};
