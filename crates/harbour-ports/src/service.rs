//! `Harbour` owns the ports context and publishes immutable registry
//! snapshots. Mutations (install, uninstall, refresh) are serialised behind
//! one lock; readers load the current snapshot without taking it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;

use crate::archive::{validate_port_archive_with_descriptor_name, ArchiveCapture, InstallPlan};
use crate::install::{
    install_port, uninstall_port, InstallReport, NoopPortHook, PortHook, UninstallReport,
};
use crate::registry::{build_registry_snapshot, RegistrySnapshot};
use crate::{PortError, PortsContext};

pub struct Harbour<H: PortHook = NoopPortHook> {
    context: PortsContext,
    hook: H,
    mutation: Mutex<()>,
    snapshot: ArcSwap<RegistrySnapshot>,
}

impl Harbour<NoopPortHook> {
    pub fn new(context: PortsContext) -> Self {
        Self::with_hook(context, NoopPortHook)
    }
}

impl<H: PortHook> Harbour<H> {
    pub fn with_hook(context: PortsContext, hook: H) -> Self {
        Self {
            context,
            hook,
            mutation: Mutex::new(()),
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::empty()),
        }
    }

    pub fn context(&self) -> &PortsContext {
        &self.context
    }

    /// Current registry. Never blocks on an in-flight mutation.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    /// Rebuilds the registry (both phases) and publishes it.
    pub fn refresh(&self) -> Result<Arc<RegistrySnapshot>, PortError> {
        let _guard = lock_or_recover(&self.mutation);
        self.rebuild()
    }

    pub fn validate(
        &self,
        expected_name: &str,
        archive_path: &Path,
        capture: Option<&mut ArchiveCapture>,
    ) -> Result<InstallPlan, PortError> {
        validate_port_archive_with_descriptor_name(
            expected_name,
            archive_path,
            &self.context.descriptor_file_name,
            capture,
        )
    }

    /// Validates, installs and absorbs the port into a fresh snapshot.
    pub fn install(
        &self,
        expected_name: &str,
        archive_path: &Path,
    ) -> Result<InstallReport, PortError> {
        let _guard = lock_or_recover(&self.mutation);
        let plan = self.validate(expected_name, archive_path, None)?;
        let report = install_port(&self.context, &plan, archive_path, &self.hook)?;
        self.rebuild()?;
        Ok(report)
    }

    pub fn uninstall(&self, name: &str) -> Result<UninstallReport, PortError> {
        let _guard = lock_or_recover(&self.mutation);
        let current = self.rebuild()?;
        let report = uninstall_port(&self.context, &current, name, &self.hook)?;
        self.rebuild()?;
        Ok(report)
    }

    fn rebuild(&self) -> Result<Arc<RegistrySnapshot>, PortError> {
        let snapshot = Arc::new(build_registry_snapshot(&self.context)?);
        self.snapshot.store(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::Harbour;
    use crate::archive::tests::build_archive;
    use crate::install::UninstallStatus;
    use crate::{HarbourConfig, PortsContext};

    #[test]
    fn unit_harbour_starts_with_empty_snapshot() {
        let temp = tempdir().expect("tempdir");
        let harbour = Harbour::new(PortsContext::new(temp.path()));
        assert!(harbour.snapshot().ports.is_empty());
        assert_eq!(harbour.snapshot().built_unix, 0);
    }

    #[test]
    fn functional_harbour_install_publishes_new_snapshot_without_touching_held_one() {
        let temp = tempdir().expect("tempdir");
        let ports = temp.path().join("ports");
        let harbour = Harbour::new(PortsContext::new(&ports));
        let before = harbour.refresh().expect("refresh");

        let archive = build_archive(
            temp.path(),
            "cave.zip",
            &[("cave/", ""), ("Cave.sh", "#!/bin/bash\n")],
        );
        harbour.install("cave.zip", &archive).expect("install");

        assert!(before.ports.is_empty());
        let after = harbour.snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.port("cave.zip").is_some_and(|port| port.is_installed()));
        assert!(after.report.unknown_files.is_empty());

        let report = harbour.uninstall("cave.zip").expect("uninstall");
        assert_eq!(report.status, UninstallStatus::Removed);
        assert!(harbour.snapshot().ports.is_empty());
        assert!(!ports.join("Cave.sh").exists());
    }

    #[test]
    fn regression_harbour_install_honours_configured_descriptor_name() {
        let temp = tempdir().expect("tempdir");
        let ports = temp.path().join("ports");
        let harbour = Harbour::new(PortsContext::from_config(HarbourConfig {
            ports_dir: ports.clone(),
            descriptor_file_name: "meta.json".to_string(),
            ..HarbourConfig::default()
        }));

        let archive = build_archive(
            temp.path(),
            "cave.zip",
            &[
                ("cave/", ""),
                ("cave/port.json", r#"{"version": 4, "name": "cave", "items": ["Cave.sh", "cave/"]}"#),
                ("Cave.sh", "#!/bin/bash\n"),
            ],
        );
        let plan = harbour.validate("cave.zip", &archive, None).expect("plan");
        assert_eq!(plan.port_info_file, "cave/meta.json");

        let installed = harbour.install("cave.zip", &archive).expect("install");
        assert_eq!(installed.descriptor_path, ports.join("cave/meta.json"));
        assert!(!ports.join("cave/port.json").exists());
        assert_eq!(
            installed.files,
            vec!["Cave.sh".to_string(), "cave/meta.json".to_string()]
        );

        let snapshot = harbour.snapshot();
        assert!(snapshot.port("cave.zip").is_some_and(|port| port.is_installed()));
        assert!(snapshot.report.unknown_files.is_empty());
        assert!(snapshot.skipped.is_empty());

        let report = harbour.uninstall("cave.zip").expect("uninstall");
        assert_eq!(report.status, UninstallStatus::Removed);
        assert!(!ports.join("cave").exists());
        assert!(!ports.join("Cave.sh").exists());
    }
}
