use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use harbour_ports::{
    read_signature, validate_port_archive, ArchiveCapture, Harbour, OwnershipSignature,
    PortsContext, UninstallStatus,
};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn write_archive(dir: &Path, name: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).expect("create archive");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (entry, content) in entries {
        if entry.ends_with('/') {
            writer
                .add_directory(entry.to_string(), options)
                .expect("add directory");
        } else {
            writer
                .start_file(entry.to_string(), options)
                .expect("start file");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
    }
    writer.finish().expect("finish archive");
    path
}

#[test]
fn integration_validate_install_reconcile_rename_uninstall() {
    let temp = tempdir().expect("tempdir");
    let ports = temp.path().join("ports");
    let harbour = Harbour::new(PortsContext::new(&ports));

    let cave = write_archive(
        temp.path(),
        "cave.zip",
        &[
            ("cave/", ""),
            ("port.json", r#"{"version": 2, "name": "cave", "items": ["Cave Story.sh", "cave/", "shared/"], "attr": {"title": "Cave Story", "porter": "someone"}}"#),
            ("shared/lib.so", "lib"),
            ("Cave Story.sh", "#!/bin/bash\necho cave\n"),
        ],
    );
    let other = write_archive(
        temp.path(),
        "other.zip",
        &[
            ("other/port.json", r#"{"version": 4, "name": "other", "items": ["Other.sh", "other/", "shared/"], "items_opt": [], "attr": {"porter": ["x"]}}"#),
            ("shared/lib.so", "lib"),
            ("Other.sh", "#!/bin/bash\necho other\n"),
        ],
    );

    let mut capture = ArchiveCapture::default();
    let plan = harbour
        .validate("cave.zip", &cave, Some(&mut capture))
        .expect("validate cave");
    assert_eq!(plan.descriptor.name, "cave.zip");
    assert_eq!(capture.relocated_from.as_deref(), Some("port.json"));

    harbour.install("cave.zip", &cave).expect("install cave");
    harbour.install("other.zip", &other).expect("install other");

    let snapshot = harbour.snapshot();
    assert_eq!(snapshot.ports.len(), 2);
    assert!(snapshot
        .owners("shared/")
        .is_some_and(|owners| owners.contains("cave.zip") && owners.contains("other.zip")));
    assert!(snapshot.report.unknown_files.is_empty());
    assert!(snapshot.report.file_renames.is_empty());

    std::fs::rename(ports.join("Cave Story.sh"), ports.join("Cave.sh")).expect("rename");
    std::fs::write(ports.join("notes.sh"), "#!/bin/bash\n").expect("stray");

    let refreshed = harbour.refresh().expect("refresh");
    assert_eq!(
        refreshed.report.file_renames,
        BTreeMap::from([("Cave Story.sh".to_string(), "Cave.sh".to_string())])
    );
    assert_eq!(refreshed.report.unknown_files, vec!["notes.sh".to_string()]);
    assert_eq!(
        read_signature(&ports.join("Cave.sh")),
        Some(OwnershipSignature {
            current_name: "Cave.sh".to_string(),
            original_name: "Cave Story.sh".to_string(),
            owner: "cave.zip".to_string(),
        })
    );

    let stable = harbour.refresh().expect("refresh again");
    assert!(stable.report.file_renames.is_empty());
    assert!(stable.report.stamped.is_empty());
    assert_eq!(stable.report.unknown_files, refreshed.report.unknown_files);

    let removed = harbour.uninstall("cave.zip").expect("uninstall cave");
    assert_eq!(removed.status, UninstallStatus::Removed);
    assert!(ports.join("shared/lib.so").exists());
    assert!(!ports.join("cave").exists());
    assert!(ports.join("Other.sh").exists());
    assert!(harbour.snapshot().port("cave.zip").is_none());
}

#[test]
fn integration_hostile_archive_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let ports = temp.path().join("ports");
    let harbour = Harbour::new(PortsContext::new(&ports));
    let hostile = write_archive(
        temp.path(),
        "evil.zip",
        &[
            ("evil/", ""),
            ("Evil.sh", "#!/bin/bash\n"),
            ("evil/../../escape.sh", "#!/bin/bash\n"),
        ],
    );

    assert!(validate_port_archive("evil.zip", &hostile, None).is_err());
    assert!(harbour.install("evil.zip", &hostile).is_err());
    assert!(!ports.exists());
    assert!(!temp.path().join("escape.sh").exists());
}
