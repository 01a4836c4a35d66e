use std::path::Path;

use anyhow::{Context, Result};
use harbour_ports::{
    load_harbour_config, load_port_descriptor, ArchiveCapture, Harbour, HarbourConfig,
    InstallPlan, InstallReport, LoadedDescriptor, PortsContext, RegistrySnapshot,
    UninstallReport,
};

use crate::cli_args::Cli;

pub(crate) fn run_cli(cli: &Cli) -> Result<()> {
    execute_port_validate_command(cli)?;
    execute_port_install_command(cli)?;
    execute_port_uninstall_command(cli)?;
    execute_port_scan_command(cli)?;
    execute_port_show_command(cli)?;
    Ok(())
}

pub(crate) fn resolve_ports_context(cli: &Cli) -> Result<PortsContext> {
    let mut config = match cli.config.as_deref() {
        Some(path) => load_harbour_config(path)?,
        None => HarbourConfig::default(),
    };
    if let Some(ports_dir) = cli.ports_dir.as_ref() {
        config.ports_dir = ports_dir.clone();
    }
    tracing::debug!(
        ports_dir = %config.ports_dir.display(),
        fixups = config.porter_fixups.len(),
        "resolved ports context"
    );
    Ok(PortsContext::from_config(config))
}

fn resolve_port_name(cli: &Cli, archive_path: &Path) -> Result<String> {
    if let Some(name) = cli.port_name.as_deref() {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("--port-name must be non-empty");
        }
        return Ok(name.to_string());
    }
    archive_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| {
            format!(
                "cannot derive a port name from '{}'; pass --port-name",
                archive_path.display()
            )
        })
}

pub(crate) fn execute_port_validate_command(cli: &Cli) -> Result<()> {
    let Some(archive_path) = cli.port_validate.as_deref() else {
        return Ok(());
    };
    let name = resolve_port_name(cli, archive_path)?;
    let harbour = Harbour::new(resolve_ports_context(cli)?);
    let mut capture = ArchiveCapture::default();
    let plan = harbour
        .validate(&name, archive_path, Some(&mut capture))
        .with_context(|| format!("port archive {} rejected", archive_path.display()))?;
    println!("{}", render_port_validate_report(archive_path, &plan, &capture));
    Ok(())
}

pub(crate) fn execute_port_install_command(cli: &Cli) -> Result<()> {
    let Some(archive_path) = cli.port_install.as_deref() else {
        return Ok(());
    };
    let name = resolve_port_name(cli, archive_path)?;
    let harbour = Harbour::new(resolve_ports_context(cli)?);
    let report = harbour
        .install(&name, archive_path)
        .with_context(|| format!("failed to install {}", archive_path.display()))?;
    println!("{}", render_port_install_report(&report));
    println!(
        "{}",
        render_port_scan_report(&harbour.context().ports_dir, &harbour.snapshot())
    );
    Ok(())
}

pub(crate) fn execute_port_uninstall_command(cli: &Cli) -> Result<()> {
    let Some(name) = cli.port_uninstall.as_deref() else {
        return Ok(());
    };
    let harbour = Harbour::new(resolve_ports_context(cli)?);
    let report = harbour
        .uninstall(name)
        .with_context(|| format!("failed to uninstall port '{name}'"))?;
    println!("{}", render_port_uninstall_report(&report));
    Ok(())
}

pub(crate) fn execute_port_scan_command(cli: &Cli) -> Result<()> {
    if !cli.port_scan {
        return Ok(());
    }
    let harbour = Harbour::new(resolve_ports_context(cli)?);
    let snapshot = harbour.refresh().with_context(|| {
        format!(
            "failed to reconcile ports under {}",
            harbour.context().ports_dir.display()
        )
    })?;
    println!(
        "{}",
        render_port_scan_report(&harbour.context().ports_dir, &snapshot)
    );
    Ok(())
}

pub(crate) fn execute_port_show_command(cli: &Cli) -> Result<()> {
    let Some(path) = cli.port_show.as_deref() else {
        return Ok(());
    };
    let loaded = load_port_descriptor(path, None, false)
        .with_context(|| format!("failed to load port descriptor {}", path.display()))?;
    println!("{}", render_port_show_report(path, &loaded));
    Ok(())
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(",")
    }
}

pub(crate) fn render_port_validate_report(
    archive_path: &Path,
    plan: &InstallPlan,
    capture: &ArchiveCapture,
) -> String {
    let mut lines = vec![format!(
        "port validate: archive={} name={} port_dir={} descriptor={} relocated_from={} entries={} scripts={} gameinfo={}",
        archive_path.display(),
        plan.descriptor.name,
        plan.port_dir,
        plan.port_info_file,
        plan.relocated_from.as_deref().unwrap_or("none"),
        plan.entries.len(),
        join_or_none(&plan.scripts),
        capture.gameinfo_xml.as_deref().unwrap_or("none"),
    )];
    for item in &plan.descriptor.items {
        lines.push(format!("item: path={item} optional=false"));
    }
    for item in &plan.descriptor.items_opt {
        lines.push(format!("item: path={item} optional=true"));
    }
    lines.join("\n")
}

pub(crate) fn render_port_install_report(report: &InstallReport) -> String {
    format!(
        "port install: name={} descriptor={} files={} directories={} stamped={} relocated={}",
        report.name,
        report.descriptor_path.display(),
        report.files.len(),
        report.directories,
        join_or_none(&report.stamped),
        report.relocated_descriptor
    )
}

pub(crate) fn render_port_uninstall_report(report: &UninstallReport) -> String {
    let mut lines = vec![format!(
        "port uninstall: name={} status={} removed={} kept_shared={}",
        report.name,
        report.status.as_str(),
        report.removed.len(),
        report.kept_shared.len()
    )];
    for item in &report.kept_shared {
        lines.push(format!("kept: path={item}"));
    }
    lines.join("\n")
}

pub(crate) fn render_port_scan_report(ports_dir: &Path, snapshot: &RegistrySnapshot) -> String {
    let report = &snapshot.report;
    let mut lines = vec![format!(
        "port scan: root={} ports={} items={} skipped={} unknown={} renames={} stamped={} orphaned={} failures={} rewritten={}",
        ports_dir.display(),
        snapshot.ports.len(),
        snapshot.items.len(),
        snapshot.skipped.len(),
        report.unknown_files.len(),
        report.file_renames.len(),
        report.stamped.len(),
        report.orphaned_files.len(),
        report.failures.len(),
        report.rewritten_descriptors.len()
    )];
    if snapshot.ports.is_empty() {
        lines.push("ports: none".to_string());
    }
    for (name, descriptor) in &snapshot.ports {
        lines.push(format!(
            "port: name={} title={} installed={} items={}",
            name,
            descriptor.attr.title,
            descriptor.is_installed(),
            descriptor.items.len() + descriptor.items_opt.len()
        ));
    }
    for (original, current) in &report.file_renames {
        lines.push(format!("rename: from={original} to={current}"));
    }
    for unknown in &report.unknown_files {
        lines.push(format!("unknown: path={unknown}"));
    }
    for (file, owner) in &report.orphaned_files {
        lines.push(format!("orphan: path={file} owner={owner}"));
    }
    for skipped in &snapshot.skipped {
        lines.push(format!(
            "skipped: path={} error={}",
            skipped.path.display(),
            skipped.error
        ));
    }
    for failure in &report.failures {
        lines.push(format!(
            "failure: path={} error={}",
            failure.path.display(),
            failure.error
        ));
    }
    lines.join("\n")
}

pub(crate) fn render_port_show_report(path: &Path, loaded: &LoadedDescriptor) -> String {
    let descriptor = &loaded.descriptor;
    format!(
        "port show: path={} name={} version={} changed={} title={} porter={} runtime={} reqs={} genres={} items={} items_opt={} installed={}",
        path.display(),
        descriptor.name,
        descriptor.schema_version,
        loaded.changed,
        descriptor.attr.title,
        join_or_none(&descriptor.attr.porter),
        join_or_none(&descriptor.attr.runtime),
        join_or_none(&descriptor.attr.reqs),
        join_or_none(&descriptor.attr.genres),
        join_or_none(&descriptor.items),
        join_or_none(&descriptor.items_opt),
        descriptor.is_installed()
    )
}
