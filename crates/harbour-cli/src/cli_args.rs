use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "harbour",
    about = "Validate, install and reconcile port packages",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "ports-dir",
        env = "HARBOUR_PORTS_DIR",
        value_name = "path",
        help = "Ports root directory; overrides ports_dir from the config file"
    )]
    pub ports_dir: Option<PathBuf>,

    #[arg(
        long = "config",
        env = "HARBOUR_CONFIG",
        value_name = "path",
        help = "JSON config file (porter fixups, exclusions); missing file means defaults"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "port-validate",
        env = "HARBOUR_PORT_VALIDATE",
        conflicts_with = "port_install",
        conflicts_with = "port_uninstall",
        conflicts_with = "port_scan",
        conflicts_with = "port_show",
        value_name = "zip",
        help = "Validate a port archive without extracting it and exit"
    )]
    pub port_validate: Option<PathBuf>,

    #[arg(
        long = "port-install",
        env = "HARBOUR_PORT_INSTALL",
        conflicts_with = "port_validate",
        conflicts_with = "port_uninstall",
        conflicts_with = "port_scan",
        conflicts_with = "port_show",
        value_name = "zip",
        help = "Validate and install a port archive into the ports root, then reconcile"
    )]
    pub port_install: Option<PathBuf>,

    #[arg(
        long = "port-name",
        env = "HARBOUR_PORT_NAME",
        value_name = "name",
        help = "Port name for --port-validate/--port-install (defaults to the archive file name)"
    )]
    pub port_name: Option<String>,

    #[arg(
        long = "port-uninstall",
        env = "HARBOUR_PORT_UNINSTALL",
        conflicts_with = "port_validate",
        conflicts_with = "port_install",
        conflicts_with = "port_scan",
        conflicts_with = "port_show",
        value_name = "name",
        help = "Remove an installed port, keeping items other ports still claim"
    )]
    pub port_uninstall: Option<String>,

    #[arg(
        long = "port-scan",
        env = "HARBOUR_PORT_SCAN",
        conflicts_with = "port_validate",
        conflicts_with = "port_install",
        conflicts_with = "port_uninstall",
        conflicts_with = "port_show",
        help = "Run both reconciliation phases over the ports root and print the registry"
    )]
    pub port_scan: bool,

    #[arg(
        long = "port-show",
        env = "HARBOUR_PORT_SHOW",
        conflicts_with = "port_validate",
        conflicts_with = "port_install",
        conflicts_with = "port_uninstall",
        conflicts_with = "port_scan",
        value_name = "path",
        help = "Load, migrate and print one port descriptor without rewriting it"
    )]
    pub port_show: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::Cli;

    #[test]
    fn unit_cli_parses_install_with_overrides() {
        let cli = Cli::try_parse_from([
            "harbour",
            "--port-install",
            "/tmp/cave.zip",
            "--port-name",
            "Cave.zip",
            "--ports-dir",
            "/roms/ports",
        ])
        .expect("parse");
        assert_eq!(cli.port_install, Some(PathBuf::from("/tmp/cave.zip")));
        assert_eq!(cli.port_name.as_deref(), Some("Cave.zip"));
        assert_eq!(cli.ports_dir, Some(PathBuf::from("/roms/ports")));
        assert!(!cli.port_scan);
    }

    #[test]
    fn regression_cli_rejects_conflicting_commands() {
        let error = Cli::try_parse_from([
            "harbour",
            "--port-scan",
            "--port-uninstall",
            "cave.zip",
        ])
        .expect_err("conflict");
        assert_eq!(error.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
