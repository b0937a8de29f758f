/// Command line interface for cellbox
use crate::types::{ContainerConfig, ContainerError, ContainerSpec, EXIT_SETUP_FAILED};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cellbox", author, version)]
#[command(about = "Run a command in fresh namespaces, a cgroup and a chroot", long_about = None)]
pub struct Cli {
    /// Directory that becomes the container's root filesystem
    pub root: PathBuf,

    /// Command and arguments to run inside the container, passed through unchanged
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    pub fn into_spec(self) -> anyhow::Result<ContainerSpec> {
        let mut command = self.command.into_iter();
        let program = command
            .next()
            .ok_or_else(|| ContainerError::Config("No command given".to_string()))?;

        ContainerSpec::new(&self.root, program, command.collect())
            .with_context(|| format!("Cannot launch a container from {}", self.root.display()))
    }
}

/// Build the spec and run the container, returning its exit status
pub fn run(cli: Cli) -> anyhow::Result<i32> {
    let spec = cli.into_spec()?;
    let config = ContainerConfig::default();
    log::debug!("Launching {:?} with {:?}", spec, config);

    let code = crate::launcher::launch(&config, &spec).context("Container launch failed")?;
    Ok(code)
}

/// Exit status for an error that stopped the launch before the container ran
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ContainerError>()
        .map(ContainerError::exit_code)
        .unwrap_or(EXIT_SETUP_FAILED)
}

/// Problems that will likely make the launch fail, worth telling the user up front
pub fn preflight_warnings(is_root: bool) -> Vec<String> {
    let mut warnings = Vec::new();

    if !is_root {
        warnings.push(
            "cellbox needs root privileges to create namespaces, cgroups and mounts".to_string(),
        );
    }
    if !crate::namespace::is_supported() {
        warnings.push("Namespace support not detected (/proc/self/ns missing)".to_string());
    }
    if !crate::cgroup::cgroups_available() {
        warnings.push("Cgroup filesystem not found at /sys/fs/cgroup".to_string());
    }

    warnings
}
