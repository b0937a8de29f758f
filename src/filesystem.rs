/// Root filesystem and environment switch performed by the inner stage
use crate::types::{ContainerConfig, ContainerError, ContainerSpec, Result};
use nix::errno::Errno;
use nix::mount::{mount, MsFlags};
use nix::unistd::{chdir, chroot, sethostname};
use std::env;
use std::ffi::CString;
use std::path::Path;

/// Switches the calling process into the container's root and environment
pub struct RootSwitch<'a> {
    config: &'a ContainerConfig,
    spec: &'a ContainerSpec,
}

impl<'a> RootSwitch<'a> {
    pub fn new(config: &'a ContainerConfig, spec: &'a ContainerSpec) -> Self {
        Self { config, spec }
    }

    /// Chroot, chdir to `/`, reset the environment, set the hostname and mount proc.
    ///
    /// Returns the argv of the command to exec. The root change comes first so
    /// the proc mount target resolves inside the new root.
    pub fn prepare(&self) -> Result<Vec<CString>> {
        apply_chroot(&self.spec.root)?;
        reset_environment(&self.config.environment)?;
        set_hostname(&self.config.hostname)?;
        mount_proc(&self.config.proc_mount)?;

        log::debug!(
            "Switched to root {} as host {}",
            self.spec.root.display(),
            self.config.hostname
        );

        self.spec.argv()
    }
}

/// Change the filesystem root and move to its top
pub fn apply_chroot(root: &Path) -> Result<()> {
    chroot(root).map_err(|e| match e {
        Errno::ENOENT | Errno::ENOTDIR => ContainerError::MissingRoot(root.to_path_buf()),
        _ => ContainerError::Process(format!("chroot to {} failed: {}", root.display(), e)),
    })?;

    chdir("/").map_err(|e| {
        ContainerError::Process(format!("Failed to change to chroot root: {}", e))
    })
}

/// Drop every inherited variable, then set `vars` without overwriting.
///
/// Clears with `clearenv(3)` so entries `unsetenv` rejects (such as `=x=1`)
/// go away too.
pub fn reset_environment(vars: &[(String, String)]) -> Result<()> {
    // Only the inner stage calls this, after clone, with no other threads alive
    unsafe { nix::env::clearenv() }
        .map_err(|e| ContainerError::Process(format!("Failed to clear environment: {}", e)))?;

    for (key, value) in vars {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
        }
    }

    Ok(())
}

pub fn set_hostname(hostname: &str) -> Result<()> {
    sethostname(hostname)
        .map_err(|e| ContainerError::Process(format!("Failed to set hostname {}: {}", hostname, e)))
}

/// Mount a fresh proc filesystem at `target`
pub fn mount_proc(target: &Path) -> Result<()> {
    mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| ContainerError::Mount(format!("Failed to mount proc at {}: {}", target.display(), e)))
}
