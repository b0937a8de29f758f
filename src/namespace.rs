/// Namespace flag set and mount-namespace setup for the outer stage
use crate::types::{ContainerError, Result};
use nix::mount::{mount, MsFlags};
use nix::sched::CloneFlags;
use std::fs;

/// Namespaces every container gets: mount, UTS, PID, IPC and network
pub fn container_namespaces() -> CloneFlags {
    CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWIPC
        | CloneFlags::CLONE_NEWNET
}

/// Check if namespace isolation is supported on this system
pub fn is_supported() -> bool {
    fs::read_dir("/proc/self/ns").is_ok()
}

/// Human readable names of the namespaces in `flags`
pub fn enabled_namespaces(flags: CloneFlags) -> Vec<&'static str> {
    let known = [
        (CloneFlags::CLONE_NEWNS, "Mount"),
        (CloneFlags::CLONE_NEWUTS, "UTS"),
        (CloneFlags::CLONE_NEWPID, "PID"),
        (CloneFlags::CLONE_NEWIPC, "IPC"),
        (CloneFlags::CLONE_NEWNET, "Network"),
        (CloneFlags::CLONE_NEWUSER, "User"),
    ];

    known
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| *name)
        .collect()
}

/// Make every mount in the current mount namespace private.
///
/// Must run inside a freshly created mount namespace, otherwise the host's
/// propagation settings are changed.
pub fn make_mounts_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| ContainerError::Mount(format!("Failed to make root filesystem private: {}", e)))
}

/// Read a namespace identifier such as `pid:[4026531836]` from /proc/self/ns/
pub fn namespace_id(ns_type: &str) -> Result<String> {
    let ns_path = format!("/proc/self/ns/{}", ns_type);
    match fs::read_link(&ns_path) {
        Ok(link) => Ok(link.to_string_lossy().to_string()),
        Err(e) => Err(ContainerError::Process(format!(
            "Failed to read namespace {}: {}",
            ns_type, e
        ))),
    }
}
