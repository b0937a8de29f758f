//! cellbox: a minimal container launcher
//! Spawns a command inside new namespaces, a cgroup and a chroot, and cleans up after it

pub mod cgroup;
pub mod cleanup;
pub mod cli;
pub mod filesystem;
pub mod launcher;
pub mod namespace;
pub mod stack;
pub mod types;

pub use launcher::{launch, LaunchState, Launcher};
pub use types::{ContainerConfig, ContainerError, ContainerSpec, ResourceLimits, Result};
