/// Cgroup setup for the outer stage
use crate::types::{ContainerError, ResourceLimits, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PROCS_FILE: &str = "cgroup.procs";
const NOTIFY_ON_RELEASE_FILE: &str = "notify_on_release";
const PIDS_MAX_FILE: &str = "pids.max";
const MEMORY_LIMIT_FILE: &str = "memory.limit_in_bytes";

/// A cgroup directory that one process has enrolled itself into
#[derive(Debug)]
pub struct ResourceGroup {
    cgroup_path: PathBuf,
}

impl ResourceGroup {
    /// Create (or reuse) the cgroup at `cgroup_path`, enroll `pid` and write the limits.
    ///
    /// Membership is written first so the limits cover the enrolled process.
    /// A directory left over from a previous run is reused as is.
    pub fn establish(cgroup_path: &Path, pid: u32, limits: &ResourceLimits) -> Result<Self> {
        match fs::create_dir(cgroup_path) {
            Ok(_) => log::debug!("Created cgroup {}", cgroup_path.display()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                log::debug!("Reusing cgroup {}", cgroup_path.display())
            }
            Err(e) => {
                return Err(ContainerError::Cgroup(format!(
                    "Failed to create cgroup directory {}: {}",
                    cgroup_path.display(),
                    e
                )))
            }
        }

        let group = Self {
            cgroup_path: cgroup_path.to_path_buf(),
        };

        group.append_cgroup_file(PROCS_FILE, &pid.to_string())?;
        group.append_cgroup_file(
            NOTIFY_ON_RELEASE_FILE,
            if limits.notify_on_release { "1" } else { "0" },
        )?;
        group.append_cgroup_file(PIDS_MAX_FILE, &limits.max_processes.to_string())?;
        group.append_cgroup_file(MEMORY_LIMIT_FILE, &limits.memory_limit_bytes.to_string())?;

        log::info!(
            "Process {} enrolled in cgroup {} (pids.max={}, memory={} bytes)",
            pid,
            cgroup_path.display(),
            limits.max_processes,
            limits.memory_limit_bytes
        );

        Ok(group)
    }

    pub fn path(&self) -> &Path {
        &self.cgroup_path
    }

    /// Process ids currently listed in the membership file
    pub fn processes(&self) -> Result<Vec<u32>> {
        let content = self.read_cgroup_file(PROCS_FILE)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.trim().parse().map_err(|e| {
                    ContainerError::Cgroup(format!("Failed to parse pid {:?}: {}", line, e))
                })
            })
            .collect()
    }

    fn append_cgroup_file(&self, filename: &str, content: &str) -> Result<()> {
        let file_path = self.cgroup_path.join(filename);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&file_path)
            .map_err(|e| ContainerError::Cgroup(format!("Failed to open {}: {}", filename, e)))?;

        writeln!(file, "{}", content)
            .map_err(|e| ContainerError::Cgroup(format!("Failed to write {}: {}", filename, e)))
    }

    fn read_cgroup_file(&self, filename: &str) -> Result<String> {
        let file_path = self.cgroup_path.join(filename);
        fs::read_to_string(file_path)
            .map_err(|e| ContainerError::Cgroup(format!("Failed to read {}: {}", filename, e)))
    }
}

pub fn cgroups_available() -> bool {
    Path::new("/sys/fs/cgroup").exists()
}
