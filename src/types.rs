/// Core types and structures for the cellbox launcher
use nix::sched::CloneFlags;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cgroup directory shared by every container instance
pub const DEFAULT_CGROUP_DIR: &str = "/sys/fs/cgroup/container";
/// Hostname visible inside the UTS namespace
pub const DEFAULT_HOSTNAME: &str = "container";
/// Mount point of the proc filesystem, relative to the new root
pub const PROC_MOUNT_POINT: &str = "/proc";
/// Stack handed to each cloned stage
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Exit status of a stage whose setup failed before the command ran
pub const EXIT_SETUP_FAILED: i32 = 125;
/// Exit status of the inner stage when the command could not be executed
pub const EXIT_EXEC_FAILED: i32 = 127;
/// Exit status after a fatal stack allocation failure
pub const EXIT_ALLOC_FAILED: i32 = 1;

/// What to run and where. Built once by the entry point, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Directory that becomes `/` for the command
    pub root: PathBuf,
    /// Program name, resolved through `PATH` inside the container
    pub command: String,
    /// Arguments passed after the program name
    pub args: Vec<String>,
}

impl ContainerSpec {
    /// Validate and build a spec.
    ///
    /// The root must be an existing directory, the command must be non-empty
    /// and no element may contain an interior NUL byte. The root is stored
    /// canonicalized so both stages resolve it the same way.
    pub fn new(root: impl Into<PathBuf>, command: impl Into<String>, args: Vec<String>) -> Result<Self> {
        let root = root.into();
        let command = command.into();

        if !root.is_dir() {
            return Err(ContainerError::MissingRoot(root));
        }
        if command.is_empty() {
            return Err(ContainerError::Config("Command must not be empty".to_string()));
        }

        let root = root.canonicalize()?;
        let spec = Self { root, command, args };
        spec.argv()?;
        Ok(spec)
    }

    /// Command followed by its arguments, in the form `execvp` expects
    pub fn argv(&self) -> Result<Vec<CString>> {
        std::iter::once(&self.command)
            .chain(self.args.iter())
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|e| {
                    ContainerError::Config(format!("Argument {:?} contains a NUL byte: {}", arg, e))
                })
            })
            .collect()
    }

    /// Where the proc mount made inside the new root lives, seen from outside it
    pub fn proc_mount_from_host(&self, proc_mount: &Path) -> PathBuf {
        self.root
            .join(proc_mount.strip_prefix("/").unwrap_or(proc_mount))
    }
}

/// Fixed ceilings written into the cgroup of every container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    /// `pids.max`
    pub max_processes: u32,
    /// `memory.limit_in_bytes`
    pub memory_limit_bytes: u64,
    /// `notify_on_release`
    pub notify_on_release: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_processes: 3,
            memory_limit_bytes: 40 * 1024 * 1024, // 40MB
            notify_on_release: true,
        }
    }
}

/// Launcher configuration, constructed once at startup and passed down to both stages
#[derive(Clone, Debug)]
pub struct ContainerConfig {
    /// Cgroup directory the outer stage enrolls itself into
    pub cgroup_dir: PathBuf,
    /// Resource ceilings for that cgroup
    pub limits: ResourceLimits,
    /// Namespaces requested for the outer stage
    pub namespaces: CloneFlags,
    /// Hostname set inside the UTS namespace
    pub hostname: String,
    /// The only environment the command sees, applied in order
    pub environment: Vec<(String, String)>,
    /// Where proc is mounted inside the new root
    pub proc_mount: PathBuf,
    /// Size of each stage's execution stack in bytes
    pub stack_size: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            cgroup_dir: PathBuf::from(DEFAULT_CGROUP_DIR),
            limits: ResourceLimits::default(),
            namespaces: crate::namespace::container_namespaces(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            environment: vec![
                ("TERM".to_string(), "xterm-256color".to_string()),
                ("PATH".to_string(), "/bin:/sbin:/usr/bin:/usr/sbin".to_string()),
            ],
            proc_mount: PathBuf::from(PROC_MOUNT_POINT),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl ContainerConfig {
    /// Same defaults, with the cgroup placed somewhere else
    pub fn with_cgroup_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cgroup_dir = dir.as_ref().to_path_buf();
        self
    }
}

/// Custom error types for cellbox
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Root filesystem {} does not exist or is not a directory", .0.display())]
    MissingRoot(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cgroup error: {0}")]
    Cgroup(String),

    #[error("Mount error: {0}")]
    Mount(String),

    #[error("Unmount error: {0}")]
    Unmount(String),

    #[error("Exec error: {0}")]
    Exec(String),

    #[error("Process error: {0}")]
    Process(String),
}

impl ContainerError {
    /// Exit status a stage reports when it fails with this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ContainerError::Exec(_) => EXIT_EXEC_FAILED,
            _ => EXIT_SETUP_FAILED,
        }
    }
}

/// Result type alias for cellbox operations
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_limits() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.max_processes, 3);
        assert_eq!(limits.memory_limit_bytes, 41_943_040);
        assert!(limits.notify_on_release);
    }

    #[test]
    fn test_default_config() {
        let config = ContainerConfig::default();
        assert_eq!(config.cgroup_dir, PathBuf::from("/sys/fs/cgroup/container"));
        assert_eq!(config.hostname, "container");
        assert_eq!(config.proc_mount, PathBuf::from("/proc"));
        let names: Vec<&str> = config.environment.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["TERM", "PATH"]);
    }

    #[test]
    fn test_spec_rejects_missing_root() {
        let result = ContainerSpec::new("/nonexistent/cellbox-root", "echo", vec![]);
        match result {
            Err(ContainerError::MissingRoot(path)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/cellbox-root"))
            }
            other => panic!("expected MissingRoot, got {:?}", other),
        }
    }

    #[test]
    fn test_spec_rejects_empty_command() {
        let root = TempDir::new().unwrap();
        let result = ContainerSpec::new(root.path(), "", vec![]);
        assert!(matches!(result, Err(ContainerError::Config(_))));
    }

    #[test]
    fn test_spec_rejects_nul_in_args() {
        let root = TempDir::new().unwrap();
        let result = ContainerSpec::new(root.path(), "echo", vec!["a\0b".to_string()]);
        assert!(matches!(result, Err(ContainerError::Config(_))));
    }

    #[test]
    fn test_argv_keeps_order() {
        let root = TempDir::new().unwrap();
        let spec = ContainerSpec::new(root.path(), "echo", vec!["hi".to_string(), "there".to_string()]).unwrap();
        let argv = spec.argv().unwrap();
        let argv: Vec<&str> = argv.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(argv, vec!["echo", "hi", "there"]);
    }

    #[test]
    fn test_proc_mount_from_host() {
        let root = TempDir::new().unwrap();
        let spec = ContainerSpec::new(root.path(), "true", vec![]).unwrap();
        assert_eq!(
            spec.proc_mount_from_host(Path::new(PROC_MOUNT_POINT)),
            spec.root.join("proc")
        );
        assert!(spec.root.is_absolute());
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ContainerError::Exec("nope".into()).exit_code(), EXIT_EXEC_FAILED);
        assert_eq!(ContainerError::Cgroup("nope".into()).exit_code(), EXIT_SETUP_FAILED);
        assert_eq!(ContainerError::Mount("nope".into()).exit_code(), EXIT_SETUP_FAILED);
        assert_eq!(
            ContainerError::MissingRoot(PathBuf::from("/x")).exit_code(),
            EXIT_SETUP_FAILED
        );
    }
}
