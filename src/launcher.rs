/// Two-stage container launch: an outer stage in new namespaces and an inner
/// stage that switches root and execs the command
use crate::cgroup::ResourceGroup;
use crate::cleanup::ProcCleanup;
use crate::filesystem::RootSwitch;
use crate::namespace;
use crate::stack::ExecutionStack;
use crate::types::{ContainerConfig, ContainerError, ContainerSpec, Result};
use nix::errno::Errno;
use nix::sched::{clone, CloneCb, CloneFlags};
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, getpid, Pid};
use std::convert::Infallible;
use std::fmt;

/// Lifecycle of one container launch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchState {
    Unstarted,
    OuterRunning,
    InnerRunning,
    InnerExited,
    OuterCleaningUp,
    OuterExited,
}

impl LaunchState {
    /// Whether `self -> to` is a legal step.
    ///
    /// The entry process never sees the inner stage, so it goes straight from
    /// `OuterRunning` to `OuterExited` when its wait returns.
    pub fn allows(self, to: LaunchState) -> bool {
        use LaunchState::*;
        matches!(
            (self, to),
            (Unstarted, OuterRunning)
                | (OuterRunning, InnerRunning)
                | (OuterRunning, OuterExited)
                | (InnerRunning, InnerExited)
                | (InnerExited, OuterCleaningUp)
                | (OuterCleaningUp, OuterExited)
        )
    }

    fn advance(&mut self, to: LaunchState) -> Result<()> {
        if !self.allows(to) {
            return Err(ContainerError::Process(format!(
                "Invalid launch transition {} -> {}",
                self, to
            )));
        }
        log::debug!("Launch state {} -> {}", self, to);
        *self = to;
        Ok(())
    }
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchState::Unstarted => "unstarted",
            LaunchState::OuterRunning => "outer-running",
            LaunchState::InnerRunning => "inner-running",
            LaunchState::InnerExited => "inner-exited",
            LaunchState::OuterCleaningUp => "outer-cleaning-up",
            LaunchState::OuterExited => "outer-exited",
        };
        f.write_str(name)
    }
}

/// Launches one container and reports the command's exit status
pub struct Launcher<'a> {
    config: &'a ContainerConfig,
    spec: &'a ContainerSpec,
    state: LaunchState,
}

impl<'a> Launcher<'a> {
    pub fn new(config: &'a ContainerConfig, spec: &'a ContainerSpec) -> Self {
        Self {
            config,
            spec,
            state: LaunchState::Unstarted,
        }
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    /// Spawn the outer stage and block until it exits.
    ///
    /// Returns the exit status the outer stage reported: the command's own
    /// status, `128 + signal` if it was killed, 125 if setup failed or 127 if
    /// the command could not be executed.
    pub fn run(&mut self) -> Result<i32> {
        let config = self.config;
        let spec = self.spec;

        let mut stack = ExecutionStack::allocate(config.stack_size);
        let outer = spawn_stage(
            &mut stack,
            config.namespaces,
            Box::new(move || run_outer_stage(config, spec)),
        )?;
        self.state.advance(LaunchState::OuterRunning)?;
        log::info!(
            "Outer stage started as pid {} with namespaces {:?}",
            outer,
            namespace::enabled_namespaces(config.namespaces)
        );

        let code = wait_for_exit(outer)?;
        self.state.advance(LaunchState::OuterExited)?;
        log::info!("Container exited with status {}", code);

        Ok(code)
    }
}

/// Launch `spec` with `config` and return the container's exit status
pub fn launch(config: &ContainerConfig, spec: &ContainerSpec) -> Result<i32> {
    Launcher::new(config, spec).run()
}

/// Clone a child running `cb` on `stack`; SIGCHLD is delivered when it exits
fn spawn_stage(stack: &mut ExecutionStack, flags: CloneFlags, cb: CloneCb<'_>) -> Result<Pid> {
    // The child gets a copy of our memory, so `cb` may borrow from this frame
    // as long as the stack outlives the clone call.
    log::debug!(
        "Cloning with {:?} on a {} byte stack, top at {:p}",
        flags,
        stack.capacity(),
        stack.top()
    );
    unsafe { clone(cb, stack.as_mut_slice(), flags, Some(Signal::SIGCHLD as libc::c_int)) }
        .map_err(|e| ContainerError::Process(format!("Failed to clone process: {}", e)))
}

/// Block until `pid` terminates and translate its status into an exit code
pub fn wait_for_exit(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(code) = exit_code_from_status(status) {
                    return Ok(code);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                return Err(ContainerError::Process(format!(
                    "Failed to wait for process {}: {}",
                    pid, e
                )))
            }
        }
    }
}

/// Exit code for a terminal wait status, `None` if the process is still alive
pub fn exit_code_from_status(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

fn run_outer_stage(config: &ContainerConfig, spec: &ContainerSpec) -> isize {
    match outer_stage(config, spec) {
        Ok(code) => code as isize,
        Err(e) => {
            log::error!("Outer stage failed: {}", e);
            e.exit_code() as isize
        }
    }
}

/// Runs as the first process of the new namespaces
fn outer_stage(config: &ContainerConfig, spec: &ContainerSpec) -> Result<i32> {
    let mut state = LaunchState::OuterRunning;

    if config.namespaces.contains(CloneFlags::CLONE_NEWNS) {
        namespace::make_mounts_private()?;
    }
    if let Ok(pid_ns) = namespace::namespace_id("pid") {
        log::debug!("Outer stage running in {}", pid_ns);
    }

    // Enroll ourselves so the limits cover everything spawned below
    let pid = getpid();
    ResourceGroup::establish(&config.cgroup_dir, pid.as_raw() as u32, &config.limits)?;

    let mut stack = ExecutionStack::allocate(config.stack_size);
    let inner = spawn_stage(
        &mut stack,
        CloneFlags::empty(),
        Box::new(move || run_inner_stage(config, spec)),
    )?;
    state.advance(LaunchState::InnerRunning)?;
    log::info!("Inner stage started as pid {}", inner);

    let waited = wait_for_exit(inner);
    state.advance(LaunchState::InnerExited)?;

    state.advance(LaunchState::OuterCleaningUp)?;
    let cleanup = ProcCleanup::new(spec.proc_mount_from_host(&config.proc_mount));
    if let Some(outcome) = cleanup.run_and_report() {
        log::debug!("Cleanup of {}: {:?}", cleanup.mount_point().display(), outcome);
    }
    state.advance(LaunchState::OuterExited)?;

    waited
}

fn run_inner_stage(config: &ContainerConfig, spec: &ContainerSpec) -> isize {
    let err = match inner_stage(config, spec) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    log::error!("Inner stage failed: {}", err);
    err.exit_code() as isize
}

/// Switches into the container and replaces itself with the command
fn inner_stage(config: &ContainerConfig, spec: &ContainerSpec) -> Result<Infallible> {
    let argv = RootSwitch::new(config, spec).prepare()?;
    let program = argv
        .first()
        .ok_or_else(|| ContainerError::Config("Empty command line".to_string()))?;

    log::debug!("Executing {:?}", argv);
    execvp(program, &argv).map_err(|e| {
        ContainerError::Exec(format!("Failed to execute {}: {}", spec.command, e))
    })
}
