/// Cleanup of the container's proc mount once the inner stage has exited
use crate::types::{ContainerError, Result};
use nix::mount::umount;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// What a cleanup run did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The mount was present and is gone now
    Unmounted,
    /// Nothing was mounted there, e.g. the inner stage failed before mounting
    NotMounted,
    /// An earlier call already handled it
    AlreadyDone,
}

/// Unmounts the proc filesystem the inner stage mounted.
///
/// The outer stage owns one of these and calls [`ProcCleanup::run`] after
/// `waitpid` on the inner stage has returned. Only the first call does any work.
#[derive(Debug)]
pub struct ProcCleanup {
    mount_point: PathBuf,
    cleanup_started: AtomicBool,
}

impl ProcCleanup {
    pub fn new(mount_point: impl Into<PathBuf>) -> Self {
        Self {
            mount_point: mount_point.into(),
            cleanup_started: AtomicBool::new(false),
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn has_run(&self) -> bool {
        self.cleanup_started.load(Ordering::SeqCst)
    }

    /// Unmount proc and confirm it is gone. Calls after the first are no-ops.
    pub fn run(&self) -> Result<CleanupOutcome> {
        if self.cleanup_started.swap(true, Ordering::SeqCst) {
            return Ok(CleanupOutcome::AlreadyDone);
        }

        if !is_mounted(&self.mount_point)? {
            log::debug!("Nothing mounted at {}", self.mount_point.display());
            return Ok(CleanupOutcome::NotMounted);
        }

        log::debug!("Unmounting {}", self.mount_point.display());
        umount(&self.mount_point).map_err(|e| {
            ContainerError::Unmount(format!(
                "Failed to unmount {}: {}",
                self.mount_point.display(),
                e
            ))
        })?;

        if is_mounted(&self.mount_point)? {
            return Err(ContainerError::Unmount(format!(
                "{} is still mounted after umount",
                self.mount_point.display()
            )));
        }

        log::info!("Unmounted {}", self.mount_point.display());
        Ok(CleanupOutcome::Unmounted)
    }

    /// Like [`ProcCleanup::run`], but a failure is only logged.
    ///
    /// The outer stage has to exit either way so its namespaces are released.
    pub fn run_and_report(&self) -> Option<CleanupOutcome> {
        match self.run() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }
}

/// Whether something is mounted exactly at `path` in the caller's mount namespace
pub fn is_mounted(path: &Path) -> Result<bool> {
    let mountinfo = fs::read_to_string("/proc/self/mountinfo")
        .map_err(|e| ContainerError::Unmount(format!("Failed to read mountinfo: {}", e)))?;
    let mounted = mount_points(&mountinfo).any(|point| Path::new(&point) == path);
    Ok(mounted)
}

/// Mount points listed in a mountinfo table, with octal escapes decoded
fn mount_points(mountinfo: &str) -> impl Iterator<Item = String> + '_ {
    mountinfo
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(unescape_mount_point)
}

fn unescape_mount_point(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let code = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(code) = u8::try_from(code) {
                    out.push(code);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
