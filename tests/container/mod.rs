/// End-to-end container launches. These need root and a prepared root filesystem.
use crate::{shell_spec, test_config, test_rootfs};
use cellbox::launcher::{LaunchState, Launcher};
use serial_test::serial;
use std::fs;
use std::path::PathBuf;

/// Run `script` in the container and return (exit status, contents of `/<output>`)
fn run_capturing(rootfs: &PathBuf, output: &str, script: &str) -> (i32, String) {
    let (config, _cgroup_base) = test_config();
    let spec = shell_spec(rootfs, &format!("{{ {} ; }} > /{}", script, output));

    let code = cellbox::launch(&config, &spec).expect("Launch failed");

    let host_path = rootfs.join(output);
    let captured = fs::read_to_string(&host_path).unwrap_or_default();
    let _ = fs::remove_file(&host_path);
    (code, captured)
}

#[test]
#[serial]
fn test_echo_runs_in_new_root() {
    let Some(rootfs) = test_rootfs() else { return };

    let (code, output) = run_capturing(&rootfs, "cellbox-echo", "echo hi; pwd");
    assert_eq!(code, 0);
    assert_eq!(output, "hi\n/\n");
}

#[test]
#[serial]
fn test_hostname_is_container() {
    let Some(rootfs) = test_rootfs() else { return };

    let (code, output) = run_capturing(&rootfs, "cellbox-hostname", "cat /proc/sys/kernel/hostname");
    assert_eq!(code, 0);
    assert_eq!(output.trim(), "container");
}

#[test]
#[serial]
fn test_environment_is_minimal() {
    let Some(rootfs) = test_rootfs() else { return };
    std::env::set_var("CELLBOX_SHOULD_NOT_LEAK", "1");

    // `export -p` is a builtin, so this does not depend on /usr/bin/env in the root
    let (code, output) = run_capturing(&rootfs, "cellbox-env", "export -p");
    assert_eq!(code, 0);
    assert!(!output.contains("CELLBOX_SHOULD_NOT_LEAK"), "{}", output);
    assert!(output.contains("TERM"), "{}", output);
    assert!(output.contains("/bin:/sbin:/usr/bin:/usr/sbin"), "{}", output);
}

#[test]
#[serial]
fn test_pid_namespace_isolation() {
    let Some(rootfs) = test_rootfs() else { return };

    let (code, output) = run_capturing(&rootfs, "cellbox-pid", "echo $$");
    assert_eq!(code, 0);

    // The outer stage is pid 1 of the new namespace, the command is the next one
    let inner_pid: u32 = output.trim().parse().unwrap();
    assert_eq!(inner_pid, 2);
    assert_ne!(inner_pid, std::process::id());
}

#[test]
#[serial]
fn test_proc_mounted_during_run() {
    let Some(rootfs) = test_rootfs() else { return };

    let (code, output) = run_capturing(&rootfs, "cellbox-proc", "test -d /proc/self && echo mounted");
    assert_eq!(code, 0);
    assert_eq!(output.trim(), "mounted");
}

#[test]
#[serial]
fn test_cgroup_files_hold_configured_values() {
    let Some(rootfs) = test_rootfs() else { return };
    let (config, _cgroup_base) = test_config();
    let spec = shell_spec(&rootfs, "true");

    // Twice: the second run must reuse the directory
    for _ in 0..2 {
        let mut launcher = Launcher::new(&config, &spec);
        assert_eq!(launcher.run().unwrap(), 0);
        assert_eq!(launcher.state(), LaunchState::OuterExited);
    }

    let read = |file: &str| fs::read_to_string(config.cgroup_dir.join(file)).unwrap();
    // Outside a real cgroupfs every append is kept; each one is the outer stage's pid
    assert!(read("cgroup.procs").lines().all(|pid| pid == "1"));
    assert!(read("pids.max").lines().all(|v| v == "3"));
    assert!(read("memory.limit_in_bytes").lines().all(|v| v == "41943040"));
    assert!(read("notify_on_release").lines().all(|v| v == "1"));
}

#[test]
#[serial]
fn test_exit_status_is_propagated() {
    let Some(rootfs) = test_rootfs() else { return };
    let (config, _cgroup_base) = test_config();

    let spec = shell_spec(&rootfs, "exit 3");
    assert_eq!(cellbox::launch(&config, &spec).unwrap(), 3);
}

#[test]
#[serial]
fn test_missing_command_reports_launch_failure() {
    let Some(rootfs) = test_rootfs() else { return };
    let (config, _cgroup_base) = test_config();

    let spec = cellbox::ContainerSpec::new(&rootfs, "cellbox-no-such-command", vec![]).unwrap();
    let code = cellbox::launch(&config, &spec).unwrap();
    assert_eq!(code, cellbox::types::EXIT_EXEC_FAILED);
}
