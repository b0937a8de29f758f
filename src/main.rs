/// cellbox: run one command in an isolated container
///
/// Creates new mount, UTS, PID, IPC and network namespaces, enrolls the
/// container in a cgroup with fixed process and memory ceilings, switches to
/// the given root filesystem with a minimal environment, and execs the command.
///
/// # Usage
/// ```bash
/// sudo cellbox /srv/rootfs /bin/sh -c 'hostname; ps'
/// ```
use cellbox::cli::{self, Cli};
use clap::Parser;

fn main() {
    // Initialize structured logging (RUST_LOG)
    env_logger::init();

    if !cfg!(target_os = "linux") {
        eprintln!("Error: cellbox requires Linux namespaces and cgroups");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let is_root = unsafe { libc::getuid() } == 0;
    for warning in cli::preflight_warnings(is_root) {
        log::warn!("{}", warning);
        eprintln!("Warning: {}", warning);
    }

    let code = match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            cli::exit_code_for(&e)
        }
    };

    std::process::exit(code);
}
