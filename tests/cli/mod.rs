/// Command line behavior of the cellbox binary
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_describes_arguments() {
    Command::cargo_bin("cellbox")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ROOT"))
        .stdout(predicate::str::contains("COMMAND"));
}

#[test]
fn test_missing_arguments_rejected() {
    Command::cargo_bin("cellbox")
        .unwrap()
        .assert()
        .failure();

    Command::cargo_bin("cellbox")
        .unwrap()
        .arg("/tmp")
        .assert()
        .failure();
}

#[test]
fn test_missing_root_reported() {
    Command::cargo_bin("cellbox")
        .unwrap()
        .args(["/nonexistent/cellbox-root", "echo", "hi"])
        .assert()
        .code(125)
        .stderr(predicate::str::contains("/nonexistent/cellbox-root"))
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_root_must_be_directory() {
    let file = tempfile::NamedTempFile::new().unwrap();

    Command::cargo_bin("cellbox")
        .unwrap()
        .arg(file.path())
        .args(["echo", "hi"])
        .assert()
        .code(125)
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn test_non_root_gets_warning() {
    if nix::unistd::geteuid().is_root() {
        println!("Skipping non-root warning test - running as root");
        return;
    }

    Command::cargo_bin("cellbox")
        .unwrap()
        .args(["/nonexistent/cellbox-root", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root privileges"));
}

#[test]
fn test_command_flags_go_to_the_command() {
    // `--help` belongs to `ls`, so this fails on the root instead of printing our help
    Command::cargo_bin("cellbox")
        .unwrap()
        .args(["/nonexistent/cellbox-root", "ls", "--help"])
        .assert()
        .code(125)
        .stdout(predicate::str::contains("Usage").not())
        .stderr(predicate::str::contains("does not exist"));
}
