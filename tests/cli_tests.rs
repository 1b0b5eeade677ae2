//! Command-line behavior that never reaches the build stages.

use std::fs;
use std::process::Command;

use assert_cmd::cargo;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// The binary with every PTUX_* variable cleared.
fn ptux() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("ptux-image"));
    for var in [
        "PTUX_PACKAGE",
        "PTUX_CONFIG",
        "PTUX_IMAGE",
        "PTUX_SIZE",
        "PTUX_DIST",
        "PTUX_FSTYPE",
        "PTUX_WORKDIR",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_print_config_outputs_raw_template() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("multistrap.conf");
    fs::write(&template, "[General]\npackages=@PACKAGE@\n").unwrap();

    ptux()
        .current_dir(tmp.path())
        .args(["-C", "-c"])
        .arg(&template)
        .arg("beagle")
        .assert()
        .success()
        .stdout("[General]\npackages=@PACKAGE@\n");

    // Nothing but the template in the directory.
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
}

#[test]
fn test_print_config_from_env() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("t.conf");
    fs::write(&template, "suite=@DIST@\n").unwrap();

    ptux()
        .env("PTUX_CONFIG", &template)
        .arg("-C")
        .assert()
        .success()
        .stdout("suite=@DIST@\n");
}

#[test]
fn test_print_config_without_template_is_usage_error() {
    ptux()
        .arg("-C")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no bootstrap config template"))
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_missing_package_is_usage_error() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("t.conf");
    fs::write(&template, "x").unwrap();

    ptux()
        .current_dir(tmp.path())
        .arg("-c")
        .arg(&template)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no target package"))
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_unknown_flag() {
    ptux()
        .arg("-Q")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_existing_output_fails_without_side_effects() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("t.conf");
    fs::write(&template, "x").unwrap();
    fs::write(tmp.path().join("ptux.tgz"), "old").unwrap();

    ptux()
        .current_dir(tmp.path())
        .args(["-c", "t.conf", "beagle"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(tmp.path().join("ptux.tgz")).unwrap(), "old");
    assert!(!tmp.path().join("ptux.img").exists());
    assert!(!tmp.path().join("ptux.manifest").exists());
}

#[test]
fn test_invalid_size() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("t.conf"), "x").unwrap();

    ptux()
        .current_dir(tmp.path())
        .args(["-c", "t.conf", "-d", "lots", "beagle"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid filesystem size 'lots'"));
}

#[test]
fn test_dotenv_supplies_package() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("t.conf"), "x").unwrap();
    fs::write(tmp.path().join("ptux.img"), "").unwrap();
    fs::write(tmp.path().join(".env"), "PTUX_PACKAGE=beagle\n").unwrap();

    // Package comes from .env, so resolution gets as far as the
    // pre-existing image check instead of a usage error.
    ptux()
        .current_dir(tmp.path())
        .args(["-c", "t.conf"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ptux.img already exists"));
}

#[test]
fn test_help() {
    ptux()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("-z"))
        .stdout(predicate::str::contains("PTUX_PACKAGE"));
}
