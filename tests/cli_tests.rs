use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const FIRMWARE: &str = r#"
[[firmware]]
name = "k20dx_bl"
kind = "bootloader"
hic_id = "97969900"
image = "k20dx_bl.hex"

[[firmware]]
name = "k20dx_frdmk64f_if"
kind = "interface"
board_id = "0240"
hic_id = "97969900"
image = "k20dx_frdmk64f_if.hex"

[[firmware]]
name = "k20dx_frdmk22f_if"
kind = "interface"
board_id = "0231"
hic_id = "97969900"
image = "k20dx_frdmk22f_if.hex"

[[board]]
unique_id = "0240000032044e4500257009997b00386781000097969900"
name = "frdm-k64f"
board_id = "0240"
hic_id = "97969900"
"#;

const TARGET: &str = r#"
[[target]]
board_id = "0240"
hex = "targets/k64f.hex"
bin = "targets/k64f.bin"
"#;

fn tools(hid_test: &str) -> String {
    format!(
        r#"
[tools]
load_interface = "true"
load_bootloader = "true"
check_fs_on_remount = "true"
daplink_test = "true"
hid_test = "{hid_test}"
serial_test = "true"
msd_test = "true"
timeout = "30s"
"#
    )
}

// 在临时目录中准备清单文件与目标镜像
fn setup(inventory: &str) -> TempDir {
    let dir = tempdir().unwrap();
    let targets = dir.path().join("targets");
    fs::create_dir_all(&targets).unwrap();
    fs::write(targets.join("k64f.hex"), ":00000001FF\n").unwrap();
    fs::write(targets.join("k64f.bin"), [0u8; 16]).unwrap();
    fs::write(dir.path().join("daptest.toml"), inventory).unwrap();
    dir
}

fn daptest(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.current_dir(dir)
        .env("RUST_LOG", "warn")
        .arg("--inventory")
        .arg(dir.join("daptest.toml"))
        .arg("--logdir")
        .arg(dir.join("results"));
    cmd
}

#[test]
fn test_help_lists_flags() {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--inventory"))
        .stdout(predicate::str::contains("--firmware"))
        .stdout(predicate::str::contains("--testfirst"))
        .stdout(predicate::str::contains("--dryrun"));
}

#[test]
fn test_dryrun_prints_configurations() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("true")));
    daptest(dir.path())
        .arg("--dryrun")
        .assert()
        .success()
        .stdout(predicate::str::contains("Test configurations to be run:"))
        .stdout(predicate::str::contains(
            "0: APP=k20dx_frdmk64f_if BL=k20dx_bl Board=frdm-k64f Target=k64f",
        ))
        .stdout(predicate::str::contains("k20dx_frdmk22f_if (no board to test)"));
    assert!(!dir.path().join("results").exists());
}

#[test]
fn test_full_run_writes_results() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("true")));
    daptest(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("All boards passed"))
        .stdout(predicate::str::contains(
            "Warning - configuration k20dx_frdmk22f_if is untested",
        ));

    let results = dir.path().join("results");
    let summary = fs::read_to_string(results.join("summary.txt")).unwrap();
    assert!(summary.starts_with("All tests pass"));
    assert!(summary.contains("frdm-k64f Target=k64f: Pass"));
    assert!(results.join("k20dx_frdmk64f_if frdm-k64f.txt").exists());
    assert!(results.join("summary.json").exists());
    assert!(results.join("target/k64f.hex").exists());
    assert!(results.join("target/k64f.bin").exists());
}

#[test]
fn test_failing_step_fails_run() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("false")));
    daptest(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("HID test failed"))
        .stdout(predicate::str::contains("Test Failed"));

    let summary = fs::read_to_string(dir.path().join("results/summary.txt")).unwrap();
    assert!(summary.starts_with("One or more tests have failed"));
}

#[test]
fn test_unknown_firmware_is_fatal() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("true")));
    daptest(dir.path())
        .args(["--firmware", "k20dx_frdmk64f_if", "--firmware", "no_such_if"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot find firmware no_such_if"));
    assert!(!dir.path().join("results").exists());
}

#[test]
fn test_explicit_firmware_must_be_testable() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("true")));
    daptest(dir.path())
        .args(["--firmware", "k20dx_frdmk64f_if", "--firmware", "k20dx_frdmk22f_if"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not all firmware could be tested"));
}

#[test]
fn test_duplicate_targets_are_fatal() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{TARGET}{}", tools("true")));
    daptest(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Multiple targets found for board id"));
}

#[test]
fn test_endpoint_tests_need_targets() {
    let dir = setup(&format!("{FIRMWARE}{}", tools("true")));
    daptest(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Target test images must be specified"));

    daptest(dir.path())
        .args(["--notestendpt", "--target-required", "never", "--dryrun"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Target=<None>"));
}

#[test]
fn test_dryrun_reports_all_firmware_testable() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("true")));
    daptest(dir.path())
        .args(["--firmware", "k20dx_frdmk64f_if", "--dryrun"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All firmware can be tested"))
        .stdout(predicate::str::contains("Untested firmware:").not());
}

#[test]
fn test_existing_logdir_requires_force() {
    let dir = setup(&format!("{FIRMWARE}{TARGET}{}", tools("true")));
    fs::create_dir_all(dir.path().join("results")).unwrap();
    fs::write(dir.path().join("results/stale.txt"), "old run").unwrap();

    daptest(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    daptest(dir.path()).arg("--force").assert().success();
    assert!(!dir.path().join("results/stale.txt").exists());
    assert!(dir.path().join("results/summary.txt").exists());
}
