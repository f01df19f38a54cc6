use std::process::Command;

use assert_cmd::prelude::*;

#[test]
fn runs_without_arguments() {
    let mut cmd = Command::cargo_bin("sics").unwrap();
    cmd.assert().success();
}

#[test]
fn demo_prints_result() {
    let output = Command::cargo_bin("sics")
        .unwrap()
        .arg("demo")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 * 3 = 6"));
}

#[test]
fn demo_image_round_trips_through_run() {
    // Process id keeps concurrent runs of the suite from colliding.
    let dir = std::env::temp_dir();
    let image = dir.join(format!("sics_demo_test_{}.bin", std::process::id()));

    Command::cargo_bin("sics")
        .unwrap()
        .args(["demo", "--out"])
        .arg(&image)
        .assert()
        .success();

    Command::cargo_bin("sics")
        .unwrap()
        .arg("run")
        .arg(&image)
        .assert()
        .success();

    let _ = std::fs::remove_file(&image);
}
