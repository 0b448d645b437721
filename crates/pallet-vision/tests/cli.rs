mod common;

use assert_cmd::Command;
use common::{config_json, pallet_frame};
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("pallet-vision").unwrap()
}

fn calibrate_into(path: &std::path::Path) {
    cli()
        .args(["calibrate", "--point", "100,100", "--point", "900,100"])
        .args(["--point", "900,600", "--point", "100,600", "--out"])
        .arg(path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"plane_size_mm\": 1000.0"));
}

#[test]
fn calibrate_writes_store() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("calibration").join("homography.json");
    calibrate_into(&out);
    assert!(out.is_file());
}

#[test]
fn calibrate_rejects_three_points() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args(["calibrate", "--point", "1,1", "--point", "500,1", "--point", "500,500"])
        .arg("--out")
        .arg(dir.path().join("h.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected exactly 4 calibration points"));
}

#[test]
fn calibrate_rejects_malformed_point() {
    cli()
        .args(["calibrate", "--point", "12;40"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected `x,y`"));
}

#[test]
fn run_prints_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let cal = dir.path().join("homography.json");
    calibrate_into(&cal);

    let frames = dir.path().join("frames");
    std::fs::create_dir(&frames).unwrap();
    pallet_frame().save(frames.join("0001.png")).unwrap();

    let cfg = dir.path().join("session.json");
    std::fs::write(&cfg, config_json(&cal, r#"{ "target": { "kind": "stdout" } }"#)).unwrap();

    cli()
        .arg("run")
        .arg("--config")
        .arg(&cfg)
        .arg("--frames")
        .arg(&frames)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""units":"mm""#))
        .stderr(predicate::str::contains("frames: 1, detections: 1"));
}

#[test]
fn run_without_calibration_fails() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("session.json");
    std::fs::write(
        &cfg,
        config_json(&dir.path().join("missing.json"), r#"{ "target": { "kind": "none" } }"#),
    )
    .unwrap();

    cli()
        .arg("run")
        .arg("--config")
        .arg(&cfg)
        .arg("--frames")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("calibration"));
}

#[test]
fn measure_reports_plane_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let cal = dir.path().join("homography.json");
    calibrate_into(&cal);

    let image = dir.path().join("block.png");
    pallet_frame().save(&image).unwrap();

    cli()
        .arg("measure")
        .arg("--image")
        .arg(&image)
        .arg("--calibration")
        .arg(&cal)
        .args(["--true-width-mm", "450"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"width_mm\""))
        .stdout(predicate::str::contains("\"abs_error_mm\""));
}

#[test]
fn measure_without_calibration_fails() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("block.png");
    pallet_frame().save(&image).unwrap();

    cli()
        .arg("measure")
        .arg("--image")
        .arg(&image)
        .arg("--calibration")
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}
