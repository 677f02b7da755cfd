use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Sim-friendly provisioning: two recipients, no boot calibration.
fn write_valid_config(dir: &TempDir) -> PathBuf {
    let toml = r#"
[device]
device_id = "BINSAI-CLI001"
bin_height_cm = 40.0

[network]
wifi_ssid = "lab"
wifi_pass = "secret-pass"
cloud_token = "secret-token"

[sms]
phone_numbers = ["+6281234567", "+6289876543"]
cooldown_ms = 300000

[timing]
skip_boot_calibration = true
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn binsai(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("binsai").unwrap();
    cmd.arg("--config")
        .arg(write_valid_config(dir))
        .arg("--store")
        .arg(dir.path().join("store.toml"))
        .arg("--log-level")
        .arg("error");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--sim-time", "--ticks", "50"], 0, "ticks over", "stdout")]
#[case(&["self-check", "--sim-time"], 0, "ultrasonic", "stdout")]
#[case(&["self-check", "--sim-time", "--no-display"], 0, "FAIL  display", "stdout")]
#[case(&["config", "set", "nope", "1"], 1, "unknown config key", "stderr")]
#[case(&["config", "set", "reset_below", "95"], 1, "Configuration is invalid", "stderr")]
#[case(&["run", "--gps-fix", "95,0"], 2, "out of range", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let assert = binsai(&dir).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn config_set_persists_and_show_masks_secrets() {
    let dir = tempdir().unwrap();
    binsai(&dir)
        .args(["config", "set", "crit_cap", "85"])
        .assert()
        .success()
        .stdout(predicate::str::contains("crit_cap saved"));

    let out = binsai(&dir)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["thresholds"]["critical_fill"], 85.0);
    assert_eq!(v["network"]["wifi_pass"], "********");
    assert_eq!(v["network"]["cloud_token"], "********");
    assert_eq!(v["network"]["wifi_ssid"], "lab");
}

#[rstest]
fn calibrate_stores_r0() {
    let dir = tempdir().unwrap();
    let out = binsai(&dir)
        .args(["--json", "calibrate", "--sim-time"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let r0 = v["r0_kohm"].as_f64().unwrap();
    assert!(r0 > 0.0);
    assert_eq!(v["samples"], 50);

    let store = fs::read_to_string(dir.path().join("store.toml")).unwrap();
    assert!(store.contains("mq135_r0"), "store was: {store}");
}

#[rstest]
fn fit_ppm_stores_coefficients() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("campaign.csv");
    fs::write(&csv, "adc,ppm\n40,89.0\n60,280.0\n90,895.0\n").unwrap();

    let out = binsai(&dir)
        .arg("--json")
        .arg("fit-ppm")
        .arg(&csv)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["model"], "power");
    let b = v["b"].as_f64().unwrap();
    assert!((2.5..3.2).contains(&b), "exponent {b}");

    let store = fs::read_to_string(dir.path().join("store.toml")).unwrap();
    assert!(store.contains("ppm_a") && store.contains("ppm_b"));
}

#[rstest]
fn fit_ppm_reports_bad_header() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("campaign.csv");
    fs::write(&csv, "raw,value\n40,89.0\n60,280.0\n").unwrap();

    binsai(&dir)
        .arg("fit-ppm")
        .arg(&csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn unparsable_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("broken.toml");
    fs::write(&cfg, "[device\nbin_height_cm = ").unwrap();

    Command::cargo_bin("binsai")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("store.toml"))
        .args(["config", "show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not valid TOML"));
}

#[rstest]
fn first_run_derives_and_stores_device_id() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[timing]\nskip_boot_calibration = true\n").unwrap();

    Command::cargo_bin("binsai")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--store")
        .arg(dir.path().join("store.toml"))
        .args(["--log-level", "error", "run", "--sim-time", "--ticks", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BINSAI-000001"));

    let store = fs::read_to_string(dir.path().join("store.toml")).unwrap();
    assert!(store.contains("BINSAI-000001"), "store was: {store}");
}
