use assert_cmd::Command;
use predicates::prelude::*;

const VALID_SETTINGS: &str = r#"
schema = "divert-settings-v1"
power_cal_grid = 0.05
power_cal_divert = 0.05
bucket_range_j = 360.0
export_target_w = 0.0
anti_creep_w = 10.0
export_divert_threshold_w = 50.0
hysteresis_fraction = 0.10
verbose_telemetry = false
"#;

fn divert() -> Command {
    Command::cargo_bin("divert").expect("binary builds")
}

#[test]
fn help_lists_both_subcommands() {
    divert()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run").and(predicate::str::contains("check-config")));
}

#[test]
fn check_config_accepts_a_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("divert_settings.toml");
    std::fs::write(&path, VALID_SETTINGS).unwrap();

    divert()
        .args(["--config", path.to_str().unwrap(), "check-config"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("is valid")
                .and(predicate::str::contains("power_cal_grid = 0.05")),
        );
}

#[test]
fn check_config_rejects_a_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("divert_settings.toml");
    std::fs::write(&path, "schema = \"divert-settings-v1\"\npower_cal_grid = -1.0\n").unwrap();

    divert()
        .args(["--config", path.to_str().unwrap(), "check-config"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("power_cal_grid"));
}

#[test]
fn check_config_reports_a_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does_not_exist.toml");

    divert()
        .args(["--config", path.to_str().unwrap(), "check-config"])
        .assert()
        .failure()
        .code(5);
}

#[test]
fn run_answers_console_commands_and_exits_on_duration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("divert_settings.toml");
    std::fs::write(&path, VALID_SETTINGS).unwrap();

    divert()
        .args([
            "--config",
            path.to_str().unwrap(),
            "run",
            "--duration",
            "1",
        ])
        .write_stdin("get export_target_w\nstatus\n")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("export_target_w = 0"));
}

#[test]
fn run_rejects_unknown_console_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("divert_settings.toml");
    std::fs::write(&path, VALID_SETTINGS).unwrap();

    divert()
        .args([
            "--config",
            path.to_str().unwrap(),
            "run",
            "--duration",
            "1",
        ])
        .write_stdin("frobnicate\n")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("error:"));
}
