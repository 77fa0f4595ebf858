use assert_cmd::Command;
use tempfile::tempdir;

fn tracenet() -> Command {
    Command::cargo_bin("tracenet").unwrap()
}

#[test]
fn writes_results_to_output_dir() {
    let temp_dir = tempdir().unwrap();
    let output = tracenet()
        .args(["--runs", "2", "--days", "15", "--threads", "2", "--random-seed", "9"])
        .arg("--output-dir")
        .arg(temp_dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("simulation_results: 2 runs"), "{stdout}");

    let json = std::fs::read_to_string(temp_dir.path().join("simulation_results.json")).unwrap();
    let results: tracenet::SimulationResults = serde_json::from_str(&json).unwrap();
    assert_eq!(results.runs(), 2);
    assert_eq!(results.num_days, 15);
    assert_eq!(results.n_total, 30);
    assert!(results
        .history_quarantine
        .iter()
        .all(|row| row.len() == results.history_quarantine[0].len()));

    let mut reader =
        csv::Reader::from_path(temp_dir.path().join("simulation_results_daily_counts.csv"))
            .unwrap();
    assert_eq!(reader.records().count(), 2 * 15);
}

#[test]
fn sweep_writes_one_file_per_point() {
    let temp_dir = tempdir().unwrap();
    tracenet()
        .args([
            "--runs",
            "1",
            "--days",
            "5",
            "--app-usage-rates",
            "0.5,1",
            "--quarantine-probabilities",
            "1",
        ])
        .arg("--output-dir")
        .arg(temp_dir.path())
        .assert()
        .success();

    for stem in ["simulation_results_A=0.5_Q=1", "simulation_results_A=1_Q=1"] {
        assert!(temp_dir.path().join(format!("{stem}.json")).exists());
        assert!(temp_dir
            .path()
            .join(format!("{stem}_daily_counts.csv"))
            .exists());
    }
}

#[test]
fn config_file_is_used() {
    let temp_dir = tempdir().unwrap();
    let config = temp_dir.path().join("config.json");
    std::fs::write(
        &config,
        r#"{"neighbourhood_count": 2, "residents_per_neighbourhood": 12, "max_days": 8}"#,
    )
    .unwrap();

    tracenet()
        .args(["--runs", "1"])
        .arg("--config")
        .arg(&config)
        .arg("--output-dir")
        .arg(temp_dir.path())
        .assert()
        .success();

    let json = std::fs::read_to_string(temp_dir.path().join("simulation_results.json")).unwrap();
    let results: tracenet::SimulationResults = serde_json::from_str(&json).unwrap();
    assert_eq!(results.n_total, 24);
    assert_eq!(results.num_days, 8);
}

#[test]
fn invalid_configuration_fails() {
    let temp_dir = tempdir().unwrap();
    let config = temp_dir.path().join("config.json");
    std::fs::write(&config, r#"{"connection_degree": 3}"#).unwrap();

    let output = tracenet()
        .args(["--runs", "1"])
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Configuration error"), "{stderr}");
}

#[test]
fn unknown_log_level_fails() {
    let output = tracenet()
        .args(["--runs", "1", "--days", "1", "--log-level", "chatty"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn logging_goes_to_stderr() {
    let output = tracenet()
        .args(["--runs", "1", "--days", "2", "--log-level", "info"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1, "{stdout}");
}
