use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CATALOG: &str = r#"{
    "templates": [
        {
            "id": "monthly",
            "name": "Monthly statement",
            "prefix": "MS_",
            "fields": [
                { "name": "Revenue", "page": 1, "rect": { "x": 200, "y": 300, "width": 100, "height": 20 } }
            ],
            "anchors": [
                { "name": "title", "reference_text": "Monthly statement", "page": 1,
                  "rect": { "x": 50, "y": 40, "width": 120, "height": 18 } }
            ]
        }
    ],
    "queries": [
        {
            "id": "bonus",
            "template_id": "monthly",
            "outputs": [
                { "name": "Bonus", "formula": "IF([Input:Revenue#1] > 1000, [Input:Revenue#1] * [Variable:Rate], 0)",
                  "data_type": "currency", "execution_order": 1 },
                { "name": "Gross", "formula": "[Calculated:Bonus] * (1 + [Constant:Vat])", "execution_order": 2 }
            ],
            "constants": [ { "name": "Rate", "default_value": 0.1 } ]
        }
    ],
    "global_constants": [ { "name": "Vat", "default_value": 0.2, "scope": "global" } ]
}"#;

fn docfield() -> Command {
    Command::cargo_bin("docfield").unwrap()
}

fn write_catalog(dir: &Path) -> String {
    let path = dir.join("catalog.json");
    fs::write(&path, CATALOG).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_calc_formula() {
    docfield()
        .args(["calc", "--formula", "IF([Input:Revenue#1] > 1000, [Input:Revenue#1], 0)"])
        .args(["-i", "Revenue=1500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": 1500.0"))
        .stdout(predicate::str::contains("IF(1500 > 1000, 1500, 0)"));
}

#[test]
fn test_calc_formula_failure() {
    docfield()
        .args(["calc", "--formula", "[Input:A] / 0", "-i", "A=3"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"value\": null"))
        .stdout(predicate::str::contains("division by zero"));
}

#[test]
fn test_calc_requires_target() {
    docfield().args(["calc", "-i", "A=3"]).assert().failure();
}

#[test]
fn test_calc_query() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(dir.path());

    docfield()
        .args(["calc", "--catalog", &catalog, "--query", "bonus", "-i", "Revenue=2000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Bonus\": 200.0"))
        .stdout(predicate::str::contains("\"Gross\": 240.0"));
}

#[test]
fn test_calc_unknown_query() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(dir.path());

    docfield()
        .args(["calc", "--catalog", &catalog, "--query", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");
    let config = config.to_str().unwrap();

    docfield()
        .args(["--config", config, "config", "init"])
        .assert()
        .success();
    docfield()
        .args(["--config", config, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    docfield()
        .args(["--config", config, "config", "get", "calibration.confidence_floor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.5"));

    docfield()
        .args(["--config", config, "config", "set", "calibration.exclude_outliers", "true"])
        .assert()
        .success();
    docfield()
        .args(["--config", config, "config", "get", "calibration.exclude_outliers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));

    docfield()
        .args(["--config", config, "config", "set", "calibration.no_such_key", "1"])
        .assert()
        .failure();
}

#[test]
fn test_extract_missing_file() {
    docfield()
        .args(["extract", "does-not-exist.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_run_once_records_failures_and_skips_processed() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(dir.path());
    let intake = dir.path().join("intake");
    let output = dir.path().join("results");
    fs::create_dir_all(&intake).unwrap();
    fs::write(intake.join("MS_2024-03.pdf"), b"not a pdf").unwrap();
    fs::write(intake.join("other.pdf"), b"not a pdf").unwrap();

    let run = |expected: &str| {
        docfield()
            .args(["run", "--once", "--catalog", &catalog])
            .args(["--intake-dir", intake.to_str().unwrap()])
            .args(["--output-dir", output.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(expected.to_string()));
    };

    run("Processed 1 documents");

    let record = fs::read_to_string(output.join("monthly").join("MS_2024-03.json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&record).unwrap();
    assert_eq!(record["template_id"], "monthly");
    assert_eq!(record["period"]["year"], 2024);
    assert_eq!(record["period"]["month"], 3);
    assert!(record["error"].is_string());

    let summary = fs::read_to_string(output.join("summary.csv")).unwrap();
    assert!(summary.starts_with("filename,template_id,period,status"));
    assert!(summary.contains("MS_2024-03.pdf,monthly,2024-03,error"));

    // the lock is released after the batch
    assert!(!intake.join(".docfield.lock").exists());

    // already processed: nothing to do
    run("Processed 0 documents");
    assert!(!output.join("other").exists());
}

#[test]
fn test_run_skips_locked_intake() {
    let dir = TempDir::new().unwrap();
    let catalog = write_catalog(dir.path());
    let intake = dir.path().join("intake");
    let output = dir.path().join("results");
    fs::create_dir_all(&intake).unwrap();
    fs::write(intake.join("MS_2024-03.pdf"), b"not a pdf").unwrap();
    fs::write(intake.join(".docfield.lock"), "pid=1\n").unwrap();

    docfield()
        .args(["run", "--once", "--catalog", &catalog])
        .args(["--intake-dir", intake.to_str().unwrap()])
        .args(["--output-dir", output.to_str().unwrap()])
        .assert()
        .success();

    assert!(!output.join("monthly").exists());
    assert!(intake.join(".docfield.lock").exists());
}
