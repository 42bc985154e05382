use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const COUNTING: &str = r#"{
    "configs": [{
        "id": "counting",
        "parameters": [{ "name": "GREETING", "default": "hello" }],
        "objects": [
            { "uid": "clicks", "type": "Integer" },
            { "uid": "banner", "type": "String", "value": "%GREETING%" }
        ],
        "services": [
            {
                "uid": "setter",
                "type": "weft::ValueSetter",
                "objects": [{ "key": "target", "uid": "clicks", "access": "inout" }],
                "config": { "value": 7 }
            },
            {
                "uid": "counter",
                "type": "weft::Counter",
                "auto_connect": true,
                "objects": [
                    { "key": "source", "uid": "clicks", "access": "input" },
                    { "key": "count", "uid": "clicks_total", "access": "output" }
                ]
            }
        ],
        "update": ["setter"]
    }]
}"#;

fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).expect("write document");
    path
}

#[test]
fn test_list_shows_components_and_types() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("list");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("weft::Counter"))
        .stdout(predicate::str::contains("weft::ConfigLauncher"))
        .stdout(predicate::str::contains("Composite"));
    Ok(())
}

#[test]
fn test_check_reports_valid_configuration() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write(&dir, "counting.json", COUNTING);
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("check").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configuration 'counting' is valid (2 object(s), 2 component(s))"));
    Ok(())
}

#[test]
fn test_check_fails_on_unknown_implementation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let broken = COUNTING.replace("weft::Counter", "weft::Missing");
    let path = write(&dir, "broken.json", &broken);
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("check").arg(&path);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("weft::Missing"));
    Ok(())
}

#[test]
fn test_check_fails_on_unknown_config_id() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write(&dir, "counting.json", COUNTING);
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("check").arg(&path).args(["--config", "absent"]);
    cmd.assert().failure().stderr(predicate::str::contains("absent"));
    Ok(())
}

#[test]
fn test_run_for_a_fixed_duration() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write(&dir, "counting.json", COUNTING);
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("run")
        .arg(&path)
        .args(["-p", "GREETING=hi", "--duration-ms", "50"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Running configuration 'counting' (2 component(s))"))
        .stdout(predicate::str::contains("Stopped configuration 'counting'"));
    Ok(())
}

#[test]
fn test_malformed_parameter_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write(&dir, "counting.json", COUNTING);
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("run").arg(&path).args(["-p", "no-equals-sign"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("expected NAME=VALUE"));
    Ok(())
}

#[test]
fn test_unsupported_extension_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write(&dir, "counting.ini", COUNTING);
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("check").arg(&path);
    cmd.assert().failure().stderr(predicate::str::contains("Error:"));
    Ok(())
}

#[test]
fn test_demo_documents_are_valid() -> Result<(), Box<dyn std::error::Error>> {
    let demos = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos");
    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("check").arg(demos.join("pipeline.yaml"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configuration 'pipeline' is valid"))
        .stdout(predicate::str::contains("Configuration 'nested' is valid"));

    let mut cmd = Command::cargo_bin("weft")?;
    cmd.arg("check").arg(demos.join("pipeline.toml"));
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Configuration 'mirror' is valid"));
    Ok(())
}
