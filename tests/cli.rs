use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = r#"
[systems.laptop]
hostname = "localhost"
type = "debian"
sudo_method = "none"
updates = ["rust"]
"#;

fn updall(config_dir: &TempDir) -> Command {
    let config = config_dir.path().join("config.toml");
    fs::write(&config, CONFIG).unwrap();

    let mut cmd = Command::cargo_bin("updall").unwrap();
    cmd.env_remove("UPDALL_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn test_only_warning_keeps_json_clean() {
    let dir = TempDir::new().unwrap();

    let output = updall(&dir)
        .args(["run", "--json", "--no-prompt", "--only", "node"])
        .assert()
        .success()
        .stderr(predicate::str::contains("laptop has none of the requested update types"))
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["summary"]["total"], 1);
    assert_eq!(value["summary"]["failed"], 0);
    assert!(value["systems"]["laptop"].as_object().unwrap().is_empty());
}

#[test]
fn test_list_shows_systems() {
    let dir = TempDir::new().unwrap();

    updall(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("laptop"))
        .stdout(predicate::str::contains("rust"));
}
