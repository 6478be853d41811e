//! Binary-level checks for `wardctl`.

use assert_cmd::Command;
use predicates::prelude::*;

const POLICIES: &str = r#"{
    "policies": [
        {
            "kind": "critical-lab",
            "severity": "high",
            "ladder": [
                { "delay_secs": 0, "tier": "ward-nurse", "channel": "in-app" },
                { "delay_secs": 900, "tier": "resident", "channel": "pager" }
            ]
        }
    ]
}"#;

fn policy_file(name: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("wardctl-{}-{name}.json", std::process::id()));
    std::fs::write(&path, POLICIES).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("wardctl")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("policy"))
        .stdout(predicate::str::contains("simulate"));
}

#[test]
fn policy_check_prints_ladders() {
    let path = policy_file("check");
    Command::cargo_bin("wardctl")
        .unwrap()
        .args(["policy", "check"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("critical-lab / high"))
        .stdout(predicate::str::contains("resident"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn policy_resolve_reports_fallback_as_json() {
    let path = policy_file("resolve");
    Command::cargo_bin("wardctl")
        .unwrap()
        .args(["--output", "json", "policy", "resolve"])
        .arg(&path)
        .args(["--kind", "critical-lab", "--severity", "low"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"source\": \"generic\""));
    let _ = std::fs::remove_file(path);
}

#[test]
fn invalid_policy_file_fails() {
    let path = std::env::temp_dir().join(format!("wardctl-{}-bad.json", std::process::id()));
    std::fs::write(&path, r#"{ "policies": [ { "kind": "critical-lab", "ladder": [] } ] }"#)
        .unwrap();
    Command::cargo_bin("wardctl")
        .unwrap()
        .args(["policy", "check"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
    let _ = std::fs::remove_file(path);
}
