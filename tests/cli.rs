//! CLI tests for proofreader.
//!
//! Only commands that need neither a model server nor a repository host.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn proofreader() -> Command {
    let mut cmd = cargo_bin_cmd!("proofreader");
    cmd.env_remove("PROOFREADER_MODEL")
        .env_remove("OLLAMA_HOST")
        .env_remove("GITHUB_API_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        proofreader()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn test_version() {
        proofreader().arg("--version").assert().success();
    }

    #[test]
    fn test_run_without_token_fails() {
        let dir = TempDir::new().unwrap();
        proofreader()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("GITHUB_API_TOKEN is not set"));
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_command {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();

        proofreader()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created proofreader.toml"));

        let content = fs::read_to_string(dir.path().join("proofreader.toml")).unwrap();
        assert!(content.contains("[model]"));
        assert!(content.contains("prefix = \"proofread/\""));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("proofreader.toml"), "[model]\nname = \"mine\"\n").unwrap();

        proofreader()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join("proofreader.toml")).unwrap();
        assert_eq!(content, "[model]\nname = \"mine\"\n");
    }

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();

        proofreader()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No proofreader.toml found"))
            .stdout(predicate::str::contains("name = \"qwen2.5:32b\""));
    }

    #[test]
    fn test_config_show_applies_overrides() {
        let dir = TempDir::new().unwrap();

        proofreader()
            .current_dir(dir.path())
            .env("PROOFREADER_MODEL", "from-env")
            .args(["--retry-limit", "4", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("model = \"from-env\""))
            .stdout(predicate::str::contains("retry_limit = 4"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("proofreader.toml"),
            "[policy]\nretry_limit = 0\n\n[branch]\nprefix = \"proofread\"\n",
        )
        .unwrap();

        proofreader()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings:"))
            .stdout(predicate::str::contains("retry_limit"))
            .stdout(predicate::str::contains("prefix"));
    }

    #[test]
    fn test_config_validate_valid_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("proofreader.toml"), "[model]\nname = \"m\"\n").unwrap();

        proofreader()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_custom_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/pr.toml");

        proofreader()
            .args(["--config", path.to_str().unwrap(), "config", "init"])
            .assert()
            .success();
        assert!(path.exists());
    }
}
