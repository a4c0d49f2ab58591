//! Integration tests for the trofos CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A trofos command running inside `dir`, isolated from the caller's
/// environment overrides.
fn trofos(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("trofos");
    cmd.current_dir(dir.path());
    for key in [
        "TROFOS_HOST",
        "TROFOS_PORT",
        "TROFOS_DB_PATH",
        "TROFOS_STATIC_DIR",
        "TROFOS_ADMIN_EMAIL",
        "TROFOS_ADMIN_PASSWORD",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_trofos_help() {
        let dir = TempDir::new().unwrap();
        trofos(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("create-user"));
    }

    #[test]
    fn test_trofos_version() {
        let dir = TempDir::new().unwrap();
        trofos(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        trofos(&dir).arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Database Commands
// =============================================================================

mod database {
    use super::*;

    #[test]
    fn test_init_db_creates_default_database() {
        let dir = TempDir::new().unwrap();

        trofos(&dir)
            .arg("init-db")
            .assert()
            .success()
            .stdout(predicate::str::contains("Database initialized"));

        assert!(dir.path().join(".trofos/trofos.db").exists());
    }

    #[test]
    fn test_init_db_with_custom_path() {
        let dir = TempDir::new().unwrap();

        trofos(&dir)
            .args(["init-db", "--db-path", "data/tracker.db"])
            .assert()
            .success();

        assert!(dir.path().join("data/tracker.db").exists());
    }

    #[test]
    fn test_init_db_bootstraps_admin_from_env() {
        let dir = TempDir::new().unwrap();

        trofos(&dir)
            .env("TROFOS_ADMIN_EMAIL", "root@example.com")
            .env("TROFOS_ADMIN_PASSWORD", "secret")
            .arg("init-db")
            .assert()
            .success()
            .stdout(predicate::str::contains("Created admin account root@example.com"));

        // Second run finds the account and leaves it alone.
        trofos(&dir)
            .env("TROFOS_ADMIN_EMAIL", "root@example.com")
            .env("TROFOS_ADMIN_PASSWORD", "secret")
            .arg("init-db")
            .assert()
            .success()
            .stdout(predicate::str::contains("Created admin account").not());
    }

    #[test]
    fn test_create_user() {
        let dir = TempDir::new().unwrap();

        trofos(&dir)
            .args([
                "create-user",
                "--email",
                "prof@example.com",
                "--password",
                "pw",
                "--role",
                "faculty",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created faculty user prof@example.com"));

        trofos(&dir)
            .args(["create-user", "--email", "prof@example.com", "--password", "pw"])
            .assert()
            .failure();
    }

    #[test]
    fn test_create_user_rejects_unknown_role() {
        let dir = TempDir::new().unwrap();

        trofos(&dir)
            .args([
                "create-user",
                "--email",
                "x@example.com",
                "--password",
                "pw",
                "--role",
                "janitor",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid role"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_file_sets_database_path() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("trofos.toml"),
            "[database]\npath = \"from-config.db\"\n",
        )
        .unwrap();

        trofos(&dir).arg("init-db").assert().success();

        assert!(dir.path().join("from-config.db").exists());
    }

    #[test]
    fn test_config_init_then_show() {
        let dir = TempDir::new().unwrap();

        trofos(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote trofos.toml"));
        assert!(dir.path().join("trofos.toml").exists());

        trofos(&dir)
            .args(["config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        trofos(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("port = 3000"));
    }

    #[test]
    fn test_config_show_masks_admin_password() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("trofos.toml"),
            "[admin]\nemail = \"root@example.com\"\npassword = \"hunter2\"\n",
        )
        .unwrap();

        trofos(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hunter2").not());
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("trofos.toml"),
            "[session]\nexpiry_hours = 0\n",
        )
        .unwrap();

        trofos(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("expiry_hours"));
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("trofos.toml"), "[server\nport = ").unwrap();

        trofos(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse trofos.toml"));
    }
}
