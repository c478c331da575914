//! End-to-end tests for the `tsdev` binary: exit codes and printed lines.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn tsdev(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tsdev").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("DATABASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    tsdev(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("tsdev "));
}

#[test]
fn test_new_without_path_exits_1() {
    let dir = TempDir::new().unwrap();
    tsdev(dir.path())
        .arg("new")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Project path is required"));
}

#[test]
fn test_new_with_empty_path_exits_1() {
    let dir = TempDir::new().unwrap();
    tsdev(dir.path()).args(["new", ""]).assert().code(1);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_migration_make_without_name_exits_1() {
    let dir = TempDir::new().unwrap();
    tsdev(dir.path())
        .arg("migration:make")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Migration name is required"));
    assert!(!dir.path().join("migrations").exists());
}

#[test]
fn test_migration_without_database_config_prints_template() {
    let dir = TempDir::new().unwrap();
    tsdev(dir.path())
        .arg("migration:run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("database.json"))
        .stderr(predicate::str::contains("\"client\": \"postgres\""));
}

#[test]
fn test_build_with_missing_meta_file_exits_1() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), "{}").unwrap();
    tsdev(dir.path())
        .args(["build", "--clean"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".env"));
}

#[test]
fn test_malformed_manifest_exits_1() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("tsdev.json"), "{ nope").unwrap();
    tsdev(dir.path())
        .arg("build")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tsdev.json"));
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("database.json"),
            r#"{ "client": "sqlite", "connection": "sqlite://app.db?mode=rwc" }"#,
        )
        .unwrap();
        dir
    }

    fn write_migration(dir: &Path, name: &str, table: &str) {
        fs::create_dir_all(dir.join("migrations")).unwrap();
        fs::write(
            dir.join("migrations").join(name),
            format!(
                "-- migrate:up\nCREATE TABLE {table} (id INTEGER PRIMARY KEY);\n\n-- migrate:down\nDROP TABLE {table};\n"
            ),
        )
        .unwrap();
    }

    fn stdout_lines(output: &std::process::Output) -> Vec<String> {
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_run_with_nothing_pending_prints_one_line() {
        let dir = project();
        let output = tsdev(dir.path())
            .arg("migration:run")
            .assert()
            .success()
            .get_output()
            .clone();

        assert_eq!(
            stdout_lines(&output),
            vec!["Already up to date, nothing to migrate"]
        );
    }

    #[test]
    fn test_run_prints_migrated_files_in_order() {
        let dir = project();
        write_migration(dir.path(), "20240102000000_create_posts.sql", "posts");
        write_migration(dir.path(), "20240101000000_create_users.sql", "users");

        let output = tsdev(dir.path())
            .arg("migration:run")
            .assert()
            .success()
            .get_output()
            .clone();

        assert_eq!(
            stdout_lines(&output),
            vec![
                "migrated: 20240101000000_create_users.sql",
                "migrated: 20240102000000_create_posts.sql"
            ]
        );
    }

    #[test]
    fn test_rollback_reverts_latest_batch() {
        let dir = project();
        write_migration(dir.path(), "20240101000000_create_users.sql", "users");
        tsdev(dir.path()).arg("migration:run").assert().success();
        write_migration(dir.path(), "20240102000000_create_posts.sql", "posts");
        tsdev(dir.path()).arg("migration:run").assert().success();

        tsdev(dir.path())
            .arg("migration:rollback")
            .assert()
            .success()
            .stdout("rollback: 20240102000000_create_posts.sql\n");

        tsdev(dir.path())
            .args(["migration:rollback", "--all"])
            .assert()
            .success()
            .stdout("rollback: 20240101000000_create_users.sql\n");

        tsdev(dir.path())
            .arg("migration:rollback")
            .assert()
            .success()
            .stdout("Already at the base migration\n");
    }

    #[test]
    fn test_make_creates_migration_file() {
        let dir = project();
        tsdev(dir.path())
            .args(["migration:make", "create_users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("migrations/"))
            .stdout(predicate::str::contains("_create_users.sql"));

        let files: Vec<_> = fs::read_dir(dir.path().join("migrations"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("_create_users.sql"));
    }

    #[test]
    fn test_make_with_invalid_name_exits_1() {
        let dir = project();
        tsdev(dir.path())
            .args(["migration:make", "CreateUsers"])
            .assert()
            .code(1);
        assert!(!dir.path().join("migrations").exists());
    }
}
