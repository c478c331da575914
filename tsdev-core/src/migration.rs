//! SQL migrations with batch tracking.
//!
//! Migrations are plain SQL files in `migrations/`, named
//! `<YYYYMMDDHHMMSS>_<name>.sql` and applied in file-name order. Each file
//! carries an up section and a down section:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! Applied migrations are recorded in a tracking table together with a batch
//! number. Every `latest` call applies all pending files as one new batch, and
//! `rollback` reverts the most recent batch (or all of them).

use async_trait::async_trait;
use sqlx::{AnyPool, Executor, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::database::{Client, DatabaseConfig};
use crate::error::{DatabaseError, MigrationError};

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// Written into every new migration file.
pub const MIGRATION_TEMPLATE: &str = "-- migrate:up\n\n\n-- migrate:down\n\n";

/// Where migrations live and how they are tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Migrations directory, relative to the project root.
    pub directory: PathBuf,
    /// Extension (without the dot) of migration files.
    pub file_extension: String,
    /// Table recording applied migrations.
    pub tracking_table_name: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            file_extension: "sql".to_string(),
            tracking_table_name: "tsdev_migrations".to_string(),
        }
    }
}

/// The operations migration commands forward to.
#[async_trait]
pub trait MigrationClient {
    /// Create a new migration file from the template and return its path.
    async fn make(&self, name: &str) -> Result<PathBuf, MigrationError>;

    /// Apply every pending migration as one batch. Returns the applied files.
    async fn latest(&self) -> Result<Vec<String>, MigrationError>;

    /// Revert the last batch, or every batch when `all` is set. Returns the
    /// reverted files, newest first.
    async fn rollback(&self, all: bool) -> Result<Vec<String>, MigrationError>;

    /// Release the connection pool.
    async fn destroy(&self);
}

/// Migration client backed by a `sqlx` pool.
pub struct Migrator {
    root: PathBuf,
    config: MigrationConfig,
    client: Client,
    pool: AnyPool,
}

struct AppliedMigration {
    name: String,
    batch: i64,
}

impl Migrator {
    /// Build a migrator for the project at `project_root`.
    ///
    /// Must be called from within a Tokio runtime. No connection is opened
    /// until a migration query runs.
    pub fn new(
        project_root: &Path,
        database: &DatabaseConfig,
        config: MigrationConfig,
    ) -> Result<Self, DatabaseError> {
        Ok(Self {
            root: project_root.to_path_buf(),
            config,
            client: database.client,
            pool: database.pool()?,
        })
    }

    fn directory(&self) -> PathBuf {
        self.root.join(&self.config.directory)
    }

    fn table(&self) -> &str {
        &self.config.tracking_table_name
    }

    async fn ensure_table(&self) -> Result<(), MigrationError> {
        let ddl = self.client.tracking_table_ddl(self.table());
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        let sql = format!("SELECT name, batch FROM {} ORDER BY id", self.table());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<AppliedMigration, MigrationError> {
                Ok(AppliedMigration {
                    name: row.try_get("name")?,
                    batch: row.try_get("batch")?,
                })
            })
            .collect()
    }

    /// Fails if a recorded migration no longer has a file on disk.
    fn validate(&self, applied: &[AppliedMigration], files: &[String]) -> Result<(), MigrationError> {
        let on_disk: HashSet<&str> = files.iter().map(String::as_str).collect();
        let missing: Vec<String> = applied
            .iter()
            .filter(|m| !on_disk.contains(m.name.as_str()))
            .map(|m| m.name.clone())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::CorruptDirectory(missing))
        }
    }

    async fn load(&self, name: &str) -> Result<MigrationFile, MigrationError> {
        let path = self.directory().join(name);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrationError::io(&path, e))?;
        MigrationFile::parse(name, &content)
    }

    async fn apply(&self, file: &MigrationFile, batch: i64) -> Result<(), MigrationError> {
        let insert = format!(
            "INSERT INTO {} (name, batch, migration_time) VALUES ({}, {}, {})",
            self.table(),
            self.client.placeholder(1),
            self.client.placeholder(2),
            self.client.placeholder(3),
        );
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        if !file.up.trim().is_empty() {
            (&mut *tx).execute(sqlx::raw_sql(&file.up))
                .await
                .map_err(|source| MigrationError::Migration {
                    name: file.name.clone(),
                    source,
                })?;
        }
        sqlx::query(&insert)
            .bind(file.name.as_str())
            .bind(batch)
            .bind(now.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn revert(&self, file: &MigrationFile) -> Result<(), MigrationError> {
        let delete = format!(
            "DELETE FROM {} WHERE name = {}",
            self.table(),
            self.client.placeholder(1)
        );

        let mut tx = self.pool.begin().await?;
        if !file.down.trim().is_empty() {
            (&mut *tx).execute(sqlx::raw_sql(&file.down))
                .await
                .map_err(|source| MigrationError::Migration {
                    name: file.name.clone(),
                    source,
                })?;
        }
        sqlx::query(&delete)
            .bind(file.name.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationClient for Migrator {
    async fn make(&self, name: &str) -> Result<PathBuf, MigrationError> {
        validate_name(name)?;

        let dir = self.directory();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MigrationError::io(&dir, e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let path = dir.join(migration_file_name(&timestamp, name, &self.config.file_extension));
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(MigrationError::AlreadyExists(path));
            }
            Err(e) => return Err(MigrationError::io(&path, e)),
        };
        file.write_all(MIGRATION_TEMPLATE.as_bytes())
            .await
            .map_err(|e| MigrationError::io(&path, e))?;
        file.flush().await.map_err(|e| MigrationError::io(&path, e))?;
        tracing::info!(path = %path.display(), "created migration");
        Ok(path)
    }

    async fn latest(&self) -> Result<Vec<String>, MigrationError> {
        self.ensure_table().await?;
        let files = list_migration_files(&self.directory(), &self.config.file_extension).await?;
        let applied = self.applied().await?;
        self.validate(&applied, &files)?;

        let done: HashSet<&str> = applied.iter().map(|m| m.name.as_str()).collect();
        let pending: Vec<&String> = files.iter().filter(|f| !done.contains(f.as_str())).collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let batch = applied.iter().map(|m| m.batch).max().unwrap_or(0) + 1;
        tracing::info!(batch, count = pending.len(), "running pending migrations");

        let mut migrated = Vec::with_capacity(pending.len());
        for name in pending {
            let file = self.load(name).await?;
            self.apply(&file, batch).await?;
            tracing::debug!(name = %name, batch, "migration applied");
            migrated.push(name.clone());
        }
        Ok(migrated)
    }

    async fn rollback(&self, all: bool) -> Result<Vec<String>, MigrationError> {
        self.ensure_table().await?;
        let files = list_migration_files(&self.directory(), &self.config.file_extension).await?;
        let applied = self.applied().await?;
        self.validate(&applied, &files)?;

        let last_batch = applied.iter().map(|m| m.batch).max();
        let targets: Vec<&AppliedMigration> = applied
            .iter()
            .rev()
            .filter(|m| all || Some(m.batch) == last_batch)
            .collect();

        tracing::info!(all, count = targets.len(), "rolling back migrations");

        let mut reverted = Vec::with_capacity(targets.len());
        for migration in targets {
            let file = self.load(&migration.name).await?;
            self.revert(&file).await?;
            tracing::debug!(name = %migration.name, "migration reverted");
            reverted.push(migration.name.clone());
        }
        Ok(reverted)
    }

    async fn destroy(&self) {
        self.pool.close().await;
    }
}

/// A parsed migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub name: String,
    pub up: String,
    pub down: String,
}

impl MigrationFile {
    /// Split `content` into its up and down sections.
    ///
    /// Anything before the first marker is ignored. The up marker is
    /// required, the down marker is not.
    pub fn parse(name: &str, content: &str) -> Result<Self, MigrationError> {
        enum Section {
            Preamble,
            Up,
            Down,
        }

        let mut section = Section::Preamble;
        let mut seen_up = false;
        let mut up = String::new();
        let mut down = String::new();

        for line in content.lines() {
            match line.trim() {
                UP_MARKER => {
                    section = Section::Up;
                    seen_up = true;
                    continue;
                }
                DOWN_MARKER => {
                    section = Section::Down;
                    continue;
                }
                _ => {}
            }
            let target = match section {
                Section::Preamble => continue,
                Section::Up => &mut up,
                Section::Down => &mut down,
            };
            target.push_str(line);
            target.push('\n');
        }

        if !seen_up {
            return Err(MigrationError::MalformedFile {
                name: name.to_string(),
                reason: format!("missing '{}' marker", UP_MARKER),
            });
        }

        Ok(Self {
            name: name.to_string(),
            up,
            down,
        })
    }
}

/// Migration names must be lowercase alphanumeric with underscores.
pub fn validate_name(name: &str) -> Result<(), MigrationError> {
    if name.is_empty() {
        return Err(MigrationError::InvalidName(
            "Migration name cannot be empty".to_string(),
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '_' {
            return Err(MigrationError::InvalidName(format!(
                "Migration name must be lowercase alphanumeric with underscores, got '{}'",
                c
            )));
        }
    }

    if name.starts_with('_') || name.ends_with('_') {
        return Err(MigrationError::InvalidName(
            "Migration name cannot start or end with underscore".to_string(),
        ));
    }

    Ok(())
}

pub fn migration_file_name(timestamp: &str, name: &str, extension: &str) -> String {
    format!("{}_{}.{}", timestamp, name, extension)
}

/// Migration file names in `dir`, sorted. A missing directory has none.
pub async fn list_migration_files(dir: &Path, extension: &str) -> Result<Vec<String>, MigrationError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(MigrationError::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| MigrationError::io(dir, e))?
    {
        let path = entry.path();
        if path.is_file()
            && path.extension().is_some_and(|ext| ext == extension)
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
        {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}
