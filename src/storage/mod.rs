pub mod repository;

use rusqlite::functions::FunctionFlags;
use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

/// Environment variable overriding the default database location.
pub const DB_PATH_ENV: &str = "QUICKTASK_DB";

/// SQL function lowercasing text with Unicode rules. SQLite's own `lower()`
/// and `LIKE` fold ASCII only.
pub const FOLD_CASE_FN: &str = "fold_case";

/// The task store. Account, task and config writes go through `writer`;
/// listings and dashboard queries use `reader`, so a running aggregate does
/// not queue behind a task update.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at `$QUICKTASK_DB`, or the default path
    /// (`~/.quicktask/quicktask.db`) when unset.
    pub async fn open() -> Result<Self> {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                return Self::open_at(path).await;
            }
        }
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".quicktask");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Self::open_at(dir.join("quicktask.db")).await
    }

    /// Open (creating and migrating if needed) the store file at `path`.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening database at {}", path.display());

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// Open a private in-memory store. Reader and writer are one connection.
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )
            .map_err(|e| e.to_string())?;
            register_functions(conn).map_err(|e| e.to_string())?;
            let migrations =
                Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))]);
            migrations.to_latest(conn).map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA foreign_keys=ON;\
                 PRAGMA busy_timeout=5000;",
            )?;
            register_functions(conn)?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }
}

fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory() {
        let db = Database::open_memory().await.unwrap();

        let tables: Vec<String> = db
            .reader()
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok::<Vec<String>, rusqlite::Error>(rows.filter_map(|r| r.ok()).collect())
            })
            .await
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"tasks".to_string()));
        assert!(tables.contains(&"app_config".to_string()));
    }

    #[tokio::test]
    async fn test_fold_case_on_both_connections() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(dir.path().join("fold.db")).await.unwrap();

        for conn in [db.writer(), db.reader()] {
            let folded: Option<String> = conn
                .call(|conn| {
                    conn.query_row("SELECT fold_case('ÄRGER Über'), fold_case(NULL)", [], |row| {
                        assert!(row.get::<_, Option<String>>(1)?.is_none());
                        row.get(0)
                    })
                })
                .await
                .unwrap();
            assert_eq!(folded.as_deref(), Some("ärger über"));
        }
    }

    #[tokio::test]
    async fn test_open_at_reopens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let db = Database::open_at(&path).await.unwrap();
            db.writer()
                .call(|conn| {
                    repository::set_config(conn, "marker", "kept")?;
                    Ok::<(), rusqlite::Error>(())
                })
                .await
                .unwrap();
        }

        // Second open must not re-run the initial migration.
        let db = Database::open_at(&path).await.unwrap();
        let value = db
            .reader()
            .call(|conn| repository::get_config(conn, "marker"))
            .await
            .unwrap();
        assert_eq!(value, Some("kept".to_string()));
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::open_memory().await.unwrap();

        let result = db
            .writer()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO tasks (task_id, owner_id, title, due_date, created_at,
                        created_date_key, updated_at, updated_date_key)
                     VALUES ('t1', 'nobody', 'Orphan', '2026-01-01T00:00:00.000Z',
                        '2026-01-01T00:00:00.000Z', '2026-01-01',
                        '2026-01-01T00:00:00.000Z', '2026-01-01')",
                    [],
                )
            })
            .await;
        assert!(result.is_err(), "task without an owner row must be rejected");
    }
}
