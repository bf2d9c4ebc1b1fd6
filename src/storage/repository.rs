use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::date_util::{date_key, format_timestamp, parse_timestamp};
use crate::model::{Task, TaskChanges, User};

/// Column list shared by every task read, in `task_from_row` order.
pub(crate) const TASK_COLUMNS: &str = "t.task_id, t.owner_id, t.title, t.description, \
     t.priority, t.status, t.due_date, t.created_at, t.updated_at";

pub(crate) fn task_from_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    Ok(Task {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        status: row.get(5)?,
        due_date: timestamp_at(row, 6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp: {raw}").into(),
        )
    })
}

// ── Users ──────────────────────────────────────────────────────────

/// Insert an account. `password_hash` is a PHC string.
pub fn insert_user(
    conn: &Connection,
    user: &User,
    password_hash: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (user_id, name, email, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.name,
            user.email,
            password_hash,
            format_timestamp(user.created_at),
        ],
    )?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
    })
}

pub fn find_user_by_id(conn: &Connection, user_id: &str) -> Result<Option<User>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, name, email, created_at FROM users WHERE user_id = ?1",
        params![user_id],
        user_from_row,
    )
    .optional()
}

/// Look up an account and its password hash by email (case-insensitive).
pub fn find_user_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<(User, String)>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, name, email, created_at, password_hash
         FROM users WHERE email = ?1",
        params![email],
        |row| Ok((user_from_row(row)?, row.get(4)?)),
    )
    .optional()
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_users(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as u64)
}

// ── Tasks ──────────────────────────────────────────────────────────
//
// Every statement below filters on `owner_id`; there is no task access path
// that takes a task id alone.

pub fn insert_task(conn: &Connection, task: &Task) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (
            task_id, owner_id, title, description, priority, status, due_date,
            created_at, created_date_key, updated_at, updated_date_key
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            task.id,
            task.owner_id,
            task.title,
            task.description,
            task.priority,
            task.status,
            format_timestamp(task.due_date),
            format_timestamp(task.created_at),
            date_key(task.created_at),
            format_timestamp(task.updated_at),
            date_key(task.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_task(
    conn: &Connection,
    owner_id: &str,
    task_id: &str,
) -> Result<Option<Task>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.task_id = ?1 AND t.owner_id = ?2"),
        params![task_id, owner_id],
        task_from_row,
    )
    .optional()
}

/// Apply a validated partial update. Returns the updated task, or `None`
/// when no task with this id belongs to `owner_id`.
///
/// An empty change set is not a modification: `updated_at` stays put.
pub fn update_task(
    conn: &Connection,
    owner_id: &str,
    task_id: &str,
    changes: &TaskChanges,
    now: DateTime<Utc>,
) -> Result<Option<Task>, rusqlite::Error> {
    if changes.is_empty() {
        return get_task(conn, owner_id, task_id);
    }

    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref title) = changes.title {
        values.push(Box::new(title.clone()));
        sets.push(format!("title = ?{}", values.len()));
    }
    if let Some(ref description) = changes.description {
        values.push(Box::new(description.clone()));
        sets.push(format!("description = ?{}", values.len()));
    }
    if let Some(priority) = changes.priority {
        values.push(Box::new(priority));
        sets.push(format!("priority = ?{}", values.len()));
    }
    if let Some(status) = changes.status {
        values.push(Box::new(status));
        sets.push(format!("status = ?{}", values.len()));
    }
    if let Some(due_date) = changes.due_date {
        values.push(Box::new(format_timestamp(due_date)));
        sets.push(format!("due_date = ?{}", values.len()));
    }

    values.push(Box::new(format_timestamp(now)));
    sets.push(format!("updated_at = ?{}", values.len()));
    values.push(Box::new(date_key(now)));
    sets.push(format!("updated_date_key = ?{}", values.len()));

    values.push(Box::new(task_id.to_string()));
    let task_idx = values.len();
    values.push(Box::new(owner_id.to_string()));
    let owner_idx = values.len();

    let sql = format!(
        "UPDATE tasks SET {} WHERE task_id = ?{task_idx} AND owner_id = ?{owner_idx}",
        sets.join(", ")
    );
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        values.iter().map(|p| p.as_ref()).collect();
    let changed = conn.execute(&sql, param_refs.as_slice())?;
    if changed == 0 {
        return Ok(None);
    }
    get_task(conn, owner_id, task_id)
}

pub fn delete_task(
    conn: &Connection,
    owner_id: &str,
    task_id: &str,
) -> Result<bool, rusqlite::Error> {
    let deleted = conn.execute(
        "DELETE FROM tasks WHERE task_id = ?1 AND owner_id = ?2",
        params![task_id, owner_id],
    )?;
    Ok(deleted > 0)
}

pub fn count_tasks(conn: &Connection) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
    Ok(count as u64)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_config(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let deleted = conn.execute("DELETE FROM app_config WHERE key = ?1", params![key])?;
    Ok(deleted > 0)
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}


#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::test_support::*;
    use super::*;
    use crate::model::{Priority, Status};
    use crate::storage::Database;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_task_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                add_user(conn, "u1", "Alice")?;
                add_task(
                    conn,
                    "t1",
                    "u1",
                    "Write report",
                    Priority::High,
                    Status::InProgress,
                    ts(2026, 3, 1),
                    ts(2026, 1, 1),
                    ts(2026, 1, 2),
                )?;

                let task = get_task(conn, "u1", "t1")?.expect("task should exist");
                assert_eq!(task.title, "Write report");
                assert_eq!(task.priority, Priority::High);
                assert_eq!(task.status, Status::InProgress);
                assert_eq!(task.due_date, ts(2026, 3, 1));
                assert_eq!(task.updated_at, ts(2026, 1, 2));

                let key: String = conn.query_row(
                    "SELECT created_date_key FROM tasks WHERE task_id = 't1'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(key, "2026-01-01");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_task_access_is_owner_scoped() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                add_user(conn, "u1", "Alice")?;
                add_user(conn, "u2", "Bob")?;
                add_task(
                    conn,
                    "t1",
                    "u1",
                    "Private",
                    Priority::Low,
                    Status::Todo,
                    ts(2026, 3, 1),
                    ts(2026, 1, 1),
                    ts(2026, 1, 1),
                )?;

                // Another user sees nothing, cannot update and cannot delete.
                assert_eq!(get_task(conn, "u2", "t1")?, None);
                let changes = TaskChanges {
                    title: Some("Hijacked".into()),
                    ..Default::default()
                };
                assert_eq!(update_task(conn, "u2", "t1", &changes, ts(2026, 2, 1))?, None);
                assert!(!delete_task(conn, "u2", "t1")?);

                let task = get_task(conn, "u1", "t1")?.unwrap();
                assert_eq!(task.title, "Private");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_task_partial_and_bumps_updated_at() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                add_user(conn, "u1", "Alice")?;
                add_task(
                    conn,
                    "t1",
                    "u1",
                    "Draft",
                    Priority::Medium,
                    Status::Todo,
                    ts(2026, 3, 1),
                    ts(2026, 1, 1),
                    ts(2026, 1, 1),
                )?;

                let changes = TaskChanges {
                    status: Some(Status::Completed),
                    ..Default::default()
                };
                let task = update_task(conn, "u1", "t1", &changes, ts(2026, 1, 20))?.unwrap();
                assert_eq!(task.status, Status::Completed);
                assert_eq!(task.title, "Draft");
                assert_eq!(task.priority, Priority::Medium);
                assert_eq!(task.updated_at, ts(2026, 1, 20));
                assert_eq!(task.created_at, ts(2026, 1, 1));

                let key: String = conn.query_row(
                    "SELECT updated_date_key FROM tasks WHERE task_id = 't1'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(key, "2026-01-20");

                // No-op update leaves the modification time alone.
                let task =
                    update_task(conn, "u1", "t1", &TaskChanges::default(), ts(2026, 2, 1))?
                        .unwrap();
                assert_eq!(task.updated_at, ts(2026, 1, 20));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_task() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                add_user(conn, "u1", "Alice")?;
                add_task(
                    conn,
                    "t1",
                    "u1",
                    "Gone soon",
                    Priority::Medium,
                    Status::Todo,
                    ts(2026, 3, 1),
                    ts(2026, 1, 1),
                    ts(2026, 1, 1),
                )?;
                assert!(delete_task(conn, "u1", "t1")?);
                assert!(!delete_task(conn, "u1", "t1")?);
                assert_eq!(count_tasks(conn)?, 0);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_user_by_email_case_insensitive() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                add_user(conn, "u1", "Alice")?;
                let (user, password_hash) =
                    find_user_by_email(conn, "ALICE@example.com")?.expect("user should match");
                assert_eq!(user.id, "u1");
                assert!(password_hash.starts_with("$argon2id$"));
                assert!(email_exists(conn, "alice@EXAMPLE.com")?);
                assert!(find_user_by_email(conn, "bob@example.com")?.is_none());
                assert_eq!(find_user_by_id(conn, "u1")?.unwrap().name, "Alice");
                assert!(find_user_by_id(conn, "u2")?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                assert_eq!(get_config(conn, "default_days")?, None);
                set_config(conn, "default_days", "14")?;
                set_config(conn, "default_days", "7")?;
                set_config(conn, "token_ttl_hours", "24")?;
                assert_eq!(get_config(conn, "default_days")?, Some("7".to_string()));
                assert_eq!(
                    list_config(conn)?,
                    vec![
                        ("default_days".to_string(), "7".to_string()),
                        ("token_ttl_hours".to_string(), "24".to_string()),
                    ]
                );
                assert!(delete_config(conn, "default_days")?);
                assert_eq!(get_config(conn, "default_days")?, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
