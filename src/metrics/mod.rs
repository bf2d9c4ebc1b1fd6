pub mod types;

pub use types::*;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::date_util::{format_timestamp, round2};
use crate::error::{Error, Result};
use crate::ident::parse_id;
use crate::model::{Priority, Status};
use crate::query::window::RollingWindow;
use crate::storage::repository;
use crate::storage::Database;

/// Integer completion percentage, rounded half up. 0 when `total` is 0.
pub fn completion_rate(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Compute the dashboard for one owner as of `now`.
pub async fn compute_dashboard(
    db: &Database,
    owner_id: &str,
    now: DateTime<Utc>,
) -> Result<DashboardStats> {
    let owner_id = parse_id("user", owner_id)?;
    let now_str = format_timestamp(now);

    db.reader()
        .call(move |conn| compute_stats_sql(conn, &owner_id, &now_str))
        .await
        .map_err(|e| Error::Database(e.to_string()))
}

/// Dashboard statistics for the user named by `user_id`, with their name.
pub async fn compute_user_stats(
    db: &Database,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<UserStats> {
    let user_id = parse_id("user", user_id)?;
    let now_str = format_timestamp(now);

    let found = db
        .reader()
        .call(move |conn| {
            let Some(user) = repository::find_user_by_id(conn, &user_id)? else {
                return Ok::<Option<UserStats>, rusqlite::Error>(None);
            };
            let stats = compute_stats_sql(conn, &user.id, &now_str)?;
            Ok(Some(UserStats {
                user_id: user.id,
                user_name: user.name,
                stats,
            }))
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    found.ok_or_else(|| Error::NotFound("User".into()))
}

/// Daily created/completed counts over the `days`-long window ending at
/// `now`. `days` is clamped to 1..=365.
pub async fn compute_productivity(
    db: &Database,
    user_id: &str,
    days: i64,
    now: DateTime<Utc>,
) -> Result<ProductivityReport> {
    let user_id = parse_id("user", user_id)?;
    let window = RollingWindow::ending_at(days, now);

    let exists = db
        .reader()
        .call({
            let user_id = user_id.clone();
            move |conn| repository::find_user_by_id(conn, &user_id)
        })
        .await?
        .is_some();
    if !exists {
        return Err(Error::NotFound("User".into()));
    }

    let (start, end) = window.timestamp_bounds();
    log::debug!("productivity for {user_id}: {start} .. {end}");

    // The two sub-queries are independent.
    let created = db.reader().call({
        let (user_id, start, end) = (user_id.clone(), start.clone(), end.clone());
        move |conn| created_per_day_sql(conn, &user_id, &start, &end)
    });
    let completed = db.reader().call({
        let user_id = user_id.clone();
        move |conn| completed_per_day_sql(conn, &user_id, &start, &end)
    });
    let (created, completed) = tokio::try_join!(
        async { created.await.map_err(Error::from) },
        async { completed.await.map_err(Error::from) },
    )?;

    Ok(build_report(user_id, &window, &created, &completed))
}

fn build_report(
    user_id: String,
    window: &RollingWindow,
    created: &HashMap<String, u64>,
    completed: &HashMap<String, u64>,
) -> ProductivityReport {
    let daily_data: Vec<DailyActivity> = window
        .day_keys()
        .into_iter()
        .map(|date| DailyActivity {
            created: created.get(&date).copied().unwrap_or(0),
            completed: completed.get(&date).copied().unwrap_or(0),
            date,
        })
        .collect();

    let total_created: u64 = daily_data.iter().map(|d| d.created).sum();
    let total_completed: u64 = daily_data.iter().map(|d| d.completed).sum();

    ProductivityReport {
        user_id,
        period_days: window.days,
        start_date: window.start_key(),
        end_date: window.end_key(),
        total_created,
        total_completed,
        average_daily_completions: round2(total_completed as f64 / window.days as f64),
        daily_data,
    }
}

// ── SQL helpers ────────────────────────────────────────────────

/// One pass over the owner's tasks. Every count comes from the same scan,
/// so the breakdowns always sum to `total`.
fn compute_stats_sql(
    conn: &Connection,
    owner_id: &str,
    now: &str,
) -> std::result::Result<DashboardStats, rusqlite::Error> {
    let sql = format!(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN status = '{todo}' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = '{in_progress}' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status = '{completed}' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN priority = '{high}' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN priority = '{medium}' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN priority = '{low}' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN status != '{completed}' AND due_date < ?2 THEN 1 ELSE 0 END), 0)
         FROM tasks
         WHERE owner_id = ?1",
        todo = Status::Todo.as_str(),
        in_progress = Status::InProgress.as_str(),
        completed = Status::Completed.as_str(),
        high = Priority::High.as_str(),
        medium = Priority::Medium.as_str(),
        low = Priority::Low.as_str(),
    );

    conn.query_row(&sql, params![owner_id, now], |row| {
        let total: i64 = row.get(0)?;
        let by_status = StatusBreakdown {
            todo: row.get::<_, i64>(1)? as u64,
            in_progress: row.get::<_, i64>(2)? as u64,
            completed: row.get::<_, i64>(3)? as u64,
        };
        let by_priority = PriorityBreakdown {
            high: row.get::<_, i64>(4)? as u64,
            medium: row.get::<_, i64>(5)? as u64,
            low: row.get::<_, i64>(6)? as u64,
        };
        let overdue: i64 = row.get(7)?;
        let total = total as u64;

        Ok(DashboardStats {
            total,
            completed: by_status.completed,
            in_progress: by_status.in_progress,
            todo: by_status.todo,
            overdue: overdue as u64,
            completion_rate: completion_rate(by_status.completed, total),
            by_priority,
            by_status,
        })
    })
}

/// Tasks created in `[start, end]`, grouped by UTC creation day.
fn created_per_day_sql(
    conn: &Connection,
    owner_id: &str,
    start: &str,
    end: &str,
) -> std::result::Result<HashMap<String, u64>, rusqlite::Error> {
    group_counts(
        conn,
        "SELECT created_date_key, COUNT(*)
         FROM tasks
         WHERE owner_id = ?1 AND created_at >= ?2 AND created_at <= ?3
         GROUP BY created_date_key",
        owner_id,
        start,
        end,
    )
}

/// Completed tasks whose last update falls in `[start, end]`, grouped by
/// UTC update day.
fn completed_per_day_sql(
    conn: &Connection,
    owner_id: &str,
    start: &str,
    end: &str,
) -> std::result::Result<HashMap<String, u64>, rusqlite::Error> {
    let sql = format!(
        "SELECT updated_date_key, COUNT(*)
         FROM tasks
         WHERE owner_id = ?1 AND status = '{}' AND updated_at >= ?2 AND updated_at <= ?3
         GROUP BY updated_date_key",
        Status::Completed.as_str()
    );
    group_counts(conn, &sql, owner_id, start, end)
}

fn group_counts(
    conn: &Connection,
    sql: &str,
    owner_id: &str,
    start: &str,
    end: &str,
) -> std::result::Result<HashMap<String, u64>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![owner_id, start, end], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::storage::repository::test_support::{add_task, add_user};

    const ALICE: &str = "00000000-0000-4000-8000-00000000000a";
    const BOB: &str = "00000000-0000-4000-8000-00000000000b";
    const NOBODY: &str = "00000000-0000-4000-8000-0000000000ff";

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    async fn with_users() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                add_user(conn, ALICE, "Alice")?;
                add_user(conn, BOB, "Bob")?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    /// Tasks A, B, C for Alice, plus one task for Bob that must never count.
    async fn dashboard_fixture() -> Database {
        let db = with_users().await;
        db.writer()
            .call(|conn| {
                let created = at(2026, 1, 10, 9);
                add_task(conn, "A", ALICE, "A", Priority::High, Status::Completed, at(2026, 1, 1, 0), created, created)?;
                add_task(conn, "B", ALICE, "B", Priority::Medium, Status::Todo, at(2026, 3, 1, 0), created, created)?;
                add_task(conn, "C", ALICE, "C", Priority::Low, Status::InProgress, at(2020, 1, 1, 0), created, created)?;
                add_task(conn, "X", BOB, "X", Priority::High, Status::Todo, at(2020, 1, 1, 0), created, created)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(1, 2), 50);
        assert_eq!(completion_rate(1, 8), 13);
        assert_eq!(completion_rate(5, 5), 100);
    }

    #[tokio::test]
    async fn test_dashboard_end_to_end() {
        let db = dashboard_fixture().await;
        let stats = compute_dashboard(&db, ALICE, at(2026, 2, 1, 0)).await.unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.todo, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.completion_rate, 33);
        assert_eq!(
            stats.by_priority,
            PriorityBreakdown {
                high: 1,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(stats.by_status.total(), stats.total);
        assert_eq!(stats.by_priority.total(), stats.total);
    }

    #[tokio::test]
    async fn test_dashboard_json_shape() {
        let db = dashboard_fixture().await;
        let stats = compute_dashboard(&db, ALICE, at(2026, 2, 1, 0)).await.unwrap();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["inProgress"], 1);
        assert_eq!(json["completionRate"], 33);
        assert_eq!(json["byPriority"]["High"], 1);
        assert_eq!(json["byStatus"]["In Progress"], 1);
    }

    #[tokio::test]
    async fn test_dashboard_empty_user() {
        let db = with_users().await;
        let stats = compute_dashboard(&db, ALICE, at(2026, 2, 1, 0)).await.unwrap();
        assert_eq!(stats, DashboardStats::default());
        assert_eq!(stats.completion_rate, 0);
    }

    #[tokio::test]
    async fn test_dashboard_is_deterministic() {
        let db = dashboard_fixture().await;
        let now = at(2026, 2, 1, 0);
        let first = serde_json::to_string(&compute_dashboard(&db, ALICE, now).await.unwrap()).unwrap();
        let second = serde_json::to_string(&compute_dashboard(&db, ALICE, now).await.unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dashboard_rejects_malformed_owner() {
        let db = with_users().await;
        let err = compute_dashboard(&db, "42", at(2026, 2, 1, 0)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_due_dates_never_reach_dashboard() {
        let db = dashboard_fixture().await;
        for due in ["+10000-01-01", "-0001-01-01"] {
            let input = crate::model::NewTask {
                title: Some("Far".into()),
                due_date: Some(due.into()),
                ..Default::default()
            };
            let err = crate::tasks::create_task(&db, ALICE, &input, at(2026, 2, 1, 0))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Due date must be a valid date", "{due}");
        }

        let stats = compute_dashboard(&db, ALICE, at(2026, 2, 1, 0)).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.overdue, 1);

        let params = crate::query::engine::ListTasksParams {
            sort_by: Some("dueDate".into()),
            ..Default::default()
        };
        let tasks = crate::query::engine::list_tasks(&db, ALICE, &params).await.unwrap();
        assert_eq!(tasks.len(), 3);
    }

    #[tokio::test]
    async fn test_user_stats() {
        let db = dashboard_fixture().await;
        let stats = compute_user_stats(&db, ALICE, at(2026, 2, 1, 0)).await.unwrap();
        assert_eq!(stats.user_name, "Alice");
        assert_eq!(stats.stats.total, 3);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["user_name"], "Alice");
        assert_eq!(json["total"], 3);

        let err = compute_user_stats(&db, NOBODY, at(2026, 2, 1, 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");

        let err = compute_user_stats(&db, "nope", at(2026, 2, 1, 0)).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid user ID");
    }

    #[tokio::test]
    async fn test_productivity_window_complete_with_no_tasks() {
        let db = with_users().await;
        let report = compute_productivity(&db, ALICE, 7, at(2026, 2, 1, 12)).await.unwrap();

        assert_eq!(report.daily_data.len(), 8);
        assert_eq!(report.start_date, "2026-01-25");
        assert_eq!(report.end_date, "2026-02-01");
        let dates: Vec<&str> = report.daily_data.iter().map(|d| d.date.as_str()).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert!(report
            .daily_data
            .iter()
            .all(|d| d.created == 0 && d.completed == 0));
        assert_eq!(report.average_daily_completions, 0.0);
    }

    #[tokio::test]
    async fn test_productivity_buckets() {
        let db = with_users().await;
        let now = at(2026, 2, 1, 12);
        db.writer()
            .call(move |conn| {
                let due = at(2026, 3, 1, 0);
                // Created and completed inside the window.
                add_task(conn, "t1", ALICE, "t1", Priority::High, Status::Completed, due, at(2026, 1, 28, 8), at(2026, 1, 30, 23))?;
                add_task(conn, "t2", ALICE, "t2", Priority::Low, Status::Todo, due, at(2026, 1, 28, 20), at(2026, 1, 31, 10))?;
                // Created before the window, completed inside it.
                add_task(conn, "t3", ALICE, "t3", Priority::Low, Status::Completed, due, at(2025, 12, 1, 0), at(2026, 2, 1, 6))?;
                // Before the window start on the first bucket day.
                add_task(conn, "t4", ALICE, "t4", Priority::Low, Status::Todo, due, at(2026, 1, 25, 11), at(2026, 1, 25, 11))?;
                // Someone else's.
                add_task(conn, "x1", BOB, "x1", Priority::Low, Status::Completed, due, at(2026, 1, 28, 8), at(2026, 1, 28, 8))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let report = compute_productivity(&db, ALICE, 7, now).await.unwrap();
        let day = |date: &str| {
            report
                .daily_data
                .iter()
                .find(|d| d.date == date)
                .cloned()
                .unwrap()
        };

        assert_eq!(day("2026-01-28").created, 2);
        assert_eq!(day("2026-01-28").completed, 0);
        assert_eq!(day("2026-01-30").completed, 1);
        assert_eq!(day("2026-02-01").completed, 1);
        assert_eq!(day("2026-01-25").created, 0);
        assert_eq!(report.total_created, 2);
        assert_eq!(report.total_completed, 2);
        assert_eq!(report.average_daily_completions, 0.29);
        assert_eq!(report.period_days, 7);
    }

    #[tokio::test]
    async fn test_productivity_clamps_days() {
        let db = with_users().await;
        let now = at(2026, 2, 1, 12);

        let huge = compute_productivity(&db, ALICE, 9999, now).await.unwrap();
        let max = compute_productivity(&db, ALICE, 365, now).await.unwrap();
        assert_eq!(huge, max);
        assert_eq!(huge.period_days, 365);
        assert_eq!(huge.daily_data.len(), 366);

        let zero = compute_productivity(&db, ALICE, 0, now).await.unwrap();
        let one = compute_productivity(&db, ALICE, 1, now).await.unwrap();
        assert_eq!(zero, one);
        assert_eq!(zero.daily_data.len(), 2);
    }

    #[tokio::test]
    async fn test_productivity_is_idempotent() {
        let db = dashboard_fixture().await;
        let now = at(2026, 2, 1, 12);
        let first = compute_productivity(&db, ALICE, 30, now).await.unwrap();
        let second = compute_productivity(&db, ALICE, 30, now).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_created, 3);
    }

    #[tokio::test]
    async fn test_productivity_errors() {
        let db = with_users().await;
        let now = at(2026, 2, 1, 12);
        assert!(matches!(
            compute_productivity(&db, "bad", 7, now).await,
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(matches!(
            compute_productivity(&db, NOBODY, 7, now).await,
            Err(Error::NotFound(_))
        ));
    }
}
