use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{Error, Result};
use crate::ident::{new_id, parse_id};
use crate::model::{NewTask, Task, TaskUpdate};
use crate::storage::repository;
use crate::storage::Database;

/// Validate and store a new task for `owner_id`.
pub async fn create_task(
    db: &Database,
    owner_id: &str,
    input: &NewTask,
    now: DateTime<Utc>,
) -> Result<Task> {
    let owner_id = parse_id("user", owner_id)?;
    let draft = input.validate()?;
    // Match the stored precision so the returned task equals a later read.
    let now = now.trunc_subsecs(3);

    let task = Task {
        id: new_id(),
        owner_id,
        title: draft.title,
        description: draft.description,
        priority: draft.priority,
        status: draft.status,
        due_date: draft.due_date.trunc_subsecs(3),
        created_at: now,
        updated_at: now,
    };

    let stored = db
        .writer()
        .call({
            let task = task.clone();
            move |conn| {
                if repository::find_user_by_id(conn, &task.owner_id)?.is_none() {
                    return Ok::<bool, rusqlite::Error>(false);
                }
                repository::insert_task(conn, &task)?;
                Ok(true)
            }
        })
        .await?;
    if !stored {
        return Err(Error::NotFound("User".into()));
    }

    log::info!("Created task {} for {}", task.id, task.owner_id);
    Ok(task)
}

/// Fetch one of the owner's tasks. Another user's task is indistinguishable
/// from a missing one.
pub async fn get_task(db: &Database, owner_id: &str, task_id: &str) -> Result<Task> {
    let owner_id = parse_id("user", owner_id)?;
    let task_id = parse_id("task", task_id)?;
    db.reader()
        .call(move |conn| repository::get_task(conn, &owner_id, &task_id))
        .await?
        .ok_or_else(|| Error::NotFound("Task".into()))
}

/// Apply the whitelisted fields of `update` to one of the owner's tasks.
pub async fn update_task(
    db: &Database,
    owner_id: &str,
    task_id: &str,
    update: &TaskUpdate,
    now: DateTime<Utc>,
) -> Result<Task> {
    let owner_id = parse_id("user", owner_id)?;
    let task_id = parse_id("task", task_id)?;
    let changes = update.validate()?;

    let updated = db
        .writer()
        .call(move |conn| repository::update_task(conn, &owner_id, &task_id, &changes, now))
        .await?
        .ok_or_else(|| Error::NotFound("Task".into()))?;

    log::info!("Updated task {}", updated.id);
    Ok(updated)
}

pub async fn delete_task(db: &Database, owner_id: &str, task_id: &str) -> Result<()> {
    let owner_id = parse_id("user", owner_id)?;
    let task_id = parse_id("task", task_id)?;

    let deleted = db
        .writer()
        .call({
            let task_id = task_id.clone();
            move |conn| repository::delete_task(conn, &owner_id, &task_id)
        })
        .await?;
    if !deleted {
        return Err(Error::NotFound("Task".into()));
    }

    log::info!("Deleted task {task_id}");
    Ok(())
}
