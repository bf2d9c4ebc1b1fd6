use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::date_util::{is_storable, parse_due_date};
use crate::error::{Error, Result};

/// Task priority. Ranked High > Medium > Low for sorting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// Sort rank; higher is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            _ => Err(Error::Validation(
                "Priority must be Low, Medium, or High".into(),
            )),
        }
    }
}

/// Task workflow status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Todo,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "Todo",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Todo" => Ok(Status::Todo),
            "In Progress" => Ok(Status::InProgress),
            "Completed" => Ok(Status::Completed),
            _ => Err(Error::Validation(
                "Status must be Todo, In Progress, or Completed".into(),
            )),
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_text_enum!(Priority);
sql_text_enum!(Status);

/// A stored task. Always belongs to exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(rename = "user")]
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create-task payload as received from a caller. Enum and date fields stay
/// textual until [`NewTask::validate`] so bad values become validation
/// errors rather than decode failures. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
}

/// A create-task payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: Status,
    pub due_date: DateTime<Utc>,
}

impl NewTask {
    pub fn validate(&self) -> Result<TaskDraft> {
        let title = validate_title(self.title.as_deref(), "Title is required")?;
        let priority = self
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?
            .unwrap_or_default();
        let status = self
            .status
            .as_deref()
            .map(str::parse::<Status>)
            .transpose()?
            .unwrap_or_default();
        let due_date = match self.due_date.as_deref() {
            None => return Err(Error::Validation("Due date is required".into())),
            Some(s) if s.trim().is_empty() => {
                return Err(Error::Validation("Due date is required".into()))
            }
            Some(s) => validate_due_date(s)?,
        };

        Ok(TaskDraft {
            title,
            description: self.description.clone(),
            priority,
            status,
            due_date,
        })
    }
}

/// Update-task payload. Only these fields can ever be changed; anything
/// else in the request body is dropped during deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,
}

/// A validated partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        *self == TaskChanges::default()
    }
}

impl TaskUpdate {
    pub fn validate(&self) -> Result<TaskChanges> {
        let title = self
            .title
            .as_deref()
            .map(|t| validate_title(Some(t), "Title cannot be empty"))
            .transpose()?;
        Ok(TaskChanges {
            title,
            description: self.description.clone(),
            priority: self
                .priority
                .as_deref()
                .map(str::parse::<Priority>)
                .transpose()?,
            status: self
                .status
                .as_deref()
                .map(str::parse::<Status>)
                .transpose()?,
            due_date: self.due_date.as_deref().map(validate_due_date).transpose()?,
        })
    }
}

fn validate_title(title: Option<&str>, message: &str) -> Result<String> {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(Error::Validation(message.to_string())),
    }
}

fn validate_due_date(s: &str) -> Result<DateTime<Utc>> {
    parse_due_date(s)
        .filter(|ts| is_storable(*ts))
        .ok_or_else(|| Error::Validation("Due date must be a valid date".into()))
}

/// Public view of an account. The credential never leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
