use crate::error::Result;
use crate::model::{Priority, Status, Task};
use crate::storage::repository::{task_from_row, TASK_COLUMNS};
use crate::storage::{Database, FOLD_CASE_FN};

/// Column a task listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    CreatedAt,
    DueDate,
    Priority,
}

impl SortKey {
    /// Parse a caller-supplied sort key. Anything unrecognized falls back to
    /// `createdAt` instead of failing.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim() {
            "dueDate" => SortKey::DueDate,
            "priority" => SortKey::Priority,
            _ => SortKey::CreatedAt,
        }
    }

    /// SQL expression for the sort key. Priority is ranked, never compared
    /// lexically, so High/Medium/Low come out in urgency order.
    fn sql_expr(&self) -> String {
        match self {
            SortKey::CreatedAt => "t.created_at".to_string(),
            SortKey::DueDate => "t.due_date".to_string(),
            SortKey::Priority => {
                let arms: Vec<String> = Priority::ALL
                    .iter()
                    .map(|p| format!("WHEN '{}' THEN {}", p.as_str(), p.rank()))
                    .collect();
                format!("CASE t.priority {} END", arms.join(" "))
            }
        }
    }
}

/// Sort direction. Defaults to descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Only an explicit `asc` selects ascending order.
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim() == "asc" {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Escape `\`, `%` and `_` so the text matches literally inside a
/// `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builder for an owner-scoped task listing.
///
/// The owner is fixed at construction and always bound as the first
/// parameter; no builder method can widen the query beyond that owner.
#[derive(Debug, Clone)]
pub struct TaskQuery {
    owner_id: String,
    status: Option<Status>,
    priority: Option<Priority>,
    search: Option<String>,
    sort_key: SortKey,
    order: SortOrder,
}

impl TaskQuery {
    pub fn for_owner(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            status: None,
            priority: None,
            search: None,
            sort_key: SortKey::default(),
            order: SortOrder::default(),
        }
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Case-insensitive substring match on the title. Empty text means no
    /// search filter.
    pub fn search(mut self, text: &str) -> Self {
        self.search = if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        };
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort_key = key;
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Build and execute the query, returning tasks in listing order.
    pub async fn tasks(self, db: &Database) -> Result<Vec<Task>> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql();
                log::debug!("task query: {sql}");
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), task_from_row)?;
                let result: std::result::Result<Vec<Task>, _> = rows.collect();
                result
            })
            .await
            .map_err(|e| crate::error::Error::Database(e.to_string()))
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();

        // Owner scope is unconditional.
        params.push(Box::new(self.owner_id.clone()));
        wheres.push(format!("t.owner_id = ?{}", params.len()));

        if let Some(status) = self.status {
            params.push(Box::new(status));
            wheres.push(format!("t.status = ?{}", params.len()));
        }

        if let Some(priority) = self.priority {
            params.push(Box::new(priority));
            wheres.push(format!("t.priority = ?{}", params.len()));
        }

        // Both sides folded with Unicode rules; LIKE alone folds ASCII only.
        if let Some(ref text) = self.search {
            params.push(Box::new(format!("%{}%", escape_like(&text.to_lowercase()))));
            wheres.push(format!(
                "{FOLD_CASE_FN}(t.title) LIKE ?{} ESCAPE '\\'",
                params.len()
            ));
        }

        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks t");
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));

        // Ties keep insertion order whatever the direction.
        sql.push_str(&format!(
            " ORDER BY {} {}, t.seq ASC",
            self.sort_key.sql_expr(),
            self.order.sql()
        ));

        (sql, params)
    }
}
