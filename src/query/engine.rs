use serde::Deserialize;

use crate::error::Result;
use crate::ident::parse_id;
use crate::model::{Priority, Status, Task};
use crate::query::builder::{SortKey, SortOrder, TaskQuery};
use crate::storage::Database;

/// Listing parameters as received from a caller. Empty strings count as
/// absent; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl ListTasksParams {
    /// Turn the raw parameters into an owner-scoped query. Status and
    /// priority must match exactly; sort key and order never fail.
    pub fn to_query(&self, owner_id: &str) -> Result<TaskQuery> {
        let mut query = TaskQuery::for_owner(owner_id);
        if let Some(status) = present(&self.status) {
            query = query.status(status.parse::<Status>()?);
        }
        if let Some(priority) = present(&self.priority) {
            query = query.priority(priority.parse::<Priority>()?);
        }
        if let Some(search) = present(&self.search) {
            query = query.search(search);
        }
        if let Some(key) = present(&self.sort_by) {
            query = query.sort_by(SortKey::parse_lenient(key));
        }
        if let Some(order) = present(&self.order) {
            query = query.order(SortOrder::parse_lenient(order));
        }
        Ok(query)
    }
}

/// List one owner's tasks. The owner id is validated before the store is
/// touched; filters are validated before any query runs.
pub async fn list_tasks(db: &Database, owner_id: &str, params: &ListTasksParams) -> Result<Vec<Task>> {
    let owner_id = parse_id("user", owner_id)?;
    let query = params.to_query(&owner_id)?;
    log::debug!("listing tasks for {owner_id}: {params:?}");
    query.tasks(db).await
}
