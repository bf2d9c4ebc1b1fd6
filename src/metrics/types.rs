use serde::Serialize;

/// Task counts per priority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PriorityBreakdown {
    #[serde(rename = "High")]
    pub high: u64,
    #[serde(rename = "Medium")]
    pub medium: u64,
    #[serde(rename = "Low")]
    pub low: u64,
}

impl PriorityBreakdown {
    pub fn total(&self) -> u64 {
        self.high + self.medium + self.low
    }
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    #[serde(rename = "Todo")]
    pub todo: u64,
    #[serde(rename = "In Progress")]
    pub in_progress: u64,
    #[serde(rename = "Completed")]
    pub completed: u64,
}

impl StatusBreakdown {
    pub fn total(&self) -> u64 {
        self.todo + self.in_progress + self.completed
    }
}

/// Point-in-time summary of one user's tasks.
///
/// `completed`, `in_progress` and `todo` are copies of the status breakdown,
/// never counted separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub todo: u64,
    /// Not completed and due before `now`.
    pub overdue: u64,
    /// Integer percentage, 0 when there are no tasks.
    pub completion_rate: u8,
    pub by_priority: PriorityBreakdown,
    pub by_status: StatusBreakdown,
}

/// Dashboard statistics for an explicitly named user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub user_name: String,
    #[serde(flatten)]
    pub stats: DashboardStats,
}

/// One calendar-day bucket of the productivity series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub date: String,
    pub created: u64,
    pub completed: u64,
}

/// Daily created/completed series over a rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductivityReport {
    pub user_id: String,
    pub period_days: i64,
    pub start_date: String,
    pub end_date: String,
    pub total_created: u64,
    pub total_completed: u64,
    pub average_daily_completions: f64,
    pub daily_data: Vec<DailyActivity>,
}
