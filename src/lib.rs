pub mod accounts;
pub mod api;
pub mod auth;
pub mod date_util;
pub mod error;
pub mod ident;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;
pub mod tasks;

use chrono::Utc;
use serde::Serialize;

pub use accounts::{AuthResponse, LoginRequest, RegisterRequest};
pub use api::{ApiRequest, ApiResponse, Method, Router};
pub use auth::TokenIssuer;
pub use error::{Error, Result};
pub use metrics::{DailyActivity, DashboardStats, ProductivityReport, UserStats};
pub use model::{NewTask, Priority, Status, Task, TaskUpdate, User};
pub use query::engine::ListTasksParams;
pub use query::window::RollingWindow;
pub use storage::Database;

use api::DEFAULT_DAYS_KEY;
use auth::TOKEN_TTL_KEY;
use query::window::parse_days;
use storage::repository;

/// App config key holding the CLI session token.
pub const SESSION_TOKEN_KEY: &str = "session_token";

/// Store-wide counters for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub users: u64,
    pub tasks: u64,
    pub signed_in_as: Option<String>,
}

/// Main entry point: one database handle and one token issuer, shared by
/// every operation.
pub struct QuickTask {
    db: Database,
    issuer: TokenIssuer,
}

impl QuickTask {
    pub fn new(db: Database, issuer: TokenIssuer) -> Self {
        Self { db, issuer }
    }

    /// Build from an open database, loading the token issuer from config.
    pub async fn open(db: Database) -> Result<Self> {
        let issuer = TokenIssuer::load(&db).await?;
        Ok(Self::new(db, issuer))
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// A request router sharing this instance's store and issuer.
    pub fn router(&self) -> Router {
        Router::new(self.db.clone(), self.issuer.clone())
    }

    // ── Session ────────────────────────────────────────────────────

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse> {
        let auth = accounts::register(&self.db, &self.issuer, request, Utc::now()).await?;
        self.config_set(SESSION_TOKEN_KEY, &auth.token).await?;
        Ok(auth)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let auth = accounts::login(&self.db, &self.issuer, request, Utc::now()).await?;
        self.config_set(SESSION_TOKEN_KEY, &auth.token).await?;
        Ok(auth)
    }

    /// Forget the stored session. Returns whether one existed.
    pub async fn logout(&self) -> Result<bool> {
        self.db
            .writer()
            .call(|conn| repository::delete_config(conn, SESSION_TOKEN_KEY))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// User id of the stored session. No session is
    /// [`Error::AuthRequired`]; an expired one is [`Error::InvalidToken`].
    pub async fn current_user_id(&self) -> Result<String> {
        let token = self.config_get(SESSION_TOKEN_KEY).await?;
        let header = token.map(|t| format!("Bearer {t}"));
        self.issuer.authenticate(header.as_deref(), Utc::now())
    }

    pub async fn whoami(&self) -> Result<User> {
        let user_id = self.current_user_id().await?;
        accounts::find_user(&self.db, &user_id).await
    }

    // ── Tasks ──────────────────────────────────────────────────────

    pub async fn add_task(&self, input: &NewTask) -> Result<Task> {
        let user_id = self.current_user_id().await?;
        tasks::create_task(&self.db, &user_id, input, Utc::now()).await
    }

    pub async fn list_tasks(&self, params: &ListTasksParams) -> Result<Vec<Task>> {
        let user_id = self.current_user_id().await?;
        query::engine::list_tasks(&self.db, &user_id, params).await
    }

    pub async fn show_task(&self, task_id: &str) -> Result<Task> {
        let user_id = self.current_user_id().await?;
        tasks::get_task(&self.db, &user_id, task_id).await
    }

    pub async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<Task> {
        let user_id = self.current_user_id().await?;
        tasks::update_task(&self.db, &user_id, task_id, update, Utc::now()).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<()> {
        let user_id = self.current_user_id().await?;
        tasks::delete_task(&self.db, &user_id, task_id).await
    }

    // ── Analytics ──────────────────────────────────────────────────

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let user_id = self.current_user_id().await?;
        metrics::compute_dashboard(&self.db, &user_id, Utc::now()).await
    }

    /// Stats for `user_id`, or for the signed-in user when `None`.
    pub async fn user_stats(&self, user_id: Option<&str>) -> Result<UserStats> {
        let caller = self.current_user_id().await?;
        let target = user_id.unwrap_or(caller.as_str());
        metrics::compute_user_stats(&self.db, target, Utc::now()).await
    }

    /// Productivity for `user_id` (default: signed-in user) over `days`
    /// (default: `default_days` config, else 30).
    pub async fn productivity(
        &self,
        user_id: Option<&str>,
        days: Option<i64>,
    ) -> Result<ProductivityReport> {
        let caller = self.current_user_id().await?;
        let target = user_id.unwrap_or(caller.as_str());
        let days = match days {
            Some(days) => days,
            None => parse_days(self.config_get(DEFAULT_DAYS_KEY).await?.as_deref()),
        };
        metrics::compute_productivity(&self.db, target, days, Utc::now()).await
    }

    // ── Config / status ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Set a config value. Numeric settings are checked before storing.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        if key == TOKEN_TTL_KEY || key == DEFAULT_DAYS_KEY {
            let valid = value.trim().parse::<i64>().map(|n| n > 0).unwrap_or(false);
            if !valid {
                return Err(Error::Config(format!("{key} must be a positive integer")));
            }
        }
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn status(&self) -> Result<StoreStatus> {
        let (users, tasks) = self
            .db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((repository::count_users(conn)?, repository::count_tasks(conn)?))
            })
            .await?;
        let signed_in_as = match self.whoami().await {
            Ok(user) => Some(user.email),
            Err(Error::AuthRequired | Error::InvalidToken | Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(StoreStatus {
            users,
            tasks,
            signed_in_as,
        })
    }
}
