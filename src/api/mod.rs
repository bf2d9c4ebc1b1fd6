use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::accounts::{self, LoginRequest, RegisterRequest};
use crate::auth::TokenIssuer;
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{NewTask, TaskUpdate};
use crate::query::engine::{list_tasks, ListTasksParams};
use crate::query::window::parse_days;
use crate::storage::repository;
use crate::storage::Database;
use crate::tasks;

/// App config key holding the productivity window used when a request
/// gives no `days`.
pub const DEFAULT_DAYS_KEY: &str = "default_days";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// An incoming request, independent of any transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: BTreeMap::new(),
            authorization: None,
            body: None,
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {token}"));
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: impl Serialize) -> Result<Self> {
        Self::with_status(200, body)
    }

    fn with_status(status: u16, body: impl Serialize) -> Result<Self> {
        Ok(Self {
            status,
            body: serde_json::to_value(body)?,
        })
    }

    fn message(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "message": message }),
        }
    }
}

/// Map an error to a response. Infrastructure detail is logged, never
/// returned.
pub fn error_response(err: &Error) -> ApiResponse {
    match err {
        Error::Validation(_) | Error::InvalidIdentifier(_) => {
            ApiResponse::message(400, &err.to_string())
        }
        Error::AuthRequired | Error::InvalidToken | Error::InvalidCredentials => {
            ApiResponse::message(401, &err.to_string())
        }
        Error::NotFound(_) => ApiResponse::message(404, &err.to_string()),
        Error::Conflict(_) => ApiResponse::message(409, &err.to_string()),
        Error::Database(_) | Error::Migration(_) | Error::Config(_) | Error::Other(_) => {
            log::error!("Request failed: {err}");
            ApiResponse::message(500, "Server error")
        }
    }
}

fn parse_body<T: DeserializeOwned + Default>(body: &Option<Value>) -> Result<T> {
    match body {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| Error::Validation(format!("Invalid request body: {e}"))),
    }
}

/// Dispatches requests under `/api` to the task, account and analytics
/// operations.
#[derive(Clone)]
pub struct Router {
    db: Database,
    issuer: TokenIssuer,
}

impl Router {
    pub fn new(db: Database, issuer: TokenIssuer) -> Self {
        Self { db, issuer }
    }

    pub async fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self.handle_at(request, Utc::now()).await
    }

    /// Handle a request as of `now`.
    pub async fn handle_at(&self, request: &ApiRequest, now: DateTime<Utc>) -> ApiResponse {
        log::debug!("{} {}", request.method, request.path);
        match self.dispatch(request, now).await {
            Ok(Some(response)) => response,
            Ok(None) => ApiResponse::message(404, "Route not found"),
            Err(e) => error_response(&e),
        }
    }

    fn authenticate(&self, request: &ApiRequest, now: DateTime<Utc>) -> Result<String> {
        self.issuer
            .authenticate(request.authorization.as_deref(), now)
    }

    async fn dispatch(&self, request: &ApiRequest, now: DateTime<Utc>) -> Result<Option<ApiResponse>> {
        let path = request.path.split('?').next().unwrap_or_default();
        let Some(rest) = path.strip_prefix("/api") else {
            return Ok(None);
        };
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        use Method::*;
        let response = match (request.method, segments.as_slice()) {
            (Get, ["health"]) => ApiResponse::ok(json!({ "status": "ok" }))?,

            (Post, ["auth", "register"]) => {
                let input: RegisterRequest = parse_body(&request.body)?;
                let auth = accounts::register(&self.db, &self.issuer, &input, now).await?;
                ApiResponse::with_status(201, auth)?
            }
            (Post, ["auth", "login"]) => {
                let input: LoginRequest = parse_body(&request.body)?;
                ApiResponse::ok(accounts::login(&self.db, &self.issuer, &input, now).await?)?
            }
            (Get, ["auth", "me"]) => {
                let user_id = self.authenticate(request, now)?;
                ApiResponse::ok(accounts::find_user(&self.db, &user_id).await?)?
            }

            (Get, ["tasks", "dashboard"]) => {
                let user_id = self.authenticate(request, now)?;
                ApiResponse::ok(metrics::compute_dashboard(&self.db, &user_id, now).await?)?
            }
            (Get, ["tasks"]) => {
                let user_id = self.authenticate(request, now)?;
                let params: ListTasksParams = serde_json::from_value(serde_json::to_value(&request.query)?)?;
                ApiResponse::ok(list_tasks(&self.db, &user_id, &params).await?)?
            }
            (Post, ["tasks"]) => {
                let user_id = self.authenticate(request, now)?;
                let input: NewTask = parse_body(&request.body)?;
                ApiResponse::with_status(201, tasks::create_task(&self.db, &user_id, &input, now).await?)?
            }
            (Get, ["tasks", task_id]) => {
                let user_id = self.authenticate(request, now)?;
                ApiResponse::ok(tasks::get_task(&self.db, &user_id, task_id).await?)?
            }
            (Put, ["tasks", task_id]) => {
                let user_id = self.authenticate(request, now)?;
                let update: TaskUpdate = parse_body(&request.body)?;
                ApiResponse::ok(tasks::update_task(&self.db, &user_id, task_id, &update, now).await?)?
            }
            (Delete, ["tasks", task_id]) => {
                let user_id = self.authenticate(request, now)?;
                tasks::delete_task(&self.db, &user_id, task_id).await?;
                ApiResponse::message(200, "Task deleted")
            }

            (Get, ["analytics", "health"]) => {
                ApiResponse::ok(json!({ "status": "ok", "service": "analytics" }))?
            }
            (Get, ["analytics", "user-stats", user_id]) => {
                self.authenticate(request, now)?;
                ApiResponse::ok(metrics::compute_user_stats(&self.db, user_id, now).await?)?
            }
            (Get, ["analytics", "productivity", user_id]) => {
                self.authenticate(request, now)?;
                let days = match request.query.get("days") {
                    Some(raw) => parse_days(Some(raw)),
                    None => self.default_days().await?,
                };
                ApiResponse::ok(metrics::compute_productivity(&self.db, user_id, days, now).await?)?
            }

            _ => return Ok(None),
        };
        Ok(Some(response))
    }

    async fn default_days(&self) -> Result<i64> {
        let configured = self
            .db
            .reader()
            .call(|conn| repository::get_config(conn, DEFAULT_DAYS_KEY))
            .await?;
        Ok(parse_days(configured.as_deref()))
    }
}
