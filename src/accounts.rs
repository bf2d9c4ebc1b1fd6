use std::sync::LazyLock;

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{hash_password, verify_password, TokenIssuer};
use crate::error::{Error, Result};
use crate::ident::{new_id, parse_id};
use crate::model::User;
use crate::storage::repository;
use crate::storage::Database;

pub const MIN_PASSWORD_LEN: usize = 6;

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Result of a successful register or login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn normalize_email(email: Option<&str>) -> Result<String> {
    let email = email.unwrap_or_default().trim().to_lowercase();
    if RE_EMAIL.is_match(&email) {
        Ok(email)
    } else {
        Err(Error::Validation("Valid email is required".into()))
    }
}

/// Create an account and sign the new user in.
pub async fn register(
    db: &Database,
    issuer: &TokenIssuer,
    request: &RegisterRequest,
    now: DateTime<Utc>,
) -> Result<AuthResponse> {
    let name = request.name.as_deref().unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(Error::Validation("Name is required".into()));
    }
    let email = normalize_email(request.email.as_deref())?;
    let password = request.password.as_deref().unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash_password(password)?;
    let user = User {
        id: new_id(),
        name,
        email,
        created_at: now.trunc_subsecs(3),
    };

    // Existence check and insert share one writer call.
    let created = db
        .writer()
        .call({
            let user = user.clone();
            move |conn| {
                if repository::email_exists(conn, &user.email)? {
                    return Ok::<bool, rusqlite::Error>(false);
                }
                repository::insert_user(conn, &user, &password_hash)?;
                Ok(true)
            }
        })
        .await?;
    if !created {
        return Err(Error::Conflict("User already exists".into()));
    }

    log::info!("Registered user {}", user.id);
    let token = issuer.issue(&user.id, now)?;
    Ok(AuthResponse { token, user })
}

/// Check credentials and issue a token. Unknown email and wrong password
/// produce the same error.
pub async fn login(
    db: &Database,
    issuer: &TokenIssuer,
    request: &LoginRequest,
    now: DateTime<Utc>,
) -> Result<AuthResponse> {
    let email = normalize_email(request.email.as_deref())?;
    let password = request.password.as_deref().unwrap_or_default();
    if password.is_empty() {
        return Err(Error::Validation("Password is required".into()));
    }

    let found = db
        .reader()
        .call(move |conn| repository::find_user_by_email(conn, &email))
        .await?;

    let Some((user, password_hash)) = found else {
        log::warn!("Login failed: unknown email");
        return Err(Error::InvalidCredentials);
    };
    if !verify_password(password, &password_hash) {
        log::warn!("Login failed for user {}", user.id);
        return Err(Error::InvalidCredentials);
    }

    log::info!("User {} logged in", user.id);
    let token = issuer.issue(&user.id, now)?;
    Ok(AuthResponse { token, user })
}

/// Look up a user by id. Malformed id is a validation error, absence is
/// not-found.
pub async fn find_user(db: &Database, user_id: &str) -> Result<User> {
    let user_id = parse_id("user", user_id)?;
    db.reader()
        .call(move |conn| repository::find_user_by_id(conn, &user_id))
        .await?
        .ok_or_else(|| Error::NotFound("User".into()))
}
