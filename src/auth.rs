use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

type HmacSha256 = Hmac<Sha256>;

/// Environment variable overriding the stored signing secret.
pub const TOKEN_SECRET_ENV: &str = "QUICKTASK_TOKEN_SECRET";
pub const TOKEN_SECRET_KEY: &str = "token_secret";
pub const TOKEN_TTL_KEY: &str = "token_ttl_hours";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 7;

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies signed bearer tokens of the form
/// `base64url(claims-json).base64url(hmac-sha256)`.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    /// Build an issuer from `$QUICKTASK_TOKEN_SECRET` or the stored secret,
    /// generating and storing one on first use. TTL comes from
    /// `token_ttl_hours` when set.
    pub async fn load(db: &Database) -> Result<Self> {
        let (stored_secret, stored_ttl) = db
            .reader()
            .call(|conn| {
                let secret = repository::get_config(conn, TOKEN_SECRET_KEY)?;
                let ttl = repository::get_config(conn, TOKEN_TTL_KEY)?;
                Ok::<_, rusqlite::Error>((secret, ttl))
            })
            .await?;

        let ttl_hours = match stored_ttl {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| {
                    Error::Config(format!("{TOKEN_TTL_KEY} must be a positive integer, got {raw:?}"))
                })?,
            None => DEFAULT_TOKEN_TTL_HOURS,
        };
        let ttl = Duration::hours(ttl_hours);

        if let Ok(secret) = std::env::var(TOKEN_SECRET_ENV) {
            if !secret.is_empty() {
                return Ok(Self::new(secret, ttl));
            }
        }

        let secret = match stored_secret {
            Some(secret) => secret,
            None => {
                let secret = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
                log::info!("Generated new token signing secret");
                db.writer()
                    .call({
                        let secret = secret.clone();
                        move |conn| {
                            repository::set_config(conn, TOKEN_SECRET_KEY, &secret)?;
                            Ok::<(), rusqlite::Error>(())
                        }
                    })
                    .await?;
                secret
            }
        };
        Ok(Self::new(secret, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| Error::Config(e.to_string()))
    }

    /// Issue a token for `user_id` valid from `now` for the configured TTL.
    pub fn issue(&self, user_id: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Check signature and expiry. Any defect is reported as
    /// [`Error::InvalidToken`].
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims> {
        let (payload, signature) = token.split_once('.').ok_or(Error::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| Error::InvalidToken)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| Error::InvalidToken)?;

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::InvalidToken)?;
        let claims: Claims = serde_json::from_slice(&raw).map_err(|_| Error::InvalidToken)?;
        if now.timestamp() >= claims.exp {
            return Err(Error::InvalidToken);
        }
        Ok(claims)
    }

    /// Resolve an `Authorization` header value to a user id.
    ///
    /// No header, or one without the `Bearer ` scheme, is
    /// [`Error::AuthRequired`]; a present but bad token is
    /// [`Error::InvalidToken`].
    pub fn authenticate(&self, header: Option<&str>, now: DateTime<Utc>) -> Result<String> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(Error::AuthRequired)?;
        match self.verify(token.trim(), now) {
            Ok(claims) => Ok(claims.sub),
            Err(e) => {
                log::warn!("Rejected bearer token: {e}");
                Err(e)
            }
        }
    }
}

/// Hash a password with Argon2id and a fresh random salt. Returns the PHC
/// string (`$argon2id$v=19$...`).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Other(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string. An unreadable hash never
/// verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("Stored password hash is unreadable: {e}");
            false
        }
    }
}
