use uuid::Uuid;

use crate::error::{Error, Result};

/// Generate a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Validate a caller-supplied identifier and return its canonical
/// (lowercase, hyphenated) form. `kind` names the entity for the error
/// message, e.g. "user" or "task".
pub fn parse_id(kind: &str, input: &str) -> Result<String> {
    Uuid::parse_str(input.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| Error::InvalidIdentifier(format!("Invalid {kind} ID")))
}
