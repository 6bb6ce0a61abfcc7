//! Request payloads and their validation rules.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::models::UserType;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*$")
        .expect("email pattern is valid")
});

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MIN_NAME_LEN: usize = 2;

const EMAIL_MESSAGE: &str = "Email is required and must be a valid email address";
const PASSWORD_MESSAGE: &str = "Password must be at least 6 characters long";
const NAME_MESSAGE: &str = "Name must be at least 2 characters long";

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Missing fields deserialize as empty and are reported by `validate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !is_valid_email(&self.email) {
            errors.push(EMAIL_MESSAGE.to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(PASSWORD_MESSAGE.to_string());
        }
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub user_type: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().chars().count() < MIN_NAME_LEN {
            errors.push(NAME_MESSAGE.to_string());
        }
        if !is_valid_email(&self.email) {
            errors.push(EMAIL_MESSAGE.to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(PASSWORD_MESSAGE.to_string());
        }
        errors
    }

    /// The requested classification when it is one of the known values,
    /// otherwise the lowest privilege.
    pub fn user_type(&self) -> UserType {
        self.user_type
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or_default()
    }
}
