//! Response envelope and the error taxonomy shared by handlers.
use std::collections::HashMap;

use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::router::Response;

/// `{success, message?, data?, errors?}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

pub fn success<T: Serialize>(status_code: u16, message: &str, data: T) -> Response {
    Response::json(
        Envelope {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
            errors: None,
        },
        status_code,
        HashMap::new(),
    )
}

pub fn failure(status_code: u16, message: &str, errors: Vec<String>) -> Response {
    Response::json(
        Envelope::<()> {
            success: false,
            message: Some(message.to_string()),
            data: None,
            errors: (!errors.is_empty()).then_some(errors),
        },
        status_code,
        HashMap::new(),
    )
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Body could not be parsed at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),
    /// Never says which credential was wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// `public` goes to the client, `detail` only to the log.
    #[error("{public}: {detail}")]
    Internal { public: String, detail: String },
}

impl ApiError {
    pub fn unauthorized(reason: &str) -> Self {
        ApiError::Unauthorized(reason.to_string())
    }

    pub fn invalid_credentials() -> Self {
        ApiError::unauthorized("Invalid credentials")
    }

    pub fn internal(public: &str, detail: impl ToString) -> Self {
        ApiError::Internal {
            public: public.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidInput(_) | ApiError::Validation(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Internal { .. } => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::InvalidInput(detail) => {
                error!("Failed to parse input: {}", detail);
                failure(status, "Invalid input", Vec::new())
            }
            ApiError::Validation(errors) => failure(status, "Validation failed", errors),
            ApiError::Unauthorized(reason) => failure(status, "Unauthorized", vec![reason]),
            ApiError::Internal { public, detail } => {
                error!("{}: {}", public, detail);
                failure(status, "Server error", vec![public])
            }
        }
    }
}
