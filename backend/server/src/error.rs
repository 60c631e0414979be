use axum::{
    Json,
    http::{
        HeaderValue, StatusCode,
        header::{RETRY_AFTER, WWW_AUTHENTICATE},
    },
    response::{IntoResponse, Response},
};
use catalog::CatalogError;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use crate::{aggregate::PollResults, config::ConfigError, ledger::LedgerError};

/// Anything that stops the server from coming up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to load catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Failed to open ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Authentication required")]
    Unauthorized { realm: &'static str },

    #[error("Already voted")]
    AlreadyVoted(PollResults),

    #[error("Catalog file rejected: {0}")]
    CatalogInvalid(#[from] CatalogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedPayload(_) => "invalid_input",
            AppError::Unauthorized { .. } => "unauthorized",
            AppError::AlreadyVoted(_) => "already_voted",
            AppError::CatalogInvalid(_) => "catalog_invalid",
            AppError::Ledger(e) => match e {
                LedgerError::UnknownTenant(_) => "unknown_tenant",
                LedgerError::InvalidInput(_) => "invalid_input",
                LedgerError::AlreadyVoted => "already_voted",
                LedgerError::AlreadyAnswered => "already_answered",
                LedgerError::RateLimited { .. } => "rate_limited",
                LedgerError::Transient(_) => "transient_storage_failure",
                LedgerError::Storage(_) | LedgerError::Task(_) => "internal",
            },
            AppError::InternalError(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::AlreadyVoted(_) => StatusCode::CONFLICT,
            AppError::CatalogInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Ledger(e) => match e {
                LedgerError::UnknownTenant(_) => StatusCode::NOT_FOUND,
                LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                LedgerError::AlreadyVoted | LedgerError::AlreadyAnswered => StatusCode::CONFLICT,
                LedgerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                LedgerError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Storage(_) | LedgerError::Task(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // internals stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{self}");
            "Internal error".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "ok": false,
            "error": self.kind(),
            "message": message,
        });

        if let AppError::AlreadyVoted(results) = &self {
            body["results"] = serde_json::to_value(results).unwrap_or(Value::Null);
        }

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match &self {
            AppError::Unauthorized { realm } => {
                if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
                    headers.insert(WWW_AUTHENTICATE, value);
                }
            }
            AppError::Ledger(e) if e.is_retryable() => {
                headers.insert(RETRY_AFTER, HeaderValue::from_static("1"));
            }
            _ => {}
        }

        response
    }
}
