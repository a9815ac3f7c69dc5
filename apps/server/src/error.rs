use std::io::Error as IoError;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use uppe_service::monitoring::PushError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] uppe_service::config::Error),
    #[error("Engine error: {0:#}")]
    Engine(#[from] anyhow::Error),
}

/// Errors returned to HTTP clients as `{"ok": false, "msg": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Push(#[from] PushError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Push(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "ok": false, "msg": self.to_string() }))
    }
}
