//! Typed errors, their HTTP mapping, and the error translator middleware.
//!
//! Handlers return [`AppError`]; its `IntoResponse` renders the body and attaches an
//! [`ErrorReport`] so [`translate_errors`] can stamp the request path and log the failure
//! once. Failures produced outside handlers (unknown route, disabled method, oversized body)
//! arrive without a report and are wrapped into a generic envelope.

use crate::repository::StoreError;
use crate::validation::{Violation, Violations};
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Largest bare error body read back when wrapping a response without a report.
const BARE_BODY_LIMIT: usize = 16 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config source '{source_name}': {message}")]
    Load { source_name: String, message: String },
    #[error("config source '{0}' did not produce a JSON object")]
    NotAnObject(String),
    #[error("invalid property '{0}', expected key.path=value")]
    InvalidProperty(String),
    #[error("config watch: {0}")]
    Watch(#[from] notify::Error),
    #[error("invalid '{key}' section: {message}")]
    Section { key: String, message: String },
    #[error("duplicate module name: {0}")]
    DuplicateModule(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] Violations),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Explicit status chosen by a handler.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Status { status, .. } => *status,
            AppError::Config(_) | AppError::Store(_) | AppError::Bind { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "ConfigFailure",
            AppError::NotFound(_) => "NotFound",
            AppError::Validation(_) => "ValidationFailure",
            AppError::Store(_) => "StoreFailure",
            AppError::BadRequest(_) => "BadRequest",
            AppError::Status { .. } => "Status",
            AppError::Bind { .. } => "BindFailure",
        }
    }

    /// User-facing text of the underlying cause.
    fn detail(&self) -> String {
        match self {
            AppError::Store(e) => e.to_string(),
            AppError::Bind { source, .. } => source.to_string(),
            AppError::BadRequest(m) | AppError::Status { message: m, .. } => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Generic failure body: `{timestamp, code, error, message, detail, path}`.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEnvelope {
    pub timestamp: DateTime<Utc>,
    pub code: u16,
    pub error: String,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub path: Option<String>,
}

impl ErrorEnvelope {
    /// Envelope named after the status reason phrase, without message or detail.
    pub fn generic(status: StatusCode) -> Self {
        Self {
            timestamp: Utc::now(),
            code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: None,
            detail: None,
            path: None,
        }
    }
}

/// Validation failure body: `{code: 400, errors: [...]}`.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationErrors {
    pub code: u16,
    pub errors: Vec<Violation>,
}

#[derive(Clone, Debug)]
enum ErrorBody {
    Envelope(ErrorEnvelope),
    Validation(ValidationErrors),
}

/// What a failed request turned into. Travels in response extensions from the handler to
/// [`translate_errors`].
#[derive(Clone, Debug)]
pub struct ErrorReport {
    status: StatusCode,
    body: ErrorBody,
    log_detail: String,
}

impl ErrorReport {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn with_path(mut self, path: String) -> Self {
        if let ErrorBody::Envelope(envelope) = &mut self.body {
            envelope.path = Some(path);
        }
        self
    }

    /// Wrap a response that left the router without a report.
    async fn from_bare(response: Response) -> Self {
        let status = response.status();
        let text = match axum::body::to_bytes(response.into_body(), BARE_BODY_LIMIT).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Err(_) => String::new(),
        };
        let mut envelope = ErrorEnvelope::generic(status);
        if !text.is_empty() {
            envelope.message = Some(text.clone());
            envelope.detail = Some(text.clone());
        }
        Self {
            status,
            body: ErrorBody::Envelope(envelope),
            log_detail: text,
        }
    }

    fn log(&self, method: &Method, path: &str) {
        if self.status.is_server_error() {
            tracing::error!(
                method = %method,
                path = %path,
                status = self.status.as_u16(),
                detail = %self.log_detail,
                "request failed"
            );
        } else {
            tracing::warn!(
                method = %method,
                path = %path,
                status = self.status.as_u16(),
                detail = %self.log_detail,
                "request rejected"
            );
        }
    }
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        let mut response = match &self.body {
            ErrorBody::Envelope(envelope) => (self.status, Json(envelope.clone())).into_response(),
            ErrorBody::Validation(errors) => (self.status, Json(errors.clone())).into_response(),
        };
        response.extensions_mut().insert(self);
        response
    }
}

impl From<AppError> for ErrorReport {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        let log_detail = format!("{:?}", err);
        let body = match err {
            AppError::Validation(violations) => ErrorBody::Validation(ValidationErrors {
                code: status.as_u16(),
                errors: violations.into_vec(),
            }),
            AppError::NotFound(_) => ErrorBody::Envelope(ErrorEnvelope::generic(status)),
            other => ErrorBody::Envelope(ErrorEnvelope {
                message: Some(other.to_string()),
                detail: Some(other.detail()),
                error: other.kind().to_string(),
                ..ErrorEnvelope::generic(status)
            }),
        };
        Self {
            status,
            body,
            log_detail,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ErrorReport::from(self).into_response()
    }
}

/// Error translator: every 4xx/5xx leaving the router gets exactly one envelope carrying the
/// request path, and is logged once.
pub async fn translate_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().to_string();
    let response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }
    let report = match response.extensions().get::<ErrorReport>().cloned() {
        Some(report) => report,
        None => ErrorReport::from_bare(response).await,
    };
    report.log(&method, &path);
    report.with_path(path).into_response()
}
