//! Wire-stable API errors and HTTP mapping.
//!
//! Every failure that reaches the HTTP boundary is an [`ApiError`]: a stable
//! machine-readable `id`, a numeric `status` string and human-oriented
//! `title`/`detail`, optionally locating the offending input through
//! [`ErrorSource`]. The value is built once at the failure site and then
//! moved, never mutated.

use std::borrow::Cow;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response;

/// Points at the input that caused an error: a JSON pointer into the request
/// document, or the name of a query/path parameter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<Cow<'static, str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<Cow<'static, str>>,
}

impl ErrorSource {
    pub fn is_empty(&self) -> bool {
        self.pointer.is_none() && self.parameter.is_none()
    }
}

/// API error sent to clients inside the `{"errors": [...]}` envelope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiError {
    pub id: Cow<'static, str>,
    pub status: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Cow<'static, str>>,
    pub title: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Cow<'static, str>>,
    #[serde(skip_serializing_if = "ErrorSource::is_empty")]
    pub source: ErrorSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ApiError {
    /// A create request carried a client-supplied identity.
    pub const DUPLICATE_ENTRY: ApiError = ApiError {
        id: Cow::Borrowed("duplicate-entry"),
        status: Cow::Borrowed("409"),
        code: None,
        title: Cow::Borrowed("Duplicate Entry"),
        detail: Some(Cow::Borrowed("Trying to create a resource with an existing ID")),
        source: ErrorSource {
            pointer: Some(Cow::Borrowed("/data/id")),
            parameter: None,
        },
        meta: None,
    };

    /// The identity in the URL differs from the one in the request document.
    pub const UNMATCHING_IDS: ApiError = ApiError {
        id: Cow::Borrowed("unmatching-ids"),
        status: Cow::Borrowed("400"),
        code: None,
        title: Cow::Borrowed("IDs do not match"),
        detail: Some(Cow::Borrowed("The URL ID does not match the input ID")),
        source: ErrorSource {
            pointer: Some(Cow::Borrowed("/data/id")),
            parameter: None,
        },
        meta: None,
    };

    pub fn new(
        id: impl Into<Cow<'static, str>>,
        status: StatusCode,
        title: impl Into<Cow<'static, str>>,
    ) -> Self {
        ApiError {
            id: id.into(),
            status: Cow::Owned(status.as_u16().to_string()),
            code: None,
            title: title.into(),
            detail: None,
            source: ErrorSource::default(),
            meta: None,
        }
    }

    pub fn integer_conversion(parameter: impl Into<Cow<'static, str>>, detail: impl fmt::Display) -> Self {
        Self::new("integer-conversion", StatusCode::BAD_REQUEST, "Integer Conversion Error")
            .with_detail(detail.to_string())
            .with_parameter(parameter)
    }

    pub fn invalid_parameter(parameter: impl Into<Cow<'static, str>>) -> Self {
        Self::new("invalid-parameter", StatusCode::BAD_REQUEST, "Invalid query parameter")
            .with_parameter(parameter)
    }

    pub fn malformated_input(detail: impl fmt::Display) -> Self {
        Self::new("malformated-input", StatusCode::BAD_REQUEST, "Malformated input")
            .with_detail(detail.to_string())
    }

    pub fn payload_too_large(detail: impl fmt::Display) -> Self {
        Self::new("payload-too-large", StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
            .with_detail(detail.to_string())
    }

    pub fn validation(detail: Option<String>) -> Self {
        let err = Self::new("validation-error", StatusCode::BAD_REQUEST, "Validation Error");
        match detail {
            Some(d) => err.with_detail(d),
            None => err,
        }
    }

    pub fn not_found(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new("not-found", StatusCode::NOT_FOUND, "Not Found").with_detail(detail)
    }

    pub fn database(detail: impl fmt::Display) -> Self {
        Self::new("database-error", StatusCode::INTERNAL_SERVER_ERROR, "Database Error")
            .with_detail(detail.to_string())
    }

    pub fn with_detail(mut self, detail: impl Into<Cow<'static, str>>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_pointer(mut self, pointer: impl Into<Cow<'static, str>>) -> Self {
        self.source.pointer = Some(pointer.into());
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<Cow<'static, str>>) -> Self {
        self.source.parameter = Some(parameter.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// HTTP status parsed from `status`; 500 when it is not a valid code.
    pub fn status_code(&self) -> StatusCode {
        self.status
            .parse::<u16>()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {} ({})", self.status, self.title, self.id)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        response::send_error(self)
    }
}

/// Several errors rendered together; the status comes from the first one.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApiErrors(pub Vec<ApiError>);

impl ApiErrors {
    pub fn status_code(&self) -> StatusCode {
        self.0
            .first()
            .map(ApiError::status_code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ApiError> for ApiErrors {
    fn from(err: ApiError) -> Self {
        ApiErrors(vec![err])
    }
}

impl IntoResponse for ApiErrors {
    fn into_response(self) -> Response {
        response::send_errors(self)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}
