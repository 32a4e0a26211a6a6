//! Error types and HTTP failure normalization.
//!
//! Every failure surfaced by a cursor, a loader or a store is an [`HbpError`]:
//! a uniform value carrying a kind, a human readable message, optional
//! structured data and a numerical code (the HTTP status, or -1 when not
//! applicable).

use crate::transport::{HttpResponse, TransportError};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for paging and store operations.
pub type HbpResult<T> = Result<T, HbpError>;

const DEFAULT_MESSAGE: &str = "An unknown error occured.";

/// The kind of an [`HbpError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `next()`/`previous()` called at an extremity of the list.
    EndOfList,
    /// The request could not be sent (network down, DNS, TLS...).
    ClientError,
    /// HTTP 404.
    NotFound,
    /// HTTP 403.
    Forbidden,
    /// HTTP 502.
    BadGateway,
    /// A store expected a unique result and got several.
    UnexpectedResult,
    /// The service returned an envelope that breaks the paging contract.
    InvalidEnvelope,
    /// The request was abandoned before completion.
    Aborted,
    /// A required parameter was not provided.
    MissingParameter,
    /// No better classification available.
    Unknown,
    /// Kind reported by the remote service in its error envelope.
    Remote(String),
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::EndOfList => "ResultSet::EOL",
            ErrorKind::ClientError => "ClientError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::UnexpectedResult => "UnexpectedResult",
            ErrorKind::InvalidEnvelope => "InvalidEnvelope",
            ErrorKind::Aborted => "Aborted",
            ErrorKind::MissingParameter => "MissingParameter",
            ErrorKind::Unknown => "UnknownError",
            ErrorKind::Remote(name) => name,
        }
    }

    /// Maps a wire name back to a kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ResultSet::EOL" => ErrorKind::EndOfList,
            "ClientError" => ErrorKind::ClientError,
            "NotFound" => ErrorKind::NotFound,
            "Forbidden" => ErrorKind::Forbidden,
            "BadGateway" => ErrorKind::BadGateway,
            "UnexpectedResult" => ErrorKind::UnexpectedResult,
            "InvalidEnvelope" => ErrorKind::InvalidEnvelope,
            "Aborted" => ErrorKind::Aborted,
            "MissingParameter" => ErrorKind::MissingParameter,
            "UnknownError" => ErrorKind::Unknown,
            other => ErrorKind::Remote(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error value.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct HbpError {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
    /// Context that may help recovering from the error.
    pub data: Option<Value>,
    /// HTTP status code, 0 when the request never reached a server, -1 otherwise.
    pub code: i32,
}

impl HbpError {
    /// Creates an error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            code: -1,
        }
    }

    /// Creates an `UnknownError` with the default message.
    pub fn unknown() -> Self {
        Self::new(ErrorKind::Unknown, DEFAULT_MESSAGE)
    }

    /// The end of the list was reached.
    pub fn end_of_list() -> Self {
        Self::new(ErrorKind::EndOfList, "End of list reached")
    }

    /// A uniqueness expectation was violated.
    pub fn unexpected_result(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnexpectedResult, message)
    }

    /// The service broke the envelope contract.
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidEnvelope, message)
    }

    /// A required parameter is missing.
    pub fn missing_parameter(name: &str) -> Self {
        Self::new(
            ErrorKind::MissingParameter,
            format!("{name} parameter is required"),
        )
    }

    /// Sets the structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Returns true for the end-of-list condition.
    pub fn is_end_of_list(&self) -> bool {
        self.kind == ErrorKind::EndOfList
    }

    /// Returns true if the server rejected the request (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// Returns true if the server failed (5xx).
    pub fn is_server_error(&self) -> bool {
        self.code >= 500
    }

    /// Builds an error for a request that never produced a response.
    pub fn from_transport(error: &TransportError) -> Self {
        Self::new(ErrorKind::ClientError, "The client cannot run the request.")
            .with_data(Value::String(error.message.clone()))
            .with_code(0)
    }

    /// Builds an error from a failed HTTP response.
    ///
    /// Well known statuses get a fixed kind and message. For any other
    /// status the body is inspected: `{error: {type, message, data}}` or a
    /// top-level `{type, message, data, reason}`. A body of unknown shape is
    /// kept verbatim as `data`.
    pub fn from_response(response: &HttpResponse) -> Self {
        let mut error = Self::unknown().with_code(i32::from(response.status));

        match response.status {
            0 => {
                error.kind = ErrorKind::ClientError;
                error.message = "The client cannot run the request.".into();
                return error;
            }
            404 => {
                error.kind = ErrorKind::NotFound;
                error.message = "Resource not found".into();
                return error;
            }
            403 => {
                error.kind = ErrorKind::Forbidden;
                error.message = "Permission denied: you are not allowed to display the page or perform the operation".into();
                return error;
            }
            502 => {
                error.kind = ErrorKind::BadGateway;
                error.message = "502 Bad Gateway Error".into();
                if response.is_html() {
                    if let Some(title) = html_title(&response.body) {
                        error.message = title;
                    }
                }
                return error;
            }
            _ => {}
        }

        if response.body.is_empty() {
            return error;
        }
        let body = serde_json::from_slice::<Value>(&response.body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&response.body).into_owned())
        });
        error.apply_envelope(body);
        error
    }

    fn apply_envelope(&mut self, body: Value) {
        let source = match body.get("error") {
            Some(inner) if is_truthy(inner) => inner.clone(),
            _ => body,
        };
        let field = |name: &str| source.get(name).filter(|v| is_truthy(v));

        let kind = field("type");
        let data = field("data");
        let message = field("message");
        let reason = field("reason");

        if let Some(kind) = kind {
            self.kind = ErrorKind::from_name(&text_of(kind));
        }
        if let Some(data) = data {
            self.data = Some(data.clone());
        }
        if let Some(message) = message {
            self.message = text_of(message);
        } else if let Some(reason) = reason {
            self.kind = ErrorKind::Remote("Error".into());
            self.message = text_of(reason);
        }

        if kind.is_none() && data.is_none() && message.is_none() && reason.is_none() {
            self.data = Some(source.clone());
        }
    }
}

impl From<serde_json::Error> for HbpError {
    fn from(error: serde_json::Error) -> Self {
        HbpError::invalid_envelope(format!("cannot decode response: {error}"))
    }
}

/// Falsy values: `null`, `false`, `0` and `""`.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn html_title(body: &[u8]) -> Option<String> {
    let html = String::from_utf8_lossy(body);
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title>")?;
    let title = html[start..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}
