use std::fmt;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{Method, Response, StatusCode};
use http_body_util::Full;
use serde_json::json;

use crate::http::BoxBody;

/// A request-time fault.
///
/// Errors travel through the middleware chain as `Err` values and are
/// rendered once, by the router, unless a response was already sent.
#[derive(Debug, Clone)]
pub struct Error {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl Error {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            headers: Vec::new(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(400, "BAD_REQUEST", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(401, "UNAUTHORIZED", msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(403, "FORBIDDEN", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(404, "NOT_FOUND", msg)
    }

    /// 405 carrying an `Allow` header with the verbs the path does support.
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let error = Self::new(405, "METHOD_NOT_ALLOWED", "method not allowed");
        match HeaderValue::from_str(&allow) {
            Ok(value) => error.with_header(header::ALLOW, value),
            Err(_) => error,
        }
    }

    pub fn not_acceptable(msg: impl Into<String>) -> Self {
        Self::new(406, "NOT_ACCEPTABLE", msg)
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(413, "PAYLOAD_TOO_LARGE", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(500, "INTERNAL_ERROR", msg)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Renders the error as the JSON envelope used by every trellis response.
    pub fn into_response(self, trace_id: &str) -> Response<BoxBody> {
        let status = self.status_code();
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            },
            "trace_id": trace_id,
        });

        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::bad_request(format!("invalid JSON: {}", err))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A registration-time fault. These abort startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// A declaration was applied to a target kind it does not support.
    InvalidTarget {
        declaration: &'static str,
        target: String,
    },
    /// A method was bound to a second, different verb.
    VerbConflict {
        method: String,
        bound: Method,
        requested: Method,
    },
    /// A named parameter or property binding was given an empty name.
    EmptyName {
        declaration: &'static str,
        target: String,
    },
    /// Form and body parameters declared on the same method.
    FormWithBody { method: String },
    /// More than one whole-body parameter on the same method.
    MultipleBodies { method: String },
    /// The same resolved path and verb registered twice.
    DuplicatePath { path: String, verb: Method },
    /// Accept, AcceptLanguage or Security declared with nothing usable.
    EmptyValues {
        declaration: &'static str,
        target: String,
    },
    /// A service declared as its own parent.
    SelfInheritance { service: String },
    /// A chain of `extends` declarations that leads back to `service`.
    InheritanceCycle { service: String },
}

impl fmt::Display for DeclarationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationError::InvalidTarget {
                declaration,
                target,
            } => write!(f, "invalid declaration: {} can not be applied to {}", declaration, target),
            DeclarationError::VerbConflict {
                method,
                bound,
                requested,
            } => write!(
                f,
                "method `{}` already bound to verb {}, cannot rebind to {}",
                method, bound, requested
            ),
            DeclarationError::EmptyName {
                declaration,
                target,
            } => write!(f, "invalid {} name on {}: name can not be empty", declaration, target),
            DeclarationError::FormWithBody { method } => write!(
                f,
                "can not use form parameters with a body parameter on the same method `{}`",
                method
            ),
            DeclarationError::MultipleBodies { method } => write!(
                f,
                "can not use more than one body parameter on the same method `{}`",
                method
            ),
            DeclarationError::DuplicatePath { path, verb } => write!(
                f,
                "duplicated declaration for path [{}], method [{}]",
                path, verb
            ),
            DeclarationError::EmptyValues {
                declaration,
                target,
            } => write!(f, "invalid {} declaration on {}: no values given", declaration, target),
            DeclarationError::SelfInheritance { service } => {
                write!(f, "service `{}` can not extend itself", service)
            }
            DeclarationError::InheritanceCycle { service } => {
                write!(f, "service `{}` inherits from itself through its parents", service)
            }
        }
    }
}

impl std::error::Error for DeclarationError {}
