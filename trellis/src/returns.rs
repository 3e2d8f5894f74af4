//! What a service method hands back to the dispatcher.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::BoxFuture;

/// The result of an endpoint method.
pub enum ServiceReturn {
    /// A value serialized right away.
    Immediate(Value),
    /// Nothing to send; the dispatcher answers 204 unless a response was sent.
    Empty,
    /// A value produced later. May resolve to any other variant.
    Deferred(BoxFuture<'static, Result<ServiceReturn>>),
    Referenced(ReferencedResource),
    FileDownload(DownloadResource),
    BinaryDownload(DownloadBinaryData),
    /// The service wrote the response itself; send nothing.
    Suppressed,
}

impl ServiceReturn {
    /// Serializes `value` into an immediate result.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(ServiceReturn::Immediate)
            .map_err(|e| Error::internal(format!("failed to serialize result: {}", e)))
    }

    pub fn text(text: impl Into<String>) -> Self {
        ServiceReturn::Immediate(Value::String(text.into()))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<ServiceReturn>> + Send + 'static,
    {
        ServiceReturn::Deferred(Box::pin(future))
    }

    pub fn no_response() -> Self {
        ServiceReturn::Suppressed
    }

    pub fn empty() -> Self {
        ServiceReturn::Empty
    }
}

impl fmt::Debug for ServiceReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceReturn::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            ServiceReturn::Empty => f.write_str("Empty"),
            ServiceReturn::Deferred(_) => f.write_str("Deferred(..)"),
            ServiceReturn::Referenced(resource) => {
                f.debug_tuple("Referenced").field(resource).finish()
            }
            ServiceReturn::FileDownload(resource) => {
                f.debug_tuple("FileDownload").field(resource).finish()
            }
            ServiceReturn::BinaryDownload(data) => {
                f.debug_tuple("BinaryDownload").field(data).finish()
            }
            ServiceReturn::Suppressed => f.write_str("Suppressed"),
        }
    }
}

impl From<Value> for ServiceReturn {
    fn from(value: Value) -> Self {
        ServiceReturn::Immediate(value)
    }
}

impl From<String> for ServiceReturn {
    fn from(text: String) -> Self {
        ServiceReturn::text(text)
    }
}

impl From<&str> for ServiceReturn {
    fn from(text: &str) -> Self {
        ServiceReturn::text(text)
    }
}

impl From<bool> for ServiceReturn {
    fn from(value: bool) -> Self {
        ServiceReturn::Immediate(Value::Bool(value))
    }
}

impl From<i64> for ServiceReturn {
    fn from(value: i64) -> Self {
        ServiceReturn::Immediate(Value::from(value))
    }
}

impl From<f64> for ServiceReturn {
    fn from(value: f64) -> Self {
        ServiceReturn::Immediate(Value::from(value))
    }
}

impl From<()> for ServiceReturn {
    fn from(_: ()) -> Self {
        ServiceReturn::Empty
    }
}

impl From<ReferencedResource> for ServiceReturn {
    fn from(resource: ReferencedResource) -> Self {
        ServiceReturn::Referenced(resource)
    }
}

impl From<DownloadResource> for ServiceReturn {
    fn from(resource: DownloadResource) -> Self {
        ServiceReturn::FileDownload(resource)
    }
}

impl From<DownloadBinaryData> for ServiceReturn {
    fn from(data: DownloadBinaryData) -> Self {
        ServiceReturn::BinaryDownload(data)
    }
}

/// A pointer to another resource: sets `Location` and a status, with an
/// optional body.
#[derive(Debug)]
pub struct ReferencedResource {
    pub location: String,
    pub status: StatusCode,
    pub body: Option<Box<ServiceReturn>>,
}

impl ReferencedResource {
    pub fn new(location: impl Into<String>, status: StatusCode) -> Self {
        Self {
            location: location.into(),
            status,
            body: None,
        }
    }

    pub fn created(location: impl Into<String>) -> Self {
        Self::new(location, StatusCode::CREATED)
    }

    pub fn accepted(location: impl Into<String>) -> Self {
        Self::new(location, StatusCode::ACCEPTED)
    }

    pub fn moved_permanently(location: impl Into<String>) -> Self {
        Self::new(location, StatusCode::MOVED_PERMANENTLY)
    }

    pub fn moved_temporarily(location: impl Into<String>) -> Self {
        Self::new(location, StatusCode::FOUND)
    }

    pub fn see_other(location: impl Into<String>) -> Self {
        Self::new(location, StatusCode::SEE_OTHER)
    }

    pub fn with_body(mut self, body: impl Into<ServiceReturn>) -> Self {
        self.body = Some(Box::new(body.into()));
        self
    }
}

/// A file on disk sent as an attachment.
#[derive(Debug, Clone)]
pub struct DownloadResource {
    pub path: PathBuf,
    pub file_name: String,
}

impl DownloadResource {
    pub fn new(path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
        }
    }
}

/// In-memory bytes sent with an explicit media type.
#[derive(Debug, Clone)]
pub struct DownloadBinaryData {
    pub content: Bytes,
    pub mime_type: String,
    /// Sent as an attachment when set; inline otherwise.
    pub file_name: Option<String>,
}

impl DownloadBinaryData {
    pub fn new(content: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Person {
        id: u32,
        name: &'static str,
    }

    #[test]
    fn test_json_serializes_value() {
        let ret = ServiceReturn::json(&Person { id: 1, name: "ana" }).unwrap();
        match ret {
            ServiceReturn::Immediate(value) => assert_eq!(value, json!({"id": 1, "name": "ana"})),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_referenced_helpers() {
        let created = ReferencedResource::created("/people/7").with_body("ok");
        assert_eq!(created.status, StatusCode::CREATED);
        assert!(matches!(created.body.as_deref(), Some(ServiceReturn::Immediate(_))));
        assert_eq!(
            ReferencedResource::moved_temporarily("/x").status,
            StatusCode::FOUND
        );
    }

    #[test]
    fn test_unit_is_empty() {
        assert!(matches!(ServiceReturn::from(()), ServiceReturn::Empty));
    }
}
