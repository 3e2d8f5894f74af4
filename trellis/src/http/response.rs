use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::error::{Error, Result};

pub type BoxBody = Full<Bytes>;

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
}

/// Shared handle on the response being built for one request.
///
/// Clones refer to the same response, so a service holding the handle can
/// write it from inside a deferred result. A response is sent at most once.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                sent: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_status(&self, status: StatusCode) {
        self.lock().status = status;
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    /// Sets a header from text, rejecting values that are not valid header text.
    pub fn set_header_str(&self, name: HeaderName, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::internal(format!("invalid value for header {}", name)))?;
        self.set_header(name, value);
        Ok(())
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    /// Adds `field` to the `Vary` header unless it is already listed.
    pub fn vary(&self, field: &str) {
        let mut state = self.lock();
        let current = state
            .headers
            .get(header::VARY)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let listed = current
            .split(',')
            .map(str::trim)
            .any(|f| f == "*" || f.eq_ignore_ascii_case(field));
        if listed {
            return;
        }

        let combined = if current.is_empty() {
            field.to_string()
        } else {
            format!("{}, {}", current, field)
        };
        if let Ok(value) = HeaderValue::from_str(&combined) {
            state.headers.insert(header::VARY, value);
        }
    }

    pub fn headers_sent(&self) -> bool {
        self.lock().sent
    }

    /// Finishes the response with `body`. Fails if it was already sent.
    pub fn end(&self, body: impl Into<Bytes>) -> Result<()> {
        let mut state = self.lock();
        if state.sent {
            return Err(Error::internal("response already sent"));
        }
        state.body = body.into();
        state.sent = true;
        Ok(())
    }

    /// Sends `body` with the given content type unless one is already set.
    pub fn send(&self, content_type: &'static str, body: impl Into<Bytes>) -> Result<()> {
        {
            let mut state = self.lock();
            if !state.headers.contains_key(header::CONTENT_TYPE) {
                state
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        self.end(body)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send("text/plain; charset=utf-8", text.into())
    }

    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::internal(format!("failed to serialize response: {}", e)))?;
        self.send("application/json", body)
    }

    /// Sends just a status code with an empty body.
    pub fn send_status(&self, status: StatusCode) -> Result<()> {
        self.set_status(status);
        self.end(Bytes::new())
    }

    /// Sends a file from disk as an attachment named `file_name`.
    pub async fn download(&self, path: &Path, file_name: &str) -> Result<()> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("file {} not found", path.display()))
            } else {
                Error::internal(format!("failed to read {}: {}", path.display(), e))
            }
        })?;

        self.set_header_str(header::CONTENT_DISPOSITION, &attachment(file_name))?;
        self.set_header(
            header::CONTENT_LENGTH,
            HeaderValue::from(data.len() as u64),
        );
        self.send("application/octet-stream", data)
    }

    /// Converts the sent response into an `http::Response`.
    pub fn to_http(&self) -> Response<BoxBody> {
        let state = self.lock();
        let mut response = Response::new(Full::new(state.body.clone()));
        *response.status_mut() = state.status;
        *response.headers_mut() = state.headers.clone();
        response
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// `Content-Disposition` value for a download.
pub fn attachment(file_name: &str) -> String {
    let escaped = file_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("attachment; filename=\"{}\"", escaped)
}
