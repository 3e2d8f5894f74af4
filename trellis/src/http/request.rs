use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri, Version, header};
use serde_json::Value;

use crate::negotiation;

/// Path parameters extracted by the router for the matching route.
pub type PathParams = HashMap<String, String>;

/// A file received in a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// The request as seen by middlewares and services.
///
/// Parser middlewares fill `body`, `cookies` and `files`; until they run
/// those facets are empty and only `raw_body` is available.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub extensions: Extensions,
    pub path_params: PathParams,
    pub raw_body: Bytes,
    pub body: Option<Value>,
    pub cookies: Option<HashMap<String, String>>,
    pub files: HashMap<String, Vec<UploadedFile>>,
    query: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, raw_body) = req.into_parts();
        let query = parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .unwrap_or_default();

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            path_params: PathParams::new(),
            raw_body,
            body: None,
            cookies: None,
            files: HashMap::new(),
            query,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// First value of the named query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Cookie value; `None` until the cookie parser has run.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .as_ref()
            .and_then(|cookies| cookies.get(name))
            .map(String::as_str)
    }

    /// A field of the parsed body rendered as text.
    pub fn body_field(&self, name: &str) -> Option<String> {
        let field = self.body.as_ref()?.get(name)?;
        match field {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Array(values) => values.first().and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            }),
            other => Some(other.to_string()),
        }
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).and_then(|files| files.first())
    }

    pub fn files(&self, name: &str) -> &[UploadedFile] {
        self.files.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        let raw = self.header(header::CONTENT_TYPE.as_str())?;
        let essence = raw.split(';').next().unwrap_or(raw).trim();
        if essence.is_empty() {
            None
        } else {
            Some(essence.to_ascii_lowercase())
        }
    }

    /// Requested languages, most preferred first.
    pub fn accepted_languages(&self) -> Vec<String> {
        negotiation::parse_quality_list(self.header(header::ACCEPT_LANGUAGE.as_str()))
    }

    /// Requested media types, most preferred first.
    pub fn accepted_media_types(&self) -> Vec<String> {
        negotiation::parse_quality_list(self.header(header::ACCEPT.as_str()))
    }

    /// Best declared language for this request, if any is acceptable.
    pub fn accepts_languages(&self, declared: &[String]) -> Option<String> {
        negotiation::negotiate_language(self.header(header::ACCEPT_LANGUAGE.as_str()), declared)
    }

    /// Best declared media type for this request, if any is acceptable.
    pub fn accepts(&self, declared: &[String]) -> Option<String> {
        negotiation::negotiate_media_type(self.header(header::ACCEPT.as_str()), declared)
    }
}
