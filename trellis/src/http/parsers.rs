//! Request parsing middlewares.
//!
//! Each parser fills one facet of [`HttpRequest`] and continues the chain.
//! Parsers leave facets alone when the content type is not theirs, so they
//! can be stacked in any combination a route needs.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use cookie::Cookie;
use futures_util::stream;
use http::header;
use serde_json::{Map, Value};
use tracing::debug;

use super::middleware::{BoxFuture, Exchange, Middleware, Next};
use super::{HttpRequest, UploadedFile};
use crate::error::{Error, Result};
use crate::metadata::FileParam;

const DEFAULT_BODY_LIMIT: usize = 100 * 1024;
const DEFAULT_FILE_SIZE_LIMIT: usize = 10 * 1024 * 1024;
const DEFAULT_FILES_LIMIT: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct CookieParserOptions {
    /// Percent-decode cookie names and values.
    pub decode: bool,
}

/// Body encodings the body parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Json,
    Text,
}

#[derive(Debug, Clone)]
pub struct BodyParserOptions {
    /// Maximum accepted body size in bytes.
    pub limit: usize,
    pub types: Vec<BodyType>,
}

impl Default for BodyParserOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
            types: vec![BodyType::Json],
        }
    }
}

impl BodyParserOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_types(mut self, types: impl Into<Vec<BodyType>>) -> Self {
        self.types = types.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct FormParserOptions {
    pub limit: usize,
}

impl Default for FormParserOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Maximum size of a single uploaded file in bytes.
    pub file_size_limit: usize,
    /// Maximum number of files in one request.
    pub files_limit: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            files_limit: DEFAULT_FILES_LIMIT,
        }
    }
}

pub fn cookie_parser(options: CookieParserOptions) -> Arc<dyn Middleware> {
    Arc::new(CookieParser { options })
}

pub fn body_parser(options: BodyParserOptions) -> Arc<dyn Middleware> {
    Arc::new(BodyParser { options })
}

pub fn form_parser(options: FormParserOptions) -> Arc<dyn Middleware> {
    Arc::new(FormParser { options })
}

pub fn multipart_parser(fields: Vec<FileParam>, options: UploadOptions) -> Arc<dyn Middleware> {
    Arc::new(MultipartParser { fields, options })
}

pub struct CookieParser {
    options: CookieParserOptions,
}

impl CookieParser {
    fn parse(&self, request: &HttpRequest) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        for value in request.headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            let parsed: Vec<_> = if self.options.decode {
                Cookie::split_parse_encoded(raw.to_string()).collect()
            } else {
                Cookie::split_parse(raw.to_string()).collect()
            };
            for cookie in parsed.into_iter().flatten() {
                cookies
                    .entry(cookie.name().to_string())
                    .or_insert_with(|| cookie.value().to_string());
            }
        }
        cookies
    }
}

impl Middleware for CookieParser {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if exchange.request.cookies.is_none() {
                exchange.request.cookies = Some(self.parse(&exchange.request));
            }
            next.run(exchange).await
        })
    }
}

pub struct BodyParser {
    options: BodyParserOptions,
}

impl BodyParser {
    fn parse(&self, request: &HttpRequest) -> Result<Option<Value>> {
        let Some(content_type) = request.content_type() else {
            return Ok(None);
        };
        if request.raw_body.len() > self.options.limit {
            return Err(Error::payload_too_large(format!(
                "request body exceeds {} bytes",
                self.options.limit
            )));
        }

        for body_type in &self.options.types {
            match body_type {
                BodyType::Json if is_json(&content_type) => {
                    if request.raw_body.is_empty() {
                        return Ok(None);
                    }
                    return serde_json::from_slice(&request.raw_body)
                        .map(Some)
                        .map_err(Error::from);
                }
                BodyType::Text if content_type.starts_with("text/") => {
                    let text = String::from_utf8(request.raw_body.to_vec())
                        .map_err(|_| Error::bad_request("request body is not valid UTF-8"))?;
                    return Ok(Some(Value::String(text)));
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

fn is_json(content_type: &str) -> bool {
    content_type == "application/json" || content_type.ends_with("+json")
}

impl Middleware for BodyParser {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if exchange.request.body.is_none() {
                exchange.request.body = self.parse(&exchange.request)?;
            }
            next.run(exchange).await
        })
    }
}

pub struct FormParser {
    options: FormParserOptions,
}

impl FormParser {
    fn parse(&self, request: &HttpRequest) -> Result<Option<Value>> {
        if request.content_type().as_deref() != Some("application/x-www-form-urlencoded") {
            return Ok(None);
        }
        if request.raw_body.len() > self.options.limit {
            return Err(Error::payload_too_large(format!(
                "form body exceeds {} bytes",
                self.options.limit
            )));
        }

        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&request.raw_body)
            .map_err(|e| Error::bad_request(format!("invalid form body: {}", e)))?;
        let mut fields = Map::new();
        for (name, value) in pairs {
            insert_field(&mut fields, name, value);
        }
        Ok(Some(Value::Object(fields)))
    }
}

/// Repeated names collect into an array.
fn insert_field(fields: &mut Map<String, Value>, name: String, value: String) {
    match fields.get_mut(&name) {
        Some(Value::Array(values)) => values.push(Value::String(value)),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, Value::String(value)]);
        }
        None => {
            fields.insert(name, Value::String(value));
        }
    }
}

impl Middleware for FormParser {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if exchange.request.body.is_none() {
                exchange.request.body = self.parse(&exchange.request)?;
            }
            next.run(exchange).await
        })
    }
}

pub struct MultipartParser {
    fields: Vec<FileParam>,
    options: UploadOptions,
}

impl MultipartParser {
    async fn parse(&self, request: &mut HttpRequest) -> Result<()> {
        if request.content_type().as_deref() != Some("multipart/form-data") {
            return Ok(());
        }
        let content_type = request.header(header::CONTENT_TYPE.as_str()).unwrap_or("");
        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| Error::bad_request(format!("invalid multipart boundary: {}", e)))?;

        let body = request.raw_body.clone();
        let stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut text_fields = match request.body.take() {
            Some(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        let mut files: HashMap<String, Vec<UploadedFile>> = HashMap::new();
        let mut count = 0;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            if field.file_name().is_none() {
                let value = field.text().await.map_err(multipart_error)?;
                insert_field(&mut text_fields, name, value);
                continue;
            }

            let declared = self
                .fields
                .iter()
                .find(|f| f.name == name)
                .ok_or_else(|| Error::bad_request(format!("unexpected file field `{}`", name)))?;
            let received = files.entry(name.clone()).or_default();
            if declared.single_file && !received.is_empty() {
                return Err(Error::bad_request(format!(
                    "field `{}` accepts a single file",
                    name
                )));
            }

            count += 1;
            if count > self.options.files_limit {
                return Err(Error::payload_too_large(format!(
                    "more than {} files uploaded",
                    self.options.files_limit
                )));
            }

            let file_name = field.file_name().map(str::to_string);
            let file_type = field.content_type().map(|m| m.to_string());
            let data = field.bytes().await.map_err(multipart_error)?;
            if data.len() > self.options.file_size_limit {
                return Err(Error::payload_too_large(format!(
                    "file in field `{}` exceeds {} bytes",
                    name, self.options.file_size_limit
                )));
            }

            debug!(field = %name, size = data.len(), "received upload");
            received.push(UploadedFile {
                field_name: name,
                file_name,
                content_type: file_type,
                data,
            });
        }

        request.body = Some(Value::Object(text_fields));
        request.files = files;
        Ok(())
    }
}

fn multipart_error(err: multer::Error) -> Error {
    Error::bad_request(format!("invalid multipart body: {}", err))
}

impl Middleware for MultipartParser {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.parse(&mut exchange.request).await?;
            next.run(exchange).await
        })
    }
}
