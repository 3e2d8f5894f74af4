//! Request-time parameter binding.
//!
//! [`process_parameter`] turns one declared binding into an [`Arg`] for the
//! current request. Named kinds read a request facet as text and coerce it
//! to the declared [`ParamType`]; the context kinds hand over parts of the
//! [`ServiceContext`] itself.

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::{NextCallback, ServiceContext};
use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse, UploadedFile};
use crate::metadata::{ParamKind, ParamType};

static NULL: Value = Value::Null;

/// A bound argument or property value.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    File(Option<UploadedFile>),
    Files(Vec<UploadedFile>),
    Request(HttpRequest),
    Response(HttpResponse),
    Next(NextCallback),
    Context(ServiceContext),
}

impl Arg {
    pub fn as_value(&self) -> &Value {
        match self {
            Arg::Value(value) => value,
            _ => &NULL,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Arg::Value(value) => value,
            _ => Value::Null,
        }
    }

    /// Deserializes a value argument.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(self.as_value())
            .map_err(|e| Error::bad_request(format!("invalid parameter: {}", e)))
    }
}

/// Positional arguments for one method call.
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn new(args: Vec<Arg>) -> Self {
        Self(args)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.0.get(index)
    }

    /// Moves the argument out, leaving `null` behind.
    pub fn take(&mut self, index: usize) -> Option<Arg> {
        self.0
            .get_mut(index)
            .map(|arg| std::mem::replace(arg, Arg::Value(Value::Null)))
    }

    pub fn value(&self, index: usize) -> &Value {
        self.get(index).map(Arg::as_value).unwrap_or(&NULL)
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.value(index).as_str()
    }

    pub fn f64(&self, index: usize) -> Option<f64> {
        self.value(index).as_f64()
    }

    pub fn bool(&self, index: usize) -> Option<bool> {
        self.value(index).as_bool()
    }

    /// Deserializes the argument at `index`; a mismatch is a 400.
    pub fn json<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        T::deserialize(self.value(index)).map_err(|e| {
            Error::bad_request(format!("invalid parameter at position {}: {}", index, e))
        })
    }

    pub fn file(&self, index: usize) -> Option<&UploadedFile> {
        match self.get(index) {
            Some(Arg::File(file)) => file.as_ref(),
            Some(Arg::Files(files)) => files.first(),
            _ => None,
        }
    }

    pub fn files(&self, index: usize) -> &[UploadedFile] {
        match self.get(index) {
            Some(Arg::Files(files)) => files,
            Some(Arg::File(Some(file))) => std::slice::from_ref(file),
            _ => &[],
        }
    }

    pub fn request(&self, index: usize) -> Option<&HttpRequest> {
        match self.get(index) {
            Some(Arg::Request(request)) => Some(request),
            Some(Arg::Context(ctx)) => Some(&ctx.request),
            _ => None,
        }
    }

    pub fn response(&self, index: usize) -> Option<&HttpResponse> {
        match self.get(index) {
            Some(Arg::Response(response)) => Some(response),
            Some(Arg::Context(ctx)) => Some(&ctx.response),
            _ => None,
        }
    }

    pub fn next(&self, index: usize) -> Option<&NextCallback> {
        match self.get(index) {
            Some(Arg::Next(next)) => Some(next),
            Some(Arg::Context(ctx)) => Some(&ctx.next),
            _ => None,
        }
    }

    pub fn context(&self, index: usize) -> Option<&ServiceContext> {
        match self.get(index) {
            Some(Arg::Context(ctx)) => Some(ctx),
            _ => None,
        }
    }
}

impl From<Vec<Arg>> for Args {
    fn from(args: Vec<Arg>) -> Self {
        Self(args)
    }
}

pub type Converter = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Converters for declared types other than `Number` and `Boolean`, keyed
/// by [`ParamType::name`]. Unregistered types pass through unchanged.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: DashMap<String, Converter>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, type_name: impl Into<String>, converter: F)
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.converters.insert(type_name.into(), Arc::new(converter));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.converters.contains_key(type_name)
    }

    pub fn convert(&self, type_name: &str, value: Value) -> Result<Value> {
        // Clone the handle so no shard lock is held while the converter runs.
        let converter = self.converters.get(type_name).map(|c| c.value().clone());
        match converter {
            Some(converter) => converter(value),
            None => Ok(value),
        }
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.converters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("ConverterRegistry").field("types", &names).finish()
    }
}

/// Resolves one declared binding against the current request.
pub fn process_parameter(
    kind: ParamKind,
    ctx: &ServiceContext,
    name: Option<&str>,
    param_type: &ParamType,
    converters: &ConverterRegistry,
) -> Result<Arg> {
    let request = &ctx.request;
    let name = name.unwrap_or_default();

    let raw = match kind {
        ParamKind::Path => request.path_param(name).map(str::to_string),
        ParamKind::Query => request.query(name).map(str::to_string),
        ParamKind::Header => request.header(name).map(str::to_string),
        ParamKind::Cookie => request.cookie(name).map(str::to_string),
        ParamKind::Form => request.body_field(name),
        ParamKind::Param => request
            .body_field(name)
            .filter(|v| !v.is_empty())
            .or_else(|| {
                request
                    .query(name)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            }),
        ParamKind::Body => {
            let body = request.body.clone().unwrap_or(Value::Null);
            let value = match body {
                Value::Object(_) | Value::Array(_) => converters.convert(param_type.name(), body)?,
                scalar => coerce(scalar, param_type, converters)?,
            };
            return Ok(Arg::Value(value));
        }
        ParamKind::File => return Ok(Arg::File(request.file(name).cloned())),
        ParamKind::Files => return Ok(Arg::Files(request.files(name).to_vec())),
        ParamKind::Context => return Ok(Arg::Context(ctx.clone())),
        ParamKind::ContextRequest => return Ok(Arg::Request(ctx.request.clone())),
        ParamKind::ContextResponse => return Ok(Arg::Response(ctx.response.clone())),
        ParamKind::ContextNext => return Ok(Arg::Next(ctx.next.clone())),
        ParamKind::ContextLanguage => return Ok(Arg::Value(optional_text(&ctx.language))),
        ParamKind::ContextAccept => return Ok(Arg::Value(optional_text(&ctx.accept))),
    };

    let value = raw.map(Value::String).unwrap_or(Value::Null);
    coerce(value, param_type, converters).map(Arg::Value)
}

fn optional_text(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn coerce(value: Value, param_type: &ParamType, converters: &ConverterRegistry) -> Result<Value> {
    match param_type {
        ParamType::Number => Ok(match value {
            Value::Null | Value::Number(_) => value,
            Value::String(text) => parse_float(&text).map(number).unwrap_or(Value::Null),
            _ => Value::Null,
        }),
        ParamType::Boolean => Ok(match value {
            Value::Null => Value::Null,
            Value::Bool(flag) => Value::Bool(flag),
            Value::String(text) => Value::Bool(text == "true"),
            _ => Value::Bool(false),
        }),
        other => converters.convert(other.name(), value),
    }
}

/// Whole numbers in `i64` range are stored as integers.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Parses the longest numeric prefix of `text`, ignoring leading whitespace.
pub fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let mut end = 0;
    let bytes = text.as_bytes();
    let mut seen_digit = false;
    let mut seen_dot = false;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }

    // Optional exponent, only taken when it has digits.
    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    text[..end].parse().ok().filter(|n: &f64| n.is_finite())
}
