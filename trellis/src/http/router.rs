use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Method, Request, Response};
use http_body_util::Full;
use tracing::{debug, error, warn};

use super::middleware::{Exchange, Middleware, Next, Step};
use super::{BoxBody, HttpRequest, PathParams};
use crate::context::TRACE_ID_HEADER;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A route path such as `/people/:id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(path: &str) -> Self {
        let segments = split(path)
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self {
            raw: path.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a request path, tolerating one trailing slash.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = split(path);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_matches('/');
    trimmed.split('/').filter(|s| !s.is_empty())
}

struct Layer {
    /// `None` matches every verb.
    method: Option<Method>,
    pattern: PathPattern,
    chain: Vec<Arc<dyn Middleware>>,
}

impl Layer {
    fn accepts(&self, method: &Method, head_falls_back: bool) -> bool {
        match &self.method {
            None => true,
            Some(m) if m == method => true,
            Some(m) => head_falls_back && *method == Method::HEAD && *m == Method::GET,
        }
    }
}

/// Ordered route table of the host framework.
///
/// Every layer whose verb and path match a request contributes its chain, in
/// registration order; a chain hands over to the next matching layer by
/// calling `next.run`.
pub struct Router {
    layers: Vec<Layer>,
}

impl Router {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn route(mut self, method: Method, path: &str, chain: Vec<Arc<dyn Middleware>>) -> Self {
        self.add_route(method, path, chain);
        self
    }

    pub fn add_route(&mut self, method: Method, path: &str, chain: Vec<Arc<dyn Middleware>>) {
        self.layers.push(Layer {
            method: Some(method),
            pattern: PathPattern::parse(path),
            chain,
        });
    }

    /// Registers a chain for every verb on `path`.
    pub fn all(mut self, path: &str, chain: Vec<Arc<dyn Middleware>>) -> Self {
        self.add_all(path, chain);
        self
    }

    pub fn add_all(&mut self, path: &str, chain: Vec<Arc<dyn Middleware>>) {
        self.layers.push(Layer {
            method: None,
            pattern: PathPattern::parse(path),
            chain,
        });
    }

    pub fn get(self, path: &str, handler: impl Middleware) -> Self {
        self.route(Method::GET, path, vec![Arc::new(handler)])
    }

    pub fn post(self, path: &str, handler: impl Middleware) -> Self {
        self.route(Method::POST, path, vec![Arc::new(handler)])
    }

    pub fn put(self, path: &str, handler: impl Middleware) -> Self {
        self.route(Method::PUT, path, vec![Arc::new(handler)])
    }

    pub fn delete(self, path: &str, handler: impl Middleware) -> Self {
        self.route(Method::DELETE, path, vec![Arc::new(handler)])
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub async fn handle(&self, req: Request<Bytes>) -> Response<BoxBody> {
        let mut exchange = Exchange::new(HttpRequest::from_http(req));
        let method = exchange.request.method.clone();
        let path = exchange.request.path().to_string();

        let head_falls_back = method == Method::HEAD
            && !self.layers.iter().any(|layer| {
                layer.method.as_ref() == Some(&Method::HEAD) && layer.pattern.matches(&path).is_some()
            });

        let mut steps = Vec::new();
        for layer in &self.layers {
            if !layer.accepts(&method, head_falls_back) {
                continue;
            }
            if let Some(params) = layer.pattern.matches(&path) {
                for middleware in &layer.chain {
                    steps.push(Step {
                        params: params.clone(),
                        middleware: middleware.clone(),
                    });
                }
            }
        }

        debug!(
            trace_id = %exchange.context.trace_id,
            %method,
            %path,
            steps = steps.len(),
            "handling request"
        );

        let outcome = Next::new(&steps).run(&mut exchange).await;
        let trace_id = exchange.context.trace_id.clone();

        let mut response = match outcome {
            Ok(()) if exchange.response.headers_sent() => exchange.response.to_http(),
            Ok(()) => Error::not_found(format!("cannot {} {}", method, path)).into_response(&trace_id),
            Err(err) if exchange.response.headers_sent() => {
                warn!(trace_id = %trace_id, error = %err, "error raised after response was sent");
                exchange.response.to_http()
            }
            Err(err) => {
                if err.status >= 500 {
                    error!(trace_id = %trace_id, error = %err, "request failed");
                } else {
                    debug!(trace_id = %trace_id, status = err.status, error = %err, "request rejected");
                }
                err.into_response(&trace_id)
            }
        };

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        if method == Method::HEAD {
            *response.body_mut() = Full::new(Bytes::new());
        }
        debug!(
            trace_id = %trace_id,
            status = response.status().as_u16(),
            elapsed_ms = exchange.context.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
