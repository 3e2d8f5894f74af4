//! The routes listing endpoint.

use crate::error::Result;
use crate::http::{BoxFuture, Exchange, Middleware, Next};
use crate::introspection::RouteInfo;

/// Path the routes listing is mounted on.
pub const ROUTES_PATH: &str = "/__trellis/routes";

/// Answers with the registered routes as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct RoutesEndpoint {
    routes: Vec<RouteInfo>,
}

impl RoutesEndpoint {
    pub fn new(routes: Vec<RouteInfo>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }
}

impl Middleware for RoutesEndpoint {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, _next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { exchange.response.send_json(&self.routes) })
    }
}
