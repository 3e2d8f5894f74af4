use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{HttpRequest, HttpResponse, PathParams};
use crate::context::RequestContext;
use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-request state threaded through the middleware chain.
#[derive(Debug)]
pub struct Exchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub context: RequestContext,
}

impl Exchange {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            response: HttpResponse::new(),
            context: RequestContext::new(),
        }
    }
}

/// A step in a route's chain.
///
/// Returning `Err` aborts the chain and hands the error to the router's
/// error renderer. Calling `next.run` passes control to the following step,
/// which may belong to a later matching route.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>>;
}

pub(crate) struct Step {
    pub(crate) params: PathParams,
    pub(crate) middleware: Arc<dyn Middleware>,
}

/// Continuation over the remaining steps for the current request.
pub struct Next<'a> {
    steps: &'a [Step],
}

impl<'a> Next<'a> {
    pub(crate) fn new(steps: &'a [Step]) -> Self {
        Self { steps }
    }

    /// An empty continuation, useful when driving a middleware directly.
    pub fn end() -> Next<'static> {
        Next { steps: &[] }
    }

    pub async fn run(self, exchange: &mut Exchange) -> Result<()> {
        match self.steps.split_first() {
            Some((step, rest)) => {
                if exchange.request.path_params != step.params {
                    exchange.request.path_params = step.params.clone();
                }
                step.middleware.handle(exchange, Next { steps: rest }).await
            }
            None => Ok(()),
        }
    }
}

/// Middleware built from a synchronous closure that always continues.
pub struct Inspect<F>(pub F);

impl<F> Middleware for Inspect<F>
where
    F: Fn(&mut Exchange) -> Result<()> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            (self.0)(exchange)?;
            next.run(exchange).await
        })
    }
}
