//! The application façade and the hyper serve loop.

use std::any::TypeId;
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::Arc;

use http::{Method, Request, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::builder::RouteBuilder;
use crate::config::{ParserConfig, ServerConfig};
use crate::context::RequestContext;
use crate::error::{DeclarationError, Error};
use crate::factory::{DefaultServiceFactory, ServiceFactory};
use crate::http::{BoxBody, Router};
use crate::introspection::{ROUTES_PATH, RoutesEndpoint};
use crate::metadata::DEFAULT_SCOPE;
use crate::registry::Registry;
use crate::security::Authenticator;

type Declare = Box<dyn FnOnce(&mut Registry) -> Result<(), DeclarationError> + Send>;

/// Collects declarations and collaborators, then builds or serves the router.
///
/// ```ignore
/// Trellis::new()
///     .declare(people::declare)
///     .authenticator(JwtAuthenticator::from_env()?)
///     .listen("127.0.0.1:3000")
///     .await
/// ```
pub struct Trellis {
    registry: Registry,
    declarations: Vec<Declare>,
    discover: bool,
    factory: Arc<dyn ServiceFactory>,
    authenticators: Vec<(String, Arc<dyn Authenticator>)>,
    parsers: ParserConfig,
    server: ServerConfig,
    only: Option<Vec<TypeId>>,
    introspection: bool,
    router: Router,
}

impl Trellis {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            declarations: Vec::new(),
            discover: false,
            factory: Arc::new(DefaultServiceFactory),
            authenticators: Vec::new(),
            parsers: ParserConfig::default(),
            server: ServerConfig::default(),
            only: None,
            introspection: false,
            router: Router::new(),
        }
    }

    /// Direct access to the registry for imperative declarations.
    pub fn registry(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Queues a declaration function, run when the router is built.
    pub fn declare<F>(mut self, declare: F) -> Self
    where
        F: FnOnce(&mut Registry) -> Result<(), DeclarationError> + Send + 'static,
    {
        self.declarations.push(Box::new(declare));
        self
    }

    /// Applies every `inventory`-submitted service declaration at build time.
    pub fn discover(mut self) -> Self {
        self.discover = true;
        self
    }

    pub fn factory(mut self, factory: impl ServiceFactory) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    /// Authenticator for the default scope.
    pub fn authenticator(self, authenticator: impl Authenticator) -> Self {
        self.scoped_authenticator(DEFAULT_SCOPE, authenticator)
    }

    pub fn scoped_authenticator(mut self, scope: &str, authenticator: impl Authenticator) -> Self {
        self.authenticators
            .push((scope.to_string(), Arc::new(authenticator)));
        self
    }

    pub fn parsers(mut self, parsers: ParserConfig) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn server_config(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Serves `GET /__trellis/routes` with the registered routes.
    pub fn with_introspection(mut self, enabled: bool) -> Self {
        self.introspection = enabled;
        self
    }

    /// Registers only the given service types.
    pub fn only(mut self, types: impl IntoIterator<Item = TypeId>) -> Self {
        self.only = Some(types.into_iter().collect());
        self
    }

    /// Host router the services are added to, for hand-written routes.
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Runs the queued declarations, seals the registry and registers the
    /// routes.
    pub fn build(self) -> Result<Router, DeclarationError> {
        let Trellis {
            mut registry,
            declarations,
            discover,
            factory,
            authenticators,
            parsers,
            only,
            introspection,
            mut router,
            ..
        } = self;

        if discover {
            registry.discover()?;
        }
        for declare in declarations {
            declare(&mut registry)?;
        }

        let sealed = Arc::new(registry.seal()?);
        if introspection {
            router.add_route(
                Method::GET,
                ROUTES_PATH,
                vec![Arc::new(RoutesEndpoint::new(sealed.routes()))],
            );
        }

        let mut builder = RouteBuilder::new(sealed)
            .shared_factory(factory)
            .parsers(parsers);
        for (scope, authenticator) in authenticators {
            builder = builder.authenticator(scope, authenticator);
        }
        if let Some(types) = only {
            builder = builder.only(types);
        }
        Ok(builder.build(router))
    }

    /// Builds the router and serves it on `addr` until ctrl-c.
    pub async fn listen(self, addr: &str) -> io::Result<()> {
        let max_body_size = self.server.max_body_size;
        let router = self.build().map_err(io::Error::other)?;
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        serve(listener, router, max_body_size, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    }

    /// Listens on the configured host and port.
    pub async fn run(self) -> io::Result<()> {
        let addr = self.server.addr();
        self.listen(&addr).await
    }
}

impl Default for Trellis {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `router` on `listener` until `shutdown` resolves, then waits for
/// open connections to finish.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    max_body_size: usize,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let router = Arc::new(router);
    let graceful = GracefulShutdown::new();
    let mut shutdown = pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(connection) => connection,
                    Err(err) => {
                        warn!(error = %err, "failed to accept connection");
                        continue;
                    }
                };
                let router = router.clone();
                let service = service_fn(move |req: Request<Incoming>| {
                    let router = router.clone();
                    async move { Ok::<_, Infallible>(handle(&router, req, max_body_size).await) }
                });
                let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                let connection = graceful.watch(connection);
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        debug!(peer = %peer, error = %err, "connection closed with error");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn handle(router: &Router, req: Request<Incoming>, max_body_size: usize) -> Response<BoxBody> {
    let (parts, body) = req.into_parts();
    match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => {
            router
                .handle(Request::from_parts(parts, collected.to_bytes()))
                .await
        }
        Err(err) => {
            let error = if err.downcast_ref::<LengthLimitError>().is_some() {
                Error::payload_too_large(format!("request body exceeds {} bytes", max_body_size))
            } else {
                Error::bad_request(format!("failed to read request body: {}", err))
            };
            error.into_response(&RequestContext::new().trace_id)
        }
    }
}
