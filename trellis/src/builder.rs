//! Turns sealed declarations into router registrations.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use http::Method;
use tracing::{info, warn};

use crate::config::ParserConfig;
use crate::dispatcher::ServiceInvoker;
use crate::error::{Error, Result};
use crate::factory::{DefaultServiceFactory, ServiceFactory};
use crate::http::parsers::{body_parser, cookie_parser, form_parser, multipart_parser};
use crate::http::{BoxFuture, Exchange, Middleware, Next, Router};
use crate::metadata::{ParamKind, ServiceClass, ServiceMethod};
use crate::registry::SealedRegistry;
use crate::security::{Authenticator, RoleGuard};

/// Registers every routable endpoint of a sealed registry on a router.
pub struct RouteBuilder {
    registry: Arc<SealedRegistry>,
    factory: Arc<dyn ServiceFactory>,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    parsers: ParserConfig,
    only: Option<Vec<TypeId>>,
}

impl RouteBuilder {
    pub fn new(registry: Arc<SealedRegistry>) -> Self {
        Self {
            registry,
            factory: Arc::new(DefaultServiceFactory),
            authenticators: HashMap::new(),
            parsers: ParserConfig::default(),
            only: None,
        }
    }

    pub fn factory(mut self, factory: impl ServiceFactory) -> Self {
        self.factory = Arc::new(factory);
        self
    }

    pub fn shared_factory(mut self, factory: Arc<dyn ServiceFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Authenticator used for roles declared under `scope`.
    pub fn authenticator(mut self, scope: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.insert(scope.into(), authenticator);
        self
    }

    pub fn parsers(mut self, parsers: ParserConfig) -> Self {
        self.parsers = parsers;
        self
    }

    /// Restricts registration to the given service types, mapped through
    /// the factory's `target_class` when the router is built.
    pub fn only(mut self, types: impl IntoIterator<Item = TypeId>) -> Self {
        self.only = Some(types.into_iter().collect());
        self
    }

    fn targets(&self) -> Option<Vec<TypeId>> {
        self.only.as_ref().map(|types| {
            types
                .iter()
                .map(|&candidate| self.factory.target_class(candidate))
                .collect()
        })
    }

    /// Middlewares for one endpoint, dispatcher last.
    fn chain(&self, class: &Arc<ServiceClass>, index: usize) -> Vec<Arc<dyn Middleware>> {
        let method = &class.methods[index];
        let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();

        for (scope, roles) in &method.resolved_roles {
            match self.authenticators.get(scope) {
                Some(authenticator) => {
                    chain.push(authenticator.middleware());
                    chain.push(Arc::new(RoleGuard::new(authenticator.clone(), roles.clone())));
                }
                None => warn!(
                    service = class.name(),
                    method = %method.name,
                    scope = %scope,
                    "roles declared but no authenticator configured for scope"
                ),
            }
        }

        if method.must_parse_cookies || class.has_property_kind(ParamKind::Cookie) {
            chain.push(cookie_parser(self.parsers.cookies.clone()));
        }
        if needs_body(class, method) {
            let options = method
                .body_options
                .clone()
                .unwrap_or_else(|| self.parsers.body.clone());
            chain.push(body_parser(options));
        }
        if method.must_parse_forms
            || method.accept_multi_typed_param
            || class.has_property_kind(ParamKind::Form)
            || class.has_property_kind(ParamKind::Param)
        {
            chain.push(form_parser(self.parsers.forms.clone()));
        }
        if method.has_files() {
            chain.push(multipart_parser(method.files.clone(), self.parsers.uploads.clone()));
        }

        chain.push(Arc::new(ServiceInvoker::new(
            class.clone(),
            index,
            self.factory.clone(),
            self.registry.converters().clone(),
        )));
        chain
    }

    /// Registers the endpoints on `router`, then one catch-all per path that
    /// answers 405 for verbs the path does not serve.
    pub fn build(&self, mut router: Router) -> Router {
        let mut allowed: BTreeMap<String, Vec<Method>> = BTreeMap::new();
        let targets = self.targets();

        for endpoint in self.registry.endpoints() {
            if targets
                .as_ref()
                .is_some_and(|targets| !targets.contains(&endpoint.class.type_id()))
            {
                continue;
            }
            let method = endpoint.method();
            let verb = endpoint.verb();
            let path = endpoint.path().to_string();

            info!(
                method = %verb,
                path = %path,
                service = endpoint.class.name(),
                handler = %method.name,
                "registering route"
            );
            router.add_route(verb.clone(), &path, self.chain(endpoint.class, endpoint.index));
            allowed.entry(path).or_default().push(verb);
        }

        for (path, verbs) in allowed {
            router.add_all(&path, vec![Arc::new(MethodNotAllowed::new(verbs))]);
        }
        router
    }
}

fn needs_body(class: &ServiceClass, method: &ServiceMethod) -> bool {
    method.must_parse_body || class.has_property_kind(ParamKind::Body)
}

/// Fails requests whose verb the path does not serve with 405 and `Allow`.
pub struct MethodNotAllowed {
    allowed: Vec<Method>,
}

impl MethodNotAllowed {
    pub fn new(allowed: Vec<Method>) -> Self {
        Self { allowed }
    }

    fn allows(&self, method: &Method) -> bool {
        self.allowed.contains(method)
            || (*method == Method::HEAD && self.allowed.contains(&Method::GET))
    }
}

impl Middleware for MethodNotAllowed {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if exchange.response.headers_sent() || self.allows(&exchange.request.method) {
                return next.run(exchange).await;
            }
            Err(Error::method_not_allowed(&self.allowed))
        })
    }
}
