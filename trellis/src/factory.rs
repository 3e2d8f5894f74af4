use std::any::TypeId;

use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::metadata::{ServiceClass, ServiceInstance};

/// Supplies service instances to the dispatcher.
///
/// The default creates a fresh instance per request. A custom factory may
/// pool or share instances; the dispatcher makes no assumption either way.
pub trait ServiceFactory: Send + Sync + 'static {
    fn create(&self, service: &ServiceClass, context: &ServiceContext) -> Result<ServiceInstance>;

    /// Maps a type handed to the route builder onto the declared service
    /// type, for factories that wrap services in proxies.
    fn target_class(&self, candidate: TypeId) -> TypeId {
        candidate
    }
}

/// Builds instances with the constructor recorded by `Registry::service`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultServiceFactory;

impl ServiceFactory for DefaultServiceFactory {
    fn create(&self, service: &ServiceClass, _context: &ServiceContext) -> Result<ServiceInstance> {
        match &service.constructor {
            Some(constructor) => Ok(constructor()),
            None => Err(Error::internal(format!(
                "service {} has no constructor; declare it with `service` or use a custom factory",
                service.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NextCallback;
    use crate::http::{HttpRequest, HttpResponse};
    use crate::metadata::ServiceKey;
    use crate::registry::Registry;
    use bytes::Bytes;

    #[derive(Default)]
    struct Greeter;

    struct Manual;

    fn context() -> ServiceContext {
        ServiceContext {
            request: HttpRequest::from_http(
                http::Request::builder().uri("/").body(Bytes::new()).unwrap(),
            ),
            response: HttpResponse::new(),
            next: NextCallback::new(),
            language: None,
            accept: None,
            trace_id: "t".into(),
        }
    }

    #[test]
    fn test_default_factory_uses_constructor() {
        let mut registry = Registry::new();
        registry.service::<Greeter>();
        let class = registry.class_of::<Greeter>().unwrap();

        let instance = DefaultServiceFactory.create(class, &context()).unwrap();
        assert!(instance.downcast_ref::<Greeter>().is_some());
    }

    #[test]
    fn test_default_factory_without_constructor_fails() {
        let class = ServiceClass::new(ServiceKey::of::<Manual>());
        let err = DefaultServiceFactory.create(&class, &context()).unwrap_err();
        assert_eq!(err.status, 500);
    }

    #[test]
    fn test_target_class_is_identity() {
        let id = TypeId::of::<Greeter>();
        assert_eq!(DefaultServiceFactory.target_class(id), id);
    }
}
