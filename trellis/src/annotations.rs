//! Declaration processors and the fluent builders over them.
//!
//! Every processor takes an explicit [`Target`]. A processor applied to a
//! target kind it does not support fails with
//! [`DeclarationError::InvalidTarget`].
//!
//! ```ignore
//! let mut registry = Registry::new();
//! let mut people = registry.service::<PeopleService>();
//! people.path("/people")?;
//! people
//!     .method("get")
//!     .get(":id")?
//!     .param(0, ParamBinding::path("id").typed(ParamType::Number))?
//!     .handler(|svc, args| svc.get(args.f64(0)))?;
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use http::Method;

use crate::error::{DeclarationError, Result};
use crate::http::BodyParserOptions;
use crate::metadata::{
    Constructor, DEFAULT_SCOPE, Invoker, MethodParam, ParamKind, ParamType, PreProcessor, PropertySetter,
    ServiceInstance, ServiceKey, ServiceMethod, ServiceProperty,
};
use crate::params::{Arg, Args};
use crate::registry::{Registry, downcast};
use crate::returns::ServiceReturn;

type DeclResult<T> = std::result::Result<T, DeclarationError>;

/// What a declaration is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Class(ServiceKey),
    Method(ServiceKey, String),
    Property(ServiceKey, String),
    Parameter(ServiceKey, String, usize),
}

impl Target {
    pub fn key(&self) -> ServiceKey {
        match self {
            Target::Class(key)
            | Target::Method(key, _)
            | Target::Property(key, _)
            | Target::Parameter(key, _, _) => *key,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Class(key) => write!(f, "service {}", key),
            Target::Method(key, name) => write!(f, "method {}::{}", key, name),
            Target::Property(key, name) => write!(f, "property {}.{}", key, name),
            Target::Parameter(key, name, index) => {
                write!(f, "parameter {} of {}::{}", index, key, name)
            }
        }
    }
}

fn invalid(declaration: &'static str, target: &Target) -> DeclarationError {
    DeclarationError::InvalidTarget {
        declaration,
        target: target.to_string(),
    }
}

fn empty_name(declaration: &'static str, target: &Target) -> DeclarationError {
    DeclarationError::EmptyName {
        declaration,
        target: target.to_string(),
    }
}

/// Drops blank entries; an empty result is a declaration error.
fn filter_values(
    declaration: &'static str,
    target: &Target,
    values: &[&str],
) -> DeclResult<Vec<String>> {
    let filtered: Vec<String> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if filtered.is_empty() {
        return Err(DeclarationError::EmptyValues {
            declaration,
            target: target.to_string(),
        });
    }
    Ok(filtered)
}

fn union_into(list: &mut Vec<String>, values: Vec<String>) {
    for value in values {
        if !list.contains(&value) {
            list.push(value);
        }
    }
}

/// How a method parameter or service property is bound to request data.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamBinding {
    pub kind: ParamKind,
    pub name: Option<String>,
    pub param_type: Option<ParamType>,
}

impl ParamBinding {
    pub fn new(kind: ParamKind, name: Option<String>) -> Self {
        Self {
            kind,
            name,
            param_type: None,
        }
    }

    fn named(kind: ParamKind, name: impl Into<String>) -> Self {
        Self::new(kind, Some(name.into()))
    }

    pub fn path(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Path, name)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Query, name)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Header, name)
    }

    pub fn cookie(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Cookie, name)
    }

    pub fn form(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Form, name)
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Param, name)
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::named(ParamKind::File, name)
    }

    pub fn files(name: impl Into<String>) -> Self {
        Self::named(ParamKind::Files, name)
    }

    pub fn body() -> Self {
        Self::new(ParamKind::Body, None)
    }

    pub fn context() -> Self {
        Self::new(ParamKind::Context, None)
    }

    pub fn request() -> Self {
        Self::new(ParamKind::ContextRequest, None)
    }

    pub fn response() -> Self {
        Self::new(ParamKind::ContextResponse, None)
    }

    pub fn next() -> Self {
        Self::new(ParamKind::ContextNext, None)
    }

    pub fn language() -> Self {
        Self::new(ParamKind::ContextLanguage, None)
    }

    pub fn accept() -> Self {
        Self::new(ParamKind::ContextAccept, None)
    }

    pub fn typed(mut self, param_type: ParamType) -> Self {
        self.param_type = Some(param_type);
        self
    }

    fn checked_name(&self, target: &Target) -> DeclResult<Option<String>> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if self.kind.is_named() && name.is_none() {
            return Err(empty_name(self.kind.as_str(), target));
        }
        Ok(name)
    }

    fn default_type(&self) -> ParamType {
        if self.kind.is_named() {
            ParamType::String
        } else {
            ParamType::Json
        }
    }
}

impl Registry {
    fn method_record(&mut self, declaration: &'static str, target: &Target) -> DeclResult<&mut ServiceMethod> {
        let (key, name) = match target {
            Target::Method(key, name) | Target::Parameter(key, name, _) => (*key, name.as_str()),
            _ => return Err(invalid(declaration, target)),
        };
        self.register_service_method(key, name)
            .ok_or_else(|| empty_name("method", target))
    }

    /// Sets the service path or the method path fragment.
    pub fn declare_path(&mut self, target: &Target, path: &str) -> DeclResult<()> {
        match target {
            Target::Class(key) => {
                self.register_service_class(*key).path = Some(path.to_string());
                Ok(())
            }
            Target::Method(..) => {
                self.method_record("Path", target)?.path = Some(path.to_string());
                Ok(())
            }
            _ => Err(invalid("Path", target)),
        }
    }

    /// Binds a method to its HTTP verb. Rebinding to the same verb is a no-op.
    pub fn declare_verb(&mut self, target: &Target, verb: Method) -> DeclResult<()> {
        if !matches!(target, Target::Method(..)) {
            return Err(invalid("HttpMethod", target));
        }
        let method = self.method_record("HttpMethod", target)?;
        if let Some(bound) = method.verb.clone() {
            if bound == verb {
                return Ok(());
            }
            return Err(DeclarationError::VerbConflict {
                method: method.name.clone(),
                bound,
                requested: verb,
            });
        }
        method.verb = Some(verb);
        let declared = method.signature.len();
        method.backfill(declared);
        Ok(())
    }

    pub fn declare_accept(&mut self, target: &Target, values: &[&str]) -> DeclResult<()> {
        let values = filter_values("Accept", target, values)?;
        match target {
            Target::Class(key) => union_into(&mut self.register_service_class(*key).accepts, values),
            Target::Method(..) => union_into(&mut self.method_record("Accept", target)?.accepts, values),
            _ => return Err(invalid("Accept", target)),
        }
        Ok(())
    }

    pub fn declare_accept_language(&mut self, target: &Target, values: &[&str]) -> DeclResult<()> {
        let values = filter_values("AcceptLanguage", target, values)?;
        match target {
            Target::Class(key) => {
                union_into(&mut self.register_service_class(*key).languages, values)
            }
            Target::Method(..) => union_into(
                &mut self.method_record("AcceptLanguage", target)?.languages,
                values,
            ),
            _ => return Err(invalid("AcceptLanguage", target)),
        }
        Ok(())
    }

    /// Requires one of `roles` under the authenticator `scope`; `*` accepts
    /// any authenticated caller.
    pub fn declare_security(
        &mut self,
        target: &Target,
        scope: Option<&str>,
        roles: &[&str],
    ) -> DeclResult<()> {
        let roles = filter_values("Security", target, roles)?;
        let scope = scope
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCOPE)
            .to_string();
        let declared = match target {
            Target::Class(key) => &mut self.register_service_class(*key).roles,
            Target::Method(..) => &mut self.method_record("Security", target)?.roles,
            _ => return Err(invalid("Security", target)),
        };
        union_into(declared.entry(scope).or_default(), roles);
        Ok(())
    }

    pub fn declare_abstract(&mut self, target: &Target) -> DeclResult<()> {
        match target {
            Target::Class(key) => {
                self.register_service_class(*key).is_abstract = true;
                Ok(())
            }
            _ => Err(invalid("Abstract", target)),
        }
    }

    pub fn declare_pre_processor(
        &mut self,
        target: &Target,
        processor: Arc<dyn PreProcessor>,
    ) -> DeclResult<()> {
        match target {
            Target::Class(key) => self.register_service_class(*key).pre_processors.push(processor),
            Target::Method(..) => self
                .method_record("PreProcessor", target)?
                .pre_processors
                .push(processor),
            _ => return Err(invalid("PreProcessor", target)),
        }
        Ok(())
    }

    pub fn declare_ignore_next_middlewares(&mut self, target: &Target) -> DeclResult<()> {
        match target {
            Target::Class(key) => self.register_service_class(*key).ignore_next_middlewares = true,
            Target::Method(..) => {
                self.method_record("IgnoreNextMiddlewares", target)?
                    .ignore_next_middlewares = true
            }
            _ => return Err(invalid("IgnoreNextMiddlewares", target)),
        }
        Ok(())
    }

    pub fn declare_body_options(
        &mut self,
        target: &Target,
        options: BodyParserOptions,
    ) -> DeclResult<()> {
        if !matches!(target, Target::Method(..)) {
            return Err(invalid("BodyOptions", target));
        }
        self.method_record("BodyOptions", target)?.body_options = Some(options);
        Ok(())
    }

    /// Declares the method's parameter types in position order.
    ///
    /// Positions without a binding become implicit whole-body parameters;
    /// bindings that did not name a type take the declared one.
    pub fn declare_signature(&mut self, target: &Target, types: Vec<ParamType>) -> DeclResult<()> {
        if !matches!(target, Target::Method(..)) {
            return Err(invalid("Signature", target));
        }
        let method = self.method_record("Signature", target)?;
        for (param, declared) in method.parameters.iter_mut().zip(&types) {
            if !param.explicit_type {
                param.param_type = declared.clone();
            }
        }
        let len = types.len();
        method.signature = types;
        method.backfill(len);
        Ok(())
    }

    /// Binds the method parameter at the target's index.
    pub fn declare_parameter(&mut self, target: &Target, binding: ParamBinding) -> DeclResult<()> {
        let Target::Parameter(_, _, index) = target else {
            return Err(invalid(binding.kind.as_str(), target));
        };
        let index = *index;
        let name = binding.checked_name(target)?;
        let method = self.method_record(binding.kind.as_str(), target)?;

        let declared = method.signature.len().max(index + 1);
        method.backfill(declared);

        let explicit_type = binding.param_type.is_some();
        let param_type = binding
            .param_type
            .clone()
            .or_else(|| method.signature.get(index).cloned())
            .unwrap_or_else(|| binding.default_type());
        method.parameters[index] = MethodParam {
            name,
            param_type,
            kind: binding.kind,
            explicit_type,
        };
        Ok(())
    }

    /// Binds a service property to request data or the request context.
    pub fn declare_property(
        &mut self,
        target: &Target,
        binding: ParamBinding,
        setter: PropertySetter,
    ) -> DeclResult<()> {
        let Target::Property(key, property) = target else {
            return Err(invalid(binding.kind.as_str(), target));
        };
        if property.trim().is_empty() {
            return Err(empty_name("property", target));
        }
        let param_name = binding.checked_name(target)?;
        let param_type = binding
            .param_type
            .clone()
            .unwrap_or_else(|| binding.default_type());
        self.register_service_class(*key).set_property(ServiceProperty {
            name: property.clone(),
            kind: binding.kind,
            param_name,
            param_type,
            setter,
        });
        Ok(())
    }

    pub fn declare_handler(&mut self, target: &Target, invoker: Invoker) -> DeclResult<()> {
        if !matches!(target, Target::Method(..)) {
            return Err(invalid("Handler", target));
        }
        self.method_record("Handler", target)?.invoker = Some(invoker);
        Ok(())
    }

    /// Starts declaring `S`, constructed with `S::default()` per request.
    pub fn service<S: Default + Send + 'static>(&mut self) -> ServiceBuilder<'_, S> {
        let key = ServiceKey::of::<S>();
        let constructor: Constructor = Arc::new(|| Box::new(S::default()) as ServiceInstance);
        self.register_service_class(key).constructor = Some(constructor);
        ServiceBuilder::new(self, key)
    }

    /// Starts declaring `S` without a constructor, for abstract services or
    /// services built by a custom factory.
    pub fn declare<S: Send + 'static>(&mut self) -> ServiceBuilder<'_, S> {
        let key = ServiceKey::of::<S>();
        self.register_service_class(key);
        ServiceBuilder::new(self, key)
    }
}

/// Fluent declarations for service `S`.
pub struct ServiceBuilder<'r, S> {
    registry: &'r mut Registry,
    key: ServiceKey,
    _service: PhantomData<fn() -> S>,
}

impl<'r, S: Send + 'static> ServiceBuilder<'r, S> {
    fn new(registry: &'r mut Registry, key: ServiceKey) -> Self {
        Self {
            registry,
            key,
            _service: PhantomData,
        }
    }

    fn target(&self) -> Target {
        Target::Class(self.key)
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    pub fn path(&mut self, path: &str) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_path(&target, path)?;
        Ok(self)
    }

    pub fn accept(&mut self, media_types: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_accept(&target, media_types)?;
        Ok(self)
    }

    pub fn accept_language(&mut self, languages: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_accept_language(&target, languages)?;
        Ok(self)
    }

    pub fn security(&mut self, roles: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_security(&target, None, roles)?;
        Ok(self)
    }

    pub fn security_scope(&mut self, scope: &str, roles: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_security(&target, Some(scope), roles)?;
        Ok(self)
    }

    /// Any authenticated caller.
    pub fn authenticated(&mut self) -> DeclResult<&mut Self> {
        self.security(&[crate::metadata::WILDCARD_ROLE])
    }

    pub fn pre_processor(&mut self, processor: impl PreProcessor) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry
            .declare_pre_processor(&target, Arc::new(processor))?;
        Ok(self)
    }

    pub fn abstract_service(&mut self) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_abstract(&target)?;
        Ok(self)
    }

    pub fn ignore_next_middlewares(&mut self) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_ignore_next_middlewares(&target)?;
        Ok(self)
    }

    /// Inherits the declarations of `P`, reached inside `S` through `project`.
    ///
    /// The parent may be declared before or after this call. At resolution,
    /// inherited entries fill the names `S` does not declare itself.
    pub fn extends<P: Send + 'static>(&mut self, project: fn(&mut S) -> &mut P) -> DeclResult<&mut Self> {
        let parent = ServiceKey::of::<P>();
        self.registry.inherit(
            self.key,
            parent,
            move |inner: Invoker| -> Invoker {
                Arc::new(move |instance, args| {
                    let parent: &mut (dyn std::any::Any + Send) = project(downcast::<S>(instance)?);
                    inner(parent, args)
                })
            },
            move |inner: PropertySetter| -> PropertySetter {
                Arc::new(move |instance, arg| {
                    let parent: &mut (dyn std::any::Any + Send) = project(downcast::<S>(instance)?);
                    inner(parent, arg)
                })
            },
        )?;
        Ok(self)
    }

    /// Binds the property `name` and how it is assigned.
    pub fn property<F>(&mut self, name: &str, binding: ParamBinding, assign: F) -> DeclResult<&mut Self>
    where
        F: Fn(&mut S, Arg) -> Result<()> + Send + Sync + 'static,
    {
        let target = Target::Property(self.key, name.to_string());
        let setter: PropertySetter =
            Arc::new(move |instance, arg| assign(downcast::<S>(instance)?, arg));
        self.registry.declare_property(&target, binding, setter)?;
        Ok(self)
    }

    pub fn method(&mut self, name: &str) -> MethodBuilder<'_, S> {
        MethodBuilder {
            registry: &mut *self.registry,
            key: self.key,
            name: name.to_string(),
            _service: PhantomData,
        }
    }
}

/// Fluent declarations for one method of service `S`.
pub struct MethodBuilder<'r, S> {
    registry: &'r mut Registry,
    key: ServiceKey,
    name: String,
    _service: PhantomData<fn() -> S>,
}

impl<S: Send + 'static> MethodBuilder<'_, S> {
    fn target(&self) -> Target {
        Target::Method(self.key, self.name.clone())
    }

    pub fn verb(&mut self, verb: Method) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_verb(&target, verb)?;
        Ok(self)
    }

    fn route(&mut self, verb: Method, path: &str) -> DeclResult<&mut Self> {
        self.verb(verb)?;
        self.path(path)
    }

    pub fn get(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::GET, path)
    }

    pub fn post(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::POST, path)
    }

    pub fn put(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::PUT, path)
    }

    pub fn delete(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::DELETE, path)
    }

    pub fn patch(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::PATCH, path)
    }

    pub fn head(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::HEAD, path)
    }

    pub fn options(&mut self, path: &str) -> DeclResult<&mut Self> {
        self.route(Method::OPTIONS, path)
    }

    pub fn path(&mut self, path: &str) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_path(&target, path)?;
        Ok(self)
    }

    pub fn signature(&mut self, types: impl Into<Vec<ParamType>>) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_signature(&target, types.into())?;
        Ok(self)
    }

    pub fn param(&mut self, index: usize, binding: ParamBinding) -> DeclResult<&mut Self> {
        let target = Target::Parameter(self.key, self.name.clone(), index);
        self.registry.declare_parameter(&target, binding)?;
        Ok(self)
    }

    pub fn accept(&mut self, media_types: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_accept(&target, media_types)?;
        Ok(self)
    }

    pub fn accept_language(&mut self, languages: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_accept_language(&target, languages)?;
        Ok(self)
    }

    pub fn security(&mut self, roles: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_security(&target, None, roles)?;
        Ok(self)
    }

    pub fn security_scope(&mut self, scope: &str, roles: &[&str]) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_security(&target, Some(scope), roles)?;
        Ok(self)
    }

    pub fn authenticated(&mut self) -> DeclResult<&mut Self> {
        self.security(&[crate::metadata::WILDCARD_ROLE])
    }

    pub fn pre_processor(&mut self, processor: impl PreProcessor) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry
            .declare_pre_processor(&target, Arc::new(processor))?;
        Ok(self)
    }

    pub fn ignore_next_middlewares(&mut self) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_ignore_next_middlewares(&target)?;
        Ok(self)
    }

    pub fn body_options(&mut self, options: BodyParserOptions) -> DeclResult<&mut Self> {
        let target = self.target();
        self.registry.declare_body_options(&target, options)?;
        Ok(self)
    }

    /// The code run for this endpoint.
    pub fn handler<F, R>(&mut self, handler: F) -> DeclResult<&mut Self>
    where
        F: Fn(&mut S, Args) -> Result<R> + Send + Sync + 'static,
        R: Into<ServiceReturn>,
    {
        let target = self.target();
        let invoker: Invoker = Arc::new(move |instance, args| {
            handler(downcast::<S>(instance)?, args).map(Into::into)
        });
        self.registry.declare_handler(&target, invoker)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[derive(Default)]
    struct People {
        calls: usize,
    }

    fn key() -> ServiceKey {
        ServiceKey::of::<People>()
    }

    #[test]
    fn test_processors_reject_wrong_targets() {
        let mut registry = Registry::new();
        let class = Target::Class(key());
        let property = Target::Property(key(), "ctx".into());

        assert!(matches!(
            registry.declare_verb(&class, Method::GET),
            Err(DeclarationError::InvalidTarget { .. })
        ));
        assert!(matches!(
            registry.declare_abstract(&Target::Method(key(), "list".into())),
            Err(DeclarationError::InvalidTarget { .. })
        ));
        assert!(matches!(
            registry.declare_path(&property, "/x"),
            Err(DeclarationError::InvalidTarget { .. })
        ));
        assert!(matches!(
            registry.declare_parameter(&class, ParamBinding::body()),
            Err(DeclarationError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_verb_rebinding() {
        let mut registry = Registry::new();
        let mut people = registry.service::<People>();
        people.method("list").get("").unwrap().verb(Method::GET).unwrap();

        let err = people.method("list").post("").err().unwrap();
        assert_eq!(
            err.to_string(),
            "method `list` already bound to verb GET, cannot rebind to POST"
        );
    }

    #[test]
    fn test_named_parameters_need_a_name() {
        let mut registry = Registry::new();
        let mut people = registry.service::<People>();
        let err = people
            .method("get")
            .param(0, ParamBinding::query(" "))
            .err()
            .unwrap();
        assert!(matches!(err, DeclarationError::EmptyName { .. }));

        let err = people.method("").get("/x").err().unwrap();
        assert!(matches!(err, DeclarationError::EmptyName { .. }));
    }

    #[test]
    fn test_parameter_backfill() {
        let mut registry = Registry::new();
        registry
            .service::<People>()
            .method("save")
            .signature([ParamType::Json, ParamType::Number, ParamType::String])
            .unwrap()
            .param(1, ParamBinding::query("id"))
            .unwrap();

        let method = registry.class_of::<People>().unwrap().method("save").unwrap();
        assert_eq!(method.parameters.len(), 3);
        assert_eq!(method.parameters[0].kind, ParamKind::Body);
        assert_eq!(method.parameters[1].kind, ParamKind::Query);
        assert_eq!(method.parameters[1].param_type, ParamType::Number);
        assert_eq!(method.parameters[2].kind, ParamKind::Body);
        assert_eq!(method.parameters[2].param_type, ParamType::String);
    }

    #[test]
    fn test_signature_after_binding_retypes_untyped_params() {
        let mut registry = Registry::new();
        registry
            .service::<People>()
            .method("page")
            .param(0, ParamBinding::query("start"))
            .unwrap()
            .param(1, ParamBinding::query("flag").typed(ParamType::String))
            .unwrap()
            .signature([ParamType::Number, ParamType::Boolean])
            .unwrap();

        let method = registry.class_of::<People>().unwrap().method("page").unwrap();
        assert_eq!(method.parameters[0].param_type, ParamType::Number);
        assert_eq!(method.parameters[1].param_type, ParamType::String);
    }

    #[test]
    fn test_accept_union_and_empty_values() {
        let mut registry = Registry::new();
        let mut people = registry.service::<People>();
        people.accept(&["application/json", ""]).unwrap();
        people.accept(&["application/json", "text/html"]).unwrap();
        assert!(matches!(
            people.accept_language(&["", "  "]),
            Err(DeclarationError::EmptyValues { .. })
        ));

        let class = registry.class_of::<People>().unwrap();
        assert_eq!(class.accepts, vec!["application/json", "text/html"]);
        assert!(class.languages.is_empty());
    }

    #[test]
    fn test_security_scopes() {
        let mut registry = Registry::new();
        let mut people = registry.service::<People>();
        people.security(&["admin"]).unwrap();
        people.method("list").security_scope("api", &["reader"]).unwrap();
        assert!(matches!(
            people.method("list").security(&[]),
            Err(DeclarationError::EmptyValues { .. })
        ));

        let class = registry.class_of::<People>().unwrap();
        assert_eq!(class.roles[DEFAULT_SCOPE], vec!["admin"]);
        assert_eq!(class.method("list").unwrap().roles["api"], vec!["reader"]);
    }

    #[test]
    fn test_handler_invokes_on_instance() {
        let mut registry = Registry::new();
        registry
            .service::<People>()
            .method("count")
            .get("/count")
            .unwrap()
            .handler(|svc: &mut People, _args| {
                svc.calls += 1;
                Ok(json!(svc.calls))
            })
            .unwrap();

        let class = registry.class_of::<People>().unwrap();
        let constructor = class.constructor.clone().unwrap();
        let invoker = class.method("count").unwrap().invoker.clone().unwrap();
        let mut instance = constructor();
        invoker(instance.as_mut(), Args::default()).unwrap();
        let ret = invoker(instance.as_mut(), Args::default()).unwrap();
        assert!(matches!(ret, ServiceReturn::Immediate(v) if v == json!(2)));
    }

    #[test]
    fn test_handler_rejects_foreign_instance() {
        let mut registry = Registry::new();
        registry
            .service::<People>()
            .method("count")
            .handler(|_: &mut People, _| Ok(()))
            .unwrap();
        let invoker = registry
            .class_of::<People>()
            .unwrap()
            .method("count")
            .unwrap()
            .invoker
            .clone()
            .unwrap();

        let mut foreign: ServiceInstance = Box::new(5u8);
        let err: Error = invoker(foreign.as_mut(), Args::default()).unwrap_err();
        assert_eq!(err.status, 500);
    }

    #[test]
    fn test_property_binding() {
        let mut registry = Registry::new();
        registry
            .service::<People>()
            .property("tenant", ParamBinding::header(""), |_, _| Ok(()))
            .err()
            .unwrap();

        registry
            .service::<People>()
            .property("tenant", ParamBinding::header("x-tenant"), |_, _| Ok(()))
            .unwrap();
        let class = registry.class_of::<People>().unwrap();
        let property = class.property("tenant").unwrap();
        assert_eq!(property.param_name.as_deref(), Some("x-tenant"));
        assert_eq!(property.param_type, ParamType::String);
    }
}
