//! The metadata registry.
//!
//! Declarations are collected into a mutable [`Registry`]. Any mutation marks
//! the resolved route table stale; the next catalog query rebuilds it. Once
//! every service is declared, [`Registry::seal`] resolves everything one last
//! time and freezes the records into a [`SealedRegistry`] that request
//! handling shares through an `Arc`.
//!
//! Inheritance is recorded, not applied, when declared. Each resolution
//! composes fresh copies of the classes from their parents, so declarations
//! may run in any order.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DeclarationError, Error, Result};
use crate::introspection::RouteInfo;
use crate::metadata::{
    Invoker, PropertySetter, Rebind, ServiceClass, ServiceKey, ServiceMethod,
};
use crate::params::ConverterRegistry;
use crate::resolve::{self, RouteTable};

/// Mutable store of service declarations.
#[derive(Debug, Default)]
pub struct Registry {
    classes: Vec<ServiceClass>,
    index: HashMap<TypeId, usize>,
    /// Classes with their parents composed in, parallel to `classes`.
    composed: Vec<ServiceClass>,
    routes: RouteTable,
    paths_resolved: bool,
    converters: Arc<ConverterRegistry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`, creating it on first reference.
    pub fn register_service_class(&mut self, key: ServiceKey) -> &mut ServiceClass {
        self.paths_resolved = false;
        let position = match self.index.get(&key.type_id) {
            Some(&position) => position,
            None => {
                debug!(service = key.name, "registering service");
                self.classes.push(ServiceClass::new(key));
                let position = self.classes.len() - 1;
                self.index.insert(key.type_id, position);
                position
            }
        };
        let class = &mut self.classes[position];
        class.invalidate();
        class
    }

    /// Returns the named method record of `key`, creating both on first
    /// reference. An empty name registers nothing.
    pub fn register_service_method(
        &mut self,
        key: ServiceKey,
        name: &str,
    ) -> Option<&mut ServiceMethod> {
        if name.trim().is_empty() {
            return None;
        }
        Some(self.register_service_class(key).method_entry(name))
    }

    pub fn class(&self, type_id: TypeId) -> Option<&ServiceClass> {
        self.index.get(&type_id).map(|&i| &self.classes[i])
    }

    pub fn class_of<S: 'static>(&self) -> Option<&ServiceClass> {
        self.class(TypeId::of::<S>())
    }

    pub fn classes(&self) -> &[ServiceClass] {
        &self.classes
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    /// Registers a converter for parameters declared with type `type_name`.
    pub fn converter<F>(&mut self, type_name: impl Into<String>, converter: F) -> &mut Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.converters.register(type_name, converter);
        self
    }

    /// Records `parent` as the parent of `child`.
    ///
    /// Nothing is copied here. Resolution fills in the parent's methods,
    /// properties, languages and media types the child does not declare
    /// itself, re-bound to the child type through the given wrappers.
    pub(crate) fn inherit<I, P>(
        &mut self,
        child: ServiceKey,
        parent: ServiceKey,
        rebind_invoker: I,
        rebind_setter: P,
    ) -> std::result::Result<(), DeclarationError>
    where
        I: Fn(Invoker) -> Invoker + Send + Sync + 'static,
        P: Fn(PropertySetter) -> PropertySetter + Send + Sync + 'static,
    {
        if child.type_id == parent.type_id {
            return Err(DeclarationError::SelfInheritance {
                service: child.name.to_string(),
            });
        }

        self.register_service_class(parent);
        let class = self.register_service_class(child);
        class.parent = Some(parent);
        class.rebind = Some(Rebind {
            invoker: Arc::new(rebind_invoker),
            setter: Arc::new(rebind_setter),
        });
        debug!(service = child.name, parent = parent.name, "recorded service parent");
        Ok(())
    }

    /// Copies of every class with inherited entries filled in, parents
    /// composed before their children.
    fn compose(&self) -> std::result::Result<Vec<ServiceClass>, DeclarationError> {
        let mut composed = vec![None; self.classes.len()];
        let mut visiting = Vec::new();
        for position in 0..self.classes.len() {
            self.compose_class(position, &mut composed, &mut visiting)?;
        }
        Ok(composed.into_iter().flatten().collect())
    }

    fn compose_class(
        &self,
        position: usize,
        composed: &mut [Option<ServiceClass>],
        visiting: &mut Vec<usize>,
    ) -> std::result::Result<(), DeclarationError> {
        if composed[position].is_some() {
            return Ok(());
        }
        let declared = &self.classes[position];
        if visiting.contains(&position) {
            return Err(DeclarationError::InheritanceCycle {
                service: declared.name().to_string(),
            });
        }

        let mut class = declared.clone();
        let parent = declared
            .parent
            .and_then(|parent| self.index.get(&parent.type_id).copied());
        if let (Some(parent), Some(rebind)) = (parent, &declared.rebind) {
            visiting.push(position);
            self.compose_class(parent, composed, visiting)?;
            visiting.pop();
            if let Some(template) = &composed[parent] {
                fill_from_parent(&mut class, template, rebind);
            }
        }
        composed[position] = Some(class);
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.paths_resolved
    }

    /// Rebuilds the route table if any declaration changed since the last
    /// resolution.
    pub fn resolve_paths(&mut self) -> std::result::Result<(), DeclarationError> {
        if self.paths_resolved {
            return Ok(());
        }
        self.routes.clear();

        let mut composed = self.compose()?;
        let mut table = RouteTable::new();
        for class in &mut composed {
            if class.is_abstract {
                continue;
            }
            resolve_class(class, &mut table)?;
        }

        self.composed = composed;
        self.routes = table;
        self.paths_resolved = true;
        Ok(())
    }

    /// Every resolved route path.
    pub fn paths(&mut self) -> std::result::Result<Vec<String>, DeclarationError> {
        self.resolve_paths()?;
        Ok(self.routes.paths())
    }

    /// Verbs registered for `path`, in registration order.
    pub fn path_methods(&mut self, path: &str) -> std::result::Result<Vec<Method>, DeclarationError> {
        self.resolve_paths()?;
        Ok(self.routes.methods(path))
    }

    /// Resolves every declaration and freezes the registry.
    pub fn seal(mut self) -> std::result::Result<SealedRegistry, DeclarationError> {
        self.resolve_paths()?;
        Ok(SealedRegistry {
            classes: self.composed.into_iter().map(Arc::new).collect(),
            index: self.index,
            routes: self.routes,
            converters: self.converters,
        })
    }
}

fn fill_from_parent(class: &mut ServiceClass, template: &ServiceClass, rebind: &Rebind) {
    for method in &template.methods {
        if class.method(&method.name).is_some() {
            continue;
        }
        let mut inherited = method.clone();
        inherited.invalidate();
        inherited.invoker = inherited.invoker.take().map(|invoker| (rebind.invoker)(invoker));
        class.methods.push(inherited);
    }

    for property in &template.properties {
        if class.property(&property.name).is_some() {
            continue;
        }
        let mut inherited = property.clone();
        inherited.setter = (rebind.setter)(inherited.setter);
        class.properties.push(inherited);
    }

    for language in &template.languages {
        if !class.languages.contains(language) {
            class.languages.push(language.clone());
        }
    }
    for accept in &template.accepts {
        if !class.accepts.contains(accept) {
            class.accepts.push(accept.clone());
        }
    }
}

fn resolve_class(
    class: &mut ServiceClass,
    table: &mut RouteTable,
) -> std::result::Result<(), DeclarationError> {
    let mut methods = std::mem::take(&mut class.methods);
    let owner: &ServiceClass = class;
    let outcome = methods.iter_mut().try_for_each(|method| {
        let Some(verb) = method.verb.clone() else {
            warn!(
                service = owner.name(),
                method = %method.name,
                "method has no HTTP verb, skipping"
            );
            return Ok(());
        };
        resolve::resolve_method(owner, method)?;
        let path = method.resolved_path.as_deref().unwrap_or("/");
        table.register(path, verb)
    });
    class.methods = methods;
    outcome
}

/// One routable method of a sealed service.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint<'a> {
    pub class: &'a Arc<ServiceClass>,
    pub index: usize,
}

impl<'a> Endpoint<'a> {
    pub fn method(&self) -> &'a ServiceMethod {
        &self.class.methods[self.index]
    }

    pub fn verb(&self) -> Method {
        self.method().verb.clone().unwrap_or(Method::GET)
    }

    pub fn path(&self) -> &'a str {
        self.method().resolved_path.as_deref().unwrap_or("/")
    }
}

/// Frozen, fully resolved declarations.
#[derive(Debug)]
pub struct SealedRegistry {
    classes: Vec<Arc<ServiceClass>>,
    index: HashMap<TypeId, usize>,
    routes: RouteTable,
    converters: Arc<ConverterRegistry>,
}

impl SealedRegistry {
    pub fn classes(&self) -> &[Arc<ServiceClass>] {
        &self.classes
    }

    pub fn class(&self, type_id: TypeId) -> Option<&Arc<ServiceClass>> {
        self.index.get(&type_id).map(|&i| &self.classes[i])
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    pub fn paths(&self) -> Vec<String> {
        self.routes.paths()
    }

    pub fn path_methods(&self, path: &str) -> Vec<Method> {
        self.routes.methods(path)
    }

    /// Routable methods in declaration order.
    pub fn endpoints(&self) -> impl Iterator<Item = Endpoint<'_>> {
        self.classes
            .iter()
            .filter(|class| !class.is_abstract)
            .flat_map(|class| {
                class
                    .methods
                    .iter()
                    .enumerate()
                    .filter(|(_, method)| method.verb.is_some())
                    .map(move |(index, _)| Endpoint { class, index })
            })
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.endpoints()
            .map(|endpoint| {
                RouteInfo::new(
                    endpoint.verb().as_str(),
                    endpoint.path(),
                    &endpoint.method().name,
                    endpoint.class.name(),
                )
            })
            .collect()
    }
}

/// Downcasts a type-erased service instance.
pub(crate) fn downcast<S: 'static>(instance: &mut (dyn Any + Send)) -> Result<&mut S> {
    instance.downcast_mut::<S>().ok_or_else(|| {
        Error::internal(format!(
            "service instance is not a {}",
            std::any::type_name::<S>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MethodParam, ParamKind, ParamType};

    struct People;
    struct Base;

    fn routed(registry: &mut Registry, key: ServiceKey, name: &str, path: &str, verb: Method) {
        let method = registry.register_service_method(key, name).unwrap();
        method.path = Some(path.to_string());
        method.verb = Some(verb);
    }

    #[test]
    fn test_register_class_is_idempotent() {
        let mut registry = Registry::new();
        registry.register_service_class(ServiceKey::of::<People>()).path = Some("/people".into());
        registry.register_service_class(ServiceKey::of::<People>());

        assert_eq!(registry.classes().len(), 1);
        assert_eq!(
            registry.class_of::<People>().unwrap().path.as_deref(),
            Some("/people")
        );
    }

    #[test]
    fn test_empty_method_name_registers_nothing() {
        let mut registry = Registry::new();
        assert!(registry
            .register_service_method(ServiceKey::of::<People>(), "  ")
            .is_none());
        assert!(registry.classes().is_empty());
    }

    #[test]
    fn test_mutation_marks_table_stale() {
        let mut registry = Registry::new();
        let key = ServiceKey::of::<People>();
        registry.register_service_class(key).path = Some("/people".into());
        routed(&mut registry, key, "list", "", Method::GET);

        assert_eq!(registry.paths().unwrap(), vec!["/people".to_string()]);
        assert!(registry.is_resolved());

        routed(&mut registry, key, "get", ":id", Method::GET);
        assert!(!registry.is_resolved());
        assert_eq!(
            registry.paths().unwrap(),
            vec!["/people".to_string(), "/people/:id".to_string()]
        );
    }

    #[test]
    fn test_class_path_change_reaches_memoised_methods() {
        let mut registry = Registry::new();
        let key = ServiceKey::of::<People>();
        registry.register_service_class(key).path = Some("/people".into());
        routed(&mut registry, key, "list", "", Method::GET);
        registry.paths().unwrap();

        registry.register_service_class(key).path = Some("/persons".into());
        assert_eq!(registry.paths().unwrap(), vec!["/persons".to_string()]);
    }

    #[test]
    fn test_duplicate_route_fails_resolution() {
        struct Other;
        let mut registry = Registry::new();
        routed(&mut registry, ServiceKey::of::<People>(), "a", "/shared", Method::GET);
        routed(&mut registry, ServiceKey::of::<Other>(), "b", "/shared", Method::GET);

        let err = registry.seal().unwrap_err();
        assert!(matches!(err, DeclarationError::DuplicatePath { .. }));
    }

    #[test]
    fn test_abstract_classes_are_not_routed() {
        let mut registry = Registry::new();
        let key = ServiceKey::of::<Base>();
        registry.register_service_class(key).is_abstract = true;
        routed(&mut registry, key, "list", "/base", Method::GET);

        let sealed = registry.seal().unwrap();
        assert!(sealed.paths().is_empty());
        assert_eq!(sealed.endpoints().count(), 0);
    }

    #[test]
    fn test_verbless_methods_are_skipped() {
        let mut registry = Registry::new();
        let key = ServiceKey::of::<People>();
        registry.register_service_method(key, "helper").unwrap();
        routed(&mut registry, key, "list", "/people", Method::GET);

        let sealed = registry.seal().unwrap();
        let routes = sealed.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].handler_name, "list");
    }

    #[test]
    fn test_inheritance_composes_at_resolution() {
        let mut registry = Registry::new();
        let base = ServiceKey::of::<Base>();
        let child = ServiceKey::of::<People>();
        registry.inherit(child, base, |i| i, |s| s).unwrap();
        registry.register_service_class(child).path = Some("/people".into());
        routed(&mut registry, child, "get", ":id", Method::GET);

        let class = registry.register_service_class(base);
        class.is_abstract = true;
        class.languages = vec!["en".into()];
        routed(&mut registry, base, "list", "", Method::GET);
        routed(&mut registry, base, "count", "/count", Method::GET);
        routed(&mut registry, child, "count", "/total", Method::GET);
        registry
            .register_service_method(child, "count")
            .unwrap()
            .parameters
            .push(MethodParam::new(Some("q".into()), ParamType::String, ParamKind::Query));

        assert_eq!(
            registry.paths().unwrap(),
            vec![
                "/people".to_string(),
                "/people/:id".to_string(),
                "/people/total".to_string(),
            ]
        );
        assert!(registry.class_of::<People>().unwrap().method("list").is_none());

        let sealed = registry.seal().unwrap();
        let child_class = sealed.class(TypeId::of::<People>()).unwrap();
        assert_eq!(child_class.methods.len(), 3);
        assert_eq!(child_class.languages, vec!["en".to_string()]);
        assert_eq!(child_class.parent, Some(base));
        assert_eq!(child_class.method("count").unwrap().parameters.len(), 1);
        let parent = sealed.class(TypeId::of::<Base>()).unwrap();
        assert!(parent.method("count").unwrap().parameters.is_empty());
    }

    #[test]
    fn test_repeated_resolution_inherits_once() {
        let mut registry = Registry::new();
        let base = ServiceKey::of::<Base>();
        let child = ServiceKey::of::<People>();
        registry.register_service_class(base).is_abstract = true;
        routed(&mut registry, base, "list", "/people", Method::GET);
        registry.inherit(child, base, |i| i, |s| s).unwrap();

        registry.paths().unwrap();
        registry.register_service_class(base).languages = vec!["en".into()];
        registry.paths().unwrap();

        let sealed = registry.seal().unwrap();
        let child_class = sealed.class(TypeId::of::<People>()).unwrap();
        assert_eq!(child_class.methods.len(), 1);
        assert_eq!(child_class.languages, vec!["en".to_string()]);
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let mut registry = Registry::new();
        let base = ServiceKey::of::<Base>();
        let child = ServiceKey::of::<People>();
        registry.inherit(child, base, |i| i, |s| s).unwrap();
        registry.inherit(base, child, |i| i, |s| s).unwrap();

        assert!(matches!(
            registry.seal(),
            Err(DeclarationError::InheritanceCycle { .. })
        ));
    }

    #[test]
    fn test_self_inheritance_rejected() {
        let mut registry = Registry::new();
        let key = ServiceKey::of::<People>();
        assert!(matches!(
            registry.inherit(key, key, |i| i, |s| s),
            Err(DeclarationError::SelfInheritance { .. })
        ));
    }
}
