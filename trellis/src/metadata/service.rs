use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{
    Constructor, ParamKind, ParamType, PreProcessor, PropertySetter, Rebind, ServiceKey,
    ServiceMethod,
};

/// A service property bound to request data or the request context.
#[derive(Clone)]
pub struct ServiceProperty {
    pub name: String,
    pub kind: ParamKind,
    /// Request facet name for the named kinds.
    pub param_name: Option<String>,
    pub param_type: ParamType,
    pub setter: PropertySetter,
}

impl fmt::Debug for ServiceProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProperty")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("param_name", &self.param_name)
            .field("param_type", &self.param_type)
            .finish()
    }
}

/// Everything known about one service type.
#[derive(Clone)]
pub struct ServiceClass {
    pub key: ServiceKey,
    pub path: Option<String>,
    pub languages: Vec<String>,
    pub accepts: Vec<String>,
    pub methods: Vec<ServiceMethod>,
    pub properties: Vec<ServiceProperty>,
    pub pre_processors: Vec<Arc<dyn PreProcessor>>,
    /// Excluded from route registration; still inheritable.
    pub is_abstract: bool,
    pub roles: BTreeMap<String, Vec<String>>,
    pub ignore_next_middlewares: bool,
    pub parent: Option<ServiceKey>,
    pub(crate) rebind: Option<Rebind>,
    pub(crate) constructor: Option<Constructor>,
}

impl ServiceClass {
    pub fn new(key: ServiceKey) -> Self {
        Self {
            key,
            path: None,
            languages: Vec::new(),
            accepts: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            pre_processors: Vec::new(),
            is_abstract: false,
            roles: BTreeMap::new(),
            ignore_next_middlewares: false,
            parent: None,
            rebind: None,
            constructor: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.key.type_id
    }

    pub fn name(&self) -> &'static str {
        self.key.name
    }

    pub fn method(&self, name: &str) -> Option<&ServiceMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Returns the named method record, creating it on first reference.
    pub fn method_entry(&mut self, name: &str) -> &mut ServiceMethod {
        let position = match self.methods.iter().position(|m| m.name == name) {
            Some(position) => position,
            None => {
                self.methods.push(ServiceMethod::new(name));
                self.methods.len() - 1
            }
        };
        &mut self.methods[position]
    }

    pub fn property(&self, name: &str) -> Option<&ServiceProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Inserts or replaces the named property binding.
    pub fn set_property(&mut self, property: ServiceProperty) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn has_property_kind(&self, kind: ParamKind) -> bool {
        self.properties.iter().any(|p| p.kind == kind)
    }

    /// Invalidates every method's derived state.
    pub fn invalidate(&mut self) {
        for method in &mut self.methods {
            method.invalidate();
        }
    }
}

impl fmt::Debug for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClass")
            .field("name", &self.key.name)
            .field("path", &self.path)
            .field("languages", &self.languages)
            .field("accepts", &self.accepts)
            .field("methods", &self.methods)
            .field("properties", &self.properties)
            .field("is_abstract", &self.is_abstract)
            .field("roles", &self.roles)
            .field("parent", &self.parent.map(|p| p.name))
            .finish()
    }
}
