//! Plain records describing declared services.
//!
//! A [`ServiceClass`] holds everything known about one service type, a
//! [`ServiceMethod`] everything about one endpoint, and [`MethodParam`] /
//! [`ServiceProperty`] describe how request data is bound to arguments and
//! instance fields. The records are populated by the annotation processors
//! in [`crate::annotations`] and read by the resolver, the route builder and
//! the dispatcher.

mod method;
mod service;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

pub use method::ServiceMethod;
pub use service::{ServiceClass, ServiceProperty};

use crate::error::Result;
use crate::http::{BoxFuture, HttpRequest};
use crate::params::{Arg, Args};
use crate::returns::ServiceReturn;

/// Authenticator scope used when a security declaration names none.
pub const DEFAULT_SCOPE: &str = "default";

/// Role meaning "authenticated, any role".
pub const WILDCARD_ROLE: &str = "*";

/// A request-scoped service object.
pub type ServiceInstance = Box<dyn Any + Send>;

/// Type-erased call of one endpoint method on a service instance.
pub type Invoker = Arc<dyn Fn(&mut (dyn Any + Send), Args) -> Result<ServiceReturn> + Send + Sync>;

/// Type-erased assignment of a bound value to a service property.
pub type PropertySetter = Arc<dyn Fn(&mut (dyn Any + Send), Arg) -> Result<()> + Send + Sync>;

/// Re-targets inherited invokers and setters from a parent type to the
/// child that embeds it.
#[derive(Clone)]
pub(crate) struct Rebind {
    pub invoker: Arc<dyn Fn(Invoker) -> Invoker + Send + Sync>,
    pub setter: Arc<dyn Fn(PropertySetter) -> PropertySetter + Send + Sync>,
}

/// Builds a fresh service instance for the default factory.
pub type Constructor = Arc<dyn Fn() -> ServiceInstance + Send + Sync>;

/// Identity of a service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub type_id: TypeId,
    pub name: &'static str,
}

impl ServiceKey {
    pub fn of<S: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Where a bound value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Path,
    Query,
    Header,
    Cookie,
    Form,
    /// First non-empty value of the form/body field or the query string.
    Param,
    Body,
    File,
    Files,
    Context,
    ContextRequest,
    ContextResponse,
    ContextNext,
    ContextLanguage,
    ContextAccept,
}

impl ParamKind {
    /// Kinds that read a named request facet and therefore need a name.
    pub fn is_named(self) -> bool {
        matches!(
            self,
            ParamKind::Path
                | ParamKind::Query
                | ParamKind::Header
                | ParamKind::Cookie
                | ParamKind::Form
                | ParamKind::Param
                | ParamKind::File
                | ParamKind::Files
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Path => "PathParam",
            ParamKind::Query => "QueryParam",
            ParamKind::Header => "HeaderParam",
            ParamKind::Cookie => "CookieParam",
            ParamKind::Form => "FormParam",
            ParamKind::Param => "Param",
            ParamKind::Body => "Body",
            ParamKind::File => "FileParam",
            ParamKind::Files => "FilesParam",
            ParamKind::Context => "Context",
            ParamKind::ContextRequest => "ContextRequest",
            ParamKind::ContextResponse => "ContextResponse",
            ParamKind::ContextNext => "ContextNext",
            ParamKind::ContextLanguage => "ContextLanguage",
            ParamKind::ContextAccept => "ContextAccept",
        }
    }
}

/// Declared type of a bound value.
///
/// Only `Number` and `Boolean` coerce. Every other type is handed to the
/// converter registered under [`ParamType::name`], or passed through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Json,
    Custom(String),
}

impl ParamType {
    pub fn custom(tag: impl Into<String>) -> Self {
        ParamType::Custom(tag.into())
    }

    pub fn name(&self) -> &str {
        match self {
            ParamType::String => "String",
            ParamType::Number => "Number",
            ParamType::Boolean => "Boolean",
            ParamType::Json => "Object",
            ParamType::Custom(tag) => tag,
        }
    }
}

/// One bound parameter of an endpoint method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodParam {
    /// `None` for the whole request body and the context kinds.
    pub name: Option<String>,
    pub param_type: ParamType,
    pub kind: ParamKind,
    /// Set when the binding named its type; otherwise the declared
    /// signature may still retype it.
    pub explicit_type: bool,
}

impl MethodParam {
    pub fn new(name: Option<String>, param_type: ParamType, kind: ParamKind) -> Self {
        Self {
            name,
            param_type,
            kind,
            explicit_type: false,
        }
    }

    /// Parameter with no declaration of its own: the whole request body.
    pub fn implicit_body(param_type: ParamType) -> Self {
        Self::new(None, param_type, ParamKind::Body)
    }
}

/// An upload field expected by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParam {
    pub name: String,
    pub single_file: bool,
}

/// Runs before the target method; may inspect or mutate the request, or
/// abort it with an error.
pub trait PreProcessor: Send + Sync + 'static {
    fn process<'a>(&'a self, request: &'a mut HttpRequest) -> BoxFuture<'a, Result<()>>;
}

impl<F> PreProcessor for F
where
    F: Fn(&mut HttpRequest) -> Result<()> + Send + Sync + 'static,
{
    fn process<'a>(&'a self, request: &'a mut HttpRequest) -> BoxFuture<'a, Result<()>> {
        let outcome = self(request);
        Box::pin(std::future::ready(outcome))
    }
}
