use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use http::Method;

use super::{FileParam, Invoker, MethodParam, ParamType, PreProcessor};
use crate::http::BodyParserOptions;

/// One endpoint of a service.
#[derive(Clone, Default)]
pub struct ServiceMethod {
    pub name: String,
    /// Path fragment relative to the service path.
    pub path: Option<String>,
    /// Fully composed path, memoised by the resolver.
    pub resolved_path: Option<String>,
    pub verb: Option<Method>,
    pub parameters: Vec<MethodParam>,
    /// Declared parameter types, in position order.
    pub signature: Vec<ParamType>,
    pub must_parse_cookies: bool,
    pub must_parse_body: bool,
    pub must_parse_forms: bool,
    pub accept_multi_typed_param: bool,
    pub files: Vec<FileParam>,
    pub languages: Vec<String>,
    pub accepts: Vec<String>,
    /// Union of service and method languages; `None` when unrestricted.
    pub resolved_languages: Option<Vec<String>>,
    /// Union of service and method media types; `None` when unrestricted.
    pub resolved_accepts: Option<Vec<String>>,
    pub pre_processors: Vec<Arc<dyn PreProcessor>>,
    /// Roles per authenticator scope.
    pub roles: BTreeMap<String, Vec<String>>,
    pub resolved_roles: BTreeMap<String, Vec<String>>,
    pub ignore_next_middlewares: bool,
    pub body_options: Option<BodyParserOptions>,
    pub invoker: Option<Invoker>,
    pub(crate) classified: bool,
}

impl ServiceMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Drops everything the resolver derived so the next resolution recomputes it.
    pub fn invalidate(&mut self) {
        self.resolved_path = None;
        self.resolved_languages = None;
        self.resolved_accepts = None;
        self.resolved_roles.clear();
        self.classified = false;
    }

    /// Extends the parameter list with implicit body parameters up to `len`.
    pub fn backfill(&mut self, len: usize) {
        while self.parameters.len() < len {
            let position = self.parameters.len();
            let param_type = self
                .signature
                .get(position)
                .cloned()
                .unwrap_or(ParamType::Json);
            self.parameters.push(MethodParam::implicit_body(param_type));
        }
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

impl fmt::Debug for ServiceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMethod")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("resolved_path", &self.resolved_path)
            .field("verb", &self.verb)
            .field("parameters", &self.parameters)
            .field("languages", &self.languages)
            .field("accepts", &self.accepts)
            .field("roles", &self.roles)
            .field("pre_processors", &self.pre_processors.len())
            .field("has_invoker", &self.invoker.is_some())
            .finish()
    }
}
