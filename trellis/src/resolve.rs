//! Path composition, policy merging and the resolved route table.

use std::collections::BTreeMap;

use http::Method;

use crate::error::DeclarationError;
use crate::metadata::{FileParam, ParamKind, ServiceClass, ServiceMethod};

/// Normalises a path fragment: trimmed, rooted, one trailing slash removed.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Joins a service path and a method path.
///
/// A missing or empty service path is the root `/`. The method fragment has
/// its trailing slashes removed; under the root service path it stands alone.
pub fn compose_path(class_path: Option<&str>, method_path: Option<&str>) -> String {
    let base = match class_path.map(str::trim) {
        Some(path) if !path.is_empty() => normalize_path(path),
        _ => "/".to_string(),
    };

    let fragment = method_path
        .map(|p| p.trim().trim_end_matches('/'))
        .filter(|p| !p.is_empty());
    let Some(fragment) = fragment else {
        return base;
    };

    let fragment = if fragment.starts_with('/') {
        fragment.to_string()
    } else {
        format!("/{}", fragment)
    };
    if base == "/" {
        fragment
    } else {
        format!("{}{}", base, fragment)
    }
}

/// Union of service-level and method-level values, service first.
///
/// `None` when neither level declares anything.
pub fn merge_values(class: &[String], method: &[String]) -> Option<Vec<String>> {
    if class.is_empty() && method.is_empty() {
        return None;
    }
    let mut merged = class.to_vec();
    for value in method {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    Some(merged)
}

/// Per-scope union of service and method roles.
pub fn merge_roles(
    class: &BTreeMap<String, Vec<String>>,
    method: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, Vec<String>> {
    let mut merged = class.clone();
    for (scope, roles) in method {
        let entry = merged.entry(scope.clone()).or_default();
        for role in roles {
            if !entry.contains(role) {
                entry.push(role.clone());
            }
        }
    }
    merged
}

/// Derives the parsing flags and file fields from the parameter list.
///
/// Recomputed from scratch on every call.
pub fn classify(method: &mut ServiceMethod) -> Result<(), DeclarationError> {
    method.must_parse_cookies = false;
    method.must_parse_body = false;
    method.must_parse_forms = false;
    method.accept_multi_typed_param = false;
    method.files.clear();

    for param in &method.parameters {
        match param.kind {
            ParamKind::Cookie => method.must_parse_cookies = true,
            ParamKind::File | ParamKind::Files => {
                let name = param.name.clone().unwrap_or_default();
                let single_file = param.kind == ParamKind::File;
                match method.files.iter_mut().find(|f| f.name == name) {
                    // The same field bound twice accepts many files if either binding does.
                    Some(existing) => existing.single_file &= single_file,
                    None => method.files.push(FileParam { name, single_file }),
                }
            }
            ParamKind::Param => method.accept_multi_typed_param = true,
            ParamKind::Form => {
                if method.must_parse_body {
                    return Err(DeclarationError::FormWithBody {
                        method: method.name.clone(),
                    });
                }
                method.must_parse_forms = true;
            }
            ParamKind::Body => {
                if method.must_parse_forms {
                    return Err(DeclarationError::FormWithBody {
                        method: method.name.clone(),
                    });
                }
                if method.must_parse_body {
                    return Err(DeclarationError::MultipleBodies {
                        method: method.name.clone(),
                    });
                }
                method.must_parse_body = true;
            }
            _ => {}
        }
    }
    method.classified = true;
    Ok(())
}

/// Fills the memoised fields of `method` from its service.
pub fn resolve_method(
    class: &ServiceClass,
    method: &mut ServiceMethod,
) -> Result<(), DeclarationError> {
    if !method.classified {
        classify(method)?;
    }
    if method.resolved_path.is_none() {
        method.resolved_path = Some(compose_path(class.path.as_deref(), method.path.as_deref()));
        method.resolved_languages = merge_values(&class.languages, &method.languages);
        method.resolved_accepts = merge_values(&class.accepts, &method.accepts);
        method.resolved_roles = merge_roles(&class.roles, &method.roles);
    }
    Ok(())
}

/// Resolved path to verbs, verbs in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    paths: BTreeMap<String, Vec<Method>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `(path, verb)`, rejecting a pair that is already present.
    pub fn register(&mut self, path: &str, verb: Method) -> Result<(), DeclarationError> {
        let verbs = self.paths.entry(path.to_string()).or_default();
        if verbs.contains(&verb) {
            return Err(DeclarationError::DuplicatePath {
                path: path.to_string(),
                verb,
            });
        }
        verbs.push(verb);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    pub fn methods(&self, path: &str) -> Vec<Method> {
        self.paths.get(path).cloned().unwrap_or_default()
    }
}
