//! Route metadata for introspection.

use serde::Serialize;

/// One registered endpoint, as reported by the routes endpoint.
///
/// ```
/// use trellis::introspection::RouteInfo;
///
/// let info = RouteInfo::new("GET", "/people/:id", "get", "PeopleService");
/// assert_eq!(info.path, "/people/:id");
/// assert_eq!(info.service, "PeopleService");
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: String,
    /// Path pattern with `:name` segments.
    pub path: String,
    /// Name of the service method.
    pub handler_name: String,
    /// Short type name of the owning service.
    pub service: String,
}

impl RouteInfo {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        handler_name: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            handler_name: handler_name.into(),
            service: short_name(&service.into()),
        }
    }
}

/// Strips the module path from a type name.
fn short_name(name: &str) -> String {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_is_shortened() {
        let info = RouteInfo::new("GET", "/people", "list", "app::services::PeopleService");
        assert_eq!(info.service, "PeopleService");
    }

    #[test]
    fn test_route_info_serialize() {
        let info = RouteInfo::new("POST", "/people", "create", "PeopleService");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["method"], "POST");
        assert_eq!(json["handler_name"], "create");
        assert_eq!(json["service"], "PeopleService");
    }
}
