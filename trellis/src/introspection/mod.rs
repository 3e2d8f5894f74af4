//! Route metadata for tooling and documentation.

mod endpoint;
mod route_info;

pub use endpoint::{ROUTES_PATH, RoutesEndpoint};
pub use route_info::RouteInfo;
