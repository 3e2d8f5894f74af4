//! The host HTTP layer: request and response handles, the middleware chain,
//! the route table and the request parsers.

mod middleware;
pub mod parsers;
mod request;
mod response;
mod router;

pub use middleware::{BoxFuture, Exchange, Inspect, Middleware, Next};
pub use parsers::{
    BodyParserOptions, BodyType, CookieParserOptions, FormParserOptions, UploadOptions,
};
pub use request::{HttpRequest, PathParams, UploadedFile};
pub use response::{BoxBody, HttpResponse, attachment};
pub use router::{PathPattern, Router};
