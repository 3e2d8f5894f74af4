//! Declarative service metadata and route dispatch.
//!
//! Services are plain Rust types. Their routes, parameter bindings, content
//! negotiation and security are declared through a builder API into a
//! [`Registry`](registry::Registry). Sealing the registry resolves every
//! path and validates the declarations; the route builder then turns each
//! endpoint into a middleware chain on the host [`Router`](http::Router).
//!
//! ```ignore
//! use trellis::prelude::*;
//!
//! #[derive(Default)]
//! struct PeopleService;
//!
//! fn declare(registry: &mut Registry) -> Result<(), DeclarationError> {
//!     let mut people = registry.service::<PeopleService>();
//!     people.path("/people")?;
//!     people
//!         .method("get")
//!         .get(":id")?
//!         .param(0, ParamBinding::path("id").typed(ParamType::Number))?
//!         .handler(|_, args| Ok(json!({ "id": args.value(0) })))?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Trellis::new().declare(declare).listen("127.0.0.1:3000").await
//! }
//! ```

pub mod annotations;
pub mod builder;
pub mod config;
pub mod context;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod http;
pub mod introspection;
pub mod metadata;
pub mod negotiation;
pub mod observability;
pub mod params;
pub mod registry;
pub mod resolve;
pub mod returns;
pub mod security;
pub mod server;
pub mod testing;

pub use inventory;

pub mod prelude {
    pub use crate::annotations::{MethodBuilder, ParamBinding, ServiceBuilder, Target};
    pub use crate::builder::RouteBuilder;
    pub use crate::config::{ParserConfig, ServerConfig, load_dotenv};
    pub use crate::context::{NextCallback, ServiceContext};
    pub use crate::discovery::ServiceDeclaration;
    pub use crate::error::{DeclarationError, Error, Result};
    pub use crate::factory::{DefaultServiceFactory, ServiceFactory};
    pub use crate::http::{BodyParserOptions, BodyType, HttpRequest, HttpResponse, Router, UploadedFile};
    pub use crate::metadata::{ParamKind, ParamType};
    pub use crate::observability::TracingConfig;
    pub use crate::params::{Arg, Args};
    pub use crate::registry::{Registry, SealedRegistry};
    pub use crate::returns::{DownloadBinaryData, DownloadResource, ReferencedResource, ServiceReturn};
    pub use crate::security::{Authenticator, Claims, JwtAuthenticator};
    pub use crate::server::Trellis;

    pub use http::{Method, StatusCode};
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::json;
}
