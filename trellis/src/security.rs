//! Authentication collaborators and role checks.
//!
//! An [`Authenticator`] contributes the middleware that establishes who the
//! caller is, and reads the caller's roles back from the request. The route
//! builder places that middleware, followed by a [`RoleGuard`], in front of
//! every endpoint that declares roles for the authenticator's scope.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use http::header;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigError, get_env, get_env_parsed_or};
use crate::error::{Error, Result};
use crate::http::{BoxFuture, Exchange, HttpRequest, Middleware, Next};
use crate::metadata::WILDCARD_ROLE;

pub trait Authenticator: Send + Sync + 'static {
    /// Middleware that authenticates the request or fails it with 401.
    fn middleware(&self) -> Arc<dyn Middleware>;

    /// Roles of the authenticated caller.
    fn roles(&self, request: &HttpRequest) -> Vec<String>;
}

/// Lets the request through when the caller holds one of the required roles.
pub struct RoleGuard {
    authenticator: Arc<dyn Authenticator>,
    required: Vec<String>,
}

impl RoleGuard {
    pub fn new(authenticator: Arc<dyn Authenticator>, required: Vec<String>) -> Self {
        Self {
            authenticator,
            required,
        }
    }

    fn allows(&self, request: &HttpRequest) -> bool {
        if self.required.iter().any(|role| role == WILDCARD_ROLE) {
            return true;
        }
        let held = self.authenticator.roles(request);
        self.required.iter().any(|role| held.contains(role))
    }
}

impl Middleware for RoleGuard {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.allows(&exchange.request) {
                debug!(
                    trace_id = %exchange.context.trace_id,
                    required = ?self.required,
                    "caller lacks required role"
                );
                return Err(Error::forbidden("insufficient role"));
            }
            next.run(exchange).await
        })
    }
}

/// Claims carried by tokens issued by [`JwtAuthenticator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Claims of the authenticated caller, once the JWT middleware ran.
    pub fn of(request: &HttpRequest) -> Option<&Claims> {
        request.extensions.get::<Claims>()
    }
}

const DEFAULT_EXPIRATION_SECS: u64 = 3600;

/// HS256 bearer-token authenticator.
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: u64,
}

impl JwtAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>, expiration: u64) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiration,
        }
    }

    /// Reads `JWT_SECRET` and an optional `JWT_EXPIRATION` in seconds.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let secret = get_env("JWT_SECRET")?;
        let expiration = get_env_parsed_or("JWT_EXPIRATION", DEFAULT_EXPIRATION_SECS)?;
        Ok(Self::new(secret, expiration))
    }

    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    pub fn create_token(&self, subject: impl Into<String>, roles: &[&str]) -> Result<String> {
        let now = unix_now();
        let claims = Claims {
            sub: subject.into(),
            iat: now,
            exp: now + self.expiration,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("failed to create token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| Error::unauthorized("invalid token"))
    }
}

impl Authenticator for JwtAuthenticator {
    fn middleware(&self) -> Arc<dyn Middleware> {
        Arc::new(JwtMiddleware {
            authenticator: self.clone(),
        })
    }

    fn roles(&self, request: &HttpRequest) -> Vec<String> {
        Claims::of(request)
            .map(|claims| claims.roles.clone())
            .unwrap_or_default()
    }
}

struct JwtMiddleware {
    authenticator: JwtAuthenticator,
}

impl Middleware for JwtMiddleware {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if Claims::of(&exchange.request).is_none() {
                let token = exchange
                    .request
                    .header(header::AUTHORIZATION.as_str())
                    .ok_or_else(|| Error::unauthorized("missing authorization header"))?
                    .strip_prefix("Bearer ")
                    .ok_or_else(|| Error::unauthorized("invalid authorization scheme"))?
                    .trim()
                    .to_string();
                let claims = self.authenticator.verify(&token)?;
                exchange.request.extensions.insert(claims);
            }
            next.run(exchange).await
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
