//! Service auto-discovery via `inventory`.
//!
//! A crate submits one [`ServiceDeclaration`] per service with
//! `inventory::submit!`. [`Registry::discover`] runs every submitted
//! declaration function against the registry.
//!
//! ```ignore
//! fn declare_people(registry: &mut Registry) -> Result<(), DeclarationError> {
//!     registry.service::<PeopleService>().path("/people")?;
//!     Ok(())
//! }
//!
//! trellis::inventory::submit! {
//!     ServiceDeclaration::new("PeopleService", declare_people)
//! }
//! ```
//!
//! Submission order across a binary is unspecified. A child may be
//! submitted before or after the parent it `extends`; inheritance is
//! composed once every declaration has run.

use tracing::debug;

use crate::error::DeclarationError;
use crate::registry::Registry;

/// Declaration function collected at link time.
pub struct ServiceDeclaration {
    /// Service name, for logs.
    pub name: &'static str,
    pub declare: fn(&mut Registry) -> Result<(), DeclarationError>,
}

impl ServiceDeclaration {
    pub const fn new(
        name: &'static str,
        declare: fn(&mut Registry) -> Result<(), DeclarationError>,
    ) -> Self {
        Self { name, declare }
    }
}

inventory::collect!(ServiceDeclaration);

impl Registry {
    /// Applies every submitted [`ServiceDeclaration`].
    pub fn discover(&mut self) -> Result<&mut Self, DeclarationError> {
        for declaration in inventory::iter::<ServiceDeclaration> {
            debug!(service = declaration.name, "discovered service declaration");
            (declaration.declare)(self)?;
        }
        Ok(self)
    }
}
