//! Persisted entities and the registry the migrator walks.

pub mod http_log;
pub mod user;

pub use http_log::{Log, LogEntry};
pub use user::{UnknownUserType, User, UserType};

use crate::extract::{self, ExtractError};
use crate::schema::{Model, ModelDef, ModelDescriptor};

/// Ordered list of model definitions. Iteration follows registration order,
/// so referenced models must be registered before the models pointing at them.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    definitions: Vec<ModelDef>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register<M: Model>(mut self) -> Self {
        self.definitions.push(M::definition());
        self
    }

    pub fn definitions(&self) -> &[ModelDef] {
        &self.definitions
    }

    pub fn describe(&self) -> Result<Vec<ModelDescriptor>, ExtractError> {
        self.definitions.iter().map(extract::describe).collect()
    }
}

/// The application's models. Add new entities here.
pub fn registry() -> Registry {
    Registry::new().register::<User>().register::<Log>()
}
