//! Case Conductor domain model.
//!
//! Products have versions; versions allow a set of environments; runs and
//! case versions pick subsets of those; including a case version in a run
//! creates a run case version that inherits the intersection of both sets.
//! Testers record results per run case version and environment, and the
//! [`aggregate`] module summarizes them.

pub mod aggregate;
pub mod auth;
pub mod config;
pub mod entity;
pub mod environment;
pub mod events;
pub mod listing;
pub mod persist;
pub mod registry;
pub mod result;
pub mod types;

pub use aggregate::ResultSummary;
pub use auth::{authorize, Access, Permission};
pub use config::{ConductorConfig, ConfigError, ConfigResult, ListingDefaults};
pub use entity::{Entity, EntityId, EntityMetadata, EntityType};
pub use environment::{Elements, Environment};
pub use events::{EventLog, RegistryEvent, RegistryObserver};
pub use listing::{FieldValue, ListQuery, Listable, SortDirection};
pub use persist::{
    InMemorySnapshotStore, JsonFileStore, PersistError, PersistResult, Snapshot, SnapshotStore,
};
pub use registry::{EnvironmentSource, Registry, RegistryError, RegistryResult, RegistryState};
pub use result::{ResultStatus, StepResult, StepStatus, TestResult, TransitionError};
pub use types::{
    Case, CaseStep, CaseVersion, EnvironmentSet, Product, ProductVersion, Run, RunCaseVersion,
    RunStatus, User,
};

pub mod prelude {
    pub use crate::aggregate::*;
    pub use crate::auth::*;
    pub use crate::config::*;
    pub use crate::entity::{Entity, EntityId, EntityMetadata, EntityType};
    pub use crate::environment::*;
    pub use crate::events::*;
    pub use crate::listing::*;
    pub use crate::persist::*;
    pub use crate::registry::*;
    pub use crate::result::*;
    pub use crate::types::*;
}
