//! The registry: every product, version, case, run, environment, result and
//! user, plus the operations that keep them consistent.
//!
//! Operations validate everything before mutating, so a call that returns an
//! error leaves the registry exactly as it was.
//!
//! - [`inheritance`]: including case versions in runs, environment add/remove
//!   and the removal cascade
//! - [`recording`]: the result recorder
//! - [`crate::aggregate`]: summaries over recorded results

pub mod inheritance;
pub mod recording;

pub use inheritance::EnvironmentSource;

use crate::auth::Permission;
use crate::entity::{Entity, EntityId, EntityType};
use crate::environment::{cartesian, Elements, Environment};
use crate::events::{RegistryEvent, RegistryObserver};
use crate::result::{TestResult, TransitionError};
use crate::types::{Case, CaseVersion, Product, ProductVersion, Run, RunCaseVersion, RunStatus, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur in registry operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("{entity_type} already exists: {key}")]
    AlreadyExists { entity_type: EntityType, key: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Environment {environment} is not allowed by product version {productversion}")]
    EnvironmentNotAllowed {
        environment: EntityId,
        productversion: EntityId,
    },

    #[error("Environment {environment} is not part of run case version {runcaseversion}")]
    EnvironmentNotApplicable {
        environment: EntityId,
        runcaseversion: EntityId,
    },

    #[error("Run {run} and case version {caseversion} belong to different product versions")]
    ProductVersionMismatch { run: EntityId, caseversion: EntityId },

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Environment {environment} is referenced by {results} result(s)")]
    EnvironmentInUse { environment: EntityId, results: usize },

    #[error("Ambiguous {entity_type} id prefix: {prefix}")]
    AmbiguousId { entity_type: EntityType, prefix: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl RegistryError {
    fn not_found(entity_type: EntityType, id: &str) -> Self {
        RegistryError::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        RegistryError::Validation {
            message: message.into(),
        }
    }
}

/// Insertion-ordered collection of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<T> {
    rows: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T: Entity> Table<T> {
    pub fn get(&self, id: &str) -> Option<&T> {
        self.rows.iter().find(|row| row.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.rows.iter_mut().find(|row| row.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn insert(&mut self, row: T) -> EntityId {
        let id = row.id().to_string();
        self.rows.push(row);
        id
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.rows.iter().position(|row| row.id() == id)?;
        Some(self.rows.remove(index))
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.rows.retain(keep);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.rows.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve a full id or a unique id prefix.
    pub fn resolve(&self, entity_type: EntityType, prefix: &str) -> RegistryResult<EntityId> {
        if self.contains(prefix) {
            return Ok(prefix.to_string());
        }
        let mut matches = self.rows.iter().filter(|row| row.id().starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(row), None) if !prefix.is_empty() => Ok(row.id().to_string()),
            (Some(_), _) => Err(RegistryError::AmbiguousId {
                entity_type,
                prefix: prefix.to_string(),
            }),
            (None, _) => Err(RegistryError::not_found(entity_type, prefix)),
        }
    }
}

/// Serializable contents of a [`Registry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub users: Table<User>,
    #[serde(default)]
    pub environments: Table<Environment>,
    #[serde(default)]
    pub products: Table<Product>,
    #[serde(default)]
    pub productversions: Table<ProductVersion>,
    #[serde(default)]
    pub cases: Table<Case>,
    #[serde(default)]
    pub caseversions: Table<CaseVersion>,
    #[serde(default)]
    pub runs: Table<Run>,
    #[serde(default)]
    pub runcaseversions: Table<RunCaseVersion>,
    #[serde(default)]
    pub results: Table<TestResult>,
}

/// Registry of all Case Conductor entities
#[derive(Default)]
pub struct Registry {
    state: RegistryState,
    observers: Vec<Arc<dyn RegistryObserver>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish()
    }
}

macro_rules! lookup {
    ($get:ident, $get_mut:ident, $table:ident, $ty:ty, $kind:expr) => {
        pub fn $get(&self, id: &str) -> RegistryResult<&$ty> {
            self.state
                .$table
                .get(id)
                .ok_or_else(|| RegistryError::not_found($kind, id))
        }

        #[allow(dead_code)]
        fn $get_mut(&mut self, id: &str) -> RegistryResult<&mut $ty> {
            self.state
                .$table
                .get_mut(id)
                .ok_or_else(|| RegistryError::not_found($kind, id))
        }
    };
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap previously saved state
    pub fn from_state(state: RegistryState) -> Self {
        Self {
            state,
            observers: Vec::new(),
        }
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn into_state(self) -> RegistryState {
        self.state
    }

    /// Register an observer for every subsequent event
    pub fn subscribe(&mut self, observer: Arc<dyn RegistryObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn notify(&self, event: &RegistryEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }

    lookup!(user, user_mut, users, User, EntityType::User);
    lookup!(environment, environment_mut, environments, Environment, EntityType::Environment);
    lookup!(product, product_mut, products, Product, EntityType::Product);
    lookup!(productversion, productversion_mut, productversions, ProductVersion, EntityType::ProductVersion);
    lookup!(case, case_mut, cases, Case, EntityType::Case);
    lookup!(caseversion, caseversion_mut, caseversions, CaseVersion, EntityType::CaseVersion);
    lookup!(run, run_mut, runs, Run, EntityType::Run);
    lookup!(runcaseversion, runcaseversion_mut, runcaseversions, RunCaseVersion, EntityType::RunCaseVersion);
    lookup!(result, result_mut, results, TestResult, EntityType::Result);

    /// Resolve a full id or unique prefix for an entity type
    pub fn resolve(&self, entity_type: EntityType, prefix: &str) -> RegistryResult<EntityId> {
        let state = &self.state;
        match entity_type {
            EntityType::User => state.users.resolve(entity_type, prefix),
            EntityType::Environment => state.environments.resolve(entity_type, prefix),
            EntityType::Product => state.products.resolve(entity_type, prefix),
            EntityType::ProductVersion => state.productversions.resolve(entity_type, prefix),
            EntityType::Case => state.cases.resolve(entity_type, prefix),
            EntityType::CaseVersion => state.caseversions.resolve(entity_type, prefix),
            EntityType::Run => state.runs.resolve(entity_type, prefix),
            EntityType::RunCaseVersion => state.runcaseversions.resolve(entity_type, prefix),
            EntityType::Result => state.results.resolve(entity_type, prefix),
        }
    }

    // Users

    pub fn add_user(
        &mut self,
        username: &str,
        email: &str,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> RegistryResult<EntityId> {
        let username = required("username", username)?;
        if self.user_by_name(&username).is_some() {
            return Err(RegistryError::AlreadyExists {
                entity_type: EntityType::User,
                key: username,
            });
        }
        let mut user = User::new(username);
        user.email = email.trim().to_string();
        user.permissions.extend(permissions);
        info!(username = %user.username, "added user");
        Ok(self.state.users.insert(user))
    }

    pub fn user_by_name(&self, username: &str) -> Option<&User> {
        self.state.users.iter().find(|u| u.username == username)
    }

    // Environments

    /// Get or create the environment with exactly these elements
    pub fn add_environment(&mut self, elements: Elements) -> RegistryResult<EntityId> {
        if elements.is_empty() {
            return Err(RegistryError::validation(
                "an environment needs at least one element",
            ));
        }
        if let Some(existing) = self
            .state
            .environments
            .iter()
            .find(|env| env.elements == elements)
        {
            return Ok(existing.id().to_string());
        }
        let env = Environment::new(elements);
        debug!(environment = %env, "added environment");
        Ok(self.state.environments.insert(env))
    }

    /// Get or create every combination of one element per category
    pub fn generate_environments<C, E>(
        &mut self,
        categories: &[(C, Vec<E>)],
    ) -> RegistryResult<Vec<EntityId>>
    where
        C: AsRef<str>,
        E: AsRef<str>,
    {
        let combos = cartesian(categories);
        if combos.is_empty() {
            return Err(RegistryError::validation(
                "every category needs at least one element",
            ));
        }
        combos
            .into_iter()
            .map(|elements| self.add_environment(elements))
            .collect()
    }

    // Products and versions

    /// Add a product, optionally with its first version
    pub fn add_product(
        &mut self,
        name: &str,
        description: &str,
        version: Option<&str>,
    ) -> RegistryResult<(EntityId, Option<EntityId>)> {
        let name = required("name", name)?;
        let version = match version {
            Some(v) => Some(required("version", v)?),
            None => None,
        };
        let product = Product::new(name, description.trim());
        info!(product = %product.name, "added product");
        let product_id = self.state.products.insert(product);
        let version_id = version.map(|v| {
            self.state
                .productversions
                .insert(ProductVersion::new(product_id.clone(), v))
        });
        Ok((product_id, version_id))
    }

    pub fn edit_product(&mut self, id: &str, name: &str, description: &str) -> RegistryResult<()> {
        let name = required("name", name)?;
        let product = self.product_mut(id)?;
        product.name = name;
        product.description = description.trim().to_string();
        product.metadata.touch();
        info!(product = %product.name, "saved product");
        Ok(())
    }

    pub fn add_product_version(
        &mut self,
        product: &str,
        version: &str,
        codename: &str,
    ) -> RegistryResult<EntityId> {
        self.product(product)?;
        let version = required("version", version)?;
        if self
            .versions_of(product)
            .any(|pv| pv.version == version)
        {
            return Err(RegistryError::AlreadyExists {
                entity_type: EntityType::ProductVersion,
                key: version,
            });
        }
        let mut pv = ProductVersion::new(product, version);
        pv.codename = codename.trim().to_string();
        debug!(version = %pv.version, "added product version");
        Ok(self.state.productversions.insert(pv))
    }

    pub fn versions_of<'a>(&'a self, product: &'a str) -> impl Iterator<Item = &'a ProductVersion> {
        self.state
            .productversions
            .iter()
            .filter(move |pv| pv.product == product)
    }

    // Cases

    /// Create a case for the version's product along with its first case version
    pub fn add_case(
        &mut self,
        productversion: &str,
        name: &str,
        description: &str,
    ) -> RegistryResult<EntityId> {
        let product = self.productversion(productversion)?.product.clone();
        let name = required("name", name)?;
        let case_id = self.state.cases.insert(Case::new(product));
        let mut cv = CaseVersion::new(case_id, productversion, name);
        cv.description = description.trim().to_string();
        debug!(case = %cv.name, "added case");
        Ok(self.state.caseversions.insert(cv))
    }

    /// Add another version of an existing case, for a different product version
    pub fn add_case_version(
        &mut self,
        case: &str,
        productversion: &str,
        name: &str,
    ) -> RegistryResult<EntityId> {
        let case_product = self.case(case)?.product.clone();
        let pv = self.productversion(productversion)?;
        if pv.product != case_product {
            return Err(RegistryError::validation(format!(
                "product version {productversion} belongs to another product"
            )));
        }
        if self
            .state
            .caseversions
            .iter()
            .any(|cv| cv.case == case && cv.productversion == productversion)
        {
            return Err(RegistryError::AlreadyExists {
                entity_type: EntityType::CaseVersion,
                key: format!("{case}@{productversion}"),
            });
        }
        let name = required("name", name)?;
        Ok(self
            .state
            .caseversions
            .insert(CaseVersion::new(case, productversion, name)))
    }

    pub fn add_case_step(
        &mut self,
        caseversion: &str,
        instruction: &str,
        expected: &str,
    ) -> RegistryResult<u32> {
        let instruction = required("instruction", instruction)?;
        let cv = self.caseversion_mut(caseversion)?;
        cv.add_step(instruction, expected.trim());
        cv.metadata.touch();
        Ok(cv.steps.len() as u32)
    }

    // Runs

    pub fn add_run(
        &mut self,
        productversion: &str,
        name: &str,
        description: &str,
    ) -> RegistryResult<EntityId> {
        self.productversion(productversion)?;
        let name = required("name", name)?;
        let mut run = Run::new(productversion, name);
        run.description = description.trim().to_string();
        info!(run = %run.name, "added run");
        Ok(self.state.runs.insert(run))
    }

    pub fn set_run_status(&mut self, run: &str, status: RunStatus) -> RegistryResult<()> {
        let run = self.run_mut(run)?;
        run.status = status;
        run.metadata.touch();
        info!(run = %run.name, %status, "run status changed");
        Ok(())
    }

    pub fn runcaseversions_of<'a>(&'a self, run: &'a str) -> impl Iterator<Item = &'a RunCaseVersion> {
        self.state
            .runcaseversions
            .iter()
            .filter(move |rcv| rcv.run == run)
    }

    pub(crate) fn ensure_environments_exist(&self, environments: &BTreeSet<EntityId>) -> RegistryResult<()> {
        for env in environments {
            self.environment(env)?;
        }
        Ok(())
    }
}

fn required(field: &str, value: &str) -> RegistryResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistryError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
