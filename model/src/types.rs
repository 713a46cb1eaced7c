use crate::auth::Permission;
use crate::entity::{impl_entity, EntityId, EntityMetadata, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Set of environment ids attached to a version, run, case version or RCV.
pub type EnvironmentSet = BTreeSet<EntityId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Product {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::Product),
            name: name.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVersion {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub product: EntityId,
    pub version: String,
    #[serde(default)]
    pub codename: String,
    #[serde(default)]
    pub environments: EnvironmentSet,
}

impl ProductVersion {
    pub fn new(product: impl Into<EntityId>, version: impl Into<String>) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::ProductVersion),
            product: product.into(),
            version: version.into(),
            codename: String::new(),
            environments: EnvironmentSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub product: EntityId,
}

impl Case {
    pub fn new(product: impl Into<EntityId>) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::Case),
            product: product.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseStep {
    pub number: u32,
    pub instruction: String,
    #[serde(default)]
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseVersion {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub case: EntityId,
    pub productversion: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<CaseStep>,
    #[serde(default)]
    pub environments: EnvironmentSet,
}

impl CaseVersion {
    pub fn new(
        case: impl Into<EntityId>,
        productversion: impl Into<EntityId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::CaseVersion),
            case: case.into(),
            productversion: productversion.into(),
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
            environments: EnvironmentSet::new(),
        }
    }

    /// Append a step, numbering it after the last one.
    pub fn add_step(&mut self, instruction: impl Into<String>, expected: impl Into<String>) {
        let number = self.steps.last().map(|s| s.number + 1).unwrap_or(1);
        self.steps.push(CaseStep {
            number,
            instruction: instruction.into(),
            expected: expected.into(),
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Draft,
    Active,
    Disabled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Draft => "draft",
            RunStatus::Active => "active",
            RunStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub productversion: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub environments: EnvironmentSet,
}

impl Run {
    pub fn new(productversion: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::Run),
            productversion: productversion.into(),
            name: name.into(),
            description: String::new(),
            status: RunStatus::Draft,
            environments: EnvironmentSet::new(),
        }
    }
}

/// A case version included in a run.
///
/// `environments` starts as the intersection of the run's and the case
/// version's sets and afterwards only shrinks when a parent drops an
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCaseVersion {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub run: EntityId,
    pub caseversion: EntityId,
    #[serde(default)]
    pub environments: EnvironmentSet,
}

impl RunCaseVersion {
    pub fn new(
        run: impl Into<EntityId>,
        caseversion: impl Into<EntityId>,
        environments: EnvironmentSet,
    ) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::RunCaseVersion),
            run: run.into(),
            caseversion: caseversion.into(),
            environments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::User),
            username: username.into(),
            email: String::new(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

impl_entity!(Product, ProductVersion, Case, CaseVersion, Run, RunCaseVersion, User);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    #[test]
    fn test_case_version_steps_are_numbered() {
        let mut cv = CaseVersion::new("case", "pv", "Open URL");
        cv.add_step("Open the browser", "Browser opens");
        cv.add_step("Type a URL", "");
        let numbers: Vec<u32> = cv.steps.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_run_defaults_to_draft() {
        let run = Run::new("pv", "FF10");
        assert_eq!(run.status, RunStatus::Draft);
        assert!(run.environments.is_empty());
        assert_eq!(run.entity_type(), EntityType::Run);
    }

    #[test]
    fn test_flattened_metadata_in_json() {
        let product = Product::new("Firefox", "A browser");
        let json: serde_json::Value = serde_json::from_str(&product.to_json().unwrap()).unwrap();
        assert_eq!(json["name"], "Firefox");
        assert_eq!(json["entity_type"], "product");
        assert_eq!(json["id"], product.id());
    }

    #[test]
    fn test_product_version_json_round_trip() {
        let mut pv = ProductVersion::new("product", "10");
        pv.metadata.touch();
        let json = pv.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "10");
        assert_eq!(value["revision"], 2);

        let back: ProductVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pv);
    }
}
