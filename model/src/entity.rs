//! Entity metadata shared by every record in the registry
//!
//! Products, versions, cases, runs, environments, results and users all carry
//! the same [`EntityMetadata`] block: a UUID, the entity kind, timestamps and
//! a revision counter bumped on each mutation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for entities
pub type EntityId = String;

/// Entity metadata common to all entity types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Unique identifier
    pub id: EntityId,

    /// Entity type
    pub entity_type: EntityType,

    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last modification timestamp
    pub updated_at: chrono::DateTime<chrono::Utc>,

    /// Revision counter, bumped on every mutation
    pub revision: u64,

    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EntityMetadata {
    /// Create new metadata for an entity
    pub fn new(entity_type: EntityType) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            entity_type,
            created_at: now,
            updated_at: now,
            revision: 1,
            tags: Vec::new(),
        }
    }

    /// Record a modification
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
        self.revision += 1;
    }
}

/// Types of entities in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    ProductVersion,
    Environment,
    Case,
    CaseVersion,
    Run,
    RunCaseVersion,
    Result,
    User,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::Product => "product",
            EntityType::ProductVersion => "product version",
            EntityType::Environment => "environment",
            EntityType::Case => "case",
            EntityType::CaseVersion => "case version",
            EntityType::Run => "run",
            EntityType::RunCaseVersion => "run case version",
            EntityType::Result => "result",
            EntityType::User => "user",
        };
        f.write_str(name)
    }
}

/// Core entity trait implemented by all record types
pub trait Entity {
    /// Get entity metadata
    fn metadata(&self) -> &EntityMetadata;

    /// Get mutable metadata
    fn metadata_mut(&mut self) -> &mut EntityMetadata;

    /// Serialize entity to JSON
    fn to_json(&self) -> serde_json::Result<String>;

    /// Get entity type
    fn entity_type(&self) -> EntityType {
        self.metadata().entity_type
    }

    /// Get entity ID
    fn id(&self) -> &str {
        &self.metadata().id
    }
}

/// Implements [`Entity`] for a struct with a `metadata: EntityMetadata` field.
macro_rules! impl_entity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::entity::Entity for $ty {
                fn metadata(&self) -> &$crate::entity::EntityMetadata {
                    &self.metadata
                }

                fn metadata_mut(&mut self) -> &mut $crate::entity::EntityMetadata {
                    &mut self.metadata
                }

                fn to_json(&self) -> serde_json::Result<String> {
                    serde_json::to_string(self)
                }
            }
        )+
    };
}

pub(crate) use impl_entity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_metadata_creation() {
        let metadata = EntityMetadata::new(EntityType::Product);
        assert_eq!(metadata.entity_type, EntityType::Product);
        assert_eq!(metadata.revision, 1);
        assert!(metadata.tags.is_empty());
        assert!(Uuid::parse_str(&metadata.id).is_ok());
    }

    #[test]
    fn test_touch_bumps_version() {
        let mut metadata = EntityMetadata::new(EntityType::Run);
        let created = metadata.created_at;
        metadata.touch();
        assert_eq!(metadata.revision, 2);
        assert!(metadata.updated_at >= created);
        assert_eq!(metadata.created_at, created);
    }

    #[test]
    fn test_entity_type_serializes_snake_case() {
        let json = serde_json::to_string(&EntityType::RunCaseVersion).unwrap();
        assert_eq!(json, "\"run_case_version\"");
    }
}
