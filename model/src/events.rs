//! Change notifications emitted by the [`Registry`](crate::registry::Registry).
//!
//! Environment removals travel through these events: removing an environment
//! from a product version emits a removal for that version, whose cascade
//! emits removals for its runs and case versions, whose cascades in turn
//! prune the affected run case versions. Additions are announced but never
//! cascade.

use crate::entity::EntityId;
use crate::registry::EnvironmentSource;
use crate::result::ResultStatus;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    EnvironmentsAdded {
        source: EnvironmentSource,
        environments: Vec<EntityId>,
    },
    EnvironmentsRemoved {
        source: EnvironmentSource,
        environments: Vec<EntityId>,
    },
    EnvironmentDeleted {
        environment: EntityId,
    },
    RunCaseVersionCreated {
        runcaseversion: EntityId,
        run: EntityId,
        caseversion: EntityId,
    },
    RunCaseVersionRemoved {
        runcaseversion: EntityId,
    },
    ResultRecorded {
        result: EntityId,
        runcaseversion: EntityId,
        status: ResultStatus,
    },
}

/// Receives every event after the registry has applied it.
pub trait RegistryObserver: Send + Sync {
    fn notify(&self, event: &RegistryEvent);
}

/// Observer that keeps every event it sees, in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<RegistryEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegistryObserver for EventLog {
    fn notify(&self, event: &RegistryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_records_in_order() {
        let log = EventLog::new();
        assert!(log.is_empty());
        log.notify(&RegistryEvent::EnvironmentDeleted {
            environment: "a".into(),
        });
        log.notify(&RegistryEvent::RunCaseVersionRemoved {
            runcaseversion: "b".into(),
        });
        let events = log.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RegistryEvent::EnvironmentDeleted { .. }));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = RegistryEvent::EnvironmentsRemoved {
            source: EnvironmentSource::Run("r1".into()),
            environments: vec!["e1".into()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "environments_removed");
        assert_eq!(json["environments"][0], "e1");
    }
}
