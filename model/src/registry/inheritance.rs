//! Environment inheritance between product versions, runs, case versions and
//! run case versions.
//!
//! A run case version takes `run.environments ∩ caseversion.environments`
//! once, when it is created. After that:
//!
//! - removing an environment from a product version, run or case version
//!   removes it from every dependent set that holds it;
//! - adding an environment never reaches existing run case versions.

use super::{Registry, RegistryError, RegistryResult};
use crate::entity::{EntityId, EntityType};
use crate::events::RegistryEvent;
use crate::types::{EnvironmentSet, RunCaseVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// An entity that owns an environment set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSource {
    ProductVersion(EntityId),
    Run(EntityId),
    CaseVersion(EntityId),
    RunCaseVersion(EntityId),
}

impl EnvironmentSource {
    pub fn id(&self) -> &str {
        match self {
            EnvironmentSource::ProductVersion(id)
            | EnvironmentSource::Run(id)
            | EnvironmentSource::CaseVersion(id)
            | EnvironmentSource::RunCaseVersion(id) => id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EnvironmentSource::ProductVersion(_) => EntityType::ProductVersion,
            EnvironmentSource::Run(_) => EntityType::Run,
            EnvironmentSource::CaseVersion(_) => EntityType::CaseVersion,
            EnvironmentSource::RunCaseVersion(_) => EntityType::RunCaseVersion,
        }
    }
}

impl fmt::Display for EnvironmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity_type(), self.id())
    }
}

impl Registry {
    /// Include a case version in a run, creating the run case version.
    ///
    /// The new run case version's environments are the intersection of the
    /// run's and the case version's environments at this moment.
    pub fn include_case_version(&mut self, run: &str, caseversion: &str) -> RegistryResult<EntityId> {
        let r = self.run(run)?;
        let cv = self.caseversion(caseversion)?;
        if r.productversion != cv.productversion {
            return Err(RegistryError::ProductVersionMismatch {
                run: run.to_string(),
                caseversion: caseversion.to_string(),
            });
        }
        if self
            .runcaseversions_of(run)
            .any(|rcv| rcv.caseversion == caseversion)
        {
            return Err(RegistryError::AlreadyExists {
                entity_type: EntityType::RunCaseVersion,
                key: format!("case '{}' in run '{}'", cv.name, r.name),
            });
        }

        let environments: EnvironmentSet = r
            .environments
            .intersection(&cv.environments)
            .cloned()
            .collect();
        info!(
            run = %r.name,
            case = %cv.name,
            environments = environments.len(),
            "included case version in run"
        );

        let id = self
            .state
            .runcaseversions
            .insert(RunCaseVersion::new(run, caseversion, environments));
        self.notify(&RegistryEvent::RunCaseVersionCreated {
            runcaseversion: id.clone(),
            run: run.to_string(),
            caseversion: caseversion.to_string(),
        });
        Ok(id)
    }

    /// Remove a run case version along with its results; returns the number of results dropped.
    pub fn exclude_case_version(&mut self, runcaseversion: &str) -> RegistryResult<usize> {
        self.runcaseversion(runcaseversion)?;
        let before = self.state.results.len();
        self.state
            .results
            .retain(|result| result.runcaseversion != runcaseversion);
        let dropped = before - self.state.results.len();
        self.state.runcaseversions.remove(runcaseversion);
        info!(runcaseversion, results = dropped, "excluded case version from run");
        self.notify(&RegistryEvent::RunCaseVersionRemoved {
            runcaseversion: runcaseversion.to_string(),
        });
        Ok(dropped)
    }

    /// Current environment set of a source
    pub fn environments_of(&self, source: &EnvironmentSource) -> RegistryResult<&EnvironmentSet> {
        Ok(match source {
            EnvironmentSource::ProductVersion(id) => &self.productversion(id)?.environments,
            EnvironmentSource::Run(id) => &self.run(id)?.environments,
            EnvironmentSource::CaseVersion(id) => &self.caseversion(id)?.environments,
            EnvironmentSource::RunCaseVersion(id) => &self.runcaseversion(id)?.environments,
        })
    }

    /// Add environments to a source. Existing run case versions are never touched.
    ///
    /// Runs, case versions and run case versions only accept environments
    /// their product version allows.
    pub fn add_environments(
        &mut self,
        source: &EnvironmentSource,
        environments: &[EntityId],
    ) -> RegistryResult<()> {
        self.environments_of(source)?;
        let requested: EnvironmentSet = environments.iter().cloned().collect();
        self.ensure_environments_exist(&requested)?;

        if let Some(productversion) = self.governing_version(source)? {
            let allowed = &self.productversion(&productversion)?.environments;
            if let Some(env) = requested.iter().find(|env| !allowed.contains(*env)) {
                return Err(RegistryError::EnvironmentNotAllowed {
                    environment: env.clone(),
                    productversion,
                });
            }
        }

        let added = self.update_environments(source, |set| {
            requested
                .into_iter()
                .filter(|env| set.insert(env.clone()))
                .collect()
        })?;
        if !added.is_empty() {
            debug!(%source, added = added.len(), "added environments");
            self.notify(&RegistryEvent::EnvironmentsAdded {
                source: source.clone(),
                environments: added,
            });
        }
        Ok(())
    }

    /// Remove environments from a source and from everything that inherits from it.
    ///
    /// Environments the source does not hold are ignored.
    pub fn remove_environments(
        &mut self,
        source: &EnvironmentSource,
        environments: &[EntityId],
    ) -> RegistryResult<()> {
        self.environments_of(source)?;
        self.remove_cascading(source.clone(), environments)
    }

    /// Delete an environment outright, removing it from every set.
    ///
    /// Refused while any result was recorded against it.
    pub fn delete_environment(&mut self, environment: &str) -> RegistryResult<()> {
        self.environment(environment)?;
        let results = self
            .state
            .results
            .iter()
            .filter(|result| result.environment == environment)
            .count();
        if results > 0 {
            return Err(RegistryError::EnvironmentInUse {
                environment: environment.to_string(),
                results,
            });
        }

        let state = &mut self.state;
        state
            .productversions
            .iter_mut()
            .for_each(|pv| drop_env(&mut pv.environments, &mut pv.metadata, environment));
        state
            .runs
            .iter_mut()
            .for_each(|run| drop_env(&mut run.environments, &mut run.metadata, environment));
        state
            .caseversions
            .iter_mut()
            .for_each(|cv| drop_env(&mut cv.environments, &mut cv.metadata, environment));
        state
            .runcaseversions
            .iter_mut()
            .for_each(|rcv| drop_env(&mut rcv.environments, &mut rcv.metadata, environment));
        state.environments.remove(environment);

        info!(environment, "deleted environment");
        self.notify(&RegistryEvent::EnvironmentDeleted {
            environment: environment.to_string(),
        });
        Ok(())
    }

    fn remove_cascading(
        &mut self,
        source: EnvironmentSource,
        environments: &[EntityId],
    ) -> RegistryResult<()> {
        let removed = self.update_environments(&source, |set| {
            environments
                .iter()
                .filter(|env| set.remove(*env))
                .cloned()
                .collect()
        })?;
        if !removed.is_empty() {
            debug!(%source, removed = removed.len(), "removed environments");
            self.notify(&RegistryEvent::EnvironmentsRemoved {
                source: source.clone(),
                environments: removed,
            });
        }
        // Dependents are pruned even when this set was already missing the
        // environment: a run case version may still hold it.
        for dependent in self.dependents(&source) {
            self.remove_cascading(dependent, environments)?;
        }
        Ok(())
    }

    fn dependents(&self, source: &EnvironmentSource) -> Vec<EnvironmentSource> {
        let state = &self.state;
        match source {
            EnvironmentSource::ProductVersion(pv) => state
                .runs
                .iter()
                .filter(|run| &run.productversion == pv)
                .map(|run| EnvironmentSource::Run(run.metadata.id.clone()))
                .chain(
                    state
                        .caseversions
                        .iter()
                        .filter(|cv| &cv.productversion == pv)
                        .map(|cv| EnvironmentSource::CaseVersion(cv.metadata.id.clone())),
                )
                .collect(),
            EnvironmentSource::Run(run) => state
                .runcaseversions
                .iter()
                .filter(|rcv| &rcv.run == run)
                .map(|rcv| EnvironmentSource::RunCaseVersion(rcv.metadata.id.clone()))
                .collect(),
            EnvironmentSource::CaseVersion(cv) => state
                .runcaseversions
                .iter()
                .filter(|rcv| &rcv.caseversion == cv)
                .map(|rcv| EnvironmentSource::RunCaseVersion(rcv.metadata.id.clone()))
                .collect(),
            EnvironmentSource::RunCaseVersion(_) => Vec::new(),
        }
    }

    /// Product version whose environments bound this source, if any.
    fn governing_version(&self, source: &EnvironmentSource) -> RegistryResult<Option<EntityId>> {
        Ok(match source {
            EnvironmentSource::ProductVersion(_) => None,
            EnvironmentSource::Run(id) => Some(self.run(id)?.productversion.clone()),
            EnvironmentSource::CaseVersion(id) => Some(self.caseversion(id)?.productversion.clone()),
            EnvironmentSource::RunCaseVersion(id) => {
                let run = &self.runcaseversion(id)?.run;
                Some(self.run(run)?.productversion.clone())
            }
        })
    }

    /// Apply `change` to the source's set; the source is touched if anything changed.
    fn update_environments(
        &mut self,
        source: &EnvironmentSource,
        change: impl FnOnce(&mut EnvironmentSet) -> Vec<EntityId>,
    ) -> RegistryResult<Vec<EntityId>> {
        let (set, metadata) = match source {
            EnvironmentSource::ProductVersion(id) => {
                let pv = self.productversion_mut(id)?;
                (&mut pv.environments, &mut pv.metadata)
            }
            EnvironmentSource::Run(id) => {
                let run = self.run_mut(id)?;
                (&mut run.environments, &mut run.metadata)
            }
            EnvironmentSource::CaseVersion(id) => {
                let cv = self.caseversion_mut(id)?;
                (&mut cv.environments, &mut cv.metadata)
            }
            EnvironmentSource::RunCaseVersion(id) => {
                let rcv = self.runcaseversion_mut(id)?;
                (&mut rcv.environments, &mut rcv.metadata)
            }
        };
        let changed = change(set);
        if !changed.is_empty() {
            metadata.touch();
        }
        Ok(changed)
    }
}

fn drop_env(set: &mut EnvironmentSet, metadata: &mut crate::entity::EntityMetadata, env: &str) {
    if set.remove(env) {
        metadata.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use std::sync::Arc;

    struct Fixture {
        registry: Registry,
        pv: EntityId,
        envs: Vec<EntityId>,
    }

    fn fixture() -> Fixture {
        let mut registry = Registry::new();
        let (_, pv) = registry.add_product("Firefox", "", Some("10")).unwrap();
        let pv = pv.unwrap();
        let envs = registry
            .generate_environments(&[("OS", vec!["OS X", "Linux"])])
            .unwrap();
        registry
            .add_environments(&EnvironmentSource::ProductVersion(pv.clone()), &envs)
            .unwrap();
        Fixture { registry, pv, envs }
    }

    #[test]
    fn test_run_rejects_environment_outside_version() {
        let Fixture {
            mut registry, pv, ..
        } = fixture();
        let stray = registry
            .generate_environments(&[("OS", vec!["Windows"])])
            .unwrap();
        let run = registry.add_run(&pv, "FF10", "").unwrap();
        let err = registry
            .add_environments(&EnvironmentSource::Run(run.clone()), &stray)
            .unwrap_err();
        assert!(matches!(err, RegistryError::EnvironmentNotAllowed { .. }));
        assert!(registry.run(&run).unwrap().environments.is_empty());
    }

    #[test]
    fn test_include_twice_rejected() {
        let Fixture {
            mut registry, pv, ..
        } = fixture();
        let run = registry.add_run(&pv, "FF10", "").unwrap();
        let cv = registry.add_case(&pv, "Open URL", "").unwrap();
        registry.include_case_version(&run, &cv).unwrap();
        let err = registry.include_case_version(&run, &cv).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));
    }

    #[test]
    fn test_include_across_versions_rejected() {
        let Fixture {
            mut registry, pv, ..
        } = fixture();
        let product = registry.productversion(&pv).unwrap().product.clone();
        let pv11 = registry.add_product_version(&product, "11", "").unwrap();
        let run = registry.add_run(&pv11, "FF11", "").unwrap();
        let cv = registry.add_case(&pv, "Open URL", "").unwrap();
        assert!(matches!(
            registry.include_case_version(&run, &cv),
            Err(RegistryError::ProductVersionMismatch { .. })
        ));
    }

    #[test]
    fn test_removal_events_are_emitted_per_changed_set() {
        let Fixture {
            mut registry,
            pv,
            envs,
        } = fixture();
        let run = registry.add_run(&pv, "FF10", "").unwrap();
        let cv = registry.add_case(&pv, "Open URL", "").unwrap();
        registry
            .add_environments(&EnvironmentSource::Run(run.clone()), &envs)
            .unwrap();
        registry
            .add_environments(&EnvironmentSource::CaseVersion(cv.clone()), &envs)
            .unwrap();
        let rcv = registry.include_case_version(&run, &cv).unwrap();

        let log = Arc::new(EventLog::new());
        registry.subscribe(log.clone());
        registry
            .remove_environments(&EnvironmentSource::ProductVersion(pv.clone()), &envs[..1])
            .unwrap();

        let sources: Vec<EnvironmentSource> = log
            .events()
            .into_iter()
            .filter_map(|event| match event {
                RegistryEvent::EnvironmentsRemoved { source, .. } => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(
            sources,
            vec![
                EnvironmentSource::ProductVersion(pv),
                EnvironmentSource::Run(run),
                EnvironmentSource::RunCaseVersion(rcv),
                EnvironmentSource::CaseVersion(cv),
            ]
        );
    }

    #[test]
    fn test_remove_absent_environment_is_noop() {
        let Fixture {
            mut registry,
            pv,
            envs,
        } = fixture();
        let run = registry.add_run(&pv, "FF10", "").unwrap();
        let before = registry.run(&run).unwrap().metadata.revision;
        registry
            .remove_environments(&EnvironmentSource::Run(run.clone()), &envs)
            .unwrap();
        assert_eq!(registry.run(&run).unwrap().metadata.revision, before);
    }

    #[test]
    fn test_delete_environment_clears_every_set() {
        let Fixture {
            mut registry,
            pv,
            envs,
        } = fixture();
        let run = registry.add_run(&pv, "FF10", "").unwrap();
        registry
            .add_environments(&EnvironmentSource::Run(run.clone()), &envs)
            .unwrap();
        registry.delete_environment(&envs[0]).unwrap();

        assert!(registry.environment(&envs[0]).is_err());
        assert!(!registry.productversion(&pv).unwrap().environments.contains(&envs[0]));
        assert!(!registry.run(&run).unwrap().environments.contains(&envs[0]));
    }

    #[test]
    fn test_exclude_drops_results() {
        let Fixture {
            mut registry,
            pv,
            envs,
        } = fixture();
        let tester = registry.add_user("tester", "", []).unwrap();
        let run = registry.add_run(&pv, "FF10", "").unwrap();
        let cv = registry.add_case(&pv, "Open URL", "").unwrap();
        registry
            .add_environments(&EnvironmentSource::Run(run.clone()), &envs)
            .unwrap();
        registry
            .add_environments(&EnvironmentSource::CaseVersion(cv.clone()), &envs)
            .unwrap();
        let rcv = registry.include_case_version(&run, &cv).unwrap();
        registry.start_result(&rcv, &envs[0], &tester).unwrap();

        assert_eq!(registry.exclude_case_version(&rcv).unwrap(), 1);
        assert!(registry.runcaseversion(&rcv).is_err());
        assert!(registry.state().results.is_empty());
    }
}
