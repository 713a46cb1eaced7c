//! Result recorder: one result per (run case version, environment, tester).

use super::{Registry, RegistryError, RegistryResult};
use crate::entity::EntityId;
use crate::events::RegistryEvent;
use crate::result::{StepResult, TestResult};
use tracing::{debug, info};

impl Registry {
    /// Assign a tester to an environment of a run case version.
    ///
    /// Returns the existing result if the triple already has one.
    pub fn assign_result(
        &mut self,
        runcaseversion: &str,
        environment: &str,
        tester: &str,
    ) -> RegistryResult<EntityId> {
        self.validate_triple(runcaseversion, environment, tester)?;
        if let Some(existing) = self.find_result(runcaseversion, environment, tester) {
            return Ok(existing);
        }
        let result = TestResult::new(runcaseversion, environment, tester);
        debug!(runcaseversion, environment, tester, "assigned result");
        let id = self.state.results.insert(result);
        self.announce(&id);
        Ok(id)
    }

    /// Start (or restart) the triple's result, creating it if needed.
    pub fn start_result(
        &mut self,
        runcaseversion: &str,
        environment: &str,
        tester: &str,
    ) -> RegistryResult<EntityId> {
        self.validate_triple(runcaseversion, environment, tester)?;
        let id = match self.find_result(runcaseversion, environment, tester) {
            Some(id) => id,
            None => self
                .state
                .results
                .insert(TestResult::new(runcaseversion, environment, tester)),
        };
        self.result_mut(&id)?.start()?;
        info!(result = %id, "started result");
        self.announce(&id);
        Ok(id)
    }

    pub fn pass_result(&mut self, result: &str) -> RegistryResult<()> {
        self.ensure_applicable(result)?;
        self.result_mut(result)?.pass()?;
        info!(result, "passed result");
        self.announce(result);
        Ok(())
    }

    pub fn fail_result(
        &mut self,
        result: &str,
        comment: &str,
        steps: Vec<StepResult>,
    ) -> RegistryResult<()> {
        self.ensure_applicable(result)?;
        self.result_mut(result)?.fail(comment.trim(), steps)?;
        info!(result, "failed result");
        self.announce(result);
        Ok(())
    }

    pub fn invalidate_result(&mut self, result: &str, comment: &str) -> RegistryResult<()> {
        self.ensure_applicable(result)?;
        self.result_mut(result)?.invalidate(comment.trim())?;
        info!(result, "invalidated result");
        self.announce(result);
        Ok(())
    }

    /// Attach an extra step result, e.g. a bug found after the fact.
    pub fn add_step_result(&mut self, result: &str, step: StepResult) -> RegistryResult<()> {
        self.ensure_applicable(result)?;
        self.result_mut(result)?.add_step_result(step);
        debug!(result, "added step result");
        self.announce(result);
        Ok(())
    }

    /// All results recorded for a run case version
    pub fn results_for<'a>(&'a self, runcaseversion: &'a str) -> impl Iterator<Item = &'a TestResult> {
        self.state
            .results
            .iter()
            .filter(move |result| result.runcaseversion == runcaseversion)
    }

    pub fn find_result(&self, runcaseversion: &str, environment: &str, tester: &str) -> Option<EntityId> {
        self.state
            .results
            .iter()
            .find(|r| {
                r.runcaseversion == runcaseversion && r.environment == environment && r.tester == tester
            })
            .map(|r| r.metadata.id.clone())
    }

    fn validate_triple(&self, runcaseversion: &str, environment: &str, tester: &str) -> RegistryResult<()> {
        let rcv = self.runcaseversion(runcaseversion)?;
        self.environment(environment)?;
        self.user(tester)?;
        if !rcv.environments.contains(environment) {
            return Err(RegistryError::EnvironmentNotApplicable {
                environment: environment.to_string(),
                runcaseversion: runcaseversion.to_string(),
            });
        }
        Ok(())
    }

    /// The result's environment must still be on its run case version.
    fn ensure_applicable(&self, result: &str) -> RegistryResult<()> {
        let result = self.result(result)?;
        let rcv = self.runcaseversion(&result.runcaseversion)?;
        if !rcv.environments.contains(&result.environment) {
            return Err(RegistryError::EnvironmentNotApplicable {
                environment: result.environment.clone(),
                runcaseversion: result.runcaseversion.clone(),
            });
        }
        Ok(())
    }

    fn announce(&self, result: &str) {
        if let Ok(r) = self.result(result) {
            self.notify(&RegistryEvent::ResultRecorded {
                result: result.to_string(),
                runcaseversion: r.runcaseversion.clone(),
                status: r.status,
            });
        }
    }
}
