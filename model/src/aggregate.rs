//! Summaries over recorded results, per run case version and per run.

use crate::entity::EntityId;
use crate::registry::{Registry, RegistryResult};
use crate::result::ResultStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::AddAssign;

/// Count of finished results by status. Assigned and started results are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub passed: usize,
    pub failed: usize,
    pub invalidated: usize,
}

impl ResultSummary {
    fn record(&mut self, status: ResultStatus) {
        match status {
            ResultStatus::Passed => self.passed += 1,
            ResultStatus::Failed => self.failed += 1,
            ResultStatus::Invalidated => self.invalidated += 1,
            ResultStatus::Assigned | ResultStatus::Started => {}
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.invalidated
    }

    /// The summary keyed by status name; every key is present.
    pub fn as_map(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("passed", self.passed),
            ("failed", self.failed),
            ("invalidated", self.invalidated),
        ])
    }
}

impl AddAssign for ResultSummary {
    fn add_assign(&mut self, other: Self) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.invalidated += other.invalidated;
    }
}

impl fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "passed: {}, failed: {}, invalidated: {}",
            self.passed, self.failed, self.invalidated
        )
    }
}

/// Completed and total environment slots; completion is their ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slots {
    completed: usize,
    total: usize,
}

impl Slots {
    fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64
    }
}

impl Registry {
    /// Finished results of one run case version, by status
    pub fn result_summary(&self, runcaseversion: &str) -> RegistryResult<ResultSummary> {
        self.runcaseversion(runcaseversion)?;
        let mut summary = ResultSummary::default();
        for result in self.results_for(runcaseversion) {
            summary.record(result.status);
        }
        Ok(summary)
    }

    /// Fraction of the run case version's environments with a passed or failed result.
    ///
    /// Zero when the run case version has no environments.
    pub fn completion(&self, runcaseversion: &str) -> RegistryResult<f64> {
        Ok(self.slots(runcaseversion)?.fraction())
    }

    /// Every distinct, non-blank bug URL across the step results of this run case version
    pub fn bug_urls(&self, runcaseversion: &str) -> RegistryResult<BTreeSet<String>> {
        self.runcaseversion(runcaseversion)?;
        Ok(self
            .results_for(runcaseversion)
            .flat_map(|result| result.bug_urls())
            .map(str::to_string)
            .collect())
    }

    /// Distinct testers with a result for this run case version
    pub fn testers(&self, runcaseversion: &str) -> RegistryResult<BTreeSet<EntityId>> {
        self.runcaseversion(runcaseversion)?;
        Ok(self
            .results_for(runcaseversion)
            .map(|result| result.tester.clone())
            .collect())
    }

    /// Sum of the result summaries of every run case version in the run
    pub fn run_summary(&self, run: &str) -> RegistryResult<ResultSummary> {
        self.run(run)?;
        let mut summary = ResultSummary::default();
        for rcv in self.runcaseversions_of(run) {
            summary += self.result_summary(&rcv.metadata.id)?;
        }
        Ok(summary)
    }

    /// Completed environment slots over all environment slots in the run
    pub fn run_completion(&self, run: &str) -> RegistryResult<f64> {
        self.run(run)?;
        let mut slots = Slots::default();
        for rcv in self.runcaseversions_of(run) {
            let rcv_slots = self.slots(&rcv.metadata.id)?;
            slots.completed += rcv_slots.completed;
            slots.total += rcv_slots.total;
        }
        Ok(slots.fraction())
    }

    fn slots(&self, runcaseversion: &str) -> RegistryResult<Slots> {
        let rcv = self.runcaseversion(runcaseversion)?;
        let completed: BTreeSet<&str> = self
            .results_for(runcaseversion)
            .filter(|result| result.status.is_completed())
            .map(|result| result.environment.as_str())
            .filter(|env| rcv.environments.contains(*env))
            .collect();
        Ok(Slots {
            completed: completed.len(),
            total: rcv.environments.len(),
        })
    }
}
