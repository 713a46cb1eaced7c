//! Test results and their status lifecycle.
//!
//! A result moves `assigned -> started -> {passed, failed, invalidated}`.
//! Any result may be started again, which is a retest: step results and the
//! comment are dropped. Finishing a result that is already finished is an
//! error.

use crate::entity::{impl_entity, EntityId, EntityMetadata, EntityType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Assigned,
    Started,
    Passed,
    Failed,
    Invalidated,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Assigned => "assigned",
            ResultStatus::Started => "started",
            ResultStatus::Passed => "passed",
            ResultStatus::Failed => "failed",
            ResultStatus::Invalidated => "invalidated",
        }
    }

    /// Passed, failed or invalidated.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ResultStatus::Passed | ResultStatus::Failed | ResultStatus::Invalidated
        )
    }

    /// Passed or failed; these count toward completion.
    pub fn is_completed(&self) -> bool {
        matches!(self, ResultStatus::Passed | ResultStatus::Failed)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(ResultStatus::Assigned),
            "started" => Ok(ResultStatus::Started),
            "passed" => Ok(ResultStatus::Passed),
            "failed" => Ok(ResultStatus::Failed),
            "invalidated" => Ok(ResultStatus::Invalidated),
            other => Err(format!("unknown result status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    Invalidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: u32,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_url: Option<String>,
}

impl StepResult {
    pub fn new(step_number: u32, status: StepStatus) -> Self {
        Self {
            step_number,
            status,
            bug_url: None,
        }
    }

    pub fn failed(step_number: u32, bug_url: Option<String>) -> Self {
        Self {
            step_number,
            status: StepStatus::Failed,
            bug_url,
        }
    }

    pub fn with_bug_url(mut self, bug_url: impl Into<String>) -> Self {
        self.bug_url = Some(bug_url.into());
        self
    }

    /// The bug URL, ignoring blank values.
    pub fn bug(&self) -> Option<&str> {
        self.bug_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot move result from {from} to {to}")]
pub struct TransitionError {
    pub from: ResultStatus,
    pub to: ResultStatus,
}

/// One outcome for a (run case version, environment, tester) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(flatten)]
    pub metadata: EntityMetadata,
    pub runcaseversion: EntityId,
    pub environment: EntityId,
    pub tester: EntityId,
    pub status: ResultStatus,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub started: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub completed: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
}

impl TestResult {
    pub fn new(
        runcaseversion: impl Into<EntityId>,
        environment: impl Into<EntityId>,
        tester: impl Into<EntityId>,
    ) -> Self {
        Self {
            metadata: EntityMetadata::new(EntityType::Result),
            runcaseversion: runcaseversion.into(),
            environment: environment.into(),
            tester: tester.into(),
            status: ResultStatus::Assigned,
            comment: String::new(),
            started: None,
            completed: None,
            step_results: Vec::new(),
        }
    }

    /// Begin execution, or restart a finished result for a retest.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.status == ResultStatus::Started {
            return Err(self.transition_error(ResultStatus::Started));
        }
        self.status = ResultStatus::Started;
        self.started = Some(chrono::Utc::now());
        self.completed = None;
        self.comment.clear();
        self.step_results.clear();
        self.metadata.touch();
        Ok(())
    }

    pub fn pass(&mut self) -> Result<(), TransitionError> {
        self.finish(ResultStatus::Passed, String::new(), Vec::new())
    }

    pub fn fail(
        &mut self,
        comment: impl Into<String>,
        step_results: Vec<StepResult>,
    ) -> Result<(), TransitionError> {
        self.finish(ResultStatus::Failed, comment.into(), step_results)
    }

    pub fn invalidate(&mut self, comment: impl Into<String>) -> Result<(), TransitionError> {
        self.finish(ResultStatus::Invalidated, comment.into(), Vec::new())
    }

    /// Attach a step result to this result regardless of its status.
    pub fn add_step_result(&mut self, step: StepResult) {
        self.step_results.push(step);
        self.metadata.touch();
    }

    /// Non-blank bug URLs on this result's steps.
    pub fn bug_urls(&self) -> impl Iterator<Item = &str> {
        self.step_results.iter().filter_map(StepResult::bug)
    }

    fn finish(
        &mut self,
        to: ResultStatus,
        comment: String,
        step_results: Vec<StepResult>,
    ) -> Result<(), TransitionError> {
        if self.status.is_finished() {
            return Err(self.transition_error(to));
        }
        let now = chrono::Utc::now();
        self.started.get_or_insert(now);
        self.completed = Some(now);
        self.status = to;
        self.comment = comment;
        self.step_results.extend(step_results);
        self.metadata.touch();
        Ok(())
    }

    fn transition_error(&self, to: ResultStatus) -> TransitionError {
        TransitionError {
            from: self.status,
            to,
        }
    }
}

impl_entity!(TestResult);
