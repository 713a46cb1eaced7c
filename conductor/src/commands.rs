//! Executes parsed commands against a registry.
//!
//! Every command resolves abbreviated ids first, then checks the acting
//! user's permission (when enforcement is on), then calls the registry.
//! A denied permission is not an error: the outcome carries the login
//! redirect instead of the command's output.

use crate::cli::{
    CaseCommand, Commands, EnvChange, EnvCommand, ListArgs, ProductCommand, ReportCommand,
    ResultCommand, RunCommand, UserCommand, VersionCommand,
};
use model::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of id characters shown in listings
const SHORT_ID: usize = 8;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No such user: {0}")]
    UnknownUser(String),

    #[error("This command needs an acting user; pass --user")]
    NoActingUser,
}

pub type CommandResult<T> = Result<T, CommandError>;

/// What a command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub output: String,
    /// Whether the registry changed and needs saving
    pub changed: bool,
}

impl Outcome {
    fn read(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            changed: false,
        }
    }

    fn wrote(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            changed: true,
        }
    }
}

/// Report on one run case version, as printed by `report rcv`
#[derive(Debug, Clone, Serialize)]
pub struct RunCaseVersionReport {
    pub runcaseversion: EntityId,
    pub case: String,
    pub summary: ResultSummary,
    pub completion: f64,
    pub bug_urls: BTreeSet<String>,
    pub testers: Vec<String>,
}

/// Report on a whole run, as printed by `report run`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: EntityId,
    pub name: String,
    pub status: RunStatus,
    pub summary: ResultSummary,
    pub completion: f64,
    pub runcaseversions: Vec<RunCaseVersionReport>,
}

/// Runs commands for one acting user
pub struct Session<'a> {
    registry: &'a mut Registry,
    config: &'a ConductorConfig,
    user: Option<String>,
}

impl<'a> Session<'a> {
    pub fn new(registry: &'a mut Registry, config: &'a ConductorConfig, user: Option<String>) -> Self {
        Self {
            registry,
            config,
            user,
        }
    }

    pub fn execute(&mut self, command: Commands) -> CommandResult<Outcome> {
        debug!(?command, user = ?self.user, "executing command");
        match command {
            Commands::User(cmd) => self.user_command(cmd),
            Commands::Env(cmd) => self.env_command(cmd),
            Commands::Product(cmd) => self.product_command(cmd),
            Commands::Version(cmd) => self.version_command(cmd),
            Commands::Case(cmd) => self.case_command(cmd),
            Commands::Run(cmd) => self.run_command(cmd),
            Commands::Results(cmd) => self.result_command(cmd),
            Commands::Report(cmd) => self.report_command(cmd),
        }
    }

    /// `None` when allowed, otherwise the outcome to return instead.
    fn deny(&self, permission: Permission, next: &str) -> Option<Outcome> {
        if !self.config.enforce_permissions {
            return None;
        }
        let user = self
            .user
            .as_deref()
            .and_then(|name| self.registry.user_by_name(name));
        let access = authorize(user, permission, next);
        let redirect = access.redirect()?;
        warn!(%permission, user = ?self.user, "permission denied");
        Some(Outcome::read(format!("Login required: {redirect}")))
    }

    fn acting_user(&self) -> CommandResult<EntityId> {
        let name = self.user.as_deref().ok_or(CommandError::NoActingUser)?;
        self.registry
            .user_by_name(name)
            .map(|user| user.id().to_string())
            .ok_or_else(|| CommandError::UnknownUser(name.to_string()))
    }

    fn resolve(&self, entity_type: EntityType, id: &str) -> CommandResult<EntityId> {
        Ok(self.registry.resolve(entity_type, id)?)
    }

    fn resolve_all(&self, entity_type: EntityType, ids: &[String]) -> CommandResult<Vec<EntityId>> {
        ids.iter().map(|id| self.resolve(entity_type, id)).collect()
    }

    fn query(&self, list: &ListArgs) -> ListQuery {
        let defaults = &self.config.listing;
        ListQuery::from_params(list.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .with_default_sort(defaults.sort_field.as_deref(), defaults.sort_direction)
    }

    fn user_command(&mut self, cmd: UserCommand) -> CommandResult<Outcome> {
        match cmd {
            UserCommand::Add {
                username,
                email,
                permissions,
            } => {
                // The very first user may be added by anyone.
                if !self.registry.state().users.is_empty() {
                    if let Some(denied) = self.deny(Permission::ManageUsers, "/manage/users/add/") {
                        return Ok(denied);
                    }
                }
                let id = self.registry.add_user(&username, &email, permissions)?;
                Ok(Outcome::wrote(format!("Added user {username} ({})", short(&id))))
            }
            UserCommand::List => Ok(Outcome::read(lines(
                self.registry.state().users.iter().map(|user| {
                    let permissions: Vec<&str> =
                        user.permissions.iter().map(|p| p.as_str()).collect();
                    format!(
                        "{}  {}  {}",
                        short(user.id()),
                        user.username,
                        permissions.join(",")
                    )
                }),
            ))),
        }
    }

    fn env_command(&mut self, cmd: EnvCommand) -> CommandResult<Outcome> {
        match cmd {
            EnvCommand::Add { elements } => {
                if let Some(denied) = self.deny(Permission::ManageEnvironments, "/manage/environments/add/") {
                    return Ok(denied);
                }
                let id = self.registry.add_environment(elements.into_iter().collect())?;
                let env = self.registry.environment(&id)?;
                Ok(Outcome::wrote(format!("{}  {env}", short(&id))))
            }
            EnvCommand::Generate { categories } => {
                if let Some(denied) = self.deny(Permission::ManageEnvironments, "/manage/environments/add/") {
                    return Ok(denied);
                }
                let ids = self.registry.generate_environments(categories.as_slice())?;
                let mut out = Vec::with_capacity(ids.len());
                for id in &ids {
                    out.push(format!("{}  {}", short(id), self.registry.environment(id)?));
                }
                Ok(Outcome::wrote(out.join("\n")))
            }
            EnvCommand::List => Ok(Outcome::read(lines(
                self.registry
                    .state()
                    .environments
                    .iter()
                    .map(|env| format!("{}  {env}", short(env.id()))),
            ))),
            EnvCommand::Delete { id } => {
                let id = self.resolve(EntityType::Environment, &id)?;
                if let Some(denied) = self.deny(Permission::ManageEnvironments, "/manage/environments/") {
                    return Ok(denied);
                }
                self.registry.delete_environment(&id)?;
                Ok(Outcome::wrote(format!("Deleted environment {}", short(&id))))
            }
        }
    }

    fn product_command(&mut self, cmd: ProductCommand) -> CommandResult<Outcome> {
        match cmd {
            ProductCommand::Add {
                name,
                description,
                version,
            } => {
                if let Some(denied) = self.deny(Permission::ManageProducts, "/manage/product/add/") {
                    return Ok(denied);
                }
                let (product, version) =
                    self.registry
                        .add_product(&name, &description, version.as_deref())?;
                let mut out = format!("Added product {name} ({})", short(&product));
                if let Some(version) = version {
                    out.push_str(&format!("\nAdded version ({})", short(&version)));
                }
                Ok(Outcome::wrote(out))
            }
            ProductCommand::Edit {
                id,
                name,
                description,
            } => {
                let id = self.resolve(EntityType::Product, &id)?;
                if let Some(denied) = self.deny(Permission::ManageProducts, &format!("/manage/product/{id}/")) {
                    return Ok(denied);
                }
                self.registry.edit_product(&id, &name, &description)?;
                Ok(Outcome::wrote(format!("Saved product {name}")))
            }
            ProductCommand::Show { id } => {
                let id = self.resolve(EntityType::Product, &id)?;
                let product = self.registry.product(&id)?;
                let mut out = vec![
                    format!("{}  {}", short(&id), product.name),
                    product.description.clone(),
                ];
                out.extend(self.registry.versions_of(&id).map(|pv| {
                    format!(
                        "  version {} ({})  {} environment(s)",
                        pv.version,
                        short(pv.id()),
                        pv.environments.len()
                    )
                }));
                Ok(Outcome::read(out.join("\n")))
            }
            ProductCommand::List(list) => {
                let query = self.query(&list);
                let listed = query.apply(self.registry.state().products.iter());
                Ok(Outcome::read(lines(listed.into_iter().map(|product| {
                    format!("{}  {}  {}", short(product.id()), product.name, product.description)
                }))))
            }
        }
    }

    fn version_command(&mut self, cmd: VersionCommand) -> CommandResult<Outcome> {
        match cmd {
            VersionCommand::Add {
                product,
                version,
                codename,
            } => {
                let product = self.resolve(EntityType::Product, &product)?;
                if let Some(denied) = self.deny(Permission::ManageProducts, "/manage/productversion/add/") {
                    return Ok(denied);
                }
                let id = self
                    .registry
                    .add_product_version(&product, &version, &codename)?;
                Ok(Outcome::wrote(format!("Added version {version} ({})", short(&id))))
            }
            VersionCommand::List { product, list } => {
                let product = product
                    .map(|p| self.resolve(EntityType::Product, &p))
                    .transpose()?;
                let query = self.query(&list);
                let versions = self
                    .registry
                    .state()
                    .productversions
                    .iter()
                    .filter(|pv| product.as_ref().map_or(true, |p| &pv.product == p));
                let listed = query.apply(versions);
                Ok(Outcome::read(lines(listed.into_iter().map(|pv| {
                    format!(
                        "{}  {}  {}  {} environment(s)",
                        short(pv.id()),
                        pv.version,
                        pv.codename,
                        pv.environments.len()
                    )
                }))))
            }
            VersionCommand::AddEnv(EnvChange { id, environments }) => self.change_environments(
                EnvironmentSource::ProductVersion(id),
                &environments,
                true,
            ),
            VersionCommand::RemoveEnv(EnvChange { id, environments }) => self.change_environments(
                EnvironmentSource::ProductVersion(id),
                &environments,
                false,
            ),
        }
    }

    fn case_command(&mut self, cmd: CaseCommand) -> CommandResult<Outcome> {
        match cmd {
            CaseCommand::Add {
                productversion,
                name,
                description,
            } => {
                let productversion = self.resolve(EntityType::ProductVersion, &productversion)?;
                if let Some(denied) = self.deny(Permission::ManageCases, "/manage/case/add/") {
                    return Ok(denied);
                }
                let id = self.registry.add_case(&productversion, &name, &description)?;
                Ok(Outcome::wrote(format!("Added case {name} ({})", short(&id))))
            }
            CaseCommand::Step {
                caseversion,
                instruction,
                expected,
            } => {
                let caseversion = self.resolve(EntityType::CaseVersion, &caseversion)?;
                if let Some(denied) = self.deny(Permission::ManageCases, &format!("/manage/caseversion/{caseversion}/")) {
                    return Ok(denied);
                }
                let number = self
                    .registry
                    .add_case_step(&caseversion, &instruction, &expected)?;
                Ok(Outcome::wrote(format!("Added step {number}")))
            }
            CaseCommand::List(list) => {
                let query = self.query(&list);
                let listed = query.apply(self.registry.state().caseversions.iter());
                Ok(Outcome::read(lines(listed.into_iter().map(|cv| {
                    format!(
                        "{}  {}  {} step(s)  {} environment(s)",
                        short(cv.id()),
                        cv.name,
                        cv.steps.len(),
                        cv.environments.len()
                    )
                }))))
            }
            CaseCommand::AddEnv(EnvChange { id, environments }) => {
                self.change_environments(EnvironmentSource::CaseVersion(id), &environments, true)
            }
            CaseCommand::RemoveEnv(EnvChange { id, environments }) => {
                self.change_environments(EnvironmentSource::CaseVersion(id), &environments, false)
            }
        }
    }

    fn run_command(&mut self, cmd: RunCommand) -> CommandResult<Outcome> {
        match cmd {
            RunCommand::Add {
                productversion,
                name,
                description,
            } => {
                let productversion = self.resolve(EntityType::ProductVersion, &productversion)?;
                if let Some(denied) = self.deny(Permission::ManageRuns, "/manage/testrun/add/") {
                    return Ok(denied);
                }
                let id = self.registry.add_run(&productversion, &name, &description)?;
                Ok(Outcome::wrote(format!("Added run {name} ({})", short(&id))))
            }
            RunCommand::List(list) => {
                let query = self.query(&list);
                let listed = query.apply(self.registry.state().runs.iter());
                Ok(Outcome::read(lines(listed.into_iter().map(|run| {
                    format!(
                        "{}  {}  {}  {} environment(s)",
                        short(run.id()),
                        run.name,
                        run.status,
                        run.environments.len()
                    )
                }))))
            }
            RunCommand::Activate { id } => self.set_run_status(&id, RunStatus::Active),
            RunCommand::Disable { id } => self.set_run_status(&id, RunStatus::Disabled),
            RunCommand::AddEnv(EnvChange { id, environments }) => {
                self.change_environments(EnvironmentSource::Run(id), &environments, true)
            }
            RunCommand::RemoveEnv(EnvChange { id, environments }) => {
                self.change_environments(EnvironmentSource::Run(id), &environments, false)
            }
            RunCommand::RcvAddEnv(EnvChange { id, environments }) => {
                self.change_environments(EnvironmentSource::RunCaseVersion(id), &environments, true)
            }
            RunCommand::RcvRemoveEnv(EnvChange { id, environments }) => self.change_environments(
                EnvironmentSource::RunCaseVersion(id),
                &environments,
                false,
            ),
            RunCommand::Include { run, caseversion } => {
                let run = self.resolve(EntityType::Run, &run)?;
                let caseversion = self.resolve(EntityType::CaseVersion, &caseversion)?;
                if let Some(denied) = self.deny(Permission::ManageRuns, &format!("/manage/testrun/{run}/")) {
                    return Ok(denied);
                }
                let id = self.registry.include_case_version(&run, &caseversion)?;
                let environments = self.registry.runcaseversion(&id)?.environments.len();
                Ok(Outcome::wrote(format!(
                    "Included as {} with {environments} environment(s)",
                    short(&id)
                )))
            }
            RunCommand::Exclude { runcaseversion } => {
                let rcv = self.resolve(EntityType::RunCaseVersion, &runcaseversion)?;
                if let Some(denied) = self.deny(Permission::ManageRuns, "/manage/testruns/") {
                    return Ok(denied);
                }
                let dropped = self.registry.exclude_case_version(&rcv)?;
                Ok(Outcome::wrote(format!(
                    "Excluded {} and dropped {dropped} result(s)",
                    short(&rcv)
                )))
            }
        }
    }

    fn set_run_status(&mut self, id: &str, status: RunStatus) -> CommandResult<Outcome> {
        let id = self.resolve(EntityType::Run, id)?;
        if let Some(denied) = self.deny(Permission::ManageRuns, &format!("/manage/testrun/{id}/")) {
            return Ok(denied);
        }
        self.registry.set_run_status(&id, status)?;
        Ok(Outcome::wrote(format!("Run {} is now {status}", short(&id))))
    }

    /// `target` carries the id as typed; it is resolved before use.
    fn change_environments(
        &mut self,
        target: EnvironmentSource,
        environments: &[String],
        add: bool,
    ) -> CommandResult<Outcome> {
        let id = self.resolve(target.entity_type(), target.id())?;
        let environments = self.resolve_all(EntityType::Environment, environments)?;
        let (source, permission) = match target {
            EnvironmentSource::ProductVersion(_) => {
                (EnvironmentSource::ProductVersion(id), Permission::ManageProducts)
            }
            EnvironmentSource::CaseVersion(_) => {
                (EnvironmentSource::CaseVersion(id), Permission::ManageCases)
            }
            EnvironmentSource::Run(_) => (EnvironmentSource::Run(id), Permission::ManageRuns),
            EnvironmentSource::RunCaseVersion(_) => {
                (EnvironmentSource::RunCaseVersion(id), Permission::ManageRuns)
            }
        };
        let next = format!("/manage/{}/{}/environments/", source.entity_type(), source.id());
        if let Some(denied) = self.deny(permission, &next) {
            return Ok(denied);
        }
        if add {
            self.registry.add_environments(&source, &environments)?;
        } else {
            self.registry.remove_environments(&source, &environments)?;
        }
        let remaining = self.registry.environments_of(&source)?.len();
        Ok(Outcome::wrote(format!(
            "{source} now has {remaining} environment(s)"
        )))
    }

    fn result_command(&mut self, cmd: ResultCommand) -> CommandResult<Outcome> {
        if !matches!(cmd, ResultCommand::List { .. }) {
            if let Some(denied) = self.deny(Permission::Execute, "/runtests/") {
                return Ok(denied);
            }
        }
        match cmd {
            ResultCommand::Assign {
                runcaseversion,
                environment,
                tester,
            } => {
                let rcv = self.resolve(EntityType::RunCaseVersion, &runcaseversion)?;
                let env = self.resolve(EntityType::Environment, &environment)?;
                let tester_id = self
                    .registry
                    .user_by_name(&tester)
                    .map(|user| user.id().to_string())
                    .ok_or_else(|| CommandError::UnknownUser(tester.clone()))?;
                let id = self.registry.assign_result(&rcv, &env, &tester_id)?;
                Ok(Outcome::wrote(format!("Assigned {tester} ({})", short(&id))))
            }
            ResultCommand::Start {
                runcaseversion,
                environment,
            } => {
                let tester = self.acting_user()?;
                let rcv = self.resolve(EntityType::RunCaseVersion, &runcaseversion)?;
                let env = self.resolve(EntityType::Environment, &environment)?;
                let id = self.registry.start_result(&rcv, &env, &tester)?;
                Ok(Outcome::wrote(format!("Started result {}", short(&id))))
            }
            ResultCommand::Pass { result } => {
                let id = self.resolve(EntityType::Result, &result)?;
                self.registry.pass_result(&id)?;
                Ok(Outcome::wrote(format!("Passed result {}", short(&id))))
            }
            ResultCommand::Fail {
                result,
                comment,
                steps,
            } => {
                let id = self.resolve(EntityType::Result, &result)?;
                let steps = steps
                    .into_iter()
                    .map(|(number, bug)| StepResult::failed(number, bug))
                    .collect();
                self.registry.fail_result(&id, &comment, steps)?;
                Ok(Outcome::wrote(format!("Failed result {}", short(&id))))
            }
            ResultCommand::Invalidate { result, comment } => {
                let id = self.resolve(EntityType::Result, &result)?;
                self.registry.invalidate_result(&id, &comment)?;
                Ok(Outcome::wrote(format!("Invalidated result {}", short(&id))))
            }
            ResultCommand::List {
                runcaseversion,
                list,
            } => {
                let rcv = self.resolve(EntityType::RunCaseVersion, &runcaseversion)?;
                let query = self.query(&list);
                let listed = query.apply(self.registry.results_for(&rcv));
                let mut out = Vec::with_capacity(listed.len());
                for result in listed {
                    out.push(format!(
                        "{}  {}  {}  {}",
                        short(result.id()),
                        result.status,
                        self.registry.environment(&result.environment)?,
                        self.username(&result.tester)
                    ));
                }
                Ok(Outcome::read(out.join("\n")))
            }
        }
    }

    fn report_command(&self, cmd: ReportCommand) -> CommandResult<Outcome> {
        match cmd {
            ReportCommand::Rcv { id, json } => {
                let id = self.resolve(EntityType::RunCaseVersion, &id)?;
                let report = self.rcv_report(&id)?;
                if json {
                    return Ok(Outcome::read(serde_json::to_string_pretty(&report)?));
                }
                Ok(Outcome::read(render_rcv(&report)))
            }
            ReportCommand::Run { id, json } => {
                let id = self.resolve(EntityType::Run, &id)?;
                let run = self.registry.run(&id)?;
                let runcaseversions = self
                    .registry
                    .runcaseversions_of(&id)
                    .map(|rcv| self.rcv_report(rcv.id()))
                    .collect::<CommandResult<Vec<_>>>()?;
                let report = RunReport {
                    run: id.clone(),
                    name: run.name.clone(),
                    status: run.status,
                    summary: self.registry.run_summary(&id)?,
                    completion: self.registry.run_completion(&id)?,
                    runcaseversions,
                };
                if json {
                    return Ok(Outcome::read(serde_json::to_string_pretty(&report)?));
                }
                let mut out = vec![
                    format!("{} [{}]", report.name, report.status),
                    format!("{}", report.summary),
                    format!("completion: {}", percent(report.completion)),
                ];
                out.extend(report.runcaseversions.iter().map(|rcv| {
                    format!(
                        "  {}  {}  {}  {}",
                        short(&rcv.runcaseversion),
                        rcv.case,
                        percent(rcv.completion),
                        rcv.summary
                    )
                }));
                Ok(Outcome::read(out.join("\n")))
            }
        }
    }

    fn rcv_report(&self, id: &str) -> CommandResult<RunCaseVersionReport> {
        let rcv = self.registry.runcaseversion(id)?;
        let case = self.registry.caseversion(&rcv.caseversion)?.name.clone();
        Ok(RunCaseVersionReport {
            runcaseversion: id.to_string(),
            case,
            summary: self.registry.result_summary(id)?,
            completion: self.registry.completion(id)?,
            bug_urls: self.registry.bug_urls(id)?,
            testers: self
                .registry
                .testers(id)?
                .iter()
                .map(|tester| self.username(tester))
                .collect(),
        })
    }

    fn username(&self, id: &str) -> String {
        self.registry
            .user(id)
            .map(|user| user.username.clone())
            .unwrap_or_else(|_| short(id).to_string())
    }
}

fn render_rcv(report: &RunCaseVersionReport) -> String {
    let mut out = vec![
        format!("{} ({})", report.case, short(&report.runcaseversion)),
        format!("{}", report.summary),
        format!("completion: {}", percent(report.completion)),
    ];
    if !report.testers.is_empty() {
        out.push(format!("testers: {}", report.testers.join(", ")));
    }
    out.extend(report.bug_urls.iter().map(|url| format!("bug: {url}")));
    out.join("\n")
}

fn short(id: &str) -> &str {
    id.get(..SHORT_ID).unwrap_or(id)
}

fn percent(fraction: f64) -> String {
    format!("{:.0}%", fraction * 100.0)
}

fn lines(rows: impl Iterator<Item = String>) -> String {
    rows.collect::<Vec<_>>().join("\n")
}
