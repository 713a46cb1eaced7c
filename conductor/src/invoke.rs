//! One command invocation: load the snapshot, execute, save if anything changed.

use crate::cli::Cli;
use crate::commands::{CommandResult, Outcome, Session};
use crate::telemetry::EventTracer;
use model::prelude::*;
use std::sync::Arc;
use tracing::info;

pub async fn invoke<S>(store: &S, config: &ConductorConfig, cli: Cli) -> CommandResult<Outcome>
where
    S: SnapshotStore + ?Sized,
{
    let Cli { user, command, .. } = cli;
    let mut registry = store.load_registry().await?;
    registry.subscribe(Arc::new(EventTracer));

    let outcome = Session::new(&mut registry, config, user).execute(command)?;
    if outcome.changed {
        store.save_registry(&registry).await?;
        info!(backend = store.backend_name(), "registry saved");
    }
    Ok(outcome)
}
