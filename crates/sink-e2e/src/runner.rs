//! One complete harness run: fixture, interrupt watcher, scenario, teardown.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cluster::ClusterClient;
use crate::config::Config;
use crate::error::E2eError;
use crate::fixture::NamespaceFixture;
use crate::scenario::{LogDeliveryScenario, ScenarioReport, ScenarioSettings};

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
/// Setup, teardown or configuration failed; the environment needs attention.
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// How the scenario ended.
#[derive(Debug)]
pub enum RunOutcome {
    Passed(ScenarioReport),
    Failed(E2eError),
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Passed(_) => EXIT_PASSED,
            RunOutcome::Failed(e) if e.is_fatal_to_process() => EXIT_FATAL,
            RunOutcome::Failed(_) => EXIT_FAILED,
            RunOutcome::Interrupted => EXIT_INTERRUPTED,
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, RunOutcome::Passed(_))
    }
}

/// Exit code for the result of [`run`]. Errors outside the scenario are fatal.
pub fn exit_code(result: &Result<RunOutcome, E2eError>) -> i32 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(_) => EXIT_FATAL,
    }
}

/// Run the log delivery scenario in a fresh fixture namespace.
///
/// Cancelling `cancel` deletes the namespace right away and turns the run into
/// [`RunOutcome::Interrupted`].
///
/// # Errors
///
/// Setup and teardown failures. Scenario failures are reported as
/// [`RunOutcome::Failed`].
pub async fn run<C>(
    client: Arc<C>,
    config: &Config,
    cancel: CancellationToken,
) -> Result<RunOutcome, E2eError>
where
    C: ClusterClient + ?Sized + 'static,
{
    let fixture =
        NamespaceFixture::setup(Arc::clone(&client), &config.namespace, config.teardown_policy)
            .await?;

    if cancel.is_cancelled() {
        warn!("Interrupted during setup");
        let outcome = RunOutcome::Interrupted;
        fixture.finish(&outcome).await?;
        return Ok(outcome);
    }

    let watcher = fixture.watch_interrupt(cancel.clone());

    let scenario = LogDeliveryScenario::new(client, ScenarioSettings::from_config(config));
    let outcome = match scenario.run(&cancel).await {
        Ok(report) => {
            info!(
                prefix = %report.prefix,
                elapsed_ms = report.total_elapsed().as_millis() as u64,
                "Scenario passed"
            );
            RunOutcome::Passed(report)
        }
        Err(e) if e.is_interrupted() => {
            warn!(step = e.step().unwrap_or("unknown"), "Scenario interrupted");
            RunOutcome::Interrupted
        }
        Err(e) => {
            error!(step = e.step().unwrap_or("setup"), error = %e, "Scenario failed");
            RunOutcome::Failed(e)
        }
    };

    if matches!(outcome, RunOutcome::Interrupted) {
        // The watcher is already tearing down; wait so finish sees its result.
        match watcher.await {
            Ok(Err(e)) => warn!(error = %e, "Interrupt teardown failed, retrying"),
            Err(e) => warn!(error = %e, "Interrupt watcher did not complete"),
            Ok(Ok(())) => {}
        }
    } else {
        watcher.abort();
    }

    fixture.finish(&outcome).await?;
    Ok(outcome)
}
