//! Full runs through the runner: namespace lifecycle, teardown policy and
//! exit codes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use sink_e2e::cluster::mock::MockCluster;
use sink_e2e::cluster::ClusterError;
use sink_e2e::config::Config;
use sink_e2e::error::E2eError;
use sink_e2e::resources::ResourceKind;
use sink_e2e::runner::{self, RunOutcome};
use sink_e2e::scenario::FORWARDER_APP;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "observability-tests";
const OBSERVER_JOB: &str = "life-log-observer";

fn config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("E2E_RUN_PREFIX", "life-"),
        ("E2E_POLL_TIMEOUT_SECS", "30"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert((*k).to_string(), (*v).to_string());
    }
    Config::from_vars(&vars).unwrap()
}

fn cluster(observer_output: &str) -> Arc<MockCluster> {
    Arc::new(
        MockCluster::new()
            .with_nodes(1)
            .with_ready_pods("knative-observability", FORWARDER_APP, 1)
            .with_pod_lag(1)
            .with_job_logs(OBSERVER_JOB, observer_output.to_string()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_passing_run_creates_and_deletes_namespace() {
    let cluster = cluster("Logs Received: 10\n");

    let result = runner::run(Arc::clone(&cluster), &config(&[]), CancellationToken::new()).await;

    let outcome = result.as_ref().unwrap();
    assert!(outcome.is_passed());
    assert_eq!(runner::exit_code(&result), 0);
    assert_eq!(cluster.create_namespace_calls(), 1);
    assert_eq!(cluster.delete_namespace_calls(), 1);
    assert!(!cluster.namespace_exists(NAMESPACE));
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_retains_namespace_by_default() {
    let cluster = cluster("Logs Received: 9\n");

    let result = runner::run(Arc::clone(&cluster), &config(&[]), CancellationToken::new()).await;

    assert!(matches!(
        result,
        Ok(RunOutcome::Failed(E2eError::Assertion { .. }))
    ));
    assert_eq!(runner::exit_code(&result), 1);
    assert!(cluster.namespace_exists(NAMESPACE));
    assert_eq!(cluster.delete_namespace_calls(), 0);
    assert!(cluster.object(NAMESPACE, ResourceKind::Job, OBSERVER_JOB).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_deletes_namespace_when_configured() {
    let cluster = cluster("Logs Received: 9\n");
    let config = config(&[("E2E_TEARDOWN_ON_FAILURE", "true")]);

    let result = runner::run(Arc::clone(&cluster), &config, CancellationToken::new()).await;

    assert_eq!(runner::exit_code(&result), 1);
    assert!(!cluster.namespace_exists(NAMESPACE));
}

#[tokio::test(start_paused = true)]
async fn test_leftover_namespace_is_adopted() {
    let cluster = Arc::new(
        MockCluster::new()
            .with_namespace(NAMESPACE)
            .with_ready_pods("knative-observability", FORWARDER_APP, 1)
            .with_job_logs(OBSERVER_JOB, "Logs Received: 10\n"),
    );

    let result = runner::run(Arc::clone(&cluster), &config(&[]), CancellationToken::new()).await;

    assert_eq!(runner::exit_code(&result), 0);
    assert!(!cluster.namespace_exists(NAMESPACE));
}

#[tokio::test(start_paused = true)]
async fn test_namespace_setup_failure_is_fatal() {
    let cluster = Arc::new(MockCluster::new().fail_create_namespace(ClusterError::Api {
        code: 403,
        message: "namespaces is forbidden".to_string(),
    }));

    let result = runner::run(Arc::clone(&cluster), &config(&[]), CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(E2eError::Provisioning {
            kind: "Namespace",
            ..
        })
    ));
    assert_eq!(runner::exit_code(&result), 2);
    assert_eq!(cluster.create_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_failure_is_fatal() {
    let cluster = Arc::new(
        MockCluster::new()
            .with_ready_pods("knative-observability", FORWARDER_APP, 1)
            .with_job_logs(OBSERVER_JOB, "Logs Received: 10\n")
            .fail_delete_namespace(ClusterError::Transport("connection reset".to_string())),
    );

    let result = runner::run(Arc::clone(&cluster), &config(&[]), CancellationToken::new()).await;

    let err = result.as_ref().unwrap_err();
    assert!(err.is_fatal_to_process());
    assert!(matches!(err, E2eError::Teardown { .. }));
    assert_eq!(runner::exit_code(&result), 2);
}
