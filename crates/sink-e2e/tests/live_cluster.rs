//! Live-cluster run.
//!
//! Requires a reachable cluster with the log sink controller and forwarders
//! installed, and credentials from `KUBECONFIG` or `~/.kube/config`.

#![cfg(feature = "cluster")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use serial_test::serial;
use sink_e2e::cluster::{ClusterClient, KubeCluster, LabelSelector};
use sink_e2e::config::Config;
use sink_e2e::runner::{self, RunOutcome};
use tokio_util::sync::CancellationToken;

async fn cluster(config: &Config) -> Arc<KubeCluster> {
    Arc::new(
        KubeCluster::connect(&config.client_settings())
            .await
            .expect("Failed to connect to cluster - check KUBECONFIG"),
    )
}

#[tokio::test]
#[serial]
async fn test_forwarders_visible() {
    let config = Config::from_env().expect("Invalid harness configuration");
    let client = cluster(&config).await;

    let nodes = client.count_nodes().await.expect("Failed to list nodes");
    assert!(nodes > 0, "Cluster reports no nodes");

    let pods = client
        .list_pods(
            &config.forwarder_namespace,
            &LabelSelector::app("fluent-bit-ds"),
        )
        .await
        .expect("Failed to list forwarder pods");
    assert!(!pods.is_empty(), "No forwarder pods found");
}

#[tokio::test]
#[serial]
async fn test_log_delivery() {
    let config = Config::from_env().expect("Invalid harness configuration");
    let client = cluster(&config).await;

    let outcome = runner::run(client, &config, CancellationToken::new())
        .await
        .expect("Run hit a fatal environment error");

    match outcome {
        RunOutcome::Passed(report) => assert!(report.passed()),
        RunOutcome::Failed(e) => panic!("Log delivery failed: {e}"),
        RunOutcome::Interrupted => panic!("Run was interrupted"),
    }
}
