//! Log delivery harness binary.
//!
//! # Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (and the Prometheus recorder when enabled)
//! 3. Connect to the cluster
//! 4. Run the scenario, with Ctrl+C / SIGTERM cancelling it
//! 5. Exit with 0 (passed), 1 (failed), 2 (fatal) or 130 (interrupted)

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sink_e2e::cluster::KubeCluster;
use sink_e2e::config::Config;
use sink_e2e::runner::{self, EXIT_FATAL};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!(error = %e, "Failed to load configuration");
            return EXIT_FATAL;
        }
    };

    init_tracing(config.verbose);

    info!(
        namespace = %config.namespace,
        forwarder_namespace = %config.forwarder_namespace,
        prefix = %config.run_prefix,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        poll_timeout_secs = config.poll_timeout.as_secs(),
        teardown_policy = ?config.teardown_policy,
        "Configuration loaded successfully"
    );

    let prometheus = if config.emit_metrics {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to install Prometheus metrics recorder");
                None
            }
        }
    } else {
        None
    };

    let client = match KubeCluster::connect(&config.client_settings()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to connect to cluster");
            return EXIT_FATAL;
        }
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, cancelling run");
        signal_token.cancel();
    });

    let result = runner::run(client, &config, cancel).await;
    if let Err(e) = &result {
        error!(error = %e, "Run failed");
    }
    let code = runner::exit_code(&result);
    info!(exit_code = code, "Run finished");

    if let Some(handle) = prometheus {
        print_metrics(&handle);
    }
    code
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "sink_e2e=debug"
    } else {
        "sink_e2e=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[allow(clippy::print_stdout)]
fn print_metrics(handle: &PrometheusHandle) {
    println!("{}", handle.render());
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them an interrupted
/// run would leave its namespace behind.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
