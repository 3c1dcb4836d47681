//! The log delivery scenario.
//!
//! Seven ordered steps check that a line written to stdout by a workload in the
//! fixture namespace reaches a syslog receiver through the log forwarders:
//!
//! 1. `create-log-sink`: point a `LogSink` at the receiver
//! 2. `deploy-receiver`: receiver service and pod
//! 3. `await-receiver-running`
//! 4. `await-forwarders-ready`: one ready forwarder per node
//! 5. `emit-logs`: job writing the test message a fixed number of times
//! 6. `observe-ingestion`: job sampling the receiver's counter
//! 7. `assert-delivery`: the sampled count matches what was emitted
//!
//! Every name and `app` label is prefixed with the run prefix, so concurrent
//! runs never observe each other's workloads.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClient, LabelSelector, PodPhase, PodSnapshot};
use crate::config::Config;
use crate::error::E2eError;
use crate::eventual::{
    ConditionPoller, PollOutcome, PredicateError, TopologyObservation, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT,
};
use crate::observability::metrics;
use crate::provisioner::Provisioner;
use crate::resources::{
    ContainerSpec, LogSinkSpec, PortSpec, ResourceDescriptor, RunPrefix, ServiceSpec,
    WorkloadSpec,
};

/// Port the receiver accepts syslog on.
pub const SYSLOG_PORT: u16 = 24903;

/// Port the receiver serves its counters on.
pub const METRICS_PORT: u16 = 6060;

/// `app` label of the log forwarder pods.
pub const FORWARDER_APP: &str = "fluent-bit-ds";

pub const RECEIVER_IMAGE: &str = "oratos/crosstalk-receiver:v0.3";
pub const EMITTER_IMAGE: &str = "ubuntu:xenial";
pub const OBSERVER_IMAGE: &str = "oratos/ci-base";

/// Scenario steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CreateLogSink,
    DeployReceiver,
    AwaitReceiverRunning,
    AwaitForwardersReady,
    EmitLogs,
    ObserveIngestion,
    AssertDelivery,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::CreateLogSink,
        Step::DeployReceiver,
        Step::AwaitReceiverRunning,
        Step::AwaitForwardersReady,
        Step::EmitLogs,
        Step::ObserveIngestion,
        Step::AssertDelivery,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::CreateLogSink => "create-log-sink",
            Step::DeployReceiver => "deploy-receiver",
            Step::AwaitReceiverRunning => "await-receiver-running",
            Step::AwaitForwardersReady => "await-forwarders-ready",
            Step::EmitLogs => "emit-logs",
            Step::ObserveIngestion => "observe-ingestion",
            Step::AssertDelivery => "assert-delivery",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step that ran to an end, passing or failing. Interrupted steps are not
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: Step,
    pub passed: bool,
    pub elapsed: Duration,
    /// Captured log bytes, when the step read any.
    pub diagnostic: Option<Vec<u8>>,
}

/// Steps a run got through, including the one it failed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub prefix: RunPrefix,
    pub steps: Vec<StepResult>,
}

impl ScenarioReport {
    pub fn new(prefix: RunPrefix) -> Self {
        Self {
            prefix,
            steps: Vec::new(),
        }
    }

    /// True when every step ran and passed.
    pub fn passed(&self) -> bool {
        self.steps.len() == Step::ALL.len() && self.steps.iter().all(|s| s.passed)
    }

    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.passed)
    }

    pub fn step(&self, step: Step) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step == step)
    }

    /// Output captured from the observer, if the run got that far. Present on
    /// a failed delivery assertion too.
    pub fn captured_output(&self) -> Option<&[u8]> {
        self.step(Step::AssertDelivery)
            .and_then(|s| s.diagnostic.as_deref())
    }

    pub fn total_elapsed(&self) -> Duration {
        self.steps.iter().map(|s| s.elapsed).sum()
    }
}

/// Knobs of the scenario. The defaults describe the canonical run: 10 lines
/// half a second apart, sampled 10 times a second apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioSettings {
    pub namespace: String,
    pub forwarder_namespace: String,
    pub prefix: RunPrefix,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Pause before waiting on forwarders, giving the controller time to act
    /// on the new sink.
    pub settle: Duration,
    pub line_count: u32,
    pub emit_interval: Duration,
    pub sample_count: u32,
    pub sample_interval: Duration,
}

impl ScenarioSettings {
    pub fn new(namespace: impl Into<String>, prefix: RunPrefix) -> Self {
        Self {
            namespace: namespace.into(),
            forwarder_namespace: crate::config::DEFAULT_FORWARDER_NAMESPACE.to_string(),
            prefix,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            settle: Duration::from_secs(crate::config::DEFAULT_SETTLE_SECS),
            line_count: 10,
            emit_interval: Duration::from_millis(500),
            sample_count: 10,
            sample_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            forwarder_namespace: config.forwarder_namespace.clone(),
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
            settle: config.settle,
            ..Self::new(config.namespace.clone(), config.run_prefix.clone())
        }
    }

    pub fn sink_name(&self) -> String {
        self.prefix.name("test")
    }

    pub fn receiver_name(&self) -> String {
        self.prefix.name("syslog-receiver")
    }

    pub fn emitter_name(&self) -> String {
        self.prefix.name("log-emitter")
    }

    pub fn observer_name(&self) -> String {
        self.prefix.name("log-observer")
    }

    pub fn message(&self) -> String {
        self.prefix.name("test-log-message")
    }

    /// In-cluster DNS name of the receiver service.
    pub fn receiver_host(&self) -> String {
        format!("{}.{}", self.receiver_name(), self.namespace)
    }

    /// Line the observer prints once every emitted line has arrived.
    pub fn expected_output(&self) -> String {
        format!("Logs Received: {}", self.line_count)
    }

    pub fn log_sink(&self) -> ResourceDescriptor {
        ResourceDescriptor::new(
            self.sink_name(),
            WorkloadSpec::LogSink(LogSinkSpec {
                sink_type: "syslog".to_string(),
                host: self.receiver_host(),
                port: SYSLOG_PORT,
            }),
        )
    }

    pub fn receiver_service(&self) -> ResourceDescriptor {
        let name = self.receiver_name();
        ResourceDescriptor::new(
            name.clone(),
            WorkloadSpec::Service(ServiceSpec {
                ports: vec![
                    PortSpec::new("syslog", SYSLOG_PORT),
                    PortSpec::new("metrics", METRICS_PORT),
                ],
                selector: [("app".to_string(), name.clone())].into_iter().collect(),
            }),
        )
        .with_label("app", name)
    }

    pub fn receiver_pod(&self) -> ResourceDescriptor {
        let name = self.receiver_name();
        ResourceDescriptor::new(
            name.clone(),
            WorkloadSpec::Pod(
                ContainerSpec::new("syslog-receiver", RECEIVER_IMAGE)
                    .with_env("SYSLOG_PORT", SYSLOG_PORT.to_string())
                    .with_env("METRICS_PORT", METRICS_PORT.to_string())
                    .with_env("MESSAGE", self.message())
                    .with_port("syslog-port", SYSLOG_PORT)
                    .with_port("metrics-port", METRICS_PORT),
            ),
        )
        .with_label("app", name)
    }

    pub fn emitter_job(&self) -> ResourceDescriptor {
        let name = self.emitter_name();
        let script = format!(
            "for _ in {{1..{}}}; do echo {}; sleep {}; done",
            self.line_count,
            self.message(),
            seconds(self.emit_interval),
        );
        ResourceDescriptor::new(
            name.clone(),
            WorkloadSpec::Job(
                ContainerSpec::new("log-emitter", EMITTER_IMAGE)
                    .with_command(["bash".to_string(), "-c".to_string(), script]),
            ),
        )
        .with_label("app", name)
    }

    pub fn observer_job(&self) -> ResourceDescriptor {
        let name = self.observer_name();
        let script = format!(
            "for _ in {{1..{}}}; do \
             LOG_COUNT=$(curl -s {}:{}/metrics | jq -r '.cluster'); \
             echo \"Logs Received: $LOG_COUNT\"; \
             sleep {}; \
             done",
            self.sample_count,
            self.receiver_host(),
            METRICS_PORT,
            seconds(self.sample_interval),
        );
        ResourceDescriptor::new(
            name.clone(),
            WorkloadSpec::Job(
                ContainerSpec::new("log-observer", OBSERVER_IMAGE)
                    .with_command(["bash".to_string(), "-c".to_string(), script]),
            ),
        )
        .with_label("app", name)
    }
}

/// `0.5`, `1`, `2.25`: the form `sleep` accepts.
fn seconds(duration: Duration) -> String {
    duration.as_secs_f64().to_string()
}

/// Condition: some pod labeled `app=<app>` is in `phase`. Yields its name.
///
/// Any other phase, including `Failed`, is pending: the job controller may
/// still start a replacement pod. A pod without the expected label means the
/// snapshot does not match its selector, which is an error.
pub fn pod_in_phase(
    app: &str,
    phase: PodPhase,
) -> impl FnMut(&[PodSnapshot]) -> Result<PollOutcome<String>, PredicateError> + '_ {
    move |pods| {
        if let Some(stray) = pods.iter().find(|p| p.label("app") != Some(app)) {
            return Err(PredicateError(format!(
                "pod {:?} does not carry app={app}",
                stray.name
            )));
        }
        Ok(pods
            .iter()
            .find(|p| p.phase == phase)
            .map_or(PollOutcome::Pending, |p| {
                PollOutcome::Satisfied(p.name.clone())
            }))
    }
}

/// Condition: as many `app=<app>` pods are fully ready as there are nodes.
/// Yields the ready count.
///
/// A cluster reporting no nodes is pending rather than trivially satisfied.
pub fn forwarders_ready(
    app: &str,
) -> impl FnMut(&TopologyObservation) -> Result<PollOutcome<usize>, PredicateError> + '_ {
    move |observation| {
        let ready = observation
            .pods
            .iter()
            .filter(|p| p.label("app") == Some(app) && p.is_ready())
            .count();
        if observation.node_count > 0 && ready == observation.node_count {
            Ok(PollOutcome::Satisfied(ready))
        } else {
            Ok(PollOutcome::Pending)
        }
    }
}

/// Check captured observer output for `expected`.
///
/// # Errors
///
/// `E2eError::Assertion` carrying the full output when `expected` is absent.
pub fn assert_delivery(output: &[u8], expected: &str) -> Result<(), E2eError> {
    let text = String::from_utf8_lossy(output);
    if text.contains(expected) {
        Ok(())
    } else {
        Err(E2eError::Assertion {
            step: Step::AssertDelivery.name(),
            expected: expected.to_string(),
            output: text.into_owned(),
        })
    }
}

/// Drives the scenario against a cluster.
pub struct LogDeliveryScenario<C: ?Sized> {
    client: Arc<C>,
    settings: ScenarioSettings,
    provisioner: Provisioner<C>,
    poller: ConditionPoller<C>,
}

impl<C: ClusterClient + ?Sized> LogDeliveryScenario<C> {
    pub fn new(client: Arc<C>, settings: ScenarioSettings) -> Self {
        let provisioner = Provisioner::new(Arc::clone(&client), settings.namespace.clone());
        let poller = ConditionPoller::new(Arc::clone(&client), settings.poll_interval);
        Self {
            client,
            settings,
            provisioner,
            poller,
        }
    }

    pub fn settings(&self) -> &ScenarioSettings {
        &self.settings
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// Once `cancel` fires, the current step is abandoned and the result is
    /// `E2eError::Interrupted`, whatever the step was doing at the time.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ScenarioReport, E2eError> {
        let mut report = ScenarioReport::new(self.settings.prefix.clone());
        self.run_recorded(cancel, &mut report).await?;
        Ok(report)
    }

    /// Like [`run`](Self::run), but leaves the steps in `report` whether the
    /// run passes or not. A failed step is the last entry, with `passed` false.
    pub async fn run_recorded(
        &self,
        cancel: &CancellationToken,
        report: &mut ScenarioReport,
    ) -> Result<(), E2eError> {
        info!(
            namespace = %self.settings.namespace,
            prefix = %self.settings.prefix,
            "Starting log delivery scenario"
        );

        run_step(report, cancel, Step::CreateLogSink, async {
            self.provisioner.create(&self.settings.log_sink()).await?;
            Ok::<_, E2eError>(())
        })
        .await?;

        run_step(report, cancel, Step::DeployReceiver, async {
            self.provisioner
                .create(&self.settings.receiver_service())
                .await?;
            self.provisioner.create(&self.settings.receiver_pod()).await?;
            Ok::<_, E2eError>(())
        })
        .await?;

        run_step(report, cancel, Step::AwaitReceiverRunning, async {
            let app = self.settings.receiver_name();
            self.await_phase(
                Step::AwaitReceiverRunning,
                "receiver-running",
                &app,
                PodPhase::Running,
            )
            .await
        })
        .await?;

        run_step(report, cancel, Step::AwaitForwardersReady, async {
            tokio::time::sleep(self.settings.settle).await;
            let selector = LabelSelector::app(FORWARDER_APP);
            let ready = self
                .poller
                .wait_for_topology(
                    &self.settings.forwarder_namespace,
                    &selector,
                    "forwarders-ready",
                    forwarders_ready(FORWARDER_APP),
                    self.settings.poll_timeout,
                )
                .await
                .map_err(|e| E2eError::from_poll(Step::AwaitForwardersReady.name(), e))?;
            debug!(ready, "Forwarders ready on every node");
            Ok::<_, E2eError>(())
        })
        .await?;

        run_step(report, cancel, Step::EmitLogs, async {
            self.provisioner.create(&self.settings.emitter_job()).await?;
            let app = self.settings.emitter_name();
            self.await_phase(Step::EmitLogs, "emitter-succeeded", &app, PodPhase::Succeeded)
                .await
        })
        .await?;

        let observer_pod = run_step(report, cancel, Step::ObserveIngestion, async {
            self.provisioner.create(&self.settings.observer_job()).await?;
            let app = self.settings.observer_name();
            self.await_phase(
                Step::ObserveIngestion,
                "observer-succeeded",
                &app,
                PodPhase::Succeeded,
            )
            .await
        })
        .await?;

        let output = run_step(report, cancel, Step::AssertDelivery, async {
            let output = self
                .client
                .pod_logs(&self.settings.namespace, &observer_pod)
                .await
                .map_err(|source| E2eError::Cluster {
                    step: Step::AssertDelivery.name(),
                    operation: "pod_logs",
                    source,
                })?;
            assert_delivery(&output, &self.settings.expected_output())?;
            Ok::<_, E2eError>(output)
        })
        .await?;

        if let Some(result) = report.steps.last_mut() {
            result.diagnostic = Some(output);
        }

        info!(
            elapsed_ms = report.total_elapsed().as_millis() as u64,
            "Log delivery scenario passed"
        );
        Ok(())
    }

    async fn await_phase(
        &self,
        step: Step,
        condition_name: &'static str,
        app: &str,
        phase: PodPhase,
    ) -> Result<String, E2eError> {
        self.poller
            .wait_for(
                &self.settings.namespace,
                &LabelSelector::app(app),
                condition_name,
                pod_in_phase(app, phase),
                self.settings.poll_timeout,
            )
            .await
            .map_err(|e| E2eError::from_poll(step.name(), e))
    }
}

/// Run one step under `cancel` and record how it ended in `report`.
///
/// Errors that name no step are attributed to `step`.
async fn run_step<T, F>(
    report: &mut ScenarioReport,
    cancel: &CancellationToken,
    step: Step,
    work: F,
) -> Result<T, E2eError>
where
    F: Future<Output = Result<T, E2eError>>,
{
    if cancel.is_cancelled() {
        metrics::record_step(step.name(), "interrupted", Duration::ZERO);
        return Err(E2eError::Interrupted { step: step.name() });
    }

    info!(step = step.name(), "Starting step");
    let start = Instant::now();

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(E2eError::Interrupted { step: step.name() }),
        result = work => result,
    };

    // A step racing the teardown sees its objects vanish; report the interrupt
    // instead of that failure.
    let result = match result {
        Err(e) if cancel.is_cancelled() && !e.is_interrupted() => {
            debug!(step = step.name(), error = %e, "Step failed after interrupt");
            Err(E2eError::Interrupted { step: step.name() })
        }
        Err(e) => Err(e.at_step(step.name())),
        ok => ok,
    };

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            info!(
                step = step.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Step passed"
            );
            metrics::record_step(step.name(), "passed", elapsed);
            report.steps.push(StepResult {
                step,
                passed: true,
                elapsed,
                diagnostic: None,
            });
        }
        Err(e) if e.is_interrupted() => {
            warn!(step = step.name(), "Step interrupted");
            metrics::record_step(step.name(), "interrupted", elapsed);
        }
        Err(e) => {
            warn!(
                step = step.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "Step failed"
            );
            metrics::record_step(step.name(), "failed", elapsed);
            let diagnostic = match e {
                E2eError::Assertion { output, .. } => Some(output.clone().into_bytes()),
                _ => None,
            };
            report.steps.push(StepResult {
                step,
                passed: false,
                elapsed,
                diagnostic,
            });
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cluster::mock::{job_pod_name, MockCluster};
    use crate::cluster::ClusterError;
    use crate::resources::ResourceKind;

    fn settings() -> ScenarioSettings {
        ScenarioSettings::new("observability-tests", RunPrefix::parse("run-").unwrap())
    }

    fn forwarder(name: &str, ready: bool) -> PodSnapshot {
        PodSnapshot::new(name, PodPhase::Running)
            .with_label("app", FORWARDER_APP)
            .with_container("fluent-bit", ready)
    }

    #[test]
    fn test_step_names_in_order() {
        let names: Vec<&str> = Step::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "create-log-sink",
                "deploy-receiver",
                "await-receiver-running",
                "await-forwarders-ready",
                "emit-logs",
                "observe-ingestion",
                "assert-delivery",
            ]
        );
    }

    #[test]
    fn test_descriptors_are_prefixed() {
        let settings = settings();

        let sink = settings.log_sink();
        assert_eq!(sink.name, "run-test");
        match &sink.spec {
            WorkloadSpec::LogSink(spec) => {
                assert_eq!(spec.sink_type, "syslog");
                assert_eq!(spec.host, "run-syslog-receiver.observability-tests");
                assert_eq!(spec.port, 24903);
            }
            other => panic!("unexpected spec: {other:?}"),
        }

        let service = settings.receiver_service();
        assert_eq!(service.name, "run-syslog-receiver");
        assert_eq!(
            service.labels.get("app").map(String::as_str),
            Some("run-syslog-receiver")
        );

        let pod = settings.receiver_pod();
        match &pod.spec {
            WorkloadSpec::Pod(container) => {
                assert_eq!(container.image, RECEIVER_IMAGE);
                assert!(container
                    .env
                    .iter()
                    .any(|v| v.name == "MESSAGE" && v.value == "run-test-log-message"));
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn test_job_scripts() {
        let settings = settings();

        let emitter = settings.emitter_job();
        let WorkloadSpec::Job(container) = &emitter.spec else {
            panic!("emitter is not a job");
        };
        assert_eq!(
            container.command.last().unwrap(),
            "for _ in {1..10}; do echo run-test-log-message; sleep 0.5; done"
        );

        let observer = settings.observer_job();
        let WorkloadSpec::Job(container) = &observer.spec else {
            panic!("observer is not a job");
        };
        let script = container.command.last().unwrap();
        assert!(script.starts_with("for _ in {1..10}; do"));
        assert!(script.contains("curl -s run-syslog-receiver.observability-tests:6060/metrics"));
        assert!(script.contains("jq -r '.cluster'"));
        assert!(script.contains("sleep 1;"));
        assert_eq!(settings.expected_output(), "Logs Received: 10");
    }

    #[test]
    fn test_pod_in_phase() {
        let mut condition = pod_in_phase("app-a", PodPhase::Succeeded);

        assert_eq!(condition(&[]).unwrap(), PollOutcome::Pending);

        let failed = PodSnapshot::new("a-1", PodPhase::Failed).with_label("app", "app-a");
        assert_eq!(condition(&[failed.clone()]).unwrap(), PollOutcome::Pending);

        let done = PodSnapshot::new("a-2", PodPhase::Succeeded).with_label("app", "app-a");
        assert_eq!(
            condition(&[failed, done]).unwrap(),
            PollOutcome::Satisfied("a-2".to_string())
        );

        let stray = PodSnapshot::new("b-1", PodPhase::Succeeded).with_label("app", "app-b");
        assert!(condition(&[stray]).is_err());
    }

    #[test]
    fn test_forwarders_ready_matches_node_count() {
        let mut condition = forwarders_ready(FORWARDER_APP);

        let two_of_three = TopologyObservation {
            pods: vec![
                forwarder("fb-1", true),
                forwarder("fb-2", true),
                forwarder("fb-3", false),
            ],
            node_count: 3,
        };
        assert_eq!(condition(&two_of_three).unwrap(), PollOutcome::Pending);

        let all_ready = TopologyObservation {
            pods: vec![
                forwarder("fb-1", true),
                forwarder("fb-2", true),
                forwarder("fb-3", true),
            ],
            node_count: 3,
        };
        assert_eq!(condition(&all_ready).unwrap(), PollOutcome::Satisfied(3));
    }

    #[test]
    fn test_forwarders_without_container_status_are_not_ready() {
        let mut condition = forwarders_ready(FORWARDER_APP);
        let observation = TopologyObservation {
            pods: vec![
                PodSnapshot::new("fb-1", PodPhase::Running).with_label("app", FORWARDER_APP)
            ],
            node_count: 1,
        };
        assert_eq!(condition(&observation).unwrap(), PollOutcome::Pending);

        let empty = TopologyObservation {
            pods: Vec::new(),
            node_count: 0,
        };
        assert_eq!(condition(&empty).unwrap(), PollOutcome::Pending);
    }

    #[test]
    fn test_assert_delivery() {
        let output = b"Logs Received: 3\nLogs Received: 10\n";
        assert!(assert_delivery(output, "Logs Received: 10").is_ok());

        let err = assert_delivery(b"Logs Received: 7\n", "Logs Received: 10").unwrap_err();
        assert!(err.to_string().contains("Logs Received: 7"));
        assert_eq!(err.step(), Some("assert-delivery"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_passes_and_captures_output() {
        let settings = settings();
        let cluster = Arc::new(
            MockCluster::new()
                .with_namespace("observability-tests")
                .with_nodes(2)
                .with_ready_pods("knative-observability", FORWARDER_APP, 2)
                .with_pod_lag(2)
                .with_job_logs(&settings.observer_name(), "Logs Received: 10\n"),
        );

        let scenario = LogDeliveryScenario::new(Arc::clone(&cluster), settings.clone());
        let report = scenario.run(&CancellationToken::new()).await.unwrap();

        assert!(report.passed());
        assert_eq!(report.captured_output(), Some(&b"Logs Received: 10\n"[..]));
        assert!(cluster
            .object(
                "observability-tests",
                ResourceKind::LogSink,
                &settings.sink_name()
            )
            .is_some());
        assert_eq!(cluster.objects_in("observability-tests").len(), 5);
        assert!(cluster.node_calls() >= 1);
        assert_eq!(
            job_pod_name(&settings.observer_name()),
            "run-log-observer-pod"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_is_interrupted() {
        let cluster = Arc::new(MockCluster::new().with_namespace("observability-tests"));
        let scenario = LogDeliveryScenario::new(Arc::clone(&cluster), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scenario.run(&cancel).await.unwrap_err();
        assert!(matches!(err, E2eError::Interrupted { step: "create-log-sink" }));
        assert_eq!(cluster.create_calls(), 0);
    }
}
