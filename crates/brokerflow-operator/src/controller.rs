//! AmqpSource controller
//!
//! Wires the reconciliation engine into the Kubernetes controller runtime:
//! watches AmqpSource resources and the Deployments they own, runs the
//! engine, persists finalizer and status changes, and requeues on error.
//! Reconciles for a given resource key are serialized by the runtime;
//! distinct resources reconcile in parallel. Write conflicts (409) come back
//! as retryable Kubernetes errors and are retried with backoff.

use crate::crd::AmqpSource;
use crate::error::{OperatorError, Result};
use crate::reconciler::Reconciler;
use crate::resolver::KubeSinkResolver;
use crate::workloads::KubeWorkloadStore;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Default requeue interval for successful reconciliations
const DEFAULT_REQUEUE_SECONDS: u64 = 120;

/// Requeue interval for errors that carry no suggested delay
const ERROR_REQUEUE_SECONDS: u64 = 30;

/// Context passed to the controller
pub struct ControllerContext {
    /// Kubernetes client
    pub client: Client,
    /// The per-resource reconciliation engine
    pub reconciler: Reconciler,
    /// Metrics recorder
    pub metrics: Option<ControllerMetrics>,
}

/// Metrics for the AmqpSource controller
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Counter for reconciliation attempts
    pub reconciliations: metrics::Counter,
    /// Counter for reconciliation errors
    pub errors: metrics::Counter,
    /// Histogram for reconciliation duration
    pub duration: metrics::Histogram,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self {
            reconciliations: metrics::counter!("brokerflow_amqpsource_reconciliations_total"),
            errors: metrics::counter!("brokerflow_amqpsource_reconciliation_errors_total"),
            duration: metrics::histogram!("brokerflow_amqpsource_reconciliation_duration_seconds"),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the AmqpSource controller and block until the watch stream ends.
pub async fn run_controller(
    client: Client,
    adapter_image: String,
    namespace: Option<String>,
) -> Result<()> {
    let sources: Api<AmqpSource> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let deployments = match &namespace {
        Some(ns) => Api::<Deployment>::namespaced(client.clone(), ns),
        None => Api::<Deployment>::all(client.clone()),
    };

    let reconciler = Reconciler::new(
        Arc::new(KubeSinkResolver::new(client.clone())),
        Arc::new(KubeWorkloadStore::new(client.clone())),
        adapter_image,
    );

    let ctx = Arc::new(ControllerContext {
        client: client.clone(),
        reconciler,
        metrics: Some(ControllerMetrics::new()),
    });

    info!(
        namespace = namespace.as_deref().unwrap_or("all"),
        "Starting AmqpSource controller"
    );

    Controller::new(sources, Config::default())
        .owns(deployments, Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(
                        name = obj.name,
                        namespace = obj.namespace,
                        ?action,
                        "Reconciliation completed"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation failed");
                }
            }
        })
        .await;

    Ok(())
}

/// Run one engine pass and persist what changed.
#[instrument(skip(source, ctx), fields(name = %source.name_any(), namespace = source.namespace()))]
async fn reconcile(source: Arc<AmqpSource>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let start = std::time::Instant::now();

    if let Some(ref metrics) = ctx.metrics {
        metrics.reconciliations.increment(1);
    }

    let mut desired = (*source).clone();
    let result = ctx.reconciler.reconcile(&mut desired).await;

    // Persist even when the engine erred: a failed resolution still updated
    // the SinkResolved condition.
    persist(&ctx.client, &source, &desired).await?;

    if let Some(ref metrics) = ctx.metrics {
        metrics.duration.record(start.elapsed().as_secs_f64());
        if result.is_err() {
            metrics.errors.increment(1);
        }
    }

    result.map(|()| Action::requeue(Duration::from_secs(DEFAULT_REQUEUE_SECONDS)))
}

/// Patch finalizers and status back to the API server, skipping whatever is
/// unchanged. On deletion the status patch goes first so the finalizer
/// release is the last write that touches the object.
async fn persist(client: &Client, observed: &AmqpSource, desired: &AmqpSource) -> Result<()> {
    let namespace = observed.namespace().unwrap_or_else(|| "default".to_string());
    let name = observed.name_any();
    let api: Api<AmqpSource> = Api::namespaced(client.clone(), &namespace);

    let finalizers_changed = observed.metadata.finalizers != desired.metadata.finalizers;
    let status_changed = observed.status != desired.status;
    let deleting = observed.metadata.deletion_timestamp.is_some();

    if finalizers_changed && !deleting {
        patch_finalizers(&api, &name, desired).await?;
    }
    if status_changed {
        let patch = serde_json::json!({ "status": desired.status });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
    }
    if finalizers_changed && deleting {
        patch_finalizers(&api, &name, desired).await?;
    }

    Ok(())
}

async fn patch_finalizers(api: &Api<AmqpSource>, name: &str, desired: &AmqpSource) -> Result<()> {
    let patch = serde_json::json!({
        "metadata": { "finalizers": desired.metadata.finalizers }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Requeue with the error's suggested delay. Non-retryable errors still get
/// a long requeue rather than being dropped from the queue entirely.
fn error_policy(
    _source: Arc<AmqpSource>,
    error: &OperatorError,
    _ctx: Arc<ControllerContext>,
) -> Action {
    warn!(error = %error, "Reconciliation error, will retry");

    let delay = error
        .requeue_delay()
        .unwrap_or_else(|| Duration::from_secs(ERROR_REQUEUE_SECONDS));

    Action::requeue(delay)
}
