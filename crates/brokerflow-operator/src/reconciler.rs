//! Reconciliation engine for AmqpSource resources
//!
//! The engine drives a single resource toward desired state: resolve the
//! sink, ensure exactly one adapter workload, track conditions, and release
//! the finalizer on deletion. It mutates the resource in place and leaves
//! persistence to the controller, so a pass is re-runnable and unit-testable
//! without an API server.
//!
//! Reconciles for a given resource key are serialized by the controller
//! runtime; the only cross-reconcile race this engine has to survive is a
//! workload create racing an identical create, which the store surfaces as
//! `AlreadyExists`.

use crate::crd::{AmqpSource, AmqpSourceStatus, SinkReference, SourcePhase};
use crate::error::{OperatorError, Result};
use crate::resources;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Finalizer gating deletion until this controller has cleaned up.
pub const FINALIZER: &str = "brokerflow.dev/amqpsource-finalizer";

/// Resolves a sink reference to a concrete delivery URI.
#[async_trait]
pub trait SinkResolver: Send + Sync {
    async fn resolve(&self, namespace: &str, sink: &SinkReference) -> Result<String>;
}

/// Lists and creates adapter workloads in the external store.
///
/// `create` must surface a name conflict as [`OperatorError::AlreadyExists`]
/// so the engine can re-list and reuse the winner of a create race.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<Deployment>>;
    async fn create(&self, namespace: &str, workload: Deployment) -> Result<Deployment>;
}

/// Per-resource reconciliation state machine.
pub struct Reconciler {
    resolver: Arc<dyn SinkResolver>,
    store: Arc<dyn WorkloadStore>,
    adapter_image: String,
}

fn status_mut(source: &mut AmqpSource) -> &mut AmqpSourceStatus {
    source.status.get_or_insert_with(Default::default)
}

/// Insert this controller's finalizer once.
pub fn add_finalizer(source: &mut AmqpSource) {
    let finalizers = source.metadata.finalizers.get_or_insert_with(Vec::new);
    if !finalizers.iter().any(|f| f == FINALIZER) {
        finalizers.push(FINALIZER.to_string());
    }
}

/// Drop this controller's finalizer, leaving any others in place.
pub fn remove_finalizer(source: &mut AmqpSource) {
    if let Some(finalizers) = source.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != FINALIZER);
    }
}

impl Reconciler {
    pub fn new(
        resolver: Arc<dyn SinkResolver>,
        store: Arc<dyn WorkloadStore>,
        adapter_image: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            store,
            adapter_image: adapter_image.into(),
        }
    }

    /// One idempotent convergence pass. On error the resource still carries
    /// the partial status update (e.g. `SinkResolved=False`) for the caller
    /// to persist before requeueing.
    #[instrument(skip(self, source), fields(name = %source.name_any(), namespace = source.namespace()))]
    pub async fn reconcile(&self, source: &mut AmqpSource) -> Result<()> {
        let namespace = source.namespace().unwrap_or_else(|| "default".to_string());

        // Deletion: nothing external to deregister, the adapter workload is
        // garbage collected through its owner reference. Release the
        // finalizer and stop.
        if source.metadata.deletion_timestamp.is_some() {
            remove_finalizer(source);
            status_mut(source).phase = SourcePhase::Terminating;
            info!("deletion requested, finalizer released");
            return Ok(());
        }

        add_finalizer(source);
        let generation = source.metadata.generation.unwrap_or(0);
        {
            let status = status_mut(source);
            status.initialize_conditions();
            status.observed_generation = generation;
        }

        // Malformed spec is a defect in whatever created the resource, not a
        // transient condition: record it and do not retry.
        if let Err(errors) = source.spec.validate() {
            warn!(errors = %errors, "invalid spec, not retrying");
            status_mut(source).mark_sink_not_resolved("InvalidSpec", &errors.to_string());
            return Ok(());
        }

        let sink_uri = match self.resolver.resolve(&namespace, &source.spec.sink).await {
            Ok(uri) => uri,
            Err(e) => {
                status_mut(source).mark_sink_not_resolved("ResolveFailed", &e.to_string());
                return Err(e);
            }
        };
        status_mut(source).mark_sink_resolved(&sink_uri);

        let workload = self.ensure_workload(&namespace, source, &sink_uri).await?;
        status_mut(source).mark_deployed();
        debug!(workload = workload.name_any(), "adapter workload ensured");

        Ok(())
    }

    /// Reuse the owned workload if one exists, create it otherwise. The
    /// existing workload is reused unconditionally: its config is fixed at
    /// creation and not diffed against the current spec.
    async fn ensure_workload(
        &self,
        namespace: &str,
        source: &AmqpSource,
        sink_uri: &str,
    ) -> Result<Deployment> {
        let selector = resources::label_selector(source);

        if let Some(existing) = self.find_owned(namespace, source, &selector).await? {
            debug!(workload = existing.name_any(), "reusing existing adapter workload");
            return Ok(existing);
        }

        let desired = resources::build_adapter_deployment(source, &self.adapter_image, sink_uri)?;
        match self.store.create(namespace, desired).await {
            Ok(created) => {
                info!(workload = created.name_any(), "adapter workload created");
                Ok(created)
            }
            Err(OperatorError::AlreadyExists(_)) => {
                // Lost a create race; the winner's workload is authoritative.
                self.find_owned(namespace, source, &selector).await?.ok_or_else(|| {
                    OperatorError::Store(
                        "workload reported as existing but not visible in lookup".into(),
                    )
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn find_owned(
        &self,
        namespace: &str,
        source: &AmqpSource,
        selector: &str,
    ) -> Result<Option<Deployment>> {
        let mut owned: Vec<Deployment> = self
            .store
            .list(namespace, selector)
            .await?
            .into_iter()
            .filter(|d| resources::owned_by(d, source))
            .collect();

        if owned.len() > 1 {
            // One-workload invariant broken. Pick one and leave the anomaly
            // for external audit rather than guessing which to delete.
            warn!(
                count = owned.len(),
                "multiple adapter workloads match one source; keeping the first"
            );
        }

        Ok(if owned.is_empty() {
            None
        } else {
            Some(owned.swap_remove(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{AmqpSourceSpec, CONDITION_DEPLOYED, CONDITION_SINK_RESOLVED};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SINK_URI: &str = "http://svc.ns.svc.cluster.local/";

    struct FixedResolver {
        uri: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn ok() -> Self {
            Self {
                uri: Some(SINK_URI.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                uri: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SinkResolver for FixedResolver {
        async fn resolve(&self, _namespace: &str, _sink: &SinkReference) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.uri
                .clone()
                .ok_or_else(|| OperatorError::Resolution("service ns/svc not found".to_string()))
        }
    }

    /// In-memory store that counts calls and enforces name uniqueness.
    #[derive(Default)]
    struct MemoryStore {
        workloads: Mutex<Vec<Deployment>>,
        list_calls: AtomicUsize,
        create_calls: AtomicUsize,
    }

    impl MemoryStore {
        fn create_count(&self) -> usize {
            self.create_calls.load(Ordering::SeqCst)
        }

        fn seed(&self, workload: Deployment) {
            self.workloads.lock().unwrap().push(workload);
        }
    }

    #[async_trait]
    impl WorkloadStore for MemoryStore {
        async fn list(&self, _namespace: &str, _selector: &str) -> Result<Vec<Deployment>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.workloads.lock().unwrap().clone())
        }

        async fn create(&self, _namespace: &str, workload: Deployment) -> Result<Deployment> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let mut workloads = self.workloads.lock().unwrap();
            if workloads
                .iter()
                .any(|d| d.metadata.name == workload.metadata.name)
            {
                return Err(OperatorError::AlreadyExists(workload.name_any()));
            }
            workloads.push(workload.clone());
            Ok(workload)
        }
    }

    fn test_source() -> AmqpSource {
        AmqpSource {
            metadata: ObjectMeta {
                name: Some("orders".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-1234".to_string()),
                generation: Some(1),
                ..Default::default()
            },
            spec: AmqpSourceSpec {
                source_uri: "broker://host/queue1".to_string(),
                sink: SinkReference::service("svc", "ns"),
            },
            status: None,
        }
    }

    fn reconciler(
        resolver: Arc<FixedResolver>,
        store: Arc<MemoryStore>,
    ) -> Reconciler {
        Reconciler::new(resolver, store, "ghcr.io/brokerflow/adapter:0.1.0")
    }

    #[tokio::test]
    async fn test_first_reconcile_creates_workload() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        let mut source = test_source();

        engine.reconcile(&mut source).await.unwrap();

        assert!(source
            .metadata
            .finalizers
            .as_ref()
            .unwrap()
            .contains(&FINALIZER.to_string()));

        let status = source.status.as_ref().unwrap();
        assert_eq!(status.sink_uri.as_deref(), Some(SINK_URI));
        assert_eq!(status.condition(CONDITION_SINK_RESOLVED).unwrap().status, "True");
        assert_eq!(status.condition(CONDITION_DEPLOYED).unwrap().status, "True");
        assert_eq!(status.phase, SourcePhase::Deployed);

        assert_eq!(store.create_count(), 1);
        let workloads = store.workloads.lock().unwrap();
        assert_eq!(workloads.len(), 1);
        let labels = workloads[0].metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(resources::LABEL_SOURCE_NAME).unwrap(), "orders");
    }

    #[tokio::test]
    async fn test_second_reconcile_reuses_workload() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        let mut source = test_source();

        engine.reconcile(&mut source).await.unwrap();
        let first = store.workloads.lock().unwrap()[0].clone();

        engine.reconcile(&mut source).await.unwrap();

        assert_eq!(store.create_count(), 1);
        let workloads = store.workloads.lock().unwrap();
        assert_eq!(workloads.len(), 1);
        assert_eq!(workloads[0].metadata.name, first.metadata.name);
    }

    #[tokio::test]
    async fn test_deletion_releases_finalizer_without_create() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());

        let mut source = test_source();
        source.metadata.finalizers = Some(vec![
            FINALIZER.to_string(),
            "other.example/finalizer".to_string(),
        ]);
        source.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));

        engine.reconcile(&mut source).await.unwrap();

        let finalizers = source.metadata.finalizers.as_ref().unwrap();
        assert!(!finalizers.contains(&FINALIZER.to_string()));
        assert!(finalizers.contains(&"other.example/finalizer".to_string()));
        assert_eq!(store.create_count(), 0);
        assert_eq!(source.status.as_ref().unwrap().phase, SourcePhase::Terminating);
    }

    #[tokio::test]
    async fn test_resolution_failure_marks_condition_and_errors() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::failing()), store.clone());
        let mut source = test_source();

        let err = engine.reconcile(&mut source).await.unwrap_err();
        assert!(matches!(err, OperatorError::Resolution(_)));

        let status = source.status.as_ref().unwrap();
        let condition = status.condition(CONDITION_SINK_RESOLVED).unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason.as_deref(), Some("ResolveFailed"));
        // Deployed stays untouched from initialization.
        assert_eq!(status.condition(CONDITION_DEPLOYED).unwrap().status, "Unknown");
        assert_eq!(store.create_count(), 0);
    }

    #[tokio::test]
    async fn test_create_race_reuses_winner() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        let mut source = test_source();

        // A workload with our name but a foreign owner: invisible to the
        // ownership lookup, but it makes the create conflict.
        let mut racer =
            resources::build_adapter_deployment(&source, "img", SINK_URI).unwrap();
        racer.metadata.owner_references.as_mut().unwrap()[0].uid = "other-uid".to_string();
        store.seed(racer);

        let err = engine.reconcile(&mut source).await.unwrap_err();
        // The conflict was swallowed, the re-lookup found nothing owned: the
        // engine reports a retryable store error rather than pretending the
        // workload is ours.
        assert!(matches!(err, OperatorError::Store(_)));
        assert_eq!(store.create_count(), 1);
    }

    #[tokio::test]
    async fn test_create_race_with_visible_winner() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        let mut source = test_source();

        // First pass creates the workload.
        engine.reconcile(&mut source).await.unwrap();

        // A duplicate create against the same store must reuse, not fail:
        // run a fresh engine over the same store.
        let engine2 = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        engine2.reconcile(&mut source).await.unwrap();

        assert_eq!(store.workloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_workloads_tolerated() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        let mut source = test_source();

        let mut first = resources::build_adapter_deployment(&source, "img", SINK_URI).unwrap();
        first.metadata.name = Some("brokerflow-adapter-orders-a".to_string());
        let mut second = resources::build_adapter_deployment(&source, "img", SINK_URI).unwrap();
        second.metadata.name = Some("brokerflow-adapter-orders-b".to_string());
        store.seed(first);
        store.seed(second);

        engine.reconcile(&mut source).await.unwrap();

        // Anomaly is tolerated, not corrected: no create, no delete.
        assert_eq!(store.create_count(), 0);
        assert_eq!(store.workloads.lock().unwrap().len(), 2);
        assert_eq!(source.status.as_ref().unwrap().phase, SourcePhase::Deployed);
    }

    #[tokio::test]
    async fn test_invalid_spec_not_retried() {
        let store = Arc::new(MemoryStore::default());
        let resolver = Arc::new(FixedResolver::ok());
        let engine = reconciler(resolver.clone(), store.clone());

        let mut source = test_source();
        source.spec.source_uri = "not a url".to_string();

        // Ok, not Err: the scheduler must not spin on a defect.
        engine.reconcile(&mut source).await.unwrap();

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.create_count(), 0);
        let condition = source
            .status
            .as_ref()
            .unwrap()
            .condition(CONDITION_SINK_RESOLVED)
            .unwrap();
        assert_eq!(condition.status, "False");
        assert_eq!(condition.reason.as_deref(), Some("InvalidSpec"));
    }

    #[tokio::test]
    async fn test_finalizer_added_once() {
        let store = Arc::new(MemoryStore::default());
        let engine = reconciler(Arc::new(FixedResolver::ok()), store.clone());
        let mut source = test_source();

        engine.reconcile(&mut source).await.unwrap();
        engine.reconcile(&mut source).await.unwrap();

        let count = source
            .metadata
            .finalizers
            .as_ref()
            .unwrap()
            .iter()
            .filter(|f| *f == FINALIZER)
            .count();
        assert_eq!(count, 1);
    }
}
