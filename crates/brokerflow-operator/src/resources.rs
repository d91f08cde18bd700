//! Kubernetes resource builders for the adapter workload
//!
//! The adapter Deployment is immutable-at-creation: its broker address and
//! resolved sink URI are baked into container env when the workload is
//! created, and the reconciler never diffs it afterwards.

use crate::crd::AmqpSource;
use crate::error::{OperatorError, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, PodSpec, PodTemplateSpec, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Name this controller identifies itself with.
pub const CONTROLLER_NAME: &str = "amqpsource-controller";

/// Label identifying workloads managed by this controller.
pub const LABEL_CONTROLLER: &str = "brokerflow.dev/controller";

/// Label carrying the owning source's name, scoped to its namespace.
pub const LABEL_SOURCE_NAME: &str = "brokerflow.dev/source-name";

/// Env var carrying the broker address into the adapter container.
pub const ENV_SOURCE_URI: &str = "SOURCE_URI";

/// Env var carrying the resolved sink URI into the adapter container.
pub const ENV_SINK_URI: &str = "SINK_URI";

/// The fixed label pair used for ownership lookup.
pub fn adapter_labels(source: &AmqpSource) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_CONTROLLER.to_string(), CONTROLLER_NAME.to_string()),
        (LABEL_SOURCE_NAME.to_string(), source.name_any()),
    ])
}

/// Label selector string for the fixed pair, in `k=v,k=v` form.
pub fn label_selector(source: &AmqpSource) -> String {
    adapter_labels(source)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `workload` is controlled by `source` through an owner reference.
/// Label matches alone are not trusted.
pub fn owned_by(workload: &Deployment, source: &AmqpSource) -> bool {
    let Some(uid) = source.uid() else {
        return false;
    };
    workload
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == uid)
}

/// Deployment name for a source's adapter.
pub fn adapter_name(source: &AmqpSource) -> String {
    format!("brokerflow-adapter-{}", source.name_any())
}

/// Build the adapter Deployment for a source, with the resolved sink URI
/// baked in and the source set as controller owner.
pub fn build_adapter_deployment(
    source: &AmqpSource,
    image: &str,
    sink_uri: &str,
) -> Result<Deployment> {
    let namespace = source.namespace().unwrap_or_else(|| "default".to_string());
    let labels = adapter_labels(source);

    let owner_ref = source.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::Reconcile("failed to build owner reference for adapter workload".into())
    })?;

    let container = Container {
        name: "adapter".to_string(),
        image: Some(image.to_string()),
        env: Some(vec![
            EnvVar {
                name: ENV_SOURCE_URI.to_string(),
                value: Some(source.spec.source_uri.clone()),
                ..Default::default()
            },
            EnvVar {
                name: ENV_SINK_URI.to_string(),
                value: Some(sink_uri.to_string()),
                ..Default::default()
            },
        ]),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            run_as_non_root: Some(true),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(adapter_name(source)),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            // One pump per source resource; scaling out would break the
            // per-queue credit window.
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}
