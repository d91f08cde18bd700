//! Custom Resource Definition for AmqpSource
//!
//! An `AmqpSource` declares a broker queue to drain and a sink to deliver
//! converted events to. The operator watches these resources and keeps one
//! adapter workload running per live source.

use chrono::Utc;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationError};

/// Condition tracking sink reference resolution.
pub const CONDITION_SINK_RESOLVED: &str = "SinkResolved";

/// Condition tracking the adapter workload.
pub const CONDITION_DEPLOYED: &str = "Deployed";

/// Validate the broker address: a URL with a host and a non-empty queue path.
fn validate_source_uri(value: &str) -> Result<(), ValidationError> {
    let url = Url::parse(value).map_err(|_| {
        ValidationError::new("invalid_source_uri")
            .with_message(format!("'{}' is not a valid broker address", value).into())
    })?;
    if url.host_str().is_none() {
        return Err(ValidationError::new("invalid_source_uri")
            .with_message("broker address has no host".into()));
    }
    if url.path().trim_start_matches('/').is_empty() {
        return Err(ValidationError::new("invalid_source_uri")
            .with_message("broker address has no queue path".into()));
    }
    Ok(())
}

/// AmqpSource custom resource definition
///
/// Represents a bridge from one broker queue to one HTTP event sink. The
/// operator resolves the sink, deploys an adapter workload with the resolved
/// URI baked in, and reports progress through status conditions.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, Validate, PartialEq)]
#[kube(
    group = "brokerflow.dev",
    version = "v1alpha1",
    kind = "AmqpSource",
    plural = "amqpsources",
    shortname = "amqps",
    namespaced,
    status = "AmqpSourceStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Sink", "type":"string", "jsonPath":".status.sinkUri"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AmqpSourceSpec {
    /// Broker address of the queue to drain, e.g. `amqp://broker.example/jobs`.
    /// Credentials embedded here never appear in status or event metadata.
    #[validate(length(min = 1), custom(function = "validate_source_uri"))]
    pub source_uri: String,

    /// Where converted events are delivered.
    pub sink: SinkReference,
}

/// Reference to the event sink.
///
/// Either a literal `uri`, or an object reference resolved by the operator.
/// A literal URI wins when both are given. Only `Service` references are
/// supported; anything else fails resolution rather than being guessed at.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SinkReference {
    /// Literal sink URI, used as-is.
    pub uri: Option<String>,
    /// Kind of the referenced object. Defaults to `Service`.
    pub kind: Option<String>,
    /// Name of the referenced object.
    pub name: Option<String>,
    /// Namespace of the referenced object. Defaults to the source's namespace.
    pub namespace: Option<String>,
}

impl SinkReference {
    /// Reference a Service by name in the given namespace.
    pub fn service(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            uri: None,
            kind: Some("Service".to_string()),
            name: Some(name.into()),
            namespace: Some(namespace.into()),
        }
    }

    /// Reference a literal URI.
    pub fn literal(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }
}

/// Reconciliation progress of an AmqpSource.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SourcePhase {
    /// Sink reference not resolved yet.
    #[default]
    PendingSink,
    /// Sink resolved, adapter workload not ensured yet.
    SinkResolved,
    /// Adapter workload exists.
    Deployed,
    /// Deletion requested; gone once the finalizer is released.
    Terminating,
}

impl std::fmt::Display for SourcePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingSink => write!(f, "PendingSink"),
            Self::SinkResolved => write!(f, "SinkResolved"),
            Self::Deployed => write!(f, "Deployed"),
            Self::Terminating => write!(f, "Terminating"),
        }
    }
}

/// A named status condition with a reason, in the usual Kubernetes shape.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceCondition {
    /// Condition type (SinkResolved, Deployed)
    pub r#type: String,
    /// True, False or Unknown
    pub status: String,
    /// Machine-readable reason for the current status
    pub reason: Option<String>,
    /// Human-readable detail
    pub message: Option<String>,
    /// When the status last changed
    pub last_transition_time: Option<String>,
}

/// Observed state of an AmqpSource.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AmqpSourceStatus {
    /// Current reconciliation phase
    #[serde(default)]
    pub phase: SourcePhase,
    /// Resolved sink URI the adapter delivers to
    pub sink_uri: Option<String>,
    /// Generation last acted upon
    #[serde(default)]
    pub observed_generation: i64,
    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<SourceCondition>,
}

impl AmqpSourceStatus {
    /// Seed both conditions as `Unknown` so observers see progress from the
    /// very first pass. Existing conditions are left alone.
    pub fn initialize_conditions(&mut self) {
        for condition_type in [CONDITION_SINK_RESOLVED, CONDITION_DEPLOYED] {
            if !self.conditions.iter().any(|c| c.r#type == condition_type) {
                self.conditions.push(SourceCondition {
                    r#type: condition_type.to_string(),
                    status: "Unknown".to_string(),
                    reason: None,
                    message: None,
                    last_transition_time: Some(Utc::now().to_rfc3339()),
                });
            }
        }
    }

    /// Set a condition, bumping the transition time only when the status
    /// actually changes. Keeps repeated reconciles from churning the status.
    pub fn set_condition(&mut self, condition_type: &str, status: &str, reason: Option<&str>, message: Option<&str>) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.r#type == condition_type) {
            if existing.status != status {
                existing.last_transition_time = Some(Utc::now().to_rfc3339());
            }
            existing.status = status.to_string();
            existing.reason = reason.map(str::to_string);
            existing.message = message.map(str::to_string);
        } else {
            self.conditions.push(SourceCondition {
                r#type: condition_type.to_string(),
                status: status.to_string(),
                reason: reason.map(str::to_string),
                message: message.map(str::to_string),
                last_transition_time: Some(Utc::now().to_rfc3339()),
            });
        }
    }

    /// Record a resolved sink.
    pub fn mark_sink_resolved(&mut self, uri: &str) {
        self.sink_uri = Some(uri.to_string());
        self.set_condition(CONDITION_SINK_RESOLVED, "True", Some("SinkResolved"), None);
        if self.phase == SourcePhase::PendingSink {
            self.phase = SourcePhase::SinkResolved;
        }
    }

    /// Record a failed resolution. The sink URI is cleared so a stale URI is
    /// never handed to a new adapter.
    pub fn mark_sink_not_resolved(&mut self, reason: &str, message: &str) {
        self.sink_uri = None;
        self.phase = SourcePhase::PendingSink;
        self.set_condition(CONDITION_SINK_RESOLVED, "False", Some(reason), Some(message));
    }

    /// Record an ensured adapter workload.
    pub fn mark_deployed(&mut self) {
        self.set_condition(CONDITION_DEPLOYED, "True", Some("WorkloadEnsured"), None);
        self.phase = SourcePhase::Deployed;
    }

    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&SourceCondition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }
}
