//! # Brokerflow Kubernetes Operator
//!
//! Operator for `AmqpSource` custom resources: each source declares a broker
//! queue and an event sink, and the operator keeps exactly one adapter
//! workload bridging the two.
//!
//! The controller follows the standard pattern:
//!
//! 1. **Watch**: AmqpSource resources and the Deployments they own
//! 2. **Reconcile**: resolve the sink, ensure the adapter workload
//! 3. **Status**: report progress through `SinkResolved` and `Deployed`
//!    conditions and a coarse `phase`
//!
//! Deletion is finalizer-gated: the controller releases its finalizer once
//! there is nothing left to clean up; the adapter workload itself is garbage
//! collected through its owner reference.
//!
//! ## Modules
//!
//! - [`crd`] - AmqpSource resource types and status helpers
//! - [`reconciler`] - the per-resource reconciliation engine and its
//!   capability traits ([`reconciler::SinkResolver`],
//!   [`reconciler::WorkloadStore`])
//! - [`resolver`] / [`workloads`] - Kubernetes-backed implementations of the
//!   capability traits
//! - [`resources`] - adapter Deployment builder and ownership labels
//! - [`controller`] - controller runtime wiring, persistence, error policy
//! - [`error`] - operator error types

pub mod controller;
pub mod crd;
pub mod error;
pub mod reconciler;
pub mod resolver;
pub mod resources;
pub mod workloads;

pub mod prelude {
    //! Re-exports for convenient usage
    pub use crate::controller::{run_controller, ControllerContext, ControllerMetrics};
    pub use crate::crd::{
        AmqpSource, AmqpSourceSpec, AmqpSourceStatus, SinkReference, SourceCondition, SourcePhase,
    };
    pub use crate::error::{OperatorError, Result};
    pub use crate::reconciler::{Reconciler, SinkResolver, WorkloadStore, FINALIZER};
    pub use crate::resolver::KubeSinkResolver;
    pub use crate::workloads::KubeWorkloadStore;
}
