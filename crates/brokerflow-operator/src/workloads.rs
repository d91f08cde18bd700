//! Deployment-backed workload store

use crate::error::{OperatorError, Result};
use crate::reconciler::WorkloadStore;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, ResourceExt};

/// Workload store over the Deployments API. A 409 on create is surfaced as
/// [`OperatorError::AlreadyExists`] for the engine's race handling.
pub struct KubeWorkloadStore {
    client: Client,
}

impl KubeWorkloadStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(selector);
        Ok(api.list(&params).await?.items)
    }

    async fn create(&self, namespace: &str, workload: Deployment) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), &workload).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(OperatorError::AlreadyExists(workload.name_any()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
