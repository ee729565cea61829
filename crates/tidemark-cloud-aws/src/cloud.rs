//! AWS cloud handle passed to every task

use crate::api::ElbV2Api;
use crate::listing::list_load_balancers;
use async_trait::async_trait;
use std::sync::Arc;
use tidemark_cloud::{ApiIngressStatus, ClusterStatus, Result, StatusStore, Tags};
use tidemark_core::DEFAULT_TAG_BATCH_LIMIT;

/// ELBv2 client plus the tags that mark objects as managed by this cluster
#[derive(Clone)]
pub struct AwsCloud {
    api: Arc<dyn ElbV2Api>,
    tags: Tags,
    tag_batch_limit: usize,
}

impl AwsCloud {
    pub fn new(api: Arc<dyn ElbV2Api>, tags: Tags) -> Self {
        Self {
            api,
            tags,
            tag_batch_limit: DEFAULT_TAG_BATCH_LIMIT,
        }
    }

    pub fn with_tag_batch_limit(mut self, limit: usize) -> Self {
        self.tag_batch_limit = limit.max(1);
        self
    }

    pub fn api(&self) -> &dyn ElbV2Api {
        self.api.as_ref()
    }

    /// Ownership tags; only objects carrying all of them are considered
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tag_batch_limit(&self) -> usize {
        self.tag_batch_limit
    }
}

impl std::fmt::Debug for AwsCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCloud")
            .field("tags", &self.tags)
            .field("tag_batch_limit", &self.tag_batch_limit)
            .finish_non_exhaustive()
    }
}

/// Tag key carrying the cluster name
pub const CLUSTER_TAG: &str = "KubernetesCluster";

#[async_trait]
impl StatusStore for AwsCloud {
    /// Etcd membership lives on EC2 volumes, which ELBv2 cannot see
    async fn find_cluster_status(&self, cluster: &str) -> Result<ClusterStatus> {
        tracing::debug!("No etcd status available from ELBv2 for {}", cluster);
        Ok(ClusterStatus::default())
    }

    /// DNS names of the cluster's load balancers
    async fn get_api_ingress_status(&self, cluster: &str) -> Result<Vec<ApiIngressStatus>> {
        let mut ingress: Vec<ApiIngressStatus> = list_load_balancers(self)
            .await?
            .into_iter()
            .filter(|lb| lb.get_tag(CLUSTER_TAG) == Some(cluster))
            .filter_map(|lb| lb.resource.dns_name.map(ApiIngressStatus::hostname))
            .collect();
        ingress.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(ingress)
    }
}
