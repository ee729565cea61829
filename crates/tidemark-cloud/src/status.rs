//! Cluster status queries
//!
//! Read-only views of what a backend knows about a running cluster. Field
//! names serialize in camelCase and empty fields are omitted.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Observed status of a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_clusters: Vec<EtcdClusterStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<EtcdMemberStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdMemberStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Backing volume of the member
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volume_id: String,
}

/// An address through which the cluster API is reachable.
/// Usually exactly one of `ip` and `hostname` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiIngressStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl ApiIngressStatus {
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            hostname: None,
        }
    }

    pub fn hostname(hostname: impl Into<String>) -> Self {
        Self {
            ip: None,
            hostname: Some(hostname.into()),
        }
    }
}

/// Backend-specific source of cluster status
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn find_cluster_status(&self, cluster: &str) -> Result<ClusterStatus>;

    async fn get_api_ingress_status(&self, cluster: &str) -> Result<Vec<ApiIngressStatus>>;
}
