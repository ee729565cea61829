//! ELBv2 capability used by the tasks
//!
//! The tasks only need a narrow slice of the ELBv2 API. Implementations return
//! `anyhow::Result`; the tasks convert failures into `CloudError::BackendQuery`
//! naming the operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tidemark_cloud::{Page, Tag, TagDescription};

/// Health check settings of a target group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub protocol: Option<String>,

    /// Port number or `traffic-port`
    pub port: Option<String>,

    pub interval_seconds: Option<u32>,
    pub healthy_threshold: Option<u32>,
    pub unhealthy_threshold: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupDescription {
    pub arn: String,
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub vpc_id: String,
    pub health_check: HealthCheck,
    pub load_balancer_arns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerDescription {
    pub arn: String,
    pub name: String,
    pub dns_name: Option<String>,

    /// `internet-facing` or `internal`
    pub scheme: String,

    pub subnets: Vec<String>,
    pub state: Option<String>,
}

/// Default action of a listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerAction {
    pub action_type: String,
    pub target_group_arn: Option<String>,
}

impl ListenerAction {
    pub fn forward(target_group_arn: impl Into<String>) -> Self {
        Self {
            action_type: "forward".to_string(),
            target_group_arn: Some(target_group_arn.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerDescription {
    pub arn: String,
    pub load_balancer_arn: String,
    pub port: u16,
    pub protocol: String,
    pub certificates: Vec<String>,
    pub ssl_policy: Option<String>,
    pub default_actions: Vec<ListenerAction>,
}

impl ListenerDescription {
    /// Target group of the first forward action
    pub fn forward_target_group(&self) -> Option<&str> {
        self.default_actions
            .iter()
            .filter(|a| a.action_type == "forward")
            .find_map(|a| a.target_group_arn.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateListenerRequest {
    pub load_balancer_arn: String,
    pub port: u16,
    pub protocol: String,
    pub certificate_arn: Option<String>,
    pub ssl_policy: Option<String>,
    pub default_target_group_arn: String,
}

/// Only the `Some` fields are changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyListenerRequest {
    pub listener_arn: String,
    pub ssl_policy: Option<String>,
    pub default_target_group_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTargetGroupRequest {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub vpc_id: String,
    pub health_check: HealthCheck,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyTargetGroupRequest {
    pub target_group_arn: String,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub scheme: String,
    pub subnets: Vec<String>,
    pub tags: Vec<Tag>,
}

/// The subset of ELBv2 the engine calls. Implementations never retry.
#[async_trait]
pub trait ElbV2Api: Send + Sync {
    async fn describe_target_groups(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<TargetGroupDescription>>;

    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<LoadBalancerDescription>>;

    /// Tags of at most 20 resources
    async fn describe_tags(&self, arns: &[String]) -> anyhow::Result<Vec<TagDescription>>;

    async fn describe_listeners(
        &self,
        load_balancer_arn: &str,
        marker: Option<String>,
    ) -> anyhow::Result<Page<ListenerDescription>>;

    async fn create_listener(
        &self,
        request: CreateListenerRequest,
    ) -> anyhow::Result<ListenerDescription>;

    async fn modify_listener(&self, request: ModifyListenerRequest) -> anyhow::Result<()>;

    async fn delete_listener(&self, listener_arn: &str) -> anyhow::Result<()>;

    async fn create_target_group(
        &self,
        request: CreateTargetGroupRequest,
    ) -> anyhow::Result<TargetGroupDescription>;

    async fn modify_target_group(&self, request: ModifyTargetGroupRequest) -> anyhow::Result<()>;

    async fn delete_target_group(&self, target_group_arn: &str) -> anyhow::Result<()>;

    async fn create_load_balancer(
        &self,
        request: CreateLoadBalancerRequest,
    ) -> anyhow::Result<LoadBalancerDescription>;

    async fn delete_load_balancer(&self, load_balancer_arn: &str) -> anyhow::Result<()>;

    async fn set_subnets(&self, load_balancer_arn: &str, subnets: &[String]) -> anyhow::Result<()>;

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> anyhow::Result<()>;
}
