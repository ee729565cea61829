//! Tag-correlated listings of ELBv2 objects

use crate::api::{ElbV2Api, LoadBalancerDescription, TargetGroupDescription};
use crate::cloud::AwsCloud;
use async_trait::async_trait;
use tidemark_cloud::{Page, ResourceInfo, Result, TagDescription, TaggedListing};

pub type TargetGroupInfo = ResourceInfo<TargetGroupDescription>;
pub type LoadBalancerInfo = ResourceInfo<LoadBalancerDescription>;

struct TargetGroupListing<'a> {
    api: &'a dyn ElbV2Api,
}

#[async_trait]
impl TaggedListing for TargetGroupListing<'_> {
    type Item = TargetGroupDescription;

    fn kind(&self) -> &str {
        "target groups"
    }

    fn resource_id(item: &TargetGroupDescription) -> String {
        item.arn.clone()
    }

    async fn list_page(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<TargetGroupDescription>> {
        self.api.describe_target_groups(marker, page_size).await
    }

    async fn describe_tags(&self, ids: &[String]) -> anyhow::Result<Vec<TagDescription>> {
        self.api.describe_tags(ids).await
    }
}

struct LoadBalancerListing<'a> {
    api: &'a dyn ElbV2Api,
}

#[async_trait]
impl TaggedListing for LoadBalancerListing<'_> {
    type Item = LoadBalancerDescription;

    fn kind(&self) -> &str {
        "load balancers"
    }

    fn resource_id(item: &LoadBalancerDescription) -> String {
        item.arn.clone()
    }

    async fn list_page(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<LoadBalancerDescription>> {
        self.api.describe_load_balancers(marker, page_size).await
    }

    async fn describe_tags(&self, ids: &[String]) -> anyhow::Result<Vec<TagDescription>> {
        self.api.describe_tags(ids).await
    }
}

/// Target groups carrying all of the cloud's ownership tags
pub async fn list_target_groups(cloud: &AwsCloud) -> Result<Vec<TargetGroupInfo>> {
    let listing = TargetGroupListing { api: cloud.api() };
    tidemark_cloud::list_owned_resources(&listing, cloud.tag_batch_limit(), cloud.tags()).await
}

/// Load balancers carrying all of the cloud's ownership tags
pub async fn list_load_balancers(cloud: &AwsCloud) -> Result<Vec<LoadBalancerInfo>> {
    let listing = LoadBalancerListing { api: cloud.api() };
    tidemark_cloud::list_owned_resources(&listing, cloud.tag_batch_limit(), cloud.tags()).await
}
