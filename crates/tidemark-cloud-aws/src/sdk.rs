//! `ElbV2Api` on top of the AWS SDK

use crate::api::{
    CreateListenerRequest, CreateLoadBalancerRequest, CreateTargetGroupRequest, ElbV2Api,
    HealthCheck, ListenerAction, ListenerDescription, LoadBalancerDescription,
    ModifyListenerRequest, ModifyTargetGroupRequest, TargetGroupDescription,
};
use crate::error::AwsError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_elasticloadbalancingv2::Client;
use aws_sdk_elasticloadbalancingv2::error::DisplayErrorContext;
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, Certificate, Listener, LoadBalancer, LoadBalancerSchemeEnum,
    LoadBalancerTypeEnum, ProtocolEnum, Tag as SdkTag, TargetGroup,
};
use tidemark_cloud::{Page, Tag, TagDescription};

fn api_error<E: std::error::Error + 'static>(operation: &str, err: E) -> anyhow::Error {
    AwsError::Api {
        operation: operation.to_string(),
        message: DisplayErrorContext(&err).to_string(),
    }
    .into()
}

fn to_sdk_tags(tags: &[Tag]) -> anyhow::Result<Vec<SdkTag>> {
    tags.iter()
        .map(|t| {
            SdkTag::builder()
                .key(&t.key)
                .value(&t.value)
                .build()
                .map_err(|e| api_error("building tags", e))
        })
        .collect()
}

fn forward_action(target_group_arn: &str) -> anyhow::Result<Action> {
    Action::builder()
        .r#type(ActionTypeEnum::Forward)
        .target_group_arn(target_group_arn)
        .build()
        .map_err(|e| api_error("building listener action", e))
}

fn non_empty_marker(marker: Option<&str>) -> Option<String> {
    marker.filter(|m| !m.is_empty()).map(str::to_string)
}

fn target_group_description(tg: &TargetGroup) -> anyhow::Result<TargetGroupDescription> {
    let arn = tg.target_group_arn().ok_or(AwsError::MissingField {
        operation: "DescribeTargetGroups",
        field: "TargetGroupArn",
    })?;
    Ok(TargetGroupDescription {
        arn: arn.to_string(),
        name: tg.target_group_name().unwrap_or_default().to_string(),
        port: tg.port().and_then(|p| u16::try_from(p).ok()).unwrap_or_default(),
        protocol: tg.protocol().map(|p| p.as_str().to_string()).unwrap_or_default(),
        vpc_id: tg.vpc_id().unwrap_or_default().to_string(),
        health_check: HealthCheck {
            protocol: tg.health_check_protocol().map(|p| p.as_str().to_string()),
            port: tg.health_check_port().map(str::to_string),
            interval_seconds: tg
                .health_check_interval_seconds()
                .and_then(|v| u32::try_from(v).ok()),
            healthy_threshold: tg
                .healthy_threshold_count()
                .and_then(|v| u32::try_from(v).ok()),
            unhealthy_threshold: tg
                .unhealthy_threshold_count()
                .and_then(|v| u32::try_from(v).ok()),
        },
        load_balancer_arns: tg.load_balancer_arns().to_vec(),
    })
}

fn load_balancer_description(lb: &LoadBalancer) -> anyhow::Result<LoadBalancerDescription> {
    let arn = lb.load_balancer_arn().ok_or(AwsError::MissingField {
        operation: "DescribeLoadBalancers",
        field: "LoadBalancerArn",
    })?;
    Ok(LoadBalancerDescription {
        arn: arn.to_string(),
        name: lb.load_balancer_name().unwrap_or_default().to_string(),
        dns_name: lb.dns_name().map(str::to_string),
        scheme: lb.scheme().map(|s| s.as_str().to_string()).unwrap_or_default(),
        subnets: lb
            .availability_zones()
            .iter()
            .filter_map(|az| az.subnet_id().map(str::to_string))
            .collect(),
        state: lb
            .state()
            .and_then(|s| s.code())
            .map(|c| c.as_str().to_string()),
    })
}

fn listener_description(listener: &Listener) -> anyhow::Result<ListenerDescription> {
    let arn = listener.listener_arn().ok_or(AwsError::MissingField {
        operation: "DescribeListeners",
        field: "ListenerArn",
    })?;
    Ok(ListenerDescription {
        arn: arn.to_string(),
        load_balancer_arn: listener.load_balancer_arn().unwrap_or_default().to_string(),
        port: listener
            .port()
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or_default(),
        protocol: listener
            .protocol()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default(),
        certificates: listener
            .certificates()
            .iter()
            .filter_map(|c| c.certificate_arn().map(str::to_string))
            .collect(),
        ssl_policy: listener.ssl_policy().map(str::to_string),
        default_actions: listener
            .default_actions()
            .iter()
            .map(|a| ListenerAction {
                action_type: a.r#type().map(|t| t.as_str().to_string()).unwrap_or_default(),
                target_group_arn: a.target_group_arn().map(str::to_string),
            })
            .collect(),
    })
}

/// ELBv2 client backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct SdkElbV2 {
    client: Client,
}

impl SdkElbV2 {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from the default credential and region chain
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl ElbV2Api for SdkElbV2 {
    async fn describe_target_groups(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<TargetGroupDescription>> {
        let output = self
            .client
            .describe_target_groups()
            .set_marker(marker)
            .page_size(i32::try_from(page_size).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| api_error("DescribeTargetGroups", e))?;
        Ok(Page {
            items: output
                .target_groups()
                .iter()
                .map(target_group_description)
                .collect::<anyhow::Result<_>>()?,
            next_marker: non_empty_marker(output.next_marker()),
        })
    }

    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<LoadBalancerDescription>> {
        let output = self
            .client
            .describe_load_balancers()
            .set_marker(marker)
            .page_size(i32::try_from(page_size).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| api_error("DescribeLoadBalancers", e))?;
        Ok(Page {
            items: output
                .load_balancers()
                .iter()
                .map(load_balancer_description)
                .collect::<anyhow::Result<_>>()?,
            next_marker: non_empty_marker(output.next_marker()),
        })
    }

    async fn describe_tags(&self, arns: &[String]) -> anyhow::Result<Vec<TagDescription>> {
        let output = self
            .client
            .describe_tags()
            .set_resource_arns(Some(arns.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("DescribeTags", e))?;
        Ok(output
            .tag_descriptions()
            .iter()
            .filter_map(|d| {
                let resource_id = d.resource_arn()?.to_string();
                let tags = d
                    .tags()
                    .iter()
                    .map(|t| Tag::new(t.key(), t.value().unwrap_or_default()))
                    .collect();
                Some(TagDescription { resource_id, tags })
            })
            .collect())
    }

    async fn describe_listeners(
        &self,
        load_balancer_arn: &str,
        marker: Option<String>,
    ) -> anyhow::Result<Page<ListenerDescription>> {
        let output = self
            .client
            .describe_listeners()
            .load_balancer_arn(load_balancer_arn)
            .set_marker(marker)
            .send()
            .await
            .map_err(|e| api_error("DescribeListeners", e))?;
        Ok(Page {
            items: output
                .listeners()
                .iter()
                .map(listener_description)
                .collect::<anyhow::Result<_>>()?,
            next_marker: non_empty_marker(output.next_marker()),
        })
    }

    async fn create_listener(
        &self,
        request: CreateListenerRequest,
    ) -> anyhow::Result<ListenerDescription> {
        let mut call = self
            .client
            .create_listener()
            .load_balancer_arn(&request.load_balancer_arn)
            .port(i32::from(request.port))
            .protocol(ProtocolEnum::from(request.protocol.as_str()))
            .set_ssl_policy(request.ssl_policy.clone())
            .default_actions(forward_action(&request.default_target_group_arn)?);
        if let Some(certificate) = &request.certificate_arn {
            call = call.certificates(Certificate::builder().certificate_arn(certificate).build());
        }

        let output = call
            .send()
            .await
            .map_err(|e| api_error("CreateListener", e))?;
        let listener = output.listeners().first().ok_or(AwsError::MissingField {
            operation: "CreateListener",
            field: "Listeners",
        })?;
        listener_description(listener)
    }

    async fn modify_listener(&self, request: ModifyListenerRequest) -> anyhow::Result<()> {
        let mut call = self
            .client
            .modify_listener()
            .listener_arn(&request.listener_arn)
            .set_ssl_policy(request.ssl_policy.clone());
        if let Some(target_group_arn) = &request.default_target_group_arn {
            call = call.default_actions(forward_action(target_group_arn)?);
        }
        call.send()
            .await
            .map_err(|e| api_error("ModifyListener", e))?;
        Ok(())
    }

    async fn delete_listener(&self, listener_arn: &str) -> anyhow::Result<()> {
        self.client
            .delete_listener()
            .listener_arn(listener_arn)
            .send()
            .await
            .map_err(|e| api_error("DeleteListener", e))?;
        Ok(())
    }

    async fn create_target_group(
        &self,
        request: CreateTargetGroupRequest,
    ) -> anyhow::Result<TargetGroupDescription> {
        let hc = &request.health_check;
        let output = self
            .client
            .create_target_group()
            .name(&request.name)
            .port(i32::from(request.port))
            .protocol(ProtocolEnum::from(request.protocol.as_str()))
            .vpc_id(&request.vpc_id)
            .set_health_check_protocol(hc.protocol.as_deref().map(ProtocolEnum::from))
            .set_health_check_port(hc.port.clone())
            .set_health_check_interval_seconds(hc.interval_seconds.map(|v| v as i32))
            .set_healthy_threshold_count(hc.healthy_threshold.map(|v| v as i32))
            .set_unhealthy_threshold_count(hc.unhealthy_threshold.map(|v| v as i32))
            .set_tags(Some(to_sdk_tags(&request.tags)?))
            .send()
            .await
            .map_err(|e| api_error("CreateTargetGroup", e))?;
        let tg = output.target_groups().first().ok_or(AwsError::MissingField {
            operation: "CreateTargetGroup",
            field: "TargetGroups",
        })?;
        target_group_description(tg)
    }

    async fn modify_target_group(&self, request: ModifyTargetGroupRequest) -> anyhow::Result<()> {
        let hc = &request.health_check;
        self.client
            .modify_target_group()
            .target_group_arn(&request.target_group_arn)
            .set_health_check_protocol(hc.protocol.as_deref().map(ProtocolEnum::from))
            .set_health_check_port(hc.port.clone())
            .set_health_check_interval_seconds(hc.interval_seconds.map(|v| v as i32))
            .set_healthy_threshold_count(hc.healthy_threshold.map(|v| v as i32))
            .set_unhealthy_threshold_count(hc.unhealthy_threshold.map(|v| v as i32))
            .send()
            .await
            .map_err(|e| api_error("ModifyTargetGroup", e))?;
        Ok(())
    }

    async fn delete_target_group(&self, target_group_arn: &str) -> anyhow::Result<()> {
        self.client
            .delete_target_group()
            .target_group_arn(target_group_arn)
            .send()
            .await
            .map_err(|e| api_error("DeleteTargetGroup", e))?;
        Ok(())
    }

    async fn create_load_balancer(
        &self,
        request: CreateLoadBalancerRequest,
    ) -> anyhow::Result<LoadBalancerDescription> {
        let output = self
            .client
            .create_load_balancer()
            .name(&request.name)
            .r#type(LoadBalancerTypeEnum::Network)
            .scheme(LoadBalancerSchemeEnum::from(request.scheme.as_str()))
            .set_subnets(Some(request.subnets.clone()))
            .set_tags(Some(to_sdk_tags(&request.tags)?))
            .send()
            .await
            .map_err(|e| api_error("CreateLoadBalancer", e))?;
        let lb = output.load_balancers().first().ok_or(AwsError::MissingField {
            operation: "CreateLoadBalancer",
            field: "LoadBalancers",
        })?;
        load_balancer_description(lb)
    }

    async fn delete_load_balancer(&self, load_balancer_arn: &str) -> anyhow::Result<()> {
        self.client
            .delete_load_balancer()
            .load_balancer_arn(load_balancer_arn)
            .send()
            .await
            .map_err(|e| api_error("DeleteLoadBalancer", e))?;
        Ok(())
    }

    async fn set_subnets(&self, load_balancer_arn: &str, subnets: &[String]) -> anyhow::Result<()> {
        self.client
            .set_subnets()
            .load_balancer_arn(load_balancer_arn)
            .set_subnets(Some(subnets.to_vec()))
            .send()
            .await
            .map_err(|e| api_error("SetSubnets", e))?;
        Ok(())
    }

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> anyhow::Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        self.client
            .add_tags()
            .resource_arns(arn)
            .set_tags(Some(to_sdk_tags(tags)?))
            .send()
            .await
            .map_err(|e| api_error("AddTags", e))?;
        Ok(())
    }
}
