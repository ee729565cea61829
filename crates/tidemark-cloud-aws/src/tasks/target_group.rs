use super::{expect_one, tags_field, tags_match, tags_to_add};
use crate::api::{CreateTargetGroupRequest, HealthCheck, ModifyTargetGroupRequest};
use crate::cloud::AwsCloud;
use crate::listing::list_target_groups;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tidemark_cloud::{
    CloudError, Delta, FieldValue, Lifecycle, NAME_TAG, Resource, Result, Tags, TextTarget,
    to_tag_list, to_tag_map,
};

/// ELBv2 limits target group names to 32 characters
const MAX_NAME_LEN: usize = 32;

const DEFAULT_INTERVAL_SECONDS: u32 = 30;
const DEFAULT_HEALTHY_THRESHOLD: u32 = 5;
const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 2;

/// An ELBv2 target group
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGroup {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub port: u16,
    pub protocol: String,
    pub vpc_id: String,
    pub health_check: HealthCheck,

    /// Full desired tag set, ownership and `Name` included
    pub tags: Tags,

    /// Observed
    pub arn: Option<String>,
}

impl TargetGroup {
    /// Backend name: alphanumerics and hyphens, at most 32 characters
    pub fn aws_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .take(MAX_NAME_LEN)
            .collect();
        sanitized.trim_matches('-').to_string()
    }

    fn arn_or_err(&self, actual: Option<&Self>) -> Result<String> {
        actual
            .and_then(|a| a.arn.clone())
            .ok_or_else(|| CloudError::InternalConsistency(format!(
                "target group {} has a pending change but no live ARN",
                self.name
            )))
    }

    async fn create(&self, cloud: &AwsCloud) -> Result<String> {
        let created = cloud
            .api()
            .create_target_group(CreateTargetGroupRequest {
                name: self.aws_name(),
                port: self.port,
                protocol: self.protocol.clone(),
                vpc_id: self.vpc_id.clone(),
                health_check: self.health_check.clone(),
                tags: to_tag_list(&self.tags),
            })
            .await
            .map_err(|e| CloudError::backend("creating target group", e))?;
        tracing::info!("Created target group {} ({})", self.name, created.arn);
        Ok(created.arn)
    }
}

#[async_trait]
impl Resource<AwsCloud> for TargetGroup {
    const KIND: &'static str = "TargetGroup";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn id(&self) -> Option<&str> {
        self.arn.as_deref()
    }

    async fn find(&self, cloud: &AwsCloud) -> Result<Option<Self>> {
        let matches: Vec<_> = list_target_groups(cloud)
            .await?
            .into_iter()
            .filter(|info| info.name_tag() == Some(self.name.as_str()))
            .collect();

        let Some(info) = expect_one(Self::KIND, &self.name, matches)? else {
            tracing::debug!("Target group {} not found", self.name);
            return Ok(None);
        };

        let tg = info.resource;
        Ok(Some(TargetGroup {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            port: tg.port,
            protocol: tg.protocol,
            vpc_id: tg.vpc_id,
            health_check: tg.health_check,
            tags: to_tag_map(&info.tags),
            arn: Some(info.id),
        }))
    }

    fn normalize(&mut self) -> Result<()> {
        self.protocol = self.protocol.to_ascii_uppercase();

        let hc = &mut self.health_check;
        let protocol = match hc.protocol.take() {
            Some(p) => p.to_ascii_uppercase(),
            None if matches!(self.protocol.as_str(), "HTTP" | "HTTPS") => self.protocol.clone(),
            None => "TCP".to_string(),
        };
        hc.protocol = Some(protocol);
        hc.port.get_or_insert_with(|| "traffic-port".to_string());
        hc.interval_seconds.get_or_insert(DEFAULT_INTERVAL_SECONDS);
        hc.healthy_threshold.get_or_insert(DEFAULT_HEALTHY_THRESHOLD);
        hc.unhealthy_threshold.get_or_insert(DEFAULT_UNHEALTHY_THRESHOLD);

        // Lookups match on the name tag
        self.tags.insert(NAME_TAG.to_string(), self.name.clone());
        Ok(())
    }

    fn changed_fields(&self, actual: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.port != actual.port {
            changed.push("port");
        }
        if self.protocol != actual.protocol {
            changed.push("protocol");
        }
        if self.vpc_id != actual.vpc_id {
            changed.push("vpc_id");
        }
        if self.health_check != actual.health_check {
            changed.push("health_check");
        }
        if !tags_match(&self.tags, &actual.tags) {
            changed.push("tags");
        }
        changed
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["port", "protocol", "vpc_id"]
    }

    async fn render_live(
        &self,
        cloud: &AwsCloud,
        actual: Option<&Self>,
        delta: &Delta,
    ) -> Result<String> {
        match delta {
            Delta::NoOp => self.arn_or_err(actual),
            Delta::Create => self.create(cloud).await,
            Delta::Recreate(fields) => {
                let arn = self.arn_or_err(actual)?;
                tracing::warn!(
                    "Deleting target group {} ({}) to change {}",
                    self.name,
                    arn,
                    fields.join(", ")
                );
                cloud
                    .api()
                    .delete_target_group(&arn)
                    .await
                    .map_err(|e| CloudError::backend("deleting target group", e))?;
                self.create(cloud).await
            }
            Delta::Update(_) => {
                let arn = self.arn_or_err(actual)?;
                if delta.touches("health_check") {
                    tracing::info!("Updating health check of target group {}", self.name);
                    cloud
                        .api()
                        .modify_target_group(ModifyTargetGroupRequest {
                            target_group_arn: arn.clone(),
                            health_check: self.health_check.clone(),
                        })
                        .await
                        .map_err(|e| CloudError::backend("modifying target group", e))?;
                }
                if delta.touches("tags") {
                    let current = actual.map(|a| a.tags.clone()).unwrap_or_default();
                    let tags = tags_to_add(&self.tags, &current);
                    tracing::info!("Tagging target group {} ({} tags)", self.name, tags.len());
                    cloud
                        .api()
                        .add_tags(&arn, &tags)
                        .await
                        .map_err(|e| CloudError::backend("tagging target group", e))?;
                }
                Ok(arn)
            }
        }
    }

    fn render_text(&self, target: &TextTarget, _delta: &Delta) -> Result<()> {
        let hc = &self.health_check;
        let mut health_check = BTreeMap::new();
        if let Some(protocol) = &hc.protocol {
            health_check.insert("protocol".to_string(), FieldValue::literal(protocol.clone()));
        }
        if let Some(port) = &hc.port {
            health_check.insert("port".to_string(), FieldValue::literal(port.clone()));
        }
        if let Some(interval) = hc.interval_seconds {
            health_check.insert("interval".to_string(), FieldValue::literal(interval));
        }
        if let Some(healthy) = hc.healthy_threshold {
            health_check.insert("healthy_threshold".to_string(), FieldValue::literal(healthy));
        }
        if let Some(unhealthy) = hc.unhealthy_threshold {
            health_check.insert(
                "unhealthy_threshold".to_string(),
                FieldValue::literal(unhealthy),
            );
        }

        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::literal(self.aws_name()));
        fields.insert("port".to_string(), FieldValue::literal(self.port));
        fields.insert(
            "protocol".to_string(),
            FieldValue::literal(self.protocol.clone()),
        );
        fields.insert("vpc_id".to_string(), FieldValue::literal(self.vpc_id.clone()));
        fields.insert(
            "health_check".to_string(),
            FieldValue::Block(health_check),
        );
        fields.insert("tags".to_string(), tags_field(&self.tags));

        target.render_resource("aws_lb_target_group", &self.name, fields)
    }
}
