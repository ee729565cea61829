use super::{expect_one, tags_field, tags_match, tags_to_add};
use crate::api::CreateLoadBalancerRequest;
use crate::cloud::AwsCloud;
use crate::listing::list_load_balancers;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tidemark_cloud::{
    CloudError, Delta, FieldValue, Lifecycle, NAME_TAG, Resource, Result, Tags, TextTarget,
    to_tag_list, to_tag_map,
};

const DEFAULT_SCHEME: &str = "internet-facing";

/// ELBv2 limits load balancer names to 32 characters
const MAX_NAME_LEN: usize = 32;

/// A network load balancer
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkLoadBalancer {
    pub name: String,
    pub lifecycle: Lifecycle,

    /// `internet-facing` or `internal`
    pub scheme: Option<String>,

    pub subnets: Vec<String>,
    pub tags: Tags,

    /// Observed
    pub arn: Option<String>,
    pub dns_name: Option<String>,
}

impl NetworkLoadBalancer {
    pub fn aws_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .take(MAX_NAME_LEN)
            .collect();
        sanitized.trim_matches('-').to_string()
    }

    fn scheme(&self) -> &str {
        self.scheme.as_deref().unwrap_or(DEFAULT_SCHEME)
    }

    fn arn_or_err(&self, actual: Option<&Self>) -> Result<String> {
        actual.and_then(|a| a.arn.clone()).ok_or_else(|| {
            CloudError::InternalConsistency(format!(
                "load balancer {} has a pending change but no live ARN",
                self.name
            ))
        })
    }

    async fn create(&self, cloud: &AwsCloud) -> Result<String> {
        if self.subnets.is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "load balancer {} needs at least one subnet",
                self.name
            )));
        }
        let created = cloud
            .api()
            .create_load_balancer(CreateLoadBalancerRequest {
                name: self.aws_name(),
                scheme: self.scheme().to_string(),
                subnets: self.subnets.clone(),
                tags: to_tag_list(&self.tags),
            })
            .await
            .map_err(|e| CloudError::backend("creating load balancer", e))?;
        tracing::info!("Created load balancer {} ({})", self.name, created.arn);
        Ok(created.arn)
    }
}

#[async_trait]
impl Resource<AwsCloud> for NetworkLoadBalancer {
    const KIND: &'static str = "NetworkLoadBalancer";

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
        let matches: Vec<_> = list_load_balancers(cloud)
            .await?
            .into_iter()
            .filter(|info| info.name_tag() == Some(self.name.as_str()))
            .collect();

        let Some(info) = expect_one(Self::KIND, &self.name, matches)? else {
            tracing::debug!("Load balancer {} not found", self.name);
            return Ok(None);
        };

        let lb = info.resource;
        Ok(Some(NetworkLoadBalancer {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            scheme: Some(lb.scheme),
            subnets: lb.subnets,
            tags: to_tag_map(&info.tags),
            arn: Some(info.id),
            dns_name: lb.dns_name,
        }))
    }

    fn normalize(&mut self) -> Result<()> {
        let scheme = self.scheme().to_ascii_lowercase();
        self.scheme = Some(scheme);
        self.subnets.sort();
        self.subnets.dedup();
        // Lookups match on the name tag
        self.tags.insert(NAME_TAG.to_string(), self.name.clone());
        Ok(())
    }

    fn changed_fields(&self, actual: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.scheme != actual.scheme {
            changed.push("scheme");
        }
        if self.subnets != actual.subnets {
            changed.push("subnets");
        }
        if !tags_match(&self.tags, &actual.tags) {
            changed.push("tags");
        }
        changed
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["scheme"]
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
                    "Deleting load balancer {} ({}) to change {}",
                    self.name,
                    arn,
                    fields.join(", ")
                );
                cloud
                    .api()
                    .delete_load_balancer(&arn)
                    .await
                    .map_err(|e| CloudError::backend("deleting load balancer", e))?;
                self.create(cloud).await
            }
            Delta::Update(_) => {
                let arn = self.arn_or_err(actual)?;
                if delta.touches("subnets") {
                    tracing::info!(
                        "Setting subnets of load balancer {}: {}",
                        self.name,
                        self.subnets.join(", ")
                    );
                    cloud
                        .api()
                        .set_subnets(&arn, &self.subnets)
                        .await
                        .map_err(|e| CloudError::backend("setting load balancer subnets", e))?;
                }
                if delta.touches("tags") {
                    let current = actual.map(|a| a.tags.clone()).unwrap_or_default();
                    cloud
                        .api()
                        .add_tags(&arn, &tags_to_add(&self.tags, &current))
                        .await
                        .map_err(|e| CloudError::backend("tagging load balancer", e))?;
                }
                Ok(arn)
            }
        }
    }

    fn render_text(&self, target: &TextTarget, _delta: &Delta) -> Result<()> {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::literal(self.aws_name()));
        fields.insert(
            "internal".to_string(),
            FieldValue::literal(self.scheme() == "internal"),
        );
        fields.insert(
            "load_balancer_type".to_string(),
            FieldValue::literal("network"),
        );
        fields.insert(
            "subnets".to_string(),
            FieldValue::List(
                self.subnets
                    .iter()
                    .map(|s| FieldValue::literal(s.clone()))
                    .collect(),
            ),
        );
        fields.insert("tags".to_string(), tags_field(&self.tags));

        target.render_resource("aws_lb", &self.name, fields)
    }
}
