use super::{arn_field, expect_one, terraform_label};
use crate::api::{CreateListenerRequest, ListenerDescription, ModifyListenerRequest};
use crate::cloud::AwsCloud;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tidemark_cloud::{
    CloudError, Delta, FieldValue, Lifecycle, Resource, Result, TaskRef, TextTarget,
    check_immutable,
};

/// Policy ELBv2 applies to a TLS listener created without one
pub const DEFAULT_SSL_POLICY: &str = "ELBSecurityPolicy-2016-08";

/// A listener on a network load balancer, forwarding to one target group
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkLoadBalancerListener {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub load_balancer: TaskRef,
    pub target_group: Option<TaskRef>,
    pub port: u16,

    /// TLS certificate ARN; TLS when set, TCP otherwise
    pub ssl_certificate_id: Option<String>,

    pub ssl_policy: Option<String>,

    /// Observed default-action target group
    pub target_group_arn: Option<String>,

    /// Observed
    pub arn: Option<String>,
}

impl NetworkLoadBalancerListener {
    pub fn protocol(&self) -> &'static str {
        if self.ssl_certificate_id.is_some() {
            "TLS"
        } else {
            "TCP"
        }
    }

    /// Terraform resource name: `<load balancer>-<port>`
    pub fn terraform_name(&self) -> String {
        terraform_label(&format!("{}-{}", self.load_balancer.name(), self.port))
    }

    fn observed(&self, description: ListenerDescription) -> Self {
        let target_group_arn = description.forward_target_group().map(str::to_string);
        NetworkLoadBalancerListener {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            load_balancer: self.load_balancer.clone(),
            target_group: self.target_group.clone(),
            port: description.port,
            ssl_certificate_id: description.certificates.into_iter().next(),
            ssl_policy: description.ssl_policy,
            target_group_arn,
            arn: Some(description.arn),
        }
    }

    async fn create(&self, cloud: &AwsCloud) -> Result<String> {
        let key = self.key();
        let load_balancer_arn = self.load_balancer.require_id(&key)?;
        let target_group = self
            .target_group
            .as_ref()
            .ok_or_else(|| self.missing_target_group())?;
        let target_group_arn = target_group.require_id(&key)?;

        let created = cloud
            .api()
            .create_listener(CreateListenerRequest {
                load_balancer_arn,
                port: self.port,
                protocol: self.protocol().to_string(),
                certificate_arn: self.ssl_certificate_id.clone(),
                ssl_policy: self.ssl_policy.clone(),
                default_target_group_arn: target_group_arn,
            })
            .await
            .map_err(|e| CloudError::backend("creating listener", e))?;
        tracing::info!(
            "Created {} listener {} on port {} ({})",
            self.protocol(),
            self.name,
            self.port,
            created.arn
        );
        Ok(created.arn)
    }

    fn missing_target_group(&self) -> CloudError {
        CloudError::DisallowedChange {
            kind: Self::KIND.to_string(),
            name: self.name.clone(),
            field: "target_group".to_string(),
        }
    }
}

#[async_trait]
impl Resource<AwsCloud> for NetworkLoadBalancerListener {
    const KIND: &'static str = "NetworkLoadBalancerListener";

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        let mut deps = vec![self.load_balancer.clone()];
        deps.extend(self.target_group.iter().cloned());
        deps
    }

    fn id(&self) -> Option<&str> {
        self.arn.as_deref()
    }

    /// Listeners are scoped to their load balancer and identified by port
    async fn find(&self, cloud: &AwsCloud) -> Result<Option<Self>> {
        let Some(load_balancer_arn) = self.load_balancer.id() else {
            return Err(CloudError::MissingDependency {
                task: self.key().to_string(),
                dependency: self.load_balancer.key().to_string(),
            });
        };

        tracing::debug!("Listing listeners for {}", load_balancer_arn);
        let mut matches = Vec::new();
        let mut marker = None;
        loop {
            let page = cloud
                .api()
                .describe_listeners(&load_balancer_arn, marker.take())
                .await
                .map_err(|e| CloudError::backend("listing listeners", e))?;
            matches.extend(page.items.into_iter().filter(|l| l.port == self.port));
            match page.next_marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => break,
            }
        }

        let found = expect_one(Self::KIND, &self.name, matches)?;
        Ok(found.map(|description| self.observed(description)))
    }

    fn normalize(&mut self) -> Result<()> {
        if self.ssl_certificate_id.is_some() {
            self.ssl_policy
                .get_or_insert_with(|| DEFAULT_SSL_POLICY.to_string());
        } else {
            self.ssl_policy = None;
        }
        Ok(())
    }

    fn changed_fields(&self, actual: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.port != actual.port {
            changed.push("port");
        }
        if self.ssl_certificate_id != actual.ssl_certificate_id {
            changed.push("ssl_certificate_id");
        }
        if self.ssl_policy != actual.ssl_policy {
            changed.push("ssl_policy");
        }
        // An undeclared target group is left as it is
        if let Some(target_group) = &self.target_group
            && target_group.id() != actual.target_group_arn
        {
            changed.push("target_group");
        }
        changed
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["port", "ssl_certificate_id"]
    }

    fn check_changes(&self, actual: Option<&Self>, delta: &Delta) -> Result<()> {
        if matches!(delta, Delta::Create | Delta::Recreate(_)) && self.target_group.is_none() {
            return Err(self.missing_target_group());
        }
        check_immutable::<AwsCloud, _>(self, actual, delta)
    }

    async fn render_live(
        &self,
        cloud: &AwsCloud,
        actual: Option<&Self>,
        delta: &Delta,
    ) -> Result<String> {
        let actual_arn = actual.and_then(|a| a.arn.clone());
        match (delta, actual_arn) {
            (Delta::Create, _) => self.create(cloud).await,
            (Delta::Recreate(fields), Some(arn)) => {
                tracing::warn!(
                    "Deleting listener {} ({}) to change {}",
                    self.name,
                    arn,
                    fields.join(", ")
                );
                cloud
                    .api()
                    .delete_listener(&arn)
                    .await
                    .map_err(|e| CloudError::backend("deleting listener", e))?;
                self.create(cloud).await
            }
            (Delta::Update(_), Some(arn)) => {
                let key = self.key();
                let default_target_group_arn = match &self.target_group {
                    Some(tg) if delta.touches("target_group") => Some(tg.require_id(&key)?),
                    _ => None,
                };
                let ssl_policy = if delta.touches("ssl_policy") {
                    self.ssl_policy.clone()
                } else {
                    None
                };

                if ssl_policy.is_some() || default_target_group_arn.is_some() {
                    tracing::info!("Updating listener {}: {}", self.name, delta);
                    cloud
                        .api()
                        .modify_listener(ModifyListenerRequest {
                            listener_arn: arn.clone(),
                            ssl_policy,
                            default_target_group_arn,
                        })
                        .await
                        .map_err(|e| CloudError::backend("modifying listener", e))?;
                }
                Ok(arn)
            }
            (Delta::NoOp, Some(arn)) => Ok(arn),
            (_, None) => Err(CloudError::InternalConsistency(format!(
                "listener {} has a pending {} but no live ARN",
                self.name, delta
            ))),
        }
    }

    fn render_text(&self, target: &TextTarget, _delta: &Delta) -> Result<()> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "load_balancer_arn".to_string(),
            arn_field(&self.load_balancer, "aws_lb"),
        );
        fields.insert("port".to_string(), FieldValue::literal(self.port));
        fields.insert("protocol".to_string(), FieldValue::literal(self.protocol()));

        if let Some(certificate) = &self.ssl_certificate_id {
            fields.insert(
                "certificate_arn".to_string(),
                FieldValue::literal(certificate.clone()),
            );
            if let Some(policy) = &self.ssl_policy {
                fields.insert("ssl_policy".to_string(), FieldValue::literal(policy.clone()));
            }
        }

        if let Some(target_group) = &self.target_group {
            let mut action = BTreeMap::new();
            action.insert("type".to_string(), FieldValue::literal("forward"));
            action.insert(
                "target_group_arn".to_string(),
                arn_field(target_group, "aws_lb_target_group"),
            );
            fields.insert(
                "default_action".to_string(),
                FieldValue::List(vec![FieldValue::Block(action)]),
            );
        }

        target.render_resource("aws_lb_listener", &self.terraform_name(), fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(certificate: Option<&str>) -> NetworkLoadBalancerListener {
        NetworkLoadBalancerListener {
            name: "api-443".to_string(),
            lifecycle: Lifecycle::CreateOrUpdate,
            load_balancer: TaskRef::unresolved("NetworkLoadBalancer", "api"),
            target_group: Some(TaskRef::unresolved("TargetGroup", "tcp")),
            port: 443,
            ssl_certificate_id: certificate.map(str::to_string),
            ssl_policy: None,
            target_group_arn: None,
            arn: None,
        }
    }

    #[test]
    fn test_normalize_tls_policy() {
        let mut tls = listener(Some("arn:cert"));
        tls.normalize().unwrap();
        assert_eq!(tls.ssl_policy.as_deref(), Some(DEFAULT_SSL_POLICY));
        assert_eq!(tls.protocol(), "TLS");

        let once = tls.clone();
        tls.normalize().unwrap();
        assert_eq!(tls, once);

        let mut tcp = NetworkLoadBalancerListener {
            ssl_policy: Some("ELBSecurityPolicy-TLS13-1-2-2021-06".to_string()),
            ..listener(None)
        };
        tcp.normalize().unwrap();
        assert_eq!(tcp.ssl_policy, None);
        assert_eq!(tcp.protocol(), "TCP");
    }

    #[test]
    fn test_certificate_change_is_rejected_as_update() {
        let mut declared = listener(Some("arn:cert/new"));
        declared.normalize().unwrap();
        let actual = NetworkLoadBalancerListener {
            ssl_certificate_id: Some("arn:cert/old".to_string()),
            arn: Some("arn:listener".to_string()),
            ..declared.clone()
        };

        let changed = declared.changed_fields(&actual);
        assert_eq!(changed, vec!["ssl_certificate_id"]);
        assert_eq!(
            Delta::from_changes(changed.clone(), declared.immutable_fields()),
            Delta::Recreate(changed)
        );
        match declared.check_changes(Some(&actual), &Delta::Update(vec!["ssl_certificate_id"])) {
            Err(CloudError::DisallowedChange { field, .. }) => {
                assert_eq!(field, "ssl_certificate_id")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_create_without_target_group_is_rejected() {
        let declared = NetworkLoadBalancerListener {
            target_group: None,
            ..listener(None)
        };
        assert!(matches!(
            declared.check_changes(None, &Delta::Create),
            Err(CloudError::DisallowedChange { .. })
        ));
    }

    #[test]
    fn test_render_text_with_unresolved_dependencies() {
        let mut declared = listener(Some("arn:cert"));
        declared.normalize().unwrap();
        let target = TextTarget::new();
        declared.render_text(&target, &Delta::Create).unwrap();

        let block = &target.blocks()[0];
        assert_eq!(block.kind, "aws_lb_listener");
        assert_eq!(block.name, "api-443");
        assert_eq!(block.references().len(), 2);
        assert_eq!(
            target.to_terraform_json()["resource"]["aws_lb_listener"]["api-443"]
                ["load_balancer_arn"],
            "${aws_lb.api.arn}"
        );
        assert_eq!(
            block.field("ssl_policy"),
            Some(&FieldValue::literal(DEFAULT_SSL_POLICY))
        );
    }

    #[test]
    fn test_undeclared_target_group_is_left_alone() {
        let declared = NetworkLoadBalancerListener {
            target_group: None,
            ..listener(None)
        };
        let actual = NetworkLoadBalancerListener {
            target_group_arn: Some("arn:tg/other".to_string()),
            arn: Some("arn:listener".to_string()),
            ..declared.clone()
        };
        assert!(declared.changed_fields(&actual).is_empty());

        let forwarding = NetworkLoadBalancerListener {
            target_group: Some(TaskRef::resolved("TargetGroup", "tcp", "arn:tg/tcp")),
            ..listener(None)
        };
        assert_eq!(forwarding.changed_fields(&actual), vec!["target_group"]);
    }

    #[test]
    fn test_terraform_name_for_external_load_balancer() {
        let declared = NetworkLoadBalancerListener {
            load_balancer: TaskRef::resolved(
                "NetworkLoadBalancer",
                "arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/net/legacy/abc",
                "arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/net/legacy/abc",
            ),
            port: 8443,
            ..listener(None)
        };
        assert_eq!(declared.terraform_name(), "legacy_abc-8443");
        assert_eq!(listener(None).terraform_name(), "api-443");
    }
}
