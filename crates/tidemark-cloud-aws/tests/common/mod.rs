use anyhow::{Context, bail};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tidemark_cloud::{Page, Tag, TagDescription, Tags};
use tidemark_cloud_aws::{
    CreateListenerRequest, CreateLoadBalancerRequest, CreateTargetGroupRequest, ElbV2Api,
    HealthCheck, ListenerAction, ListenerDescription, LoadBalancerDescription,
    ModifyListenerRequest, ModifyTargetGroupRequest, TargetGroupDescription,
};

pub const CLUSTER: &str = "prod.example.com";

pub fn owned_tags() -> Tags {
    [("KubernetesCluster".to_string(), CLUSTER.to_string())].into()
}

#[derive(Default)]
struct State {
    target_groups: Vec<TargetGroupDescription>,
    load_balancers: Vec<LoadBalancerDescription>,
    listeners: Vec<ListenerDescription>,
    tags: BTreeMap<String, Tags>,
    next_id: usize,
}

impl State {
    fn arn(&mut self, kind: &str, name: &str) -> String {
        self.next_id += 1;
        format!("arn:aws:elasticloadbalancing:{}/{}/{}", kind, name, self.next_id)
    }
}

/// In-memory ELBv2 that counts calls per operation
#[derive(Default)]
pub struct FakeElbV2 {
    state: Mutex<State>,
    calls: Mutex<BTreeMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

fn page<T: Clone>(items: &[T], marker: Option<String>, page_size: usize) -> anyhow::Result<Page<T>> {
    let start = match marker {
        Some(m) => m.parse::<usize>().context("bad marker")?,
        None => 0,
    };
    let end = (start + page_size.max(1)).min(items.len());
    Ok(Page {
        items: items[start.min(end)..end].to_vec(),
        next_marker: (end < items.len()).then(|| end.to_string()),
    })
}

fn tag_map(tags: &[Tag]) -> Tags {
    tags.iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

#[allow(dead_code)]
impl FakeElbV2 {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, operation: &str) -> anyhow::Result<()> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default() += 1;
        if self.failing.lock().unwrap().contains(operation) {
            bail!("{} rejected by fake", operation);
        }
        Ok(())
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    /// Number of calls that mutate the backend
    pub fn mutations(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| !op.starts_with("describe"))
            .map(|(_, n)| n)
            .sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    pub fn seed_target_group(&self, tg: TargetGroupDescription, tags: Tags) -> String {
        let mut state = self.state.lock().unwrap();
        let arn = if tg.arn.is_empty() {
            state.arn("targetgroup", &tg.name)
        } else {
            tg.arn.clone()
        };
        state.tags.insert(arn.clone(), tags);
        state.target_groups.push(TargetGroupDescription {
            arn: arn.clone(),
            ..tg
        });
        arn
    }

    pub fn seed_load_balancer(&self, lb: LoadBalancerDescription, tags: Tags) -> String {
        let mut state = self.state.lock().unwrap();
        let arn = state.arn("loadbalancer/net", &lb.name);
        state.tags.insert(arn.clone(), tags);
        state.load_balancers.push(LoadBalancerDescription {
            arn: arn.clone(),
            ..lb
        });
        arn
    }

    pub fn seed_listener(&self, listener: ListenerDescription) -> String {
        let mut state = self.state.lock().unwrap();
        let arn = state.arn("listener", &listener.port.to_string());
        state.listeners.push(ListenerDescription {
            arn: arn.clone(),
            ..listener
        });
        arn
    }

    pub fn target_groups(&self) -> Vec<TargetGroupDescription> {
        self.state.lock().unwrap().target_groups.clone()
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancerDescription> {
        self.state.lock().unwrap().load_balancers.clone()
    }

    pub fn listeners(&self) -> Vec<ListenerDescription> {
        self.state.lock().unwrap().listeners.clone()
    }

    pub fn tags_of(&self, arn: &str) -> Tags {
        self.state
            .lock()
            .unwrap()
            .tags
            .get(arn)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ElbV2Api for FakeElbV2 {
    async fn describe_target_groups(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<TargetGroupDescription>> {
        self.record("describe_target_groups")?;
        page(&self.state.lock().unwrap().target_groups, marker, page_size)
    }

    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<LoadBalancerDescription>> {
        self.record("describe_load_balancers")?;
        page(&self.state.lock().unwrap().load_balancers, marker, page_size)
    }

    async fn describe_tags(&self, arns: &[String]) -> anyhow::Result<Vec<TagDescription>> {
        self.record("describe_tags")?;
        if arns.len() > 20 {
            bail!("describe_tags accepts at most 20 ARNs, got {}", arns.len());
        }
        let state = self.state.lock().unwrap();
        Ok(arns
            .iter()
            .filter_map(|arn| {
                state.tags.get(arn).map(|tags| TagDescription {
                    resource_id: arn.clone(),
                    tags: tags.iter().map(|(k, v)| Tag::new(k, v)).collect(),
                })
            })
            .collect())
    }

    async fn describe_listeners(
        &self,
        load_balancer_arn: &str,
        marker: Option<String>,
    ) -> anyhow::Result<Page<ListenerDescription>> {
        self.record("describe_listeners")?;
        let listeners: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .listeners
            .iter()
            .filter(|l| l.load_balancer_arn == load_balancer_arn)
            .cloned()
            .collect();
        page(&listeners, marker, 2)
    }

    async fn create_listener(
        &self,
        request: CreateListenerRequest,
    ) -> anyhow::Result<ListenerDescription> {
        self.record("create_listener")?;
        let mut state = self.state.lock().unwrap();
        let arn = state.arn("listener", &request.port.to_string());
        let listener = ListenerDescription {
            arn,
            load_balancer_arn: request.load_balancer_arn,
            port: request.port,
            protocol: request.protocol,
            certificates: request.certificate_arn.into_iter().collect(),
            ssl_policy: request.ssl_policy,
            default_actions: vec![ListenerAction::forward(request.default_target_group_arn)],
        };
        state.listeners.push(listener.clone());
        Ok(listener)
    }

    async fn modify_listener(&self, request: ModifyListenerRequest) -> anyhow::Result<()> {
        self.record("modify_listener")?;
        let mut state = self.state.lock().unwrap();
        let listener = state
            .listeners
            .iter_mut()
            .find(|l| l.arn == request.listener_arn)
            .context("listener not found")?;
        if let Some(policy) = request.ssl_policy {
            listener.ssl_policy = Some(policy);
        }
        if let Some(tg) = request.default_target_group_arn {
            listener.default_actions = vec![ListenerAction::forward(tg)];
        }
        Ok(())
    }

    async fn delete_listener(&self, listener_arn: &str) -> anyhow::Result<()> {
        self.record("delete_listener")?;
        self.state
            .lock()
            .unwrap()
            .listeners
            .retain(|l| l.arn != listener_arn);
        Ok(())
    }

    async fn create_target_group(
        &self,
        request: CreateTargetGroupRequest,
    ) -> anyhow::Result<TargetGroupDescription> {
        self.record("create_target_group")?;
        let mut state = self.state.lock().unwrap();
        let arn = state.arn("targetgroup", &request.name);
        let tg = TargetGroupDescription {
            arn: arn.clone(),
            name: request.name,
            port: request.port,
            protocol: request.protocol,
            vpc_id: request.vpc_id,
            health_check: request.health_check,
            load_balancer_arns: Vec::new(),
        };
        state.tags.insert(arn, tag_map(&request.tags));
        state.target_groups.push(tg.clone());
        Ok(tg)
    }

    async fn modify_target_group(&self, request: ModifyTargetGroupRequest) -> anyhow::Result<()> {
        self.record("modify_target_group")?;
        let mut state = self.state.lock().unwrap();
        let tg = state
            .target_groups
            .iter_mut()
            .find(|tg| tg.arn == request.target_group_arn)
            .context("target group not found")?;
        tg.health_check = request.health_check;
        Ok(())
    }

    async fn delete_target_group(&self, target_group_arn: &str) -> anyhow::Result<()> {
        self.record("delete_target_group")?;
        let mut state = self.state.lock().unwrap();
        state.target_groups.retain(|tg| tg.arn != target_group_arn);
        state.tags.remove(target_group_arn);
        Ok(())
    }

    async fn create_load_balancer(
        &self,
        request: CreateLoadBalancerRequest,
    ) -> anyhow::Result<LoadBalancerDescription> {
        self.record("create_load_balancer")?;
        let mut state = self.state.lock().unwrap();
        let arn = state.arn("loadbalancer/net", &request.name);
        let lb = LoadBalancerDescription {
            arn: arn.clone(),
            dns_name: Some(format!("{}.elb.amazonaws.com", request.name)),
            name: request.name,
            scheme: request.scheme,
            subnets: request.subnets,
            state: Some("provisioning".to_string()),
        };
        state.tags.insert(arn, tag_map(&request.tags));
        state.load_balancers.push(lb.clone());
        Ok(lb)
    }

    async fn delete_load_balancer(&self, load_balancer_arn: &str) -> anyhow::Result<()> {
        self.record("delete_load_balancer")?;
        let mut state = self.state.lock().unwrap();
        state.load_balancers.retain(|lb| lb.arn != load_balancer_arn);
        state
            .listeners
            .retain(|l| l.load_balancer_arn != load_balancer_arn);
        state.tags.remove(load_balancer_arn);
        Ok(())
    }

    async fn set_subnets(&self, load_balancer_arn: &str, subnets: &[String]) -> anyhow::Result<()> {
        self.record("set_subnets")?;
        let mut state = self.state.lock().unwrap();
        let lb = state
            .load_balancers
            .iter_mut()
            .find(|lb| lb.arn == load_balancer_arn)
            .context("load balancer not found")?;
        lb.subnets = subnets.to_vec();
        Ok(())
    }

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> anyhow::Result<()> {
        self.record("add_tags")?;
        self.state
            .lock()
            .unwrap()
            .tags
            .entry(arn.to_string())
            .or_default()
            .extend(tag_map(tags));
        Ok(())
    }
}

/// A target group as it would look after a create with default health checks
#[allow(dead_code)]
pub fn tcp_target_group(name: &str, port: u16) -> TargetGroupDescription {
    TargetGroupDescription {
        arn: String::new(),
        name: name.to_string(),
        port,
        protocol: "TCP".to_string(),
        vpc_id: "vpc-1".to_string(),
        health_check: HealthCheck {
            protocol: Some("TCP".to_string()),
            port: Some("traffic-port".to_string()),
            interval_seconds: Some(30),
            healthy_threshold: Some(5),
            unhealthy_threshold: Some(2),
        },
        load_balancer_arns: Vec::new(),
    }
}
