//! Turning a declared stack into a task graph, and running it

use crate::api::{ElbV2Api, HealthCheck};
use crate::cloud::AwsCloud;
use crate::error::Result;
use crate::tasks::{NetworkLoadBalancer, NetworkLoadBalancerListener, TargetGroup};
use std::path::PathBuf;
use std::sync::Arc;
use tidemark_cloud::{
    CancellationToken, Lifecycle, Resource, RunReport, Runner, RunnerConfig, Target, TaskGraph,
    TaskRef, Tags,
};
use tidemark_core::{HealthCheckSpec, ResourceRef, Stack, TargetKind};

/// Result of [`converge`]
#[derive(Debug)]
pub struct Convergence {
    pub report: RunReport,

    /// Terraform file written by a successful text pass
    pub written: Option<PathBuf>,
}

fn lifecycle(declared: Option<&str>) -> Result<Lifecycle> {
    Ok(declared
        .map(str::parse::<Lifecycle>)
        .transpose()?
        .unwrap_or_default())
}

/// Ownership tags first, then the resource's own
fn desired_tags(owned: &Tags, own: &Tags) -> Tags {
    let mut tags = owned.clone();
    tags.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
    tags
}

fn health_check(spec: Option<&HealthCheckSpec>) -> HealthCheck {
    spec.map(|hc| HealthCheck {
        protocol: hc.protocol.clone(),
        port: hc.port.clone(),
        interval_seconds: hc.interval,
        healthy_threshold: hc.healthy_threshold,
        unhealthy_threshold: hc.unhealthy_threshold,
    })
    .unwrap_or_default()
}

fn resolve_ref(graph: &mut TaskGraph<AwsCloud>, kind: &str, reference: &ResourceRef) -> TaskRef {
    match reference {
        ResourceRef::Named(name) => graph.reference(kind, name),
        ResourceRef::Arn(arn) => TaskRef::resolved(kind, arn.clone(), arn.clone()),
    }
}

/// Build the task graph for every resource in the stack
pub fn build_graph(stack: &Stack) -> Result<TaskGraph<AwsCloud>> {
    let owned = stack.owned_tags();
    let mut graph = TaskGraph::new();

    for tg in &stack.target_groups {
        graph.add(TargetGroup {
            name: tg.name.clone(),
            lifecycle: lifecycle(tg.lifecycle.as_deref())?,
            port: tg.port,
            protocol: tg.protocol.clone(),
            vpc_id: tg.vpc.clone(),
            health_check: health_check(tg.health_check.as_ref()),
            tags: desired_tags(&owned, &tg.tags),
            arn: None,
        })?;
    }

    for lb in &stack.load_balancers {
        graph.add(NetworkLoadBalancer {
            name: lb.name.clone(),
            lifecycle: lifecycle(lb.lifecycle.as_deref())?,
            scheme: lb.scheme.clone(),
            subnets: lb.subnets.clone(),
            tags: desired_tags(&owned, &lb.tags),
            arn: None,
            dns_name: None,
        })?;
    }

    for listener in &stack.listeners {
        let load_balancer = resolve_ref(
            &mut graph,
            <NetworkLoadBalancer as Resource<AwsCloud>>::KIND,
            &listener.load_balancer,
        );
        let target_group = listener
            .target_group
            .as_ref()
            .map(|tg| resolve_ref(&mut graph, <TargetGroup as Resource<AwsCloud>>::KIND, tg));

        graph.add(NetworkLoadBalancerListener {
            name: listener.name.clone(),
            lifecycle: lifecycle(listener.lifecycle.as_deref())?,
            load_balancer,
            target_group,
            port: listener.port,
            ssl_certificate_id: listener.certificate.clone(),
            ssl_policy: listener.ssl_policy.clone(),
            target_group_arn: None,
            arn: None,
        })?;
    }

    tracing::debug!(
        "Built task graph for {}: {} tasks",
        stack.cluster,
        graph.len()
    );
    Ok(graph)
}

/// Run one convergence pass of `stack` against the ELBv2 API.
///
/// The target comes from the stack's `engine` settings. A terraform pass
/// writes its output only when every task converged.
#[tracing::instrument(skip_all, fields(cluster = %stack.cluster, target = ?stack.engine.target))]
pub async fn converge(
    stack: &Stack,
    api: Arc<dyn ElbV2Api>,
    cancel: CancellationToken,
) -> Result<Convergence> {
    let engine = &stack.engine;
    let cloud =
        AwsCloud::new(api, stack.owned_tags()).with_tag_batch_limit(engine.tag_batch_limit);
    let runner = Runner::new(build_graph(stack)?)
        .with_config(RunnerConfig {
            parallelism: engine.parallelism.max(1),
        })
        .with_cancellation(cancel);

    let target = match engine.target {
        TargetKind::Live => Target::Live,
        TargetKind::Terraform => Target::text(),
        TargetKind::DryRun => Target::DryRun,
    };

    let report = runner.run(&cloud, &target).await?;
    let summary = report.summary();
    tracing::info!("Convergence finished: {}", summary);

    let written = match target.as_text() {
        Some(text) if report.is_success() => Some(text.write_to(&engine.output).await?),
        Some(_) => {
            tracing::warn!(
                "Not writing terraform output: {} task(s) did not converge",
                report.failures().len()
            );
            None
        }
        None => None,
    };

    Ok(Convergence { report, written })
}
