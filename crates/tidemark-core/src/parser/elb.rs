//! ロードバランサー関連ノードのパース

use crate::error::{Result, StackError};
use crate::model::{HealthCheckSpec, ListenerSpec, LoadBalancerSpec, ResourceRef, TargetGroupSpec};
use kdl::KdlNode;
use std::collections::BTreeMap;

/// 最初の文字列引数
fn string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// 全ての文字列引数
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

fn u32_arg(node: &KdlNode) -> Option<u32> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .and_then(|v| u32::try_from(v).ok())
}

/// 1..=65535 のポート番号
fn port_arg(node: &KdlNode, owner: &str) -> Result<u16> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .and_then(|v| u16::try_from(v).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| StackError::InvalidConfig(format!("{} has an invalid port", owner)))
}

fn name_arg(node: &KdlNode, kind: &str) -> Result<String> {
    string_arg(node)
        .ok_or_else(|| StackError::InvalidConfig(format!("{} requires a name", kind)))
}

/// tags ブロックをパース
///
/// 例: tags { KubernetesCluster "prod.example.com" }
pub fn parse_tags(node: &KdlNode) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if let Some(children) = node.children() {
        for tag in children.nodes() {
            let key = tag.name().value().to_string();
            let value = string_arg(tag).unwrap_or_default();
            tags.insert(key, value);
        }
    }
    tags
}

/// 参照ノードをパース
///
/// サポートされる形式:
/// - 名前参照: load-balancer "api"
/// - ARN参照: load-balancer arn="arn:aws:elasticloadbalancing:..."
fn parse_ref(node: &KdlNode) -> Option<ResourceRef> {
    if let Some(arn) = node.get("arn").and_then(|v| v.as_string()) {
        return Some(ResourceRef::Arn(arn.to_string()));
    }
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| ResourceRef::Named(s.to_string()))
}

/// load-balancer ノードをパース
pub fn parse_load_balancer(node: &KdlNode) -> Result<LoadBalancerSpec> {
    let mut lb = LoadBalancerSpec {
        name: name_arg(node, "load-balancer")?,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "lifecycle" => lb.lifecycle = string_arg(child),
                "scheme" => lb.scheme = string_arg(child),
                "subnets" | "subnet" => lb.subnets.extend(string_args(child)),
                "tags" => lb.tags = parse_tags(child),
                other => {
                    tracing::warn!("load-balancer '{}': unknown field '{}'", lb.name, other);
                }
            }
        }
    }

    Ok(lb)
}

/// target-group ノードをパース
pub fn parse_target_group(node: &KdlNode) -> Result<TargetGroupSpec> {
    let mut tg = TargetGroupSpec {
        name: name_arg(node, "target-group")?,
        ..Default::default()
    };
    let owner = format!("target-group '{}'", tg.name);
    let mut port = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "lifecycle" => tg.lifecycle = string_arg(child),
                "port" => port = Some(port_arg(child, &owner)?),
                "protocol" => tg.protocol = string_arg(child).unwrap_or_default(),
                "vpc" | "vpc-id" | "vpc_id" => tg.vpc = string_arg(child).unwrap_or_default(),
                "health-check" | "health_check" => {
                    tg.health_check = Some(parse_health_check(child));
                }
                "tags" => tg.tags = parse_tags(child),
                other => {
                    tracing::warn!("{}: unknown field '{}'", owner, other);
                }
            }
        }
    }

    tg.port = port.ok_or_else(|| StackError::InvalidConfig(format!("{} requires a port", owner)))?;
    if tg.protocol.is_empty() {
        return Err(StackError::InvalidConfig(format!(
            "{} requires a protocol",
            owner
        )));
    }
    if tg.vpc.is_empty() {
        return Err(StackError::InvalidConfig(format!("{} requires a vpc", owner)));
    }

    Ok(tg)
}

/// health-check ブロックをパース
fn parse_health_check(node: &KdlNode) -> HealthCheckSpec {
    let mut hc = HealthCheckSpec::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "protocol" => hc.protocol = string_arg(child),
                // 数値と "traffic-port" の両方を受け付ける
                "port" => {
                    hc.port = child.entries().first().and_then(|e| {
                        let value = e.value();
                        value
                            .as_string()
                            .map(|s| s.to_string())
                            .or_else(|| value.as_integer().map(|v| v.to_string()))
                    });
                }
                "interval" => hc.interval = u32_arg(child),
                "healthy-threshold" | "healthy_threshold" => hc.healthy_threshold = u32_arg(child),
                "unhealthy-threshold" | "unhealthy_threshold" => {
                    hc.unhealthy_threshold = u32_arg(child)
                }
                _ => {}
            }
        }
    }

    hc
}

/// listener ノードをパース
pub fn parse_listener(node: &KdlNode) -> Result<ListenerSpec> {
    let name = name_arg(node, "listener")?;
    let owner = format!("listener '{}'", name);

    let mut lifecycle = None;
    let mut load_balancer = None;
    let mut target_group = None;
    let mut port = None;
    let mut certificate = None;
    let mut ssl_policy = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "lifecycle" => lifecycle = string_arg(child),
                "load-balancer" | "load_balancer" => load_balancer = parse_ref(child),
                "target-group" | "target_group" => target_group = parse_ref(child),
                "port" => port = Some(port_arg(child, &owner)?),
                "certificate" | "ssl-certificate" => certificate = string_arg(child),
                "ssl-policy" | "ssl_policy" => ssl_policy = string_arg(child),
                other => {
                    tracing::warn!("{}: unknown field '{}'", owner, other);
                }
            }
        }
    }

    Ok(ListenerSpec {
        load_balancer: load_balancer.ok_or_else(|| {
            StackError::InvalidConfig(format!("{} requires a load-balancer", owner))
        })?,
        port: port.ok_or_else(|| StackError::InvalidConfig(format!("{} requires a port", owner)))?,
        name,
        lifecycle,
        target_group,
        certificate,
        ssl_policy,
    })
}
