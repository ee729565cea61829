//! KDLパーサー
//!
//! スタックファイル（stack.kdl）をパースします。

mod elb;

pub use elb::{parse_listener, parse_load_balancer, parse_tags, parse_target_group};

use crate::error::{Result, StackError};
use crate::model::{EngineSettings, ListenerSpec, Stack};
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// KDLファイルをパースしてStackを生成
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| StackError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    parse_stack_string(&content)
}

/// KDL文字列をパース
pub fn parse_stack_string(content: &str) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;
    let mut stack = Stack::default();

    for node in doc.nodes() {
        match node.name().value() {
            "cluster" => {
                stack.cluster = node
                    .entries()
                    .first()
                    .and_then(|e| e.value().as_string())
                    .ok_or_else(|| StackError::InvalidConfig("cluster requires a name".to_string()))?
                    .to_string();
            }
            "tags" => stack.tags.extend(parse_tags(node)),
            "engine" => stack.engine = parse_engine(node)?,
            "load-balancer" => stack.load_balancers.push(parse_load_balancer(node)?),
            "target-group" => stack.target_groups.push(parse_target_group(node)?),
            "listener" => stack.listeners.push(parse_listener(node)?),
            other => {
                tracing::warn!("Unknown top-level node '{}'", other);
            }
        }
    }

    validate(&stack)?;
    tracing::debug!(
        cluster = %stack.cluster,
        resources = stack.resource_count(),
        "Parsed stack"
    );
    Ok(stack)
}

/// engine ノードをパース
fn parse_engine(node: &KdlNode) -> Result<EngineSettings> {
    let mut engine = EngineSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let first = child.entries().first().map(|e| e.value());
            match child.name().value() {
                "target" => {
                    let value = first.and_then(|v| v.as_string()).unwrap_or("");
                    engine.target = value.parse().map_err(StackError::InvalidConfig)?;
                }
                "parallelism" => {
                    engine.parallelism = first
                        .and_then(|v| v.as_integer())
                        .and_then(|v| usize::try_from(v).ok())
                        .filter(|v| *v > 0)
                        .ok_or_else(|| {
                            StackError::InvalidConfig(
                                "engine parallelism must be a positive integer".to_string(),
                            )
                        })?;
                }
                "tag-batch-limit" | "tag_batch_limit" => {
                    engine.tag_batch_limit = first
                        .and_then(|v| v.as_integer())
                        .and_then(|v| usize::try_from(v).ok())
                        .filter(|v| *v > 0)
                        .ok_or_else(|| {
                            StackError::InvalidConfig(
                                "engine tag-batch-limit must be a positive integer".to_string(),
                            )
                        })?;
                }
                "output" => {
                    if let Some(output) = first.and_then(|v| v.as_string()) {
                        engine.output = PathBuf::from(output);
                    }
                }
                other => {
                    tracing::warn!("engine: unknown field '{}'", other);
                }
            }
        }
    }

    Ok(engine)
}

/// 名前の重複と参照先の存在をチェック
fn validate(stack: &Stack) -> Result<()> {
    check_unique("load-balancer", stack.load_balancers.iter().map(|r| &r.name))?;
    check_unique("target-group", stack.target_groups.iter().map(|r| &r.name))?;
    check_unique("listener", stack.listeners.iter().map(|r| &r.name))?;

    for listener in &stack.listeners {
        check_listener_refs(stack, listener)?;
    }
    Ok(())
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a String>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(StackError::DuplicateResource {
                kind: kind.to_string(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

fn check_listener_refs(stack: &Stack, listener: &ListenerSpec) -> Result<()> {
    let from = format!("listener '{}'", listener.name);

    if let Some(name) = listener.load_balancer.as_named()
        && stack.load_balancer(name).is_none()
    {
        return Err(StackError::UnknownReference {
            from,
            kind: "load-balancer".to_string(),
            name: name.to_string(),
        });
    }

    if let Some(name) = listener.target_group.as_ref().and_then(|r| r.as_named())
        && stack.target_group(name).is_none()
    {
        return Err(StackError::UnknownReference {
            from,
            kind: "target-group".to_string(),
            name: name.to_string(),
        });
    }

    Ok(())
}
