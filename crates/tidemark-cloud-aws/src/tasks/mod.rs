//! ELBv2 resource kinds

mod listener;
mod load_balancer;
mod target_group;

pub use listener::{DEFAULT_SSL_POLICY, NetworkLoadBalancerListener};
pub use load_balancer::NetworkLoadBalancer;
pub use target_group::TargetGroup;

use std::collections::BTreeMap;
use tidemark_cloud::{CloudError, FieldValue, Result, Tag, TaskRef, Tags};

/// Reduce candidate matches to at most one
fn expect_one<T>(kind: &str, name: &str, mut matches: Vec<T>) -> Result<Option<T>> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(CloudError::AmbiguousMatch {
            kind: kind.to_string(),
            name: name.to_string(),
            count,
        }),
    }
}

/// Whether every desired tag is present on the live object
fn tags_match(desired: &Tags, actual: &Tags) -> bool {
    desired.iter().all(|(k, v)| actual.get(k) == Some(v))
}

/// Desired tags that are missing or different on the live object
fn tags_to_add(desired: &Tags, actual: &Tags) -> Vec<Tag> {
    desired
        .iter()
        .filter(|(k, v)| actual.get(*k) != Some(*v))
        .map(|(k, v)| Tag::new(k.clone(), v.clone()))
        .collect()
}

fn tags_field(tags: &Tags) -> FieldValue {
    FieldValue::Block(
        tags.iter()
            .map(|(k, v)| (k.clone(), FieldValue::literal(v.clone())))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// The dependency's id when it is known, otherwise a symbolic `<resource>.<name>.arn`
fn arn_field(dependency: &TaskRef, resource_type: &str) -> FieldValue {
    match dependency.id() {
        Some(arn) => FieldValue::literal(arn),
        None => FieldValue::reference(resource_type, dependency.name(), "arn"),
    }
}

/// Terraform resource label for `name`
///
/// An ARN is shortened to its last two resource segments. Characters
/// Terraform rejects in labels become `_`.
fn terraform_label(name: &str) -> String {
    let base = match name.strip_prefix("arn:") {
        Some(arn) => {
            let resource = arn.rsplit(':').next().unwrap_or(arn);
            let segments: Vec<&str> = resource.split('/').collect();
            segments[segments.len().saturating_sub(2)..].join("_")
        }
        None => name.to_string(),
    };
    let mut label: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !label.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        label.insert(0, '_');
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expect_one() {
        assert_eq!(expect_one::<u8>("TargetGroup", "tcp", vec![]).unwrap(), None);
        assert_eq!(expect_one("TargetGroup", "tcp", vec![1]).unwrap(), Some(1));
        match expect_one("TargetGroup", "tcp", vec![1, 2]) {
            Err(CloudError::AmbiguousMatch { count, .. }) => assert_eq!(count, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_tags_to_add() {
        let desired = tags(&[("Name", "tcp"), ("KubernetesCluster", "c")]);
        let actual = tags(&[("Name", "tcp"), ("extra", "x")]);
        assert!(!tags_match(&desired, &actual));
        assert_eq!(
            tags_to_add(&desired, &actual),
            vec![Tag::new("KubernetesCluster", "c")]
        );
    }

    #[test]
    fn test_arn_field() {
        assert_eq!(
            arn_field(&TaskRef::unresolved("TargetGroup", "tcp"), "aws_lb_target_group"),
            FieldValue::reference("aws_lb_target_group", "tcp", "arn")
        );
        assert_eq!(
            arn_field(&TaskRef::resolved("TargetGroup", "tcp", "arn:tg"), "aws_lb_target_group"),
            FieldValue::literal("arn:tg")
        );
    }

    #[test]
    fn test_terraform_label() {
        assert_eq!(terraform_label("api-443"), "api-443");
        assert_eq!(
            terraform_label("arn:aws:elasticloadbalancing:us-east-1:1:loadbalancer/net/legacy/abc"),
            "legacy_abc"
        );
        assert_eq!(terraform_label("edge.lb"), "edge_lb");
        assert_eq!(terraform_label("1st"), "_1st");
    }
}
