mod common;

use common::{CLUSTER, FakeElbV2, owned_tags, tcp_target_group};
use std::sync::Arc;
use tidemark_cloud::{CloudError, StatusStore, Tags};
use tidemark_cloud_aws::{AwsCloud, LoadBalancerDescription, list_target_groups};
use tidemark_core::EngineSettings;

fn named(owned: &Tags, name: &str) -> Tags {
    let mut tags = owned.clone();
    tags.insert("Name".to_string(), name.to_string());
    tags
}

#[tokio::test]
async fn test_tag_lookups_are_batched() {
    let fake = Arc::new(FakeElbV2::new());
    for i in 0..45 {
        let name = format!("tg-{}", i);
        fake.seed_target_group(tcp_target_group(&name, 443), named(&owned_tags(), &name));
    }

    let cloud = AwsCloud::new(fake.clone(), owned_tags());
    assert_eq!(
        cloud.tag_batch_limit(),
        EngineSettings::default().tag_batch_limit
    );
    let groups = list_target_groups(&cloud).await.unwrap();

    assert_eq!(groups.len(), 45);
    assert_eq!(fake.calls("describe_tags"), 3);
    assert_eq!(fake.calls("describe_target_groups"), 3);
    assert_eq!(groups[44].name_tag(), Some("tg-44"));
    assert_eq!(groups[0].get_tag("KubernetesCluster"), Some(CLUSTER));
}

#[tokio::test]
async fn test_smaller_batch_limit() {
    let fake = Arc::new(FakeElbV2::new());
    for i in 0..7 {
        let name = format!("tg-{}", i);
        fake.seed_target_group(tcp_target_group(&name, 443), named(&owned_tags(), &name));
    }

    let cloud = AwsCloud::new(fake.clone(), owned_tags()).with_tag_batch_limit(3);
    assert_eq!(list_target_groups(&cloud).await.unwrap().len(), 7);
    assert_eq!(fake.calls("describe_tags"), 3);
}

#[tokio::test]
async fn test_only_owned_target_groups_are_listed() {
    let fake = Arc::new(FakeElbV2::new());
    fake.seed_target_group(tcp_target_group("ours", 443), named(&owned_tags(), "ours"));
    let other: Tags = [("KubernetesCluster".to_string(), "staging".to_string())].into();
    fake.seed_target_group(tcp_target_group("theirs", 443), named(&other, "theirs"));
    fake.seed_target_group(tcp_target_group("untagged", 443), Tags::new());

    let cloud = AwsCloud::new(fake, owned_tags());
    let groups = list_target_groups(&cloud).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name_tag(), Some("ours"));
}

#[tokio::test]
async fn test_listing_failure_discards_partial_results() {
    let fake = Arc::new(FakeElbV2::new());
    fake.seed_target_group(tcp_target_group("a", 443), named(&owned_tags(), "a"));
    fake.fail("describe_tags");

    let cloud = AwsCloud::new(fake, owned_tags());
    assert!(matches!(
        list_target_groups(&cloud).await,
        Err(CloudError::BackendQuery { .. })
    ));
}

#[tokio::test]
async fn test_api_ingress_status_from_load_balancers() {
    let fake = Arc::new(FakeElbV2::new());
    for name in ["b-api", "a-api"] {
        fake.seed_load_balancer(
            LoadBalancerDescription {
                name: name.to_string(),
                dns_name: Some(format!("{}.elb.amazonaws.com", name)),
                scheme: "internet-facing".to_string(),
                ..Default::default()
            },
            named(&owned_tags(), name),
        );
    }

    let cloud = AwsCloud::new(fake, owned_tags());
    let ingress = cloud.get_api_ingress_status(CLUSTER).await.unwrap();
    let hostnames: Vec<_> = ingress.iter().filter_map(|i| i.hostname.as_deref()).collect();
    assert_eq!(
        hostnames,
        vec!["a-api.elb.amazonaws.com", "b-api.elb.amazonaws.com"]
    );
    assert!(cloud.get_api_ingress_status("other").await.unwrap().is_empty());
    assert!(
        cloud
            .find_cluster_status(CLUSTER)
            .await
            .unwrap()
            .etcd_clusters
            .is_empty()
    );
}
