//! ロードバランサー関連リソースの定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 他リソースへの参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceRef {
    /// 同じスタックで宣言されたリソース名
    Named(String),
    /// スタック外で管理されている既存リソースのARN
    Arn(String),
}

impl ResourceRef {
    pub fn as_named(&self) -> Option<&str> {
        match self {
            ResourceRef::Named(name) => Some(name),
            ResourceRef::Arn(_) => None,
        }
    }

    /// 参照の表示名（ARN参照ならARNそのもの）
    pub fn label(&self) -> &str {
        match self {
            ResourceRef::Named(name) | ResourceRef::Arn(name) => name,
        }
    }
}

/// load-balancer ノード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,

    /// create-only / sync / exists
    pub lifecycle: Option<String>,

    /// internet-facing / internal
    pub scheme: Option<String>,

    pub subnets: Vec<String>,

    /// 所有タグに追加するタグ
    pub tags: BTreeMap<String, String>,
}

/// target-group ノード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub name: String,
    pub lifecycle: Option<String>,
    pub port: u16,

    /// TCP / TLS / UDP / TCP_UDP
    pub protocol: String,

    pub vpc: String,
    pub health_check: Option<HealthCheckSpec>,
    pub tags: BTreeMap<String, String>,
}

/// health-check ブロック
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub protocol: Option<String>,

    /// ポート番号または "traffic-port"
    pub port: Option<String>,

    pub interval: Option<u32>,
    pub healthy_threshold: Option<u32>,
    pub unhealthy_threshold: Option<u32>,
}

/// listener ノード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub name: String,
    pub lifecycle: Option<String>,
    pub load_balancer: ResourceRef,
    pub target_group: Option<ResourceRef>,
    pub port: u16,

    /// TLS証明書のARN。指定時はTLS、未指定時はTCP
    pub certificate: Option<String>,

    pub ssl_policy: Option<String>,
}
