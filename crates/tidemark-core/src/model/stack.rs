//! スタック全体の定義

use super::elb::{ListenerSpec, LoadBalancerSpec, TargetGroupSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// タグ検索・ページングで使うデフォルトのバッチ上限（ELBv2 DescribeTagsは1回20件まで）
pub const DEFAULT_TAG_BATCH_LIMIT: usize = 20;

/// Terraform出力のデフォルトディレクトリ
pub const DEFAULT_OUTPUT_DIR: &str = "out/terraform";

/// 宣言されたスタック
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    /// クラスタ名（所有タグの既定値にも使う）
    pub cluster: String,

    /// 管理対象を識別する所有タグ
    pub tags: BTreeMap<String, String>,

    pub engine: EngineSettings,

    /// 宣言順を保持する
    pub load_balancers: Vec<LoadBalancerSpec>,
    pub target_groups: Vec<TargetGroupSpec>,
    pub listeners: Vec<ListenerSpec>,
}

impl Stack {
    pub fn load_balancer(&self, name: &str) -> Option<&LoadBalancerSpec> {
        self.load_balancers.iter().find(|lb| lb.name == name)
    }

    pub fn target_group(&self, name: &str) -> Option<&TargetGroupSpec> {
        self.target_groups.iter().find(|tg| tg.name == name)
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerSpec> {
        self.listeners.iter().find(|l| l.name == name)
    }

    /// 宣言されたリソースの総数
    pub fn resource_count(&self) -> usize {
        self.load_balancers.len() + self.target_groups.len() + self.listeners.len()
    }

    /// 所有タグ。未指定ならクラスタ名から導出する
    pub fn owned_tags(&self) -> BTreeMap<String, String> {
        if !self.tags.is_empty() || self.cluster.is_empty() {
            return self.tags.clone();
        }
        let mut tags = BTreeMap::new();
        tags.insert("KubernetesCluster".to_string(), self.cluster.clone());
        tags
    }
}

/// 出力先
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// クラウドAPIを直接呼び出す
    #[default]
    Live,
    /// Terraform JSONを書き出す
    Terraform,
    /// 差分の計算のみ
    DryRun,
}

impl std::str::FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "live" | "direct" => Ok(TargetKind::Live),
            "terraform" => Ok(TargetKind::Terraform),
            "dry-run" | "dryrun" => Ok(TargetKind::DryRun),
            other => Err(format!("unknown target: {}", other)),
        }
    }
}

/// engine ノードの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub target: TargetKind,

    /// 同時に実行するタスクレーン数
    pub parallelism: usize,

    /// 1回のタグ検索で渡すID数の上限
    pub tag_batch_limit: usize,

    /// Terraform出力先ディレクトリ
    pub output: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            target: TargetKind::default(),
            parallelism: 1,
            tag_batch_limit: DEFAULT_TAG_BATCH_LIMIT,
            output: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}
