//! Tidemark convergence engine
//!
//! This crate drives declared cloud resources toward their declared state.
//! Each resource is a task that finds its live counterpart, diffs, and renders
//! the difference against one target per pass.
//!
//! # Targets
//!
//! - **Live**: mutate the backend through its API
//! - **Text**: emit Terraform JSON without touching the backend
//! - **DryRun**: compute deltas only
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 tidemark-core                    │
//! │             (stack.kdl -> Stack)                 │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                tidemark-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  TaskGraph / Runner                       │   │
//! │  │  trait Resource<C> { find, render, ... }  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Enumerate   │  │   Targets    │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼────────────┐
//! │ tidemark-cloud-aws │
//! │   (ELBv2 tasks)    │
//! └────────────────────┘
//! ```

pub mod enumerate;
pub mod error;
pub mod reference;
pub mod report;
pub mod runner;
pub mod status;
pub mod tags;
pub mod target;
pub mod task;

// Re-exports
pub use enumerate::{
    Page, ResourceInfo, TagDescription, TaggedListing, list_owned_resources, list_resources,
};
pub use error::{CloudError, Result};
pub use reference::{TaskKey, TaskRef};
pub use report::{RunReport, RunSummary, TaskOutcome, TaskReport};
pub use runner::{Runner, RunnerConfig, TaskGraph};
pub use status::{
    ApiIngressStatus, ClusterStatus, EtcdClusterStatus, EtcdMemberStatus, StatusStore,
};
pub use tags::{NAME_TAG, Tag, Tags, matches_tags, tag_value, to_tag_list, to_tag_map};
pub use target::{FieldValue, Reference, ResourceBlock, TERRAFORM_FILE, Target, TextTarget};
pub use task::{
    Delta, Lifecycle, Resource, Task, TaskPhase, TaskResult, check_immutable, run_resource,
};
pub use tokio_util::sync::CancellationToken;
