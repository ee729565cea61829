//! AWS ELBv2 resources for tidemark
//!
//! Three resource kinds converge through the engine in `tidemark-cloud`:
//!
//! - [`TargetGroup`]
//! - [`NetworkLoadBalancer`]
//! - [`NetworkLoadBalancerListener`], which depends on the other two
//!
//! All backend access goes through the narrow [`ElbV2Api`] trait. With the
//! `sdk` feature, [`SdkElbV2`] implements it on top of the AWS SDK.
//!
//! ```no_run
//! # async fn run(api: std::sync::Arc<dyn tidemark_cloud_aws::ElbV2Api>) -> tidemark_cloud_aws::Result<()> {
//! use tidemark_cloud::CancellationToken;
//!
//! let stack = tidemark_core::load_discovered_stack()?;
//! let result = tidemark_cloud_aws::converge(&stack, api, CancellationToken::new()).await?;
//! println!("{}", result.report.summary());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cloud;
pub mod error;
pub mod listing;
#[cfg(feature = "sdk")]
pub mod sdk;
pub mod stack;
pub mod tasks;

pub use api::{
    CreateListenerRequest, CreateLoadBalancerRequest, CreateTargetGroupRequest, ElbV2Api,
    HealthCheck, ListenerAction, ListenerDescription, LoadBalancerDescription,
    ModifyListenerRequest, ModifyTargetGroupRequest, TargetGroupDescription,
};
pub use cloud::{AwsCloud, CLUSTER_TAG};
pub use error::{AwsError, Result};
pub use listing::{LoadBalancerInfo, TargetGroupInfo, list_load_balancers, list_target_groups};
#[cfg(feature = "sdk")]
pub use sdk::SdkElbV2;
pub use stack::{Convergence, build_graph, converge};
pub use tasks::{DEFAULT_SSL_POLICY, NetworkLoadBalancer, NetworkLoadBalancerListener, TargetGroup};
