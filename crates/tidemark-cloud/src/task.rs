//! Task lifecycle: find, normalize, diff, check, render
//!
//! A declared resource kind implements [`Resource`]; the blanket [`Task`]
//! implementation drives it through one convergence pass:
//!
//! ```text
//! Unresolved -> Found | Absent -> Normalized
//!            -> NoOp | PendingCreate | PendingUpdate | PendingRecreate
//!            -> Rendered | Failed
//! ```

use crate::error::{CloudError, Result};
use crate::reference::{TaskKey, TaskRef};
use crate::target::{Target, TextTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How far the engine may go to converge a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lifecycle {
    /// Create when absent; leave an existing object alone
    CreateOnly,
    /// Create, update, or recreate until the live object matches
    #[default]
    CreateOrUpdate,
    /// The object must already exist and match; never mutate it
    ExistsAndImmutable,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::CreateOnly => write!(f, "create-only"),
            Lifecycle::CreateOrUpdate => write!(f, "sync"),
            Lifecycle::ExistsAndImmutable => write!(f, "exists"),
        }
    }
}

impl FromStr for Lifecycle {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create-only" | "create_only" => Ok(Lifecycle::CreateOnly),
            "sync" | "create-or-update" | "create_or_update" => Ok(Lifecycle::CreateOrUpdate),
            "exists" | "exists-and-immutable" | "exists_and_immutable" => {
                Ok(Lifecycle::ExistsAndImmutable)
            }
            other => Err(CloudError::InvalidConfig(format!(
                "unknown lifecycle: {}",
                other
            ))),
        }
    }
}

/// Difference between declared and actual state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    NoOp,
    Create,
    /// In-place update of the listed fields
    Update(Vec<&'static str>),
    /// Delete then create; at least one listed field is immutable
    Recreate(Vec<&'static str>),
}

impl Delta {
    /// Route changed fields: any immutable field forces a recreate
    pub fn from_changes(changed: Vec<&'static str>, immutable: &[&'static str]) -> Self {
        if changed.is_empty() {
            Delta::NoOp
        } else if changed.iter().any(|f| immutable.contains(f)) {
            Delta::Recreate(changed)
        } else {
            Delta::Update(changed)
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Delta::NoOp)
    }

    /// Fields touched by an update or recreate
    pub fn fields(&self) -> &[&'static str] {
        match self {
            Delta::Update(fields) | Delta::Recreate(fields) => fields,
            Delta::NoOp | Delta::Create => &[],
        }
    }

    pub fn touches(&self, field: &str) -> bool {
        self.fields().iter().any(|f| *f == field)
    }

    pub fn phase(&self) -> TaskPhase {
        match self {
            Delta::NoOp => TaskPhase::NoOp,
            Delta::Create => TaskPhase::PendingCreate,
            Delta::Update(_) => TaskPhase::PendingUpdate,
            Delta::Recreate(_) => TaskPhase::PendingRecreate,
        }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::NoOp => write!(f, "no-op"),
            Delta::Create => write!(f, "create"),
            Delta::Update(fields) => write!(f, "update({})", fields.join(", ")),
            Delta::Recreate(fields) => write!(f, "recreate({})", fields.join(", ")),
        }
    }
}

/// Per-pass state of a task, used for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Unresolved,
    Found,
    Absent,
    Normalized,
    NoOp,
    PendingCreate,
    PendingUpdate,
    PendingRecreate,
    Rendered,
    Failed,
}

/// A declared resource kind.
///
/// The same type carries both declared and actual state: `find` returns an
/// actual value whose bookkeeping fields (name, lifecycle, references) are
/// copied from the declared value so they never show up as differences.
#[async_trait]
pub trait Resource<C>: Clone + fmt::Debug + Send + Sync + 'static
where
    C: Send + Sync,
{
    /// Resource kind, unique across the kinds of one run
    const KIND: &'static str;

    /// Logical name, unique per kind within a run
    fn name(&self) -> &str;

    fn lifecycle(&self) -> Lifecycle;

    /// Tasks whose identifiers this resource needs
    fn dependencies(&self) -> Vec<TaskRef> {
        Vec::new()
    }

    /// Backend identifier of an actual value
    fn id(&self) -> Option<&str>;

    fn key(&self) -> TaskKey {
        TaskKey::new(Self::KIND, self.name())
    }

    /// Look up the live counterpart of this declared resource
    async fn find(&self, cloud: &C) -> Result<Option<Self>>;

    /// Canonicalize into comparable form. Must be idempotent.
    fn normalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Names of the fields where `self` (declared) differs from `actual`
    fn changed_fields(&self, actual: &Self) -> Vec<&'static str>;

    /// Fields that cannot change on a live object
    fn immutable_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Validate a delta before it is rendered
    fn check_changes(&self, actual: Option<&Self>, delta: &Delta) -> Result<()> {
        check_immutable::<C, Self>(self, actual, delta)
    }

    /// Apply the delta against the live backend, returning the resulting identifier
    async fn render_live(
        &self,
        cloud: &C,
        actual: Option<&Self>,
        delta: &Delta,
    ) -> Result<String>;

    /// Emit a declarative block for this resource; never contacts the backend
    fn render_text(&self, target: &TextTarget, delta: &Delta) -> Result<()>;
}

/// Reject updates that touch immutable fields
pub fn check_immutable<C, R>(declared: &R, _actual: Option<&R>, delta: &Delta) -> Result<()>
where
    C: Send + Sync,
    R: Resource<C>,
{
    if let Delta::Update(fields) = delta
        && let Some(field) = fields
            .iter()
            .find(|f| declared.immutable_fields().contains(*f))
    {
        return Err(CloudError::DisallowedChange {
            kind: R::KIND.to_string(),
            name: declared.name().to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Outcome of running one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub delta: Delta,

    /// Identifier for dependents: the created object, or the found one
    pub resolved_id: Option<String>,
}

/// Object-safe view of a task, as scheduled by the runner
#[async_trait]
pub trait Task<C>: Send + Sync {
    fn task_key(&self) -> TaskKey;

    fn task_dependencies(&self) -> Vec<TaskRef>;

    async fn run(&self, cloud: &C, target: &Target) -> Result<TaskResult>;
}

#[async_trait]
impl<C, R> Task<C> for R
where
    C: Send + Sync,
    R: Resource<C>,
{
    fn task_key(&self) -> TaskKey {
        <R as Resource<C>>::key(self)
    }

    fn task_dependencies(&self) -> Vec<TaskRef> {
        <R as Resource<C>>::dependencies(self)
    }

    async fn run(&self, cloud: &C, target: &Target) -> Result<TaskResult> {
        run_resource(self, cloud, target).await
    }
}

/// The standard find -> normalize -> diff -> check -> render pass
pub async fn run_resource<C, R>(declared: &R, cloud: &C, target: &Target) -> Result<TaskResult>
where
    C: Send + Sync,
    R: Resource<C>,
{
    let key = <R as Resource<C>>::key(declared);
    trace_phase(&key, TaskPhase::Unresolved);

    let result = converge_resource(&key, declared, cloud, target).await;
    if result.is_err() {
        trace_phase(&key, TaskPhase::Failed);
    }
    result
}

async fn converge_resource<C, R>(
    key: &TaskKey,
    declared: &R,
    cloud: &C,
    target: &Target,
) -> Result<TaskResult>
where
    C: Send + Sync,
    R: Resource<C>,
{
    let found = match declared.find(cloud).await {
        Ok(found) => found,
        Err(e)
            if !target.is_live()
                && !e.is_pass_fatal()
                && !matches!(e, CloudError::AmbiguousMatch { .. }) =>
        {
            tracing::debug!("{}: lookup skipped for {} target: {}", key, target.name(), e);
            None
        }
        Err(e) => return Err(e),
    };
    trace_phase(
        key,
        if found.is_some() {
            TaskPhase::Found
        } else {
            TaskPhase::Absent
        },
    );

    let mut declared = declared.clone();
    declared.normalize()?;
    let actual = match found {
        Some(mut actual) => {
            actual.normalize()?;
            Some(actual)
        }
        None => None,
    };
    trace_phase(key, TaskPhase::Normalized);

    let delta = match &actual {
        None => Delta::Create,
        Some(actual) => {
            Delta::from_changes(declared.changed_fields(actual), declared.immutable_fields())
        }
    };
    let delta = apply_lifecycle::<C, R>(&declared, actual.as_ref(), delta)?;
    trace_phase(key, delta.phase());

    declared.check_changes(actual.as_ref(), &delta)?;

    // A recreated object gets a new identifier, so dependents of a
    // non-live recreate must not see the old one.
    let found_id = match &delta {
        Delta::NoOp | Delta::Update(_) => actual.as_ref().and_then(|a| a.id()).map(str::to_string),
        Delta::Create | Delta::Recreate(_) => None,
    };
    let resolved_id = match target {
        Target::Live if delta.is_noop() => found_id,
        Target::Live => {
            tracing::info!("{}: applying {}", key, delta);
            Some(declared.render_live(cloud, actual.as_ref(), &delta).await?)
        }
        Target::Text(text) => {
            if !delta.is_noop() {
                declared.render_text(text, &delta)?;
            }
            found_id
        }
        Target::DryRun => found_id,
    };
    trace_phase(key, TaskPhase::Rendered);

    Ok(TaskResult { delta, resolved_id })
}

fn apply_lifecycle<C, R>(declared: &R, actual: Option<&R>, delta: Delta) -> Result<Delta>
where
    C: Send + Sync,
    R: Resource<C>,
{
    match (declared.lifecycle(), actual, &delta) {
        (_, _, Delta::NoOp) => Ok(delta),
        (Lifecycle::CreateOrUpdate, _, _) => Ok(delta),
        (Lifecycle::CreateOnly, None, _) => Ok(delta),
        (Lifecycle::CreateOnly, Some(_), _) => {
            tracing::warn!(
                "{}: {} is create-only; ignoring pending {}",
                R::KIND,
                declared.name(),
                delta
            );
            Ok(Delta::NoOp)
        }
        (Lifecycle::ExistsAndImmutable, None, _) => Err(CloudError::LifecycleViolation {
            kind: R::KIND.to_string(),
            name: declared.name().to_string(),
            message: "object must already exist".to_string(),
        }),
        (Lifecycle::ExistsAndImmutable, Some(_), _) => Err(CloudError::LifecycleViolation {
            kind: R::KIND.to_string(),
            name: declared.name().to_string(),
            message: format!("object differs from declaration ({})", delta),
        }),
    }
}

fn trace_phase(key: &TaskKey, phase: TaskPhase) {
    tracing::trace!(kind = %key.kind, name = %key.name, ?phase, "task phase");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_routing() {
        assert_eq!(Delta::from_changes(vec![], &["protocol"]), Delta::NoOp);
        assert_eq!(
            Delta::from_changes(vec!["ssl_policy"], &["protocol"]),
            Delta::Update(vec!["ssl_policy"])
        );
        assert_eq!(
            Delta::from_changes(vec!["ssl_policy", "protocol"], &["protocol"]),
            Delta::Recreate(vec!["ssl_policy", "protocol"])
        );
    }

    #[test]
    fn test_delta_display() {
        assert_eq!(Delta::Create.to_string(), "create");
        assert_eq!(
            Delta::Update(vec!["a", "b"]).to_string(),
            "update(a, b)"
        );
        assert!(Delta::Recreate(vec!["a"]).touches("a"));
        assert!(!Delta::Create.touches("a"));
    }

    #[test]
    fn test_lifecycle_parse() {
        assert_eq!("sync".parse::<Lifecycle>().unwrap(), Lifecycle::CreateOrUpdate);
        assert_eq!(
            "create-only".parse::<Lifecycle>().unwrap(),
            Lifecycle::CreateOnly
        );
        assert_eq!(
            "exists".parse::<Lifecycle>().unwrap(),
            Lifecycle::ExistsAndImmutable
        );
        assert!("sometimes".parse::<Lifecycle>().is_err());
        assert_eq!(Lifecycle::default().to_string(), "sync");
    }
}
