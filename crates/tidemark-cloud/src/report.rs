//! Per-task results of a convergence pass

use crate::error::CloudError;
use crate::reference::TaskKey;
use crate::task::Delta;
use chrono::{DateTime, Utc};

/// Terminal state of one task in a pass
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task converged (or, for a dry run, would apply this delta)
    Rendered(Delta),

    Failed(CloudError),

    /// Not attempted because a dependency did not converge, or the pass was aborted
    Skipped { blocked_by: String },

    /// Not attempted because the pass was cancelled
    Cancelled,
}

impl TaskOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, TaskOutcome::Rendered(_))
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Rendered(delta) => write!(f, "{}", delta),
            TaskOutcome::Failed(e) => write!(f, "failed: {}", e),
            TaskOutcome::Skipped { blocked_by } => write!(f, "skipped (blocked by {})", blocked_by),
            TaskOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of a single task
#[derive(Debug)]
pub struct TaskReport {
    pub key: TaskKey,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    /// The delta that was applied, if the task converged
    pub fn delta(&self) -> Option<&Delta> {
        match &self.outcome {
            TaskOutcome::Rendered(delta) => Some(delta),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&CloudError> {
        match &self.outcome {
            TaskOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of a whole convergence pass
#[derive(Debug)]
pub struct RunReport {
    /// Name of the target the pass rendered to
    pub target: String,

    /// Task results in execution order
    pub tasks: Vec<TaskReport>,

    pub started_at: DateTime<Utc>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// True when every task converged. Converged tasks stay applied either way.
    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(|t| t.outcome.is_rendered())
    }

    /// Tasks that failed outright
    pub fn failures(&self) -> Vec<&TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, TaskOutcome::Failed(_)))
            .collect()
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<&TaskReport> {
        self.tasks
            .iter()
            .find(|t| t.key.kind == kind && t.key.name == name)
    }

    /// Position of a task in execution order
    pub fn position(&self, kind: &str, name: &str) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.key.kind == kind && t.key.name == name)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for task in &self.tasks {
            match &task.outcome {
                TaskOutcome::Rendered(Delta::Create) => summary.create += 1,
                TaskOutcome::Rendered(Delta::Update(_)) => summary.update += 1,
                TaskOutcome::Rendered(Delta::Recreate(_)) => summary.recreate += 1,
                TaskOutcome::Rendered(Delta::NoOp) => summary.no_change += 1,
                TaskOutcome::Failed(_) => summary.failed += 1,
                TaskOutcome::Skipped { .. } | TaskOutcome::Cancelled => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Counts of task outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub create: usize,
    pub update: usize,
    pub recreate: usize,
    pub no_change: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn has_changes(&self) -> bool {
        self.create + self.update + self.recreate > 0
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to recreate, {} unchanged, {} failed, {} skipped",
            self.create, self.update, self.recreate, self.no_change, self.failed, self.skipped
        )
    }
}
