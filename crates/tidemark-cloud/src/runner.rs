//! Dependency graph and task runner
//!
//! Tasks run in topological waves: every task in a wave has all of its
//! dependencies in earlier waves. A failed task blocks its dependents, but
//! independent tasks keep converging and every outcome is reported.

use crate::error::{CloudError, Result};
use crate::reference::{IdSlot, TaskKey, TaskRef, clear_slot, resolve_slot};
use crate::report::{RunReport, TaskOutcome, TaskReport};
use crate::target::Target;
use crate::task::Task;
use chrono::Utc;
use futures_util::{StreamExt, stream};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Number of independent task lanes that may run at once.
    /// Tasks of the same kind never run concurrently.
    pub parallelism: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

struct Node<C> {
    key: TaskKey,
    task: Box<dyn Task<C>>,
    slot: IdSlot,
}

/// Declared tasks and the identifier slots they produce
pub struct TaskGraph<C> {
    nodes: Vec<Node<C>>,
    index: HashMap<TaskKey, usize>,
    slots: HashMap<TaskKey, IdSlot>,
}

impl<C> Default for TaskGraph<C> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            slots: HashMap::new(),
        }
    }
}

impl<C: Send + Sync> TaskGraph<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only reference to the task `kind/name`, which may be added later
    pub fn reference(&mut self, kind: &str, name: &str) -> TaskRef {
        let key = TaskKey::new(kind, name);
        let slot = self.slots.entry(key.clone()).or_default().clone();
        TaskRef::from_slot(key, slot)
    }

    /// Register a task. Returns a reference to it for dependents.
    pub fn add<T: Task<C> + 'static>(&mut self, task: T) -> Result<TaskRef> {
        let key = task.task_key();
        if self.index.contains_key(&key) {
            return Err(CloudError::InvalidConfig(format!(
                "task {} declared twice",
                key
            )));
        }

        let slot = self.slots.entry(key.clone()).or_default().clone();
        self.index.insert(key.clone(), self.nodes.len());
        self.nodes.push(Node {
            key: key.clone(),
            task: Box::new(task),
            slot: slot.clone(),
        });
        tracing::debug!("Added task {}", key);
        Ok(TaskRef::from_slot(key, slot))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, kind: &str, name: &str) -> bool {
        self.index.contains_key(&TaskKey::new(kind, name))
    }

    /// Task keys in the order they will execute
    pub fn execution_order(&self) -> Result<Vec<TaskKey>> {
        let deps = self.dependency_indices()?;
        Ok(self
            .waves(&deps)?
            .into_iter()
            .flatten()
            .map(|i| self.nodes[i].key.clone())
            .collect())
    }

    /// Resolve every task's references to node indices
    fn dependency_indices(&self) -> Result<Vec<Vec<usize>>> {
        let mut all = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut deps = Vec::new();
            for dep in node.task.task_dependencies() {
                match self.index.get(dep.key()) {
                    Some(&j) => {
                        if !dep.shares_slot(&self.nodes[j].slot) {
                            return Err(CloudError::InvalidConfig(format!(
                                "{} refers to {} through a reference not issued by this graph",
                                node.key,
                                dep.key()
                            )));
                        }
                        if !deps.contains(&j) {
                            deps.push(j);
                        }
                    }
                    // Objects managed outside this run, already identified
                    None if dep.is_resolved() => {}
                    None => {
                        return Err(CloudError::MissingDependency {
                            task: node.key.to_string(),
                            dependency: dep.key().to_string(),
                        });
                    }
                }
            }
            all.push(deps);
        }
        Ok(all)
    }

    /// Group nodes into topological levels (Kahn's algorithm)
    fn waves(&self, deps: &[Vec<usize>]) -> Result<Vec<Vec<usize>>> {
        let n = self.nodes.len();
        let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, ds) in deps.iter().enumerate() {
            for &d in ds {
                dependents[d].push(i);
            }
        }

        let mut waves = Vec::new();
        let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0;
        while !current.is_empty() {
            visited += current.len();
            let mut next = Vec::new();
            for &i in &current {
                for &d in &dependents[i] {
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        next.push(d);
                    }
                }
            }
            next.sort_unstable();
            waves.push(current);
            current = next;
        }

        if visited < n {
            let remaining: Vec<bool> = in_degree.iter().map(|&d| d > 0).collect();
            let cycle = find_cycle(deps, &remaining)
                .into_iter()
                .map(|i| self.nodes[i].key.to_string())
                .collect();
            return Err(CloudError::CyclicDependency(cycle));
        }

        Ok(waves)
    }
}

/// Walk dependencies among unprocessed nodes until one repeats.
///
/// Every unprocessed node still has an unprocessed dependency, so the walk
/// always closes a cycle.
fn find_cycle(deps: &[Vec<usize>], remaining: &[bool]) -> Vec<usize> {
    let Some(start) = remaining.iter().position(|&r| r) else {
        return Vec::new();
    };

    let mut path = Vec::new();
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&at) = seen.get(&current) {
            let mut cycle = path[at..].to_vec();
            cycle.push(current);
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);
        match deps[current].iter().find(|&&d| remaining[d]) {
            Some(&d) => current = d,
            None => return path,
        }
    }
}

/// Drives every task of a graph through one convergence pass
pub struct Runner<C> {
    graph: TaskGraph<C>,
    config: RunnerConfig,
    cancel: CancellationToken,

    /// Held for the duration of a pass; passes share the graph's id slots
    pass: Mutex<()>,
}

impl<C: Send + Sync> Runner<C> {
    pub fn new(graph: TaskGraph<C>) -> Self {
        Self {
            graph,
            config: RunnerConfig::default(),
            cancel: CancellationToken::new(),
            pass: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancellation is honoured between tasks, never during a render
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn graph(&self) -> &TaskGraph<C> {
        &self.graph
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Compute deltas without rendering anything
    pub async fn plan(&self, cloud: &C) -> Result<RunReport> {
        self.run(cloud, &Target::DryRun).await
    }

    /// Run one convergence pass.
    ///
    /// Returns `Err` only for graph errors detected before any task runs;
    /// task failures are reported per task in the [`RunReport`].
    #[tracing::instrument(skip_all, fields(target = target.name(), tasks = self.graph.len()))]
    pub async fn run(&self, cloud: &C, target: &Target) -> Result<RunReport> {
        let _pass = self.pass.lock().await;
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        // Identifiers are observed anew on every pass
        for node in &self.graph.nodes {
            clear_slot(&node.slot);
        }

        let deps = self.graph.dependency_indices()?;
        let waves = self.graph.waves(&deps)?;
        tracing::info!(
            "Converging {} tasks in {} waves",
            self.graph.len(),
            waves.len()
        );

        let mut outcomes: Vec<Option<TaskOutcome>> =
            (0..self.graph.len()).map(|_| None).collect();
        let mut aborted_by: Option<String> = None;
        let order: Vec<usize> = waves.iter().flatten().copied().collect();

        for wave in waves {
            let mut runnable = Vec::new();
            for idx in wave {
                if let Some(fatal) = &aborted_by {
                    outcomes[idx] = Some(TaskOutcome::Skipped {
                        blocked_by: fatal.clone(),
                    });
                    continue;
                }
                if self.cancel.is_cancelled() {
                    outcomes[idx] = Some(TaskOutcome::Cancelled);
                    continue;
                }
                let blocker = deps[idx]
                    .iter()
                    .find(|&&d| !matches!(outcomes[d], Some(TaskOutcome::Rendered(_))));
                if let Some(&blocker) = blocker {
                    let blocked_by = self.graph.nodes[blocker].key.to_string();
                    tracing::warn!(
                        "Skipping {}: dependency {} did not converge",
                        self.graph.nodes[idx].key,
                        blocked_by
                    );
                    outcomes[idx] = Some(TaskOutcome::Skipped { blocked_by });
                    continue;
                }
                runnable.push(idx);
            }

            for (idx, outcome) in self.run_wave(runnable, cloud, target).await {
                if let TaskOutcome::Failed(e) = &outcome
                    && e.is_pass_fatal()
                    && aborted_by.is_none()
                {
                    tracing::error!(
                        "Aborting pass after {}: {}",
                        self.graph.nodes[idx].key,
                        e
                    );
                    aborted_by = Some(self.graph.nodes[idx].key.to_string());
                }
                outcomes[idx] = Some(outcome);
            }
        }

        let tasks = order
            .into_iter()
            .map(|idx| TaskReport {
                key: self.graph.nodes[idx].key.clone(),
                outcome: outcomes[idx].take().unwrap_or(TaskOutcome::Cancelled),
            })
            .collect();

        let report = RunReport {
            target: target.name().to_string(),
            tasks,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!("Convergence pass finished: {}", report.summary());
        Ok(report)
    }

    async fn run_wave(
        &self,
        runnable: Vec<usize>,
        cloud: &C,
        target: &Target,
    ) -> Vec<(usize, TaskOutcome)> {
        if self.config.parallelism <= 1 || runnable.len() <= 1 {
            return self.run_lane(runnable, cloud, target).await;
        }

        // Tasks of one kind could resolve to the same live object
        let mut lanes: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for idx in runnable {
            lanes
                .entry(self.graph.nodes[idx].key.kind.clone())
                .or_default()
                .push(idx);
        }

        stream::iter(lanes.into_values())
            .map(|lane| self.run_lane(lane, cloud, target))
            .buffer_unordered(self.config.parallelism)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn run_lane(
        &self,
        lane: Vec<usize>,
        cloud: &C,
        target: &Target,
    ) -> Vec<(usize, TaskOutcome)> {
        let mut finished = Vec::with_capacity(lane.len());
        let mut aborted_by: Option<String> = None;

        for idx in lane {
            if let Some(fatal) = &aborted_by {
                finished.push((
                    idx,
                    TaskOutcome::Skipped {
                        blocked_by: fatal.clone(),
                    },
                ));
                continue;
            }
            if self.cancel.is_cancelled() {
                finished.push((idx, TaskOutcome::Cancelled));
                continue;
            }

            let outcome = self.run_node(idx, cloud, target).await;
            if let TaskOutcome::Failed(e) = &outcome
                && e.is_pass_fatal()
            {
                aborted_by = Some(self.graph.nodes[idx].key.to_string());
            }
            finished.push((idx, outcome));
        }

        finished
    }

    async fn run_node(&self, idx: usize, cloud: &C, target: &Target) -> TaskOutcome {
        let node = &self.graph.nodes[idx];
        let span = tracing::info_span!("task", kind = %node.key.kind, name = %node.key.name);

        match node.task.run(cloud, target).instrument(span).await {
            Ok(result) => {
                if let Some(id) = result.resolved_id
                    && let Err(e) = resolve_slot(&node.key, &node.slot, id)
                {
                    tracing::error!("{}: {}", node.key, e);
                    return TaskOutcome::Failed(e);
                }
                tracing::debug!("{}: {}", node.key, result.delta);
                TaskOutcome::Rendered(result.delta)
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", node.key, e);
                TaskOutcome::Failed(e)
            }
        }
    }
}
