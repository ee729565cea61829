//! Cross-task identifier references
//!
//! A task that needs another task's backend-assigned identifier holds a
//! [`TaskRef`]. The identifier slot behind it belongs to the producing task.
//! The runner clears every slot of its graph when a pass starts and writes
//! each one at most once during the pass, after the producing task converges.

use crate::error::{CloudError, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Identity of a task within one run: its kind plus its logical name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub kind: String,
    pub name: String,
}

impl TaskKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

pub(crate) type IdSlot = Arc<RwLock<Option<String>>>;

fn read_slot(slot: &IdSlot) -> Option<String> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Read-only handle on another task's resolved identifier
#[derive(Clone)]
pub struct TaskRef {
    key: TaskKey,
    slot: IdSlot,
}

impl TaskRef {
    pub(crate) fn from_slot(key: TaskKey, slot: IdSlot) -> Self {
        Self { key, slot }
    }

    /// Reference to an object managed outside this run, with a known identifier
    pub fn resolved(kind: impl Into<String>, name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            key: TaskKey::new(kind, name),
            slot: Arc::new(RwLock::new(Some(id.into()))),
        }
    }

    /// Reference whose identifier is not known and will never be resolved by a runner
    pub fn unresolved(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: TaskKey::new(kind, name),
            slot: IdSlot::default(),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// The referenced identifier, if the producing task has resolved it in this pass
    pub fn id(&self) -> Option<String> {
        read_slot(&self.slot)
    }

    pub fn is_resolved(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The referenced identifier, or `DependencyNotReady` on behalf of `task`
    pub fn require_id(&self, task: &TaskKey) -> Result<String> {
        self.id().ok_or_else(|| CloudError::DependencyNotReady {
            task: task.to_string(),
            dependency: self.key.to_string(),
        })
    }

    pub(crate) fn shares_slot(&self, slot: &IdSlot) -> bool {
        Arc::ptr_eq(&self.slot, slot)
    }
}

/// References compare by the task they point at, not by resolution state
impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TaskRef {}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("key", &self.key.to_string())
            .field("id", &self.id())
            .finish()
    }
}

/// Write the producing task's identifier. A second, different write within
/// one pass is an engine bug.
pub(crate) fn resolve_slot(key: &TaskKey, slot: &IdSlot, id: String) -> Result<()> {
    let mut current = slot.write().unwrap_or_else(PoisonError::into_inner);
    match current.as_deref() {
        None => {
            *current = Some(id);
            Ok(())
        }
        Some(existing) if existing == id => Ok(()),
        Some(existing) => Err(CloudError::InternalConsistency(format!(
            "identifier of {} resolved twice in one pass ({:?} then {:?})",
            key, existing, id
        ))),
    }
}

/// Forget the identifier resolved by an earlier pass
pub(crate) fn clear_slot(slot: &IdSlot) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = None;
}
