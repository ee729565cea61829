use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tidemark_cloud::{
    CancellationToken, CloudError, Delta, FieldValue, Lifecycle, Resource, Result, TaskRef,
    TextTarget,
};

/// Object as stored by the fake backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub id: String,
    pub size: u32,
    pub color: String,
    pub parent_id: Option<String>,
}

/// In-memory backend that records every mutation
#[derive(Default)]
pub struct FakeCloud {
    objects: Mutex<BTreeMap<String, Stored>>,
    calls: Mutex<Vec<String>>,
    failing_finds: Mutex<HashSet<String>>,
    failing_renders: Mutex<HashSet<String>>,
    inconsistent: Mutex<HashSet<String>>,
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
    next_id: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[allow(dead_code)]
impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, kind: &str, name: &str, size: u32, color: &str) -> String {
        let id = format!("{}-seed-{}", kind, name);
        self.objects.lock().unwrap().insert(
            format!("{}/{}", kind, name),
            Stored {
                id: id.clone(),
                size,
                color: color.to_string(),
                parent_id: None,
            },
        );
        id
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<Stored> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", kind, name))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_find(&self, key: &str) {
        self.failing_finds.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_render(&self, key: &str) {
        self.failing_renders.lock().unwrap().insert(key.to_string());
    }

    /// Make the lookup for `key` report data that was never requested
    pub fn inconsistent(&self, key: &str) {
        self.inconsistent.lock().unwrap().insert(key.to_string());
    }

    /// Cancel `token` right after `key` renders
    pub fn cancel_after(&self, key: &str, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((key.to_string(), token));
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn check_find(&self, key: &str) -> Result<()> {
        if self.inconsistent.lock().unwrap().contains(key) {
            return Err(CloudError::InternalConsistency(format!(
                "lookup for {} returned an unrequested object",
                key
            )));
        }
        if self.failing_finds.lock().unwrap().contains(key) {
            return Err(CloudError::backend(
                format!("finding {}", key),
                anyhow::anyhow!("throttled"),
            ));
        }
        Ok(())
    }

    async fn mutate(&self, key: &str, delta: &Delta, mut stored: Stored) -> Result<String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing_renders.lock().unwrap().contains(key) {
            return Err(CloudError::backend(
                format!("rendering {}", key),
                anyhow::anyhow!("access denied"),
            ));
        }

        if stored.id.is_empty() {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            stored.id = format!("{}-{}", key.replace('/', "-"), n);
        }
        let id = stored.id.clone();
        self.objects.lock().unwrap().insert(key.to_string(), stored);
        self.calls.lock().unwrap().push(format!("{} {}", delta, key));

        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref()
            && after == key
        {
            token.cancel();
        }
        Ok(id)
    }
}

pub trait PartKind: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: &'static str;
}

#[derive(Debug, Clone)]
pub struct WidgetKind;

impl PartKind for WidgetKind {
    const KIND: &'static str = "widget";
}

#[derive(Debug, Clone)]
pub struct GadgetKind;

impl PartKind for GadgetKind {
    const KIND: &'static str = "gadget";
}

/// Minimal resource: `size` updates in place, `color` forces a recreate
#[derive(Debug, Clone)]
pub struct Part<K: PartKind> {
    pub name: String,
    pub lifecycle: Lifecycle,
    pub size: u32,
    pub color: String,
    pub parent: Option<TaskRef>,
    pub id: Option<String>,
    kind: PhantomData<K>,
}

pub type Widget = Part<WidgetKind>;
pub type Gadget = Part<GadgetKind>;

#[allow(dead_code)]
impl<K: PartKind> Part<K> {
    pub fn new(name: &str, size: u32, color: &str) -> Self {
        Self {
            name: name.to_string(),
            lifecycle: Lifecycle::CreateOrUpdate,
            size,
            color: color.to_string(),
            parent: None,
            id: None,
            kind: PhantomData,
        }
    }

    pub fn with_parent(mut self, parent: TaskRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    fn backend_key(&self) -> String {
        format!("{}/{}", K::KIND, self.name)
    }
}

#[async_trait]
impl<K: PartKind> Resource<FakeCloud> for Part<K> {
    const KIND: &'static str = K::KIND;

    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        self.parent.iter().cloned().collect()
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    async fn find(&self, cloud: &FakeCloud) -> Result<Option<Self>> {
        cloud.check_find(&self.backend_key())?;
        Ok(cloud.get(K::KIND, &self.name).map(|stored| Self {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            size: stored.size,
            color: stored.color,
            parent: self.parent.clone(),
            id: Some(stored.id),
            kind: PhantomData,
        }))
    }

    fn changed_fields(&self, actual: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.size != actual.size {
            changed.push("size");
        }
        if self.color != actual.color {
            changed.push("color");
        }
        changed
    }

    fn immutable_fields(&self) -> &'static [&'static str] {
        &["color"]
    }

    async fn render_live(
        &self,
        cloud: &FakeCloud,
        actual: Option<&Self>,
        delta: &Delta,
    ) -> Result<String> {
        let parent_id = match &self.parent {
            Some(parent) => Some(parent.require_id(&self.key())?),
            None => None,
        };
        let id = match delta {
            Delta::Update(_) => actual.and_then(|a| a.id.clone()).unwrap_or_default(),
            _ => String::new(),
        };
        cloud
            .mutate(
                &self.backend_key(),
                delta,
                Stored {
                    id,
                    size: self.size,
                    color: self.color.clone(),
                    parent_id,
                },
            )
            .await
    }

    fn render_text(&self, target: &TextTarget, _delta: &Delta) -> Result<()> {
        let mut fields = BTreeMap::new();
        fields.insert("size".to_string(), FieldValue::literal(self.size));
        fields.insert("color".to_string(), FieldValue::literal(self.color.clone()));
        if let Some(parent) = &self.parent {
            fields.insert(
                "parent_id".to_string(),
                match parent.id() {
                    Some(id) => FieldValue::literal(id),
                    None => FieldValue::reference(parent.kind(), parent.name(), "id"),
                },
            );
        }
        target.render_resource(K::KIND, &self.name, fields)
    }
}
