//! Render targets
//!
//! Every task is rendered against exactly one target per pass:
//!
//! - [`Target::Live`]: mutate the cloud backend through its API
//! - [`Target::Text`]: append declarative resource blocks to a [`TextTarget`]
//! - [`Target::DryRun`]: compute deltas only

use crate::error::{CloudError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;

/// File name written by [`TextTarget::write_to`]
pub const TERRAFORM_FILE: &str = "kubernetes.tf.json";

/// Mutation sink selected once per run
#[derive(Debug)]
pub enum Target {
    Live,
    Text(TextTarget),
    DryRun,
}

impl Target {
    pub fn text() -> Self {
        Target::Text(TextTarget::new())
    }

    /// Whether this target mutates the backend
    pub fn is_live(&self) -> bool {
        matches!(self, Target::Live)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::Live => "live",
            Target::Text(_) => "terraform",
            Target::DryRun => "dry-run",
        }
    }

    pub fn as_text(&self) -> Option<&TextTarget> {
        match self {
            Target::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Symbolic reference to an attribute of another rendered resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: String,
    pub name: String,
    pub attribute: String,
}

impl Reference {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}.{}}}", self.kind, self.name, self.attribute)
    }
}

/// Field value of a rendered resource block
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Literal(Value),
    Reference(Reference),
    Block(BTreeMap<String, FieldValue>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        FieldValue::Literal(value.into())
    }

    pub fn reference(
        kind: impl Into<String>,
        name: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        FieldValue::Reference(Reference::new(kind, name, attribute))
    }

    /// All symbolic references nested in this value
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            FieldValue::Literal(_) => Vec::new(),
            FieldValue::Reference(r) => vec![r],
            FieldValue::Block(fields) => fields.values().flat_map(|v| v.references()).collect(),
            FieldValue::List(items) => items.iter().flat_map(|v| v.references()).collect(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FieldValue::Literal(value) => value.clone(),
            FieldValue::Reference(r) => Value::String(r.to_string()),
            FieldValue::Block(fields) => Value::Object(fields_to_json(fields)),
            FieldValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

fn fields_to_json(fields: &BTreeMap<String, FieldValue>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}

/// One declarative resource block
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    pub kind: String,
    pub name: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl ResourceBlock {
    pub fn references(&self) -> Vec<&Reference> {
        self.fields.values().flat_map(|v| v.references()).collect()
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Append-only declarative sink that never talks to the backend
#[derive(Debug, Default)]
pub struct TextTarget {
    blocks: Mutex<Vec<ResourceBlock>>,
}

impl TextTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource block. A (kind, name) pair may only be rendered once.
    pub fn render_resource(
        &self,
        kind: &str,
        name: &str,
        fields: BTreeMap<String, FieldValue>,
    ) -> Result<()> {
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);
        if blocks.iter().any(|b| b.kind == kind && b.name == name) {
            return Err(CloudError::InvalidConfig(format!(
                "resource {}.{} rendered twice",
                kind, name
            )));
        }
        tracing::debug!("Rendering {}.{}", kind, name);
        blocks.push(ResourceBlock {
            kind: kind.to_string(),
            name: name.to_string(),
            fields,
        });
        Ok(())
    }

    /// Snapshot of the blocks rendered so far, in render order
    pub fn blocks(&self) -> Vec<ResourceBlock> {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Render all blocks as a Terraform JSON document
    pub fn to_terraform_json(&self) -> Value {
        let mut by_kind: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for block in self.blocks() {
            by_kind
                .entry(block.kind.clone())
                .or_default()
                .insert(block.name.clone(), Value::Object(fields_to_json(&block.fields)));
        }

        let resources: Map<String, Value> = by_kind
            .into_iter()
            .map(|(kind, named)| (kind, Value::Object(named)))
            .collect();

        let mut root = Map::new();
        root.insert("resource".to_string(), Value::Object(resources));
        Value::Object(root)
    }

    /// Write the Terraform JSON document into `dir`, creating it if needed
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
            tracing::debug!("Created output directory: {}", dir.display());
        }

        let path = dir.join(TERRAFORM_FILE);
        let content = serde_json::to_string_pretty(&self.to_terraform_json())?;
        fs::write(&path, content).await?;

        tracing::info!("Wrote {} resources to {}", self.blocks().len(), path.display());
        Ok(path)
    }
}
