//! Paged resource enumeration with batched tag correlation

use crate::error::{CloudError, Result};
use crate::tags::{NAME_TAG, Tag, Tags, matches_tags, tag_value};
use async_trait::async_trait;
use std::collections::HashMap;

/// One page of a listing call
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Marker for the next page; `None` when the listing is exhausted
    pub next_marker: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_marker: None,
        }
    }
}

/// Tags of one resource, as returned by a tag lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDescription {
    pub resource_id: String,
    pub tags: Vec<Tag>,
}

/// Listing capability for one resource kind
#[async_trait]
pub trait TaggedListing: Send + Sync {
    type Item: Send;

    /// Resource kind, used in logs and errors
    fn kind(&self) -> &str;

    /// Opaque identifier of a listed item
    fn resource_id(item: &Self::Item) -> String;

    /// Fetch one page, starting at `marker`
    async fn list_page(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> anyhow::Result<Page<Self::Item>>;

    /// Fetch tags for at most one batch of identifiers
    async fn describe_tags(&self, ids: &[String]) -> anyhow::Result<Vec<TagDescription>>;
}

/// A live object together with its resolved tags
#[derive(Debug, Clone)]
pub struct ResourceInfo<T> {
    /// Opaque backend identifier (e.g. an ARN)
    pub id: String,

    pub resource: T,

    pub tags: Vec<Tag>,
}

impl<T> ResourceInfo<T> {
    /// Value of the `Name` tag
    pub fn name_tag(&self) -> Option<&str> {
        self.get_tag(NAME_TAG)
    }

    /// Value of the tag with the given key
    pub fn get_tag(&self, key: &str) -> Option<&str> {
        tag_value(&self.tags, key)
    }

    /// Whether this object belongs to the set owned by `owned`
    pub fn is_owned_by(&self, owned: &Tags) -> bool {
        matches_tags(owned, &self.tags)
    }
}

/// List every resource of a kind, merging tags onto each object.
///
/// Pages are requested with a page size equal to `batch_limit`, and exactly
/// one tag lookup is issued per `batch_limit` identifiers of a page. Any
/// failure discards everything gathered so far.
pub async fn list_resources<L: TaggedListing>(
    listing: &L,
    batch_limit: usize,
) -> Result<Vec<ResourceInfo<L::Item>>> {
    let batch_limit = batch_limit.max(1);
    let kind = listing.kind().to_string();
    tracing::debug!("Listing all {} resources", kind);

    let mut results = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = listing
            .list_page(marker.take(), batch_limit)
            .await
            .map_err(|e| CloudError::backend(format!("listing {}", kind), e))?;
        pages += 1;

        if page.items.is_empty() {
            break;
        }

        let mut infos: Vec<ResourceInfo<L::Item>> = page
            .items
            .into_iter()
            .map(|item| ResourceInfo {
                id: L::resource_id(&item),
                resource: item,
                tags: Vec::new(),
            })
            .collect();

        for batch in infos.chunks_mut(batch_limit) {
            let ids: Vec<String> = batch.iter().map(|info| info.id.clone()).collect();
            let descriptions = listing
                .describe_tags(&ids)
                .await
                .map_err(|e| CloudError::backend(format!("listing {} tags", kind), e))?;
            merge_tags(&kind, batch, descriptions)?;
        }

        results.extend(infos);

        match page.next_marker {
            Some(next) if !next.is_empty() => marker = Some(next),
            _ => break,
        }
    }

    tracing::debug!(
        "Listed {} {} resources over {} pages",
        results.len(),
        kind,
        pages
    );
    Ok(results)
}

/// List resources of a kind and keep only those carrying every owned tag
pub async fn list_owned_resources<L: TaggedListing>(
    listing: &L,
    batch_limit: usize,
    owned: &Tags,
) -> Result<Vec<ResourceInfo<L::Item>>> {
    let all = list_resources(listing, batch_limit).await?;
    Ok(all.into_iter().filter(|info| info.is_owned_by(owned)).collect())
}

fn merge_tags<T>(
    kind: &str,
    batch: &mut [ResourceInfo<T>],
    descriptions: Vec<TagDescription>,
) -> Result<()> {
    let positions: HashMap<String, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, info)| (info.id.clone(), i))
        .collect();

    for description in descriptions {
        let Some(&index) = positions.get(&description.resource_id) else {
            tracing::error!(
                "Tag lookup returned {} {:?}, which was not requested",
                kind,
                description.resource_id
            );
            return Err(CloudError::InternalConsistency(format!(
                "found tags for {} {:?} that were not requested",
                kind, description.resource_id
            )));
        };
        batch[index].tags.extend(description.tags);
    }

    Ok(())
}
