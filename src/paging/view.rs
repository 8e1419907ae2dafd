//! Page projection: slicing the buffer and reporting pagination metadata

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bsky::ListInfo;

/// Which collection a page belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionKind {
    Follows,
    Lists,
    ListMembers,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Follows => write!(f, "follows"),
            CollectionKind::Lists => write!(f, "lists"),
            CollectionKind::ListMembers => write!(f, "list members"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub has_more_pages: bool,
    /// Estimate: one extra page is assumed while upstream has more
    pub total_pages: usize,
    pub total_prefetched: usize,
}

/// What the UI renders for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView<T> {
    #[serde(rename = "type")]
    pub kind: CollectionKind,
    pub data: Vec<T>,
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_info: Option<ListInfo>,
}

/// A page plus its serialized snapshot, handed to downstream consumers such as prompts
#[derive(Debug, Clone)]
pub struct PageResult<T> {
    pub display_data: PageView<T>,
    pub json: String,
}

/// Number of pages needed to hold `len` items
pub fn pages_for(len: usize, items_per_page: usize) -> usize {
    len.div_ceil(items_per_page)
}

impl<T: Clone> PageView<T> {
    /// Project `page` (1-based) out of `buffer`
    pub fn project(
        kind: CollectionKind,
        buffer: &[T],
        page: usize,
        items_per_page: usize,
        upstream_has_more: bool,
    ) -> Self {
        let start = page.saturating_sub(1).saturating_mul(items_per_page);
        let end = start.saturating_add(items_per_page);
        let data = buffer
            .get(start.min(buffer.len())..end.min(buffer.len()))
            .map(<[T]>::to_vec)
            .unwrap_or_default();

        Self {
            kind,
            data,
            pagination: Pagination {
                current_page: page,
                has_more_pages: upstream_has_more || end < buffer.len(),
                total_pages: pages_for(buffer.len(), items_per_page)
                    + usize::from(upstream_has_more),
                total_prefetched: buffer.len(),
            },
            list_info: None,
        }
    }
}

impl<T> PageView<T> {
    pub fn with_list_info(mut self, list_info: Option<ListInfo>) -> Self {
        self.list_info = list_info;
        self
    }
}

impl<T: Serialize> PageView<T> {
    /// Attach the JSON snapshot of this page
    pub fn into_result(self) -> serde_json::Result<PageResult<T>> {
        let json = serde_json::to_string(&self)?;
        Ok(PageResult {
            display_data: self,
            json,
        })
    }
}
