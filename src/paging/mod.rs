//! Incremental pagination over cursor-based upstream collections
//!
//! A [`CollectionCache`] buffers items fetched from a remote source in
//! batches and serves fixed-size pages from that buffer, fetching further
//! batches only when a requested page lies beyond what is buffered. The same
//! engine backs follows, lists and list members; each supplies its own
//! [`BatchFetcher`].

mod cache;
mod view;

pub use cache::*;
pub use view::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::bsky::BskyError;

/// One upstream batch and the cursor of the next one (`None` when exhausted)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Batch<T> {
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Self { items, cursor }
    }
}

/// Source of upstream batches for one collection
///
/// Fetching the same cursor twice must be safe. Successive cursors must
/// preserve upstream order; the cache does not de-duplicate.
#[async_trait]
pub trait BatchFetcher<T>: Send + Sync {
    async fn fetch(
        &self,
        cursor: Option<&str>,
        page_size: usize,
        actor_id: &str,
    ) -> Result<Batch<T>, BskyError>;
}

#[derive(Error, Debug)]
pub enum PagingError {
    #[error("Please login first")]
    NotAuthenticated,

    #[error("Already fetching {0} data")]
    AlreadyFetching(CollectionKind),

    #[error("Error fetching {kind}: {source}")]
    Upstream {
        kind: CollectionKind,
        #[source]
        source: BskyError,
    },
}

impl PagingError {
    /// Whether the upstream rejected the session's credential as expired
    pub fn is_expired_token(&self) -> bool {
        matches!(self, PagingError::Upstream { source, .. } if source.is_expired_token())
    }
}

pub type PagingResult<T> = Result<T, PagingError>;
