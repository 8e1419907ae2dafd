//! The collection cache: buffering, fetch decisions and the fetch guard

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::{BatchFetcher, CollectionKind, PageView, PagingError, PagingResult, pages_for};
use crate::{auth::AuthContext, bsky::BskyError};

/// Fixed shape of one collection instance
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub kind: CollectionKind,
    pub items_per_page: usize,
    /// Items requested from upstream per batch
    pub batch_size: usize,
    /// Upper bound on batches fetched by a single page request
    pub max_catch_up_batches: usize,
}

impl CacheConfig {
    pub fn new(kind: CollectionKind, items_per_page: usize, batch_size: usize) -> Self {
        Self {
            kind,
            items_per_page: items_per_page.max(1),
            batch_size: batch_size.max(1),
            max_catch_up_batches: 50,
        }
    }

    pub fn with_max_catch_up_batches(mut self, max: usize) -> Self {
        self.max_catch_up_batches = max;
        self
    }
}

/// A page request; `page` defaults to the page currently displayed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page: Option<usize>,
    /// Drop the buffer and restart from the first upstream batch
    pub refresh: bool,
    /// Warm the buffer without changing the displayed page
    pub prefetch_only: bool,
}

impl PageRequest {
    pub fn page(page: usize) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    pub fn refresh() -> Self {
        Self {
            refresh: true,
            ..Self::default()
        }
    }

    pub fn prefetch(page: usize) -> Self {
        Self {
            page: Some(page),
            prefetch_only: true,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct CollectionState<T> {
    buffer: Vec<T>,
    cursor: Option<String>,
    has_more_pages: bool,
    current_page: usize,
    is_fetching: bool,
    prefetched_pages: usize,
    /// Bumped by every refresh; fetch results from an older generation are dropped
    generation: u64,
}

impl<T> CollectionState<T> {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: None,
            has_more_pages: false,
            current_page: 1,
            is_fetching: false,
            prefetched_pages: 0,
            generation: 0,
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = None;
        self.has_more_pages = false;
        self.current_page = 1;
        self.prefetched_pages = 0;
        self.generation += 1;
    }

    fn max_available_page(&self, items_per_page: usize) -> usize {
        pages_for(self.buffer.len(), items_per_page).max(1)
    }

    fn set_cursor(&mut self, cursor: Option<String>) {
        self.has_more_pages = cursor.is_some();
        self.cursor = cursor;
    }
}

/// Read-only view of the cache state, for status lines and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub buffered: usize,
    pub cursor: Option<String>,
    pub has_more_pages: bool,
    pub current_page: usize,
    pub is_fetching: bool,
    pub prefetched_pages: usize,
}

/// Clears `is_fetching` when the fetch sequence that set it ends, on every exit path
struct FetchGuard<'a, T> {
    state: &'a Mutex<CollectionState<T>>,
    generation: u64,
}

impl<T> Drop for FetchGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A refresh that took over owns the flag now.
        if state.generation == self.generation {
            state.is_fetching = false;
        }
    }
}

/// Buffered, incrementally fetched view over one upstream collection
pub struct CollectionCache<T> {
    config: CacheConfig,
    fetcher: Arc<dyn BatchFetcher<T>>,
    state: Mutex<CollectionState<T>>,
}

impl<T> CollectionCache<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(config: CacheConfig, fetcher: Arc<dyn BatchFetcher<T>>) -> Self {
        Self {
            config,
            fetcher,
            state: Mutex::new(CollectionState::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn kind(&self) -> CollectionKind {
        self.config.kind
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.lock();
        CacheSnapshot {
            buffered: state.buffer.len(),
            cursor: state.cursor.clone(),
            has_more_pages: state.has_more_pages,
            current_page: state.current_page,
            is_fetching: state.is_fetching,
            prefetched_pages: state.prefetched_pages,
        }
    }

    /// Everything buffered so far, in upstream order
    pub fn items(&self) -> Vec<T> {
        self.lock().buffer.clone()
    }

    /// Drop everything buffered; the next request starts from the first batch
    pub fn clear(&self) {
        let mut state = self.lock();
        state.reset();
        // An in-flight sequence now belongs to a dead generation and will not release the flag.
        state.is_fetching = false;
    }

    /// Serve `request`, fetching upstream batches only when the buffer cannot
    pub async fn get_page(
        &self,
        auth: &AuthContext,
        request: PageRequest,
    ) -> PagingResult<PageView<T>> {
        let kind = self.config.kind;
        let actor_id = auth.actor_id().ok_or(PagingError::NotAuthenticated)?;

        let (guard, requested) = {
            let mut state = self.lock();
            if state.is_fetching && !request.refresh {
                info!("Already fetching {} data", kind);
                return Err(PagingError::AlreadyFetching(kind));
            }
            if request.refresh {
                debug!("Refreshing {}", kind);
                state.reset();
            }
            state.is_fetching = true;

            let requested = request.page.unwrap_or(state.current_page).max(1);
            let guard = FetchGuard {
                state: &self.state,
                generation: state.generation,
            };
            (guard, requested)
        };
        let generation = guard.generation;

        let filled = self.fill(generation, &actor_id, requested, request.refresh).await;
        drop(guard);

        if let Err(source) = filled {
            auth.check_expired(&source).await;
            error!("Error fetching {}: {}", kind, source);
            return Err(PagingError::Upstream { kind, source });
        }

        let mut state = self.lock();
        let per_page = self.config.items_per_page;

        if state.generation != generation {
            debug!("{} request was superseded by a refresh", kind);
            return Ok(self.project(&state, state.current_page));
        }

        if request.prefetch_only {
            return Ok(self.project(&state, state.current_page));
        }

        let valid_page = requested.min(state.max_available_page(per_page));
        if valid_page != requested {
            info!(
                "Requested page {} is out of bounds, using page {} instead",
                requested, valid_page
            );
        }
        state.current_page = valid_page;

        Ok(self.project(&state, valid_page))
    }

    /// Fetch until `requested` is buffered, upstream is exhausted, or the catch-up bound is hit
    async fn fill(
        &self,
        generation: u64,
        actor_id: &str,
        requested: usize,
        refresh: bool,
    ) -> Result<(), BskyError> {
        let kind = self.config.kind;
        let per_page = self.config.items_per_page;
        let batch_size = self.config.batch_size;

        // An exhausted empty collection has still been loaded; only a refresh refetches it.
        let loaded = self.lock().prefetched_pages > 0;
        if !loaded || refresh {
            debug!("Fetching first {} batch", kind);
            let batch = self.fetcher.fetch(None, batch_size, actor_id).await?;

            let mut state = self.lock();
            if state.generation != generation {
                debug!("Discarding {} batch from a superseded fetch", kind);
                return Ok(());
            }
            debug!("Fetched {} {} (more: {})", batch.items.len(), kind, batch.cursor.is_some());
            state.buffer = batch.items;
            state.prefetched_pages = 1;
            state.set_cursor(batch.cursor);
            return Ok(());
        }

        let mut batches = 0;
        loop {
            let cursor = {
                let state = self.lock();
                if state.generation != generation {
                    return Ok(());
                }
                match &state.cursor {
                    Some(cursor) if requested > state.max_available_page(per_page) => {
                        cursor.clone()
                    }
                    _ => return Ok(()),
                }
            };

            if batches >= self.config.max_catch_up_batches {
                warn!(
                    "Stopped catching up on {} after {} batches without reaching page {}",
                    kind, batches, requested
                );
                return Ok(());
            }
            batches += 1;

            debug!("Fetching {} batch {} after cursor {}", kind, batches, cursor);
            let batch = self.fetcher.fetch(Some(&cursor), batch_size, actor_id).await?;

            let mut state = self.lock();
            if state.generation != generation {
                debug!("Discarding {} batch from a superseded fetch", kind);
                return Ok(());
            }
            if batch.items.is_empty() {
                debug!("Upstream {} exhausted", kind);
                state.set_cursor(None);
                return Ok(());
            }
            state.buffer.extend(batch.items);
            state.prefetched_pages += 1;
            state.set_cursor(batch.cursor);
        }
    }

    fn project(&self, state: &CollectionState<T>, page: usize) -> PageView<T> {
        PageView::project(
            self.config.kind,
            &state.buffer,
            page,
            self.config.items_per_page,
            state.has_more_pages,
        )
    }

    fn lock(&self) -> MutexGuard<'_, CollectionState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
