//! Core application logic and orchestration
//!
//! [`App`] owns the authenticated context, the network seams and the three
//! collection caches, and coordinates them: membership changes refresh the
//! members view on its next load, list changes refresh the lists view, and
//! switching lists starts a fresh members cache.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthContext, FileCredentialStore},
    bsky::{
        AuthSession, BskyClient, FeedApi, FollowItem, FollowsFetcher, GraphApi, ListItem,
        ListMemberItem, ListMembersFetcher, ListsFetcher, RepoApi, SessionApi, TimelineItem,
    },
    config::Config,
    errors::{BluelistError, BluelistResult},
    lists::{ListChange, ListManager, MembershipCache, MembershipResult, MembershipService, UserLists},
    llm::{LlmError, LlmProvider, ProviderFactory},
    paging::{CollectionCache, CollectionKind, PageRequest, PageResult},
    suggestions::{ListCurator, RequestTracker, Suggestion, SuggestionService},
    utils::slug::SlugRegistry,
};

pub const DEFAULT_FEED_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    Timeline,
    ListPosts,
}

/// A non-paginated run of posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedView {
    #[serde(rename = "type")]
    pub kind: FeedKind,
    pub data: Vec<TimelineItem>,
}

/// Members cache of the list currently being viewed
struct ActiveMembers {
    list_uri: String,
    fetcher: Arc<ListMembersFetcher>,
    cache: Arc<CollectionCache<ListMemberItem>>,
}

/// Main application structure
pub struct App {
    config: Config,
    auth: Arc<AuthContext>,
    graph: Arc<dyn GraphApi>,
    feeds: Arc<dyn FeedApi>,
    sessions: Arc<dyn SessionApi>,
    follows: CollectionCache<FollowItem>,
    lists: CollectionCache<ListItem>,
    members: Mutex<Option<ActiveMembers>>,
    lists_dirty: AtomicBool,
    membership: MembershipService,
    list_manager: ListManager,
    slugs: SlugRegistry,
    suggestions: Option<SuggestionService>,
}

impl App {
    /// Create the application against the configured service, restoring any saved session
    pub async fn new(config: Config) -> Result<Self> {
        debug!("Creating new App instance");

        let store = Arc::new(FileCredentialStore::new(&config.data_dir));
        let auth = Arc::new(AuthContext::new(store));
        if let Err(e) = auth.restore().await {
            warn!("Ignoring unreadable saved session: {}", e);
        }

        let client = Arc::new(BskyClient::new(&config.service, auth.clone())?);

        let provider = Self::create_provider(&config);

        let slugs = SlugRegistry::load(&config.data_dir).await;
        let tracker = RequestTracker::load(&config.data_dir, config.exempt_dids.clone()).await;

        Ok(Self::from_parts(config, auth, client, provider, slugs, tracker))
    }

    /// Suggestions are disabled, not fatal, when no usable provider is configured
    fn create_provider(config: &Config) -> Option<Arc<dyn LlmProvider>> {
        if let Err(e) = config.validate_provider() {
            debug!("Suggestions unavailable: {}", e);
            return None;
        }
        match ProviderFactory::create_provider(config.provider_config()) {
            Ok(provider) => Some(Arc::from(provider)),
            Err(e) => {
                warn!("Suggestions unavailable: {}", e);
                None
            }
        }
    }

    /// Assemble the application from explicit parts
    pub fn from_parts<N>(
        config: Config,
        auth: Arc<AuthContext>,
        network: Arc<N>,
        provider: Option<Arc<dyn LlmProvider>>,
        slugs: SlugRegistry,
        tracker: RequestTracker,
    ) -> Self
    where
        N: GraphApi + FeedApi + SessionApi + RepoApi + 'static,
    {
        let graph: Arc<dyn GraphApi> = network.clone();
        let repo: Arc<dyn RepoApi> = network.clone();

        let follows = CollectionCache::new(
            config.cache_config(CollectionKind::Follows),
            Arc::new(FollowsFetcher::new(graph.clone())),
        );
        let lists = CollectionCache::new(
            config.cache_config(CollectionKind::Lists),
            Arc::new(ListsFetcher::new(graph.clone())),
        );

        let membership = MembershipService::new(
            graph.clone(),
            repo.clone(),
            auth.clone(),
            Arc::new(MembershipCache::default()),
        );
        let list_manager = ListManager::new(repo, auth.clone());

        let suggestions = provider.map(|provider| {
            let temperature = config.temperature.unwrap_or(0.3);
            SuggestionService::new(ListCurator::new(provider, temperature), tracker)
        });

        Self {
            config,
            auth,
            graph,
            feeds: network.clone(),
            sessions: network,
            follows,
            lists,
            members: Mutex::new(None),
            lists_dirty: AtomicBool::new(false),
            membership,
            list_manager,
            slugs,
            suggestions,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    pub async fn login(&self, identifier: &str, password: &str) -> BluelistResult<AuthSession> {
        let session = self
            .sessions
            .create_session(identifier, password)
            .await
            .map_err(|e| BluelistError::upstream("Login failed", e))?;

        self.auth
            .login(session.clone())
            .await
            .map_err(BluelistError::Storage)?;
        self.reset_views();
        Ok(session)
    }

    pub async fn logout(&self) -> BluelistResult<()> {
        self.auth.logout().await.map_err(BluelistError::Storage)?;
        self.reset_views();
        Ok(())
    }

    pub async fn get_follows(&self, request: PageRequest) -> BluelistResult<PageResult<FollowItem>> {
        let page = self.follows.get_page(&self.auth, request).await?;
        Ok(page.into_result()?)
    }

    pub async fn get_lists(&self, mut request: PageRequest) -> BluelistResult<PageResult<ListItem>> {
        if self.lists_dirty.swap(false, Ordering::SeqCst) {
            debug!("Lists changed, refreshing");
            request.refresh = true;
        }

        let page = match self.lists.get_page(&self.auth, request).await {
            Ok(page) => page,
            Err(e) => {
                if request.refresh {
                    self.lists_dirty.store(true, Ordering::SeqCst);
                }
                return Err(e.into());
            }
        };

        for list in &page.data {
            if let Err(e) = self.slugs.add_mapping(&list.uri, &list.name) {
                warn!("Failed to map slug for {}: {}", list.uri, e);
            }
        }
        self.save_slugs().await;

        Ok(page.into_result()?)
    }

    /// Members of `list_uri`; switching lists discards the previous list's buffer
    pub async fn get_list_members(
        &self,
        list_uri: &str,
        mut request: PageRequest,
    ) -> BluelistResult<PageResult<ListMemberItem>> {
        let (fetcher, cache) = self.members_for(list_uri);

        let membership_changed = self.membership.cache().take_dirty();
        if membership_changed {
            debug!("List membership changed, refreshing members");
            request.refresh = true;
        }

        let page = match cache.get_page(&self.auth, request).await {
            Ok(page) => page,
            Err(e) => {
                if membership_changed {
                    self.membership.cache().mark_dirty();
                }
                return Err(e.into());
            }
        };

        let snapshot = cache.snapshot();
        if !snapshot.has_more_pages {
            self.membership.cache().record_count(list_uri, snapshot.buffered);
        }

        Ok(page.with_list_info(fetcher.list_info()).into_result()?)
    }

    /// Member count of a fully loaded list
    pub fn member_count(&self, list_uri: &str) -> Option<usize> {
        self.membership.cache().count(list_uri)
    }

    pub async fn add_user_to_list(&self, did: &str, list_uri: &str) -> BluelistResult<String> {
        self.membership.add_user_to_list(did, list_uri).await
    }

    pub async fn add_users_to_lists(&self, users_to_lists: &[UserLists]) -> BluelistResult<Vec<MembershipResult>> {
        self.membership.add_users_to_lists(users_to_lists).await
    }

    pub async fn remove_user_from_list(&self, item_uri: &str) -> BluelistResult<String> {
        self.membership.remove_user_from_list(item_uri).await
    }

    pub async fn remove_users_from_list(&self, item_uris: &[String]) -> BluelistResult<Vec<MembershipResult>> {
        self.membership.remove_users_from_list(item_uris).await
    }

    pub async fn create_list(&self, name: &str, description: &str) -> BluelistResult<ListChange> {
        let change = self.list_manager.create_list(name, description).await?;
        if let Some(uri) = &change.uri {
            if let Err(e) = self.slugs.add_mapping(uri, name) {
                warn!("Failed to map slug for {}: {}", uri, e);
            }
            self.save_slugs().await;
        }
        self.lists_dirty.store(true, Ordering::SeqCst);
        Ok(change)
    }

    pub async fn update_list(&self, uri: &str, name: &str, description: &str) -> BluelistResult<ListChange> {
        let change = self.list_manager.update_list(uri, name, description).await?;
        self.lists_dirty.store(true, Ordering::SeqCst);
        Ok(change)
    }

    pub async fn delete_list(&self, uri: &str) -> BluelistResult<ListChange> {
        let change = self.list_manager.delete_list(uri).await?;
        self.lists_dirty.store(true, Ordering::SeqCst);
        let mut members = self.lock_members();
        if members.as_ref().is_some_and(|active| active.list_uri == uri) {
            *members = None;
        }
        Ok(change)
    }

    pub async fn timeline(&self, limit: usize) -> BluelistResult<FeedView> {
        self.require_login()?;
        let response = match self.feeds.get_timeline(limit).await {
            Ok(response) => response,
            Err(e) => return Err(self.feed_error("Failed to fetch timeline", e).await),
        };
        Ok(FeedView {
            kind: FeedKind::Timeline,
            data: response.feed.into_iter().map(TimelineItem::from).collect(),
        })
    }

    pub async fn list_feed(&self, list_uri: &str, limit: usize) -> BluelistResult<FeedView> {
        self.require_login()?;
        let response = match self.feeds.get_list_feed(list_uri, limit).await {
            Ok(response) => response,
            Err(e) => return Err(self.feed_error("Failed to fetch list feed", e).await),
        };
        Ok(FeedView {
            kind: FeedKind::ListPosts,
            data: response.feed.into_iter().map(TimelineItem::from).collect(),
        })
    }

    /// Ask the language model how the profiles on a follows page fit the user's lists
    pub async fn suggest(&self, follows_page: usize) -> BluelistResult<Suggestion> {
        let service = self.suggestions.as_ref().ok_or_else(|| {
            LlmError::ConfigError("No language model provider configured".to_string())
        })?;
        let did = self.require_login()?;

        let follows = self.get_follows(PageRequest::page(follows_page)).await?;
        if self.lists.snapshot().buffered == 0 {
            self.get_lists(PageRequest::page(1)).await?;
        }

        let users_json = serde_json::to_string(&follows.display_data.data)?;
        let lists_json = serde_json::to_string(&self.lists.items())?;

        let suggestion = service.suggest(&did, &users_json, &lists_json).await?;
        info!("{} suggestion requests left today", suggestion.remaining);
        Ok(suggestion)
    }

    pub fn remaining_suggestions(&self) -> Option<u32> {
        let did = self.auth.actor_id()?;
        let service = self.suggestions.as_ref()?;
        Some(service.tracker().remaining_requests(&did))
    }

    /// Resolve a list slug or `at://` URI to a list URI
    pub fn resolve_list(&self, input: &str) -> BluelistResult<String> {
        self.slugs
            .resolve(input)
            .ok_or_else(|| BluelistError::UnknownList(input.to_string()))
    }

    pub fn slug_for(&self, list_uri: &str) -> Option<String> {
        self.slugs.slug_by_uri(list_uri)
    }

    fn members_for(&self, list_uri: &str) -> (Arc<ListMembersFetcher>, Arc<CollectionCache<ListMemberItem>>) {
        let mut members = self.lock_members();
        match members.as_ref() {
            Some(active) if active.list_uri == list_uri => {
                (active.fetcher.clone(), active.cache.clone())
            }
            _ => {
                debug!("Switching members view to {}", list_uri);
                let fetcher = Arc::new(ListMembersFetcher::new(self.graph.clone(), list_uri));
                let cache = Arc::new(CollectionCache::new(
                    self.config.cache_config(CollectionKind::ListMembers),
                    fetcher.clone(),
                ));
                *members = Some(ActiveMembers {
                    list_uri: list_uri.to_string(),
                    fetcher: fetcher.clone(),
                    cache: cache.clone(),
                });
                (fetcher, cache)
            }
        }
    }

    fn reset_views(&self) {
        self.follows.clear();
        self.lists.clear();
        *self.lock_members() = None;
    }

    fn require_login(&self) -> BluelistResult<String> {
        self.auth.actor_id().ok_or(BluelistError::NotAuthenticated)
    }

    async fn feed_error(&self, context: &'static str, source: crate::bsky::BskyError) -> BluelistError {
        self.auth.check_expired(&source).await;
        BluelistError::upstream(context, source)
    }

    async fn save_slugs(&self) {
        if let Err(e) = self.slugs.save().await {
            warn!("Failed to store slugs: {:#}", e);
        }
    }

    fn lock_members(&self) -> MutexGuard<'_, Option<ActiveMembers>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
