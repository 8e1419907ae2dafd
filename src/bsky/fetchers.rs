//! Batch fetchers for the three paginated collections

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::{
    bsky::{
        client::LIST_ITEM_COLLECTION,
        errors::BskyError,
        types::{wire, FollowItem, ListInfo, ListItem, ListMemberItem},
        GraphApi,
    },
    paging::{Batch, BatchFetcher},
};

/// Upstream signals exhaustion with a missing or empty cursor
fn next_cursor(cursor: Option<String>) -> Option<String> {
    cursor.filter(|cursor| !cursor.is_empty())
}

/// Follows of the authenticated actor
pub struct FollowsFetcher {
    api: Arc<dyn GraphApi>,
}

impl FollowsFetcher {
    pub fn new(api: Arc<dyn GraphApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BatchFetcher<FollowItem> for FollowsFetcher {
    async fn fetch(
        &self,
        cursor: Option<&str>,
        page_size: usize,
        actor_id: &str,
    ) -> Result<Batch<FollowItem>, BskyError> {
        let response = self.api.get_follows(actor_id, page_size, cursor).await?;
        let items = response.follows.into_iter().map(FollowItem::from).collect();
        Ok(Batch::new(items, next_cursor(response.cursor)))
    }
}

/// Lists owned by the authenticated actor
pub struct ListsFetcher {
    api: Arc<dyn GraphApi>,
}

impl ListsFetcher {
    pub fn new(api: Arc<dyn GraphApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BatchFetcher<ListItem> for ListsFetcher {
    async fn fetch(
        &self,
        cursor: Option<&str>,
        page_size: usize,
        actor_id: &str,
    ) -> Result<Batch<ListItem>, BskyError> {
        let response = self.api.get_lists(actor_id, page_size, cursor).await?;
        let items = response.lists.into_iter().map(ListItem::from).collect();
        Ok(Batch::new(items, next_cursor(response.cursor)))
    }
}

/// Members of one list, each resolved to a full profile
pub struct ListMembersFetcher {
    api: Arc<dyn GraphApi>,
    list_uri: String,
    list_info: Mutex<Option<ListInfo>>,
}

impl ListMembersFetcher {
    pub fn new(api: Arc<dyn GraphApi>, list_uri: impl Into<String>) -> Self {
        Self {
            api,
            list_uri: list_uri.into(),
            list_info: Mutex::new(None),
        }
    }

    pub fn list_uri(&self) -> &str {
        &self.list_uri
    }

    /// Descriptor of the list, known after the first batch
    pub fn list_info(&self) -> Option<ListInfo> {
        self.list_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn resolve_member(&self, item: wire::ListItemView) -> Option<ListMemberItem> {
        let did = item.subject.and_then(|subject| subject.did)?;
        let uri = item.uri.unwrap_or_else(|| {
            format!("at://{}/{}/{}", did, LIST_ITEM_COLLECTION, Utc::now().timestamp_millis())
        });

        match self.api.get_profile(&did).await {
            Ok(profile) => Some(ListMemberItem {
                did: profile.did,
                handle: profile.handle,
                name: profile.display_name,
                description: profile.description,
                uri,
                avatar: profile.avatar,
            }),
            Err(e) => {
                warn!("Failed to fetch profile for {}: {}", did, e);
                Some(ListMemberItem {
                    handle: did.clone(),
                    did,
                    name: None,
                    description: None,
                    uri,
                    avatar: None,
                })
            }
        }
    }
}

#[async_trait]
impl BatchFetcher<ListMemberItem> for ListMembersFetcher {
    async fn fetch(
        &self,
        cursor: Option<&str>,
        page_size: usize,
        _actor_id: &str,
    ) -> Result<Batch<ListMemberItem>, BskyError> {
        let mut cursor = cursor.map(str::to_string);
        loop {
            let response = self.api.get_list(&self.list_uri, page_size, cursor.as_deref()).await?;
            *self.list_info.lock().unwrap_or_else(PoisonError::into_inner) = Some(ListInfo::from(response.list));

            let item_count = response.items.len();
            let members: Vec<ListMemberItem> = join_all(
                response
                    .items
                    .into_iter()
                    .map(|item| self.resolve_member(item)),
            )
            .await
            .into_iter()
            .flatten()
            .collect();

            if members.len() < item_count {
                debug!("Skipped {} list items without a subject", item_count - members.len());
            }

            let next = next_cursor(response.cursor);
            // An empty batch reads as exhaustion, so skip past pages that filtered to nothing.
            if members.is_empty() && item_count > 0 && next.is_some() && next != cursor {
                cursor = next;
                continue;
            }
            return Ok(Batch::new(members, next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsky::errors::BskyResult;

    /// Serves canned graph responses and records the calls it received
    #[derive(Default)]
    struct FakeGraph {
        calls: Mutex<Vec<String>>,
    }

    impl FakeGraph {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl GraphApi for FakeGraph {
        async fn get_follows(
            &self,
            actor: &str,
            limit: usize,
            cursor: Option<&str>,
        ) -> BskyResult<wire::FollowsResponse> {
            self.record(format!("follows {} {} {:?}", actor, limit, cursor));
            Ok(serde_json::from_value(serde_json::json!({
                "follows": [
                    {"did": "did:plc:a", "handle": "a.test", "displayName": "A"},
                    {"did": "did:plc:b", "handle": "b.test"}
                ],
                "cursor": ""
            }))?)
        }

        async fn get_lists(
            &self,
            actor: &str,
            limit: usize,
            cursor: Option<&str>,
        ) -> BskyResult<wire::ListsResponse> {
            self.record(format!("lists {} {} {:?}", actor, limit, cursor));
            Ok(serde_json::from_value(serde_json::json!({
                "lists": [{"uri": "at://me/list/1", "name": "Friends"}],
                "cursor": "next"
            }))?)
        }

        async fn get_list(
            &self,
            list_uri: &str,
            limit: usize,
            cursor: Option<&str>,
        ) -> BskyResult<wire::ListResponse> {
            self.record(format!("list {} {} {:?}", list_uri, limit, cursor));
            Ok(serde_json::from_value(serde_json::json!({
                "list": {"uri": list_uri, "name": "Friends", "description": "close ones"},
                "items": [
                    {"uri": "at://me/listitem/1", "subject": {"did": "did:plc:a"}},
                    {"uri": "at://me/listitem/2", "subject": {}},
                    {"subject": {"did": "did:plc:broken"}}
                ]
            }))?)
        }

        async fn get_profile(&self, actor: &str) -> BskyResult<wire::ProfileView> {
            if actor == "did:plc:broken" {
                return Err(BskyError::ApiError {
                    status: 400,
                    error: "InvalidRequest".to_string(),
                    message: "Profile not found".to_string(),
                });
            }
            Ok(serde_json::from_value(serde_json::json!({
                "did": actor,
                "handle": "a.test",
                "displayName": "A",
                "avatar": "https://cdn/a.jpg"
            }))?)
        }
    }

    #[tokio::test]
    async fn test_follows_fetcher_normalizes_and_ends_on_empty_cursor() {
        let graph = Arc::new(FakeGraph::default());
        let fetcher = FollowsFetcher::new(graph.clone());

        let batch = fetcher.fetch(Some("c1"), 20, "did:plc:me").await.unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.items[0].name.as_deref(), Some("A"));
        assert_eq!(batch.cursor, None);
        assert_eq!(graph.calls(), vec!["follows did:plc:me 20 Some(\"c1\")".to_string()]);
    }

    #[tokio::test]
    async fn test_lists_fetcher_keeps_cursor() {
        let graph = Arc::new(FakeGraph::default());
        let fetcher = ListsFetcher::new(graph);

        let batch = fetcher.fetch(None, 50, "did:plc:me").await.unwrap();
        assert_eq!(batch.items[0].name, "Friends");
        assert_eq!(batch.cursor.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn test_members_fetcher_resolves_profiles_with_fallback() {
        let graph = Arc::new(FakeGraph::default());
        let fetcher = ListMembersFetcher::new(graph, "at://me/list/1");
        assert!(fetcher.list_info().is_none());

        let batch = fetcher.fetch(None, 20, "did:plc:me").await.unwrap();

        // the item without a subject DID is skipped
        assert_eq!(batch.items.len(), 2);

        let resolved = &batch.items[0];
        assert_eq!(resolved.handle, "a.test");
        assert_eq!(resolved.uri, "at://me/listitem/1");
        assert_eq!(resolved.avatar.as_deref(), Some("https://cdn/a.jpg"));

        let fallback = &batch.items[1];
        assert_eq!(fallback.did, "did:plc:broken");
        assert_eq!(fallback.handle, "did:plc:broken");
        assert!(fallback.uri.starts_with("at://did:plc:broken/app.bsky.graph.listitem/"));

        let info = fetcher.list_info().unwrap();
        assert_eq!(info.name, "Friends");
        assert_eq!(info.description.as_deref(), Some("close ones"));
        assert_eq!(info.uri, "at://me/list/1");
    }

    /// A list whose first page holds only items without a subject
    #[derive(Default)]
    struct SparseGraph {
        cursors: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl GraphApi for SparseGraph {
        async fn get_follows(&self, _: &str, _: usize, _: Option<&str>) -> BskyResult<wire::FollowsResponse> {
            unimplemented!()
        }

        async fn get_lists(&self, _: &str, _: usize, _: Option<&str>) -> BskyResult<wire::ListsResponse> {
            unimplemented!()
        }

        async fn get_list(
            &self,
            list_uri: &str,
            _limit: usize,
            cursor: Option<&str>,
        ) -> BskyResult<wire::ListResponse> {
            self.cursors.lock().unwrap().push(cursor.map(str::to_string));
            let (items, next) = match cursor {
                None => (serde_json::json!([{"subject": {}}, {"subject": {}}]), "c1"),
                Some(_) => (
                    serde_json::json!([{"uri": "at://me/listitem/9", "subject": {"did": "did:plc:z"}}]),
                    "",
                ),
            };
            Ok(serde_json::from_value(serde_json::json!({
                "list": {"uri": list_uri, "name": "Sparse"},
                "items": items,
                "cursor": next
            }))?)
        }

        async fn get_profile(&self, actor: &str) -> BskyResult<wire::ProfileView> {
            Ok(serde_json::from_value(serde_json::json!({"did": actor, "handle": "z.test"}))?)
        }
    }

    #[tokio::test]
    async fn test_members_fetcher_skips_pages_without_members() {
        let graph = Arc::new(SparseGraph::default());
        let fetcher = ListMembersFetcher::new(graph.clone(), "at://me/list/2");

        let batch = fetcher.fetch(None, 20, "did:plc:me").await.unwrap();

        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].handle, "z.test");
        assert_eq!(batch.cursor, None);
        assert_eq!(
            *graph.cursors.lock().unwrap(),
            vec![None, Some("c1".to_string())]
        );
    }
}
