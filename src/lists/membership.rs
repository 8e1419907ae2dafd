//! Adding profiles to lists and removing list items

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tracing::{debug, error, info};

use crate::{
    auth::AuthContext,
    bsky::{record_key, GraphApi, RepoApi},
    errors::{BluelistError, BluelistResult},
};

/// How many members the duplicate check looks at
const MEMBER_CHECK_LIMIT: usize = 100;

pub const ALREADY_IN_LIST: &str = "User is already in this list";
pub const ADDED_TO_LIST: &str = "User successfully added to list";
pub const REMOVED_FROM_LIST: &str = "User successfully removed from list";

/// Tracks whether membership changed since the members view was last loaded
#[derive(Debug, Default)]
pub struct MembershipCache {
    dirty: AtomicBool,
    counts: Mutex<HashMap<String, usize>>,
}

impl MembershipCache {
    /// Flag a membership change; known member counts are no longer valid
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.counts.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Read and reset the dirty flag
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn record_count(&self, list_uri: &str, count: usize) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(list_uri.to_string(), count);
    }

    pub fn count(&self, list_uri: &str) -> Option<usize> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(list_uri)
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRef {
    pub uri: String,
    pub name: String,
}

/// One profile and the lists it should be added to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLists {
    pub profile_did: String,
    pub lists: Vec<ListRef>,
}

/// Outcome of one add or remove in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_uri: Option<String>,
    pub success: bool,
    pub message: String,
}

pub struct MembershipService {
    graph: Arc<dyn GraphApi>,
    repo: Arc<dyn RepoApi>,
    auth: Arc<AuthContext>,
    cache: Arc<MembershipCache>,
}

impl MembershipService {
    pub fn new(
        graph: Arc<dyn GraphApi>,
        repo: Arc<dyn RepoApi>,
        auth: Arc<AuthContext>,
        cache: Arc<MembershipCache>,
    ) -> Self {
        Self {
            graph,
            repo,
            auth,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<MembershipCache> {
        &self.cache
    }

    /// Add `did` to the list unless it is already among the list's first members.
    ///
    /// The check and the write are separate requests, so two concurrent adds
    /// of the same profile can both pass the check.
    pub async fn add_user_to_list(&self, did: &str, list_uri: &str) -> BluelistResult<String> {
        let repo = self.actor_id()?;
        let result = self.add(&repo, did, list_uri).await;
        self.finish(result, "Error adding user to list").await
    }

    /// Add every profile to each of its lists, in order; failures do not stop the batch
    pub async fn add_users_to_lists(
        &self,
        users_to_lists: &[UserLists],
    ) -> BluelistResult<Vec<MembershipResult>> {
        let repo = self.actor_id()?;
        let mut results = Vec::new();

        for user in users_to_lists {
            for list in &user.lists {
                let outcome = self.add(&repo, &user.profile_did, &list.uri).await;
                let (success, message) = self.outcome(outcome, "Error adding user to list").await;
                results.push(MembershipResult {
                    profile_did: Some(user.profile_did.clone()),
                    list_uri: Some(list.uri.clone()),
                    list_name: Some(list.name.clone()),
                    item_uri: None,
                    success,
                    message,
                });
            }
        }

        info!(
            "Batch add finished: {} of {} succeeded",
            results.iter().filter(|result| result.success).count(),
            results.len()
        );
        Ok(results)
    }

    /// Delete one list item record
    pub async fn remove_user_from_list(&self, item_uri: &str) -> BluelistResult<String> {
        let repo = self.actor_id()?;
        let result = self.remove(&repo, item_uri).await;
        self.finish(result, "Error removing user from list").await
    }

    pub async fn remove_users_from_list(
        &self,
        item_uris: &[String],
    ) -> BluelistResult<Vec<MembershipResult>> {
        let repo = self.actor_id()?;
        let mut results = Vec::with_capacity(item_uris.len());

        for item_uri in item_uris {
            let outcome = self.remove(&repo, item_uri).await;
            let (success, message) = self.outcome(outcome, "Error removing user from list").await;
            results.push(MembershipResult {
                profile_did: None,
                list_uri: None,
                list_name: None,
                item_uri: Some(item_uri.clone()),
                success,
                message,
            });
        }

        Ok(results)
    }

    fn actor_id(&self) -> BluelistResult<String> {
        self.auth.actor_id().ok_or(BluelistError::NotAuthenticated)
    }

    async fn add(&self, repo: &str, did: &str, list_uri: &str) -> BluelistResult<String> {
        let upstream = |e| BluelistError::upstream("Failed to add to list", e);

        let list = self
            .graph
            .get_list(list_uri, MEMBER_CHECK_LIMIT, None)
            .await
            .map_err(upstream)?;
        let already_member = list
            .items
            .iter()
            .filter_map(|item| item.subject.as_ref()?.did.as_deref())
            .any(|member| member == did);
        if already_member {
            debug!("{} is already in {}", did, list_uri);
            return Ok(ALREADY_IN_LIST.to_string());
        }

        self.repo
            .create_list_item(repo, did, list_uri)
            .await
            .map_err(upstream)?;
        self.cache.mark_dirty();
        Ok(ADDED_TO_LIST.to_string())
    }

    async fn remove(&self, repo: &str, item_uri: &str) -> BluelistResult<String> {
        let rkey = record_key(item_uri).ok_or_else(|| BluelistError::InvalidUri(item_uri.to_string()))?;

        self.repo
            .delete_list_item(repo, rkey)
            .await
            .map_err(|e| BluelistError::upstream("Failed to remove from list", e))?;
        self.cache.mark_dirty();
        Ok(REMOVED_FROM_LIST.to_string())
    }

    async fn finish(&self, result: BluelistResult<String>, what: &str) -> BluelistResult<String> {
        if let Err(e) = &result {
            self.expire_if_needed(e).await;
            error!("{}: {}", what, e);
        }
        result
    }

    async fn outcome(&self, result: BluelistResult<String>, what: &str) -> (bool, String) {
        match self.finish(result, what).await {
            Ok(message) => (true, message),
            Err(e) => (false, e.to_string()),
        }
    }

    async fn expire_if_needed(&self, error: &BluelistError) {
        if let BluelistError::Upstream { source, .. } = error {
            self.auth.check_expired(source).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::MemoryCredentialStore,
        bsky::{types::wire, AuthSession, BskyError, BskyResult, RecordRef},
    };
    use async_trait::async_trait;
    use tokio::sync::Barrier;

    const FRIENDS: &str = "at://did:plc:me/app.bsky.graph.list/friends";
    const WORK: &str = "at://did:plc:me/app.bsky.graph.list/work";
    const BROKEN: &str = "at://did:plc:me/app.bsky.graph.list/broken";

    #[derive(Default)]
    struct FakeNetwork {
        members: Mutex<HashMap<String, Vec<String>>>,
        created: Mutex<Vec<(String, String)>>,
        deleted: Mutex<Vec<String>>,
        expired: bool,
        read_barrier: Option<Barrier>,
    }

    impl FakeNetwork {
        fn with_member(self, list_uri: &str, did: &str) -> Self {
            self.members
                .lock()
                .unwrap()
                .entry(list_uri.to_string())
                .or_default()
                .push(did.to_string());
            self
        }

        fn created(&self) -> Vec<(String, String)> {
            self.created.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GraphApi for FakeNetwork {
        async fn get_follows(&self, _: &str, _: usize, _: Option<&str>) -> BskyResult<wire::FollowsResponse> {
            unimplemented!()
        }

        async fn get_lists(&self, _: &str, _: usize, _: Option<&str>) -> BskyResult<wire::ListsResponse> {
            unimplemented!()
        }

        async fn get_list(&self, list_uri: &str, limit: usize, _: Option<&str>) -> BskyResult<wire::ListResponse> {
            assert_eq!(limit, MEMBER_CHECK_LIMIT);
            let items: Vec<_> = self
                .members
                .lock()
                .unwrap()
                .get(list_uri)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|did| serde_json::json!({"uri": format!("at://item/{}", did), "subject": {"did": did}}))
                .collect();
            if let Some(barrier) = &self.read_barrier {
                barrier.wait().await;
            }
            Ok(serde_json::from_value(serde_json::json!({
                "list": {"uri": list_uri, "name": "list"},
                "items": items
            }))?)
        }

        async fn get_profile(&self, _: &str) -> BskyResult<wire::ProfileView> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl RepoApi for FakeNetwork {
        async fn create_list_item(&self, repo: &str, subject: &str, list_uri: &str) -> BskyResult<RecordRef> {
            assert_eq!(repo, "did:plc:me");
            if self.expired {
                return Err(BskyError::ExpiredToken);
            }
            if list_uri == BROKEN {
                return Err(BskyError::ApiError {
                    status: 400,
                    error: "InvalidRequest".to_string(),
                    message: "List not found".to_string(),
                });
            }
            self.created
                .lock()
                .unwrap()
                .push((subject.to_string(), list_uri.to_string()));
            Ok(RecordRef {
                uri: format!("at://did:plc:me/app.bsky.graph.listitem/{}", subject),
                cid: "cid".to_string(),
            })
        }

        async fn delete_list_item(&self, _: &str, rkey: &str) -> BskyResult<()> {
            self.deleted.lock().unwrap().push(rkey.to_string());
            Ok(())
        }

        async fn create_list(&self, _: &str, _: &str, _: &str) -> BskyResult<RecordRef> {
            unimplemented!()
        }

        async fn put_list(&self, _: &str, _: &str, _: &str, _: &str) -> BskyResult<RecordRef> {
            unimplemented!()
        }

        async fn delete_list(&self, _: &str, _: &str) -> BskyResult<()> {
            unimplemented!()
        }
    }

    async fn service(network: Arc<FakeNetwork>) -> MembershipService {
        let auth = Arc::new(AuthContext::new(Arc::new(MemoryCredentialStore::default())));
        auth.login(AuthSession {
            did: "did:plc:me".to_string(),
            handle: "me.test".to_string(),
            access_jwt: "a".to_string(),
            refresh_jwt: "r".to_string(),
        })
        .await
        .unwrap();
        MembershipService::new(network.clone(), network, auth, Arc::new(MembershipCache::default()))
    }

    #[tokio::test]
    async fn test_add_existing_member_skips_write() {
        let network = Arc::new(FakeNetwork::default().with_member(FRIENDS, "did:plc:alice"));
        let service = service(network.clone()).await;

        let message = service.add_user_to_list("did:plc:alice", FRIENDS).await.unwrap();

        assert_eq!(message, ALREADY_IN_LIST);
        assert!(network.created().is_empty());
        assert!(!service.cache().is_dirty());
    }

    #[tokio::test]
    async fn test_add_new_member_marks_cache_dirty() {
        let network = Arc::new(FakeNetwork::default());
        let service = service(network.clone()).await;
        service.cache().record_count(FRIENDS, 3);

        let message = service.add_user_to_list("did:plc:bob", FRIENDS).await.unwrap();

        assert_eq!(message, ADDED_TO_LIST);
        assert_eq!(network.created(), vec![("did:plc:bob".to_string(), FRIENDS.to_string())]);
        assert_eq!(service.cache().count(FRIENDS), None);
        assert!(service.cache().take_dirty());
        assert!(!service.cache().is_dirty());
    }

    #[tokio::test]
    async fn test_batch_add_reports_each_pair_in_order() {
        let network = Arc::new(FakeNetwork::default());
        let service = service(network.clone()).await;
        let list = |uri: &str, name: &str| ListRef {
            uri: uri.to_string(),
            name: name.to_string(),
        };
        let batch = vec![
            UserLists {
                profile_did: "did:plc:alice".to_string(),
                lists: vec![list(FRIENDS, "Friends"), list(BROKEN, "Broken")],
            },
            UserLists {
                profile_did: "did:plc:bob".to_string(),
                lists: vec![list(WORK, "Work")],
            },
        ];

        let results = service.add_users_to_lists(&batch).await.unwrap();

        let outcomes: Vec<bool> = results.iter().map(|result| result.success).collect();
        assert_eq!(outcomes, vec![true, false, true]);
        assert_eq!(results[1].list_name.as_deref(), Some("Broken"));
        assert!(results[1].message.starts_with("Failed to add to list: "));
        assert!(results[1].message.contains("List not found"));
        assert_eq!(results[2].profile_did.as_deref(), Some("did:plc:bob"));
        assert_eq!(network.created().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_add_with_expired_token_logs_out() {
        let network = Arc::new(FakeNetwork {
            expired: true,
            ..FakeNetwork::default()
        });
        let service = service(network).await;
        let batch = vec![UserLists {
            profile_did: "did:plc:alice".to_string(),
            lists: vec![ListRef {
                uri: FRIENDS.to_string(),
                name: "Friends".to_string(),
            }],
        }];

        let results = service.add_users_to_lists(&batch).await.unwrap();

        assert!(!results[0].success);
        assert!(!service.auth.is_logged_in());
        assert!(matches!(
            service.add_users_to_lists(&batch).await,
            Err(BluelistError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_adds_can_both_pass_duplicate_check() {
        let network = Arc::new(FakeNetwork {
            read_barrier: Some(Barrier::new(2)),
            ..FakeNetwork::default()
        });
        let service = service(network.clone()).await;

        let (first, second) = futures::join!(
            service.add_user_to_list("did:plc:alice", FRIENDS),
            service.add_user_to_list("did:plc:alice", FRIENDS),
        );

        assert_eq!(first.unwrap(), ADDED_TO_LIST);
        assert_eq!(second.unwrap(), ADDED_TO_LIST);
        assert_eq!(network.created().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_uses_record_key() {
        let network = Arc::new(FakeNetwork::default());
        let service = service(network.clone()).await;

        let message = service
            .remove_user_from_list("at://did:plc:me/app.bsky.graph.listitem/3kabc")
            .await
            .unwrap();
        assert_eq!(message, REMOVED_FROM_LIST);
        assert_eq!(*network.deleted.lock().unwrap(), vec!["3kabc".to_string()]);
        assert!(service.cache().is_dirty());

        let results = service
            .remove_users_from_list(&["at://did:plc:me/app.bsky.graph.listitem/".to_string()])
            .await
            .unwrap();
        assert!(!results[0].success);
        assert!(results[0].message.starts_with("Not a record URI"));
    }
}
