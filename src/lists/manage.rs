//! Creating, renaming and deleting curated lists

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    auth::AuthContext,
    bsky::{record_key, BskyError, RepoApi},
    errors::{BluelistError, BluelistResult},
};

/// Outcome of a list create/update/delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub success: bool,
    pub message: String,
}

impl ListChange {
    fn done(uri: Option<String>, message: &str) -> Self {
        Self {
            uri,
            success: true,
            message: message.to_string(),
        }
    }
}

pub struct ListManager {
    repo: Arc<dyn RepoApi>,
    auth: Arc<AuthContext>,
}

impl ListManager {
    pub fn new(repo: Arc<dyn RepoApi>, auth: Arc<AuthContext>) -> Self {
        Self { repo, auth }
    }

    pub async fn create_list(&self, name: &str, description: &str) -> BluelistResult<ListChange> {
        let repo = self.actor_id()?;
        match self.repo.create_list(&repo, name, description).await {
            Ok(record) => {
                info!("Created list {} ({})", name, record.uri);
                Ok(ListChange::done(Some(record.uri), "List created successfully"))
            }
            Err(e) => Err(self.fail("Failed to create list", e).await),
        }
    }

    pub async fn update_list(&self, uri: &str, name: &str, description: &str) -> BluelistResult<ListChange> {
        let repo = self.actor_id()?;
        let rkey = Self::rkey(uri)?;
        match self.repo.put_list(&repo, rkey, name, description).await {
            Ok(_) => Ok(ListChange::done(Some(uri.to_string()), "List updated successfully")),
            Err(e) => Err(self.fail("Failed to update list", e).await),
        }
    }

    pub async fn delete_list(&self, uri: &str) -> BluelistResult<ListChange> {
        let repo = self.actor_id()?;
        let rkey = Self::rkey(uri)?;
        match self.repo.delete_list(&repo, rkey).await {
            Ok(()) => Ok(ListChange::done(None, "List deleted successfully")),
            Err(e) => Err(self.fail("Failed to delete list", e).await),
        }
    }

    fn actor_id(&self) -> BluelistResult<String> {
        self.auth.actor_id().ok_or(BluelistError::NotAuthenticated)
    }

    fn rkey(uri: &str) -> BluelistResult<&str> {
        record_key(uri).ok_or_else(|| BluelistError::InvalidUri(uri.to_string()))
    }

    async fn fail(&self, context: &'static str, source: BskyError) -> BluelistError {
        self.auth.check_expired(&source).await;
        let err = BluelistError::upstream(context, source);
        error!("{}", err);
        err
    }
}
