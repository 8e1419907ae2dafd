//! Bluesky network access
//!
//! The client speaks XRPC over HTTP. Everything above it depends only on the
//! [`GraphApi`], [`FeedApi`], [`SessionApi`] and [`RepoApi`] traits.

pub mod client;
pub mod errors;
pub mod fetchers;
pub mod types;

pub use client::BskyClient;
pub use errors::*;
pub use fetchers::*;
pub use types::*;

use async_trait::async_trait;

/// Cursor-paginated graph reads
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn get_follows(
        &self,
        actor: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> BskyResult<types::wire::FollowsResponse>;

    async fn get_lists(
        &self,
        actor: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> BskyResult<types::wire::ListsResponse>;

    async fn get_list(
        &self,
        list_uri: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> BskyResult<types::wire::ListResponse>;

    async fn get_profile(&self, actor: &str) -> BskyResult<types::wire::ProfileView>;
}

/// Non-paginated post feeds
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn get_timeline(&self, limit: usize) -> BskyResult<types::wire::FeedResponse>;

    async fn get_list_feed(&self, list_uri: &str, limit: usize) -> BskyResult<types::wire::FeedResponse>;
}

/// App-password login
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self, identifier: &str, password: &str) -> BskyResult<AuthSession>;
}

/// Record writes in the authenticated user's repository
#[async_trait]
pub trait RepoApi: Send + Sync {
    async fn create_list_item(&self, repo: &str, subject: &str, list_uri: &str) -> BskyResult<RecordRef>;

    async fn delete_list_item(&self, repo: &str, rkey: &str) -> BskyResult<()>;

    async fn create_list(&self, repo: &str, name: &str, description: &str) -> BskyResult<RecordRef>;

    async fn put_list(&self, repo: &str, rkey: &str, name: &str, description: &str) -> BskyResult<RecordRef>;

    async fn delete_list(&self, repo: &str, rkey: &str) -> BskyResult<()>;
}
