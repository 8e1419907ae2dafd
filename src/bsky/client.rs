//! XRPC client for the Bluesky network

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    auth::AuthContext,
    bsky::{
        errors::{BskyError, BskyResult},
        types::{wire, AuthSession, RecordRef},
        FeedApi, GraphApi, RepoApi, SessionApi,
    },
    utils::retry::{self, RetryOptions},
};

pub const LIST_COLLECTION: &str = "app.bsky.graph.list";
pub const LIST_ITEM_COLLECTION: &str = "app.bsky.graph.listitem";
pub const CURATE_LIST_PURPOSE: &str = "app.bsky.graph.defs#curatelist";

/// Map a non-success XRPC response to a typed error
pub fn error_from_response(status: u16, body: &str) -> BskyError {
    let parsed: Option<wire::ErrorBody> = serde_json::from_str(body).ok();
    let (error, message) = match parsed {
        Some(body) => (body.error, body.message),
        None => (None, None),
    };

    if error.as_deref() == Some("ExpiredToken") {
        return BskyError::ExpiredToken;
    }

    let message = message.unwrap_or_else(|| body.to_string());
    match status {
        401 => BskyError::Unauthorized(message),
        429 => BskyError::RateLimitError(message),
        _ => BskyError::ApiError {
            status,
            error: error.unwrap_or_else(|| "Unknown".to_string()),
            message,
        },
    }
}

/// HTTP client for the XRPC endpoints Bluelist uses
pub struct BskyClient {
    client: Client,
    service_url: String,
    auth: Arc<AuthContext>,
    options: RetryOptions,
}

impl BskyClient {
    pub fn new(service_url: &str, auth: Arc<AuthContext>) -> BskyResult<Self> {
        Self::with_options(service_url, auth, RetryOptions::default())
    }

    pub fn with_options(
        service_url: &str,
        auth: Arc<AuthContext>,
        options: RetryOptions,
    ) -> BskyResult<Self> {
        if service_url.trim().is_empty() {
            return Err(BskyError::ConfigError("Service URL is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .user_agent(&options.user_agent)
            .build()
            .map_err(|e| BskyError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
            auth,
            options,
        })
    }

    pub fn auth(&self) -> &Arc<AuthContext> {
        &self.auth
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, nsid)
    }

    fn authorized(&self, request: RequestBuilder) -> BskyResult<RequestBuilder> {
        let token = self.auth.access_token().ok_or(BskyError::MissingToken)?;
        Ok(request.bearer_auth(token))
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> BskyResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status.as_u16(), &body))
    }

    /// Authenticated query, retried on transient failures
    async fn query<T: DeserializeOwned>(&self, nsid: &str, params: &[(&str, String)]) -> BskyResult<T> {
        let mut last_error = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                retry::exponential_backoff_with_jitter(attempt, self.options.retry_delay_ms).await;
            }

            let request = self.authorized(self.client.get(self.endpoint(nsid)).query(params))?;
            let result = match request.send().await {
                Ok(response) => Self::read_response(response).await,
                Err(e) => Err(BskyError::HttpError(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retryable() || attempt == self.options.max_retries {
                        return Err(error);
                    }
                    warn!("{} failed (attempt {}): {}", nsid, attempt + 1, error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BskyError::ConfigError("No attempts made".to_string())))
    }

    /// Procedure call; not retried because writes are not idempotent
    async fn procedure<T: DeserializeOwned>(&self, nsid: &str, body: &Value, authenticated: bool) -> BskyResult<T> {
        let mut request = self.client.post(self.endpoint(nsid)).json(body);
        if authenticated {
            request = self.authorized(request)?;
        }

        debug!("POST {}", nsid);
        let response = request.send().await?;
        Self::read_response(response).await
    }

    pub async fn create_record(&self, repo: &str, collection: &str, record: Value) -> BskyResult<RecordRef> {
        self.procedure(
            "com.atproto.repo.createRecord",
            &json!({ "repo": repo, "collection": collection, "record": record }),
            true,
        )
        .await
    }

    pub async fn put_record(
        &self,
        repo: &str,
        collection: &str,
        rkey: &str,
        record: Value,
    ) -> BskyResult<RecordRef> {
        self.procedure(
            "com.atproto.repo.putRecord",
            &json!({ "repo": repo, "collection": collection, "rkey": rkey, "record": record }),
            true,
        )
        .await
    }

    pub async fn delete_record(&self, repo: &str, collection: &str, rkey: &str) -> BskyResult<()> {
        let _: Value = self
            .procedure(
                "com.atproto.repo.deleteRecord",
                &json!({ "repo": repo, "collection": collection, "rkey": rkey }),
                true,
            )
            .await?;
        Ok(())
    }
}

fn paged_params(
    key: &'static str,
    value: &str,
    limit: usize,
    cursor: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![(key, value.to_string()), ("limit", limit.to_string())];
    if let Some(cursor) = cursor {
        params.push(("cursor", cursor.to_string()));
    }
    params
}

#[async_trait]
impl GraphApi for BskyClient {
    async fn get_follows(&self, actor: &str, limit: usize, cursor: Option<&str>) -> BskyResult<wire::FollowsResponse> {
        self.query("app.bsky.graph.getFollows", &paged_params("actor", actor, limit, cursor))
            .await
    }

    async fn get_lists(&self, actor: &str, limit: usize, cursor: Option<&str>) -> BskyResult<wire::ListsResponse> {
        self.query("app.bsky.graph.getLists", &paged_params("actor", actor, limit, cursor))
            .await
    }

    async fn get_list(&self, list_uri: &str, limit: usize, cursor: Option<&str>) -> BskyResult<wire::ListResponse> {
        self.query("app.bsky.graph.getList", &paged_params("list", list_uri, limit, cursor))
            .await
    }

    async fn get_profile(&self, actor: &str) -> BskyResult<wire::ProfileView> {
        self.query("app.bsky.actor.getProfile", &[("actor", actor.to_string())])
            .await
    }
}

#[async_trait]
impl FeedApi for BskyClient {
    async fn get_timeline(&self, limit: usize) -> BskyResult<wire::FeedResponse> {
        self.query("app.bsky.feed.getTimeline", &[("limit", limit.to_string())])
            .await
    }

    async fn get_list_feed(&self, list_uri: &str, limit: usize) -> BskyResult<wire::FeedResponse> {
        self.query(
            "app.bsky.feed.getListFeed",
            &[("list", list_uri.to_string()), ("limit", limit.to_string())],
        )
        .await
    }
}

#[async_trait]
impl SessionApi for BskyClient {
    async fn create_session(&self, identifier: &str, password: &str) -> BskyResult<AuthSession> {
        self.procedure(
            "com.atproto.server.createSession",
            &json!({ "identifier": identifier, "password": password }),
            false,
        )
        .await
    }
}

#[async_trait]
impl RepoApi for BskyClient {
    async fn create_list_item(&self, repo: &str, subject: &str, list_uri: &str) -> BskyResult<RecordRef> {
        let record = json!({
            "$type": LIST_ITEM_COLLECTION,
            "subject": subject,
            "list": list_uri,
            "createdAt": Utc::now().to_rfc3339(),
        });
        self.create_record(repo, LIST_ITEM_COLLECTION, record).await
    }

    async fn delete_list_item(&self, repo: &str, rkey: &str) -> BskyResult<()> {
        self.delete_record(repo, LIST_ITEM_COLLECTION, rkey).await
    }

    async fn create_list(&self, repo: &str, name: &str, description: &str) -> BskyResult<RecordRef> {
        self.create_record(repo, LIST_COLLECTION, list_record(name, description))
            .await
    }

    async fn put_list(&self, repo: &str, rkey: &str, name: &str, description: &str) -> BskyResult<RecordRef> {
        self.put_record(repo, LIST_COLLECTION, rkey, list_record(name, description))
            .await
    }

    async fn delete_list(&self, repo: &str, rkey: &str) -> BskyResult<()> {
        self.delete_record(repo, LIST_COLLECTION, rkey).await
    }
}

fn list_record(name: &str, description: &str) -> Value {
    json!({
        "$type": LIST_COLLECTION,
        "purpose": CURATE_LIST_PURPOSE,
        "name": name,
        "description": description,
        "createdAt": Utc::now().to_rfc3339(),
    })
}
