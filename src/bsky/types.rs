//! Item shapes served to the UI and the wire formats they are normalized from

use serde::{Deserialize, Serialize};

/// A profile the authenticated user follows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowItem {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A curated list owned by the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub name: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A profile that belongs to a list; `uri` is the list item record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMemberItem {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Descriptor of the list a members page belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub did: String,
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A post from the home timeline or a list feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    pub text: String,
    pub indexed_at: String,
}

/// Result of creating a record in the user's repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

/// Authenticated session returned by `com.atproto.server.createSession`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// Wire formats of the XRPC responses
pub mod wire {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct ErrorBody {
        #[serde(default)]
        pub error: Option<String>,
        #[serde(default)]
        pub message: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileView {
        pub did: String,
        pub handle: String,
        #[serde(default)]
        pub display_name: Option<String>,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default)]
        pub avatar: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct FollowsResponse {
        pub follows: Vec<ProfileView>,
        #[serde(default)]
        pub cursor: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ListView {
        pub uri: String,
        pub name: String,
        #[serde(default)]
        pub description: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ListsResponse {
        pub lists: Vec<ListView>,
        #[serde(default)]
        pub cursor: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ListSubject {
        #[serde(default)]
        pub did: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ListItemView {
        #[serde(default)]
        pub uri: Option<String>,
        #[serde(default)]
        pub subject: Option<ListSubject>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ListResponse {
        pub list: ListView,
        #[serde(default)]
        pub items: Vec<ListItemView>,
        #[serde(default)]
        pub cursor: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct PostRecord {
        #[serde(default)]
        pub text: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PostView {
        pub uri: String,
        pub cid: String,
        pub author: ProfileView,
        pub record: PostRecord,
        pub indexed_at: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct FeedViewPost {
        pub post: PostView,
    }

    #[derive(Debug, Deserialize)]
    pub struct FeedResponse {
        pub feed: Vec<FeedViewPost>,
        #[serde(default)]
        pub cursor: Option<String>,
    }
}

impl From<wire::ProfileView> for FollowItem {
    fn from(profile: wire::ProfileView) -> Self {
        Self {
            did: profile.did,
            handle: profile.handle,
            name: profile.display_name,
            description: profile.description,
        }
    }
}

impl From<wire::ListView> for ListItem {
    fn from(list: wire::ListView) -> Self {
        Self {
            name: list.name,
            uri: list.uri,
            description: list.description,
        }
    }
}

impl From<wire::ListView> for ListInfo {
    fn from(list: wire::ListView) -> Self {
        Self {
            name: list.name,
            description: list.description,
            uri: list.uri,
        }
    }
}

impl From<wire::FeedViewPost> for TimelineItem {
    fn from(item: wire::FeedViewPost) -> Self {
        let post = item.post;
        Self {
            uri: post.uri,
            cid: post.cid,
            author: Author {
                did: post.author.did,
                handle: post.author.handle,
                name: post.author.display_name,
            },
            text: post.record.text,
            indexed_at: post.indexed_at,
        }
    }
}

/// Record key of an `at://` URI: its last path segment
pub fn record_key(uri: &str) -> Option<&str> {
    uri.rsplit('/').next().filter(|rkey| !rkey.is_empty() && !rkey.contains(':'))
}
