//! Application-level errors

use thiserror::Error;

use crate::{bsky::BskyError, llm::LlmError, paging::PagingError};

#[derive(Error, Debug)]
pub enum BluelistError {
    #[error("Please login first")]
    NotAuthenticated,

    #[error(transparent)]
    Paging(#[from] PagingError),

    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        #[source]
        source: BskyError,
    },

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Daily suggestion limit of {0} requests reached")]
    SuggestionLimitReached(u32),

    #[error("Not a record URI: {0}")]
    InvalidUri(String),

    #[error("Unknown list: {0}")]
    UnknownList(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl BluelistError {
    pub fn upstream(context: &'static str, source: BskyError) -> Self {
        BluelistError::Upstream { context, source }
    }

    /// Whether the failure came from an expired credential
    pub fn is_expired_token(&self) -> bool {
        match self {
            BluelistError::Paging(e) => e.is_expired_token(),
            BluelistError::Upstream { source, .. } => source.is_expired_token(),
            _ => false,
        }
    }
}

pub type BluelistResult<T> = Result<T, BluelistError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paging::CollectionKind;

    #[test]
    fn test_expired_token_is_detected_through_wrappers() {
        assert!(BluelistError::upstream("Failed to add to list", BskyError::ExpiredToken).is_expired_token());
        assert!(BluelistError::from(PagingError::Upstream {
            kind: CollectionKind::Lists,
            source: BskyError::ExpiredToken,
        })
        .is_expired_token());
        assert!(!BluelistError::NotAuthenticated.is_expired_token());
    }

    #[test]
    fn test_upstream_message_keeps_context() {
        let err = BluelistError::upstream("Failed to remove from list", BskyError::Unauthorized("nope".to_string()));
        assert_eq!(err.to_string(), "Failed to remove from list: Unauthorized: nope");
    }
}
