//! List suggestions from a language model, rate limited per actor and day

mod curator;
mod tracker;

pub use curator::*;
pub use tracker::*;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{BluelistError, BluelistResult};

/// Model output plus what is left of today's allowance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub content: String,
    pub remaining: u32,
}

pub struct SuggestionService {
    curator: ListCurator,
    tracker: RequestTracker,
}

impl SuggestionService {
    pub fn new(curator: ListCurator, tracker: RequestTracker) -> Self {
        Self { curator, tracker }
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Request suggestions for `did`; a failed model call does not use up the allowance
    pub async fn suggest(&self, did: &str, users_json: &str, lists_json: &str) -> BluelistResult<Suggestion> {
        if self.tracker.has_reached_limit(did) {
            return Err(BluelistError::SuggestionLimitReached(self.tracker.daily_limit()));
        }

        let content = self.curator.suggest(users_json, lists_json).await?;

        if let Err(e) = self.tracker.track_request(did).await {
            warn!("Failed to record suggestion request: {}", e);
        }

        Ok(Suggestion {
            content,
            remaining: self.tracker.remaining_requests(did),
        })
    }
}
