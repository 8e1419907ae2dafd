//! Daily suggestion request accounting

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

use crate::utils::json_file::JsonFile;

pub const MAX_DAILY_SUGGESTIONS: u32 = 5;

/// Reported as remaining for actors without a limit
pub const UNLIMITED_REMAINING: u32 = 999;

/// Request counts per actor, per UTC day
type RequestCounts = HashMap<String, BTreeMap<NaiveDate, u32>>;

pub struct RequestTracker {
    file: Option<JsonFile>,
    exempt: HashSet<String>,
    daily_limit: u32,
    counts: Mutex<RequestCounts>,
}

impl RequestTracker {
    pub fn in_memory(exempt: impl IntoIterator<Item = String>) -> Self {
        Self {
            file: None,
            exempt: exempt.into_iter().collect(),
            daily_limit: MAX_DAILY_SUGGESTIONS,
            counts: Mutex::new(RequestCounts::new()),
        }
    }

    /// Load counts stored in `data_dir`, starting empty when absent or unreadable
    pub async fn load<P: AsRef<Path>>(data_dir: P, exempt: impl IntoIterator<Item = String>) -> Self {
        let file = JsonFile::new(data_dir.as_ref().join("suggestion_requests.json"));
        let counts = match file.read().await {
            Ok(counts) => counts.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring request counts: {:#}", e);
                RequestCounts::new()
            }
        };

        Self {
            file: Some(file),
            counts: Mutex::new(counts),
            ..Self::in_memory(exempt)
        }
    }

    pub fn with_daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn is_exempt(&self, did: &str) -> bool {
        self.exempt.contains(did)
    }

    /// Count one request for today; exempt actors are not counted
    pub async fn track_request(&self, did: &str) -> Result<()> {
        if self.is_exempt(did) {
            return Ok(());
        }

        {
            let mut counts = self.lock();
            let count = counts
                .entry(did.to_string())
                .or_default()
                .entry(today())
                .or_insert(0);
            *count += 1;
            debug!("Suggestion request {} of {} today for {}", count, self.daily_limit, did);
        }

        self.save().await
    }

    pub fn has_reached_limit(&self, did: &str) -> bool {
        !self.is_exempt(did) && self.used_today(did) >= self.daily_limit
    }

    pub fn remaining_requests(&self, did: &str) -> u32 {
        if self.is_exempt(did) {
            return UNLIMITED_REMAINING;
        }
        self.daily_limit.saturating_sub(self.used_today(did))
    }

    /// Forget every recorded request of `did`
    pub async fn reset(&self, did: &str) -> Result<()> {
        self.lock().remove(did);
        self.save().await
    }

    fn used_today(&self, did: &str) -> u32 {
        self.lock()
            .get(did)
            .and_then(|days| days.get(&today()))
            .copied()
            .unwrap_or(0)
    }

    async fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        file.write_with(|| Ok(serde_json::to_string_pretty(&*self.lock())?))
            .await
    }

    fn lock(&self) -> MutexGuard<'_, RequestCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_is_reached_after_five_requests() {
        let tracker = RequestTracker::in_memory(Vec::new());
        assert_eq!(tracker.remaining_requests("did:plc:me"), 5);

        for _ in 0..5 {
            assert!(!tracker.has_reached_limit("did:plc:me"));
            tracker.track_request("did:plc:me").await.unwrap();
        }

        assert!(tracker.has_reached_limit("did:plc:me"));
        assert_eq!(tracker.remaining_requests("did:plc:me"), 0);
        assert_eq!(tracker.remaining_requests("did:plc:other"), 5);
    }

    #[tokio::test]
    async fn test_exempt_actor_is_unlimited() {
        let tracker = RequestTracker::in_memory(vec!["did:plc:admin".to_string()]).with_daily_limit(1);
        for _ in 0..3 {
            tracker.track_request("did:plc:admin").await.unwrap();
        }
        assert!(!tracker.has_reached_limit("did:plc:admin"));
        assert_eq!(tracker.remaining_requests("did:plc:admin"), UNLIMITED_REMAINING);
    }

    #[tokio::test]
    async fn test_reset_clears_counts() {
        let tracker = RequestTracker::in_memory(Vec::new()).with_daily_limit(1);
        tracker.track_request("did:plc:me").await.unwrap();
        assert!(tracker.has_reached_limit("did:plc:me"));

        tracker.reset("did:plc:me").await.unwrap();
        assert_eq!(tracker.remaining_requests("did:plc:me"), 1);
    }

    #[tokio::test]
    async fn test_counts_persist_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tracker = RequestTracker::load(dir.path(), Vec::new()).await;
            tracker.track_request("did:plc:me").await.unwrap();
            tracker.track_request("did:plc:me").await.unwrap();
        }

        let reloaded = RequestTracker::load(dir.path(), Vec::new()).await;
        assert_eq!(reloaded.remaining_requests("did:plc:me"), 3);
    }

    #[tokio::test]
    async fn test_corrupt_counts_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("suggestion_requests.json"), "[1, 2")
            .await
            .unwrap();

        let tracker = RequestTracker::load(dir.path(), Vec::new()).await;
        assert_eq!(tracker.remaining_requests("did:plc:me"), 5);

        tracker.track_request("did:plc:me").await.unwrap();
        let reloaded = RequestTracker::load(dir.path(), Vec::new()).await;
        assert_eq!(reloaded.remaining_requests("did:plc:me"), 4);
    }
}
