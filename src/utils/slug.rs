//! Human-friendly slugs for list URIs
//!
//! Lists are addressed by `at://` URIs, which are unpleasant to type. The
//! registry maps each known list URI to a short slug derived from its name
//! and persists the mapping in the data directory.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, OnceLock, PoisonError,
    },
};
use tracing::{debug, warn};

use crate::utils::json_file::JsonFile;

const MAX_SLUG_LEN: usize = 60;

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"))
}

/// Convert a list name to a URL-friendly slug
pub fn create_slug(name: &str) -> String {
    let lowered = name.to_lowercase();
    let dashed = non_alphanumeric().replace_all(&lowered, "-");
    dashed.trim_matches('-').chars().take(MAX_SLUG_LEN).collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlugMappings {
    slug_to_uri: HashMap<String, String>,
    uri_to_slug: HashMap<String, String>,
}

/// Bidirectional slug <-> list URI mapping
///
/// New mappings live in memory until [`SlugRegistry::save`] writes them out.
#[derive(Debug)]
pub struct SlugRegistry {
    file: Option<JsonFile>,
    mappings: Mutex<SlugMappings>,
    unsaved: AtomicBool,
}

impl SlugRegistry {
    /// Registry that lives only in memory
    pub fn in_memory() -> Self {
        Self::with_mappings(None, SlugMappings::default())
    }

    /// Load the registry stored in `data_dir`, starting empty when absent or unreadable
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Self {
        let file = JsonFile::new(data_dir.as_ref().join("slug_mappings.json"));
        let mappings = match file.read().await {
            Ok(mappings) => mappings.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring slug mappings: {:#}", e);
                SlugMappings::default()
            }
        };
        Self::with_mappings(Some(file), mappings)
    }

    fn with_mappings(file: Option<JsonFile>, mappings: SlugMappings) -> Self {
        Self {
            file,
            mappings: Mutex::new(mappings),
            unsaved: AtomicBool::new(false),
        }
    }

    /// Register a list and return its slug, reusing an existing one for a known URI
    pub fn add_mapping(&self, uri: &str, name: &str) -> Result<String> {
        if uri.is_empty() {
            return Err(anyhow::anyhow!("URI is required for slug mapping"));
        }

        let mut mappings = self.lock();
        if let Some(existing) = mappings.uri_to_slug.get(uri) {
            return Ok(existing.clone());
        }

        let base = match create_slug(name) {
            slug if slug.is_empty() => "untitled".to_string(),
            slug => slug,
        };

        let mut slug = base.clone();
        let mut counter = 1;
        while mappings
            .slug_to_uri
            .get(&slug)
            .map_or(false, |owner| owner != uri)
        {
            slug = format!("{}-{}", base, counter);
            counter += 1;
        }

        debug!("Mapped list {} to slug {}", uri, slug);
        mappings.slug_to_uri.insert(slug.clone(), uri.to_string());
        mappings.uri_to_slug.insert(uri.to_string(), slug.clone());
        self.unsaved.store(true, Ordering::SeqCst);

        Ok(slug)
    }

    pub fn uri_by_slug(&self, slug: &str) -> Option<String> {
        self.lock().slug_to_uri.get(slug).cloned()
    }

    pub fn slug_by_uri(&self, uri: &str) -> Option<String> {
        self.lock().uri_to_slug.get(uri).cloned()
    }

    /// Resolve user input to a list URI: `at://` URIs pass through, anything else is a slug
    pub fn resolve(&self, input: &str) -> Option<String> {
        if input.starts_with("at://") {
            Some(input.to_string())
        } else {
            self.uri_by_slug(input)
        }
    }

    /// Persist mappings added since the last save
    pub async fn save(&self) -> Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        if !self.unsaved.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let saved = file
            .write_with(|| Ok(serde_json::to_string_pretty(&*self.lock())?))
            .await;
        if saved.is_err() {
            self.unsaved.store(true, Ordering::SeqCst);
        }
        saved
    }

    fn lock(&self) -> MutexGuard<'_, SlugMappings> {
        self.mappings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_slug() {
        assert_eq!(create_slug("Rust & Systems Folks!"), "rust-systems-folks");
        assert_eq!(create_slug("--Already--Dashed--"), "already-dashed");
        assert_eq!(create_slug("日本語"), "");

        let long = "a".repeat(100);
        assert_eq!(create_slug(&long).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_collisions_get_suffixes() {
        let registry = SlugRegistry::in_memory();

        let first = registry.add_mapping("at://me/list/1", "Artists").unwrap();
        let second = registry.add_mapping("at://me/list/2", "Artists").unwrap();
        let third = registry.add_mapping("at://me/list/3", "artists").unwrap();

        assert_eq!(first, "artists");
        assert_eq!(second, "artists-1");
        assert_eq!(third, "artists-2");
        assert_eq!(registry.uri_by_slug("artists-1").as_deref(), Some("at://me/list/2"));
    }

    #[test]
    fn test_known_uri_keeps_its_slug() {
        let registry = SlugRegistry::in_memory();
        registry.add_mapping("at://me/list/1", "Artists").unwrap();

        let renamed = registry.add_mapping("at://me/list/1", "Painters").unwrap();
        assert_eq!(renamed, "artists");
        assert_eq!(registry.slug_by_uri("at://me/list/1").as_deref(), Some("artists"));
    }

    #[test]
    fn test_empty_name_and_uri() {
        let registry = SlugRegistry::in_memory();
        assert_eq!(registry.add_mapping("at://me/list/9", "").unwrap(), "untitled");
        assert!(registry.add_mapping("", "Name").is_err());
    }

    #[test]
    fn test_resolve() {
        let registry = SlugRegistry::in_memory();
        registry.add_mapping("at://me/list/1", "Friends").unwrap();

        assert_eq!(registry.resolve("friends").as_deref(), Some("at://me/list/1"));
        assert_eq!(registry.resolve("at://other/list/2").as_deref(), Some("at://other/list/2"));
        assert_eq!(registry.resolve("strangers"), None);
    }

    #[tokio::test]
    async fn test_persists_to_data_dir() {
        let dir = tempfile::tempdir().unwrap();

        let registry = SlugRegistry::load(dir.path()).await;
        registry.add_mapping("at://me/list/1", "Friends").unwrap();
        assert!(SlugRegistry::load(dir.path()).await.uri_by_slug("friends").is_none());

        registry.save().await.unwrap();
        let reloaded = SlugRegistry::load(dir.path()).await;
        assert_eq!(reloaded.uri_by_slug("friends").as_deref(), Some("at://me/list/1"));
    }

    #[tokio::test]
    async fn test_corrupt_mappings_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("slug_mappings.json"), "not json")
            .await
            .unwrap();

        let registry = SlugRegistry::load(dir.path()).await;
        assert!(registry.uri_by_slug("friends").is_none());
        assert_eq!(registry.add_mapping("at://me/list/1", "Friends").unwrap(), "friends");
    }
}
