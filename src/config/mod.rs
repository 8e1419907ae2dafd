use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::{
    llm::{ProviderConfig, ProviderFactory},
    paging::{CacheConfig, CollectionKind},
};

pub const DEFAULT_SERVICE: &str = "https://bsky.social";

/// Page and batch sizes of the three paginated collections
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PagingConfig {
    pub follows_per_page: usize,
    pub follows_batch_size: usize,
    pub lists_per_page: usize,
    pub lists_batch_size: usize,
    pub members_per_page: usize,
    pub members_batch_size: usize,
    /// Upper bound on upstream batches fetched for one page request
    pub max_catch_up_batches: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            follows_per_page: 20,
            follows_batch_size: 20,
            lists_per_page: 5,
            lists_batch_size: 50,
            members_per_page: 20,
            members_batch_size: 20,
            max_catch_up_batches: 50,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Bluesky service (PDS or entryway)
    pub service: String,

    /// Handle or email used by `login` when none is given on the command line
    pub identifier: Option<String>,

    pub app_password: Option<String>,

    /// Data directory for the session, slug mappings and request counts
    pub data_dir: PathBuf,

    /// AI provider type
    pub provider: String,

    pub api_key: Option<String>,

    pub base_url: Option<String>,

    pub model: String,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    /// Actors without a daily suggestion limit
    pub exempt_dids: Vec<String>,

    pub paging: PagingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            identifier: None,
            app_password: None,
            data_dir: dirs::data_dir()
                .map(|dir| dir.join("bluelist"))
                .unwrap_or_else(|| PathBuf::from("./data")),
            provider: "openai".to_string(),
            api_key: None,
            base_url: None,
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: None,
            temperature: Some(0.3),
            exempt_dids: Vec::new(),
            paging: PagingConfig::default(),
        }
    }
}

/// A configuration file; absent keys keep the current value
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub service: Option<String>,
    pub identifier: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub exempt_dids: Option<Vec<String>>,
    pub paging: Option<PagingConfig>,
}

impl Config {
    /// Initialize configuration: defaults, then the first config file found, then the environment
    pub async fn init(data_dir: Option<PathBuf>) -> Result<Self> {
        debug!("Initializing configuration");

        let mut config = Self::default();

        if let Some(file_config) = Self::load_from_file().await? {
            config.merge_with(file_config);
        }

        config.load_from_env();

        if let Some(data_dir) = data_dir {
            config.data_dir = data_dir;
        }

        config.validate()?;

        tokio::fs::create_dir_all(&config.data_dir).await?;

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply `BLUELIST_*` variables (and `OPENAI_API_KEY`) as returned by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(service) = lookup("BLUELIST_SERVICE") {
            self.service = service;
        }
        if let Some(identifier) = lookup("BLUELIST_IDENTIFIER") {
            self.identifier = Some(identifier);
        }
        if let Some(password) = lookup("BLUELIST_APP_PASSWORD") {
            self.app_password = Some(password);
        }
        if let Some(data_dir) = lookup("BLUELIST_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
        if let Some(provider) = lookup("BLUELIST_PROVIDER") {
            self.provider = provider;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(base_url) = lookup("BLUELIST_BASE_URL") {
            self.base_url = Some(base_url);
        }
        if let Some(model) = lookup("BLUELIST_MODEL") {
            self.model = model;
        }
        if let Some(temperature) = lookup("BLUELIST_TEMPERATURE").and_then(|t| t.parse().ok()) {
            self.temperature = Some(temperature);
        }
        if let Some(exempt) = lookup("BLUELIST_EXEMPT_DIDS") {
            self.exempt_dids = exempt
                .split(',')
                .map(str::trim)
                .filter(|did| !did.is_empty())
                .map(str::to_string)
                .collect();
        }

        let page_size = |key: &str| lookup(key).and_then(|size| size.parse().ok());
        if let Some(size) = page_size("BLUELIST_FOLLOWS_PER_PAGE") {
            self.paging.follows_per_page = size;
        }
        if let Some(size) = page_size("BLUELIST_LISTS_PER_PAGE") {
            self.paging.lists_per_page = size;
        }
        if let Some(size) = page_size("BLUELIST_MEMBERS_PER_PAGE") {
            self.paging.members_per_page = size;
        }
    }

    /// Load the first of `./.bluelist.json`, `./bluelist.json` and `$CONFIG_DIR/bluelist/bluelist.json`
    pub async fn load_from_file() -> Result<Option<ConfigFile>> {
        let mut config_paths = vec![
            PathBuf::from("./.bluelist.json"),
            PathBuf::from("./bluelist.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join("bluelist").join("bluelist.json"));
        }

        for path in config_paths {
            if path.exists() {
                debug!("Loading configuration from: {}", path.display());
                let content = tokio::fs::read_to_string(&path).await?;
                let config = serde_json::from_str(&content)
                    .map_err(|e| anyhow::anyhow!("Invalid configuration in {}: {}", path.display(), e))?;
                return Ok(Some(config));
            }
        }

        Ok(None)
    }

    /// Merge a configuration file into this one
    pub fn merge_with(&mut self, other: ConfigFile) {
        if let Some(service) = other.service {
            self.service = service;
        }
        if other.identifier.is_some() {
            self.identifier = other.identifier;
        }
        if let Some(data_dir) = other.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(provider) = other.provider {
            self.provider = provider;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if let Some(model) = other.model.filter(|model| !model.is_empty()) {
            self.model = model;
        }
        if other.max_tokens.is_some() {
            self.max_tokens = other.max_tokens;
        }
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if let Some(exempt) = other.exempt_dids {
            self.exempt_dids = exempt;
        }
        if let Some(paging) = other.paging {
            self.paging = paging;
        }
    }

    /// Check if the configuration has a usable API key for the provider
    pub fn has_api_key(&self) -> bool {
        self.provider == "ollama" || self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(anyhow::anyhow!("Service URL is required"));
        }

        let paging = &self.paging;
        let sizes = [
            ("follows_per_page", paging.follows_per_page),
            ("follows_batch_size", paging.follows_batch_size),
            ("lists_per_page", paging.lists_per_page),
            ("lists_batch_size", paging.lists_batch_size),
            ("members_per_page", paging.members_per_page),
            ("members_batch_size", paging.members_batch_size),
            ("max_catch_up_batches", paging.max_catch_up_batches),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(anyhow::anyhow!("{} must be greater than 0", name));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(anyhow::anyhow!("temperature must be between 0.0 and 2.0"));
            }
        }

        Ok(())
    }

    /// Fail unless suggestions can be requested with this configuration
    pub fn validate_provider(&self) -> Result<()> {
        let available = ProviderFactory::available_providers();
        if !available.contains(&self.provider.as_str()) {
            return Err(anyhow::anyhow!(
                "Unknown provider '{}', expected one of: {}",
                self.provider,
                available.join(", ")
            ));
        }
        if !self.has_api_key() {
            return Err(anyhow::anyhow!(
                "No API key configured. Set OPENAI_API_KEY. For Ollama, no API key is required."
            ));
        }
        if self.model.is_empty() {
            return Err(anyhow::anyhow!("Model is required"));
        }
        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider_type: self.provider.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub fn cache_config(&self, kind: CollectionKind) -> CacheConfig {
        let paging = &self.paging;
        let (per_page, batch_size) = match kind {
            CollectionKind::Follows => (paging.follows_per_page, paging.follows_batch_size),
            CollectionKind::Lists => (paging.lists_per_page, paging.lists_batch_size),
            CollectionKind::ListMembers => (paging.members_per_page, paging.members_batch_size),
        };
        CacheConfig::new(kind, per_page, batch_size).with_max_catch_up_batches(paging.max_catch_up_batches)
    }
}
