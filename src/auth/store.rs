//! Persisted credentials

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::debug;

use crate::bsky::AuthSession;

/// Where the authenticated session survives between runs
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<AuthSession>>;

    async fn save(&self, session: &AuthSession) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Session stored as JSON in the data directory
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join("session.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<AuthSession>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }

        debug!("Loading session from: {}", self.path.display());
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt session file {}", self.path.display()))?;

        Ok(Some(session))
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!("Saved session for {} to {}", session.handle, self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// Session kept in memory only
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<Option<AuthSession>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Credential store lock poisoned"))?
            .clone())
    }

    async fn save(&self, session: &AuthSession) -> Result<()> {
        *self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Credential store lock poisoned"))? = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Credential store lock poisoned"))? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthSession {
        AuthSession {
            did: "did:plc:me".to_string(),
            handle: "me.bsky.social".to_string(),
            access_jwt: "access".to_string(),
            refresh_jwt: "refresh".to_string(),
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested"));

        assert!(store.load().await.unwrap().is_none());

        store.save(&session()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(session()));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("accessJwt"));

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        // clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        std::fs::write(store.path(), "not json").unwrap();

        assert!(store.load().await.is_err());
    }
}
