//! JSON documents kept in the data directory

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct JsonFile {
    path: PathBuf,
    write: Mutex<()>,
}

impl JsonFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document, `None` when the file does not exist
    pub async fn read<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt JSON in {}", self.path.display()))?;
        Ok(Some(value))
    }

    /// Write the document produced by `render`
    ///
    /// Writes are serialized and `render` runs once the previous write has
    /// finished, so the file always ends up with the latest rendered state.
    pub async fn write_with<F>(&self, render: F) -> Result<()>
    where
        F: FnOnce() -> Result<String>,
    {
        let _write = self.write.lock().await;
        let content = render()?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!("Saved {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("absent.json"));
        assert!(file.read::<HashMap<String, u32>>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_creates_parent_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("nested").join("counts.json"));

        file.write_with(|| Ok(serde_json::to_string(&HashMap::from([("a", 2)]))?))
            .await
            .unwrap();

        let counts: HashMap<String, u32> = file.read().await.unwrap().unwrap();
        assert_eq!(counts.get("a"), Some(&2));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path().join("broken.json"));
        tokio::fs::write(file.path(), "{not json").await.unwrap();

        let err = file.read::<HashMap<String, u32>>().await.unwrap_err();
        assert!(err.to_string().contains("Corrupt JSON"));
    }
}
