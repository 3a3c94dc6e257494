//! File-backed key-value store.
//!
//! One file per key under a root directory (on mobile, the app-specific
//! data directory). Writes land in a temp file first and are renamed into
//! place, so a crash mid-write leaves the prior value intact.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::KeyValueStore;

/// File-per-key [`KeyValueStore`] rooted in an app data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory holding the key files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal identifiers; anything unexpected is flattened
        // to '_' so a key can never escape the root.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading store key '{key}'")),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating store dir {}", self.root.display()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("writing store key '{key}'"))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("committing store key '{key}'"))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing store key '{key}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, FileStore) {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("store"));
        (tmp, store)
    }

    #[tokio::test]
    async fn set_get_remove_round_trip() {
        let (_tmp, store) = test_store();

        assert_eq!(store.get("cost_stats").await.unwrap(), None);

        store.set("cost_stats", "{\"totalCost\":0.0}").await.unwrap();
        assert_eq!(
            store.get("cost_stats").await.unwrap().as_deref(),
            Some("{\"totalCost\":0.0}")
        );

        store.remove("cost_stats").await.unwrap();
        assert_eq!(store.get("cost_stats").await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let (_tmp, store) = test_store();

        store.set("k", "old").await.unwrap();
        store.set("k", "new").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn remove_absent_key_is_ok() {
        let (_tmp, store) = test_store();
        store.remove("never_set").await.unwrap();
    }

    #[tokio::test]
    async fn hostile_key_stays_inside_root() {
        let (_tmp, store) = test_store();

        store.set("../escape", "x").await.unwrap();
        let value = store.get("../escape").await.unwrap();
        assert_eq!(value.as_deref(), Some("x"));

        // The file must live under the root, not beside it.
        let path = store.path_for("../escape");
        assert!(path.starts_with(store.root()));
    }
}
