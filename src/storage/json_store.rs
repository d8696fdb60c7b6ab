use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, warn};

use super::{StateStore, StoredState};

pub const STATE_FILE_NAME: &str = "state.json";
const LOCK_FILE_NAME: &str = "state.lock";

/// The main realization of [StateStore]. State lives in `state.json`; writers replace it
/// atomically through a temporary file, and a sibling lock file keeps the host and the cli from
/// reading a half written snapshot.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    async fn open_lock(&self) -> Result<File> {
        let lock = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE_NAME))
            .await?;
        Ok(lock)
    }

    async fn read_locked(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let lock = self.open_lock().await?;
        lock.lock_shared()?;
        let result = tokio::fs::read(path).await;
        lock.unlock_async().await?;

        match result {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {path:?}")),
        }
    }

    async fn write_locked(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("json.tmp");

        let lock = self.open_lock().await?;
        lock.lock_exclusive()?;
        let result = async {
            let mut file = File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp_path, path).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        lock.unlock_async().await?;

        result.with_context(|| format!("Failed to write {path:?}"))
    }
}

impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<StoredState> {
        let path = self.path();
        debug!("Loading state from {path:?}");
        let Some(bytes) = self.read_locked(&path).await? else {
            return Ok(StoredState::default());
        };

        match serde_json::from_slice::<StoredState>(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                // Keep the damaged file around instead of overwriting it on the next save.
                let corrupt = path.with_extension("json.corrupt");
                warn!("State file {path:?} is corrupted ({e}), moving it to {corrupt:?}");
                tokio::fs::rename(&path, &corrupt).await?;
                Ok(StoredState::default())
            }
        }
    }

    async fn save(&self, state: &StoredState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.write_locked(&self.path(), &bytes).await?;
        debug!("Saved state ({} bytes)", bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{JsonFileStore, STATE_FILE_NAME};
    use crate::{
        storage::{StateStore, StoredState},
        tracker::settings::Category,
    };

    #[tokio::test]
    async fn test_missing_file_loads_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().join("nested"))?;
        assert_eq!(store.load().await?, StoredState::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_then_load() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonFileStore::new(dir.path().to_owned())?;

        let mut state = StoredState::default();
        state
            .history
            .entry(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap())
            .or_default()
            .insert("a.com".into(), 20);
        state.limits.insert("a.com".into(), 3600);
        state.categories.insert("a.com".into(), Category::Work);
        state.settings.enable_time_limits = true;

        store.save(&state).await?;
        assert_eq!(store.load().await?, state);

        let raw = std::fs::read_to_string(dir.path().join(STATE_FILE_NAME))?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["history"]["2018-07-04"]["a.com"], 20);
        assert_eq!(value["settings"]["enableTimeLimits"], true);
        assert_eq!(value["categories"]["a.com"], "work");
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(STATE_FILE_NAME),
            r#"{"limits":{"a.com":60}}"#,
        )?;
        let store = JsonFileStore::new(dir.path().to_owned())?;

        let state = store.load().await?;
        assert_eq!(state.limits.get("a.com"), Some(&60));
        assert!(state.history.is_empty());
        assert!(state.settings.enable_idle_detection);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(STATE_FILE_NAME), "{\"history\": {")?;
        let store = JsonFileStore::new(dir.path().to_owned())?;

        assert_eq!(store.load().await?, StoredState::default());
        assert!(dir.path().join("state.json.corrupt").exists());
        assert!(!dir.path().join(STATE_FILE_NAME).exists());
        Ok(())
    }
}
