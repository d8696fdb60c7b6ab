use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    storage::{json_store::JsonFileStore, StateStore},
    tracker::history::DailyHistory,
};

/// Same shape `importHistory` accepts, so an export can be fed back to the extension.
pub fn history_json(history: &DailyHistory) -> Result<String> {
    Ok(serde_json::to_string_pretty(history)?)
}

pub async fn export_history(dir: &Path, output: Option<&Path>) -> Result<()> {
    let store = JsonFileStore::new(dir.to_path_buf())?;
    let state = store.load().await?;
    let json = history_json(&state.history)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {path:?}"))?;
            info!("Exported {} days to {path:?}", state.history.len());
        }
        None => println!("{json}"),
    }
    Ok(())
}
