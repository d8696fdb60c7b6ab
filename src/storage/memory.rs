use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use super::{StateStore, StoredState};

/// Keeps the snapshot in memory. Loads and saves can be made to fail to exercise retry paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoredState>,
    saves: AtomicUsize,
    failing: AtomicBool,
    failing_loads: AtomicUsize,
}

impl MemoryStore {
    pub fn with_state(state: StoredState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub async fn snapshot(&self) -> StoredState {
        self.state.lock().await.clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next `count` loads fail.
    pub fn fail_next_loads(&self, count: usize) {
        self.failing_loads.store(count, Ordering::SeqCst);
    }
}

impl StateStore for MemoryStore {
    async fn load(&self) -> Result<StoredState> {
        let remaining = self.failing_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_loads.store(remaining - 1, Ordering::SeqCst);
            bail!("Store is unreadable");
        }
        Ok(self.snapshot().await)
    }

    async fn save(&self, state: &StoredState) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("Store is unavailable");
        }
        *self.state.lock().await = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
