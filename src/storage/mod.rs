//! Persistence of tracker state.
//!  - Everything the tracker must remember across restarts lives in one [StoredState].
//!  - In memory state is the source of truth; the store only receives snapshots of it.
//!  - [json_store::JsonFileStore] keeps the snapshot as a single JSON document.

pub mod json_store;
#[cfg(test)]
pub mod memory;

use std::{collections::BTreeMap, future::Future, ops::Deref};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::tracker::{
    domain::Domain, history::DailyHistory, limits::Limits, settings::Category, settings::Settings,
};

pub type Categories = BTreeMap<Domain, Category>;

/// Persisted layout: `history`, `settings`, `limits` and `categories`. Missing keys load as
/// defaults so older files stay readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredState {
    pub history: DailyHistory,
    pub settings: Settings,
    pub limits: Limits,
    pub categories: Categories,
}

/// Interface for abstracting the key-value store the tracker persists into.
pub trait StateStore {
    fn load(&self) -> impl Future<Output = Result<StoredState>>;

    fn save(&self, state: &StoredState) -> impl Future<Output = Result<()>>;
}

impl<T: Deref> StateStore for T
where
    T::Target: StateStore,
{
    fn load(&self) -> impl Future<Output = Result<StoredState>> {
        self.deref().load()
    }

    fn save(&self, state: &StoredState) -> impl Future<Output = Result<()>> {
        self.deref().save(state)
    }
}
