use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{
    domain::{parse_domain_input, Domain},
    event::TabId,
    history::{Analytics, DailyHistory},
    limits::Limits,
    settings::{Category, Settings, SettingsPatch},
    Tracker,
};
use crate::storage::{Categories, StateStore};

/// Icon reported for domains no open tab has an icon for.
pub const FALLBACK_ICON: &str = "icons/fallback.ico";

/// Requests from the user interface. Serialized with an `action` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Drops every open session. History is left alone.
    ResetTimers,
    GetHistory,
    ClearAllData,
    UpdateSettings {
        settings: SettingsPatch,
    },
    Ping,
    GetFavicons {
        domains: Vec<Domain>,
    },
    GetCategories {
        domains: Vec<Domain>,
    },
    GetSettings,
    SetLimit {
        domain: String,
        seconds: u64,
    },
    RemoveLimit {
        domain: String,
    },
    SetCategory {
        domain: String,
        category: Category,
    },
    RemoveCategory {
        domain: String,
    },
    ImportHistory {
        history: DailyHistory,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub message: String,
    pub active_tab_id: Option<TabId>,
    pub tab_count: usize,
    pub current_date: NaiveDate,
    pub analytics: Analytics,
}

/// Successful command result. The variants serialize to disjoint sets of keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Message {
        message: String,
    },
    History {
        history: DailyHistory,
        analytics: Analytics,
    },
    Status(Status),
    Favicons {
        favicons: BTreeMap<Domain, String>,
    },
    Categories {
        categories: Categories,
    },
    Configuration {
        settings: Settings,
        limits: Limits,
        categories: Categories,
    },
}

impl Reply {
    fn message(message: impl Into<String>) -> Self {
        Reply::Message {
            message: message.into(),
        }
    }
}

fn parse_domain(input: &str) -> Result<Domain> {
    parse_domain_input(input).ok_or_else(|| anyhow!("Invalid domain {input:?}"))
}

impl<S: StateStore> Tracker<S> {
    #[instrument(skip(self))]
    pub async fn execute(&mut self, command: Command) -> Result<Reply> {
        let reply = self.apply(command).await?;
        self.persist_if_dirty().await;
        Ok(reply)
    }

    async fn apply(&mut self, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::ResetTimers => {
                self.sessions.clear();
                self.limits.clear_notified();
                self.reseed_active_tab().await;
                info!("Session timers reset");
                Reply::message("Session timers reset.")
            }
            Command::GetHistory => {
                self.flush_all();
                let today = self.clock.today();
                Reply::History {
                    history: self.history.history().clone(),
                    analytics: self.history.analytics(today),
                }
            }
            Command::ClearAllData => {
                self.sessions.clear();
                self.history.clear_all();
                self.limits.clear_notified();
                self.pending_clear = !self.loaded;
                self.dirty = true;
                self.reseed_active_tab().await;
                info!("All history cleared");
                Reply::message("All data cleared.")
            }
            Command::UpdateSettings { settings } => {
                self.settings.merge(settings)?;
                let change = self.idle.reconfigure(&self.settings);
                self.apply_gate_change(change);
                self.dirty = true;
                info!("Settings updated to {:?}", self.settings);
                Reply::message("Settings updated.")
            }
            Command::Ping => {
                self.flush_all();
                let today = self.clock.today();
                Reply::Status(Status {
                    message: "Tracker active".into(),
                    active_tab_id: self.active_tab,
                    tab_count: self.sessions.count(),
                    current_date: today,
                    analytics: self.history.analytics(today),
                })
            }
            Command::GetFavicons { domains } => {
                let favicons = domains
                    .into_iter()
                    .map(|domain| {
                        let icon = self
                            .sessions
                            .icon_for(&domain)
                            .unwrap_or(FALLBACK_ICON)
                            .to_owned();
                        (domain, icon)
                    })
                    .collect();
                Reply::Favicons { favicons }
            }
            Command::GetCategories { domains } => {
                let categories = domains
                    .into_iter()
                    .map(|domain| {
                        let category = self.categories.get(&domain).copied().unwrap_or_default();
                        (domain, category)
                    })
                    .collect();
                Reply::Categories { categories }
            }
            Command::GetSettings => Reply::Configuration {
                settings: self.settings.clone(),
                limits: self.limits.limits().clone(),
                categories: self.categories.clone(),
            },
            Command::SetLimit { domain, seconds } => {
                let domain = parse_domain(&domain)?;
                if seconds == 0 {
                    bail!("Limit for {domain} must be positive");
                }
                self.limits.set_limit(domain.clone(), seconds);
                self.dirty = true;
                Reply::message(format!("Set {}m limit for {domain}.", seconds / 60))
            }
            Command::RemoveLimit { domain } => {
                let domain = parse_domain(&domain)?;
                if self.limits.remove_limit(&domain) {
                    self.dirty = true;
                } else {
                    debug!("No limit to remove for {domain}");
                }
                Reply::message(format!("Removed limit for {domain}."))
            }
            Command::SetCategory { domain, category } => {
                let domain = parse_domain(&domain)?;
                self.categories.insert(domain.clone(), category);
                self.dirty = true;
                Reply::message(format!("Set category of {domain} to {category}."))
            }
            Command::RemoveCategory { domain } => {
                let domain = parse_domain(&domain)?;
                if self.categories.remove(&domain).is_some() {
                    self.dirty = true;
                }
                Reply::message(format!("Removed category of {domain}."))
            }
            Command::ImportHistory { history } => {
                let days = history.len();
                let today = self.clock.today();
                self.history.merge_import(history, today);
                self.dirty = true;
                info!("Imported {days} days of history");
                Reply::message(format!("Imported {days} days of history."))
            }
        };
        Ok(reply)
    }

    /// Starts a fresh session for the foreground tab after the session table was wiped.
    async fn reseed_active_tab(&mut self) {
        let Some(id) = self.active_tab else {
            return;
        };
        match self.tabs.tab(id).await {
            Ok(snapshot) => self.track_tab(snapshot),
            Err(e) => warn!("Failed to query {id} after reset {e:?}"),
        }
    }
}
