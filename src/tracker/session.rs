use std::collections::{hash_map::Entry, HashMap};

use chrono::{DateTime, TimeDelta, Utc};

use super::{
    domain::Domain,
    event::{TabId, TabSnapshot},
};

/// Live accrual record for one open tab's current domain occupancy.
///
/// Only the foreground tab runs while the user is not idle. A paused session keeps its uncredited
/// time in `deferred`, so switching away never throws time away.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub domain: Option<Domain>,
    started: Option<DateTime<Utc>>,
    deferred: TimeDelta,
    /// Seconds credited to history during the current occupancy.
    pub accumulated_seconds: u64,
    pub address: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
}

impl Session {
    pub fn new(domain: Option<Domain>, snapshot: &TabSnapshot) -> Self {
        Self {
            domain,
            started: None,
            deferred: TimeDelta::zero(),
            accumulated_seconds: 0,
            address: snapshot.url.clone(),
            title: snapshot.title.clone(),
            icon: snapshot.fav_icon_url.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    fn pending(&self, now: DateTime<Utc>) -> TimeDelta {
        let running = self
            .started
            .map(|start| (now - start).max(TimeDelta::zero()))
            .unwrap_or_else(TimeDelta::zero);
        self.deferred + running
    }

    /// Whole seconds of time that have not been credited yet.
    pub fn unflushed_seconds(&self, now: DateTime<Utc>) -> u64 {
        self.pending(now).num_seconds().max(0) as u64
    }

    /// Moves all uncredited whole seconds into the occupancy total and returns them. The sub-second
    /// remainder stays with the session.
    pub fn take_unflushed(&mut self, now: DateTime<Utc>) -> u64 {
        let pending = self.pending(now);
        let elapsed = pending.num_seconds().max(0);
        let remainder = pending - TimeDelta::seconds(elapsed);
        match self.started {
            Some(_) => {
                self.started = Some(now - remainder);
                self.deferred = TimeDelta::zero();
            }
            None => self.deferred = remainder,
        }
        self.accumulated_seconds += elapsed as u64;
        elapsed as u64
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let Some(start) = self.started.take() {
            self.deferred += (now - start).max(TimeDelta::zero());
        }
    }

    /// Starts a fresh occupancy on another domain (or on no trackable domain at all).
    pub fn retarget(&mut self, domain: Option<Domain>) {
        self.domain = domain;
        self.deferred = TimeDelta::zero();
        self.accumulated_seconds = 0;
        self.started = None;
    }

    pub fn update_metadata(&mut self, snapshot: &TabSnapshot) {
        if snapshot.url.is_some() {
            self.address = snapshot.url.clone();
        }
        if snapshot.title.is_some() {
            self.title = snapshot.title.clone();
        }
        if snapshot.fav_icon_url.is_some() {
            self.icon = snapshot.fav_icon_url.clone();
        }
    }
}

/// Open tab → session. At most one session per tab.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<TabId, Session>,
}

impl SessionTable {
    pub fn get(&self, id: TabId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: TabId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn insert(&mut self, id: TabId, session: Session) -> &mut Session {
        match self.sessions.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(session);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(session),
        }
    }

    pub fn remove(&mut self, id: TabId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Tab ids in a stable order, so full flushes are reproducible.
    pub fn ids(&self) -> Vec<TabId> {
        let mut ids = self.sessions.keys().copied().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Uncredited seconds over every open session on `domain`.
    pub fn unflushed_for(&self, domain: &str, now: DateTime<Utc>) -> u64 {
        self.sessions
            .values()
            .filter(|s| s.domain.as_deref() == Some(domain))
            .map(|s| s.unflushed_seconds(now))
            .sum()
    }

    pub fn icon_for(&self, domain: &str) -> Option<&str> {
        self.sessions
            .values()
            .filter(|s| s.domain.as_deref() == Some(domain))
            .find_map(|s| s.icon.as_deref())
    }
}
