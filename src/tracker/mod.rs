//! The tab activity accounting engine.
//!
//! [Tracker] decides which domain is being used at any instant, how much time to credit it and
//! when, keeps idle time out of the history and watches per-domain budgets. It owns all of its
//! state and talks to the outside world only through the collaborators in [sources], the
//! [StateStore] and the [Clock].

pub mod command;
pub mod domain;
pub mod event;
pub mod history;
pub mod idle;
pub mod limits;
pub mod session;
pub mod settings;
pub mod sources;

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    storage::{Categories, StateStore, StoredState},
    utils::clock::Clock,
};

use self::{
    domain::{resolve_domain, Domain},
    event::{TabId, TabSnapshot, TrackerEvent},
    history::{DailyHistory, HistoryAggregator},
    idle::{GateChange, IdleGate, IdleState},
    limits::LimitMonitor,
    session::{Session, SessionTable},
    settings::Settings,
    sources::{IdleSource, Notifier, TabSource},
};

pub const DEFAULT_MIN_FLUSH: Duration = Duration::from_secs(15);
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Elapsed time a flush needs before it credits anything. Shorter stretches are deferred.
    pub min_flush: Duration,
    /// Period of the full flush driven by the host.
    pub flush_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_flush: DEFAULT_MIN_FLUSH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Everything the tracker needs from its environment.
pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub tabs: Box<dyn TabSource>,
    pub idle: Box<dyn IdleSource>,
    pub notifier: Box<dyn Notifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// Regular flush, subject to the minimum elapsed threshold.
    Deferrable,
    /// The occupancy is ending, whatever is left gets credited.
    Final,
}

pub struct Tracker<S: StateStore> {
    store: S,
    clock: Box<dyn Clock>,
    tabs: Box<dyn TabSource>,
    idle_source: Box<dyn IdleSource>,
    notifier: Box<dyn Notifier>,
    config: TrackerConfig,
    sessions: SessionTable,
    history: HistoryAggregator,
    limits: LimitMonitor,
    settings: Settings,
    categories: Categories,
    idle: IdleGate,
    active_tab: Option<TabId>,
    dirty: bool,
    /// False until the stored state was read once. Saving before that would replace it.
    loaded: bool,
    /// History was cleared before the stored state could be read.
    pending_clear: bool,
}

impl<S: StateStore> Tracker<S> {
    pub fn new(store: S, collaborators: Collaborators, config: TrackerConfig) -> Self {
        let settings = Settings::default();
        Self {
            store,
            clock: collaborators.clock,
            tabs: collaborators.tabs,
            idle_source: collaborators.idle,
            notifier: collaborators.notifier,
            config,
            sessions: SessionTable::default(),
            history: HistoryAggregator::default(),
            limits: LimitMonitor::default(),
            idle: IdleGate::from_settings(&settings),
            settings,
            categories: Categories::new(),
            active_tab: None,
            dirty: false,
            loaded: false,
            pending_clear: false,
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active_tab
    }

    pub fn session(&self, id: TabId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn is_idle(&self) -> bool {
        self.idle.is_idle()
    }

    pub fn domain_total(&self, date: NaiveDate, domain: &str) -> u64 {
        self.history.domain_total(date, domain)
    }

    /// Loads persisted state and picks up the idle state and the foreground tab.
    #[instrument(skip(self))]
    pub async fn init(&mut self) {
        match self.store.load().await {
            Ok(state) => {
                self.restore(state);
                self.loaded = true;
            }
            Err(e) => error!("Failed to load stored state, starting empty until it loads {e:?}"),
        }

        self.refresh_idle_state().await;

        match self.tabs.foreground_tab().await {
            Ok(Some(tab)) => {
                self.active_tab = Some(tab.id);
                self.track_tab(tab);
            }
            Ok(None) => debug!("No foreground tab at startup"),
            Err(e) => warn!("Failed to query foreground tab {e:?}"),
        }
        info!("Tracker initialized");
    }

    /// Credits whatever is left in every session and saves. Used when the host goes away.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) {
        for id in self.sessions.ids() {
            self.flush(id, FlushMode::Final);
        }
        self.persist().await;
        info!("Tracker shut down");
    }

    /// Periodic full flush. The only path that credits a tab which stays in the foreground.
    pub async fn tick(&mut self) {
        self.flush_all();
        self.persist_if_dirty().await;
    }

    #[instrument(skip(self))]
    pub async fn handle_event(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Activate { tab_id } => self.activate(tab_id).await,
            TrackerEvent::Navigate {
                tab_id,
                url,
                title,
                fav_icon_url,
                complete,
                foreground,
            } => {
                if !complete || !foreground {
                    return;
                }
                if self.active_tab.is_none() {
                    self.active_tab = Some(tab_id);
                }
                self.track_tab(TabSnapshot {
                    id: tab_id,
                    url: Some(url),
                    title,
                    fav_icon_url,
                });
            }
            TrackerEvent::Close { tab_id } => self.close(tab_id),
            TrackerEvent::IdleState { state } => {
                let change = self.idle.observe_state(state);
                self.apply_gate_change(change);
            }
            TrackerEvent::IdleTime { idle_seconds } => {
                let change = self
                    .idle
                    .observe_idle_time(Duration::from_secs(idle_seconds));
                self.apply_gate_change(change);
            }
        }
        self.persist_if_dirty().await;
    }

    async fn activate(&mut self, tab_id: TabId) {
        let now = self.clock.time();
        if let Some(previous) = self.active_tab.filter(|previous| *previous != tab_id) {
            // Time up to now belongs to the previous tab.
            self.flush(previous, FlushMode::Deferrable);
            if let Some(session) = self.sessions.get_mut(previous) {
                session.pause(now);
            }
        }
        self.active_tab = Some(tab_id);

        match self.tabs.tab(tab_id).await {
            Ok(snapshot) => self.track_tab(snapshot),
            Err(e) => warn!("Failed to query {tab_id} after activation {e:?}"),
        }
    }

    /// Brings the session of a tab in line with the address it currently shows.
    fn track_tab(&mut self, snapshot: TabSnapshot) {
        let tab_id = snapshot.id;
        let domain = snapshot.url.as_deref().and_then(resolve_domain);

        let current = self.sessions.get(tab_id).map(|session| session.domain.clone());
        match (current, domain) {
            (Some(Some(current)), Some(domain)) if current == domain => {}
            (Some(_), domain) => {
                self.flush(tab_id, FlushMode::Final);
                if let Some(session) = self.sessions.get_mut(tab_id) {
                    debug!("{tab_id} moved to {domain:?}");
                    session.retarget(domain);
                }
            }
            (None, Some(domain)) => {
                debug!("Tracking {tab_id} on {domain}");
                self.sessions
                    .insert(tab_id, Session::new(Some(domain), &snapshot));
            }
            (None, None) => return,
        }

        if let Some(session) = self.sessions.get_mut(tab_id) {
            session.update_metadata(&snapshot);
        }
        self.resume_active();
    }

    fn close(&mut self, tab_id: TabId) {
        self.flush(tab_id, FlushMode::Final);
        if self.sessions.remove(tab_id).is_some() {
            debug!("Closed session of {tab_id}");
        }
        if self.active_tab == Some(tab_id) {
            self.active_tab = None;
        }
    }

    /// Starts the clock of the foreground session unless the user is idle.
    fn resume_active(&mut self) {
        if self.idle.is_idle() {
            return;
        }
        let now = self.clock.time();
        if let Some(session) = self
            .active_tab
            .and_then(|id| self.sessions.get_mut(id))
            .filter(|session| session.domain.is_some())
        {
            session.resume(now);
        }
    }

    fn apply_gate_change(&mut self, change: GateChange) {
        let now = self.clock.time();
        match change {
            GateChange::Unchanged => {}
            GateChange::BecameIdle => {
                info!("User went idle, pausing accrual");
                if let Some(session) = self.active_tab.and_then(|id| self.sessions.get_mut(id)) {
                    session.pause(now);
                }
            }
            GateChange::BecameActive => {
                info!("User is active again, resuming accrual");
                self.resume_active();
            }
        }
    }

    async fn refresh_idle_state(&mut self) {
        let state = match self.idle_source.query_state(self.idle.threshold()).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Idle provider failed, assuming the user is active {e:?}");
                IdleState::Active
            }
        };
        let change = self.idle.observe_state(state);
        self.apply_gate_change(change);
    }

    fn flush_all(&mut self) {
        for id in self.sessions.ids() {
            self.flush(id, FlushMode::Deferrable);
        }
    }

    /// Converts the elapsed time of a session into history. Returns whether anything was
    /// credited. While idle only a final flush credits, and only time banked before the pause.
    fn flush(&mut self, tab_id: TabId, mode: FlushMode) -> bool {
        let now = self.clock.time();
        let idle = self.idle.is_idle();
        let Some(session) = self.sessions.get_mut(tab_id) else {
            return false;
        };
        if idle && (mode == FlushMode::Deferrable || session.is_running()) {
            return false;
        }
        let Some(domain) = session.domain.clone() else {
            return false;
        };

        let elapsed = session.unflushed_seconds(now);
        let threshold = match mode {
            FlushMode::Deferrable => self.config.min_flush.as_secs().max(1),
            FlushMode::Final => 1,
        };
        if elapsed < threshold {
            debug!("Deferring {elapsed}s of {domain} on {tab_id}");
            return false;
        }

        let credited = session.take_unflushed(now);
        let today = self.clock.today();
        let day_total = self.history.credit(today, &domain, credited);
        self.dirty = true;
        self.check_limit(today, &domain, day_total, now);
        true
    }

    fn check_limit(&mut self, today: NaiveDate, domain: &Domain, day_total: u64, now: DateTime<Utc>) {
        if !self.settings.enable_time_limits {
            return;
        }
        let total = day_total + self.sessions.unflushed_for(domain, now);
        if let Some(notification) = self.limits.check(today, domain, total) {
            self.notifier.notify(notification);
        }
    }

    fn restore(&mut self, state: StoredState) {
        info!(
            "Restored {} days of history, {} limits",
            state.history.len(),
            state.limits.len()
        );
        self.history = HistoryAggregator::new(state.history);
        self.limits = LimitMonitor::new(state.limits);
        self.idle = IdleGate::from_settings(&state.settings);
        self.settings = state.settings;
        self.categories = state.categories;
    }

    fn snapshot(&self) -> StoredState {
        StoredState {
            history: self.history.history().clone(),
            settings: self.settings.clone(),
            limits: self.limits.limits().clone(),
            categories: self.categories.clone(),
        }
    }

    async fn persist(&mut self) {
        self.dirty = true;
        self.persist_if_dirty().await;
    }

    /// Retries a load that failed at startup. Returns whether the stored state is in memory.
    async fn ensure_loaded(&mut self) -> bool {
        if self.loaded {
            return true;
        }
        match self.store.load().await {
            Ok(state) => {
                self.reconcile(state);
                self.loaded = true;
                self.dirty = true;
                true
            }
            Err(e) => {
                warn!("Stored state is still unavailable, not saving {e:?}");
                false
            }
        }
    }

    /// Folds a late loaded state under what happened since startup. Accrued time is added to the
    /// stored history. Limits and categories set in the meantime win over the stored ones.
    fn reconcile(&mut self, state: StoredState) {
        info!("Stored state loaded late, merging {} days", state.history.len());
        let stored = if std::mem::take(&mut self.pending_clear) {
            DailyHistory::new()
        } else {
            state.history
        };
        let mut history = HistoryAggregator::new(stored);
        for (date, domains) in self.history.history() {
            for (domain, seconds) in domains {
                history.credit(*date, domain, *seconds);
            }
        }
        self.history = history;

        self.limits.adopt_stored(state.limits);
        for (domain, category) in state.categories {
            self.categories.entry(domain).or_insert(category);
        }
        if self.settings == Settings::default() {
            self.settings = state.settings;
            let change = self.idle.reconfigure(&self.settings);
            self.apply_gate_change(change);
        }
    }

    /// Saves when something changed since the last successful save. A failed save stays dirty and
    /// is retried on the next tick. Nothing is saved while the stored state could not be read.
    async fn persist_if_dirty(&mut self) {
        if !self.dirty || !self.ensure_loaded().await {
            return;
        }
        match self.store.save(&self.snapshot()).await {
            Ok(()) => self.dirty = false,
            Err(e) => error!("Failed to save state, will retry {e:?}"),
        }
    }
}
