use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use tracing::info;

use super::{domain::Domain, sources::Notification};

pub type Limits = BTreeMap<Domain, u64>;

/// Per-domain daily budgets. Remembers which `(date, domain)` pairs were already notified so a
/// budget fires once per day no matter how many flushes cross it.
#[derive(Debug, Default)]
pub struct LimitMonitor {
    limits: Limits,
    notified: HashSet<(NaiveDate, Domain)>,
}

impl LimitMonitor {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            notified: HashSet::new(),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn set_limit(&mut self, domain: Domain, seconds: u64) {
        self.limits.insert(domain, seconds);
    }

    pub fn remove_limit(&mut self, domain: &str) -> bool {
        self.limits.remove(domain).is_some()
    }

    /// Adds stored budgets for domains that have none yet.
    pub fn adopt_stored(&mut self, stored: Limits) {
        for (domain, seconds) in stored {
            self.limits.entry(domain).or_insert(seconds);
        }
    }

    pub fn clear_notified(&mut self) {
        self.notified.clear();
    }

    /// Returns the notification to emit when `day_total` reaches the budget of `domain` for the
    /// first time on `today`.
    pub fn check(
        &mut self,
        today: NaiveDate,
        domain: &Domain,
        day_total: u64,
    ) -> Option<Notification> {
        let limit = *self.limits.get(domain)?;
        if day_total < limit {
            return None;
        }

        // Markers of previous days can never match again.
        self.notified.retain(|(date, _)| *date == today);
        if !self.notified.insert((today, domain.clone())) {
            return None;
        }

        info!("{domain} reached its limit of {limit}s with {day_total}s on {today}");
        Some(Notification {
            title: "Time Limit Reached".into(),
            message: format!(
                "You've reached your {}m limit for {domain}.",
                limit / 60
            ),
        })
    }
}
