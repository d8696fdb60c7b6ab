use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::Domain;

pub type DomainTotals = BTreeMap<Domain, u64>;

/// Local calendar date → domain → credited seconds. Serialized with `YYYY-MM-DD` keys.
pub type DailyHistory = BTreeMap<NaiveDate, DomainTotals>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_time_today: u64,
}

/// Owner of the daily history plus the cached running total of the current day.
#[derive(Debug, Default)]
pub struct HistoryAggregator {
    history: DailyHistory,
    cached_total: Option<(NaiveDate, u64)>,
}

impl HistoryAggregator {
    pub fn new(history: DailyHistory) -> Self {
        Self {
            history,
            cached_total: None,
        }
    }

    pub fn history(&self) -> &DailyHistory {
        &self.history
    }

    /// Adds `seconds` to `domain` on `today` and returns the domain's new total for the day.
    pub fn credit(&mut self, today: NaiveDate, domain: &Domain, seconds: u64) -> u64 {
        let day = self.history.entry(today).or_default();
        let total = day.entry(domain.clone()).or_insert(0);
        *total += seconds;
        let total = *total;
        self.recompute_total(today);
        debug!("Credited {seconds}s to {domain} on {today}, now {total}s");
        total
    }

    pub fn domain_total(&self, date: NaiveDate, domain: &str) -> u64 {
        self.history
            .get(&date)
            .and_then(|day| day.get(domain))
            .copied()
            .unwrap_or(0)
    }

    pub fn today_total(&mut self, today: NaiveDate) -> u64 {
        match self.cached_total {
            Some((date, total)) if date == today => total,
            _ => self.recompute_total(today),
        }
    }

    pub fn analytics(&mut self, today: NaiveDate) -> Analytics {
        Analytics {
            total_time_today: self.today_total(today),
        }
    }

    pub fn clear_all(&mut self) {
        self.history.clear();
        self.cached_total = None;
    }

    /// Merges an imported history. On a date and domain present on both sides the imported value
    /// wins.
    pub fn merge_import(&mut self, imported: DailyHistory, today: NaiveDate) {
        for (date, domains) in imported {
            self.history.entry(date).or_default().extend(domains);
        }
        self.recompute_total(today);
    }

    fn recompute_total(&mut self, today: NaiveDate) -> u64 {
        let total = self
            .history
            .get(&today)
            .map(|day| day.values().sum())
            .unwrap_or(0);
        self.cached_total = Some((today, total));
        total
    }
}
