use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::settings::Settings;

/// State reported by an idle provider. Anything but [IdleState::Active] counts as idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateChange {
    Unchanged,
    BecameIdle,
    BecameActive,
}

/// Suppresses accrual while the user is away. The gate is closed only when idle detection is
/// enabled and the provider last reported a non-active state.
#[derive(Debug)]
pub struct IdleGate {
    threshold_ms: u64,
    detection_enabled: bool,
    reported_idle: bool,
}

impl IdleGate {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            threshold_ms: settings.idle_timeout_seconds.saturating_mul(1000),
            detection_enabled: settings.enable_idle_detection,
            reported_idle: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.detection_enabled && self.reported_idle
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    pub fn observe_state(&mut self, state: IdleState) -> GateChange {
        self.update(|gate| gate.reported_idle = state != IdleState::Active)
    }

    /// For providers that report time since last input rather than a state.
    pub fn observe_idle_time(&mut self, idle: Duration) -> GateChange {
        let idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX);
        self.update(|gate| gate.reported_idle = gate.threshold_ms < idle_ms)
    }

    pub fn reconfigure(&mut self, settings: &Settings) -> GateChange {
        self.update(|gate| {
            gate.threshold_ms = settings.idle_timeout_seconds.saturating_mul(1000);
            gate.detection_enabled = settings.enable_idle_detection;
        })
    }

    fn update(&mut self, change: impl FnOnce(&mut Self)) -> GateChange {
        let was_idle = self.is_idle();
        change(self);
        match (was_idle, self.is_idle()) {
            (false, true) => GateChange::BecameIdle,
            (true, false) => GateChange::BecameActive,
            _ => GateChange::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{GateChange, IdleGate, IdleState};
    use crate::tracker::settings::Settings;

    fn gate() -> IdleGate {
        IdleGate::from_settings(&Settings {
            enable_idle_detection: true,
            idle_timeout_seconds: 60,
            ..Settings::default()
        })
    }

    #[test]
    fn test_locked_counts_as_idle() {
        let mut gate = gate();
        assert_eq!(gate.observe_state(IdleState::Locked), GateChange::BecameIdle);
        assert!(gate.is_idle());
        assert_eq!(gate.observe_state(IdleState::Idle), GateChange::Unchanged);
        assert_eq!(gate.observe_state(IdleState::Active), GateChange::BecameActive);
    }

    #[test]
    fn test_idle_time_is_compared_with_threshold() {
        let mut gate = gate();
        assert_eq!(
            gate.observe_idle_time(Duration::from_secs(60)),
            GateChange::Unchanged
        );
        assert_eq!(
            gate.observe_idle_time(Duration::from_secs(61)),
            GateChange::BecameIdle
        );
    }

    #[test]
    fn test_huge_idle_time_counts_as_idle() {
        let mut gate = gate();
        // Past u64::MAX milliseconds by a few hundred.
        assert_eq!(
            gate.observe_idle_time(Duration::from_secs(18_446_744_073_709_552)),
            GateChange::BecameIdle
        );
        assert_eq!(
            gate.observe_idle_time(Duration::from_secs(u64::MAX)),
            GateChange::Unchanged
        );
        assert!(gate.is_idle());
    }

    #[test]
    fn test_disabling_detection_opens_the_gate() {
        let mut gate = gate();
        gate.observe_state(IdleState::Idle);
        let change = gate.reconfigure(&Settings {
            enable_idle_detection: false,
            ..Settings::default()
        });
        assert_eq!(change, GateChange::BecameActive);
        assert!(!gate.is_idle());
    }
}
