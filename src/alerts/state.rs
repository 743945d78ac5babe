//! Per-device alert state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::AlertPolicy;

/// Alert lifecycle state for one device
///
/// `last_alert_time` is `Some` exactly while `alerting` is true.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertState {
    /// Device is above threshold and has not yet recovered
    pub alerting: bool,
    /// When the most recent alert was raised
    pub last_alert_time: Option<DateTime<Utc>>,
}

/// Result of feeding one observation to an [`AlertState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Raised,
    Resolved,
    Unchanged,
}

impl AlertState {
    /// Advance the state machine with an observation taken at `now`
    pub fn observe(&mut self, value: f64, now: DateTime<Utc>, policy: &AlertPolicy) -> Transition {
        if value > policy.threshold && (!self.alerting || self.cooldown_elapsed(now, policy)) {
            self.alerting = true;
            self.last_alert_time = Some(now);
            return Transition::Raised;
        }

        if self.alerting && value <= policy.resolve_level() {
            self.alerting = false;
            self.last_alert_time = None;
            return Transition::Resolved;
        }

        Transition::Unchanged
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>, policy: &AlertPolicy) -> bool {
        match self.last_alert_time {
            // A negative span (clock stepped back) counts as not elapsed
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed > policy.cooldown)
                .unwrap_or(false),
            None => true,
        }
    }
}

/// Alert states keyed by device identity
///
/// Entries are created on first observation and never removed.
#[derive(Debug, Default)]
pub struct AlertStateStore {
    states: HashMap<String, AlertState>,
}

impl AlertStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<&AlertState> {
        self.states.get(device_id)
    }

    /// Look up a device's state, creating the default on first sight
    pub fn entry(&mut self, device_id: &str) -> &mut AlertState {
        if !self.states.contains_key(device_id) {
            tracing::debug!(device_id = %device_id, "Tracking new device");
        }
        self.states.entry(device_id.to_string()).or_default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Devices currently alerting
    pub fn alerting_devices(&self) -> Vec<&str> {
        let mut devices: Vec<&str> = self
            .states
            .iter()
            .filter(|(_, s)| s.alerting)
            .map(|(d, _)| d.as_str())
            .collect();
        devices.sort_unstable();
        devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_observation_above_threshold_raises() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();

        assert_eq!(state.observe(36.0, at(0), &policy), Transition::Raised);
        assert!(state.alerting);
        assert_eq!(state.last_alert_time, Some(at(0)));
    }

    #[test]
    fn test_at_threshold_does_not_raise() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();

        assert_eq!(state.observe(35.0, at(0), &policy), Transition::Unchanged);
        assert_eq!(state, AlertState::default());
    }

    #[test]
    fn test_dead_zone_keeps_alerting() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();
        state.observe(40.0, at(0), &policy);

        for (i, value) in [34.9, 34.5, 34.01, 35.0, 34.2].into_iter().enumerate() {
            let t = at(10 * (i as i64 + 1));
            assert_eq!(state.observe(value, t, &policy), Transition::Unchanged);
            assert!(state.alerting);
            assert_eq!(state.last_alert_time, Some(at(0)));
        }
    }

    #[test]
    fn test_resolution_needs_hysteresis_crossing() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();
        state.observe(40.0, at(0), &policy);

        assert_eq!(state.observe(34.5, at(10), &policy), Transition::Unchanged);
        assert_eq!(state.observe(33.9, at(20), &policy), Transition::Resolved);
        assert!(!state.alerting);
        assert_eq!(state.last_alert_time, None);
    }

    #[test]
    fn test_resolve_exactly_at_level() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();
        state.observe(36.0, at(0), &policy);

        assert_eq!(state.observe(34.0, at(5), &policy), Transition::Resolved);
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();

        assert_eq!(state.observe(36.0, at(0), &policy), Transition::Raised);
        assert_eq!(state.observe(37.0, at(30), &policy), Transition::Unchanged);
        // Exactly at the cooldown boundary is not yet past it
        assert_eq!(state.observe(37.0, at(60), &policy), Transition::Unchanged);
        assert_eq!(state.last_alert_time, Some(at(0)));
    }

    #[test]
    fn test_rearm_after_cooldown() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();

        state.observe(36.0, at(0), &policy);
        assert_eq!(state.observe(36.0, at(61), &policy), Transition::Raised);
        assert_eq!(state.last_alert_time, Some(at(61)));
        assert!(state.alerting);
    }

    #[test]
    fn test_clock_step_back_does_not_rearm() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();

        state.observe(36.0, at(100), &policy);
        assert_eq!(state.observe(36.0, at(0), &policy), Transition::Unchanged);
    }

    #[test]
    fn test_below_threshold_when_idle_is_noop() {
        let policy = AlertPolicy::default();
        let mut state = AlertState::default();

        assert_eq!(state.observe(20.0, at(0), &policy), Transition::Unchanged);
        assert_eq!(state.observe(33.0, at(1), &policy), Transition::Unchanged);
        assert!(!state.alerting);
    }

    #[test]
    fn test_store_creates_lazily() {
        let mut store = AlertStateStore::new();
        assert!(store.is_empty());
        assert!(store.get("sim01").is_none());

        let state = store.entry("sim01");
        assert_eq!(*state, AlertState::default());
        state.alerting = true;

        assert_eq!(store.len(), 1);
        assert!(store.get("sim01").unwrap().alerting);
        assert_eq!(store.alerting_devices(), vec!["sim01"]);
    }
}
