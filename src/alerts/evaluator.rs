//! Background alert evaluator
//!
//! Every interval the evaluator pulls the latest temperature per device,
//! updates the per-device gauge and advances each device's alert state.
//! Cycles run one at a time inside a single task, so a slow query delays the
//! next cycle instead of overlapping with it.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use super::config::AlertPolicy;
use super::notifier::{AlertEvent, AlertEventKind, Notifier};
use super::state::{AlertStateStore, Transition};
use crate::metrics::AlertMetrics;
use crate::storage::{LatestValueQuery, StorageError};

/// What a single evaluation cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// Query dependency unavailable; nothing was touched
    Skipped,
    /// Query failed; nothing was touched
    Failed(StorageError),
    Completed {
        devices: usize,
        raised: usize,
        resolved: usize,
    },
}

pub struct AlertEvaluator {
    policy: AlertPolicy,
    query: LatestValueQuery,
    states: AlertStateStore,
    metrics: AlertMetrics,
    notifier: Notifier,
}

impl AlertEvaluator {
    pub fn new(
        policy: AlertPolicy,
        query: LatestValueQuery,
        metrics: AlertMetrics,
        notifier: Notifier,
    ) -> Self {
        Self {
            policy,
            query,
            states: AlertStateStore::new(),
            metrics,
            notifier,
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    pub fn states(&self) -> &AlertStateStore {
        &self.states
    }

    /// Apply one observation for a device: gauge update, state transition and
    /// counter increment on raise. Returns the event to dispatch, if any.
    pub fn observe(&mut self, device_id: &str, value: f64, now: DateTime<Utc>) -> Option<AlertEvent> {
        self.metrics.set_temperature(device_id, value);

        let kind = match self.states.entry(device_id).observe(value, now, &self.policy) {
            Transition::Raised => {
                self.metrics.inc_alerts(device_id);
                AlertEventKind::Raised
            }
            Transition::Resolved => AlertEventKind::Resolved,
            Transition::Unchanged => return None,
        };

        Some(AlertEvent {
            kind,
            device_id: device_id.to_string(),
            field: self.policy.field.clone(),
            value,
            threshold: self.policy.threshold,
            at: now,
        })
    }

    /// Run one evaluation cycle as of `now`
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        if !self.query.is_available() {
            tracing::warn!("Storage not ready, skipping alert check");
            return CycleOutcome::Skipped;
        }

        let values = match self.query.fetch().await {
            Ok(values) => values,
            Err(e) => {
                tracing::error!(error = %e, field = %self.query.field(), "Alert check query failed");
                return CycleOutcome::Failed(e);
            }
        };

        let devices = values.len();
        let events: Vec<AlertEvent> = values
            .into_iter()
            .filter_map(|latest| self.observe(&latest.device_id, latest.value, now))
            .collect();

        let raised = events
            .iter()
            .filter(|e| e.kind == AlertEventKind::Raised)
            .count();
        let resolved = events.len() - raised;

        for event in &events {
            if let Err(e) = self.notifier.notify(event).await {
                tracing::error!(
                    device_id = %event.device_id,
                    error = %e,
                    "Failed to send notification"
                );
            }
        }

        tracing::debug!(devices, raised, resolved, "Alert check complete");

        CycleOutcome::Completed {
            devices,
            raised,
            resolved,
        }
    }

    /// Start the background loop. The evaluator moves into the task.
    pub fn start(mut self) -> EvaluatorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let check_interval = self.policy.interval;

        let join = tokio::spawn(async move {
            tracing::info!("Alert evaluator started with interval {:?}", check_interval);

            let mut ticker = interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle(Utc::now()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Alert evaluator shutting down");
                        break;
                    }
                }
            }

            self
        });

        EvaluatorHandle { shutdown_tx, join }
    }
}

/// Handle to a running evaluator
pub struct EvaluatorHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: tokio::task::JoinHandle<AlertEvaluator>,
}

impl EvaluatorHandle {
    /// Stop the loop and hand the evaluator back once the current cycle ends
    pub async fn stop(self) -> Option<AlertEvaluator> {
        let _ = self.shutdown_tx.send(()).await;
        match self.join.await {
            Ok(evaluator) => Some(evaluator),
            Err(e) => {
                tracing::error!(error = %e, "Alert evaluator task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StoragePoint;
    use crate::metrics::MetricsRegistry;
    use crate::storage::{LatestValue, TimeSeriesStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Store returning whatever readings the test scripts
    #[derive(Default)]
    struct ScriptedStore {
        readings: Mutex<Vec<LatestValue>>,
        down: AtomicBool,
        failing: AtomicBool,
        queries: AtomicUsize,
    }

    impl ScriptedStore {
        fn set(&self, readings: &[(&str, f64)]) {
            *self.readings.lock() = readings
                .iter()
                .map(|(d, v)| LatestValue {
                    device_id: d.to_string(),
                    value: *v,
                    time: None,
                })
                .collect();
        }
    }

    #[async_trait]
    impl TimeSeriesStore for ScriptedStore {
        async fn write_point(&self, _point: &StoragePoint) -> Result<(), StorageError> {
            Ok(())
        }

        async fn latest_values(
            &self,
            _field: &str,
            _lookback: Duration,
        ) -> Result<Vec<LatestValue>, StorageError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Query("timeout".to_string()));
            }
            Ok(self.readings.lock().clone())
        }

        async fn health(&self) -> Result<(), StorageError> {
            Ok(())
        }

        fn is_available(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn setup(policy: AlertPolicy) -> (Arc<ScriptedStore>, MetricsRegistry, AlertEvaluator) {
        let store = Arc::new(ScriptedStore::default());
        let metrics = MetricsRegistry::new();
        let query = LatestValueQuery::new(store.clone(), policy.field.clone());
        let evaluator = AlertEvaluator::new(policy, query, metrics.alerts().clone(), Notifier::new());
        (store, metrics, evaluator)
    }

    #[tokio::test]
    async fn test_scenarios_raise_cooldown_resolve() {
        let (store, metrics, mut evaluator) = setup(AlertPolicy::default());
        let alerts = metrics.alerts();

        // A: first reading above threshold raises
        store.set(&[("sim01", 36.0)]);
        let outcome = evaluator.run_cycle(at(0)).await;
        assert!(matches!(outcome, CycleOutcome::Completed { devices: 1, raised: 1, resolved: 0 }));
        assert_eq!(alerts.alerts_total("sim01"), 1);
        assert_eq!(alerts.temperature("sim01"), 36.0);
        assert_eq!(evaluator.states().get("sim01").unwrap().last_alert_time, Some(at(0)));

        // B: inside cooldown, gauge moves but no new alert
        store.set(&[("sim01", 36.5)]);
        let outcome = evaluator.run_cycle(at(30)).await;
        assert!(matches!(outcome, CycleOutcome::Completed { raised: 0, resolved: 0, .. }));
        assert_eq!(alerts.alerts_total("sim01"), 1);
        assert_eq!(alerts.temperature("sim01"), 36.5);

        // C: below threshold - hysteresis resolves
        store.set(&[("sim01", 34.0)]);
        let outcome = evaluator.run_cycle(at(61)).await;
        assert!(matches!(outcome, CycleOutcome::Completed { raised: 0, resolved: 1, .. }));
        let state = evaluator.states().get("sim01").unwrap();
        assert!(!state.alerting);
        assert_eq!(state.last_alert_time, None);
        assert_eq!(alerts.alerts_total("sim01"), 1);
    }

    #[tokio::test]
    async fn test_persistent_breach_realerts_after_cooldown() {
        let (store, metrics, mut evaluator) = setup(AlertPolicy::default());
        store.set(&[("sim01", 38.0)]);

        for t in [0, 10, 20, 30, 40, 50, 60] {
            evaluator.run_cycle(at(t)).await;
        }
        assert_eq!(metrics.alerts().alerts_total("sim01"), 1);

        evaluator.run_cycle(at(70)).await;
        assert_eq!(metrics.alerts().alerts_total("sim01"), 2);
        assert_eq!(evaluator.states().get("sim01").unwrap().last_alert_time, Some(at(70)));
    }

    #[tokio::test]
    async fn test_dead_zone_does_not_flap() {
        let (store, metrics, mut evaluator) = setup(AlertPolicy::default());

        store.set(&[("sim01", 35.5)]);
        evaluator.run_cycle(at(0)).await;

        for (i, v) in [34.8, 35.0, 34.1, 34.9, 34.5].into_iter().enumerate() {
            store.set(&[("sim01", v)]);
            evaluator.run_cycle(at(10 * (i as i64 + 1))).await;
            assert!(evaluator.states().get("sim01").unwrap().alerting);
        }
        assert_eq!(metrics.alerts().alerts_total("sim01"), 1);
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let (store, metrics, mut evaluator) = setup(AlertPolicy::default());

        store.set(&[("sim01", 40.0), ("sim02", 20.0)]);
        evaluator.run_cycle(at(0)).await;

        assert_eq!(metrics.alerts().alerts_total("sim01"), 1);
        assert_eq!(metrics.alerts().alerts_total("sim02"), 0);
        assert_eq!(metrics.alerts().temperature("sim02"), 20.0);
        assert_eq!(evaluator.states().len(), 2);
        assert_eq!(evaluator.states().alerting_devices(), vec!["sim01"]);
    }

    #[tokio::test]
    async fn test_unavailable_store_skips_cycle() {
        let (store, metrics, mut evaluator) = setup(AlertPolicy::default());

        store.set(&[("sim01", 40.0)]);
        evaluator.run_cycle(at(0)).await;

        // Storage goes away while the device has cooled down
        store.set(&[("sim01", 20.0)]);
        store.down.store(true, Ordering::SeqCst);
        let queries_before = store.queries.load(Ordering::SeqCst);

        assert!(matches!(evaluator.run_cycle(at(10)).await, CycleOutcome::Skipped));
        assert_eq!(store.queries.load(Ordering::SeqCst), queries_before);
        assert!(evaluator.states().get("sim01").unwrap().alerting);
        assert_eq!(metrics.alerts().temperature("sim01"), 40.0);

        // Back again: normal evaluation resumes
        store.down.store(false, Ordering::SeqCst);
        let outcome = evaluator.run_cycle(at(20)).await;
        assert!(matches!(outcome, CycleOutcome::Completed { resolved: 1, .. }));
        assert!(!evaluator.states().get("sim01").unwrap().alerting);
    }

    #[tokio::test]
    async fn test_query_failure_leaves_state_untouched() {
        let (store, metrics, mut evaluator) = setup(AlertPolicy::default());

        store.set(&[("sim01", 40.0)]);
        evaluator.run_cycle(at(0)).await;

        store.set(&[("sim01", 20.0)]);
        store.failing.store(true, Ordering::SeqCst);
        let outcome = evaluator.run_cycle(at(10)).await;

        assert!(matches!(outcome, CycleOutcome::Failed(StorageError::Query(_))));
        assert!(evaluator.states().get("sim01").unwrap().alerting);
        assert_eq!(metrics.alerts().temperature("sim01"), 40.0);
        assert_eq!(metrics.alerts().alerts_total("sim01"), 1);
    }

    #[tokio::test]
    async fn test_absent_device_keeps_state() {
        let (store, _metrics, mut evaluator) = setup(AlertPolicy::default());

        store.set(&[("sim01", 40.0)]);
        evaluator.run_cycle(at(0)).await;

        store.set(&[]);
        let outcome = evaluator.run_cycle(at(3600)).await;

        assert!(matches!(outcome, CycleOutcome::Completed { devices: 0, .. }));
        assert!(evaluator.states().get("sim01").unwrap().alerting);
    }

    #[tokio::test]
    async fn test_observe_builds_events() {
        let (_store, _metrics, mut evaluator) = setup(AlertPolicy::default());

        let event = evaluator.observe("sim07", 41.0, at(0)).unwrap();
        assert_eq!(event.kind, AlertEventKind::Raised);
        assert_eq!(event.field, "temperature_celsius");
        assert_eq!(event.threshold, 35.0);
        assert_eq!(event.at, at(0));

        assert!(evaluator.observe("sim07", 34.5, at(5)).is_none());

        let event = evaluator.observe("sim07", 30.0, at(10)).unwrap();
        assert_eq!(event.kind, AlertEventKind::Resolved);
    }

    #[tokio::test]
    async fn test_silent_webhook_does_not_stall_cycle() {
        use crate::alerts::NotifyTarget;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = Arc::new(ScriptedStore::default());
        let metrics = MetricsRegistry::new();
        let policy = AlertPolicy::default();
        let notifier = Notifier::with_targets(vec![
            NotifyTarget::Log,
            NotifyTarget::Webhook {
                url: format!("http://{}/hook", addr),
                headers: Default::default(),
            },
        ])
        .with_timeout(Duration::from_millis(200));
        let mut evaluator = AlertEvaluator::new(
            policy.clone(),
            LatestValueQuery::new(store.clone(), policy.field.clone()),
            metrics.alerts().clone(),
            notifier,
        );

        store.set(&[("sim01", 40.0)]);
        let outcome = tokio::time::timeout(Duration::from_secs(5), evaluator.run_cycle(at(0)))
            .await
            .expect("cycle must finish despite the webhook");
        assert!(matches!(outcome, CycleOutcome::Completed { raised: 1, .. }));

        // Next cycle still runs and resolves
        store.set(&[("sim01", 30.0)]);
        let outcome = tokio::time::timeout(Duration::from_secs(5), evaluator.run_cycle(at(10)))
            .await
            .expect("cycle must finish despite the webhook");
        assert!(matches!(outcome, CycleOutcome::Completed { resolved: 1, .. }));
        assert_eq!(metrics.alerts().temperature("sim01"), 30.0);
    }

    #[tokio::test]
    async fn test_background_loop_runs_and_stops() {
        let policy = AlertPolicy::default().with_interval(Duration::from_millis(20));
        let (store, metrics, evaluator) = setup(policy);
        store.set(&[("sim01", 50.0)]);

        let handle = evaluator.start();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let evaluator = handle.stop().await.unwrap();

        assert!(store.queries.load(Ordering::SeqCst) >= 2);
        assert!(evaluator.states().get("sim01").unwrap().alerting);
        // Wall-clock cycles inside one cooldown raise only once
        assert_eq!(metrics.alerts().alerts_total("sim01"), 1);
    }
}
