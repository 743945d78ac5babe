//! Threshold alerting with hysteresis and cooldown
//!
//! A background evaluator periodically queries the latest value per device
//! and drives a per-device state machine, emitting raise/resolve events.

pub mod config;
pub mod evaluator;
pub mod notifier;
pub mod state;

pub use config::{AlertPolicy, TEMPERATURE_FIELD};
pub use evaluator::{AlertEvaluator, CycleOutcome, EvaluatorHandle};
pub use notifier::{
    AlertEvent, AlertEventKind, Notifier, NotifierError, NotifyTarget, WEBHOOK_TIMEOUT,
};
pub use state::{AlertState, AlertStateStore, Transition};
