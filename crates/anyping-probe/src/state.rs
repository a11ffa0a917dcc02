use anyping_model::{IconCategory, ProbeId, ProbeOutcome, ProbeResult, ProbeSpec, StatusEntry};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const STATUS_WAITING: &str = "waiting...";
pub const STATUS_INACTIVE: &str = "inactive.";
pub const STATUS_FAILED: &str = "failed.";
pub const STATUS_NO_RESPONSE: &str = "no response.";

/// Average latency (ms) above which a successful probe is shown as a warning.
/// Shared by every probe of a registry.
#[derive(Debug, Clone)]
pub struct WarningThreshold(Arc<AtomicU64>);

impl WarningThreshold {
    pub fn new(ms: f64) -> Self {
        Self(Arc::new(AtomicU64::new(ms.to_bits())))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, ms: f64) {
        self.0.store(ms.to_bits(), Ordering::Release);
    }
}

pub fn icon_for(result: &ProbeResult, activated: bool, warning_ms: f64) -> IconCategory {
    if !activated {
        return IconCategory::Inactive;
    }
    match result.outcome {
        ProbeOutcome::Success if result.avg_ms > warning_ms => IconCategory::Warning,
        ProbeOutcome::Success => IconCategory::Good,
        ProbeOutcome::Failed | ProbeOutcome::NoResponse => IconCategory::Bad,
    }
}

pub fn status_line(result: &ProbeResult) -> String {
    match result.outcome {
        ProbeOutcome::Success => format!(
            "min: {:.2}, avg: {:.2}, max: {:.2}, packet loss: {:.1}",
            result.min_ms, result.avg_ms, result.max_ms, result.loss_percent
        ),
        ProbeOutcome::Failed => STATUS_FAILED.to_string(),
        ProbeOutcome::NoResponse => STATUS_NO_RESPONSE.to_string(),
    }
}

/// Run state of one probe as seen from outside its loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeState {
    pub id: ProbeId,
    pub spec: ProbeSpec,
    pub result: ProbeResult,
    pub icon: IconCategory,
    pub status: String,
    pub activated: bool,
    pub running: bool,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl ProbeState {
    pub fn new(id: ProbeId, spec: ProbeSpec) -> Self {
        let activated = spec.activated;
        let mut state = Self {
            id,
            spec,
            result: ProbeResult::no_response(),
            icon: IconCategory::Bad,
            status: String::new(),
            activated,
            running: false,
            last_error: None,
            ticks: 0,
            last_tick_at: None,
        };
        state.apply_activation(activated);
        state
    }

    /// Menu-style label, e.g. `Ping: 10.0.0.1 no response.`
    pub fn label(&self) -> String {
        format!("Ping: {} {}", self.spec.address, self.status)
    }

    pub fn entry(&self) -> StatusEntry {
        StatusEntry {
            id: self.id,
            address: self.spec.address.clone(),
            icon: self.icon,
            show_in_summary: self.spec.show_in_summary,
            show_text: self.spec.show_text,
        }
    }

    pub(crate) fn record(&mut self, result: ProbeResult, error: Option<String>, warning_ms: f64) {
        self.result = result;
        self.last_error = error;
        self.ticks += 1;
        self.last_tick_at = Some(Utc::now());
        self.icon = icon_for(&self.result, self.activated, warning_ms);
        self.status = status_line(&self.result);
    }

    /// Activation changes show `waiting...` or `inactive.` until the next tick.
    pub(crate) fn apply_activation(&mut self, activated: bool) {
        self.activated = activated;
        self.spec.activated = activated;
        if activated {
            self.icon = IconCategory::Bad;
            self.status = STATUS_WAITING.to_string();
        } else {
            self.icon = IconCategory::Inactive;
            self.status = STATUS_INACTIVE.to_string();
        }
    }

    pub(crate) fn forget_result(&mut self) {
        self.result = ProbeResult::no_response();
        self.last_error = None;
        self.apply_activation(self.activated);
    }

    pub(crate) fn refresh_icon(&mut self, warning_ms: f64) {
        if self.activated && self.status == STATUS_WAITING {
            return;
        }
        self.icon = icon_for(&self.result, self.activated, warning_ms);
    }
}
