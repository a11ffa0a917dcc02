//! Shared data structures for anyping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_WARNING_THRESHOLD_MS: f64 = 50.0;
/// Longest accepted update interval, one year.
pub const MAX_UPDATE_INTERVAL_SECS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Identity of a registered probe. Allocated by the registry, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeId(pub u64);

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: String,
    #[serde(default = "default_interval_secs")]
    pub update_interval_secs: f64,
    #[serde(default = "default_echo_count")]
    pub echo_count: u32,
    #[serde(default = "default_true")]
    pub show_in_summary: bool,
    #[serde(default)]
    pub show_text: bool,
    #[serde(default = "default_true")]
    pub activated: bool,
}

fn default_interval_secs() -> f64 {
    1.0
}

fn default_echo_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl ProbeSpec {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
            update_interval_secs: default_interval_secs(),
            echo_count: default_echo_count(),
            show_in_summary: true,
            show_text: false,
            activated: true,
        }
    }

    /// Name when one is configured, otherwise the address.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.address,
        }
    }

    /// `None` when the configured seconds do not fit a `Duration`, which
    /// `validate` rules out.
    pub fn interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.update_interval_secs).ok()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("address must not be empty".to_string());
        }
        if self.address.trim_start().starts_with('-') {
            return Err(format!("address must not start with '-': {}", self.address));
        }
        if !self.update_interval_secs.is_finite() || self.update_interval_secs <= 0.0 {
            return Err(format!(
                "update interval must be a positive number of seconds, got {}",
                self.update_interval_secs
            ));
        }
        if self.update_interval_secs > MAX_UPDATE_INTERVAL_SECS {
            return Err(format!(
                "update interval must be at most {MAX_UPDATE_INTERVAL_SECS} seconds, got {}",
                self.update_interval_secs
            ));
        }
        if self.echo_count == 0 {
            return Err("echo count must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success,
    Failed,
    NoResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub loss_percent: f64,
}

impl ProbeResult {
    pub fn success(min_ms: f64, avg_ms: f64, max_ms: f64, loss_percent: f64) -> Self {
        Self {
            outcome: ProbeOutcome::Success,
            min_ms,
            avg_ms,
            max_ms,
            loss_percent,
        }
    }

    pub fn failed() -> Self {
        Self::zeroed(ProbeOutcome::Failed)
    }

    pub fn no_response() -> Self {
        Self::zeroed(ProbeOutcome::NoResponse)
    }

    fn zeroed(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            min_ms: 0.0,
            avg_ms: 0.0,
            max_ms: 0.0,
            loss_percent: 0.0,
        }
    }
}

/// Display category of a probe, one coloured dot in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconCategory {
    Good,
    Warning,
    Bad,
    Inactive,
}

impl IconCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            IconCategory::Good => "good",
            IconCategory::Warning => "warning",
            IconCategory::Bad => "bad",
            IconCategory::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: ProbeId,
    pub address: String,
    pub icon: IconCategory,
    pub show_in_summary: bool,
    pub show_text: bool,
}

/// Display tuples of every live probe, ascending by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub entries: Vec<StatusEntry>,
}

impl StatusSnapshot {
    pub fn from_entries(mut entries: Vec<StatusEntry>) -> Self {
        entries.sort_by_key(|entry| entry.id);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ProbeId) -> Option<&StatusEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn contains(&self, id: ProbeId) -> bool {
        self.get(id).is_some()
    }

    /// Entries that go into the summary line.
    pub fn summary(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|entry| entry.show_in_summary)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_ms: f64,
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_warning_threshold() -> f64 {
    DEFAULT_WARNING_THRESHOLD_MS
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            warning_threshold_ms: DEFAULT_WARNING_THRESHOLD_MS,
            probes: vec![ProbeSpec::new("8.8.8.8")],
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.warning_threshold_ms.is_finite() || self.warning_threshold_ms < 0.0 {
            return Err(format!(
                "warning threshold must be a non-negative number, got {}",
                self.warning_threshold_ms
            ));
        }
        for (index, spec) in self.probes.iter().enumerate() {
            spec.validate()
                .map_err(|err| format!("probe {index} ({}): {err}", spec.address))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_fields_take_defaults() {
        let spec: ProbeSpec = serde_json::from_str(r#"{ "address": "1.1.1.1" }"#).unwrap();
        assert_eq!(spec, ProbeSpec::new("1.1.1.1"));
        assert_eq!(spec.interval(), Some(Duration::from_secs(1)));
        assert_eq!(spec.label(), "1.1.1.1");
    }

    #[test]
    fn config_without_threshold_uses_default() {
        let config: ProbeConfig = serde_json::from_str(
            r#"{
                "probes": [
                    { "address": "10.0.0.1", "name": "gateway", "echo_count": 3 },
                    { "address": "example.org", "update_interval_secs": 2.5, "activated": false }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.warning_threshold_ms, DEFAULT_WARNING_THRESHOLD_MS);
        assert_eq!(config.probes.len(), 2);
        assert_eq!(config.probes[0].label(), "gateway");
        assert_eq!(config.probes[0].echo_count, 3);
        assert!(!config.probes[1].activated);
        assert_eq!(
            config.probes[1].interval(),
            Some(Duration::from_millis(2500))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_specs() {
        let mut spec = ProbeSpec::new("");
        assert!(spec.validate().is_err());

        spec.address = "-f".to_string();
        assert!(spec.validate().is_err());

        spec.address = "127.0.0.1".to_string();
        spec.update_interval_secs = 0.0;
        assert!(spec.validate().is_err());

        spec.update_interval_secs = f64::NAN;
        assert!(spec.validate().is_err());

        spec.update_interval_secs = 0.5;
        spec.echo_count = 0;
        assert!(spec.validate().is_err());

        spec.echo_count = 1;
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn oversized_intervals_are_rejected_not_zeroed() {
        let mut spec = ProbeSpec::new("127.0.0.1");
        spec.update_interval_secs = MAX_UPDATE_INTERVAL_SECS;
        assert!(spec.validate().is_ok());
        assert_eq!(
            spec.interval(),
            Some(Duration::from_secs(MAX_UPDATE_INTERVAL_SECS as u64))
        );

        for secs in [MAX_UPDATE_INTERVAL_SECS * 2.0, 1e19, 1e20] {
            spec.update_interval_secs = secs;
            let err = spec.validate().unwrap_err();
            assert!(err.contains("at most"), "{err}");
        }

        spec.update_interval_secs = 1e20;
        assert_eq!(spec.interval(), None);
        spec.update_interval_secs = 1e19;
        assert_ne!(spec.interval(), Some(Duration::ZERO));
    }

    #[test]
    fn snapshot_is_sorted_and_compared_by_value() {
        let entry = |id: u64, icon: IconCategory| StatusEntry {
            id: ProbeId(id),
            address: format!("10.0.0.{id}"),
            icon,
            show_in_summary: id != 2,
            show_text: false,
        };

        let a = StatusSnapshot::from_entries(vec![
            entry(3, IconCategory::Good),
            entry(1, IconCategory::Bad),
            entry(2, IconCategory::Inactive),
        ]);
        let ids: Vec<u64> = a.entries.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(a.summary().count(), 2);

        let mut b = a.clone();
        assert_eq!(a, b);
        b.entries[0].icon = IconCategory::Good;
        assert_ne!(a, b);
    }
}
