use anyhow::Result;
use anyping_model::{IconCategory, ProbeSpec, StatusSnapshot};
use anyping_probe::{icon_for, status_line, CheckJobResult};
use chrono::{DateTime, SecondsFormat, Utc};
use crossterm::style::Stylize;
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct UiOpts {
    pub plain: bool,
}

fn badge(icon: IconCategory, opts: &UiOpts) -> String {
    let text = match icon {
        IconCategory::Good => "[ok]",
        IconCategory::Warning => "[slow]",
        IconCategory::Bad => "[down]",
        IconCategory::Inactive => "[off]",
    };
    if opts.plain {
        return text.to_string();
    }
    match icon {
        IconCategory::Good => text.green().to_string(),
        IconCategory::Warning => text.yellow().to_string(),
        IconCategory::Bad => text.red().to_string(),
        IconCategory::Inactive => text.dark_grey().to_string(),
    }
}

/// One-line summary: a badge per summarised probe, with its address when
/// text is enabled for it.
pub fn render_summary(snapshot: &StatusSnapshot, opts: &UiOpts, at: DateTime<Utc>) -> String {
    let items: Vec<String> = snapshot
        .summary()
        .map(|entry| {
            let badge = badge(entry.icon, opts);
            if entry.show_text {
                format!("{badge} {}", entry.address)
            } else {
                badge
            }
        })
        .collect();

    let body = if items.is_empty() {
        "(no probes in summary)".to_string()
    } else {
        items.join("  ")
    };
    format!("{} {body}", at.format("%H:%M:%S"))
}

#[derive(Serialize)]
struct SnapshotLine<'a> {
    at: String,
    #[serde(flatten)]
    snapshot: &'a StatusSnapshot,
}

pub fn render_summary_json(snapshot: &StatusSnapshot, at: DateTime<Utc>) -> Result<String> {
    Ok(serde_json::to_string(&SnapshotLine {
        at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        snapshot,
    })?)
}

pub fn render_probe_list(specs: &[ProbeSpec], warning_threshold_ms: f64) -> String {
    let mut lines = vec![format!("warning threshold: {warning_threshold_ms} ms")];
    if specs.is_empty() {
        lines.push("(no probes configured)".to_string());
    }
    for (position, spec) in specs.iter().enumerate() {
        let mut flags = Vec::new();
        if !spec.activated {
            flags.push("inactive");
        }
        if !spec.show_in_summary {
            flags.push("hidden");
        }
        if spec.show_text {
            flags.push("text");
        }
        let mut line = format!(
            "{position}: {} every {}s x{}",
            spec.label(),
            spec.update_interval_secs,
            spec.echo_count
        );
        if spec.label() != spec.address {
            line.push_str(&format!(" ({})", spec.address));
        }
        if !flags.is_empty() {
            line.push_str(&format!(" [{}]", flags.join(", ")));
        }
        lines.push(line);
    }
    lines.join("\n")
}

pub fn render_check_results(
    results: &[CheckJobResult],
    warning_threshold_ms: f64,
    opts: &UiOpts,
) -> String {
    results
        .iter()
        .map(|job| {
            let icon = icon_for(&job.result, true, warning_threshold_ms);
            let mut line = format!(
                "{} {}: {} ({} ms)",
                badge(icon, opts),
                job.target,
                status_line(&job.result),
                job.elapsed.as_millis()
            );
            if let Some(error) = &job.error {
                line.push_str(&format!(" - {error}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Serialize)]
struct CheckLine<'a> {
    target: &'a str,
    #[serde(flatten)]
    result: &'a anyping_model::ProbeResult,
    icon: IconCategory,
    error: Option<&'a str>,
    elapsed_ms: u128,
    checked_at: String,
}

pub fn render_check_results_json(
    results: &[CheckJobResult],
    warning_threshold_ms: f64,
    at: DateTime<Utc>,
) -> Result<String> {
    let checked_at = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let lines: Vec<CheckLine<'_>> = results
        .iter()
        .map(|job| CheckLine {
            target: &job.target,
            result: &job.result,
            icon: icon_for(&job.result, true, warning_threshold_ms),
            error: job.error.as_deref(),
            elapsed_ms: job.elapsed.as_millis(),
            checked_at: checked_at.clone(),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&lines)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyping_model::{ProbeId, ProbeResult, StatusEntry};
    use chrono::TimeZone;
    use std::time::Duration;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot::from_entries(vec![
            StatusEntry {
                id: ProbeId(2),
                address: "192.0.2.2".to_string(),
                icon: IconCategory::Warning,
                show_in_summary: true,
                show_text: true,
            },
            StatusEntry {
                id: ProbeId(1),
                address: "192.0.2.1".to_string(),
                icon: IconCategory::Good,
                show_in_summary: true,
                show_text: false,
            },
            StatusEntry {
                id: ProbeId(3),
                address: "192.0.2.3".to_string(),
                icon: IconCategory::Bad,
                show_in_summary: false,
                show_text: true,
            },
        ])
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn summary_follows_identity_order_and_flags() {
        let line = render_summary(&snapshot(), &UiOpts { plain: true }, noon());
        assert_eq!(line, "12:00:00 [ok]  [slow] 192.0.2.2");
    }

    #[test]
    fn plain_mode_has_no_ansi() {
        let plain = render_summary(&snapshot(), &UiOpts { plain: true }, noon());
        assert!(!plain.contains('\x1b'));

        let coloured = render_summary(&snapshot(), &UiOpts { plain: false }, noon());
        assert!(coloured.contains("192.0.2.2"));
    }

    #[test]
    fn json_summary_is_one_line() {
        let json = render_summary_json(&snapshot(), noon()).unwrap();
        assert!(!json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["at"], "2024-05-01T12:00:00Z");
        assert_eq!(value["entries"][0]["icon"], "good");
    }

    #[test]
    fn probe_list_shows_positions_and_flags() {
        let mut named = ProbeSpec::new("192.0.2.9");
        named.name = Some("gateway".to_string());
        named.activated = false;
        let output = render_probe_list(&[ProbeSpec::new("8.8.8.8"), named], 50.0);

        assert!(output.contains("0: 8.8.8.8 every 1s x1"));
        assert!(output.contains("1: gateway every 1s x1 (192.0.2.9) [inactive]"));
    }

    #[test]
    fn check_results_show_status_and_errors() {
        let results = vec![
            CheckJobResult {
                target: "192.0.2.1".to_string(),
                result: ProbeResult::success(1.0, 2.0, 3.0, 0.0),
                error: None,
                elapsed: Duration::from_millis(12),
            },
            CheckJobResult {
                target: "192.0.2.2".to_string(),
                result: ProbeResult::failed(),
                error: Some("failed to spawn ping".to_string()),
                elapsed: Duration::from_millis(1),
            },
        ];
        let output = render_check_results(&results, 50.0, &UiOpts { plain: true });
        assert!(output.contains("[ok] 192.0.2.1: min: 1.00, avg: 2.00, max: 3.00, packet loss: 0.0"));
        assert!(output.contains("[down] 192.0.2.2: failed. (1 ms) - failed to spawn ping"));
    }
}
