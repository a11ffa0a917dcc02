use crate::error::{ProbeError, Result};

/// Summary statistics from the tail of a `ping` report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingStats {
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Parses the statistics block printed by iputils, BSD/macOS and busybox `ping`.
///
/// The loss line and the `min/avg/max` line are located by content rather than
/// by position, so trailing blank lines or extra notices do not matter.
pub fn parse_ping_report(text: &str) -> Result<PingStats> {
    let mut counts: Option<(u32, u32, f64)> = None;
    let mut timing: Option<(f64, f64, f64)> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.contains("packet loss") {
            counts = Some(parse_loss_line(line)?);
            continue;
        }

        if line.contains("min/avg/max") {
            timing = Some(parse_timing_line(line)?);
        }
    }

    let (transmitted, received, loss_percent) =
        counts.ok_or_else(|| ProbeError::CheckParseFailure("missing packet loss line".into()))?;

    let (min_ms, avg_ms, max_ms) = match timing {
        Some(values) => values,
        None if received == 0 => (0.0, 0.0, 0.0),
        None => {
            return Err(ProbeError::CheckParseFailure(
                "missing min/avg/max line".into(),
            ))
        }
    };

    Ok(PingStats {
        transmitted,
        received,
        loss_percent,
        min_ms,
        avg_ms,
        max_ms,
    })
}

fn parse_loss_line(line: &str) -> Result<(u32, u32, f64)> {
    let mut transmitted = None;
    let mut received = None;
    let mut loss = None;

    for part in line.split(',') {
        let part = part.trim();
        let first = match part.split_whitespace().next() {
            Some(token) => token,
            None => continue,
        };

        if part.contains("transmitted") {
            transmitted = first.parse::<u32>().ok();
        } else if part.contains("received") {
            received = first.parse::<u32>().ok();
        } else if part.contains("packet loss") {
            loss = first
                .strip_suffix('%')
                .and_then(|value| value.parse::<f64>().ok());
        }
    }

    match (transmitted, received, loss) {
        (Some(tx), Some(rx), Some(loss)) => Ok((tx, rx, loss)),
        _ => Err(ProbeError::CheckParseFailure(format!(
            "unrecognised loss line: {line}"
        ))),
    }
}

fn parse_timing_line(line: &str) -> Result<(f64, f64, f64)> {
    let invalid = || ProbeError::CheckParseFailure(format!("unrecognised timing line: {line}"));

    let (_, values) = line.split_once('=').ok_or_else(invalid)?;
    let values = values.trim();
    let values = values.strip_suffix("ms").unwrap_or(values).trim();

    let mut numbers = values.split('/').map(|value| value.trim().parse::<f64>());
    let mut next = || -> Result<f64> {
        match numbers.next() {
            Some(Ok(value)) => Ok(value),
            _ => Err(invalid()),
        }
    };

    let min = next()?;
    let avg = next()?;
    let max = next()?;
    Ok((min, avg, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_line_with_error_count() {
        let line = "3 packets transmitted, 1 received, +2 errors, 66.6667% packet loss, time 2003ms";
        let (tx, rx, loss) = parse_loss_line(line).unwrap();
        assert_eq!((tx, rx), (3, 1));
        assert!((loss - 66.6667).abs() < 1e-9);
    }

    #[test]
    fn timing_line_without_deviation() {
        let line = "round-trip min/avg/max = 0.101/0.202/0.303 ms";
        assert_eq!(parse_timing_line(line).unwrap(), (0.101, 0.202, 0.303));
    }

    #[test]
    fn total_loss_has_zero_timing() {
        let text = "--- 10.0.0.9 ping statistics ---\n2 packets transmitted, 0 received, 100% packet loss, time 1010ms\n";
        let stats = parse_ping_report(text).unwrap();
        assert_eq!(stats.received, 0);
        assert_eq!(stats.loss_percent, 100.0);
        assert_eq!(stats.avg_ms, 0.0);
    }

    #[test]
    fn garbage_is_a_parse_failure() {
        let err = parse_ping_report("ping: unknown host nowhere.invalid").unwrap_err();
        assert!(matches!(err, ProbeError::CheckParseFailure(_)));
    }
}
