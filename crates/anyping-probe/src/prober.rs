use crate::error::ProbeError;
use crate::parser::parse_ping_report;
use crate::runner::{CheckCancel, ExitClass, PingRunner};
use anyping_model::ProbeResult;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Result of one check. Spawn and parse failures are folded into a `Failed`
/// result and kept alongside it so they can be surfaced to the observer.
#[derive(Debug)]
pub enum CheckOutcome {
    Finished {
        result: ProbeResult,
        error: Option<ProbeError>,
    },
    Cancelled,
}

impl CheckOutcome {
    fn finished(result: ProbeResult) -> Self {
        CheckOutcome::Finished {
            result,
            error: None,
        }
    }

    fn downgraded(error: ProbeError) -> Self {
        CheckOutcome::Finished {
            result: ProbeResult::failed(),
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct Prober {
    runner: Arc<dyn PingRunner>,
}

impl fmt::Debug for Prober {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prober").finish_non_exhaustive()
    }
}

impl Prober {
    pub fn new(runner: Arc<dyn PingRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<dyn PingRunner> {
        &self.runner
    }

    pub fn run(&self, address: &str, echo_count: u32, cancel: &CheckCancel) -> CheckOutcome {
        probe_once(self.runner.as_ref(), address, echo_count, cancel)
    }
}

pub fn probe_once(
    runner: &dyn PingRunner,
    address: &str,
    echo_count: u32,
    cancel: &CheckCancel,
) -> CheckOutcome {
    let report = match runner.run(address, echo_count, cancel) {
        Ok(report) => report,
        Err(_) if cancel.is_cancelled() => return CheckOutcome::Cancelled,
        Err(err) => {
            warn!(address, error = %err, "ping check could not run");
            return CheckOutcome::downgraded(err);
        }
    };

    match report.exit {
        ExitClass::Cancelled => CheckOutcome::Cancelled,
        ExitClass::Unreachable => CheckOutcome::finished(ProbeResult::no_response()),
        ExitClass::Failed => CheckOutcome::finished(ProbeResult::failed()),
        ExitClass::Reachable => match parse_ping_report(&report.output) {
            Ok(stats) => CheckOutcome::finished(ProbeResult::success(
                stats.min_ms,
                stats.avg_ms,
                stats.max_ms,
                stats.loss_percent,
            )),
            Err(err) => {
                warn!(address, error = %err, "ping report could not be parsed");
                CheckOutcome::downgraded(err)
            }
        },
    }
}
