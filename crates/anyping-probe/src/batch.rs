use crate::prober::{probe_once, CheckOutcome};
use crate::runner::{CheckCancel, PingRunner};
use anyping_model::ProbeResult;
use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckJobResult {
    pub target: String,
    pub result: ProbeResult,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Probes every target once. Results come back in input order whatever the
/// concurrency level.
pub fn run_checks_with_runner(
    targets: &[String],
    echo_count: u32,
    concurrency: usize,
    runner: &dyn PingRunner,
) -> Vec<CheckJobResult> {
    let check = |target: &String| run_check(target, echo_count, runner);

    match rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .thread_name(|index| format!("check-{index}"))
        .build()
    {
        Ok(pool) => pool.install(|| targets.par_iter().map(check).collect()),
        Err(err) => {
            warn!(error = %err, "check pool unavailable, running sequentially");
            targets.iter().map(check).collect()
        }
    }
}

fn run_check(target: &str, echo_count: u32, runner: &dyn PingRunner) -> CheckJobResult {
    let started = Instant::now();
    let (result, error) = match probe_once(runner, target, echo_count, &CheckCancel::new()) {
        CheckOutcome::Finished { result, error } => (result, error.map(|err| err.to_string())),
        CheckOutcome::Cancelled => (ProbeResult::failed(), Some("check cancelled".to_string())),
    };

    CheckJobResult {
        target: target.to_string(),
        result,
        error,
        elapsed: started.elapsed(),
    }
}
