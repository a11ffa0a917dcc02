//! Periodic reachability probing: ping runners, per-probe loops, the probe
//! registry and the aggregated status snapshot.

pub mod aggregator;
pub mod batch;
pub mod error;
pub mod parser;
pub mod probe_loop;
pub mod prober;
pub mod registry;
pub mod runner;
pub mod state;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use aggregator::StatusAggregator;
pub use batch::{run_checks_with_runner, CheckJobResult};
pub use error::{ProbeError, Result};
pub use parser::{parse_ping_report, PingStats};
pub use probe_loop::{ProbeLoop, StatusSink};
pub use prober::{probe_once, CheckOutcome, Prober};
pub use registry::ProbeRegistry;
pub use runner::{
    classify_exit, CheckCancel, ExitClass, PingReport, PingRunner, SystemPingRunner,
    UNREACHABLE_EXIT_CODE,
};
pub use state::{icon_for, status_line, ProbeState, WarningThreshold};

// A panicking sink or subscriber must not wedge every other probe.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
