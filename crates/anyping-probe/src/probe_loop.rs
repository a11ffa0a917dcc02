use crate::error::{ProbeError, Result};
use crate::lock;
use crate::prober::{CheckOutcome, Prober};
use crate::runner::CheckCancel;
use crate::state::{ProbeState, WarningThreshold};
use anyping_model::{ProbeId, ProbeSpec, StatusEntry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receiver of per-probe status changes.
///
/// Called from probe threads while the probe's own state lock is held, so
/// implementations must not call back into the probe.
pub trait StatusSink: Send + Sync {
    fn on_probe_update(&self, entry: StatusEntry);
}

/// Sleep that another thread can cut short.
#[derive(Debug, Default)]
struct Sleeper {
    interrupted: Mutex<bool>,
    cond: Condvar,
}

impl Sleeper {
    /// Returns `true` when woken by `interrupt` before the deadline. Without
    /// a deadline only `interrupt` ends the sleep.
    fn sleep_until(&self, deadline: Option<Instant>) -> bool {
        let mut interrupted = lock(&self.interrupted);
        loop {
            if *interrupted {
                *interrupted = false;
                return true;
            }
            interrupted = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cond
                        .wait_timeout(interrupted, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .cond
                    .wait(interrupted)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn interrupt(&self) {
        *lock(&self.interrupted) = true;
        self.cond.notify_all();
    }
}

/// Control block of one started run; a new one is made by every `start`.
#[derive(Debug, Default)]
struct RunControl {
    running: AtomicBool,
    sleeper: Sleeper,
}

impl RunControl {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

struct ActiveRun {
    control: Arc<RunControl>,
    thread: JoinHandle<()>,
}

struct LoopState {
    probe: ProbeState,
    // Bumped whenever a result in flight would no longer match the probe.
    epoch: u64,
    // Set when a wake must start a check at once instead of rescheduling.
    tick_requested: bool,
}

struct LoopShared {
    id: ProbeId,
    state: Mutex<LoopState>,
    cancel: CheckCancel,
    prober: Prober,
    sink: Arc<dyn StatusSink>,
    warning: WarningThreshold,
}

impl LoopShared {
    fn schedule(&self) -> (bool, Option<Duration>) {
        let state = lock(&self.state);
        (state.probe.activated, state.probe.spec.interval())
    }

    fn take_tick_request(&self) -> bool {
        std::mem::take(&mut lock(&self.state).tick_requested)
    }

    /// Sleeps until one interval after `started`. An interval change wakes
    /// the sleep and moves the deadline; a tick request ends it.
    fn wait_for_next_tick(&self, control: &RunControl, started: Instant) {
        loop {
            let (activated, interval) = self.schedule();
            if !activated {
                return;
            }
            if !control.sleeper.sleep_until(deadline_after(started, interval)) {
                return;
            }
            if !control.is_running() || self.take_tick_request() {
                return;
            }
        }
    }

    fn tick(&self, control: &RunControl) {
        let (epoch, address, echo_count) = {
            let mut state = lock(&self.state);
            state.tick_requested = false;
            (
                state.epoch,
                state.probe.spec.address.clone(),
                state.probe.spec.echo_count,
            )
        };

        let (result, error) = match self.prober.run(&address, echo_count, &self.cancel) {
            CheckOutcome::Finished { result, error } => (result, error),
            CheckOutcome::Cancelled => {
                debug!(probe = %self.id, address = %address, "check cancelled");
                return;
            }
        };

        let mut state = lock(&self.state);
        if !control.is_running() || !state.probe.activated || state.epoch != epoch {
            debug!(probe = %self.id, address = %address, "discarding stale result");
            return;
        }
        state
            .probe
            .record(result, error.map(|err| err.to_string()), self.warning.get());
        debug!(
            probe = %self.id,
            address = %address,
            outcome = ?result.outcome,
            avg_ms = result.avg_ms,
            "probe tick"
        );
        self.sink.on_probe_update(state.probe.entry());
    }
}

/// A repeating, cancellable ping schedule for one probe, on its own thread.
pub struct ProbeLoop {
    shared: Arc<LoopShared>,
    run: Mutex<Option<ActiveRun>>,
}

impl ProbeLoop {
    pub fn new(
        id: ProbeId,
        spec: ProbeSpec,
        prober: Prober,
        sink: Arc<dyn StatusSink>,
        warning: WarningThreshold,
    ) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                id,
                state: Mutex::new(LoopState {
                    probe: ProbeState::new(id, spec),
                    epoch: 0,
                    tick_requested: false,
                }),
                cancel: CheckCancel::new(),
                prober,
                sink,
                warning,
            }),
            run: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ProbeId {
        self.shared.id
    }

    /// Starts the loop thread. Does nothing if it is already running.
    pub fn start(&self) -> Result<()> {
        let mut run = lock(&self.run);
        if let Some(active) = run.as_ref() {
            if active.control.is_running() && !active.thread.is_finished() {
                return Ok(());
            }
        }

        let control = Arc::new(RunControl::default());
        control.running.store(true, Ordering::Release);
        self.shared.cancel.reset();

        let shared = Arc::clone(&self.shared);
        let thread_control = Arc::clone(&control);
        let thread = thread::Builder::new()
            .name(format!("probe-{}", self.shared.id.0))
            .spawn(move || run_loop(shared, thread_control))
            .map_err(|source| ProbeError::LoopSpawnFailure {
                id: self.shared.id,
                source,
            })?;

        *run = Some(ActiveRun { control, thread });
        info!(probe = %self.shared.id, "probe loop started");
        Ok(())
    }

    /// Stops the loop: cancels an in-flight check, wakes the sleep and joins
    /// the thread. When called on the loop's own thread (from a sink callback)
    /// the loop is only told to exit.
    pub fn stop(&self) {
        let Some(active) = lock(&self.run).take() else {
            return;
        };

        active.control.running.store(false, Ordering::Release);
        self.shared.cancel.cancel();
        active.control.sleeper.interrupt();

        if active.thread.thread().id() == thread::current().id() {
            debug!(probe = %self.shared.id, "stop requested from the probe thread");
            return;
        }
        if active.thread.join().is_err() {
            warn!(probe = %self.shared.id, "probe thread panicked");
        }
        info!(probe = %self.shared.id, "probe loop stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run)
            .as_ref()
            .map_or(false, |active| {
                active.control.is_running() && !active.thread.is_finished()
            })
    }

    pub fn is_activated(&self) -> bool {
        lock(&self.shared.state).probe.activated
    }

    /// Deactivating cancels an in-flight check and publishes `Inactive` at
    /// once; activating publishes the waiting state and wakes the loop so it
    /// ticks without waiting out the rest of its sleep.
    pub fn set_activated(&self, activated: bool) {
        let running = self.is_running();
        {
            let mut state = lock(&self.shared.state);
            if state.probe.activated == activated {
                return;
            }
            state.epoch += 1;
            state.probe.apply_activation(activated);
            state.tick_requested = activated;
            if activated {
                if running {
                    self.shared.cancel.reset();
                }
            } else {
                self.shared.cancel.cancel();
            }
            info!(probe = %self.shared.id, activated, "probe activation changed");
            self.shared.sink.on_probe_update(state.probe.entry());
        }
        if activated {
            self.wake();
        }
    }

    /// Applies a new spec. A changed target drops the previous result and
    /// checks the new one at once; a changed interval moves the pending
    /// deadline to one new interval after the last check started. Display
    /// flags leave the schedule alone. A changed activation flag goes through
    /// `set_activated`.
    pub fn reconfigure(&self, spec: ProbeSpec) -> Result<()> {
        spec.validate().map_err(ProbeError::InvalidSpec)?;

        let (activation_changed, reschedule) = {
            let mut state = lock(&self.shared.state);
            let current = &state.probe.spec;
            let target_changed =
                current.address != spec.address || current.echo_count != spec.echo_count;
            let interval_changed = current.update_interval_secs != spec.update_interval_secs;
            let activated = state.probe.activated;

            state.probe.spec = ProbeSpec {
                activated,
                ..spec.clone()
            };
            if target_changed {
                state.epoch += 1;
                state.tick_requested = true;
                state.probe.forget_result();
            }
            state.probe.refresh_icon(self.shared.warning.get());
            self.shared.sink.on_probe_update(state.probe.entry());
            (activated != spec.activated, target_changed || interval_changed)
        };

        if activation_changed {
            self.set_activated(spec.activated);
        }
        if reschedule {
            self.wake();
        }
        Ok(())
    }

    pub fn set_show_in_summary(&self, show: bool) {
        self.update_display(|spec| spec.show_in_summary = show);
    }

    pub fn set_show_text(&self, show: bool) {
        self.update_display(|spec| spec.show_text = show);
    }

    pub fn spec(&self) -> ProbeSpec {
        lock(&self.shared.state).probe.spec.clone()
    }

    pub fn state(&self) -> ProbeState {
        let running = self.is_running();
        let mut probe = lock(&self.shared.state).probe.clone();
        probe.running = running;
        probe
    }

    pub fn entry(&self) -> StatusEntry {
        lock(&self.shared.state).probe.entry()
    }

    /// Re-derives the icon after the warning threshold changed and republishes it.
    pub fn refresh(&self) {
        let mut state = lock(&self.shared.state);
        state.probe.refresh_icon(self.shared.warning.get());
        self.shared.sink.on_probe_update(state.probe.entry());
    }

    fn update_display(&self, apply: impl FnOnce(&mut ProbeSpec)) {
        let mut state = lock(&self.shared.state);
        apply(&mut state.probe.spec);
        self.shared.sink.on_probe_update(state.probe.entry());
    }

    fn wake(&self) {
        if let Some(active) = lock(&self.run).as_ref() {
            active.control.sleeper.interrupt();
        }
    }
}

impl Drop for ProbeLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `None` when the deadline lies beyond what `Instant` can hold.
fn deadline_after(start: Instant, interval: Option<Duration>) -> Option<Instant> {
    interval.and_then(|interval| start.checked_add(interval))
}

fn run_loop(shared: Arc<LoopShared>, control: Arc<RunControl>) {
    while control.is_running() {
        let (activated, interval) = shared.schedule();
        if !activated {
            control
                .sleeper
                .sleep_until(deadline_after(Instant::now(), interval));
            continue;
        }

        // Fixed rate: the next tick is due one interval after this one started.
        let started = Instant::now();
        shared.tick(&control);
        shared.wait_for_next_tick(&control, started);
    }
    debug!(probe = %shared.id, "probe loop exited");
}
