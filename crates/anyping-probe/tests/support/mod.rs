#![allow(dead_code)]

use anyping_model::{ProbeSpec, StatusEntry};
use anyping_probe::{CheckCancel, ExitClass, PingReport, PingRunner, ProbeError, StatusSink};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Reachable { avg_ms: f64 },
    Unreachable,
    SpawnError,
    /// Blocks until the check is cancelled.
    Hang,
}

/// Scripted ping runner that records when each check started.
pub struct FakeRunner {
    reply: Mutex<Reply>,
    delay: Duration,
    honour_cancel: bool,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeRunner {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            delay: Duration::ZERO,
            honour_cancel: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The check runs its full delay even when cancelled.
    pub fn ignoring_cancel(mut self) -> Self {
        self.honour_cancel = false;
        self
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn called_addresses(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }

    pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.call_count() >= count)
    }
}

impl PingRunner for FakeRunner {
    fn run(
        &self,
        address: &str,
        echo_count: u32,
        cancel: &CheckCancel,
    ) -> anyping_probe::Result<PingReport> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), Instant::now()));
        let reply = *self.reply.lock().unwrap();

        let cancelled = PingReport {
            exit: ExitClass::Cancelled,
            output: String::new(),
        };
        if reply == Reply::Hang {
            cancel.wait_cancelled(Duration::from_secs(60));
            return Ok(cancelled);
        }
        if !self.delay.is_zero() {
            if self.honour_cancel {
                if cancel.wait_cancelled(self.delay) {
                    return Ok(cancelled);
                }
            } else {
                thread::sleep(self.delay);
            }
        }

        match reply {
            Reply::Reachable { avg_ms } => Ok(PingReport {
                exit: ExitClass::Reachable,
                output: iputils_report(address, echo_count, avg_ms),
            }),
            Reply::Unreachable => Ok(PingReport {
                exit: ExitClass::Unreachable,
                output: format!("ping: connect: Network is unreachable ({address})\n"),
            }),
            Reply::SpawnError => Err(ProbeError::CheckSpawnFailure {
                address: address.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "ping not installed"),
            }),
            Reply::Hang => unreachable!(),
        }
    }
}

pub fn iputils_report(address: &str, echo_count: u32, avg_ms: f64) -> String {
    format!(
        "PING {address} ({address}) 56(84) bytes of data.\n\n\
         --- {address} ping statistics ---\n\
         {echo_count} packets transmitted, {echo_count} received, 0% packet loss, time 1ms\n\
         rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/0.100 ms\n",
        avg_ms * 0.9,
        avg_ms,
        avg_ms * 1.1
    )
}

/// Sink that keeps every entry it is handed.
#[derive(Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<StatusEntry>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<StatusEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<StatusEntry> {
        self.entries.lock().unwrap().last().cloned()
    }

    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&StatusEntry) -> bool) -> bool {
        wait_until(timeout, || self.entries.lock().unwrap().iter().any(&pred))
    }
}

impl StatusSink for RecordingSink {
    fn on_probe_update(&self, entry: StatusEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

pub fn spec(address: &str, interval_secs: f64) -> ProbeSpec {
    ProbeSpec {
        update_interval_secs: interval_secs,
        ..ProbeSpec::new(address)
    }
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
