use crate::aggregator::StatusAggregator;
use crate::error::{ProbeError, Result};
use crate::lock;
use crate::probe_loop::{ProbeLoop, StatusSink};
use crate::prober::Prober;
use crate::runner::PingRunner;
use crate::state::{ProbeState, WarningThreshold};
use anyping_model::{ProbeConfig, ProbeId, ProbeSpec, CONFIG_VERSION};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Ordered set of probe loops.
///
/// Every mutation and iteration goes through one lock. Loops are stopped
/// (and their threads joined) only after the lock is released.
pub struct ProbeRegistry {
    probes: Mutex<Vec<Arc<ProbeLoop>>>,
    next_id: AtomicU64,
    prober: Prober,
    aggregator: Arc<StatusAggregator>,
    warning: WarningThreshold,
}

impl ProbeRegistry {
    pub fn new(
        runner: Arc<dyn PingRunner>,
        aggregator: Arc<StatusAggregator>,
        warning_threshold_ms: f64,
    ) -> Self {
        Self {
            probes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            prober: Prober::new(runner),
            aggregator,
            warning: WarningThreshold::new(warning_threshold_ms),
        }
    }

    /// Builds a registry holding one stopped probe per configured spec.
    pub fn with_config(
        config: &ProbeConfig,
        runner: Arc<dyn PingRunner>,
        aggregator: Arc<StatusAggregator>,
    ) -> Result<Self> {
        config.validate().map_err(ProbeError::InvalidSpec)?;
        let registry = Self::new(runner, aggregator, config.warning_threshold_ms);
        {
            let mut probes = lock(&registry.probes);
            for spec in &config.probes {
                probes.push(registry.new_loop(spec.clone()));
            }
            registry.rebuild_locked(&probes);
        }
        Ok(registry)
    }

    pub fn aggregator(&self) -> &Arc<StatusAggregator> {
        &self.aggregator
    }

    /// Registers a stopped probe under a fresh identity.
    pub fn add(&self, spec: ProbeSpec) -> Result<ProbeId> {
        spec.validate().map_err(ProbeError::InvalidSpec)?;
        let mut probes = lock(&self.probes);
        let probe = self.new_loop(spec);
        let id = probe.id();
        info!(probe = %id, address = %probe.spec().address, "probe added");
        probes.push(probe);
        self.rebuild_locked(&probes);
        Ok(id)
    }

    pub fn remove(&self, id: ProbeId) -> Result<()> {
        let probe = self.get(id).ok_or(ProbeError::ProbeNotFound(id))?;
        probe.stop();

        let mut probes = lock(&self.probes);
        let before = probes.len();
        probes.retain(|candidate| candidate.id() != id);
        if probes.len() == before {
            // Removed concurrently while this call was stopping it.
            return Err(ProbeError::ProbeNotFound(id));
        }
        self.rebuild_locked(&probes);
        info!(probe = %id, "probe removed");
        Ok(())
    }

    /// Moves a probe to `position` in registry order. Running state is untouched.
    pub fn reorder(&self, id: ProbeId, position: usize) -> Result<()> {
        let mut probes = lock(&self.probes);
        let index = probes
            .iter()
            .position(|probe| probe.id() == id)
            .ok_or(ProbeError::ProbeNotFound(id))?;
        if position >= probes.len() {
            return Err(ProbeError::ReorderOutOfRange {
                position,
                len: probes.len(),
            });
        }

        let probe = probes.remove(index);
        probes.insert(position, probe);
        self.rebuild_locked(&probes);
        Ok(())
    }

    pub fn update(&self, id: ProbeId, spec: ProbeSpec) -> Result<()> {
        let probe = self.get(id).ok_or(ProbeError::ProbeNotFound(id))?;
        probe.reconfigure(spec)
    }

    pub fn set_activated(&self, id: ProbeId, activated: bool) -> Result<()> {
        let probe = self.get(id).ok_or(ProbeError::ProbeNotFound(id))?;
        probe.set_activated(activated);
        Ok(())
    }

    /// Stops and discards every probe, then registers `specs` under fresh
    /// identities. The new probes are left stopped.
    pub fn replace_all(&self, specs: Vec<ProbeSpec>) -> Result<Vec<ProbeId>> {
        for spec in &specs {
            spec.validate()
                .map_err(|err| ProbeError::InvalidSpec(format!("{}: {err}", spec.address)))?;
        }

        let old = std::mem::take(&mut *lock(&self.probes));
        for probe in &old {
            probe.stop();
        }
        drop(old);

        let mut probes = lock(&self.probes);
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let probe = self.new_loop(spec);
            ids.push(probe.id());
            probes.push(probe);
        }
        self.rebuild_locked(&probes);
        info!(count = ids.len(), "probe set replaced");
        Ok(ids)
    }

    /// Starts every registered probe. All probes are attempted; the first
    /// failure is returned.
    pub fn start_all(&self) -> Result<()> {
        let mut first_error = None;
        for probe in self.loops() {
            if let Err(err) = probe.start() {
                warn!(probe = %probe.id(), error = %err, "probe failed to start");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stops every probe and returns the specs in registry order. Probes stay
    /// registered.
    pub fn shutdown(&self) -> Vec<ProbeSpec> {
        let probes = self.loops();
        for probe in &probes {
            probe.stop();
        }
        info!(count = probes.len(), "all probes stopped");
        probes.iter().map(|probe| probe.spec()).collect()
    }

    pub fn config(&self) -> ProbeConfig {
        ProbeConfig {
            version: CONFIG_VERSION,
            warning_threshold_ms: self.warning.get(),
            probes: self.specs(),
        }
    }

    pub fn get(&self, id: ProbeId) -> Option<Arc<ProbeLoop>> {
        lock(&self.probes)
            .iter()
            .find(|probe| probe.id() == id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<ProbeId> {
        lock(&self.probes).iter().map(|probe| probe.id()).collect()
    }

    pub fn specs(&self) -> Vec<ProbeSpec> {
        lock(&self.probes).iter().map(|probe| probe.spec()).collect()
    }

    pub fn states(&self) -> Vec<ProbeState> {
        lock(&self.probes).iter().map(|probe| probe.state()).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.probes).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.probes).is_empty()
    }

    pub fn warning_threshold(&self) -> f64 {
        self.warning.get()
    }

    pub fn set_warning_threshold(&self, ms: f64) {
        self.warning.set(ms);
        let probes = lock(&self.probes);
        for probe in probes.iter() {
            probe.refresh();
        }
    }

    fn loops(&self) -> Vec<Arc<ProbeLoop>> {
        lock(&self.probes).clone()
    }

    fn new_loop(&self, spec: ProbeSpec) -> Arc<ProbeLoop> {
        let id = ProbeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sink: Arc<dyn StatusSink> = self.aggregator.clone();
        Arc::new(ProbeLoop::new(
            id,
            spec,
            self.prober.clone(),
            sink,
            self.warning.clone(),
        ))
    }

    fn rebuild_locked(&self, probes: &MutexGuard<'_, Vec<Arc<ProbeLoop>>>) {
        let entries = probes.iter().map(|probe| probe.entry()).collect();
        self.aggregator.rebuild(entries);
    }
}

impl Drop for ProbeRegistry {
    fn drop(&mut self) {
        let probes = std::mem::take(&mut *lock(&self.probes));
        for probe in &probes {
            probe.stop();
        }
    }
}
