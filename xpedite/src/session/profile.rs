//! Per-session probe and PMU state tracking.
//!
//! The profiler protocol is one-shot per change and never sends a reset;
//! the runtime bears the entire restoration burden. Every activation is
//! recorded here so `stop()` can replay the inverses on any exit path out
//! of a session.

use crate::domain::{ActivationError, PmuRequest, ProbeKey};
use crate::pmu;
use crate::probes::{self, Command};
use log::{info, warn};
use std::collections::BTreeSet;

#[derive(Default)]
pub struct Profile {
    active_probes: BTreeSet<ProbeKey>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the probe and record it for teardown.
    pub fn activate_probe(&mut self, key: &ProbeKey) -> Result<(), ActivationError> {
        info!("enabling probe at {key}");
        probes::registry().probe_ctl(Command::Enable, key)?;
        self.active_probes.insert(key.clone());
        Ok(())
    }

    /// Disable the probe and drop it from the teardown set.
    pub fn deactivate_probe(&mut self, key: &ProbeKey) -> Result<(), ActivationError> {
        info!("disabling probe at {key}");
        self.active_probes.remove(key);
        probes::registry().probe_ctl(Command::Disable, key)
    }

    pub fn enable_gp_pmu(&mut self, count: u32) -> Result<(), ActivationError> {
        pmu::pmu_ctl().enable_gp_counters(count)
    }

    pub fn enable_fixed_pmu(&mut self, index: u8) -> Result<(), ActivationError> {
        pmu::pmu_ctl().enable_fixed_counter(index)
    }

    pub fn enable_perf_events(&mut self, request: &PmuRequest) -> Result<(), ActivationError> {
        pmu::pmu_ctl().enable_perf_events(request)
    }

    /// True when this session changed nothing that would need undoing.
    pub fn is_empty(&self) -> bool {
        let pmu = pmu::pmu_ctl();
        self.active_probes.is_empty()
            && pmu.active_counter_count() == 0
            && !pmu.perf_events_enabled()
    }

    pub fn active_probe_count(&self) -> usize {
        self.active_probes.len()
    }

    /// Restore process state: disable every recorded probe, then whichever
    /// PMU path was enabled. Infallible — individual failures are logged
    /// and never abort the teardown.
    pub fn stop(&mut self) {
        if !self.active_probes.is_empty() {
            info!("disabling {} probes at session end", self.active_probes.len());
        }
        for key in std::mem::take(&mut self.active_probes) {
            if let Err(e) = probes::registry().probe_ctl(Command::Disable, &key) {
                warn!("failed to disable probe at {key} during teardown: {e}");
            }
        }

        let pmu = pmu::pmu_ctl();
        if pmu.perf_events_enabled() {
            pmu.disable_perf_events();
        } else {
            pmu.disable_gp_counters();
            pmu.disable_fixed_counters();
        }
    }
}
