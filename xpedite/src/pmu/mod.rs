//! PMU capability seam
//!
//! The runtime programs CPU performance counters through the [`PmuCtl`]
//! trait; the actual MSR or perf-events driver binding lives outside this
//! crate and is installed once at startup. The default [`TrackingPmu`]
//! keeps the programmed state (so sessions restore it faithfully) without
//! touching hardware, which is also what the tests run against.

use crate::domain::{ActivationError, PmuRequest};
use crate::probes::MAX_PMC_SLOTS;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::OnceLock;

/// Capability to enable/disable general, fixed, and perf-event counters
/// and to read them back on the sample hot path.
pub trait PmuCtl: Send + Sync {
    fn enable_gp_counters(&self, count: u32) -> Result<(), ActivationError>;

    fn enable_fixed_counter(&self, index: u8) -> Result<(), ActivationError>;

    fn enable_perf_events(&self, request: &PmuRequest) -> Result<(), ActivationError>;

    fn disable_gp_counters(&self);

    fn disable_fixed_counters(&self);

    fn disable_perf_events(&self);

    fn gp_counter_count(&self) -> u32;

    fn fixed_counter_count(&self) -> u32;

    fn perf_events_enabled(&self) -> bool;

    /// Counters a sample will carry right now. Bounded by
    /// [`MAX_PMC_SLOTS`].
    fn active_counter_count(&self) -> u32;

    /// Read the active counters into `out`; returns how many were written.
    /// Called from application threads at probe hits — must be wait-free.
    fn read_counters(&self, out: &mut [u64; MAX_PMC_SLOTS]) -> u32;
}

/// Default in-process capability: records what a session programmed so the
/// teardown path can restore it, reads counters back as zero.
#[derive(Debug, Default)]
pub struct TrackingPmu {
    gp_count: AtomicU32,
    fixed_mask: AtomicU64,
    perf_events: AtomicBool,
}

impl PmuCtl for TrackingPmu {
    fn enable_gp_counters(&self, count: u32) -> Result<(), ActivationError> {
        if count as usize > MAX_PMC_SLOTS {
            return Err(ActivationError::PmuRejected(format!(
                "{count} general purpose counters requested, at most {MAX_PMC_SLOTS} supported"
            )));
        }
        info!("pmu enabling collection for {count} general purpose counters");
        self.gp_count.store(count, Ordering::Relaxed);
        Ok(())
    }

    fn enable_fixed_counter(&self, index: u8) -> Result<(), ActivationError> {
        if index as usize >= MAX_PMC_SLOTS {
            return Err(ActivationError::PmuRejected(format!(
                "fixed counter index {index} out of range"
            )));
        }
        self.fixed_mask.fetch_or(1 << index, Ordering::Relaxed);
        info!("pmu enabled fixed counter {index}");
        Ok(())
    }

    fn enable_perf_events(&self, request: &PmuRequest) -> Result<(), ActivationError> {
        if request.is_empty() {
            return Err(ActivationError::PmuRejected("empty perf events descriptor".into()));
        }
        info!("pmu enabling perf events ({} descriptor bytes)", request.data().len());
        self.perf_events.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn disable_gp_counters(&self) {
        if self.gp_count.swap(0, Ordering::Relaxed) > 0 {
            info!("pmu disabled general purpose counters");
        }
    }

    fn disable_fixed_counters(&self) {
        if self.fixed_mask.swap(0, Ordering::Relaxed) != 0 {
            info!("pmu disabled fixed counters");
        }
    }

    fn disable_perf_events(&self) {
        if self.perf_events.swap(false, Ordering::Relaxed) {
            info!("pmu disabled perf events");
        }
    }

    fn gp_counter_count(&self) -> u32 {
        self.gp_count.load(Ordering::Relaxed)
    }

    fn fixed_counter_count(&self) -> u32 {
        self.fixed_mask.load(Ordering::Relaxed).count_ones()
    }

    fn perf_events_enabled(&self) -> bool {
        self.perf_events.load(Ordering::Relaxed)
    }

    fn active_counter_count(&self) -> u32 {
        // Perf-event descriptors are opaque to the tracking impl; only a
        // real driver binding knows how many counters they program.
        let count = self.gp_counter_count() + self.fixed_counter_count();
        count.min(MAX_PMC_SLOTS as u32)
    }

    fn read_counters(&self, out: &mut [u64; MAX_PMC_SLOTS]) -> u32 {
        let count = self.active_counter_count();
        out[..count as usize].fill(0);
        count
    }
}

static PMU: OnceLock<Box<dyn PmuCtl>> = OnceLock::new();

/// Install the PMU driver binding. Must happen before the first probe hit
/// or control request; a second install is ignored with a warning.
pub fn install(pmu: Box<dyn PmuCtl>) {
    if PMU.set(pmu).is_err() {
        warn!("pmu capability already installed, ignoring replacement");
    }
}

/// The process-wide PMU capability, defaulting to [`TrackingPmu`].
pub fn pmu_ctl() -> &'static dyn PmuCtl {
    PMU.get_or_init(|| Box::<TrackingPmu>::default()).as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gp_counters_round_trip() {
        let pmu = TrackingPmu::default();
        pmu.enable_gp_counters(4).unwrap();
        assert_eq!(pmu.gp_counter_count(), 4);
        assert_eq!(pmu.active_counter_count(), 4);
        pmu.disable_gp_counters();
        assert_eq!(pmu.gp_counter_count(), 0);
    }

    #[test]
    fn test_gp_counters_rejects_oversized_request() {
        let pmu = TrackingPmu::default();
        assert!(pmu.enable_gp_counters(MAX_PMC_SLOTS as u32 + 1).is_err());
        assert_eq!(pmu.gp_counter_count(), 0);
    }

    #[test]
    fn test_fixed_counters_are_a_set() {
        let pmu = TrackingPmu::default();
        pmu.enable_fixed_counter(0).unwrap();
        pmu.enable_fixed_counter(2).unwrap();
        pmu.enable_fixed_counter(2).unwrap();
        assert_eq!(pmu.fixed_counter_count(), 2);
        pmu.disable_fixed_counters();
        assert_eq!(pmu.fixed_counter_count(), 0);
    }

    #[test]
    fn test_perf_events_require_payload() {
        let pmu = TrackingPmu::default();
        assert!(pmu.enable_perf_events(&PmuRequest::default()).is_err());
        pmu.enable_perf_events(&PmuRequest::new(vec![1, 2, 3])).unwrap();
        assert!(pmu.perf_events_enabled());
        pmu.disable_perf_events();
        assert!(!pmu.perf_events_enabled());
    }

    #[test]
    fn test_read_counters_matches_active_count() {
        let pmu = TrackingPmu::default();
        pmu.enable_gp_counters(2).unwrap();
        pmu.enable_fixed_counter(1).unwrap();
        let mut out = [u64::MAX; MAX_PMC_SLOTS];
        assert_eq!(pmu.read_counters(&mut out), 3);
        assert_eq!(&out[..3], &[0, 0, 0]);
    }
}
