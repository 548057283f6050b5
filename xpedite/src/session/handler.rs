//! Shared mutable state behind every control request.
//!
//! The handler owns the active profile, the open samples file, the poll
//! cadence, and the segment sequence counter. Requests mutate it from the
//! framework poll thread only, so no locking is needed here.

use super::profile::Profile;
use crate::collector::sample_buffers;
use crate::domain::{ActivationError, PmuRequest, ProbeKey, MIN_POLL_INTERVAL};
use crate::framework::storage;
use crate::persist::{self, CallSiteRecord};
use crate::pmu;
use crate::probes::{self, Sample};
use crate::util;
use log::{debug, error, info, warn};
use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

struct Sampling {
    file: File,
    path: PathBuf,
    seq: u32,
    pmc_count: u32,
}

pub struct Handler {
    profile: Profile,
    sampling: Option<Sampling>,
    poll_interval: Duration,
    staging: Vec<Sample>,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler {
    pub fn new() -> Self {
        Self {
            profile: Profile::new(),
            sampling: None,
            poll_interval: MIN_POLL_INTERVAL,
            staging: Vec::new(),
        }
    }

    pub fn is_profile_active(&self) -> bool {
        self.sampling.is_some()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn activate_probe(&mut self, key: &ProbeKey) -> Result<(), ActivationError> {
        self.profile.activate_probe(key)
    }

    pub fn deactivate_probe(&mut self, key: &ProbeKey) -> Result<(), ActivationError> {
        self.profile.deactivate_probe(key)
    }

    pub fn enable_gp_pmu(&mut self, count: u32) -> Result<(), ActivationError> {
        self.profile.enable_gp_pmu(count)
    }

    pub fn enable_fixed_pmu(&mut self, index: u8) -> Result<(), ActivationError> {
        self.profile.enable_fixed_pmu(index)
    }

    pub fn enable_perf_events(&mut self, request: &PmuRequest) -> Result<(), ActivationError> {
        self.profile.enable_perf_events(request)
    }

    /// Open the samples file and start collecting.
    ///
    /// On any failure the probes and counters this session enabled are
    /// rolled back before the error returns; the session itself stays
    /// open.
    pub fn begin_profile(
        &mut self,
        pattern: &str,
        poll_interval: Duration,
        samples_data_capacity: u64,
    ) -> Result<(), ActivationError> {
        if self.sampling.is_some() {
            return Err(ActivationError::ProfileActive);
        }

        if samples_data_capacity > 0 {
            sample_buffers().set_ring_capacity_bytes(samples_data_capacity);
        }

        let path = storage::expand_samples_file_pattern(pattern);
        let mut file = match File::create(&path) {
            Ok(file) => file,
            Err(source) => {
                self.profile.stop();
                return Err(ActivationError::SampleFileCreate { path, source });
            }
        };

        let call_sites: Vec<CallSiteRecord> = probes::registry()
            .enabled_probes()
            .into_iter()
            .map(|status| CallSiteRecord {
                id: status.call_site_id,
                line: status.key.line(),
                file: status.key.file().to_string(),
                name: status.key.name().to_string(),
            })
            .collect();
        let pmc_count = pmu::pmu_ctl().active_counter_count();

        if let Err(e) = persist::persist_header(
            &mut file,
            &call_sites,
            util::estimate_tsc_hz(),
            pmc_count,
            SystemTime::now(),
        ) {
            // header bytes may already be on disk; no reader can trust
            // the file, and the runtime cannot trust the fd
            drop(file);
            let _ = std::fs::remove_file(&path);
            self.profile.stop();
            error!("fatal: samples file header write failed ({e}), halting framework");
            crate::framework::request_halt();
            return Err(ActivationError::SampleFileHeader(e));
        }

        info!(
            "profile active - samples file {} ({} call sites, {pmc_count} counters, poll {poll_interval:?})",
            path.display(),
            call_sites.len()
        );
        self.poll_interval = poll_interval;
        self.sampling = Some(Sampling { file, path, seq: 0, pmc_count });
        Ok(())
    }

    /// Stop collecting, close the samples file, and restore probe/PMU
    /// state.
    ///
    /// # Errors
    /// Only when there is nothing to end: no open samples file and no
    /// recorded session state.
    pub fn end_profile(&mut self) -> Result<(), ActivationError> {
        if self.sampling.is_none() && self.profile.is_empty() {
            return Err(ActivationError::NoActiveProfile);
        }
        self.terminate_session();
        Ok(())
    }

    /// Unconditional session teardown: final drain, file close, inverse
    /// replay. Used by `EndProfile`, client disconnect, and shutdown.
    pub fn terminate_session(&mut self) {
        self.poll();
        if let Some(sampling) = self.sampling.take() {
            info!(
                "closing samples file {} after {} segments",
                sampling.path.display(),
                sampling.seq
            );
        }
        self.profile.stop();
        self.poll_interval = MIN_POLL_INTERVAL;
    }

    /// Drain every registered sample buffer into one segment. Empty ticks
    /// emit nothing; a failed write is logged, its sequence number is
    /// consumed, and polling continues.
    pub fn poll(&mut self) {
        let Some(sampling) = self.sampling.as_mut() else { return };

        let staging = &mut self.staging;
        staging.clear();
        let mut overflow = 0;
        sample_buffers().for_each_buffer(|node| {
            node.ring().drain(|sample| staging.push(sample));
            overflow += node.ring().take_overflow();
        });
        if overflow > 0 {
            warn!("sample buffers overflowed, dropped {overflow} samples");
        }
        if staging.is_empty() {
            return;
        }

        let seq = sampling.seq;
        sampling.seq += 1;
        match persist::persist_segment(
            &mut sampling.file,
            staging,
            sampling.pmc_count,
            seq,
            SystemTime::now(),
        ) {
            Ok(()) => debug!("persisted segment {seq} with {} samples", staging.len()),
            Err(e) => error!("failed to persist segment {seq}: {e}"),
        }
    }

    pub fn shutdown(&mut self) {
        self.terminate_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::SampleFile;
    use tempfile::tempdir;

    #[test]
    fn test_begin_profile_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("a-%.data");
        let mut handler = Handler::new();
        handler
            .begin_profile(pattern.to_str().unwrap(), Duration::from_millis(1), 0)
            .unwrap();
        assert!(handler.is_profile_active());
        let err = handler
            .begin_profile(pattern.to_str().unwrap(), Duration::from_millis(1), 0)
            .unwrap_err();
        assert!(matches!(err, ActivationError::ProfileActive));
        handler.terminate_session();
    }

    #[test]
    fn test_begin_profile_rolls_back_on_bad_path() {
        let handle = probes::registry().register("handler_a.rs", 3, "");
        let mut handler = Handler::new();
        handler.activate_probe(&ProbeKey::new("handler_a.rs", 3, "")).unwrap();
        assert!(handle.is_enabled());

        let err = handler
            .begin_profile("/nonexistent-dir/x-%.data", Duration::from_millis(1), 0)
            .unwrap_err();
        assert!(matches!(err, ActivationError::SampleFileCreate { .. }));
        assert!(!handle.is_enabled(), "rollback must disable session probes");
        assert!(!handler.is_profile_active());
    }

    #[test]
    fn test_end_profile_without_session() {
        let mut handler = Handler::new();
        assert!(matches!(handler.end_profile(), Err(ActivationError::NoActiveProfile)));
    }

    #[test]
    fn test_header_written_before_any_segment() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("hdr-%.data");
        let mut handler = Handler::new();
        handler
            .begin_profile(pattern.to_str().unwrap(), Duration::from_millis(1), 0)
            .unwrap();
        let path = handler.sampling.as_ref().unwrap().path.clone();
        handler.poll(); // empty tick, no segment
        handler.terminate_session();

        let file = SampleFile::read_from(path).unwrap();
        assert_eq!(file.info.version, persist::FILE_FORMAT_VERSION);
        assert!(file.info.tsc_hz > 0);
        assert!(file.segments.is_empty());
    }
}
