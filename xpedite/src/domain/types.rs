//! Domain types providing compile-time safety and self-documentation
//!
//! A probe is addressed by its source coordinates rather than a pointer,
//! so the profiler protocol can name call sites it has never seen.

use std::fmt;
use std::time::Duration;

/// Coordinates of an instrumented call site.
///
/// The name is optional; matching uses `(file, line)` and falls back to the
/// name only to disambiguate multiple probes on the same line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeKey {
    file: String,
    line: u32,
    name: String,
}

impl ProbeKey {
    pub fn new(file: impl Into<String>, line: u32, name: impl Into<String>) -> Self {
        Self { file: file.into(), line, name: name.into() }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when this key addresses `other`: same file and line, and a
    /// matching name when the key carries one.
    pub fn matches(&self, file: &str, line: u32, name: &str) -> bool {
        self.file == file && self.line == line && (self.name.is_empty() || self.name == name)
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}:{}", self.file, self.line)
        } else {
            write!(f, "{}:{} ({})", self.file, self.line, self.name)
        }
    }
}

/// Opaque descriptor applied to the PMU via the perf events path.
///
/// The runtime never interprets the payload; it is marshalled by the
/// profiler and handed to the PMU capability as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmuRequest {
    data: Vec<u8>,
}

impl PmuRequest {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Everything an in-process caller supplies to start a profiling session.
#[derive(Debug, Clone)]
pub struct ProfileInfo {
    probes: Vec<ProbeKey>,
    pmu_request: Option<PmuRequest>,
    samples_data_capacity: u64,
}

impl ProfileInfo {
    /// Per-thread ring capacity used when the caller passes 0.
    pub const DEFAULT_SAMPLES_DATA_CAPACITY: u64 = 1 << 20;

    pub fn new(probes: Vec<ProbeKey>, samples_data_capacity: u64) -> Self {
        let samples_data_capacity = if samples_data_capacity == 0 {
            Self::DEFAULT_SAMPLES_DATA_CAPACITY
        } else {
            samples_data_capacity
        };
        Self { probes, pmu_request: None, samples_data_capacity }
    }

    /// Attach a perf-events descriptor to be applied at session start.
    #[must_use]
    pub fn with_pmu_request(mut self, request: PmuRequest) -> Self {
        self.pmu_request = Some(request);
        self
    }

    pub fn probes(&self) -> &[ProbeKey] {
        &self.probes
    }

    pub fn pmu_request(&self) -> Option<&PmuRequest> {
        self.pmu_request.as_ref()
    }

    pub fn samples_data_capacity(&self) -> u64 {
        self.samples_data_capacity
    }
}

/// Floor applied to every configured poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Clamp a configured poll interval to the supported minimum.
pub fn clamp_poll_interval(interval: Duration) -> Duration {
    interval.max(MIN_POLL_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_key_matches_without_name() {
        let key = ProbeKey::new("app.rs", 42, "");
        assert!(key.matches("app.rs", 42, "anything"));
        assert!(!key.matches("app.rs", 43, ""));
        assert!(!key.matches("other.rs", 42, ""));
    }

    #[test]
    fn test_probe_key_name_disambiguates() {
        let key = ProbeKey::new("app.rs", 42, "step");
        assert!(key.matches("app.rs", 42, "step"));
        assert!(!key.matches("app.rs", 42, "other"));
    }

    #[test]
    fn test_probe_key_display() {
        assert_eq!(ProbeKey::new("a.rs", 7, "").to_string(), "a.rs:7");
        assert_eq!(ProbeKey::new("a.rs", 7, "step").to_string(), "a.rs:7 (step)");
    }

    #[test]
    fn test_profile_info_zero_capacity_defaults() {
        let info = ProfileInfo::new(vec![], 0);
        assert_eq!(info.samples_data_capacity(), ProfileInfo::DEFAULT_SAMPLES_DATA_CAPACITY);
    }

    #[test]
    fn test_clamp_poll_interval() {
        assert_eq!(clamp_poll_interval(Duration::ZERO), MIN_POLL_INTERVAL);
        assert_eq!(clamp_poll_interval(Duration::from_millis(5)), Duration::from_millis(5));
    }
}
