//! Probe registry and activation commands
//!
//! A probe is a statically registered instrumentation point toggled at
//! runtime. The compile-time call-site machinery lives outside this crate;
//! here the registry only needs to enumerate probes and apply
//! enable/disable commands addressed by `(file, line, name?)`.
//!
//! Firing a disabled probe costs one relaxed atomic load. Firing an
//! enabled one records a [`Sample`] into the calling thread's wait-free
//! buffer.

pub mod sample;

pub use sample::{Sample, MAX_PMC_SLOTS};

use crate::domain::{ActivationError, ProbeKey};
use log::info;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Probe state mutation requested by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
}

/// One registered instrumentation point.
#[derive(Debug)]
pub struct Probe {
    key: ProbeKey,
    call_site_id: u64,
    enabled: AtomicBool,
}

impl Probe {
    pub fn key(&self) -> &ProbeKey {
        &self.key
    }

    /// Stable numeric identifier recorded in every sample this probe emits.
    pub fn call_site_id(&self) -> u64 {
        self.call_site_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Cheap cloneable handle the application fires on its hot path.
#[derive(Debug, Clone)]
pub struct ProbeHandle {
    probe: Arc<Probe>,
}

impl ProbeHandle {
    /// Record a sample if the probe is enabled. Wait-free; never blocks
    /// the calling thread.
    #[inline]
    pub fn fire(&self) {
        if self.probe.enabled.load(Ordering::Relaxed) {
            crate::collector::record_hit(self.probe.call_site_id);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.probe.is_enabled()
    }

    pub fn key(&self) -> &ProbeKey {
        &self.probe.key
    }
}

/// Point-in-time view of one probe, used for the app-info file and the
/// `ListProbes` response.
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    pub key: ProbeKey,
    pub call_site_id: u64,
    pub enabled: bool,
}

impl ProbeStatus {
    /// `file,line,name,enabled` — the line format shared by the app-info
    /// file and the `ListProbes` response.
    pub fn csv_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.key.file(),
            self.key.line(),
            self.key.name(),
            u8::from(self.enabled)
        )
    }
}

/// The process-wide enumerable collection of registered probes.
///
/// Registration happens at application startup; enable/disable commands
/// arrive from the control plane. The fire path never touches the registry
/// lock, only the per-probe atomic.
pub struct ProbeRegistry {
    probes: RwLock<Vec<Arc<Probe>>>,
    next_call_site_id: AtomicU64,
}

impl ProbeRegistry {
    const fn new() -> Self {
        Self { probes: RwLock::new(Vec::new()), next_call_site_id: AtomicU64::new(1) }
    }

    /// Register a call site and return the handle used to fire it.
    /// Probes start DISABLED.
    pub fn register(
        &self,
        file: impl Into<String>,
        line: u32,
        name: impl Into<String>,
    ) -> ProbeHandle {
        let key = ProbeKey::new(file, line, name);
        let probe = Arc::new(Probe {
            key,
            call_site_id: self.next_call_site_id.fetch_add(1, Ordering::Relaxed),
            enabled: AtomicBool::new(false),
        });
        self.probes.write().expect("probe registry poisoned").push(Arc::clone(&probe));
        ProbeHandle { probe }
    }

    /// Apply an enable/disable command to every probe matching `key`.
    ///
    /// # Errors
    /// Returns [`ActivationError::ProbeNotFound`] when nothing matches.
    pub fn probe_ctl(&self, command: Command, key: &ProbeKey) -> Result<(), ActivationError> {
        let probes = self.probes.read().expect("probe registry poisoned");
        let mut matched = false;
        for probe in probes.iter() {
            if key.matches(probe.key.file(), probe.key.line(), probe.key.name()) {
                probe.enabled.store(command == Command::Enable, Ordering::Relaxed);
                matched = true;
            }
        }
        if matched {
            info!("probe {command:?} applied at {key}");
            Ok(())
        } else {
            Err(ActivationError::ProbeNotFound(key.clone()))
        }
    }

    /// Snapshot every registered probe.
    pub fn snapshot(&self) -> Vec<ProbeStatus> {
        self.probes
            .read()
            .expect("probe registry poisoned")
            .iter()
            .map(|probe| ProbeStatus {
                key: probe.key.clone(),
                call_site_id: probe.call_site_id,
                enabled: probe.is_enabled(),
            })
            .collect()
    }

    /// Snapshot of the probes currently ENABLED, in registration order.
    pub fn enabled_probes(&self) -> Vec<ProbeStatus> {
        let mut statuses = self.snapshot();
        statuses.retain(|status| status.enabled);
        statuses
    }

    pub fn len(&self) -> usize {
        self.probes.read().expect("probe registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static REGISTRY: ProbeRegistry = ProbeRegistry::new();

/// The process-wide probe registry.
pub fn registry() -> &'static ProbeRegistry {
    &REGISTRY
}
