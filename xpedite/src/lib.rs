//! # Xpedite - in-process profiling runtime
//!
//! Xpedite links into a latency-sensitive application and lets an
//! external profiler attach, toggle instrumentation probes compiled into
//! the target, program CPU performance counters, and collect
//! timestamp/counter samples without ever blocking an application thread.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Application Threads                        │
//! │   probe.fire() → Sample → per-thread wait-free ring buffer      │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │ lock-free buffer registry
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Framework Background Thread (one per process)      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │   Session    │──▶│   Handler    │──▶│  Persister   │        │
//! │  │   Manager    │   │ (profile,    │   │ (segments →  │        │
//! │  │ DORMANT/     │   │  seq, file)  │   │ samples file)│        │
//! │  │ LOCAL/REMOTE │   └──────────────┘   └──────────────┘        │
//! │  └──────┬───────┘                                               │
//! │         │ requests                                              │
//! │    ┌────┴─────┐                                                 │
//! │    ▼          ▼                                                 │
//! │  local      remote (framed TCP, one client)                     │
//! │  queue      listener                                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The background thread alternates between serving control requests
//! (from the in-process caller or a single TCP peer) and draining every
//! thread's sample ring into one binary segment per tick. When a session
//! ends — explicitly, on disconnect, or at shutdown — every probe and
//! counter it touched is restored.
//!
//! ## Typical usage
//!
//! ```no_run
//! use xpedite::{initialize, profile, ProfileInfo, ProbeKey};
//!
//! let txn_probe = xpedite::probes::registry().register("app.rs", 42, "txn");
//!
//! assert!(initialize("/tmp/app.info"));
//!
//! // in-process session: enable the probe and collect while the guard lives
//! let guard = profile(&ProfileInfo::new(vec![ProbeKey::new("app.rs", 42, "")], 1 << 16));
//! for _ in 0..1000 {
//!     txn_probe.fire();
//! }
//! drop(guard); // probes restored, samples file closed
//!
//! xpedite::halt();
//! ```
//!
//! Remote profilers instead connect to the TCP port published in the
//! app-info file and drive the same request protocol.

pub mod collector;
pub mod domain;
pub mod framework;
pub mod persist;
pub mod pmu;
pub mod probes;
pub mod request;
pub mod session;
pub mod transport;
pub mod util;

pub use domain::{ActivationError, InitError, PmuRequest, ProbeKey, ProfileInfo, RequestError};
pub use framework::{
    halt, initialize, initialize_thread, initialize_with, is_running, pin_thread, profile,
    SessionGuard,
};
pub use probes::ProbeHandle;
