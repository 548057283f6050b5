//! Framework lifecycle.
//!
//! `initialize` runs once per process: it spawns the background thread
//! that owns the session manager, waits for the control plane to come up,
//! and installs the single process-wide runtime handle. `halt` stops and
//! joins that thread. In-process profiling goes through `profile`, whose
//! [`SessionGuard`] ends the session on drop — on every exit path.

pub mod app_info;
pub mod storage;

use crate::collector;
use crate::domain::{ProfileInfo, MIN_POLL_INTERVAL};
use crate::request::{Request, Response};
use crate::session::{ExecuteError, LocalIssuer, SessionManager};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bounded wait for the background thread to come up.
const INIT_TIMEOUT: Duration = Duration::from_secs(5);
/// Longer bound when the caller wants startup to block until a profiler
/// attaches and begins a profile.
const AWAIT_PROFILE_INIT_TIMEOUT: Duration = Duration::from_secs(120);

/// The single process-wide runtime, installed at `initialize`.
struct Framework {
    can_run: AtomicBool,
    issuer: OnceLock<LocalIssuer>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

static FRAMEWORK: OnceLock<Arc<Framework>> = OnceLock::new();
static INIT_RESULT: OnceLock<bool> = OnceLock::new();

/// Initialize with defaults: listen on every interface, return as soon as
/// the control plane is up.
pub fn initialize(app_info_path: impl AsRef<Path>) -> bool {
    initialize_with(app_info_path, "", false)
}

/// Initialize the profiling runtime. Runs once per process; repeat calls
/// return the first call's result.
///
/// With `await_profile_begin` the call blocks (up to 120 s) until a
/// profiler has attached and begun a profile, so startup-path code runs
/// instrumented.
pub fn initialize_with(
    app_info_path: impl AsRef<Path>,
    listener_ip: &str,
    await_profile_begin: bool,
) -> bool {
    initialize_thread();
    let app_info_path = app_info_path.as_ref().to_path_buf();
    let listener_ip = listener_ip.to_string();
    *INIT_RESULT.get_or_init(|| initialize_once(app_info_path, listener_ip, await_profile_begin))
}

fn initialize_once(
    app_info_path: PathBuf,
    listener_ip: String,
    await_profile_begin: bool,
) -> bool {
    let framework = Arc::new(Framework {
        can_run: AtomicBool::new(true),
        issuer: OnceLock::new(),
        thread: Mutex::new(None),
    });

    let (init_tx, init_rx) = bounded::<bool>(1);
    let thread_framework = Arc::clone(&framework);
    let handle = std::thread::Builder::new().name("xpedite".to_string()).spawn(move || {
        run(&thread_framework, &app_info_path, &listener_ip, await_profile_begin, &init_tx);
    });
    let handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            error!("failed to spawn framework thread: {e}");
            return false;
        }
    };
    *framework.thread.lock().expect("framework thread slot poisoned") = Some(handle);
    FRAMEWORK.set(framework).ok().expect("framework installed twice");

    let timeout = if await_profile_begin { AWAIT_PROFILE_INIT_TIMEOUT } else { INIT_TIMEOUT };
    match init_rx.recv_timeout(timeout) {
        Ok(true) => {
            info!("framework initialized");
            true
        }
        // startup failure was already logged by the background thread
        Ok(false) | Err(RecvTimeoutError::Disconnected) => false,
        Err(RecvTimeoutError::Timeout) => {
            // the thread stays up; the caller's remedy is halt()
            error!("framework init failed: {}", crate::domain::InitError::Timeout(timeout));
            false
        }
    }
}

/// Background thread body: bring up the control plane, then alternate
/// request handling and sample drainage until halted.
fn run(
    framework: &Framework,
    app_info_path: &Path,
    listener_ip: &str,
    await_profile_begin: bool,
    init_tx: &Sender<bool>,
) {
    let mut manager = match SessionManager::new(listener_ip, 0) {
        Ok(manager) => manager,
        Err(e) => {
            error!("framework init failed: {e}");
            framework.can_run.store(false, Ordering::Relaxed);
            let _ = init_tx.send(false);
            return;
        }
    };
    if let Err(e) = app_info::write_app_info(app_info_path, manager.listener_port()) {
        error!("framework init failed: {e}");
        framework.can_run.store(false, Ordering::Relaxed);
        let _ = init_tx.send(false);
        return;
    }
    framework.issuer.set(manager.issuer()).ok().expect("issuer installed twice");

    let mut pending_init = if await_profile_begin {
        Some(init_tx)
    } else {
        let _ = init_tx.send(true);
        None
    };

    while framework.can_run.load(Ordering::Relaxed) {
        manager.poll();
        if pending_init.is_some() && manager.is_profile_active() {
            let _ = pending_init.take().expect("checked above").send(true);
        }
        std::thread::sleep(manager.poll_interval());
    }

    info!("framework thread shutting down");
    manager.shutdown();
}

/// Register the calling thread's sample buffer ahead of its first probe
/// hit. Idempotent; returns whether an allocation happened.
pub fn initialize_thread() -> bool {
    collector::sample_buffers().initialize_thread()
}

/// Clear the run flag without joining. For unrecoverable failures
/// detected on the framework thread itself, which cannot join itself;
/// the poll loop observes the flag and exits through the normal
/// shutdown path.
pub(crate) fn request_halt() {
    if let Some(framework) = FRAMEWORK.get() {
        framework.can_run.store(false, Ordering::Relaxed);
    }
}

/// Whether the background thread is (supposed to be) running.
pub fn is_running() -> bool {
    FRAMEWORK.get().is_some_and(|f| f.can_run.load(Ordering::Relaxed))
}

/// Stop and join the background thread. Idempotent: returns whether the
/// run flag was previously set.
pub fn halt() -> bool {
    let Some(framework) = FRAMEWORK.get() else { return false };
    let was_running = framework.can_run.swap(false, Ordering::Relaxed);
    if was_running {
        info!("framework awaiting thread shutdown");
        let handle = framework.thread.lock().expect("framework thread slot poisoned").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("framework thread panicked during shutdown");
            }
        }
    }
    was_running
}

/// Pin the background thread to a CPU core.
///
/// # Errors
/// Fails when the framework is not running or the OS rejects the
/// affinity change.
#[cfg(target_os = "linux")]
pub fn pin_thread(core: usize) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::os::unix::thread::JoinHandleExt;

    let framework = FRAMEWORK.get().context("framework not initialized - no thread to pin")?;
    if !framework.can_run.load(Ordering::Relaxed) {
        anyhow::bail!("framework not running - no thread to pin");
    }
    let guard = framework.thread.lock().expect("framework thread slot poisoned");
    let handle = guard.as_ref().context("framework thread already joined")?;
    crate::util::proc::pin_thread(handle.as_pthread_t(), core)
        .with_context(|| format!("failed to pin framework thread to core {core}"))
}

#[cfg(not(target_os = "linux"))]
pub fn pin_thread(_core: usize) -> anyhow::Result<()> {
    anyhow::bail!("thread pinning is not supported on this platform");
}

/// Owns an in-process profiling session; ends it on drop.
///
/// Move-only by construction. A guard that failed to start carries the
/// error text and does nothing on drop.
#[derive(Debug)]
pub struct SessionGuard {
    alive: bool,
    errors: String,
}

impl SessionGuard {
    fn live() -> Self {
        Self { alive: true, errors: String::new() }
    }

    fn failed(errors: impl Into<String>) -> Self {
        Self { alive: false, errors: errors.into() }
    }

    /// True when a session is running behind this guard.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn errors(&self) -> &str {
        &self.errors
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        info!("live session guard dropped - ending active profile");
        // the application hot path never sees profiling errors
        match execute(Request::EndProfile) {
            Ok(response) if response.is_error() => {
                warn!("failed to end profile: {}", response.text());
            }
            Err(e) => warn!("failed to end profile: {e}"),
            Ok(_) => {}
        }
    }
}

fn execute(request: Request) -> Result<Response, ExecuteError> {
    let issuer = FRAMEWORK
        .get()
        .and_then(|f| f.issuer.get())
        .ok_or(ExecuteError::Disconnected)?;
    // local requests wait without limit - the caller owns this thread
    issuer.execute(request, Duration::ZERO)
}

fn execute_step(request: Request, what: &str) -> Result<(), String> {
    match execute(request) {
        Ok(Response::Value(_)) => Ok(()),
        Ok(Response::Error(errors)) => Err(format!("failed to {what} - {errors}")),
        Err(e) => Err(format!("failed to {what} - {e}")),
    }
}

/// Begin an in-process profiling session: enable the requested probes and
/// counters, then open the samples file and start polling.
///
/// Every step a failed attempt performed is reversed before the error
/// guard returns.
pub fn profile(info: &ProfileInfo) -> SessionGuard {
    if !is_running() {
        return SessionGuard::failed("xpedite framework not initialized");
    }

    let result = (|| {
        for key in info.probes() {
            execute_step(Request::ActivateProbe(key.clone()), "enable probe")?;
        }
        if let Some(request) = info.pmu_request() {
            execute_step(Request::ActivatePerfEvents(request.clone()), "enable perf events")?;
        }
        execute_step(
            Request::BeginProfile {
                samples_file_pattern: storage::default_samples_file_pattern(),
                poll_interval: MIN_POLL_INTERVAL,
                samples_data_capacity: info.samples_data_capacity(),
            },
            "activate profile",
        )
    })();

    match result {
        Ok(()) => SessionGuard::live(),
        Err(errors) => {
            error!("{errors}");
            // roll back whatever the failed attempt applied
            let _ = execute(Request::EndProfile);
            SessionGuard::failed(errors)
        }
    }
}
