//! In-process profiler session.
//!
//! Application threads submit requests through a [`LocalIssuer`]; the
//! framework poll thread executes them in arrival order and completes
//! each one through its own channel. A timeout of zero means wait
//! without limit — local callers own the thread issuing the request.

use super::Handler;
use crate::request::{Request, Response};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::info;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("framework control thread is not running")]
    Disconnected,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

struct LocalCommand {
    request: Request,
    completion: Sender<Response>,
}

/// Cloneable submission handle for application threads.
#[derive(Clone)]
pub struct LocalIssuer {
    tx: Sender<LocalCommand>,
}

impl LocalIssuer {
    /// Submit a request and wait for its response. `timeout` of zero
    /// waits indefinitely.
    pub fn execute(&self, request: Request, timeout: Duration) -> Result<Response, ExecuteError> {
        let (completion_tx, completion_rx) = bounded(1);
        self.tx
            .send(LocalCommand { request, completion: completion_tx })
            .map_err(|_| ExecuteError::Disconnected)?;
        if timeout.is_zero() {
            completion_rx.recv().map_err(|_| ExecuteError::Disconnected)
        } else {
            completion_rx.recv_timeout(timeout).map_err(|_| ExecuteError::Timeout(timeout))
        }
    }
}

pub struct LocalSession {
    tx: Sender<LocalCommand>,
    rx: Receiver<LocalCommand>,
    /// True while the active profile was begun through this session.
    session_active: bool,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx, session_active: false }
    }

    pub fn issuer(&self) -> LocalIssuer {
        LocalIssuer { tx: self.tx.clone() }
    }

    /// Execute pending requests when this session may hold the runtime.
    /// Returns whether the local session is engaged: it did work this
    /// tick, or a locally started profile is still running.
    ///
    /// When `can_accept` is false (a remote session holds the runtime)
    /// requests stay queued until that session ends.
    pub fn poll(&mut self, can_accept: bool, handler: &mut Handler) -> bool {
        if !can_accept {
            return false;
        }

        let mut did_work = false;
        while let Ok(command) = self.rx.try_recv() {
            did_work = true;
            let response = command.request.execute(handler);
            match &command.request {
                Request::BeginProfile { .. } if !response.is_error() => {
                    self.session_active = true;
                }
                Request::EndProfile => self.session_active = false,
                _ => {}
            }
            // issuer may have given up on a timeout; that is its problem
            let _ = command.completion.send(response);
        }

        if self.session_active && !handler.is_profile_active() {
            self.session_active = false;
        }
        did_work || self.session_active
    }

    /// Fail any still-queued requests; called once at framework shutdown.
    pub fn shutdown(&mut self) {
        let mut abandoned = 0;
        while let Ok(command) = self.rx.try_recv() {
            let _ = command
                .completion
                .send(Response::Error("framework shutting down".to_string()));
            abandoned += 1;
        }
        if abandoned > 0 {
            info!("rejected {abandoned} queued local requests at shutdown");
        }
        self.session_active = false;
    }
}
