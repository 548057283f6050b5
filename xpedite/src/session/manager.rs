//! Session arbitration.
//!
//! One state machine decides who holds the runtime each tick: nobody
//! (DORMANT), the in-process caller (LOCAL), or the TCP peer (REMOTE).
//! The gating predicate `state == DORMANT || state == <self>` passed to
//! each session's poll makes dual activation impossible within a tick.

use super::handler::Handler;
use super::local::{LocalIssuer, LocalSession};
use super::remote::RemoteSession;
use crate::domain::InitError;
use std::time::Duration;

/// Poll cadence while no profiler is attached.
pub const DORMANT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionType {
    Dormant,
    Local,
    Remote,
}

pub struct SessionManager {
    handler: Handler,
    local: LocalSession,
    remote: RemoteSession,
    session_type: SessionType,
}

impl SessionManager {
    /// Bind the remote listener and set up the local queue. A bind
    /// failure aborts framework initialization.
    pub fn new(listener_ip: &str, port: u16) -> Result<Self, InitError> {
        Ok(Self {
            handler: Handler::new(),
            local: LocalSession::new(),
            remote: RemoteSession::bind(listener_ip, port)?,
            session_type: SessionType::Dormant,
        })
    }

    pub fn listener_port(&self) -> u16 {
        self.remote.listener_port()
    }

    pub fn issuer(&self) -> LocalIssuer {
        self.local.issuer()
    }

    pub fn is_profile_active(&self) -> bool {
        self.handler.is_profile_active()
    }

    /// Long interval when dormant, the active session's cadence
    /// otherwise.
    pub fn poll_interval(&self) -> Duration {
        if self.session_type == SessionType::Dormant {
            DORMANT_POLL_INTERVAL
        } else {
            self.handler.poll_interval()
        }
    }

    /// One tick: offer the runtime to the local session, then the remote
    /// one, then drain samples if anyone holds it.
    pub fn poll(&mut self) {
        use SessionType::{Dormant, Local, Remote};

        let local_may_run = matches!(self.session_type, Dormant | Local);
        if self.local.poll(local_may_run, &mut self.handler) {
            debug_assert!(local_may_run);
            self.session_type = Local;
        } else if self.session_type == Local {
            self.session_type = Dormant;
        }

        let remote_may_run = matches!(self.session_type, Dormant | Remote);
        if self.remote.poll(remote_may_run, &mut self.handler) {
            debug_assert!(remote_may_run);
            self.session_type = Remote;
        } else if self.session_type == Remote {
            self.session_type = Dormant;
        }

        if self.session_type != Dormant {
            self.handler.poll();
        }
    }

    pub fn shutdown(&mut self) {
        self.remote.shutdown(&mut self.handler);
        self.local.shutdown();
        self.handler.shutdown();
        self.session_type = SessionType::Dormant;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Request, Response};
    use std::time::Duration;

    fn spin(manager: &mut SessionManager, ticks: usize) {
        for _ in 0..ticks {
            manager.poll();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_dormant_poll_interval() {
        let manager = SessionManager::new("127.0.0.1", 0).unwrap();
        assert_eq!(manager.poll_interval(), DORMANT_POLL_INTERVAL);
    }

    #[test]
    fn test_local_work_transitions_and_returns_to_dormant() {
        let mut manager = SessionManager::new("127.0.0.1", 0).unwrap();
        let issuer = manager.issuer();

        let worker =
            std::thread::spawn(move || issuer.execute(Request::Ping, Duration::ZERO).unwrap());
        while !worker.is_finished() {
            manager.poll();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.join().unwrap(), Response::ok());

        // an idle local session releases the runtime
        spin(&mut manager, 2);
        assert_eq!(manager.session_type, SessionType::Dormant);
    }

    #[test]
    fn test_listener_port_is_bound() {
        let manager = SessionManager::new("127.0.0.1", 0).unwrap();
        assert_ne!(manager.listener_port(), 0);
    }
}
