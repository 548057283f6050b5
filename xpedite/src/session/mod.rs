//! Profiling session control plane.
//!
//! A session is the interval during which a single profiler — the
//! in-process caller or one TCP peer — controls the runtime. The manager
//! arbitrates between them; the handler applies their requests; the
//! profile records everything that must be undone when the session ends.

pub mod handler;
pub mod local;
pub mod manager;
pub mod profile;
pub mod remote;

pub use handler::Handler;
pub use local::{ExecuteError, LocalIssuer, LocalSession};
pub use manager::{SessionManager, DORMANT_POLL_INTERVAL};
pub use profile::Profile;
pub use remote::RemoteSession;
