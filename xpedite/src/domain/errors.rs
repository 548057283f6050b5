//! Structured error types for xpedite
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! The enums mirror the failure families of the runtime: startup, protocol
//! parsing, and probe/PMU/profile activation.

use super::types::ProbeKey;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures that abort framework initialization. No partial startup
/// survives any of these.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to open app info file {path} for writing: {source}")]
    AppInfoUnwritable { path: PathBuf, source: std::io::Error },

    #[error("failed to bind control listener on {addr}: {source}")]
    ListenerBind { addr: String, source: std::io::Error },

    #[error("framework init timed out after {0:?}")]
    Timeout(Duration),
}

/// A control request that could not be parsed. The request is never
/// executed; the text becomes the error response.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("empty request")]
    Empty,

    #[error("invalid request: {0}")]
    UnknownCommand(String),

    #[error("unknown option {option} for {command}")]
    UnknownOption { command: String, option: String },

    #[error("invalid value {value:?} for {option}: {reason}")]
    InvalidValue { option: String, value: String, reason: String },

    #[error("missing required option {option} for {command}")]
    MissingOption { command: String, option: String },
}

/// A well-formed request that the runtime refused to apply. Partially
/// applied state is rolled back before the error is returned.
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("no probe registered at {0}")]
    ProbeNotFound(ProbeKey),

    #[error("pmu rejected request: {0}")]
    PmuRejected(String),

    #[error("a profiling session is already active")]
    ProfileActive,

    #[error("no active profiling session")]
    NoActiveProfile,

    #[error("failed to create samples file {path}: {source}")]
    SampleFileCreate { path: PathBuf, source: std::io::Error },

    #[error("failed to write samples file header: {0}")]
    SampleFileHeader(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_not_found_display() {
        let err = ActivationError::ProbeNotFound(ProbeKey::new("a.rs", 10, ""));
        assert_eq!(err.to_string(), "no probe registered at a.rs:10");
    }

    #[test]
    fn test_request_error_display() {
        let err = RequestError::UnknownOption {
            command: "ActivateProbe".to_string(),
            option: "--bogus".to_string(),
        };
        assert!(err.to_string().contains("--bogus"));
        assert!(err.to_string().contains("ActivateProbe"));
    }
}
