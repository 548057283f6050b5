//! Control protocol requests and responses.
//!
//! A request is a single framed line of the form `<Name> [--key value]*`.
//! Every request yields exactly one response: a value string or an error
//! string, never both. Execution happens on the framework poll thread,
//! strictly in arrival order.

pub mod parser;

pub use parser::parse;

use crate::domain::{clamp_poll_interval, PmuRequest, ProbeKey};
use crate::probes;
use crate::session::Handler;
use crate::util;
use std::time::Duration;

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Keep-alive; answered with an empty value.
    Ping,
    /// Report the estimated TSC frequency in Hz.
    TscHz,
    /// List every registered probe as `file,line,name,enabled` CSV.
    ListProbes,
    ActivateProbe(ProbeKey),
    DeactivateProbe(ProbeKey),
    ActivatePmu { gp_counter_count: u32, fixed_counters: Vec<u8> },
    ActivatePerfEvents(PmuRequest),
    BeginProfile {
        samples_file_pattern: String,
        poll_interval: Duration,
        samples_data_capacity: u64,
    },
    EndProfile,
}

/// Exactly one of a value or an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Value(String),
    Error(String),
}

impl Response {
    pub fn ok() -> Self {
        Response::Value(String::new())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Response::Value(value) => value,
            Response::Error(error) => error,
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for Response {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Response::ok(),
            Err(e) => Response::Error(e.to_string()),
        }
    }
}

impl Request {
    /// Apply this request against the handler's state.
    pub fn execute(&self, handler: &mut Handler) -> Response {
        match self {
            Request::Ping => Response::ok(),
            Request::TscHz => Response::Value(util::estimate_tsc_hz().to_string()),
            Request::ListProbes => {
                let lines: Vec<String> =
                    probes::registry().snapshot().iter().map(probes::ProbeStatus::csv_line).collect();
                Response::Value(lines.join("\n"))
            }
            Request::ActivateProbe(key) => handler.activate_probe(key).into(),
            Request::DeactivateProbe(key) => handler.deactivate_probe(key).into(),
            Request::ActivatePmu { gp_counter_count, fixed_counters } => {
                if let Err(e) = handler.enable_gp_pmu(*gp_counter_count) {
                    return Response::Error(e.to_string());
                }
                for &index in fixed_counters {
                    if let Err(e) = handler.enable_fixed_pmu(index) {
                        return Response::Error(e.to_string());
                    }
                }
                Response::ok()
            }
            Request::ActivatePerfEvents(request) => handler.enable_perf_events(request).into(),
            Request::BeginProfile { samples_file_pattern, poll_interval, samples_data_capacity } => {
                handler
                    .begin_profile(
                        samples_file_pattern,
                        clamp_poll_interval(*poll_interval),
                        *samples_data_capacity,
                    )
                    .into()
            }
            Request::EndProfile => handler.end_profile().into(),
        }
    }
}
