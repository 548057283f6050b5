//! OS and hardware utilities
//!
//! Thin wrappers over the pieces `std` does not expose: the time-stamp
//! counter, kernel thread ids, and CPU affinity.

pub mod proc;
pub mod tsc;

pub use proc::{executable_path, gettid};
pub use tsc::{estimate_tsc_hz, rdtsc};
