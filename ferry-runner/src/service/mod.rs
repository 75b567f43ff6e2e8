//! Service layer
//!
//! Helpers the worker uses around a driver run.

pub mod access_policy;
pub mod log_capture;

pub use access_policy::{AccessPolicy, AccessPolicyKind};
pub use log_capture::{HEARTBEAT_TAIL_LINES, LogCapture};
