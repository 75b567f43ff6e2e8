//! Data Transfer Objects for inter-service communication
//!
//! DTOs are the request and response bodies of the scheduler's HTTP surface:
//! the four worker-facing RPC methods plus the operator endpoints.

pub mod import;
pub mod librarian;
pub mod machine;
pub mod rpc;
