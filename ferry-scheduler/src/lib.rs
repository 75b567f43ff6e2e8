//! Ferry Scheduler
//!
//! Hands code-import jobs to worker machines and tracks them until they
//! finish.
//!
//! Architecture:
//! - API: axum handlers for the worker RPC calls and operator endpoints
//! - Services: the Job Runner glue, machine registry, imports, librarian
//!   and the reaper sweep
//! - Repository: transactional stores (PostgreSQL, plus an in-memory store
//!   for tests)

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
