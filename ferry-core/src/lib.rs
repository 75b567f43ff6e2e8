//! Ferry Core
//!
//! Core types and abstractions for the Ferry code-import scheduler.
//!
//! This crate contains:
//! - Domain types: machines, import definitions, jobs, results and events,
//!   together with the rules that drive their state machines
//! - DTOs: payloads exchanged between the scheduler, dispatchers and workers

pub mod domain;
pub mod dto;
